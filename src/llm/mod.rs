//! Reply generation via rig-core.
//!
//! The core treats reply generation as an opaque capability behind
//! [`ReplyGenerator`]; workers call it and never retry it. The production
//! implementation is [`RigGenerator`] over rig-core's Anthropic client.
//! Confidence scoring and escalation detection are lexical heuristics
//! applied to the raw completion.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{Error, Result};
use crate::model::Channel;

/// A prior exchange in the conversation, oldest first.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// "user" or "agent".
    pub sender: String,
    pub content: String,
}

/// What the capability produced for one inbound message.
#[derive(Debug, Clone)]
pub struct GeneratedReply {
    pub content: String,
    /// 0.0–1.0, see [`confidence_score`].
    pub confidence_score: f64,
    pub should_escalate: bool,
}

/// The external reply-generation capability.
///
/// Errors are never retried by the core; the worker converts them into a
/// degraded, escalated reply.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(
        &self,
        content: &str,
        history: &[HistoryEntry],
        channel: Channel,
    ) -> Result<GeneratedReply>;
}

// ---------------------------------------------------------------------------
// Heuristics
// ---------------------------------------------------------------------------

const UNCERTAINTY_PHRASES: &[&str] = &[
    "i don't know",
    "i'm not sure",
    "i can't help",
    "contact support",
    "escalate",
    "not certain",
    "might be",
    "possibly",
    "perhaps",
];

const ACTIONABLE_WORDS: &[&str] = &["step", "first", "next", "here's how", "solution"];

const ESCALATION_KEYWORDS: &[&str] = &[
    "speak to human",
    "talk to manager",
    "human agent",
    "real person",
    "customer service representative",
    "escalate",
    "complaint",
    "urgent",
    "emergency",
];

const SENSITIVE_KEYWORDS: &[&str] = &[
    "refund",
    "billing issue",
    "account closed",
    "legal",
    "lawsuit",
    "fraud",
    "security breach",
    "data breach",
    "privacy concern",
];

/// Score a generated reply: base 0.8, minus 0.2 per uncertainty phrase,
/// plus 0.1 for actionable phrasing, minus 0.1 for very short (<10 words)
/// or very long (>200 words) replies. Clamped to [0, 1].
pub fn confidence_score(reply: &str) -> f64 {
    let lower = reply.to_lowercase();
    let mut score: f64 = 0.8;

    let uncertainty = UNCERTAINTY_PHRASES
        .iter()
        .filter(|p| lower.contains(**p))
        .count();
    score -= uncertainty as f64 * 0.2;

    if ACTIONABLE_WORDS.iter().any(|w| lower.contains(*w)) {
        score += 0.1;
    }

    let words = reply.split_whitespace().count();
    if words < 10 {
        score -= 0.1;
    }
    if words > 200 {
        score -= 0.1;
    }

    (score.clamp(0.0, 1.0) * 100.0).round() / 100.0
}

/// Whether the exchange needs a human: low confidence, an explicit or
/// sensitive request in the inbound message, or a reply that itself points
/// at support.
pub fn should_escalate(inbound: &str, reply: &str, confidence: f64) -> bool {
    if confidence < 0.6 {
        return true;
    }

    let inbound_lower = inbound.to_lowercase();
    if ESCALATION_KEYWORDS.iter().any(|k| inbound_lower.contains(*k))
        || SENSITIVE_KEYWORDS.iter().any(|k| inbound_lower.contains(*k))
    {
        return true;
    }

    let reply_lower = reply.to_lowercase();
    ["contact support", "human agent", "escalate"]
        .iter()
        .any(|p| reply_lower.contains(*p))
}

// ---------------------------------------------------------------------------
// Rig-backed generator
// ---------------------------------------------------------------------------

/// Create an Anthropic client from a secret API key.
///
/// # Errors
/// Returns an error if the underlying HTTP client cannot be constructed.
pub fn anthropic_client(
    api_key: &SecretString,
) -> Result<rig::providers::anthropic::Client> {
    rig::providers::anthropic::Client::new(api_key.expose_secret())
        .map_err(|e| Error::Generation(format!("failed to create Anthropic client: {e}")))
}

/// Production [`ReplyGenerator`] over rig-core.
pub struct RigGenerator {
    client: rig::providers::anthropic::Client,
    model: String,
}

impl RigGenerator {
    pub fn new(api_key: &SecretString, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: anthropic_client(api_key)?,
            model: model.into(),
        })
    }

    fn preamble(channel: Channel) -> &'static str {
        match channel {
            Channel::Chat => {
                "You are a customer service agent replying in a live chat. \
                 Be professional but warm, keep replies under 150 words, and \
                 aim to resolve the customer's issue in the first response. \
                 If you don't know something, admit it and offer to escalate."
            }
            Channel::Email => {
                "You are a customer service agent replying to an email. \
                 Write a complete, well-structured reply with a greeting and \
                 sign-off. Provide specific, actionable information, and \
                 offer to escalate anything you cannot resolve."
            }
            Channel::Voice => {
                "You are a customer service agent whose reply will be spoken \
                 aloud. Use short, natural sentences with no formatting or \
                 lists. If the issue is complex, offer to connect the caller \
                 with a human agent."
            }
        }
    }
}

#[async_trait]
impl ReplyGenerator for RigGenerator {
    async fn generate(
        &self,
        content: &str,
        history: &[HistoryEntry],
        channel: Channel,
    ) -> Result<GeneratedReply> {
        use rig::client::CompletionClient;
        use rig::completion::Prompt;

        let mut preamble = Self::preamble(channel).to_string();
        if !history.is_empty() {
            preamble.push_str("\n\nConversation so far:\n");
            // Last 10 exchanges are enough context
            for entry in history.iter().rev().take(10).rev() {
                preamble.push_str(&format!("{}: {}\n", entry.sender, entry.content));
            }
        }

        let agent = self
            .client
            .agent(&self.model)
            .preamble(&preamble)
            .build();

        let text = agent
            .prompt(content)
            .await
            .map_err(|e| Error::Generation(e.to_string()))?;

        let confidence = confidence_score(&text);
        let escalate = should_escalate(content, &text, confidence);

        Ok(GeneratedReply {
            content: text.trim().to_string(),
            confidence_score: confidence,
            should_escalate: escalate,
        })
    }
}
