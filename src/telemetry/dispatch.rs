//! Dispatch span helpers.
//!
//! Provides span creation for work items flowing from the work stream
//! through a worker to the result stream.

use tracing::Span;

use crate::model::{Channel, ItemId};

/// Start a span covering one item's dispatch: assignment, generation,
/// reply publish, ack.
pub fn start_item_span(channel: Channel, item_id: &ItemId, worker_id: &str) -> Span {
    tracing::info_span!(
        "item.dispatch",
        "item.channel" = %channel,
        "item.id" = %item_id,
        "worker.id" = worker_id,
    )
}
