//! Dispatch loop tests: publish-before-ack ordering, pending requeue,
//! poison entries, degraded replies.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{EchoGenerator, FailingGenerator, GatedGenerator, test_orchestrator, wait_until};
use courier_rs::model::NewWorkItem;
use courier_rs::queue::{MemoryStream, MessageStream};
use serde_json::json;

const WORK: &str = "work_items";
const RESULTS: &str = "reply_results";
const GROUP: &str = "reply_workers";

#[tokio::test]
async fn reply_is_published_before_the_delivery_is_acked() {
    let queue = Arc::new(MemoryStream::new());
    let (generator, gate) = GatedGenerator::new();
    let orchestrator = Arc::new(test_orchestrator(
        Arc::clone(&queue),
        Arc::new(generator),
        1,
        1,
    ));
    orchestrator.start();

    let submitter = Arc::clone(&orchestrator);
    let submit = tokio::spawn(async move {
        submitter
            .submit(
                NewWorkItem::new("conv-1", "hold this open"),
                Duration::from_secs(5),
            )
            .await
    });

    // While the worker sits inside the generator, the delivery must stay
    // pending and no reply may be visible yet.
    let q = Arc::clone(&queue);
    wait_until(Duration::from_secs(2), || {
        let q = Arc::clone(&q);
        async move { q.pending_count(WORK, GROUP).await.unwrap() == 1 }
    })
    .await;
    assert!(queue.read_all(RESULTS).await.unwrap().is_empty());

    gate.add_permits(1);
    let reply = submit.await.unwrap().unwrap();
    assert!(reply.content.contains("hold this open"));

    // Ack happened after the publish: nothing pending once the reply is out
    let q = Arc::clone(&queue);
    wait_until(Duration::from_secs(2), || {
        let q = Arc::clone(&q);
        async move { q.pending_count(WORK, GROUP).await.unwrap() == 0 }
    })
    .await;

    orchestrator.stop().await;
}

#[tokio::test]
async fn item_with_no_idle_worker_waits_and_completes_later() {
    // Default claim window: an unassigned delivery comes back on the next
    // pass regardless.
    let queue = Arc::new(MemoryStream::new());
    let (generator, gate) = GatedGenerator::new();
    let orchestrator = Arc::new(test_orchestrator(
        Arc::clone(&queue),
        Arc::new(generator),
        1,
        1,
    ));
    orchestrator.start();

    let first_submitter = Arc::clone(&orchestrator);
    let first = tokio::spawn(async move {
        first_submitter
            .submit(NewWorkItem::new("conv-1", "first"), Duration::from_secs(5))
            .await
    });

    // Wait until the only worker is occupied, then submit a second item
    let o = Arc::clone(&orchestrator);
    wait_until(Duration::from_secs(2), || {
        let o = Arc::clone(&o);
        async move { o.pool_status().busy == 1 }
    })
    .await;

    let second_submitter = Arc::clone(&orchestrator);
    let second = tokio::spawn(async move {
        second_submitter
            .submit(NewWorkItem::new("conv-1", "second"), Duration::from_secs(5))
            .await
    });

    // Release both: the first finishes, the pending second gets the freed
    // worker on a later pass.
    gate.add_permits(2);

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert!(first.content.contains("first"));
    assert!(second.content.contains("second"));

    orchestrator.stop().await;
}

#[tokio::test]
async fn item_skipped_in_a_full_batch_is_redelivered_promptly() {
    // Two items land in one batch against a single worker; the skipped one
    // must complete well inside the default claim window once the worker
    // frees up.
    let queue = Arc::new(MemoryStream::new());
    let (generator, gate) = GatedGenerator::new();
    let orchestrator = Arc::new(test_orchestrator(
        Arc::clone(&queue),
        Arc::new(generator),
        1,
        1,
    ));

    // Appended before the first read, so both arrive in the same batch
    let first = NewWorkItem::new("conv-1", "first").build();
    let second = NewWorkItem::new("conv-1", "second").build();
    queue
        .append(WORK, &serde_json::to_value(&first).unwrap())
        .await
        .unwrap();
    queue
        .append(WORK, &serde_json::to_value(&second).unwrap())
        .await
        .unwrap();

    orchestrator.start();

    let o = Arc::clone(&orchestrator);
    wait_until(Duration::from_secs(2), || {
        let o = Arc::clone(&o);
        async move { o.pool_status().busy == 1 }
    })
    .await;

    gate.add_permits(2);

    let q = Arc::clone(&queue);
    wait_until(Duration::from_secs(2), || {
        let q = Arc::clone(&q);
        async move { q.read_all(RESULTS).await.unwrap().len() == 2 }
    })
    .await;

    orchestrator.stop().await;
}

#[tokio::test]
async fn poison_entry_is_dropped_without_wedging_the_group() {
    let queue = Arc::new(MemoryStream::new());
    let orchestrator = Arc::new(test_orchestrator(
        Arc::clone(&queue),
        Arc::new(EchoGenerator),
        2,
        10,
    ));
    orchestrator.start();

    queue
        .append(WORK, &json!({"not": "a work item"}))
        .await
        .unwrap();

    // A valid item behind the poison entry still gets through
    let reply = orchestrator
        .submit(NewWorkItem::new("conv-1", "real one"), Duration::from_secs(5))
        .await
        .unwrap();
    assert!(reply.content.contains("real one"));

    let q = Arc::clone(&queue);
    wait_until(Duration::from_secs(2), || {
        let q = Arc::clone(&q);
        async move { q.pending_count(WORK, GROUP).await.unwrap() == 0 }
    })
    .await;

    orchestrator.stop().await;
}

#[tokio::test]
async fn degraded_reply_is_still_published_and_acked() {
    let queue = Arc::new(MemoryStream::new());
    let orchestrator = Arc::new(test_orchestrator(
        Arc::clone(&queue),
        Arc::new(FailingGenerator),
        1,
        10,
    ));
    orchestrator.start();

    let reply = orchestrator
        .submit(NewWorkItem::new("conv-1", "please help"), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(reply.confidence_score, 0.0);
    assert!(reply.escalated);
    assert!(!reply.error.as_deref().unwrap_or("").is_empty());

    // The item was not left stuck
    let q = Arc::clone(&queue);
    wait_until(Duration::from_secs(2), || {
        let q = Arc::clone(&q);
        async move { q.pending_count(WORK, GROUP).await.unwrap() == 0 }
    })
    .await;

    orchestrator.stop().await;
}
