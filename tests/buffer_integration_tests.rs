// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use tailrelay::bounded_channel::{BoundedReceiver, bounded};
use tailrelay::buffer::{AdaptiveBuffer, BufferConfig, BufferPolicy};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

// Far beyond any test, so only size, stop, or input closure can flush
const NEVER: Duration = Duration::from_secs(3600);
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

fn new_buffer(max_size: usize, flush_interval: Duration, policy: BufferPolicy) -> AdaptiveBuffer<String> {
    let config = BufferConfig::new(max_size, flush_interval, policy);
    AdaptiveBuffer::new(config, &CancellationToken::new()).unwrap()
}

async fn send_all(buffer: &AdaptiveBuffer<String>, values: &[&str]) {
    let input = buffer.input();
    for v in values {
        input.send(v.to_string()).await.unwrap();
    }
}

/// Let the buffer task take everything queued so far into its batch.
async fn settle() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

/// Read until the output closes.
async fn drain(mut out: BoundedReceiver<String>) -> Vec<String> {
    let mut values = Vec::new();
    loop {
        match timeout(RECV_TIMEOUT, out.next()).await {
            Ok(Some(v)) => values.push(v),
            Ok(None) => return values,
            Err(_) => panic!("output did not close, received so far: {:?}", values),
        }
    }
}

#[tokio::test]
async fn test_drop_new_discards_overflow() {
    let buffer = new_buffer(2, NEVER, BufferPolicy::DropNew);
    let out = buffer.output();
    buffer.start();

    send_all(&buffer, &["1", "2", "3"]).await;
    settle().await;
    buffer.stop().await;

    assert_eq!(drain(out).await, vec!["1", "2"]);
}

#[tokio::test]
async fn test_drop_oldest_evicts_first() {
    let buffer = new_buffer(2, NEVER, BufferPolicy::DropOldest);
    let out = buffer.output();
    buffer.start();

    send_all(&buffer, &["1", "2", "3"]).await;
    settle().await;
    buffer.stop().await;

    assert_eq!(drain(out).await, vec!["2", "3"]);
}

#[tokio::test]
async fn test_block_on_full_flushes_when_batch_fills() {
    let buffer = new_buffer(2, NEVER, BufferPolicy::BlockOnFull);
    let mut out = buffer.output();
    buffer.start();

    send_all(&buffer, &["1", "2"]).await;

    // No tick and no stop: only the size trigger can deliver these
    let first = timeout(Duration::from_millis(500), out.next()).await.unwrap();
    assert_eq!(first, Some("1".to_string()));
    let second = timeout(Duration::from_millis(500), out.next()).await.unwrap();
    assert_eq!(second, Some("2".to_string()));

    buffer.stop().await;
    assert_eq!(out.next().await, None);
}

#[tokio::test(flavor = "current_thread")]
async fn test_pending_value_survives_stop() {
    let buffer = new_buffer(10, NEVER, BufferPolicy::DropNew);
    let out = buffer.output();
    buffer.start();

    // Still queued in the input when stop runs: the task has not been polled yet
    buffer.input().try_send("pending".to_string()).unwrap();
    buffer.stop().await;

    assert_eq!(drain(out).await, vec!["pending"]);
}

#[tokio::test(flavor = "current_thread")]
async fn test_stop_absorbs_queued_values_while_room_remains() {
    let buffer = new_buffer(4, NEVER, BufferPolicy::DropOldest);
    let out = buffer.output();
    buffer.start();

    send_all(&buffer, &["1"]).await;
    settle().await;

    let input = buffer.input();
    input.try_send("2".to_string()).unwrap();
    input.try_send("3".to_string()).unwrap();
    buffer.stop().await;

    assert_eq!(drain(out).await, vec!["1", "2", "3"]);
}

#[tokio::test(flavor = "current_thread")]
async fn test_stop_drops_queued_values_beyond_capacity() {
    // (policy, batched before stop, still queued at stop)
    let cases: [(BufferPolicy, &[&str], &[&str]); 4] = [
        (BufferPolicy::DropOldest, &["1", "2"], &["3"]),
        (BufferPolicy::DropNew, &["1", "2"], &["3"]),
        (BufferPolicy::DropNew, &["1"], &["2", "3"]),
        (BufferPolicy::BlockOnFull, &["1"], &["2", "3"]),
    ];

    for (policy, batched, queued) in cases {
        let buffer = new_buffer(2, NEVER, policy);
        let out = buffer.output();
        buffer.start();

        send_all(&buffer, batched).await;
        settle().await;

        let input = buffer.input();
        for v in queued {
            input.try_send(v.to_string()).unwrap();
        }
        buffer.stop().await;

        // Already batched values are never displaced, queued ones fill what is left
        assert_eq!(drain(out).await, vec!["1", "2"], "{policy}");
    }
}

#[tokio::test]
async fn test_interval_flush() {
    let buffer = new_buffer(10, Duration::from_millis(50), BufferPolicy::DropNew);
    let mut out = buffer.output();
    buffer.start();

    send_all(&buffer, &["a", "b"]).await;

    let a = timeout(Duration::from_millis(500), out.next()).await.unwrap();
    let b = timeout(Duration::from_millis(500), out.next()).await.unwrap();
    assert_eq!((a, b), (Some("a".to_string()), Some("b".to_string())));

    buffer.stop().await;
}

#[tokio::test]
async fn test_stop_twice() {
    let buffer = new_buffer(4, NEVER, BufferPolicy::BlockOnFull);
    let out = buffer.output();
    buffer.start();

    send_all(&buffer, &["x"]).await;
    buffer.stop().await;
    buffer.stop().await;

    assert_eq!(drain(out).await, vec!["x"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stop() {
    let buffer = Arc::new(new_buffer(4, NEVER, BufferPolicy::BlockOnFull));
    let out = buffer.output();
    buffer.start();
    send_all(&buffer, &["x", "y"]).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let buffer = buffer.clone();
        handles.push(tokio::spawn(async move { buffer.stop().await }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Every stop returned, so the output is already closed
    assert_eq!(drain(out).await, vec!["x", "y"]);
}

#[tokio::test]
async fn test_parent_cancel_closes_output() {
    let parent = CancellationToken::new();
    let config = BufferConfig::new(4, NEVER, BufferPolicy::DropOldest);
    let buffer: AdaptiveBuffer<String> = AdaptiveBuffer::new(config, &parent).unwrap();
    let out = buffer.output();
    buffer.start();

    send_all(&buffer, &["a"]).await;
    parent.cancel();

    assert_eq!(drain(out).await, vec!["a"]);
    buffer.stop().await;
}

#[tokio::test]
async fn test_dropping_buffer_flushes_and_closes() {
    let buffer = new_buffer(4, NEVER, BufferPolicy::DropNew);
    let out = buffer.output();
    buffer.start();

    send_all(&buffer, &["a", "b"]).await;
    drop(buffer);

    assert_eq!(drain(out).await, vec!["a", "b"]);
}

#[tokio::test]
async fn test_injected_queues() {
    let (in_tx, in_rx) = bounded(8);
    let (out_tx, out_rx) = bounded(8);

    let buffer = new_buffer(3, NEVER, BufferPolicy::BlockOnFull)
        .with_input((in_tx.clone(), in_rx))
        .with_output((out_tx, out_rx.clone()));
    assert_eq!(buffer.input().capacity(), Some(8));
    buffer.start();

    for v in ["1", "2", "3"] {
        in_tx.send(v.to_string()).await.unwrap();
    }
    drop(in_tx);

    let mut out = out_rx;
    for expected in ["1", "2", "3"] {
        let v = timeout(Duration::from_millis(500), out.next()).await.unwrap();
        assert_eq!(v.as_deref(), Some(expected));
    }

    buffer.stop().await;
    assert_eq!(out.next().await, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_output_is_ordered_subsequence_of_input() {
    for policy in [
        BufferPolicy::BlockOnFull,
        BufferPolicy::DropNew,
        BufferPolicy::DropOldest,
    ] {
        let buffer = new_buffer(4, Duration::from_millis(5), policy);
        let out = buffer.output();
        buffer.start();

        let reader = tokio::spawn(drain(out));

        let input = buffer.input();
        for i in 0..200u32 {
            input.send(format!("{:03}", i)).await.unwrap();
        }
        buffer.stop().await;

        let received = reader.await.unwrap();
        assert!(received.len() <= 200, "{policy}: output amplified input");
        assert!(
            received.windows(2).all(|w| w[0] < w[1]),
            "{policy}: output reordered: {:?}",
            received
        );
    }
}
