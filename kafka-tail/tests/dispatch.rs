use std::future::pending;
use std::io;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kafka_tail::config::{Config, KafkaClientConfig};
use kafka_tail::dispatch::{DispatchMode, Dispatcher, StopReason};
use kafka_tail::format::FormatOptions;
use kafka_tail::lifecycle::{self, State};
use kafka_tail::output::Output;
use kafka_tail::record::{OffsetPolicy, Record};
use kafka_tail::source::MessageLog;
use kafka_tail::stats::ConsumptionStats;
use kafka_tail::test_utils::{CapturedOutput, MemoryLog};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const PLAIN: FormatOptions = FormatOptions {
    pretty_json: false,
    color: false,
};

fn config(dispatch: DispatchMode) -> Config {
    Config {
        topic: "orders".to_string(),
        brokers: vec!["memory:9092".to_string()],
        group: "kafka-tail".to_string(),
        partition: 0,
        offset_policy: OffsetPolicy::Oldest,
        format: PLAIN,
        dispatch,
        verbose: false,
        client: KafkaClientConfig::default(),
    }
}

fn pool(workers: usize) -> DispatchMode {
    DispatchMode::RoundRobin {
        workers: NonZeroUsize::new(workers).unwrap(),
    }
}

fn numbered(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| Record::new("orders", 0, i as i64, i.to_string()))
        .collect()
}

async fn consume_all(dispatch: DispatchMode, records: Vec<Record>) -> (u64, Arc<CapturedOutput>) {
    let log = MemoryLog::with_records("orders", records);
    let output = Arc::new(CapturedOutput::default());

    let report = timeout(
        Duration::from_secs(10),
        lifecycle::run(&log, &config(dispatch), output.clone(), pending()),
    )
    .await
    .expect("run did not finish")
    .expect("run failed");

    assert_eq!(report.stop_reason, StopReason::StreamEnded);
    assert_eq!(report.state, State::Closed);
    assert_eq!(log.close_count(), 1);
    (report.consumed, output)
}

#[tokio::test]
async fn worker_i_gets_every_pth_record_starting_at_i() {
    for (n, p) in [(0, 1), (1, 3), (7, 1), (10, 3), (12, 4), (5, 8), (64, 7)] {
        let (consumed, output) = consume_all(pool(p), numbered(n)).await;
        assert_eq!(consumed, n as u64);
        assert_eq!(output.lines().len(), n);

        for worker in 0..p {
            let expected: Vec<String> = (worker..n).step_by(p).map(|i| i.to_string()).collect();
            assert_eq!(
                output.values_for(worker),
                expected,
                "worker {worker} of {p} with {n} records"
            );
        }
    }
}

#[tokio::test]
async fn inline_dispatch_preserves_stream_order() {
    let (consumed, output) = consume_all(DispatchMode::Inline, numbered(25)).await;
    assert_eq!(consumed, 25);

    let expected: Vec<String> = (0..25).map(|i| i.to_string()).collect();
    assert_eq!(output.values_for(0), expected);
}

#[tokio::test]
async fn single_worker_pool_matches_inline_output() {
    let (_, inline) = consume_all(DispatchMode::Inline, numbered(15)).await;
    let (_, pooled) = consume_all(pool(1), numbered(15)).await;
    assert_eq!(inline.text(), pooled.text());
}

#[tokio::test]
async fn empty_stream_consumes_nothing() {
    for mode in [DispatchMode::Inline, pool(3)] {
        let (consumed, output) = consume_all(mode, Vec::new()).await;
        assert_eq!(consumed, 0);
        assert!(output.lines().is_empty());
    }
}

#[tokio::test]
async fn receive_errors_are_skipped() {
    let (log, feed) = MemoryLog::with_feed("orders");
    feed.push(Record::new("orders", 0, 0, "a"));
    feed.push_error(kafka_tail::error::LogError::Receive {
        topic: "orders".to_string(),
        source: rdkafka::error::KafkaError::Canceled,
    });
    feed.push(Record::new("orders", 0, 1, "b"));
    drop(feed);

    let output = Arc::new(CapturedOutput::default());
    let stats = ConsumptionStats::new();
    let mut dispatcher = Dispatcher::new(pool(2), PLAIN, output.clone(), stats.clone());
    let mut stream = log
        .open_stream("orders", 0, OffsetPolicy::Oldest)
        .await
        .unwrap();

    let reason = dispatcher.run(stream.as_mut(), &CancellationToken::new()).await;
    dispatcher.drain().await.unwrap();
    stream.close().await.unwrap();

    assert_eq!(reason, StopReason::StreamEnded);
    assert_eq!(stats.consumed(), 2);
    assert_eq!(output.values_for(0), vec!["a".to_string()]);
    assert_eq!(output.values_for(1), vec!["b".to_string()]);
}

#[tokio::test]
async fn cancelled_token_stops_intake_before_the_next_record() {
    let log = MemoryLog::with_records("orders", numbered(3));
    let output = Arc::new(CapturedOutput::default());
    let stats = ConsumptionStats::new();
    let mut dispatcher =
        Dispatcher::new(DispatchMode::Inline, PLAIN, output.clone(), stats.clone());
    let mut stream = log
        .open_stream("orders", 0, OffsetPolicy::Oldest)
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let reason = dispatcher.run(stream.as_mut(), &shutdown).await;
    dispatcher.drain().await.unwrap();
    stream.close().await.unwrap();

    assert_eq!(reason, StopReason::Interrupted);
    assert_eq!(stats.consumed(), 0);
    assert!(output.lines().is_empty());
}

/// Cancels `shutdown` as it writes line number `after`.
struct CancelAfter {
    after: usize,
    written: AtomicUsize,
    shutdown: CancellationToken,
    inner: CapturedOutput,
}

impl Output for CancelAfter {
    fn write_line(&self, worker: usize, line: &str) -> io::Result<()> {
        self.inner.write_line(worker, line)?;
        if self.written.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
            self.shutdown.cancel();
        }
        Ok(())
    }
}

#[tokio::test]
async fn interrupt_mid_stream_leaves_queued_records_untouched() {
    let (log, feed) = MemoryLog::with_feed("orders");
    for record in numbered(10) {
        feed.push(record);
    }

    let shutdown = CancellationToken::new();
    let output = Arc::new(CancelAfter {
        after: 3,
        written: AtomicUsize::new(0),
        shutdown: shutdown.clone(),
        inner: CapturedOutput::default(),
    });
    let stats = ConsumptionStats::new();
    let mut dispatcher =
        Dispatcher::new(DispatchMode::Inline, PLAIN, output.clone(), stats.clone());
    let mut stream = log
        .open_stream("orders", 0, OffsetPolicy::Oldest)
        .await
        .unwrap();

    let reason = timeout(
        Duration::from_secs(10),
        dispatcher.run(stream.as_mut(), &shutdown),
    )
    .await
    .expect("dispatcher ignored the interrupt");
    dispatcher.drain().await.unwrap();
    stream.close().await.unwrap();

    assert_eq!(reason, StopReason::Interrupted);
    assert_eq!(stats.consumed(), 3);
    assert_eq!(output.inner.values_for(0), vec!["0", "1", "2"]);
    assert_eq!(log.close_count(), 1);
    // Records 3..10 were still queued and are never taken.
    assert!(!feed.push(Record::new("orders", 0, 10, "late")));
}
