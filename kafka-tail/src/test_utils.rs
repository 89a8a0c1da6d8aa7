//! In-memory stand-ins for the broker and the terminal, shared by unit and integration tests.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use tokio::sync::mpsc;

use crate::error::LogError;
use crate::output::Output;
use crate::record::{OffsetPolicy, Record};
use crate::source::{MessageLog, RecordStream};

type Feed = mpsc::UnboundedReceiver<Result<Record, LogError>>;

/// A single-partition log whose records come from a test-controlled channel.
pub struct MemoryLog {
    topics: Vec<String>,
    topic: String,
    feed: Mutex<Option<Feed>>,
    opened_with: Mutex<Option<OffsetPolicy>>,
    closes: Arc<AtomicUsize>,
    fail_close: bool,
    reachable: bool,
}

/// Producer side of a `MemoryLog`. Dropping it ends the stream.
#[derive(Clone)]
pub struct RecordFeed {
    sender: mpsc::UnboundedSender<Result<Record, LogError>>,
}

impl RecordFeed {
    /// Returns false once the consuming stream has been closed.
    pub fn push(&self, record: Record) -> bool {
        self.sender.send(Ok(record)).is_ok()
    }

    pub fn push_error(&self, error: LogError) -> bool {
        self.sender.send(Err(error)).is_ok()
    }
}

impl MemoryLog {
    /// A log that can be fed while it is being consumed.
    pub fn with_feed(topic: &str) -> (Self, RecordFeed) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let log = Self {
            topics: vec![topic.to_string()],
            topic: topic.to_string(),
            feed: Mutex::new(Some(receiver)),
            opened_with: Mutex::new(None),
            closes: Arc::new(AtomicUsize::new(0)),
            fail_close: false,
            reachable: true,
        };
        (log, RecordFeed { sender })
    }

    /// A log holding exactly `records`; its stream ends after the last one.
    pub fn with_records(topic: &str, records: Vec<Record>) -> Self {
        let (log, feed) = Self::with_feed(topic);
        for record in records {
            feed.push(record);
        }
        log
    }

    pub fn with_extra_topics(mut self, topics: &[&str]) -> Self {
        self.topics.extend(topics.iter().map(|t| t.to_string()));
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn opened_with(&self) -> Option<OffsetPolicy> {
        *self.opened_with.lock().expect("lock poisoned")
    }

    fn connection_error(&self) -> LogError {
        LogError::Connection {
            brokers: "memory".to_string(),
            source: KafkaError::MetadataFetch(RDKafkaErrorCode::BrokerTransportFailure),
        }
    }
}

#[async_trait]
impl MessageLog for MemoryLog {
    async fn list_topics(&self) -> Result<Vec<String>, LogError> {
        if !self.reachable {
            return Err(self.connection_error());
        }
        let mut topics = self.topics.clone();
        topics.sort();
        Ok(topics)
    }

    async fn open_stream(
        &self,
        topic: &str,
        partition: i32,
        policy: OffsetPolicy,
    ) -> Result<Box<dyn RecordStream>, LogError> {
        if !self.reachable {
            return Err(self.connection_error());
        }
        if topic != self.topic {
            return Err(LogError::TopicNotFound {
                topic: topic.to_string(),
            });
        }
        if partition != 0 {
            return Err(LogError::PartitionNotFound {
                topic: topic.to_string(),
                partition,
            });
        }

        let receiver = self
            .feed
            .lock()
            .expect("lock poisoned")
            .take()
            .expect("memory log streams can only be opened once");
        *self.opened_with.lock().expect("lock poisoned") = Some(policy);

        Ok(Box::new(MemoryStream {
            topic: topic.to_string(),
            receiver,
            closes: self.closes.clone(),
            fail_close: self.fail_close,
        }))
    }
}

struct MemoryStream {
    topic: String,
    receiver: Feed,
    closes: Arc<AtomicUsize>,
    fail_close: bool,
}

#[async_trait]
impl RecordStream for MemoryStream {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn recv(&mut self) -> Option<Result<Record, LogError>> {
        self.receiver.recv().await
    }

    async fn close(self: Box<Self>) -> Result<(), LogError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(LogError::Close {
                topic: self.topic.clone(),
                source: KafkaError::Canceled,
            });
        }
        Ok(())
    }
}

/// Collects rendered lines together with the worker that wrote them.
#[derive(Default)]
pub struct CapturedOutput {
    lines: Mutex<Vec<(usize, String)>>,
}

impl CapturedOutput {
    pub fn lines(&self) -> Vec<(usize, String)> {
        self.lines.lock().expect("lock poisoned").clone()
    }

    /// Rendered text only, in write order.
    pub fn text(&self) -> Vec<String> {
        self.lines().into_iter().map(|(_, line)| line).collect()
    }

    /// The `value:` field of every line written by `worker`, in write order.
    pub fn values_for(&self, worker: usize) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(w, _)| *w == worker)
            .map(|(_, line)| value_field(&line).to_string())
            .collect()
    }
}

impl Output for CapturedOutput {
    fn write_line(&self, worker: usize, line: &str) -> io::Result<()> {
        self.lines
            .lock()
            .expect("lock poisoned")
            .push((worker, line.to_string()));
        Ok(())
    }
}

/// Everything after the first `value: ` in a rendered line.
pub fn value_field(line: &str) -> &str {
    line.split_once("value: ").map_or("", |(_, value)| value)
}
