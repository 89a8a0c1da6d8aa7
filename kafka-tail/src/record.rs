use chrono::{DateTime, Utc};
use rdkafka::message::Message;

/// One message read from the log, detached from the client's buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Broker or producer timestamp, absent when the message carries none.
    pub timestamp: Option<DateTime<Utc>>,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            timestamp: None,
            payload: payload.into(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Copy a client message into an owned record. A missing payload becomes empty.
    pub fn from_message<M: Message>(message: &M) -> Self {
        Self {
            topic: message.topic().to_owned(),
            partition: message.partition(),
            offset: message.offset(),
            timestamp: message
                .timestamp()
                .to_millis()
                .and_then(DateTime::<Utc>::from_timestamp_millis),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        }
    }
}

/// Where consumption starts. Resolved once when the stream is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OffsetPolicy {
    /// Oldest retained record in the partition.
    Oldest,
    /// Only records produced after the stream is opened.
    #[default]
    Newest,
}

impl OffsetPolicy {
    pub fn from_beginning(from_beginning: bool) -> Self {
        if from_beginning {
            OffsetPolicy::Oldest
        } else {
            OffsetPolicy::Newest
        }
    }
}
