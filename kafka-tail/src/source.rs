//! The broker collaborator as seen by the dispatch core.

use async_trait::async_trait;

use crate::error::LogError;
use crate::record::{OffsetPolicy, Record};

/// A partitioned, offset-addressed log that can be listed and streamed from.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Names of every topic the cluster knows about, sorted.
    async fn list_topics(&self) -> Result<Vec<String>, LogError>;

    /// Open an ordered stream over one partition of `topic`, starting where `policy` says.
    async fn open_stream(
        &self,
        topic: &str,
        partition: i32,
        policy: OffsetPolicy,
    ) -> Result<Box<dyn RecordStream>, LogError>;
}

/// An open subscription to a single partition.
///
/// `recv` must be cancel safe: the dispatcher races it against the interrupt
/// and drops the future when the interrupt wins.
#[async_trait]
pub trait RecordStream: Send {
    fn topic(&self) -> &str;

    /// Next record in partition order. `None` means the stream has ended and
    /// will never yield again; live brokers never end.
    async fn recv(&mut self) -> Option<Result<Record, LogError>>;

    /// Release the subscription. Consumes the stream so it can only happen once.
    async fn close(self: Box<Self>) -> Result<(), LogError>;
}
