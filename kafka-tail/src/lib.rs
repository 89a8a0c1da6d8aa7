//! Tail one partition of a Kafka topic to the terminal.
//!
//! Records are pulled by a single dispatcher and either rendered inline or
//! handed round-robin to a fixed pool of output workers. Hand-offs are
//! rendezvous style, so a slow terminal throttles consumption instead of
//! growing a buffer. An interrupt stops intake, lets in-flight records finish,
//! releases the stream and reports how many records were consumed.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod kafka;
pub mod lifecycle;
pub mod metrics_consts;
pub mod output;
pub mod record;
pub mod source;
pub mod stats;
pub mod test_utils;
pub mod worker;
