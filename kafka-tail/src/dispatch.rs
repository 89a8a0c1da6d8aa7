//! Routes records from the upstream stream to output.

use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::format::FormatOptions;
use crate::metrics_consts::RECEIVE_ERRORS;
use crate::output::Output;
use crate::source::RecordStream;
use crate::stats::ConsumptionStats;
use crate::worker::{render_blocking, WorkerPool};

/// How records are assigned to output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// No pool: the dispatcher renders each record itself, in stream order.
    #[default]
    Inline,
    /// A fixed pool fed in cyclic order, independent of which workers are busy.
    RoundRobin { workers: NonZeroUsize },
}

/// Cyclic worker assignment: the k-th call returns `k mod size`.
#[derive(Debug, Clone)]
pub struct RoundRobin {
    size: usize,
    next: usize,
}

impl RoundRobin {
    pub fn new(size: NonZeroUsize) -> Self {
        Self {
            size: size.get(),
            next: 0,
        }
    }

    pub fn next_worker(&mut self) -> usize {
        let worker = self.next;
        self.next = (self.next + 1) % self.size;
        worker
    }
}

/// Why intake stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupted,
    StreamEnded,
    WorkerGone,
}

enum Target {
    Inline,
    Pool {
        pool: WorkerPool,
        schedule: RoundRobin,
    },
}

pub struct Dispatcher {
    target: Target,
    options: FormatOptions,
    output: Arc<dyn Output>,
    stats: ConsumptionStats,
}

impl Dispatcher {
    /// Build the dispatcher, spawning the worker pool if the mode has one.
    pub fn new(
        mode: DispatchMode,
        options: FormatOptions,
        output: Arc<dyn Output>,
        stats: ConsumptionStats,
    ) -> Self {
        let target = match mode {
            DispatchMode::Inline => Target::Inline,
            DispatchMode::RoundRobin { workers } => Target::Pool {
                pool: WorkerPool::spawn(workers, options, output.clone()),
                schedule: RoundRobin::new(workers),
            },
        };
        Self {
            target,
            options,
            output,
            stats,
        }
    }

    /// Pull records until `shutdown` fires or the stream ends.
    ///
    /// The interrupt is polled first on every iteration so a busy stream cannot
    /// starve it. A record already taken from the stream is always handed off
    /// before the interrupt is looked at again.
    pub async fn run(
        &mut self,
        stream: &mut dyn RecordStream,
        shutdown: &CancellationToken,
    ) -> StopReason {
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("interrupt received, stopping intake");
                    return StopReason::Interrupted;
                }
                next = stream.recv() => next,
            };

            let record = match next {
                Some(Ok(record)) => record,
                Some(Err(e)) => {
                    metrics::counter!(RECEIVE_ERRORS).increment(1);
                    warn!(topic = stream.topic(), error = ?e, "failed to receive record");
                    continue;
                }
                None => {
                    info!(topic = stream.topic(), "stream ended");
                    return StopReason::StreamEnded;
                }
            };

            self.stats.record_consumed();

            match &mut self.target {
                Target::Inline => {
                    render_blocking(0, record, self.options, self.output.clone()).await
                }
                Target::Pool { pool, schedule } => {
                    let worker = schedule.next_worker();
                    if pool.deliver(worker, record).await.is_err() {
                        error!(worker, "worker stopped accepting records");
                        return StopReason::WorkerGone;
                    }
                }
            }
        }
    }

    /// Stop the workers after intake has ended, waiting for in-flight records.
    pub async fn drain(self) -> Result<(), JoinError> {
        match self.target {
            Target::Inline => Ok(()),
            Target::Pool { pool, .. } => {
                debug!(workers = pool.size(), "draining worker pool");
                pool.shutdown().await
            }
        }
    }
}
