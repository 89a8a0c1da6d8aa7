//! Process lifecycle: intake until interrupted, drain, release the stream, report.

use std::future::Future;
use std::sync::Arc;

use tokio::task::{self, JoinError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dispatch::{Dispatcher, StopReason};
use crate::error::AppError;
use crate::output::Output;
use crate::source::MessageLog;
use crate::stats::ConsumptionStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Running,
    Draining,
    Closed,
}

/// One-shot `Running -> Draining -> Closed` state machine.
#[derive(Debug)]
pub struct Lifecycle {
    state: State,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: State::Running,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Returns false, leaving the state alone, unless currently `Running`.
    pub fn begin_draining(&mut self) -> bool {
        self.advance(State::Running, State::Draining)
    }

    /// Returns false, leaving the state alone, unless currently `Draining`.
    pub fn close(&mut self) -> bool {
        self.advance(State::Draining, State::Closed)
    }

    fn advance(&mut self, from: State, to: State) -> bool {
        if self.state != from {
            warn!(current = ?self.state, requested = ?to, "ignoring lifecycle transition");
            return false;
        }
        debug!(from = ?from, to = ?to, "lifecycle transition");
        self.state = to;
        true
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub consumed: u64,
    pub stop_reason: StopReason,
    pub state: State,
}

/// Consume `config.topic` from `log` until `interrupt` resolves or the stream ends.
///
/// The consumed count is logged even when releasing the stream fails; that
/// failure is returned afterwards.
pub async fn run<L, F>(
    log: &L,
    config: &Config,
    output: Arc<dyn Output>,
    interrupt: F,
) -> Result<Report, AppError>
where
    L: MessageLog + ?Sized,
    F: Future<Output = ()> + Send + 'static,
{
    if config.verbose {
        let topics = log.list_topics().await?;
        info!("Topics: {}", topics.join(", "));
    }

    let mut stream = log
        .open_stream(&config.topic, config.partition, config.offset_policy)
        .await?;
    info!(
        topic = %config.topic,
        partition = config.partition,
        offset_policy = ?config.offset_policy,
        dispatch = ?config.dispatch,
        "consuming"
    );

    let shutdown = CancellationToken::new();
    let trap = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            interrupt.await;
            shutdown.cancel();
        }
    });

    let mut lifecycle = Lifecycle::new();
    let stats = ConsumptionStats::new();
    let mut dispatcher = Dispatcher::new(config.dispatch, config.format, output, stats.clone());

    let stop_reason = dispatcher.run(stream.as_mut(), &shutdown).await;
    lifecycle.begin_draining();
    trap.abort();

    let drained = dispatcher.drain().await;
    let closed = stream.close().await;
    lifecycle.close();

    let consumed = stats.consumed();
    info!("Consumed: {consumed}");

    match (drained, closed) {
        (Ok(()), Ok(())) => Ok(Report {
            consumed,
            stop_reason,
            state: lifecycle.state(),
        }),
        (Err(e), Ok(())) => Err(e.into()),
        (Ok(()), Err(e)) => Err(e.into()),
        (Err(worker), Err(close)) => {
            error!(error = ?close, "failed to close the stream");
            Err(worker.into())
        }
    }
}

/// Run blocking `work` on the blocking pool unless `shutdown` fires first.
///
/// Returns `Ok(None)` when interrupted. The abandoned work keeps its blocking
/// thread until it returns on its own.
pub async fn blocking_until_interrupted<T, F>(
    shutdown: &CancellationToken,
    work: F,
) -> Result<Option<T>, JoinError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let handle = task::spawn_blocking(work);
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => Ok(None),
        result = handle => result.map(Some),
    }
}

/// Resolves on the first SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT"),
                    _ = sigterm.recv() => info!("received SIGTERM"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    }

    match ctrl_c.await {
        Ok(()) => info!("received SIGINT"),
        Err(e) => {
            error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn transitions_only_move_forward() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), State::Running);

        assert!(!lifecycle.close());
        assert_eq!(lifecycle.state(), State::Running);

        assert!(lifecycle.begin_draining());
        assert!(!lifecycle.begin_draining());
        assert_eq!(lifecycle.state(), State::Draining);

        assert!(lifecycle.close());
        assert_eq!(lifecycle.state(), State::Closed);

        assert!(!lifecycle.begin_draining());
        assert!(!lifecycle.close());
        assert_eq!(lifecycle.state(), State::Closed);
    }

    #[tokio::test]
    async fn interrupt_abandons_blocking_work() {
        let (release, parked) = mpsc::channel::<()>();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let outcome = blocking_until_interrupted(&shutdown, move || parked.recv().is_ok())
            .await
            .unwrap();
        assert_eq!(outcome, None);

        release.send(()).ok();
    }

    #[tokio::test]
    async fn finished_blocking_work_is_returned() {
        let shutdown = CancellationToken::new();
        let outcome = blocking_until_interrupted(&shutdown, || 7).await.unwrap();
        assert_eq!(outcome, Some(7));
    }
}
