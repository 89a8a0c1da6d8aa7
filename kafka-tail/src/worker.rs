//! Output workers and the rendezvous hand-off that feeds them.
//!
//! Each worker owns one strictly ordered queue. Handing a record to a worker
//! completes only once the worker has taken it, and a worker only takes the
//! next record after it has written the previous one. A slow worker therefore
//! stalls whoever is feeding it; nothing is buffered on its behalf.

use std::num::NonZeroUsize;
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{self, JoinError, JoinHandle};
use tracing::{debug, error};

use crate::format::{format_record, FormatOptions};
use crate::metrics_consts::{RECORDS_RENDERED, WRITE_ERRORS};
use crate::output::Output;
use crate::record::Record;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("the receiving worker has stopped")]
pub struct HandoffClosed;

type Parcel<T> = (T, oneshot::Sender<()>);

/// Sending half of a rendezvous channel.
#[derive(Debug)]
pub struct Handoff<T> {
    sender: mpsc::Sender<Parcel<T>>,
}

/// Receiving half of a rendezvous channel.
#[derive(Debug)]
pub struct Intake<T> {
    receiver: mpsc::Receiver<Parcel<T>>,
}

/// A channel with no usable buffer: `send` resolves when the receiver takes the item.
pub fn rendezvous<T>() -> (Handoff<T>, Intake<T>) {
    let (sender, receiver) = mpsc::channel(1);
    (Handoff { sender }, Intake { receiver })
}

impl<T> Handoff<T> {
    pub async fn send(&self, item: T) -> Result<(), HandoffClosed> {
        let (taken_tx, taken_rx) = oneshot::channel();
        self.sender
            .send((item, taken_tx))
            .await
            .map_err(|_| HandoffClosed)?;
        taken_rx.await.map_err(|_| HandoffClosed)
    }
}

impl<T> Intake<T> {
    /// Take the next item, releasing its sender. `None` once every `Handoff` is dropped.
    pub async fn recv(&mut self) -> Option<T> {
        let (item, taken) = self.receiver.recv().await?;
        taken.send(()).ok();
        Some(item)
    }
}

/// Format one record and write it out. Write failures are logged, not raised.
pub fn render(worker: usize, record: &Record, options: &FormatOptions, output: &dyn Output) {
    let line = format_record(record, options);
    match output.write_line(worker, &line) {
        Ok(()) => {
            metrics::counter!(RECORDS_RENDERED, "worker" => worker.to_string()).increment(1);
        }
        Err(e) => {
            metrics::counter!(WRITE_ERRORS).increment(1);
            error!(
                worker,
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                error = %e,
                "failed to write record"
            );
        }
    }
}

/// Run [`render`] on the blocking pool and wait for it.
///
/// A stalled terminal then holds a blocking thread instead of a runtime worker.
pub async fn render_blocking(
    worker: usize,
    record: Record,
    options: FormatOptions,
    output: Arc<dyn Output>,
) {
    let written =
        task::spawn_blocking(move || render(worker, &record, &options, output.as_ref())).await;
    if let Err(e) = written {
        metrics::counter!(WRITE_ERRORS).increment(1);
        error!(worker, error = %e, "render task failed");
    }
}

/// A spawned task rendering the records handed to it, in hand-off order.
pub struct Worker {
    id: usize,
    handoff: Handoff<Record>,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Spawn the worker task. Must be called from within a tokio runtime.
    pub fn spawn(id: usize, options: FormatOptions, output: Arc<dyn Output>) -> Self {
        let (handoff, intake) = rendezvous();
        let handle = tokio::spawn(Self::run(id, intake, options, output));
        Self {
            id,
            handoff,
            handle,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Hand `record` over, waiting until the worker has taken it.
    pub async fn deliver(&self, record: Record) -> Result<(), HandoffClosed> {
        self.handoff.send(record).await
    }

    /// Close the queue and wait for the in-flight record to be written.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        drop(self.handoff);
        let result = self.handle.await;
        match &result {
            Ok(()) => debug!(worker = self.id, "worker stopped"),
            Err(e) => error!(worker = self.id, error = %e, "worker task failed"),
        }
        result
    }

    async fn run(
        id: usize,
        mut intake: Intake<Record>,
        options: FormatOptions,
        output: Arc<dyn Output>,
    ) {
        debug!(worker = id, "worker started");
        while let Some(record) = intake.recv().await {
            render_blocking(id, record, options, output.clone()).await;
        }
    }
}

/// Fixed set of workers, created once and never resized.
pub struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    pub fn spawn(size: NonZeroUsize, options: FormatOptions, output: Arc<dyn Output>) -> Self {
        let workers = (0..size.get())
            .map(|id| Worker::spawn(id, options, output.clone()))
            .collect();
        Self { workers }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Hand `record` to worker `index`, waiting until it is taken.
    ///
    /// Panics if `index` is outside the pool.
    pub async fn deliver(&self, index: usize, record: Record) -> Result<(), HandoffClosed> {
        self.workers[index].deliver(record).await
    }

    /// Close every queue, then wait for all workers. Reports the first task failure.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        let results = join_all(self.workers.into_iter().map(Worker::shutdown)).await;
        results.into_iter().collect()
    }
}
