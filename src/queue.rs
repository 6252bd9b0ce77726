//! Single-writer queue for grid mutations.
//!
//! Callers submit async operations; one worker task runs them strictly in submission order.
//! The first submission after an idle period arms a debounce timer so a burst is drained in one
//! pass. Every operation runs in its own task, so a failure or panic reaches only its own handle.

use crate::errors::{BridgeError, ErrorCode};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("operation was cancelled because the mutation queue was cleared")]
    Cleared,
    #[error("{0:#}")]
    Failed(anyhow::Error),
    #[error("queued operation stopped before producing a result")]
    Aborted,
}

impl QueueError {
    pub fn code(&self) -> ErrorCode {
        match self {
            QueueError::Cleared => ErrorCode::QueueCleared,
            QueueError::Aborted => ErrorCode::QueueAborted,
            QueueError::Failed(err) => err
                .downcast_ref::<BridgeError>()
                .map(BridgeError::code)
                .unwrap_or(ErrorCode::GridError),
        }
    }
}

impl From<QueueError> for BridgeError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Cleared => BridgeError::QueueCleared,
            QueueError::Aborted => {
                BridgeError::QueueAborted("operation panicked or the queue shut down".to_string())
            }
            QueueError::Failed(err) => err.downcast::<BridgeError>().unwrap_or_else(BridgeError::Grid),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePhase {
    #[default]
    Idle,
    /// Debounce timer armed.
    Pending,
    Draining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct QueueStatus {
    phase: QueuePhase,
    /// Submitted operations that have not settled yet.
    pending: usize,
}

trait Job: Send {
    fn run(self: Box<Self>) -> BoxFuture;
    fn reject(self: Box<Self>, err: QueueError);
}

struct Task<F, T> {
    op: F,
    reply: oneshot::Sender<Result<T, QueueError>>,
}

impl<F, Fut, T> Job for Task<F, T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    fn run(self: Box<Self>) -> BoxFuture {
        let Task { op, reply } = *self;
        Box::pin(async move {
            let result = op().await.map_err(QueueError::Failed);
            let _ = reply.send(result);
        })
    }

    fn reject(self: Box<Self>, err: QueueError) {
        let _ = self.reply.send(Err(err));
    }
}

enum Command {
    Run(Box<dyn Job>),
    Clear,
}

struct Shared {
    status: watch::Sender<QueueStatus>,
}

impl Shared {
    fn set_phase(&self, phase: QueuePhase) {
        self.status.send_modify(|status| status.phase = phase);
    }

    fn settled(&self, count: usize) {
        self.status
            .send_modify(|status| status.pending = status.pending.saturating_sub(count));
    }

    fn reject_all(&self, jobs: &mut VecDeque<Box<dyn Job>>) {
        let count = jobs.len();
        for job in jobs.drain(..) {
            job.reject(QueueError::Cleared);
        }
        if count > 0 {
            tracing::debug!(count, "cleared queued operations");
        }
        self.settled(count);
    }
}

/// Resolves with the operation's own outcome.
#[must_use = "dropping the handle discards the operation's result"]
pub struct QueueHandle<T> {
    rx: oneshot::Receiver<Result<T, QueueError>>,
}

impl<T> Future for QueueHandle<T> {
    type Output = Result<T, QueueError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(QueueError::Aborted)))
    }
}

/// Cheap to clone; clones share one worker.
#[derive(Clone)]
pub struct MutationQueue {
    tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for MutationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = *self.shared.status.borrow();
        f.debug_struct("MutationQueue")
            .field("phase", &status.phase)
            .field("pending", &status.pending)
            .finish()
    }
}

impl MutationQueue {
    /// Spawns the worker on the current Tokio runtime.
    pub fn new(debounce: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(QueueStatus::default());
        let shared = Arc::new(Shared { status });
        tokio::spawn(drain_loop(rx, shared.clone(), debounce));
        Self { tx, shared }
    }

    /// Queues `op`. Never blocks; the returned handle settles once the operation has run or
    /// been cleared.
    pub fn enqueue<F, Fut, T>(&self, op: F) -> QueueHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.shared.status.send_modify(|status| status.pending += 1);
        let job: Box<dyn Job> = Box::new(Task { op, reply });
        if let Err(mpsc::error::SendError(command)) = self.tx.send(Command::Run(job)) {
            if let Command::Run(job) = command {
                job.reject(QueueError::Aborted);
            }
            self.shared.settled(1);
        }
        QueueHandle { rx }
    }

    /// Rejects every operation that has not started. The running one is unaffected.
    pub fn clear(&self) {
        let _ = self.tx.send(Command::Clear);
    }

    /// Returns once nothing is queued or running.
    pub async fn wait_for_completion(&self) {
        let mut rx = self.shared.status.subscribe();
        let _ = rx
            .wait_for(|status| status.phase == QueuePhase::Idle && status.pending == 0)
            .await;
    }

    pub fn phase(&self) -> QueuePhase {
        self.shared.status.borrow().phase
    }

    pub fn pending(&self) -> usize {
        self.shared.status.borrow().pending
    }
}

async fn drain_loop(
    mut rx: mpsc::UnboundedReceiver<Command>,
    shared: Arc<Shared>,
    debounce: Duration,
) {
    let mut jobs: VecDeque<Box<dyn Job>> = VecDeque::new();
    let mut closed = false;

    'idle: while !closed {
        match rx.recv().await {
            None => break,
            Some(Command::Clear) => continue,
            Some(Command::Run(job)) => jobs.push_back(job),
        }

        shared.set_phase(QueuePhase::Pending);
        let timer = tokio::time::sleep(debounce);
        tokio::pin!(timer);
        loop {
            tokio::select! {
                biased;
                () = &mut timer => break,
                command = rx.recv() => match command {
                    Some(Command::Run(job)) => jobs.push_back(job),
                    Some(Command::Clear) => {
                        shared.reject_all(&mut jobs);
                        shared.set_phase(QueuePhase::Idle);
                        continue 'idle;
                    }
                    None => {
                        closed = true;
                        break;
                    }
                },
            }
        }

        shared.set_phase(QueuePhase::Draining);
        tracing::trace!(batch = jobs.len(), "draining mutation queue");
        while let Some(job) = jobs.pop_front() {
            let mut running = tokio::spawn(job.run());
            loop {
                tokio::select! {
                    outcome = &mut running => {
                        if let Err(err) = outcome {
                            tracing::warn!(error = %err, "queued operation aborted");
                        }
                        shared.settled(1);
                        break;
                    }
                    command = rx.recv(), if !closed => match command {
                        Some(Command::Run(job)) => jobs.push_back(job),
                        Some(Command::Clear) => shared.reject_all(&mut jobs),
                        None => closed = true,
                    },
                }
            }
        }
        shared.set_phase(QueuePhase::Idle);
    }
}
