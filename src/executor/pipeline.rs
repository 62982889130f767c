//! Cancellation scope and channel plumbing shared by pipeline stages.
//!
//! Every stage of a query runs as its own task. Stages talk through bounded
//! `mpsc` channels, and every blocking send or receive races the stage's
//! cancellation token, so a cancelled query unwinds without deadlock even
//! when a consumer has stopped reading.
//!
//! Errors never travel through the row channels. A failing stage records
//! the error in the query's failure slot (first error wins) and cancels the
//! root token; the consumer reports the recorded error once its input ends
//! and every stage has exited. A stage that panics is recorded the same way,
//! though unwinding may close its output before the record is made.
//!
//! Under a LIMIT or OFFSET the stages feeding the window run in a windowed
//! scope. A failure there is held as pending instead: the failing stage
//! closes its output, rows it already sent keep flowing, and the window
//! stage reports the failure only if its input ends before the window is
//! filled, after the windowed stages have exited. A stage that reaches the
//! end of its input checks [`Scope::is_stopped`] before acting on it.
//!
//! Stages are spawned while the query is planned, but no source is read
//! until the whole query planned successfully and [`Scope::start`] is
//! called. A query that fails to plan has read nothing.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};

use futures_util::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::ExecutorError;

/// Cancellation scope of one pipeline or sub-pipeline.
#[derive(Debug, Clone)]
pub(crate) struct Scope {
    /// Cancels this scope and every child scope.
    token: CancellationToken,
    /// Cancels the whole query.
    root: CancellationToken,
    failure: Arc<OnceLock<ExecutorError>>,
    /// Pending failure of the innermost windowed scope.
    pending: Option<Arc<OnceLock<ExecutorError>>>,
    /// Set once planning of the whole query succeeded.
    start: Arc<watch::Sender<bool>>,
    /// Running stages of this scope, excluding nested windows.
    stages: Arc<watch::Sender<usize>>,
}

impl Scope {
    /// Creates the root scope of a query under `parent`.
    pub fn root(parent: &CancellationToken) -> Self {
        let token = parent.child_token();
        let (start, _) = watch::channel(false);
        let (stages, _) = watch::channel(0);
        Self {
            root: token.clone(),
            token,
            failure: Arc::new(OnceLock::new()),
            pending: None,
            start: Arc::new(start),
            stages: Arc::new(stages),
        }
    }

    /// Creates a child scope that can be cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            root: self.root.clone(),
            failure: self.failure.clone(),
            pending: self.pending.clone(),
            start: self.start.clone(),
            stages: self.stages.clone(),
        }
    }

    /// Creates a child scope whose failures stay pending until the window
    /// stage reads [`Scope::pending`].
    pub fn windowed(&self) -> Self {
        let (stages, _) = watch::channel(0);
        Self {
            pending: Some(Arc::new(OnceLock::new())),
            stages: Arc::new(stages),
            ..self.child()
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancels this scope and its children, leaving the rest of the query
    /// running.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Lets the seed stages of the query and its subqueries emit rows.
    pub fn start(&self) {
        self.start.send_replace(true);
    }

    /// Waits until the query is started, returning false if the scope is
    /// cancelled first.
    pub async fn started(&self) -> bool {
        let mut rx = self.start.subscribe();
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            result = rx.wait_for(|started| *started) => result.is_ok(),
        }
    }

    /// Records `err` as the query's terminal error and cancels the query.
    ///
    /// In a windowed scope the error is only held as pending.
    pub fn abort(&self, stage: &str, err: ExecutorError) {
        debug!(stage, error = %err, "stage failed");
        let slot = self.pending.as_ref().unwrap_or(&self.failure);
        if let Err(err) = slot.set(err) {
            warn!(stage, error = %err, "dropping error after the query already failed");
        }
        if self.pending.is_none() {
            self.root.cancel();
        }
    }

    /// Runs `stage` as a task of this query. A panic in the task fails the
    /// query instead of ending its output early.
    pub fn spawn<F>(&self, stage: &'static str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let scope = self.clone();
        self.stages.send_modify(|n| *n += 1);
        tokio::spawn(async move {
            if let Err(payload) = AssertUnwindSafe(fut).catch_unwind().await {
                let message = panic_message(payload.as_ref());
                scope.abort(stage, ExecutorError::StagePanicked { stage, message });
            }
            scope.stages.send_modify(|n| *n -= 1);
        });
    }

    /// Waits until every stage spawned in this scope has exited. Stages of
    /// nested windows are covered by their window stage.
    pub async fn finished(&self) {
        let mut rx = self.stages.subscribe();
        // The sender lives in `self`, so this only returns on zero.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Returns the recorded terminal error, if any.
    pub fn failure(&self) -> Option<&ExecutorError> {
        self.failure.get()
    }

    /// Returns the pending failure of a windowed scope.
    pub fn pending(&self) -> Option<&ExecutorError> {
        self.pending.as_ref().and_then(|slot| slot.get())
    }

    /// True once the scope was cancelled or a failure, reported or pending,
    /// was recorded.
    pub fn is_stopped(&self) -> bool {
        self.is_cancelled() || self.failure().is_some() || self.pending().is_some()
    }

    /// Sends `item`, returning false if the scope was cancelled or the
    /// receiver is gone.
    pub async fn send<T: Send>(&self, tx: &mpsc::Sender<T>, item: T) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            result = tx.send(item) => result.is_ok(),
        }
    }

    /// Receives the next item, returning `None` when the sender closed or
    /// the scope was cancelled.
    pub async fn recv<T: Send>(&self, rx: &mut mpsc::Receiver<T>) -> Option<T> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            item = rx.recv() => item,
        }
    }
}

/// Extracts the text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked".to_string()
    }
}

/// Closes an upstream channel a stage stopped reading and discards what is
/// buffered, so producers blocked on it observe the closure.
pub(crate) fn drain<T>(mut rx: mpsc::Receiver<T>) {
    rx.close();
    while rx.try_recv().is_ok() {}
}
