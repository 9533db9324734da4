//! Cooperative asynchronous delivery.
//!
//! `asynchronous()` marks a chain; `each_async()` spawns a task on the
//! current tokio runtime that pulls one element per scheduled step and hands
//! it to the visitor. Between steps the task yields (or sleeps for the
//! configured interval), so other work on the runtime interleaves with the
//! traversal. Cancellation is checked before every delivery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::sequence::{Flow, Node, Sequence};
use crate::value::{Key, Value};

/// Shared cancellation flag. Cancelling is final.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How an asynchronous traversal ended.
#[derive(Debug, Clone)]
pub enum AsyncOutcome {
    /// Every element was delivered.
    Completed,
    /// The visitor returned [`Flow::Stop`].
    Stopped,
    Cancelled,
    /// The visitor or the chain raised; the error also went to the
    /// registered error callbacks.
    Failed(Error),
}

impl AsyncOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, AsyncOutcome::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AsyncOutcome::Cancelled)
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            AsyncOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

type ErrorCallback = Box<dyn FnOnce(&Error) + Send>;

#[derive(Default)]
struct Failure {
    error: Option<Error>,
    callbacks: Vec<ErrorCallback>,
}

#[derive(Default)]
struct Shared {
    token: CancelToken,
    failure: Mutex<Failure>,
}

impl Shared {
    fn fail(&self, error: Error) -> AsyncOutcome {
        let callbacks = {
            let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
            failure.error = Some(error.clone());
            std::mem::take(&mut failure.callbacks)
        };
        if callbacks.is_empty() {
            tracing::warn!(%error, "asynchronous traversal failed with no error callback registered");
        }
        for cb in callbacks {
            cb(&error);
        }
        AsyncOutcome::Failed(error)
    }
}

/// Handle to a running asynchronous traversal.
pub struct AsyncHandle {
    shared: Arc<Shared>,
    task: JoinHandle<AsyncOutcome>,
}

impl AsyncHandle {
    /// Stops scheduling further deliveries. An element already being
    /// delivered is not retracted.
    pub fn cancel(&self) {
        tracing::debug!("asynchronous traversal cancelled");
        self.shared.token.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.shared.token.clone()
    }

    /// Registers `callback` for a traversal error. If the traversal has
    /// already failed the callback runs immediately.
    pub fn on_error<F>(&self, callback: F)
    where
        F: FnOnce(&Error) + Send + 'static,
    {
        let mut failure = self.shared.failure.lock().unwrap_or_else(PoisonError::into_inner);
        match failure.error.clone() {
            Some(error) => {
                drop(failure);
                callback(&error);
            }
            None => failure.callbacks.push(Box::new(callback)),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the traversal to end.
    pub async fn join(self) -> AsyncOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => AsyncOutcome::Failed(Error::traversal(format!("asynchronous traversal task ended abnormally: {e}"))),
        }
    }
}

impl core::fmt::Debug for AsyncHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AsyncHandle")
            .field("cancelled", &self.shared.token.is_cancelled())
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

async fn pause(interval: Option<Duration>) {
    match interval {
        Some(d) => tokio::time::sleep(d).await,
        None => tokio::task::yield_now().await,
    }
}

async fn drive<F>(seq: Sequence, interval: Option<Duration>, mut visitor: F, shared: Arc<Shared>) -> AsyncOutcome
where
    F: FnMut(Value, Key) -> Result<Flow> + Send + 'static,
{
    let mut cursor = match seq.cursor_dyn() {
        Ok(cursor) => cursor,
        Err(e) => return shared.fail(e),
    };
    let mut delivered = 0usize;
    let outcome = loop {
        pause(interval).await;
        if shared.token.is_cancelled() {
            break AsyncOutcome::Cancelled;
        }
        let (value, key) = match cursor.next_entry() {
            Ok(Some(entry)) => entry,
            Ok(None) => break AsyncOutcome::Completed,
            Err(e) => break shared.fail(e),
        };
        delivered += 1;
        match visitor(value, key) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop) => break AsyncOutcome::Stopped,
            Err(e) => break shared.fail(e),
        }
    };
    tracing::debug!(op = seq.operator_name(), delivered, ?outcome, "asynchronous traversal finished");
    outcome
}

impl Sequence {
    /// Marks the chain for asynchronous delivery, one element per scheduled
    /// step, `interval` apart when given. Operators chained afterwards stay
    /// asynchronous. Marking a chain twice is a configuration error.
    pub fn asynchronous(&self, interval: Option<Duration>) -> Result<Sequence> {
        if self.is_async() {
            return Err(Error::configuration("sequence is already asynchronous"));
        }
        Ok(self.derive(Node::Async { parent: self.clone(), interval }))
    }

    /// Starts delivering elements to `visitor` on the current tokio runtime.
    ///
    /// Returns immediately; nothing is delivered before the caller yields to
    /// the runtime. Fails when the chain is not asynchronous or no runtime
    /// is available.
    pub fn each_async<F>(&self, visitor: F) -> Result<AsyncHandle>
    where
        F: FnMut(Value, Key) -> Result<Flow> + Send + 'static,
    {
        let Some(interval) = self.async_interval() else {
            return Err(Error::configuration("each_async needs an asynchronous sequence; call asynchronous() first"));
        };
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::configuration("each_async must be called within a tokio runtime")
                .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
        })?;
        let shared = Arc::new(Shared::default());
        tracing::debug!(op = self.operator_name(), ?interval, "asynchronous traversal started");
        let task = runtime.spawn(drive(self.clone(), interval, visitor, shared.clone()));
        Ok(AsyncHandle { shared, task })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::wrap;

    #[test]
    fn asynchronous_is_not_stackable() {
        let seq = wrap(vec![1]).asynchronous(None).unwrap();
        assert!(seq.map(|v| v.clone()).asynchronous(None).unwrap_err().is_configuration());
    }

    #[test]
    fn each_async_needs_a_runtime() {
        let seq = wrap(vec![1]).asynchronous(None).unwrap();
        assert!(seq.each_async(|_, _| Ok(Flow::Continue)).unwrap_err().is_configuration());
    }

    #[test]
    fn synchronous_traversal_of_async_chain_is_rejected() {
        let seq = wrap(vec![1, 2]).asynchronous(None).unwrap().map(|v| v.clone());
        assert!(seq.to_vec().unwrap_err().is_configuration());
        assert!(seq.cursor().unwrap_err().is_configuration());
    }

    #[tokio::test]
    async fn non_async_chain_is_rejected() {
        assert!(wrap(vec![1]).each_async(|_, _| Ok(Flow::Continue)).unwrap_err().is_configuration());
    }
}
