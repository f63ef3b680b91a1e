//! Step Runtime
//!
//! A step is a deferred, single-assignment value: its body runs once as a
//! tokio task, and every interested party awaits the same result. Steps
//! form the push DAG by joining their predecessors before doing their own
//! work; the watch channel's send/receive pair gives the happens-before
//! ordering the pipeline relies on.
//!
//! Cancellation wins races: a step observing the push's cancellation token
//! resolves to `Cancelled` without running its body further, and a step
//! spawned after cancellation never starts its body.

use crate::steps::PushError;
use std::future::Future;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Outcome of a step, shared by every dependent
pub type StepResult<T> = Result<T, PushError>;

/// A deferred value produced by a spawned task
#[derive(Clone)]
pub struct Step<T> {
    rx: watch::Receiver<Option<StepResult<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Step<T> {
    /// Spawn `body` as a task racing the cancellation token.
    pub fn spawn<F>(cancel: &CancellationToken, body: F) -> Self
    where
        F: Future<Output = StepResult<T>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);
        let cancel = cancel.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(PushError::Cancelled),
                result = body => result,
            };
            // Dependents may already be gone; that is not an error.
            let _ = tx.send(Some(outcome));
        });

        Self { rx }
    }

    /// A step that is already resolved
    pub fn ready(result: StepResult<T>) -> Self {
        let (tx, rx) = watch::channel(Some(result));
        // A closed channel still serves its last value to joiners.
        drop(tx);
        Self { rx }
    }

    /// Await the value. Every caller observes the same result.
    pub async fn join(&self) -> StepResult<T> {
        let mut rx = self.rx.clone();
        let resolved = rx
            .wait_for(|slot| slot.is_some())
            .await
            .map_err(|_| PushError::Internal("step task dropped without resolving".to_string()))?;

        match resolved.as_ref() {
            Some(result) => result.clone(),
            None => Err(PushError::Internal("step resolved empty".to_string())),
        }
    }

    /// Non-blocking view of the result, once resolved
    pub fn peek(&self) -> Option<StepResult<T>> {
        self.rx.borrow().clone()
    }

    /// Derived step whose body runs exactly once, after this step
    /// resolves successfully.
    pub fn map<U, F, Fut>(&self, cancel: &CancellationToken, f: F) -> Step<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = StepResult<U>> + Send,
    {
        let input = self.clone();
        Step::spawn(cancel, async move {
            let value = input.join().await?;
            f(value).await
        })
    }
}

/// Join a set of like steps, in order, failing fast on the first failure.
pub async fn join_all<T: Clone + Send + Sync + 'static>(steps: &[Step<T>]) -> StepResult<Vec<T>> {
    futures::future::try_join_all(steps.iter().map(|s| s.join())).await
}
