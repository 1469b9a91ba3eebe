//! Supervised fire-and-forget tasks with a drain barrier.
//!
//! Request handlers hand work (mail delivery) to [`BackgroundTasks::spawn`] and
//! return immediately. Each task is bounded by its own timeout, never by the
//! request that spawned it. Failures and panics are logged and swallowed.
//! Shutdown calls [`BackgroundTasks::wait`] once the listener has drained.

use anyhow::Result;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{debug, error, Instrument};

#[derive(Clone, Debug)]
pub struct BackgroundTasks {
    outstanding: Arc<watch::Sender<usize>>,
    timeout: Duration,
}

impl BackgroundTasks {
    /// `timeout` bounds every task individually.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            outstanding: Arc::new(outstanding),
            timeout,
        }
    }

    /// Tasks spawned and not yet finished.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Run `task` detached from the caller.
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.outstanding.send_modify(|count| *count += 1);

        let outstanding = Arc::clone(&self.outstanding);
        let timeout = self.timeout;
        let span = tracing::info_span!("background", task = name);

        tokio::spawn(
            async move {
                // inner spawn so a panic surfaces as a JoinError instead of unwinding here
                let inner = tokio::spawn(tokio::time::timeout(timeout, task).in_current_span());

                match inner.await {
                    Ok(Ok(Ok(()))) => debug!("background task finished"),
                    Ok(Ok(Err(err))) => error!("background task failed: {err:#}"),
                    Ok(Err(_)) => error!(?timeout, "background task timed out"),
                    Err(err) if err.is_panic() => error!("background task panicked: {err}"),
                    Err(err) => error!("background task cancelled: {err}"),
                }

                outstanding.send_modify(|count| *count -= 1);
            }
            .instrument(span),
        );
    }

    /// Resolve once no task is outstanding.
    pub async fn wait(&self) {
        let mut rx = self.outstanding.subscribe();
        // the sender lives in self, so the channel cannot close under us
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}
