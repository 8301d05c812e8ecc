//! Named background thread with cooperative cancellation

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::Event;
use crate::{Result, TransportError};

/// A background OS thread that stops when its [`CancellationToken`] fires.
///
/// The body receives the token and is expected to return promptly after
/// cancellation. Dropping a `Worker` cancels and joins it.
///
/// Stopping or joining from the worker's own thread (for example from inside a
/// callback it runs) cannot wait for itself; the thread is detached instead
/// and finishes once the body returns.
pub struct Worker {
    name: String,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a named thread running `body`.
    ///
    /// Returns once the thread has started executing.
    pub fn spawn<F>(name: impl Into<String>, body: F) -> Result<Self>
    where
        F: FnOnce(CancellationToken) + Send + 'static,
    {
        let name = name.into();
        let cancel = CancellationToken::new();
        let started = Arc::new(Event::new());

        let handle = {
            let cancel = cancel.clone();
            let started = Arc::clone(&started);
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    started.set();
                    body(cancel);
                })
                .map_err(|source| TransportError::ThreadSpawnFailed { name: name.clone(), source })?
        };

        started.wait();
        debug!(worker = %name, "Worker started");

        Ok(Self { name, cancel, handle: Some(handle) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Token observed by the worker body.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cancellation without waiting.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// The calling thread is this worker's thread.
    pub fn is_current(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| handle.thread().id() == thread::current().id())
    }

    /// Wait for the body to return.
    ///
    /// Returns false if the body panicked.
    pub fn join(mut self) -> bool {
        self.join_inner()
    }

    /// Cancel and wait for the body to return.
    pub fn stop(mut self) -> bool {
        self.cancel.cancel();
        self.join_inner()
    }

    /// Let the thread run on unsupervised.
    pub fn detach(mut self) {
        self.handle.take();
    }

    fn join_inner(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };

        if handle.thread().id() == thread::current().id() {
            debug!(worker = %self.name, "Join requested from worker thread, detaching");
            return true;
        }

        match handle.join() {
            Ok(()) => {
                debug!(worker = %self.name, "Worker joined");
                true
            }
            Err(_) => {
                warn!(worker = %self.name, "Worker panicked");
                false
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancel.cancel();
            self.join_inner();
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}
