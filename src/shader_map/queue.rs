//! Background compile workers.
//!
//! Work is queued on a crossbeam channel and picked up by a fixed pool of named worker threads.
//! Every submission returns a [`PendingCompile`] that can be polled, waited on or cancelled.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{Sender, unbounded};
use log::debug;
use parking_lot::{Condvar, Mutex};

use super::backend::{CompileJob, CompiledStages, ShaderBackend};
use crate::error::ShaderMapError;

type Task = Box<dyn FnOnce() + Send + 'static>;

enum PendingState<T> {
    Queued,
    Running,
    Cancelled,
    Done(Result<T, ShaderMapError>),
    /// The result was handed out by `wait`.
    Taken,
}

struct PendingShared<T> {
    state: Mutex<PendingState<T>>,
    changed: Condvar,
}

impl<T> PendingShared<T> {
    fn finish(&self, result: Result<T, ShaderMapError>) {
        *self.state.lock() = PendingState::Done(result);
        self.changed.notify_all();
    }
}

/// Handle to one queued compile.
pub struct PendingCompile<T> {
    shared: Arc<PendingShared<T>>,
}

impl<T> PendingCompile<T> {
    fn queued() -> Self {
        Self {
            shared: Arc::new(PendingShared {
                state: Mutex::new(PendingState::Queued),
                changed: Condvar::new(),
            }),
        }
    }

    /// A handle whose result is already known.
    pub fn ready(result: Result<T, ShaderMapError>) -> Self {
        let pending = Self::queued();
        pending.shared.finish(result);
        pending
    }

    /// True once the work has finished or was cancelled. Never blocks on the work itself.
    pub fn is_ready(&self) -> bool {
        matches!(
            *self.shared.state.lock(),
            PendingState::Done(_) | PendingState::Cancelled | PendingState::Taken
        )
    }

    /// Cancel the work if no worker has started it yet. Returns whether it was cancelled.
    pub fn cancel(&self) -> bool {
        let mut state = self.shared.state.lock();
        if matches!(*state, PendingState::Queued) {
            *state = PendingState::Cancelled;
            drop(state);
            self.shared.changed.notify_all();
            return true;
        }
        false
    }

    /// Block until the work finishes.
    pub fn wait(self) -> Result<T, ShaderMapError> {
        let mut state = self.shared.state.lock();
        loop {
            match std::mem::replace(&mut *state, PendingState::Taken) {
                PendingState::Done(result) => return result,
                PendingState::Cancelled => {
                    *state = PendingState::Cancelled;
                    return Err(ShaderMapError::Cancelled);
                }
                PendingState::Taken => return Err(ShaderMapError::Cancelled),
                pending => {
                    *state = pending;
                    self.shared.changed.wait(&mut state);
                }
            }
        }
    }

    /// Like [`wait`](Self::wait), giving up with [`ShaderMapError::TimedOut`] after `timeout`.
    /// The work itself keeps running.
    pub fn wait_timeout(self, timeout: Duration) -> Result<T, ShaderMapError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            match std::mem::replace(&mut *state, PendingState::Taken) {
                PendingState::Done(result) => return result,
                PendingState::Cancelled => {
                    *state = PendingState::Cancelled;
                    return Err(ShaderMapError::Cancelled);
                }
                PendingState::Taken => return Err(ShaderMapError::Cancelled),
                pending => {
                    *state = pending;
                    if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                        return Err(ShaderMapError::TimedOut);
                    }
                }
            }
        }
    }
}

/// Fixed pool of compile workers fed from one channel.
///
/// Dropping the queue closes the channel; workers finish what is already queued and exit. They are
/// not joined, since the last owner of the queue may itself be a worker.
pub struct CompileQueue {
    sender: Option<Sender<Task>>,
    workers: usize,
}

impl CompileQueue {
    pub fn new(workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let (sender, receiver) = unbounded::<Task>();
        for i in 0..workers {
            let receiver = receiver.clone();
            thread::Builder::new()
                .name(format!("shader-compile-{i}"))
                .spawn(move || {
                    while let Ok(task) = receiver.recv() {
                        task();
                    }
                })
                .with_context(|| format!("failed to spawn shader compile worker {i}"))?;
        }
        debug!("Started {workers} shader compile worker(s)");
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queue `work`. It is skipped if cancelled before a worker picks it up.
    pub fn submit_with<T, F>(&self, work: F) -> PendingCompile<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ShaderMapError> + Send + 'static,
    {
        let pending = PendingCompile::queued();
        let shared = pending.shared.clone();
        let task: Task = Box::new(move || {
            {
                let mut state = shared.state.lock();
                if !matches!(*state, PendingState::Queued) {
                    return;
                }
                *state = PendingState::Running;
            }
            shared.finish(work());
        });

        let sent = self.sender.as_ref().is_some_and(|s| s.send(task).is_ok());
        if !sent {
            pending.shared.finish(Err(ShaderMapError::Cancelled));
        }
        pending
    }

    /// Queue a backend compile of `job`.
    pub fn submit(&self, backend: Arc<dyn ShaderBackend>, job: CompileJob) -> PendingCompile<CompiledStages> {
        self.submit_with(move || {
            backend
                .compile(&job)
                .map_err(|source| ShaderMapError::Backend {
                    material: job.friendly_name.clone(),
                    source,
                })
        })
    }
}

impl Drop for CompileQueue {
    fn drop(&mut self) {
        self.sender.take();
    }
}
