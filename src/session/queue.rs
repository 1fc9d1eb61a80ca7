// SPDX-License-Identifier: GPL-3.0-only

//! Serialized work queue
//!
//! A named thread running jobs one at a time in submission order. The queue
//! can be suspended: queued jobs stay put until every `suspend` is matched by
//! a `resume`. Sessions use this to hold configuration work back while an
//! authorization prompt is on screen.

use super::pending::Pending;
use crate::errors::SessionResult;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};
use std::thread::{self, ThreadId};
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    suspended: usize,
    closed: bool,
}

struct QueueShared {
    label: String,
    state: Mutex<QueueState>,
    ready: Condvar,
    worker: OnceLock<ThreadId>,
}

impl QueueShared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until a job may run; `None` once the queue is closed and drained
    fn next_job(&self) -> Option<Job> {
        let mut state = self.lock();
        loop {
            if state.suspended == 0
                && let Some(job) = state.jobs.pop_front()
            {
                return Some(job);
            }
            if state.closed && (state.jobs.is_empty() || state.suspended > 0) {
                if !state.jobs.is_empty() {
                    warn!(
                        label = %self.label,
                        dropped = state.jobs.len(),
                        "Work queue closed while suspended, dropping jobs"
                    );
                    state.jobs.clear();
                }
                return None;
            }
            state = self.ready.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Closes the queue when the last [`WorkQueue`] handle goes away
struct QueueHandle {
    shared: Arc<QueueShared>,
}

impl Drop for QueueHandle {
    fn drop(&mut self) {
        debug!(label = %self.shared.label, "Closing work queue");
        self.shared.lock().closed = true;
        self.shared.ready.notify_all();
    }
}

/// Handle to a serialized work queue
///
/// Cheap to clone; the worker thread exits after the last handle is dropped
/// and the remaining jobs have run.
#[derive(Clone)]
pub struct WorkQueue {
    handle: Arc<QueueHandle>,
}

impl WorkQueue {
    /// Spawn a queue whose worker thread is named `label`
    pub fn new(label: &str) -> std::io::Result<Self> {
        let shared = Arc::new(QueueShared {
            label: label.to_string(),
            state: Mutex::new(QueueState::default()),
            ready: Condvar::new(),
            worker: OnceLock::new(),
        });

        let worker_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name(label.to_string())
            .spawn(move || {
                let _ = worker_shared.worker.set(thread::current().id());
                debug!(label = %worker_shared.label, "Work queue started");

                while let Some(job) = worker_shared.next_job() {
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        warn!(label = %worker_shared.label, "Work queue job panicked");
                    }
                }

                debug!(label = %worker_shared.label, "Work queue finished");
            })?;

        Ok(Self {
            handle: Arc::new(QueueHandle { shared }),
        })
    }

    pub fn label(&self) -> &str {
        &self.handle.shared.label
    }

    /// Enqueue a job
    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.shared.lock().jobs.push_back(Box::new(job));
        self.handle.shared.ready.notify_one();
    }

    /// Enqueue a job and get a handle to its result
    pub fn run<T, F>(&self, job: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce() -> SessionResult<T> + Send + 'static,
    {
        let (pending, reply) = Pending::channel();
        self.dispatch(move || {
            // The caller may have stopped waiting
            let _ = reply.send(job());
        });
        pending
    }

    /// Resolves once every job queued before it has run
    pub fn barrier(&self) -> Pending<()> {
        self.run(|| Ok(()))
    }

    /// Stop handing out jobs until a matching [`resume`](Self::resume)
    pub fn suspend(&self) {
        let mut state = self.handle.shared.lock();
        state.suspended += 1;
        debug!(label = %self.label(), depth = state.suspended, "Work queue suspended");
    }

    pub fn resume(&self) {
        {
            let mut state = self.handle.shared.lock();
            if state.suspended == 0 {
                warn!(label = %self.label(), "Unbalanced work queue resume");
                return;
            }
            state.suspended -= 1;
            debug!(label = %self.label(), depth = state.suspended, "Work queue resumed");
        }
        self.handle.shared.ready.notify_all();
    }

    pub fn is_suspended(&self) -> bool {
        self.handle.shared.lock().suspended > 0
    }

    /// Jobs waiting to run
    pub fn pending_jobs(&self) -> usize {
        self.handle.shared.lock().jobs.len()
    }

    /// Whether the caller is running on this queue's worker thread
    pub fn is_current(&self) -> bool {
        self.handle.shared.worker.get() == Some(&thread::current().id())
    }
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("label", &self.label())
            .field("pending_jobs", &self.pending_jobs())
            .finish()
    }
}
