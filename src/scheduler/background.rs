//! One-at-a-time background worker for CPU-bound codec jobs.
//!
//! Jobs run strictly in submission order on a single dedicated thread.
//! [`BackgroundWorker::wait_for_completion`] is a barrier: it returns only once
//! the queue is empty and no job is executing.  Call it before tearing down
//! anything a queued job might still touch.
//!
//! [`BackgroundWorker::release`] drains the worker and stops its thread for
//! good; later submissions are dropped with a warning.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Count of submitted-but-unfinished jobs plus the condvar signalled when it
/// reaches zero.
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn increment(&self) {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn decrement(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Decrements the pending count when a job finishes, including by panic, so
/// that `wait_for_completion` callers are never stranded.
struct PendingGuard<'a>(&'a Pending);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

struct Worker {
    tx: mpsc::UnboundedSender<Job>,
    thread: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

pub struct BackgroundWorker {
    name: String,
    worker: Mutex<Option<Worker>>,
    pending: Arc<Pending>,
}

impl BackgroundWorker {
    /// Spawn the worker thread.
    pub fn spawn(name: &str) -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let pending = Arc::new(Pending {
            count: Mutex::new(0),
            idle: Condvar::new(),
        });

        let thread = {
            let pending = Arc::clone(&pending);
            thread::Builder::new().name(name.into()).spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    let _guard = PendingGuard(&pending);
                    job();
                }
            })?
        };

        Ok(Self {
            name: name.to_string(),
            worker: Mutex::new(Some(Worker { tx, thread })),
            pending,
        })
    }

    /// Queue `job` behind every job submitted before it.
    ///
    /// Returns `false` if the worker has been released and the job was
    /// dropped.
    ///
    /// # Panics
    ///
    /// Panics if the worker thread died because an earlier job panicked.
    pub fn schedule<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(worker) = worker.as_ref() else {
            log::warn!("{}: released, job dropped", self.name);
            return false;
        };

        self.pending.increment();
        if worker.tx.send(Box::new(job)).is_err() {
            self.pending.decrement();
            panic!("{}: worker thread halted after a job panicked", self.name);
        }
        true
    }

    /// Block until the queue is empty and no job is executing.
    ///
    /// Must not be called from a background job.
    pub fn wait_for_completion(&self) {
        let count = self.pending.count.lock().unwrap_or_else(PoisonError::into_inner);
        let _idle = self
            .pending
            .idle
            .wait_while(count, |count| *count > 0)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Number of jobs queued or running.
    pub fn pending(&self) -> usize {
        *self.pending.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drain outstanding jobs, then stop the worker thread permanently.
    pub fn release(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(Worker { tx, thread }) = worker else {
            return;
        };

        self.wait_for_completion();
        drop(tx);
        if thread.join().is_err() {
            log::error!("{}: worker thread had panicked", self.name);
        }
        log::info!("{}: released", self.name);
    }

    pub fn is_released(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Worker { tx, thread }) = worker {
            // Queued jobs still run; the loop ends once the channel is empty.
            drop(tx);
            // The last owner can be a job running on the worker itself.
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
