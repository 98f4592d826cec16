//! Single-consumer FIFO work queue drained in batches by the main loop.
//!
//! [`Scheduler`] is the cheap, cloneable submission handle.  [`TaskQueue`] is
//! the consuming end: it blocks until something is queued, takes every task
//! that is ready at that instant as one batch, and runs the batch in
//! submission order.  Tasks submitted while a batch runs land in the next
//! batch, so a handler never re-enters itself.

use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Submission handle for the main loop.  Callable from any thread.
pub struct Scheduler<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for Scheduler<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Scheduler<T> {
    /// Create a connected submission handle / consumer pair.
    pub fn channel() -> (Scheduler<T>, TaskQueue<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Scheduler { tx }, TaskQueue { rx })
    }

    /// Append `task` to the queue and wake the main loop.
    ///
    /// Never blocks.  If the main loop has already exited the task is dropped
    /// with a warning.
    pub fn schedule(&self, task: T) {
        if self.tx.send(task).is_err() {
            log::warn!("scheduler: main loop has exited, task dropped");
        }
    }

    /// `true` once the consuming [`TaskQueue`] has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ---------------------------------------------------------------------------
// TaskQueue
// ---------------------------------------------------------------------------

/// Consuming end of the main-loop queue.
pub struct TaskQueue<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> TaskQueue<T> {
    /// Block until at least one task is queued, then return everything queued
    /// so far in submission order.
    ///
    /// Returns `None` once every [`Scheduler`] has been dropped and the queue
    /// is empty.  Must not be called from inside an async runtime.
    pub fn next_batch(&mut self) -> Option<Vec<T>> {
        let first = self.rx.blocking_recv()?;
        let mut batch = vec![first];
        batch.extend(self.drain_ready());
        Some(batch)
    }

    /// Take every task that is ready right now without blocking.
    pub fn drain_ready(&mut self) -> Vec<T> {
        let mut ready = Vec::new();
        while let Ok(task) = self.rx.try_recv() {
            ready.push(task);
        }
        ready
    }

    /// Run `handler` over every batch until all submitters are gone.
    pub fn run<F: FnMut(T)>(mut self, mut handler: F) {
        while let Some(batch) = self.next_batch() {
            for task in batch {
                handler(task);
            }
        }
        log::info!("scheduler: all submitters dropped, main loop exiting");
    }
}

impl<T: Send + 'static> TaskQueue<T> {
    /// Run the main loop on a dedicated, named thread.
    pub fn spawn<F>(self, handler: F) -> std::io::Result<MainLoopHandle>
    where
        F: FnMut(T) + Send + 'static,
    {
        let thread = thread::Builder::new()
            .name("main-loop".into())
            .spawn(move || self.run(handler))?;
        Ok(MainLoopHandle { thread })
    }
}

// ---------------------------------------------------------------------------
// MainLoopHandle
// ---------------------------------------------------------------------------

/// Join handle for the main-loop thread.
pub struct MainLoopHandle {
    thread: JoinHandle<()>,
}

impl MainLoopHandle {
    /// Wait for the main loop to exit.
    ///
    /// A panic raised by any task is re-raised here: corrupted orchestrator
    /// state must halt the process, not be swallowed.
    pub fn join(self) {
        if let Err(panic) = self.thread.join() {
            log::error!("scheduler: main loop panicked");
            std::panic::resume_unwind(panic);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
