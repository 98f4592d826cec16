//! Concurrency backbone: one serialized main loop plus one background worker.
//!
//! # Architecture
//!
//! ```text
//! any thread ──schedule(cmd)──▶ Scheduler<T> ──▶ TaskQueue<T>::run   (main thread)
//!                                                 └─ batch: take all ready, run in order
//!
//! audio thread ──schedule(job)──▶ BackgroundWorker ──▶ worker thread  (one job at a time)
//!                                   └─ wait_for_completion(): barrier until idle
//! ```
//!
//! Everything that mutates orchestrator state runs on the main loop.  The
//! background worker only runs codec work and hands results back to the main
//! loop through a [`Scheduler`].

pub mod background;
pub mod main_loop;

pub use background::BackgroundWorker;
pub use main_loop::{MainLoopHandle, Scheduler, TaskQueue};
