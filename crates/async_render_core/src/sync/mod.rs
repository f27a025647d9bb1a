//! # Frame Synchronization Primitives
//!
//! ## The Problem
//!
//! ```text
//! Tick thread:    DELETE original → clone must go too
//! Render worker:  still traversing that clone from last dispatch
//!
//! Free immediately:  USE-AFTER-FREE on the worker
//! Lock per node:     CONTENTION on every draw
//! ```
//!
//! ## The Solution: Deferred Reclamation + One Rendezvous
//!
//! ```text
//! Frame N:
//!   tick marks clone removed        → fill buffer
//!   cleanup                         → swap (clone now in process buffer)
//!
//! Frame N+1:
//!   cleanup                         → process buffer reclaimed, swap
//! ```
//!
//! The worker and the tick thread meet exactly once per frame, on the
//! [`FrameSemaphore`].

mod removed_nodes;
mod semaphore;

pub use removed_nodes::RemovedNodesManager;
pub use semaphore::FrameSemaphore;
