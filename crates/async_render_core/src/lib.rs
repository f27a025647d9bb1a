//! # Async Render Core
//!
//! Contracts and primitives shared between the simulation thread and the
//! render worker when the world is traversed off the critical path:
//! - Render node identity and the clone/snapshot contract
//! - The external scene engine and world renderer interfaces
//! - Double-buffered removal tracking with a one-cycle grace period
//! - The binary semaphore that closes each frame
//!
//! ## Thread Model
//!
//! ```text
//!   Tick thread                          Render worker
//!   ───────────                          ─────────────
//!   mutate originals
//!   commit clones  ──── dispatch ────►   traverse registered clones
//!   keep simulating                      draw submission
//!   wait  ◄─────────── release ───────   done
//!   reclaim removed clones
//! ```
//!
//! Nothing in this crate takes a lock on the hot path except the snapshot
//! cells, which are only ever contended if the protocol above is broken.

#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod engine;
pub mod node;
pub mod sync;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use engine::{SceneEngine, WorldRenderer};
pub use node::{
    Aabb, Camera, NodeId, NodeSnapshot, RenderNode, RenderNodeKind, RenderParams,
    RenderingPassInfo, SceneRenderFlags, SharedNode, SnapshotCell, Vec3,
};
pub use sync::{FrameSemaphore, RemovedNodesManager};
