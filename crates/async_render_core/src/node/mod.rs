//! # Render Nodes
//!
//! A render node is an engine-owned drawable (mesh, particle emitter, light).
//! The async subsystem never owns an original node; it owns *clones*:
//! snapshot copies the render worker may read while the tick thread keeps
//! mutating the originals.
//!
//! ```text
//!   original (engine)            clone (subsystem)
//!   ┌──────────────┐  copy   ┌──────────────┐
//!   │ bbox / pos   │ ──────► │ SnapshotCell │ ◄── worker reads
//!   │ view dist    │         └──────────────┘
//!   └──────────────┘
//! ```
//!
//! Identity is a [`NodeId`] token instead of an address, so ordering and
//! lookups do not depend on where the allocator put a node.

mod geometry;
mod pass;

pub use geometry::{Aabb, Camera, Vec3, VEC_EPSILON};
pub use pass::{RenderParams, RenderingPassInfo, SceneRenderFlags};

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable, process-unique identity of a render node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocates a fresh identity. Never returns the same value twice.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value, for logging.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Engine node categories the subsystem needs to tell apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderNodeKind {
    /// Static geometry.
    Brush,
    /// Animated character.
    Character,
    /// Vegetation instance.
    Vegetation,
    /// Light source.
    Light,
    /// Projected decal.
    Decal,
    /// Particle emitter. Streams its resources.
    ParticleEmitter,
    /// Merged mesh batch. Streams its resources.
    MergedMesh,
    /// Stand-in created for nodes that cannot render off the tick thread.
    AsyncMock,
}

impl RenderNodeKind {
    /// Kinds whose streaming priority must be driven from the tick thread.
    #[inline]
    #[must_use]
    pub const fn is_streamable(self) -> bool {
        matches!(self, Self::ParticleEmitter | Self::MergedMesh)
    }
}

/// Shared handle to a render node.
pub type SharedNode = Arc<dyn RenderNode>;

/// The contract every node type satisfies to take part in async rendering.
///
/// Methods taking `&self` that change state (`copy_updated_data`,
/// `update_streamable_data`) rely on interior mutability; the frame protocol
/// guarantees they never run while the worker is reading the same node.
pub trait RenderNode: Send + Sync {
    /// Identity of this node.
    fn id(&self) -> NodeId;

    /// Human readable name.
    fn name(&self) -> &str;

    /// Node category.
    fn kind(&self) -> RenderNodeKind;

    /// World space bounds.
    fn bbox(&self) -> Aabb;

    /// World position.
    fn position(&self) -> Vec3;

    /// Distance beyond which the node is culled.
    fn max_view_distance(&self) -> f32;

    /// Whether `render` is safe to call from the render worker.
    fn supports_async_render(&self) -> bool;

    /// Creates a snapshot clone with a new identity.
    fn clone_node(&self) -> SharedNode;

    /// Refreshes this clone from `original`.
    fn copy_updated_data(&self, original: &dyn RenderNode);

    /// Submits draw work for this node.
    fn render(&self, params: &RenderParams, pass: &RenderingPassInfo);

    /// Streaming priority update issued by the traversal.
    ///
    /// Returns true if the node consumed the update itself.
    fn update_streamable_data(&self, _distance: f32, _importance: f32, _full_update: bool) -> bool {
        false
    }
}

/// The slice of node state a clone mirrors.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NodeSnapshot {
    /// World space bounds.
    pub bbox: Aabb,
    /// World position.
    pub position: Vec3,
    /// Cull distance.
    pub max_view_distance: f32,
}

impl NodeSnapshot {
    /// Reads the mirrored state out of `node`.
    #[must_use]
    pub fn capture(node: &dyn RenderNode) -> Self {
        Self {
            bbox: node.bbox(),
            position: node.position(),
            max_view_distance: node.max_view_distance(),
        }
    }
}

/// Snapshot storage for clone nodes.
///
/// Written by the tick thread before dispatch, read by the worker during
/// traversal. The lock is never contended while the frame protocol holds.
#[derive(Debug, Default)]
pub struct SnapshotCell {
    inner: RwLock<NodeSnapshot>,
}

impl SnapshotCell {
    /// Creates a cell holding `snapshot`.
    #[must_use]
    pub fn new(snapshot: NodeSnapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    /// Creates a cell holding the current state of `node`.
    #[must_use]
    pub fn capture(node: &dyn RenderNode) -> Self {
        Self::new(NodeSnapshot::capture(node))
    }

    /// Current snapshot.
    #[inline]
    #[must_use]
    pub fn get(&self) -> NodeSnapshot {
        *self.inner.read()
    }

    /// Replaces the snapshot with the current state of `node`.
    pub fn copy_from(&self, node: &dyn RenderNode) {
        *self.inner.write() = NodeSnapshot::capture(node);
    }
}
