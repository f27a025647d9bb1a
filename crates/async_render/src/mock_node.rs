//! Stand-in clone for nodes that cannot render off the tick thread.
//!
//! A mock mirrors bounds, position and view distance like any clone, so the
//! worker's traversal culls it correctly. Its `render` never draws: in
//! capture mode it posts a [`DeferredRender`], otherwise it forwards to the
//! original at once.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

use async_render_core::{
    Aabb, NodeId, RenderNode, RenderNodeKind, RenderParams, RenderingPassInfo, SceneEngine,
    SharedNode, SnapshotCell, Vec3,
};

use crate::nodes::{DeferredRender, DeferredRenderSink};

/// Buffered arguments of the last streaming priority update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StreamableUpdateArgs {
    /// Real distance to the camera.
    pub distance: f32,
    /// Importance factor.
    pub importance: f32,
    /// Full update requested.
    pub full_update: bool,
    /// Not yet applied.
    pub pending: bool,
}

/// Clone substitute that defers rendering to the tick thread.
pub struct MockAsyncRenderNode {
    id: NodeId,
    name: String,
    snapshot: SnapshotCell,
    streamable: bool,
    original: Weak<dyn RenderNode>,
    sink: DeferredRenderSink,
    update_arguments: Mutex<Option<StreamableUpdateArgs>>,
}

impl MockAsyncRenderNode {
    /// Creates a mock mirroring `original`.
    #[must_use]
    pub fn new(original: &SharedNode, sink: DeferredRenderSink) -> Arc<Self> {
        Arc::new(Self {
            id: NodeId::next(),
            name: original.name().to_owned(),
            snapshot: SnapshotCell::capture(original.as_ref()),
            streamable: original.kind().is_streamable(),
            original: Arc::downgrade(original),
            sink,
            update_arguments: Mutex::new(None),
        })
    }

    /// Whether streaming priority updates are buffered for this node.
    #[must_use]
    pub fn is_streamable(&self) -> bool {
        self.streamable
    }

    /// The buffered update, if one is waiting to be applied.
    #[must_use]
    pub fn pending_update(&self) -> Option<StreamableUpdateArgs> {
        self.update_arguments.lock().filter(|args| args.pending)
    }

    /// Applies the buffered streaming update to `original`.
    ///
    /// Tick thread only: the engine's streaming state is not thread safe.
    pub fn update_streamable_components(
        &self,
        original: &dyn RenderNode,
        pass: &RenderingPassInfo,
        engine: &dyn SceneEngine,
    ) {
        if !self.streamable {
            return;
        }
        let mut arguments = self.update_arguments.lock();
        if let Some(args) = arguments.as_mut().filter(|args| args.pending) {
            engine.update_render_node_streaming_priority(
                original,
                args.distance,
                args.importance,
                args.full_update,
                pass,
            );
            args.pending = false;
        }
    }
}

impl RenderNode for MockAsyncRenderNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> RenderNodeKind {
        RenderNodeKind::AsyncMock
    }

    fn bbox(&self) -> Aabb {
        self.snapshot.get().bbox
    }

    fn position(&self) -> Vec3 {
        self.snapshot.get().position
    }

    fn max_view_distance(&self) -> f32 {
        self.snapshot.get().max_view_distance
    }

    fn supports_async_render(&self) -> bool {
        true
    }

    fn clone_node(&self) -> SharedNode {
        Arc::new(Self {
            id: NodeId::next(),
            name: self.name.clone(),
            snapshot: SnapshotCell::new(self.snapshot.get()),
            streamable: self.streamable,
            original: Weak::clone(&self.original),
            sink: self.sink.clone(),
            update_arguments: Mutex::new(None),
        })
    }

    fn copy_updated_data(&self, original: &dyn RenderNode) {
        self.snapshot.copy_from(original);
    }

    fn render(&self, params: &RenderParams, pass: &RenderingPassInfo) {
        if self.sink.is_capturing() {
            self.sink.push(DeferredRender {
                node: self.id,
                params: *params,
                pass: *pass,
            });
        } else if let Some(original) = self.original.upgrade() {
            original.render(params, pass);
        }
    }

    fn update_streamable_data(&self, distance: f32, importance: f32, full_update: bool) -> bool {
        if self.streamable {
            *self.update_arguments.lock() = Some(StreamableUpdateArgs {
                distance,
                importance,
                full_update,
                pending: true,
            });
        }
        self.streamable
    }
}

impl std::fmt::Debug for MockAsyncRenderNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockAsyncRenderNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("streamable", &self.streamable)
            .finish_non_exhaustive()
    }
}
