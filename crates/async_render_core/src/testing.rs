//! Recording collaborators for tests and benches.
//!
//! Every call into the fake engine, the fake world renderer and the fake
//! render nodes is appended to one shared [`CallTrace`], so tests can assert
//! on ordering across all three.

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crate::engine::{SceneEngine, WorldRenderer};
use crate::node::{
    Aabb, Camera, NodeId, NodeSnapshot, RenderNode, RenderNodeKind, RenderParams,
    RenderingPassInfo, SceneRenderFlags, SharedNode, Vec3,
};

/// One recorded call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceEvent {
    /// A clone refreshed itself from its original.
    Copy(NodeId),
    /// A node was rendered on the given pass thread.
    Render(NodeId),
    /// `SceneEngine::register_entity`.
    Register(NodeId),
    /// `SceneEngine::free_render_node_state`.
    Free(NodeId),
    /// `SceneEngine::release_render_node`.
    Release(NodeId),
    /// `SceneEngine::update_render_node_streaming_priority`.
    StreamingPriority(NodeId),
    /// `WorldRenderer::pre_render`.
    PreRender,
    /// `WorldRenderer::prepare_occlusion`.
    PrepareOcclusion,
    /// `WorldRenderer::render_world`.
    RenderWorld,
    /// `WorldRenderer::update_particles`.
    UpdateParticles,
    /// `WorldRenderer::render_scene_end`.
    SceneEnd,
    /// `WorldRenderer::update_post_render`.
    PostRender,
    /// `WorldRenderer::end_occlusion`.
    EndOcclusion,
    /// `WorldRenderer::on_scene_3d_end`.
    Scene3dEnd,
    /// `WorldRenderer::render_text_messages`.
    TextMessages,
    /// `WorldRenderer::world_stream_update`.
    StreamUpdate,
    /// `WorldRenderer::switch_to_native_resolution_backbuffer`.
    BackbufferSwitch,
}

/// Shared, append-only call log.
#[derive(Clone, Debug, Default)]
pub struct CallTrace {
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl CallTrace {
    /// Creates an empty trace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn push(&self, event: TraceEvent) {
        self.events.lock().push(event);
    }

    /// Copy of all events so far.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    /// Removes and returns all events so far.
    pub fn take(&self) -> Vec<TraceEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Number of recorded occurrences of `event`.
    #[must_use]
    pub fn count(&self, event: TraceEvent) -> usize {
        self.events.lock().iter().filter(|e| **e == event).count()
    }

    /// Index of the first occurrence of `event`.
    #[must_use]
    pub fn position(&self, event: TraceEvent) -> Option<usize> {
        self.events.lock().iter().position(|e| *e == event)
    }
}

/// Configurable render node that records what happens to it.
pub struct TestNode {
    id: NodeId,
    name: String,
    kind: RenderNodeKind,
    supports_async: bool,
    clone_of: Option<NodeId>,
    state: RwLock<NodeSnapshot>,
    trace: CallTrace,
}

impl TestNode {
    /// A node that supports async rendering.
    #[must_use]
    pub fn new(name: &str, kind: RenderNodeKind, trace: &CallTrace) -> Arc<Self> {
        Self::build(name, kind, true, trace)
    }

    /// A node that must not render off the tick thread.
    #[must_use]
    pub fn unsupported(name: &str, kind: RenderNodeKind, trace: &CallTrace) -> Arc<Self> {
        Self::build(name, kind, false, trace)
    }

    fn build(name: &str, kind: RenderNodeKind, supports_async: bool, trace: &CallTrace) -> Arc<Self> {
        Arc::new(Self {
            id: NodeId::next(),
            name: name.to_owned(),
            kind,
            supports_async,
            clone_of: None,
            state: RwLock::new(NodeSnapshot {
                bbox: Aabb::from_center(Vec3::ZERO, 1.0),
                position: Vec3::ZERO,
                max_view_distance: 100.0,
            }),
            trace: trace.clone(),
        })
    }

    /// Moves the node; bounds follow.
    pub fn set_position(&self, position: Vec3) {
        let mut state = self.state.write();
        state.position = position;
        state.bbox = Aabb::from_center(position, 1.0);
    }

    /// Changes the cull distance.
    pub fn set_max_view_distance(&self, distance: f32) {
        self.state.write().max_view_distance = distance;
    }

    /// Original this node was cloned from.
    #[must_use]
    pub fn clone_of(&self) -> Option<NodeId> {
        self.clone_of
    }

    /// Upcast helper.
    #[must_use]
    pub fn shared(self: &Arc<Self>) -> SharedNode {
        Arc::clone(self) as SharedNode
    }
}

impl RenderNode for TestNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> RenderNodeKind {
        self.kind
    }

    fn bbox(&self) -> Aabb {
        self.state.read().bbox
    }

    fn position(&self) -> Vec3 {
        self.state.read().position
    }

    fn max_view_distance(&self) -> f32 {
        self.state.read().max_view_distance
    }

    fn supports_async_render(&self) -> bool {
        self.supports_async
    }

    fn clone_node(&self) -> SharedNode {
        Arc::new(Self {
            id: NodeId::next(),
            name: self.name.clone(),
            kind: self.kind,
            supports_async: true,
            clone_of: Some(self.id),
            state: RwLock::new(*self.state.read()),
            trace: self.trace.clone(),
        })
    }

    fn copy_updated_data(&self, original: &dyn RenderNode) {
        *self.state.write() = NodeSnapshot::capture(original);
        self.trace.push(TraceEvent::Copy(self.id));
    }

    fn render(&self, _params: &RenderParams, _pass: &RenderingPassInfo) {
        self.trace.push(TraceEvent::Render(self.id));
    }
}

type EngineCallback = Box<dyn Fn(EngineCall, &SharedNode) + Send + Sync>;

/// Which engine primitive triggered a callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineCall {
    /// From inside `register_entity`.
    Register,
    /// From inside `free_render_node_state`.
    Free,
    /// From inside `release_render_node`.
    Release,
}

/// Scene engine keeping a flat "octree" of registered nodes.
#[derive(Default)]
pub struct RecordingEngine {
    registered: Mutex<BTreeMap<NodeId, SharedNode>>,
    trace: CallTrace,
    callback: OnceLock<EngineCallback>,
}

impl RecordingEngine {
    /// Creates an engine logging into `trace`.
    #[must_use]
    pub fn new(trace: &CallTrace) -> Arc<Self> {
        Arc::new(Self {
            registered: Mutex::new(BTreeMap::new()),
            trace: trace.clone(),
            callback: OnceLock::new(),
        })
    }

    /// Installs a hook run from inside every registration primitive, the way
    /// a real octree notifies listeners. Only the first call has effect.
    pub fn set_callback(&self, callback: impl Fn(EngineCall, &SharedNode) + Send + Sync + 'static) {
        let _ = self.callback.set(Box::new(callback));
    }

    /// Returns true if `id` is currently in the octree.
    #[must_use]
    pub fn is_registered(&self, id: NodeId) -> bool {
        self.registered.lock().contains_key(&id)
    }

    /// Ids currently in the octree.
    #[must_use]
    pub fn registered_ids(&self) -> Vec<NodeId> {
        self.registered.lock().keys().copied().collect()
    }

    /// Renders every registered node, like a scene traversal would.
    pub fn traverse(&self, pass: &RenderingPassInfo) {
        let nodes: Vec<SharedNode> = self.registered.lock().values().cloned().collect();
        for node in nodes {
            let snapshot = NodeSnapshot::capture(node.as_ref());
            let params = RenderParams {
                distance: distance(snapshot.position, pass.camera.position),
                alpha: 1.0,
                ..RenderParams::default()
            };
            node.render(&params, pass);
            node.update_streamable_data(params.distance, 1.0, false);
        }
    }

    fn notify(&self, call: EngineCall, node: &SharedNode) {
        if let Some(callback) = self.callback.get() {
            callback(call, node);
        }
    }
}

fn distance(a: Vec3, b: Vec3) -> f32 {
    let (dx, dy, dz) = (a.x - b.x, a.y - b.y, a.z - b.z);
    (dx * dx + dy * dy + dz * dz).sqrt()
}

impl SceneEngine for RecordingEngine {
    fn register_entity(&self, node: &SharedNode) {
        self.trace.push(TraceEvent::Register(node.id()));
        self.notify(EngineCall::Register, node);
        self.registered.lock().insert(node.id(), Arc::clone(node));
    }

    fn free_render_node_state(&self, node: &SharedNode) {
        self.trace.push(TraceEvent::Free(node.id()));
        self.notify(EngineCall::Free, node);
        self.registered.lock().remove(&node.id());
    }

    fn release_render_node(&self, node: &SharedNode) {
        self.trace.push(TraceEvent::Release(node.id()));
        self.notify(EngineCall::Release, node);
        self.registered.lock().remove(&node.id());
    }

    fn update_render_node_streaming_priority(
        &self,
        node: &dyn RenderNode,
        _distance: f32,
        _importance: f32,
        _full_update: bool,
        _pass: &RenderingPassInfo,
    ) {
        self.trace.push(TraceEvent::StreamingPriority(node.id()));
    }
}

/// World renderer driving [`RecordingEngine::traverse`] as its scene render.
pub struct RecordingWorld {
    engine: Arc<RecordingEngine>,
    camera: Mutex<Camera>,
    render_delay: Mutex<Duration>,
    render_threads: Mutex<Vec<ThreadId>>,
    dedicated: bool,
    trace: CallTrace,
}

impl RecordingWorld {
    /// Creates a world over `engine` with a camera away from the origin.
    #[must_use]
    pub fn new(engine: &Arc<RecordingEngine>, trace: &CallTrace) -> Arc<Self> {
        Arc::new(Self {
            engine: Arc::clone(engine),
            camera: Mutex::new(Camera::at(Vec3::new(0.0, -10.0, 2.0))),
            render_delay: Mutex::new(Duration::ZERO),
            render_threads: Mutex::new(Vec::new()),
            dedicated: false,
            trace: trace.clone(),
        })
    }

    /// Replaces the live view camera.
    pub fn set_camera(&self, camera: Camera) {
        *self.camera.lock() = camera;
    }

    /// Makes `render_world` take at least `delay`.
    pub fn set_render_delay(&self, delay: Duration) {
        *self.render_delay.lock() = delay;
    }

    /// Threads `render_world` ran on, in order.
    #[must_use]
    pub fn render_threads(&self) -> Vec<ThreadId> {
        self.render_threads.lock().clone()
    }
}

impl WorldRenderer for RecordingWorld {
    fn pre_render(&self) {
        self.trace.push(TraceEvent::PreRender);
    }

    fn view_camera(&self) -> Camera {
        *self.camera.lock()
    }

    fn prepare_occlusion(&self, _camera: &Camera) {
        self.trace.push(TraceEvent::PrepareOcclusion);
    }

    fn render_world(&self, camera: &Camera) {
        self.render_threads.lock().push(thread::current().id());
        self.trace.push(TraceEvent::RenderWorld);
        let delay = *self.render_delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.engine.traverse(&RenderingPassInfo::general_pass(*camera));
    }

    fn is_dedicated(&self) -> bool {
        self.dedicated
    }

    fn update_particles(&self) {
        self.trace.push(TraceEvent::UpdateParticles);
    }

    fn render_scene_end(&self, _flags: SceneRenderFlags, _pass: &RenderingPassInfo) {
        self.trace.push(TraceEvent::SceneEnd);
    }

    fn update_post_render(&self, _pass: &RenderingPassInfo) {
        self.trace.push(TraceEvent::PostRender);
    }

    fn end_occlusion(&self) {
        self.trace.push(TraceEvent::EndOcclusion);
    }

    fn on_scene_3d_end(&self) {
        self.trace.push(TraceEvent::Scene3dEnd);
    }

    fn render_text_messages(&self) {
        self.trace.push(TraceEvent::TextMessages);
    }

    fn world_stream_update(&self) {
        self.trace.push(TraceEvent::StreamUpdate);
    }

    fn switch_to_native_resolution_backbuffer(&self) {
        self.trace.push(TraceEvent::BackbufferSwitch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_gets_new_identity() {
        let trace = CallTrace::new();
        let node = TestNode::new("rock", RenderNodeKind::Brush, &trace);
        node.set_position(Vec3::new(3.0, 0.0, 0.0));

        let clone = node.clone_node();
        assert_ne!(clone.id(), node.id());
        assert_eq!(clone.position(), Vec3::new(3.0, 0.0, 0.0));

        node.set_position(Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(clone.position(), Vec3::new(3.0, 0.0, 0.0));
        clone.copy_updated_data(node.as_ref());
        assert_eq!(clone.position(), Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(trace.count(TraceEvent::Copy(clone.id())), 1);
    }

    #[test]
    fn test_engine_traverses_registered_nodes() {
        let trace = CallTrace::new();
        let engine = RecordingEngine::new(&trace);
        let node = TestNode::new("tree", RenderNodeKind::Vegetation, &trace).shared();

        engine.register_entity(&node);
        assert!(engine.is_registered(node.id()));

        engine.traverse(&RenderingPassInfo::general_pass(Camera::default()));
        assert_eq!(trace.count(TraceEvent::Render(node.id())), 1);

        engine.free_render_node_state(&node);
        assert!(engine.registered_ids().is_empty());
    }
}
