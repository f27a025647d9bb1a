//! Integration tests driving whole frames through the system component.
//!
//! Run with: cargo test -p async_render --test frame_protocol_test

use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use async_render::{
    AsyncRenderConfig, AsyncRenderWorldNodeRemove, AsyncRenderWorldRequests, AsyncRenderWorldSynchronization,
    HostEnvironment, NodeAction, RegistrationDecision, RenderNodesManager, SyncEntry, SystemComponent, SystemEvent,
};
use async_render_core::testing::{CallTrace, EngineCall, RecordingEngine, RecordingWorld, TestNode, TraceEvent};
use async_render_core::{Aabb, Camera, NodeId, RenderNode, RenderNodeKind, RenderParams, RenderingPassInfo, SharedNode, Vec3};
use parking_lot::Mutex;

const FRAME: Duration = Duration::from_millis(16);
const GAME_HOST: HostEnvironment = HostEnvironment { is_editor: false, cpu_cores: 8 };

struct Harness {
    trace: CallTrace,
    engine: Arc<RecordingEngine>,
    world: Arc<RecordingWorld>,
    system: Arc<SystemComponent>,
}

impl Harness {
    fn new(config: AsyncRenderConfig) -> Self {
        let trace = CallTrace::new();
        let engine = RecordingEngine::new(&trace);
        let world = RecordingWorld::new(&engine, &trace);
        let system = Arc::new(SystemComponent::new(config, GAME_HOST, engine.clone(), world.clone()));
        system.load_configuration();
        Self { trace, engine, world, system }
    }

    fn loaded(config: AsyncRenderConfig) -> Self {
        let harness = Self::new(config);
        harness.system.on_system_event(SystemEvent::LevelLoadEnd);
        harness
    }

    /// One engine frame in the order the frame loop calls the hooks.
    fn frame(&self) {
        self.system.process_async_render_nodes();
        self.system.on_tick(FRAME);
        self.system.wait_rendering_completed();
        self.system.do_after_async_rendering_completed();
        self.system.clean_removed_render_nodes();
    }

    fn register(&self, node: &SharedNode) -> RegistrationDecision {
        self.system.change_render_node_registered_state(node, true)
    }

    fn unregister(&self, node: &SharedNode) -> RegistrationDecision {
        self.system.change_render_node_registered_state(node, false)
    }

    fn shadow_of(&self, id: NodeId) -> Option<NodeId> {
        self.system
            .with_nodes_manager(|manager| manager.entry(id).and_then(SyncEntry::shadow_id))
            .flatten()
    }

    fn action_of(&self, id: NodeId) -> Option<NodeAction> {
        self.system
            .with_nodes_manager(|manager| manager.entry(id).map(SyncEntry::action))
            .flatten()
    }

    fn entry_count(&self) -> usize {
        self.system
            .with_nodes_manager(RenderNodesManager::entry_count)
            .unwrap_or_default()
    }
}

fn enabled() -> AsyncRenderConfig {
    AsyncRenderConfig { enable: true, ..AsyncRenderConfig::default() }
}

fn brush(name: &str, trace: &CallTrace) -> SharedNode {
    TestNode::new(name, RenderNodeKind::Brush, trace).shared()
}

// ============================================================================
// REGISTRATION
// ============================================================================

#[test]
fn test_registered_node_is_replaced_by_its_clone() {
    let h = Harness::loaded(enabled());
    let rock = brush("rock", &h.trace);

    assert_eq!(h.register(&rock), RegistrationDecision::SkipOctree);
    assert!(!h.engine.is_registered(rock.id()));

    h.frame();

    let shadow = h.shadow_of(rock.id()).expect("clone created");
    assert_ne!(shadow, rock.id());
    assert_eq!(h.engine.registered_ids(), vec![shadow]);
    assert_eq!(h.action_of(rock.id()), Some(NodeAction::Update));
    assert_eq!(h.trace.count(TraceEvent::Render(shadow)), 1);
    assert_eq!(h.trace.count(TraceEvent::Render(rock.id())), 0);
}

#[test]
fn test_one_entry_per_node_across_state_flips() {
    let h = Harness::loaded(enabled());
    let rock = brush("rock", &h.trace);

    h.register(&rock);
    h.unregister(&rock);
    h.register(&rock);
    assert_eq!(h.entry_count(), 1);
    assert_eq!(h.action_of(rock.id()), Some(NodeAction::Register));

    h.frame();

    let shadow = h.shadow_of(rock.id()).expect("clone created");
    assert_eq!(h.trace.count(TraceEvent::Register(shadow)), 1);
    assert_eq!(h.entry_count(), 1);
}

#[test]
fn test_unregister_takes_clone_out_of_octree() {
    let h = Harness::loaded(enabled());
    let rock = brush("rock", &h.trace);
    h.register(&rock);
    h.frame();
    let shadow = h.shadow_of(rock.id()).expect("clone created");

    // The engine may address the clone rather than the original
    let clone: SharedNode = Arc::new(AliasNode(shadow));
    assert_eq!(h.unregister(&clone), RegistrationDecision::SkipOctree);
    assert_eq!(h.action_of(rock.id()), Some(NodeAction::Unregister));

    h.trace.take();
    h.frame();

    assert!(!h.engine.is_registered(shadow));
    assert_eq!(h.trace.count(TraceEvent::Free(shadow)), 1);
    assert_eq!(h.trace.count(TraceEvent::Render(shadow)), 0);
    assert_eq!(h.action_of(rock.id()), Some(NodeAction::OutOfAction));

    // Re-registering reuses the clone
    h.register(&rock);
    h.frame();
    assert_eq!(h.shadow_of(rock.id()), Some(shadow));
    assert!(h.engine.is_registered(shadow));
}

#[test]
fn test_updates_are_copied_before_registrations() {
    let h = Harness::loaded(enabled());
    let first = brush("first", &h.trace);
    let second = brush("second", &h.trace);

    h.register(&first);
    h.frame();
    let first_shadow = h.shadow_of(first.id()).expect("clone created");

    h.trace.take();
    h.register(&second);
    h.system.process_async_render_nodes();
    let second_shadow = h.shadow_of(second.id()).expect("clone created");

    let copy = h.trace.position(TraceEvent::Copy(first_shadow)).expect("update copied");
    let register = h.trace.position(TraceEvent::Register(second_shadow)).expect("clone registered");
    assert!(copy < register);

    h.system.on_tick(FRAME);
    h.system.wait_rendering_completed();
    h.system.do_after_async_rendering_completed();
    h.system.clean_removed_render_nodes();
}

#[test]
fn test_clone_sees_state_committed_before_dispatch() {
    let h = Harness::loaded(enabled());
    let rock = TestNode::new("rock", RenderNodeKind::Brush, &h.trace);
    let shared = rock.shared();
    h.register(&shared);
    h.frame();

    rock.set_position(Vec3::new(4.0, 2.0, 0.0));
    h.frame();

    let shadow = h.shadow_of(rock.id()).expect("clone created");
    assert!(h.engine.is_registered(shadow));
    assert_eq!(h.trace.count(TraceEvent::Copy(shadow)), 1);
}

// ============================================================================
// DELETION
// ============================================================================

#[test]
fn test_delete_before_first_commit_never_registers() {
    let h = Harness::loaded(enabled());
    let rock = brush("rock", &h.trace);

    h.register(&rock);
    h.system.delete_render_node(rock.id());
    h.frame();

    assert_eq!(h.entry_count(), 0);
    assert!(h.engine.registered_ids().is_empty());
    assert!(!h.trace.events().iter().any(|e| matches!(e, TraceEvent::Register(_))));
}

#[test]
fn test_deleted_clone_is_released_two_cleanups_later() {
    let h = Harness::loaded(enabled());
    let rock = brush("rock", &h.trace);
    h.register(&rock);
    h.frame();
    let shadow = h.shadow_of(rock.id()).expect("clone created");

    h.system.delete_render_node(rock.id());
    assert_eq!(h.entry_count(), 0);
    // Still in the octree until the next commit
    assert!(h.engine.is_registered(shadow));

    h.trace.take();
    h.frame();
    let events = h.trace.events();
    let freed = events.iter().position(|e| *e == TraceEvent::Free(shadow)).expect("freed");
    let rendered = events.iter().position(|e| *e == TraceEvent::RenderWorld).expect("rendered");
    assert!(freed < rendered);
    assert_eq!(h.trace.count(TraceEvent::Render(shadow)), 0);
    assert_eq!(h.trace.count(TraceEvent::Release(shadow)), 0);
    assert_eq!(h.system.with_nodes_manager(|m| m.is_removed(shadow)), Some(true));

    h.frame();
    assert_eq!(h.trace.count(TraceEvent::Release(shadow)), 1);
    assert_eq!(h.system.with_nodes_manager(|m| m.is_removed(shadow)), Some(false));
    assert_eq!(h.system.with_nodes_manager(RenderNodesManager::owned_count), Some(0));
}

#[test]
fn test_registration_of_removed_clone_is_skipped() {
    let h = Harness::loaded(enabled());
    let rock = brush("rock", &h.trace);
    h.register(&rock);
    h.frame();
    let shadow = h.shadow_of(rock.id()).expect("clone created");
    h.system.delete_render_node(rock.id());

    let clone: SharedNode = Arc::new(AliasNode(shadow));
    assert_eq!(h.register(&clone), RegistrationDecision::SkipOctree);
    assert_eq!(h.entry_count(), 0);

    h.frame();
    h.frame();
}

// ============================================================================
// UNSUPPORTED NODES
// ============================================================================

#[test]
fn test_unsupported_node_renders_on_tick_thread_before_scene_end() {
    let h = Harness::loaded(enabled());
    let emitter = TestNode::unsupported("sparks", RenderNodeKind::ParticleEmitter, &h.trace).shared();

    h.register(&emitter);
    h.frame();

    assert_eq!(h.system.with_nodes_manager(|m| m.entry(emitter.id()).map(SyncEntry::is_mocked)).flatten(), Some(true));
    let render = h.trace.position(TraceEvent::Render(emitter.id())).expect("original rendered");
    let scene_end = h.trace.position(TraceEvent::SceneEnd).expect("scene closed");
    let world = h.trace.position(TraceEvent::RenderWorld).expect("world rendered");
    assert!(world < render);
    assert!(render < scene_end);

    // Streaming priority reaches the engine once, for the original
    assert_eq!(h.trace.count(TraceEvent::StreamingPriority(emitter.id())), 1);
    assert_eq!(h.system.with_nodes_manager(RenderNodesManager::pending_unsupported_renders), Some(0));
}

#[test]
fn test_unsupported_nodes_skip_octree_when_not_mocked() {
    let mut config = enabled();
    config.nodes.register_unsupported_nodes = false;
    let h = Harness::loaded(config);
    let emitter = TestNode::unsupported("sparks", RenderNodeKind::ParticleEmitter, &h.trace).shared();

    assert_eq!(h.register(&emitter), RegistrationDecision::SkipOctree);
    h.frame();
    assert_eq!(h.entry_count(), 0);
    assert!(h.engine.registered_ids().is_empty());
}

#[test]
fn test_frames_without_scene_end_drop_captured_renders() {
    let h = Harness::loaded(enabled());
    h.world.set_camera(Camera::default());
    let emitter = TestNode::unsupported("sparks", RenderNodeKind::ParticleEmitter, &h.trace).shared();

    h.register(&emitter);
    for _ in 0..5 {
        h.frame();
    }
    assert_eq!(h.trace.count(TraceEvent::SceneEnd), 0);
    assert_eq!(h.trace.count(TraceEvent::Render(emitter.id())), 0);
    assert_eq!(h.system.with_nodes_manager(RenderNodesManager::pending_unsupported_renders), Some(0));

    // Only the draw captured this frame is replayed
    h.world.set_camera(Camera::at(Vec3::new(0.0, -10.0, 2.0)));
    h.frame();
    assert_eq!(h.trace.count(TraceEvent::Render(emitter.id())), 1);
    assert_eq!(h.system.with_nodes_manager(RenderNodesManager::pending_unsupported_renders), Some(0));
}

// ============================================================================
// ENGINE CALLBACKS
// ============================================================================

#[test]
fn test_engine_callbacks_during_commit_modify_octree() {
    let h = Harness::loaded(enabled());
    let decisions: Arc<Mutex<Vec<(EngineCall, RegistrationDecision)>>> = Arc::default();

    let system: Weak<SystemComponent> = Arc::downgrade(&h.system);
    let recorded = Arc::clone(&decisions);
    h.engine.set_callback(move |call, node| {
        let Some(system) = system.upgrade() else {
            return;
        };
        match call {
            EngineCall::Register | EngineCall::Free => {
                let decision = system.change_render_node_registered_state(node, call == EngineCall::Register);
                recorded.lock().push((call, decision));
            }
            EngineCall::Release => system.delete_render_node(node.id()),
        }
    });

    let rock = brush("rock", &h.trace);
    h.register(&rock);
    h.frame();
    h.system.delete_render_node(rock.id());
    h.frame();
    h.frame();

    let decisions = decisions.lock().clone();
    assert!(!decisions.is_empty());
    assert!(decisions
        .iter()
        .all(|(_, decision)| *decision == RegistrationDecision::ModifyOctree));
    assert!(decisions.iter().any(|(call, _)| *call == EngineCall::Register));
    assert!(decisions.iter().any(|(call, _)| *call == EngineCall::Free));
    assert_eq!(h.entry_count(), 0);
}

// ============================================================================
// EXECUTION MODES
// ============================================================================

#[test]
fn test_worker_renders_off_tick_thread() {
    let h = Harness::loaded(enabled());
    h.world.set_render_delay(Duration::from_millis(5));
    h.frame();
    h.frame();

    let threads = h.world.render_threads();
    assert_eq!(threads.len(), 2);
    assert!(threads.iter().all(|id| *id != thread::current().id()));
    assert_eq!(threads[0], threads[1]);
}

#[test]
fn test_sequential_mode_renders_inline() {
    let mut config = enabled();
    config.sequential_execution_order = true;
    let h = Harness::loaded(config);
    let rock = brush("rock", &h.trace);
    h.register(&rock);
    h.frame();

    assert_eq!(h.world.render_threads(), vec![thread::current().id()]);
    let events = h.trace.events();
    let pre_render = events.iter().position(|e| *e == TraceEvent::PreRender).expect("pre render");
    let scene_end = events.iter().position(|e| *e == TraceEvent::SceneEnd).expect("scene end");
    let backbuffer = events.iter().position(|e| *e == TraceEvent::BackbufferSwitch).expect("backbuffer");
    assert!(pre_render < scene_end);
    assert!(scene_end < backbuffer);
}

#[test]
fn test_disabled_configuration_keeps_engine_in_charge() {
    let h = Harness::loaded(AsyncRenderConfig::default());
    assert!(!h.system.is_enabled());
    let rock = brush("rock", &h.trace);

    assert_eq!(h.register(&rock), RegistrationDecision::ModifyOctree);
    h.frame();
    assert!(h.world.render_threads().is_empty());
    assert_eq!(h.entry_count(), 0);
}

#[test]
fn test_configuration_loaded_from_toml() {
    let config = AsyncRenderConfig::from_toml_str(
        r#"
        enable = true
        sequential_execution_order = true

        [nodes]
        parallel_copy = false
        "#,
    )
    .unwrap();
    let h = Harness::loaded(config);
    assert!(h.system.is_enabled());
    h.frame();
    assert_eq!(h.world.render_threads(), vec![thread::current().id()]);
}

// ============================================================================
// LEVEL TRANSITIONS
// ============================================================================

#[test]
fn test_loading_frames_render_synchronously() {
    let h = Harness::new(enabled());
    assert!(h.system.is_level_loading());
    let rock = brush("rock", &h.trace);

    // Applied immediately while loading
    h.register(&rock);
    let shadow = h.shadow_of(rock.id()).expect("clone created");
    assert!(h.engine.is_registered(shadow));

    h.frame();
    assert_eq!(h.world.render_threads(), vec![thread::current().id()]);
    assert_eq!(h.trace.count(TraceEvent::Render(shadow)), 1);
}

#[test]
fn test_level_unload_leaves_nothing_behind() {
    let h = Harness::loaded(enabled());
    let nodes: Vec<SharedNode> = (0..8).map(|i| brush(&format!("rock_{i}"), &h.trace)).collect();
    for node in &nodes {
        h.register(node);
    }
    h.frame();
    assert_eq!(h.engine.registered_ids().len(), nodes.len());

    // Unload starts while a render is in flight
    h.world.set_render_delay(Duration::from_millis(5));
    h.system.process_async_render_nodes();
    h.system.on_tick(FRAME);
    h.system.level_unload_start();
    assert!(h.system.is_level_loading());

    for node in &nodes {
        h.system.delete_render_node(node.id());
    }
    h.system.clean_removed_render_nodes();
    h.system.on_system_event(SystemEvent::LevelPostUnload);

    assert!(h.engine.registered_ids().is_empty());
    assert_eq!(
        h.system
            .with_nodes_manager(RenderNodesManager::check_nodes_removed_after_level_unload),
        Some(true)
    );
    for node in &nodes {
        assert_eq!(h.trace.count(TraceEvent::Release(node.id())), 0);
    }
}

#[test]
fn test_replay_start_enters_loading() {
    let h = Harness::loaded(enabled());
    assert!(!h.system.is_level_loading());
    h.system.replay_start();
    assert!(h.system.is_level_loading());
}

/// Stand-in for an engine handle addressing a node by id only.
struct AliasNode(NodeId);

impl RenderNode for AliasNode {
    fn id(&self) -> NodeId {
        self.0
    }

    fn name(&self) -> &str {
        "alias"
    }

    fn kind(&self) -> RenderNodeKind {
        RenderNodeKind::Brush
    }

    fn bbox(&self) -> Aabb {
        Aabb::from_center(Vec3::ZERO, 1.0)
    }

    fn position(&self) -> Vec3 {
        Vec3::ZERO
    }

    fn max_view_distance(&self) -> f32 {
        100.0
    }

    fn supports_async_render(&self) -> bool {
        true
    }

    fn clone_node(&self) -> SharedNode {
        Arc::new(Self(self.0))
    }

    fn copy_updated_data(&self, _original: &dyn RenderNode) {}

    fn render(&self, _params: &RenderParams, _pass: &RenderingPassInfo) {}
}
