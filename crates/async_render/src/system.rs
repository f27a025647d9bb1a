//! # System Component
//!
//! Lifecycle owner of the subsystem and the only entry point the engine
//! talks to.
//!
//! ## Thread Safety
//!
//! Every operation belongs to the tick thread and checks it. State sits
//! behind one mutex that is never contended in a correct program; it exists
//! so the component can be shared as `Arc<SystemComponent>`. Engine
//! callbacks raised while the component itself is calling into the engine
//! are answered from lock-free flags before the mutex is touched:
//!
//! | Callback during          | Answered by                          |
//! |--------------------------|--------------------------------------|
//! | our `register_entity`    | `should_register` -> modify octree   |
//! | our `free_render_node_state` | `should_unregister` -> modify octree |
//! | our `release_render_node`| `is_handling_node_remove` -> ignore  |

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use async_render_core::{NodeId, SceneEngine, SharedNode, WorldRenderer};

use crate::config::{AsyncRenderConfig, HostEnvironment, NodesManagerSettings};
use crate::error::AsyncRenderError;
use crate::nodes::{RegistrationDecision, RenderNodesManager};
use crate::performance::PerformanceWindow;
use crate::protocol_check;
use crate::registrator::RenderNodesRegistratorHelper;
use crate::render_world::RenderWorldFunctions;
use crate::requests::{AsyncRenderWorldNodeRemove, AsyncRenderWorldRequests, AsyncRenderWorldSynchronization};

/// Engine-wide events the component reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SystemEvent {
    /// A level finished loading.
    LevelLoadEnd,
    /// A level finished unloading.
    LevelPostUnload,
}

struct ComponentState {
    config: AsyncRenderConfig,
    level_loading: bool,
    should_wait_for_async_rendering: bool,
    nodes_manager: RenderNodesManager,
    render_world_functions: RenderWorldFunctions,
}

/// The async render world subsystem.
pub struct SystemComponent {
    tick_thread: ThreadId,
    host: HostEnvironment,
    registrator: Arc<RenderNodesRegistratorHelper>,
    perf: Arc<PerformanceWindow>,
    enabled: AtomicBool,
    asserts_disabled: AtomicBool,
    state: Mutex<ComponentState>,
}

impl SystemComponent {
    /// Creates a disabled component owned by the calling (tick) thread.
    ///
    /// The component starts in level loading mode and stays disabled until
    /// [`load_configuration`](AsyncRenderWorldSynchronization::load_configuration).
    #[must_use]
    pub fn new(
        config: AsyncRenderConfig,
        host: HostEnvironment,
        engine: Arc<dyn SceneEngine>,
        world: Arc<dyn WorldRenderer>,
    ) -> Self {
        let registrator = Arc::new(RenderNodesRegistratorHelper::new(engine));
        let perf = Arc::new(PerformanceWindow::new());
        let level_loading = true;

        let nodes_manager =
            RenderNodesManager::new(Arc::clone(&registrator), Arc::clone(&perf), config.nodes, level_loading);
        let mut render_world_functions = RenderWorldFunctions::new(world, Arc::clone(&perf));
        render_world_functions.set_asserts_disabled(config.nodes.disable_asserts);

        Self {
            tick_thread: thread::current().id(),
            host,
            registrator,
            perf,
            enabled: AtomicBool::new(false),
            asserts_disabled: AtomicBool::new(config.nodes.disable_asserts),
            state: Mutex::new(ComponentState {
                config,
                level_loading,
                should_wait_for_async_rendering: false,
                nodes_manager,
                render_world_functions,
            }),
        }
    }

    /// The thread every operation must be called from.
    #[must_use]
    pub fn tick_thread(&self) -> ThreadId {
        self.tick_thread
    }

    /// Host facts the component was created with.
    #[must_use]
    pub fn host(&self) -> HostEnvironment {
        self.host
    }

    /// Shared frame timers.
    #[must_use]
    pub fn performance_window(&self) -> &Arc<PerformanceWindow> {
        &self.perf
    }

    /// Shows or hides the performance summary.
    pub fn toggle_performance_window(&self) {
        self.perf.toggle_enabled();
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> AsyncRenderConfig {
        self.with_state("config", AsyncRenderConfig::default(), |state| state.config.clone())
    }

    /// Returns true while a level loads or unloads.
    #[must_use]
    pub fn is_level_loading(&self) -> bool {
        self.with_state("is_level_loading", true, |state| state.level_loading)
    }

    /// Runs `f` against the render nodes manager.
    pub fn with_nodes_manager<R>(&self, f: impl FnOnce(&RenderNodesManager) -> R) -> Option<R> {
        self.state.try_lock().map(|state| f(&state.nodes_manager))
    }

    // =========================================================================
    // Tick and events
    // =========================================================================

    /// Starts the render job of this frame.
    ///
    /// Does nothing while disabled or loading.
    pub fn on_tick(&self, delta: Duration) {
        if !self.check_tick_thread("on_tick") {
            return;
        }
        self.perf.show(delta);

        if !self.is_enabled() {
            return;
        }
        self.with_state("on_tick", (), |state| {
            if state.level_loading {
                return;
            }
            state.should_wait_for_async_rendering = true;
            state.nodes_manager.start_adding_unsupported_nodes_to_render_list();
            state
                .render_world_functions
                .begin_async_rendering(state.config.sequential_execution_order);
        });
    }

    /// Reacts to level lifecycle events.
    pub fn on_system_event(&self, event: SystemEvent) {
        if !self.check_tick_thread("on_system_event") {
            return;
        }
        self.with_state("on_system_event", (), |state| match event {
            SystemEvent::LevelLoadEnd => {
                tracing::info!(target: "async_render", "level loaded, async rendering resumes");
                state.level_loading = false;
                state.nodes_manager.set_level_loading(false);
            }
            SystemEvent::LevelPostUnload => {
                state.nodes_manager.check_nodes_removed_after_level_unload();
            }
        });
    }

    /// Replay playback reloads the level.
    pub fn replay_start(&self) {
        self.level_unload_start();
    }

    // =========================================================================
    // Runtime configuration
    // =========================================================================

    /// Turns async rendering on and re-evaluates the gate.
    pub fn command_load(&self) {
        if !self.check_tick_thread("command_load") {
            return;
        }
        self.with_state("command_load", (), |state| state.config.enable = true);
        self.load_configuration();
    }

    /// Turns async rendering off.
    pub fn command_force_disable(&self) {
        if !self.check_tick_thread("command_force_disable") {
            return;
        }
        self.with_state("command_force_disable", (), |state| state.config.enable = false);
        self.load_configuration();
    }

    /// Switches between worker and inline rendering from the next frame.
    pub fn set_sequential_execution_order(&self, sequential: bool) {
        if !self.check_tick_thread("set_sequential_execution_order") {
            return;
        }
        self.with_state("set_sequential_execution_order", (), |state| {
            state.config.sequential_execution_order = sequential;
        });
    }

    /// Replaces the render nodes manager toggles.
    pub fn update_node_settings(&self, settings: NodesManagerSettings) {
        if !self.check_tick_thread("update_node_settings") {
            return;
        }
        self.with_state("update_node_settings", (), |state| {
            state.config.nodes = settings;
            state.nodes_manager.set_settings(settings);
            state.render_world_functions.set_asserts_disabled(settings.disable_asserts);
        });
        self.asserts_disabled.store(settings.disable_asserts, Ordering::Release);
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn asserts_disabled(&self) -> bool {
        self.asserts_disabled.load(Ordering::Acquire)
    }

    fn check_tick_thread(&self, operation: &'static str) -> bool {
        let actual = thread::current().id();
        protocol_check!(
            self.asserts_disabled(),
            actual == self.tick_thread,
            AsyncRenderError::ThreadAccessViolation {
                operation,
                expected: self.tick_thread,
                actual,
            },
        )
    }

    /// Runs `f` on the state, or returns `fallback` if the state is already
    /// held further up the stack.
    fn with_state<R>(&self, operation: &'static str, fallback: R, f: impl FnOnce(&mut ComponentState) -> R) -> R {
        let Some(mut state) = self.state.try_lock() else {
            protocol_check!(self.asserts_disabled(), false, AsyncRenderError::ReentrantCall(operation));
            return fallback;
        };
        f(&mut state)
    }

    fn wait_in_flight_render(state: &mut ComponentState) {
        if state.should_wait_for_async_rendering {
            state.should_wait_for_async_rendering = false;
            let ComponentState {
                nodes_manager,
                render_world_functions,
                ..
            } = state;
            render_world_functions.wait_for_async_rendering_completed(nodes_manager);
        }
    }
}

impl AsyncRenderWorldRequests for SystemComponent {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

impl AsyncRenderWorldSynchronization for SystemComponent {
    fn load_configuration(&self) {
        if !self.check_tick_thread("load_configuration") {
            return;
        }
        let host = self.host;
        self.with_state("load_configuration", (), |state| {
            let enabled = state.config.is_async_render_allowed(&host);
            if !enabled {
                // The job in flight must still be joined before going dark
                Self::wait_in_flight_render(state);
            }
            let was_enabled = self.enabled.swap(enabled, Ordering::AcqRel);
            if was_enabled != enabled {
                tracing::info!(
                    target: "async_render",
                    "async render world {} (editor: {}, cores: {})",
                    if enabled { "enabled" } else { "disabled" },
                    host.is_editor,
                    host.cpu_cores
                );
            }
        });
    }

    fn wait_rendering_completed(&self) {
        if !self.check_tick_thread("wait_rendering_completed") || !self.is_enabled() {
            return;
        }
        self.with_state("wait_rendering_completed", (), Self::wait_in_flight_render);
    }

    fn do_after_async_rendering_completed(&self) {
        if !self.check_tick_thread("do_after_async_rendering_completed") || !self.is_enabled() {
            return;
        }
        self.with_state("do_after_async_rendering_completed", (), |state| {
            let ComponentState {
                level_loading,
                nodes_manager,
                render_world_functions,
                ..
            } = state;
            render_world_functions.do_after_async_rendering_completed(*level_loading, nodes_manager);
        });
    }

    fn process_async_render_nodes(&self) {
        if !self.check_tick_thread("process_async_render_nodes") || !self.is_enabled() {
            return;
        }
        self.with_state("process_async_render_nodes", (), |state| {
            state.nodes_manager.process_async_render_nodes();
        });
    }

    fn clean_removed_render_nodes(&self) {
        if !self.check_tick_thread("clean_removed_render_nodes") || !self.is_enabled() {
            return;
        }
        self.with_state("clean_removed_render_nodes", (), |state| {
            state.nodes_manager.clean_removed_render_nodes();
        });
    }

    fn change_render_node_registered_state(&self, node: &SharedNode, register: bool) -> RegistrationDecision {
        if !self.check_tick_thread("change_render_node_registered_state") || !self.is_enabled() {
            return RegistrationDecision::ModifyOctree;
        }

        // Our own engine calls coming back; the state is held further up
        let own_traffic = self.registrator.is_handling_node_remove()
            || if register {
                self.registrator.should_register()
            } else {
                self.registrator.should_unregister()
            };
        if own_traffic {
            return RegistrationDecision::ModifyOctree;
        }

        self.with_state("change_render_node_registered_state", RegistrationDecision::ModifyOctree, |state| {
            state.nodes_manager.change_render_node_registered_state(node, register)
        })
    }

    fn level_unload_start(&self) {
        if !self.check_tick_thread("level_unload_start") {
            return;
        }
        self.with_state("level_unload_start", (), |state| {
            if state.render_world_functions.is_render_in_flight() {
                tracing::warn!(target: "async_render", "level unload started with a render in flight, waiting for it");
                state.should_wait_for_async_rendering = true;
                Self::wait_in_flight_render(state);
            }
            tracing::info!(target: "async_render", "level loading started");
            state.level_loading = true;
            state.nodes_manager.set_level_loading(true);
        });
    }
}

impl AsyncRenderWorldNodeRemove for SystemComponent {
    fn delete_render_node(&self, id: NodeId) {
        if !self.check_tick_thread("delete_render_node") || !self.is_enabled() {
            return;
        }
        if self.registrator.is_handling_node_remove() {
            return;
        }
        self.with_state("delete_render_node", (), |state| state.nodes_manager.delete_render_node(id));
    }
}

impl std::fmt::Debug for SystemComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemComponent")
            .field("tick_thread", &self.tick_thread)
            .field("host", &self.host)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}
