//! # Render Nodes Manager
//!
//! Keeps one synchronization entry per original node and drives the clones
//! the render worker traverses.
//!
//! ```text
//!   original id ──► SyncEntry { original, shadow, action, registered }
//!                                   │
//!   clone id ───── owned nodes ─────┘ (reverse map)
//!
//!   action:  Register ──► Update ──► Unregister ──► OutOfAction
//!                ▲                                      │
//!                └──────────────────────────────────────┘
//! ```
//!
//! All mutation happens on the tick thread, between the wait of one frame
//! and the dispatch of the next. While the worker runs, the manager is only
//! read through the clones' snapshot cells.

use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_render_core::{NodeId, RemovedNodesManager, RenderNode, RenderingPassInfo, SharedNode};

use super::render_list::{UnsupportedNodesRenderList, UnsupportedNodesRenderer};
use crate::config::NodesManagerSettings;
use crate::error::AsyncRenderError;
use crate::mock_node::MockAsyncRenderNode;
use crate::performance::{PerfTimer, PerformanceWindow};
use crate::protocol_check;
use crate::registrator::RenderNodesRegistratorHelper;

/// Pending work on a synchronization entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeAction {
    /// Create or refresh the clone and register it.
    Register,
    /// Unregister the clone.
    Unregister,
    /// Registered; refresh the clone every frame.
    Update,
    /// Unregistered; nothing to do.
    OutOfAction,
}

/// What the engine should do with its own octree bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationDecision {
    /// The subsystem handles the node; leave the octree alone.
    SkipOctree,
    /// Proceed with the engine's default registration.
    ModifyOctree,
}

impl RegistrationDecision {
    /// Returns true for [`SkipOctree`](Self::SkipOctree).
    #[must_use]
    pub fn skips_octree(self) -> bool {
        matches!(self, Self::SkipOctree)
    }
}

/// The node the worker actually sees in place of an original.
#[derive(Clone)]
enum ShadowNode {
    Clone(SharedNode),
    Mock(Arc<MockAsyncRenderNode>),
}

impl ShadowNode {
    fn as_node(&self) -> &dyn RenderNode {
        match self {
            Self::Clone(node) => node.as_ref(),
            Self::Mock(mock) => mock.as_ref(),
        }
    }

    fn id(&self) -> NodeId {
        self.as_node().id()
    }

    fn shared(&self) -> SharedNode {
        match self {
            Self::Clone(node) => Arc::clone(node),
            Self::Mock(mock) => Arc::clone(mock) as SharedNode,
        }
    }
}

/// One original node and its shadow.
#[derive(Clone)]
pub struct SyncEntry {
    original: SharedNode,
    shadow: Option<ShadowNode>,
    action: NodeAction,
    registered: bool,
}

impl SyncEntry {
    fn new(original: SharedNode) -> Self {
        Self {
            original,
            shadow: None,
            action: NodeAction::Register,
            registered: false,
        }
    }

    /// Pending action.
    #[must_use]
    pub fn action(&self) -> NodeAction {
        self.action
    }

    /// Whether the shadow is in the engine's octree.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Id of the shadow, once created.
    #[must_use]
    pub fn shadow_id(&self) -> Option<NodeId> {
        self.shadow.as_ref().map(ShadowNode::id)
    }

    /// Returns true if the shadow is a mock node.
    #[must_use]
    pub fn is_mocked(&self) -> bool {
        matches!(self.shadow, Some(ShadowNode::Mock(_)))
    }

    fn copy_from_original(&self) {
        if let Some(shadow) = &self.shadow {
            shadow.as_node().copy_updated_data(self.original.as_ref());
        }
    }
}

impl std::fmt::Debug for SyncEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEntry")
            .field("original", &self.original.id())
            .field("shadow", &self.shadow_id())
            .field("action", &self.action)
            .field("registered", &self.registered)
            .finish()
    }
}

/// Central coordinator of originals, clones and removals.
pub struct RenderNodesManager {
    registrator: Arc<RenderNodesRegistratorHelper>,
    perf: Arc<PerformanceWindow>,
    settings: NodesManagerSettings,
    level_loading: bool,
    synchronization: BTreeMap<NodeId, SyncEntry>,
    /// Shadow id to original id.
    owned_nodes: HashMap<NodeId, NodeId>,
    removed_nodes: RemovedNodesManager<SharedNode>,
    /// Removed shadows that were registered when their original went away.
    unregister_nodes: HashSet<NodeId>,
    render_list: UnsupportedNodesRenderList,
}

impl RenderNodesManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new(
        registrator: Arc<RenderNodesRegistratorHelper>,
        perf: Arc<PerformanceWindow>,
        settings: NodesManagerSettings,
        level_loading: bool,
    ) -> Self {
        Self {
            registrator,
            perf,
            settings,
            level_loading,
            synchronization: BTreeMap::new(),
            owned_nodes: HashMap::new(),
            removed_nodes: RemovedNodesManager::new(),
            unregister_nodes: HashSet::new(),
            render_list: UnsupportedNodesRenderList::new(),
        }
    }

    // =========================================================================
    // Per-frame commit
    // =========================================================================

    /// Applies every pending action before the render job is dispatched.
    ///
    /// Clone refreshes all happen first, optionally in parallel; then the
    /// register/unregister actions run one by one because they mutate the
    /// engine's octree. Finally shadows of nodes deleted this frame are
    /// taken out of the octree.
    pub fn process_async_render_nodes(&mut self) {
        let perf = Arc::clone(&self.perf);
        perf.time(PerfTimer::Copy, || {
            let is_update = |entry: &&SyncEntry| entry.action == NodeAction::Update;
            if self.settings.parallel_copy {
                self.synchronization
                    .par_iter()
                    .map(|(_, entry)| entry)
                    .filter(is_update)
                    .for_each(SyncEntry::copy_from_original);
            } else {
                self.synchronization
                    .values()
                    .filter(is_update)
                    .for_each(SyncEntry::copy_from_original);
            }

            let mut handler = NodeHandler {
                registrator: &self.registrator,
                settings: self.settings,
                render_list: &self.render_list,
                owned_nodes: &mut self.owned_nodes,
            };
            for entry in self.synchronization.values_mut() {
                handler.handle_node(entry);
            }
        });

        let registrator = &self.registrator;
        let unregister_nodes = &self.unregister_nodes;
        let settings = self.settings;
        self.removed_nodes.for_each_in_fill_array(|id, node| {
            if settings.unregister_nodes_on_delete || unregister_nodes.contains(&id) {
                registrator.unregister_in_engine(node, settings.disable_asserts);
            }
        });
    }

    /// Drops the shadows removed two cleanups ago and rotates the buffers.
    ///
    /// Only call once the render job that could still see them has been
    /// waited on.
    pub fn clean_removed_render_nodes(&mut self) {
        let registrator = &self.registrator;
        let owned_nodes = &mut self.owned_nodes;
        self.removed_nodes.for_each_in_process_array(|id, node| {
            registrator.release_in_engine(node);
            owned_nodes.remove(&id);
        });

        self.removed_nodes.clean_removed_render_nodes();
        self.unregister_nodes.clear();
    }

    // =========================================================================
    // Engine traffic
    // =========================================================================

    /// Engine notification that `node` enters or leaves the octree.
    ///
    /// Returns [`RegistrationDecision::ModifyOctree`] for the subsystem's own
    /// calls coming back, [`RegistrationDecision::SkipOctree`] when the
    /// subsystem takes the node over or the node is already gone.
    pub fn change_render_node_registered_state(
        &mut self,
        node: &SharedNode,
        register: bool,
    ) -> RegistrationDecision {
        if self.registrator.is_handling_node_remove() {
            return RegistrationDecision::ModifyOctree;
        }

        if !node.supports_async_render() && !self.settings.register_unsupported_nodes {
            return RegistrationDecision::SkipOctree;
        }

        let forward_to_engine = if register {
            self.registrator.should_register()
        } else {
            self.registrator.should_unregister()
        };
        if forward_to_engine {
            return RegistrationDecision::ModifyOctree;
        }

        if self.removed_nodes.removed_this_frame(node.id()) {
            return RegistrationDecision::SkipOctree;
        }

        // The engine may address a shadow; act on its original instead
        let target = self
            .owned_nodes
            .get(&node.id())
            .and_then(|original| self.synchronization.get(original))
            .map_or_else(|| Arc::clone(node), |entry| Arc::clone(&entry.original));

        if register {
            self.register_for_render(&target);
        } else {
            self.unregister_for_render(target.id());
        }
        RegistrationDecision::SkipOctree
    }

    /// Schedules `node` for registration, creating its entry if needed.
    ///
    /// While a level loads there is no worker, so the action is applied at
    /// once.
    pub fn register_for_render(&mut self, node: &SharedNode) {
        let id = node.id();
        self.synchronization
            .entry(id)
            .and_modify(|entry| entry.action = NodeAction::Register)
            .or_insert_with(|| SyncEntry::new(Arc::clone(node)));

        if self.level_loading {
            self.handle_node(id);
        }
    }

    /// Schedules the shadow of `id` for unregistration. Unknown ids are ignored.
    pub fn unregister_for_render(&mut self, id: NodeId) {
        let Some(entry) = self.synchronization.get_mut(&id) else {
            if self.settings.actions_logging {
                tracing::debug!(target: "async_render", "unregister of untracked node {id} ignored");
            }
            return;
        };
        entry.action = NodeAction::Unregister;

        if self.level_loading {
            self.handle_node(id);
        }
    }

    /// Engine notification that the node `id` is being destroyed.
    ///
    /// For an original, its entry goes away and its shadow is parked in the
    /// removed set (or released at once while loading). For one of our own
    /// shadows destroyed by the engine, the original's entry goes away.
    pub fn delete_render_node(&mut self, id: NodeId) {
        if self.registrator.is_handling_node_remove() {
            return;
        }

        if self.settings.actions_logging {
            tracing::debug!(target: "async_render", "delete render node {id}");
        }

        if let Some(entry) = self.synchronization.remove(&id) {
            self.delete_cloned_node(entry);
        } else if let Some(original) = self.owned_nodes.remove(&id) {
            if let Some(entry) = self.synchronization.get(&original) {
                protocol_check!(
                    self.settings.disable_asserts,
                    self.level_loading || entry.action == NodeAction::OutOfAction,
                    AsyncRenderError::UnexpectedOwnedDelete(id),
                );
                self.synchronization.remove(&original);
            }
            self.removed_nodes.erase_node(id);
        }
    }

    fn delete_cloned_node(&mut self, entry: SyncEntry) {
        let Some(shadow) = entry.shadow else {
            return;
        };
        let shadow = shadow.shared();
        let shadow_id = shadow.id();

        if self.settings.actions_logging {
            tracing::debug!(target: "async_render", "shadow {shadow_id} of {} deleted", entry.original.id());
        }

        if self.level_loading {
            if self.settings.unregister_nodes_on_delete
                || entry.registered
                || self.unregister_nodes.contains(&shadow_id)
            {
                self.registrator.unregister_in_engine(&shadow, self.settings.disable_asserts);
            }
            self.handle_node_remove(&shadow);
        } else {
            self.owned_nodes.remove(&shadow_id);
            if entry.registered {
                self.unregister_nodes.insert(shadow_id);
            }
            self.removed_nodes.insert(shadow_id, shadow);
        }
    }

    fn handle_node_remove(&mut self, shadow: &SharedNode) {
        self.registrator.release_in_engine(shadow);
        self.owned_nodes.remove(&shadow.id());
    }

    fn handle_node(&mut self, id: NodeId) {
        let mut handler = NodeHandler {
            registrator: &self.registrator,
            settings: self.settings,
            render_list: &self.render_list,
            owned_nodes: &mut self.owned_nodes,
        };
        if let Some(entry) = self.synchronization.get_mut(&id) {
            handler.handle_node(entry);
        }
    }

    // =========================================================================
    // Level transitions
    // =========================================================================

    /// Enters or leaves loading mode. Captured renders are discarded.
    pub fn set_level_loading(&mut self, level_loading: bool) {
        self.level_loading = level_loading;
        self.render_list.clear();
    }

    /// Returns true while a level loads.
    #[must_use]
    pub fn is_level_loading(&self) -> bool {
        self.level_loading
    }

    /// Asserts that the unload left no bookkeeping behind.
    pub fn check_nodes_removed_after_level_unload(&self) -> bool {
        protocol_check!(
            self.settings.disable_asserts,
            self.synchronization.is_empty() && self.removed_nodes.is_empty() && self.owned_nodes.is_empty(),
            AsyncRenderError::NodesLeftAfterUnload {
                entries: self.synchronization.len(),
                removed: self.removed_nodes.len(),
                owned: self.owned_nodes.len(),
            },
        )
    }

    // =========================================================================
    // Unsupported nodes
    // =========================================================================

    /// Puts mock nodes in capture mode for the coming render job.
    pub fn start_adding_unsupported_nodes_to_render_list(&self) {
        self.render_list.start_capture();
    }

    /// Discards captured renders without drawing them.
    pub fn clear_unsupported_nodes_render_list(&self) {
        self.render_list.clear();
    }

    /// Number of captured renders waiting for the end-of-scene flush.
    #[must_use]
    pub fn pending_unsupported_renders(&self) -> usize {
        self.render_list.len()
    }

    // =========================================================================
    // Settings and inspection
    // =========================================================================

    /// Current toggles.
    #[must_use]
    pub fn settings(&self) -> NodesManagerSettings {
        self.settings
    }

    /// Replaces the toggles. Takes effect from the next operation.
    pub fn set_settings(&mut self, settings: NodesManagerSettings) {
        self.settings = settings;
    }

    /// Number of synchronization entries.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.synchronization.len()
    }

    /// The entry of original `id`.
    #[must_use]
    pub fn entry(&self, id: NodeId) -> Option<&SyncEntry> {
        self.synchronization.get(&id)
    }

    /// Original of the shadow `id`, if the manager owns it.
    #[must_use]
    pub fn original_of(&self, shadow: NodeId) -> Option<NodeId> {
        self.owned_nodes.get(&shadow).copied()
    }

    /// Number of owned shadows reachable through the reverse map.
    #[must_use]
    pub fn owned_count(&self) -> usize {
        self.owned_nodes.len()
    }

    /// Returns true if the shadow `id` waits in the removed set.
    #[must_use]
    pub fn is_removed(&self, shadow: NodeId) -> bool {
        self.removed_nodes.contains(shadow)
    }

    /// Number of shadows waiting in the removed set.
    #[must_use]
    pub fn removed_count(&self) -> usize {
        self.removed_nodes.len()
    }

    /// Number of removed shadows that were registered when their original
    /// was deleted. Emptied by the cleanup.
    #[must_use]
    pub fn pending_unregister_count(&self) -> usize {
        self.unregister_nodes.len()
    }
}

impl UnsupportedNodesRenderer for RenderNodesManager {
    fn render_unsupported_nodes(&mut self, pass: &RenderingPassInfo) {
        if self.level_loading {
            return;
        }

        let perf = Arc::clone(&self.perf);
        perf.time(PerfTimer::UnsupportedNodes, || {
            let engine = self.registrator.engine();
            for render in self.render_list.drain() {
                let Some(entry) = self
                    .owned_nodes
                    .get(&render.node)
                    .and_then(|original| self.synchronization.get(original))
                else {
                    continue;
                };
                if !matches!(entry.action, NodeAction::Update | NodeAction::Register) {
                    continue;
                }

                protocol_check!(
                    self.settings.disable_asserts,
                    render.pass.thread_id == pass.thread_id,
                    AsyncRenderError::DeferredRenderThreadMismatch {
                        captured: render.pass.thread_id,
                        flushed: pass.thread_id,
                    },
                );
                entry.original.render(&render.params, &render.pass);
                if let Some(ShadowNode::Mock(mock)) = &entry.shadow {
                    mock.update_streamable_components(entry.original.as_ref(), &render.pass, engine.as_ref());
                }
            }
            self.render_list.stop_capture();
        });
    }

    fn discard_unsupported_nodes(&mut self) {
        self.render_list.clear();
        self.render_list.stop_capture();
    }
}

impl std::fmt::Debug for RenderNodesManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderNodesManager")
            .field("level_loading", &self.level_loading)
            .field("entries", &self.synchronization.len())
            .field("owned", &self.owned_nodes.len())
            .field("removed", &self.removed_nodes.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Applies one entry's pending action. Borrows only what that needs, so the
/// manager can iterate its entries while handling them.
struct NodeHandler<'a> {
    registrator: &'a RenderNodesRegistratorHelper,
    settings: NodesManagerSettings,
    render_list: &'a UnsupportedNodesRenderList,
    owned_nodes: &'a mut HashMap<NodeId, NodeId>,
}

impl NodeHandler<'_> {
    fn handle_node(&mut self, entry: &mut SyncEntry) {
        if self.settings.actions_logging && entry.action != NodeAction::Update {
            tracing::debug!(
                target: "async_render",
                "node {} ({}): {:?}",
                entry.original.id(),
                entry.original.name(),
                entry.action
            );
        }

        match entry.action {
            NodeAction::Register => self.handle_node_register(entry),
            NodeAction::Unregister => self.handle_node_unregister(entry),
            NodeAction::Update | NodeAction::OutOfAction => {}
        }
    }

    fn handle_node_register(&mut self, entry: &mut SyncEntry) {
        let shadow = match &entry.shadow {
            Some(shadow) => {
                entry.copy_from_original();
                shadow.shared()
            }
            None => {
                let shadow = if self.settings.register_unsupported_nodes
                    && !entry.original.supports_async_render()
                {
                    ShadowNode::Mock(MockAsyncRenderNode::new(&entry.original, self.render_list.sink()))
                } else {
                    ShadowNode::Clone(entry.original.clone_node())
                };
                if self.settings.actions_logging {
                    tracing::trace!(
                        target: "async_render",
                        "node {} ({}) cloned as {}",
                        entry.original.id(),
                        entry.original.name(),
                        shadow.id()
                    );
                }
                self.owned_nodes.insert(shadow.id(), entry.original.id());
                let shared = shadow.shared();
                entry.shadow = Some(shadow);
                shared
            }
        };

        self.registrator.register_in_engine(&shadow, self.settings.disable_asserts);
        entry.action = NodeAction::Update;
        entry.registered = true;
    }

    fn handle_node_unregister(&mut self, entry: &mut SyncEntry) {
        if entry.registered {
            if let Some(shadow) = &entry.shadow {
                self.registrator
                    .unregister_in_engine(&shadow.shared(), self.settings.disable_asserts);
            }
        }
        entry.action = NodeAction::OutOfAction;
        entry.registered = false;
    }
}
