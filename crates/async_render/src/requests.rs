//! Interfaces the engine's frame loop and level lifecycle call.
//!
//! All of them are implemented by [`SystemComponent`](crate::SystemComponent);
//! callers hold an `Arc` of it behind whichever trait they need.

use async_render_core::{NodeId, SharedNode};

use crate::nodes::RegistrationDecision;

/// Status queries.
pub trait AsyncRenderWorldRequests {
    /// Returns true if the world is being rendered asynchronously.
    fn is_enabled(&self) -> bool;
}

/// Frame loop hooks. Tick thread only.
pub trait AsyncRenderWorldSynchronization {
    /// Re-evaluates whether async rendering runs on this host.
    fn load_configuration(&self);

    /// Blocks until the render job of this frame is done, then closes the scene.
    fn wait_rendering_completed(&self);

    /// Per-frame tail; renders synchronously while a level loads.
    fn do_after_async_rendering_completed(&self);

    /// Commits pending node actions before the render job is dispatched.
    fn process_async_render_nodes(&self);

    /// Reclaims removed clones once no render job can see them.
    fn clean_removed_render_nodes(&self);

    /// Octree registration change of `node`; tells the engine whether to do
    /// its own bookkeeping.
    fn change_render_node_registered_state(&self, node: &SharedNode, register: bool) -> RegistrationDecision;

    /// Enters level loading mode.
    fn level_unload_start(&self);
}

/// Destruction notifications.
pub trait AsyncRenderWorldNodeRemove {
    /// The node `id` is being destroyed by the engine.
    fn delete_render_node(&self, id: NodeId);
}
