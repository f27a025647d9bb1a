//! # External Collaborators
//!
//! The scene graph and the renderer live outside this workspace. The async
//! subsystem reaches them only through the two traits below, which keeps the
//! hand-off points explicit:
//!
//! | Trait           | Called from           | Purpose                          |
//! |-----------------|-----------------------|----------------------------------|
//! | `SceneEngine`   | tick thread           | octree registration, reclamation |
//! | `WorldRenderer` | tick thread + worker  | the per-frame render pipeline    |
//!
//! Implementations may call back into the subsystem from inside
//! `register_entity`, `free_render_node_state` and `release_render_node`;
//! the subsystem recognises those callbacks as its own traffic.

use crate::node::{Camera, RenderNode, RenderingPassInfo, SceneRenderFlags, SharedNode};

/// Scene graph primitives.
pub trait SceneEngine: Send + Sync {
    /// Inserts `node` into the octree.
    fn register_entity(&self, node: &SharedNode);

    /// Removes `node` from the octree and drops its temporary render data.
    fn free_render_node_state(&self, node: &SharedNode);

    /// Final notification before the subsystem drops a clone it created.
    fn release_render_node(&self, node: &SharedNode);

    /// Updates streaming priority of an original node. Tick thread only.
    fn update_render_node_streaming_priority(
        &self,
        node: &dyn RenderNode,
        distance: f32,
        importance: f32,
        full_update: bool,
        pass: &RenderingPassInfo,
    );
}

/// Frame pipeline hooks.
///
/// `prepare_occlusion`, `draw_global_debug_info` and `render_world` run on
/// the render worker; everything else runs on the tick thread.
pub trait WorldRenderer: Send + Sync {
    /// Pre-render listeners and the engine's pre async render hook.
    fn pre_render(&self);

    /// Camera the next frame is rendered from.
    fn view_camera(&self) -> Camera;

    /// Starts occlusion culling for `camera`.
    fn prepare_occlusion(&self, camera: &Camera);

    /// Global debug geometry.
    fn draw_global_debug_info(&self) {}

    /// Scene traversal and draw submission.
    fn render_world(&self, camera: &Camera);

    /// Dedicated servers close the scene even without a camera.
    fn is_dedicated(&self) -> bool {
        false
    }

    /// Whether the post 3D renderer needs the scene closed regardless of camera.
    fn is_post_3d_renderer_enabled(&self) -> bool {
        false
    }

    /// Particle simulation step.
    fn update_particles(&self);

    /// Closes the scene.
    fn render_scene_end(&self, flags: SceneRenderFlags, pass: &RenderingPassInfo);

    /// Post render bookkeeping.
    fn update_post_render(&self, pass: &RenderingPassInfo);

    /// Ends occlusion culling.
    fn end_occlusion(&self);

    /// Scene 3D end notification.
    fn on_scene_3d_end(&self);

    /// On-screen text messages.
    fn render_text_messages(&self);

    /// World streaming update.
    fn world_stream_update(&self);

    /// Backbuffer resolution switch.
    fn switch_to_native_resolution_backbuffer(&self);
}
