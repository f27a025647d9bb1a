//! Per-draw and per-pass parameters handed to `RenderNode::render`.

use bitflags::bitflags;

use super::geometry::Camera;

/// Per-node draw parameters computed by the traversal.
///
/// Only plain data: nothing in here may point back into engine state, since
/// deferred renders carry a copy across threads.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderParams {
    /// Distance from the camera to the node.
    pub distance: f32,
    /// Opacity.
    pub alpha: f32,
    /// Selected level of detail.
    pub lod: u8,
    /// Engine specific draw flags.
    pub flags: u32,
}

/// Description of the pass a node is rendered in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderingPassInfo {
    /// Camera of the pass.
    pub camera: Camera,
    /// Render fill thread this pass records into.
    pub thread_id: u32,
    /// Recursion level (0 for the general pass).
    pub recursion_level: u8,
}

impl RenderingPassInfo {
    /// The general pass for `camera`.
    #[must_use]
    pub fn general_pass(camera: Camera) -> Self {
        Self {
            camera,
            thread_id: 0,
            recursion_level: 0,
        }
    }
}

bitflags! {
    /// Flags for the end-of-scene step.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct SceneRenderFlags: u32 {
        /// Water is drawn.
        const ALLOW_WATER = 1 << 0;
        /// Post processing is applied.
        const ALLOW_POST_PROCESS = 1 << 1;
        /// HDR is enabled.
        const ALLOW_HDR = 1 << 2;
        /// Depth pre-pass.
        const Z_PASS = 1 << 3;
        /// Ambient occlusion.
        const ALLOW_AO = 1 << 4;
    }
}

impl SceneRenderFlags {
    /// Flags used when closing the general scene.
    pub const GENERAL_SCENE: Self = Self::ALLOW_WATER
        .union(Self::ALLOW_POST_PROCESS)
        .union(Self::ALLOW_HDR)
        .union(Self::Z_PASS)
        .union(Self::ALLOW_AO);
}
