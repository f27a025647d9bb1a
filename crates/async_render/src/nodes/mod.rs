//! Synchronization of original render nodes with the clones the worker sees.

mod manager;
mod render_list;

pub use manager::{NodeAction, RegistrationDecision, RenderNodesManager, SyncEntry};
pub use render_list::{
    DeferredRender, DeferredRenderSink, UnsupportedNodesRenderList, UnsupportedNodesRenderer,
};
