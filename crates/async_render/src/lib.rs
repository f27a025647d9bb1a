//! # Async Render World
//!
//! Moves the per-frame world traversal off the tick thread. The engine keeps
//! mutating its original render nodes while a dedicated worker renders
//! clones committed at the start of the frame.
//!
//! ## Frame
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ Tick thread                                                      │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ process_async_render_nodes   commit Register/Update/Unregister   │
//! │ on_tick                      pre-render, dispatch render job ──┐ │
//! │   ... simulation runs ...                                      │ │
//! │ wait_rendering_completed     ◄── semaphore ── worker traverses ┘ │
//! │                              scene end, unsupported nodes flush  │
//! │ do_after_async_rendering_completed   text, streaming, backbuffer │
//! │ clean_removed_render_nodes   release clones removed a frame ago  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nodes that cannot render off the tick thread get a mock stand-in; the
//! worker records their draws and the tick thread replays them before the
//! scene closes.
//!
//! ## Entry Points
//!
//! - [`SystemComponent`]: owns everything, implements the request traits
//! - [`AsyncRenderConfig`]: TOML configuration and the enable gate
//! - [`PerformanceWindow`]: smoothed timers of the async frame

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod mock_node;
pub mod nodes;
pub mod performance;
pub mod registrator;
pub mod render_world;
pub mod requests;
pub mod system;

pub use config::{AsyncRenderConfig, HostEnvironment, NodesManagerSettings, DEFAULT_MIN_CPU_CORES};
pub use error::{AsyncRenderError, ConfigError, ConfigResult};
pub use mock_node::{MockAsyncRenderNode, StreamableUpdateArgs};
pub use nodes::{
    DeferredRender, DeferredRenderSink, NodeAction, RegistrationDecision, RenderNodesManager, SyncEntry,
    UnsupportedNodesRenderList, UnsupportedNodesRenderer,
};
pub use performance::{PerfSnapshot, PerfTimer, PerformanceWindow};
pub use registrator::RenderNodesRegistratorHelper;
pub use render_world::{RenderPhase, RenderWorldFunctions, RENDER_WORKER_THREAD_NAME};
pub use requests::{AsyncRenderWorldNodeRemove, AsyncRenderWorldRequests, AsyncRenderWorldSynchronization};
pub use system::{SystemComponent, SystemEvent};
