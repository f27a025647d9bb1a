//! # Render World Functions
//!
//! The frame pipeline around the world traversal.
//!
//! ```text
//!   tick thread                               render worker
//!   ───────────                               ─────────────
//!   begin_async_rendering
//!     pre_render, capture camera
//!     send RenderJob ───────────────────────► prepare_occlusion
//!   (simulation continues)                    draw_global_debug_info
//!                                             render_world
//!   wait_for_async_rendering_completed ◄───── release semaphore
//!     render_world_end (particles, unsupported nodes, scene end)
//!   do_after_async_rendering_completed
//!     scene 3D end, text, streaming, backbuffer
//! ```
//!
//! In sequential mode the job runs inline inside `begin_async_rendering`
//! and the semaphore is already available when the wait comes.

use crossbeam_channel::{bounded, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use async_render_core::{
    Camera, FrameSemaphore, RenderingPassInfo, SceneRenderFlags, WorldRenderer,
};

use crate::error::AsyncRenderError;
use crate::nodes::UnsupportedNodesRenderer;
use crate::performance::{PerfTimer, PerformanceWindow};
use crate::protocol_check;

/// Name of the render worker thread.
pub const RENDER_WORKER_THREAD_NAME: &str = "async-render-world";

/// Where the frame pipeline stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderPhase {
    /// No render dispatched since the last wait.
    Idle,
    /// The job was handed to the worker.
    WorkerDispatched,
    /// The job ran inline; completion is already signalled.
    InlineExecuted,
}

/// One frame of work for the worker. Owns its camera copy.
#[derive(Clone, Copy, Debug)]
struct RenderJob {
    camera: Camera,
}

/// Persistent render thread fed one job at a time.
struct RenderWorker {
    sender: Option<Sender<RenderJob>>,
    handle: Option<JoinHandle<()>>,
}

impl RenderWorker {
    fn spawn(
        world: Arc<dyn WorldRenderer>,
        perf: Arc<PerformanceWindow>,
        completed: Arc<FrameSemaphore>,
    ) -> std::io::Result<Self> {
        let (sender, receiver) = bounded::<RenderJob>(1);
        let handle = thread::Builder::new()
            .name(RENDER_WORKER_THREAD_NAME.into())
            .spawn(move || {
                tracing::info!(target: "async_render", "render worker started");
                for job in &receiver {
                    call_wrapped_render_world(world.as_ref(), &perf, &completed, &job.camera);
                }
                tracing::info!(target: "async_render", "render worker stopped");
            })?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    fn dispatch(&self, job: RenderJob) -> Result<(), AsyncRenderError> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| AsyncRenderError::WorkerUnavailable("channel closed".into()))?;
        sender
            .send(job)
            .map_err(|_| AsyncRenderError::WorkerUnavailable("worker thread exited".into()))
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop after the current job
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(target: "async_render", "render worker panicked");
            }
        }
    }
}

/// Drives the pre-render, render and post-render steps of each frame.
pub struct RenderWorldFunctions {
    world: Arc<dyn WorldRenderer>,
    perf: Arc<PerformanceWindow>,
    rendering_completed: Arc<FrameSemaphore>,
    view_camera: Camera,
    worker: Option<RenderWorker>,
    phase: RenderPhase,
    asserts_disabled: bool,
}

impl RenderWorldFunctions {
    /// Creates the pipeline. The worker thread starts on first dispatch.
    #[must_use]
    pub fn new(world: Arc<dyn WorldRenderer>, perf: Arc<PerformanceWindow>) -> Self {
        Self {
            world,
            perf,
            rendering_completed: Arc::new(FrameSemaphore::new()),
            view_camera: Camera::default(),
            worker: None,
            phase: RenderPhase::Idle,
            asserts_disabled: false,
        }
    }

    /// Logs protocol violations instead of asserting.
    pub fn set_asserts_disabled(&mut self, disabled: bool) {
        self.asserts_disabled = disabled;
    }

    /// Current pipeline phase.
    #[must_use]
    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    /// Returns true if a dispatched render has not been waited on.
    #[must_use]
    pub fn is_render_in_flight(&self) -> bool {
        self.phase != RenderPhase::Idle
    }

    /// Camera captured for the current frame.
    #[must_use]
    pub fn view_camera(&self) -> Camera {
        self.view_camera
    }

    /// Returns true once the worker thread has been started.
    #[must_use]
    pub fn has_worker(&self) -> bool {
        self.worker.is_some()
    }

    /// Runs pre-render hooks, captures the camera and starts the render.
    ///
    /// With `sequential` the render runs inline on the calling thread.
    pub fn begin_async_rendering(&mut self, sequential: bool) {
        if !protocol_check!(
            self.asserts_disabled,
            self.phase == RenderPhase::Idle,
            AsyncRenderError::RenderAlreadyInFlight,
        ) {
            // Best effort: let the previous job finish before reusing the camera
            self.rendering_completed.acquire();
            self.phase = RenderPhase::Idle;
        }

        call_pre_render(self.world.as_ref());
        self.view_camera = self.world.view_camera();

        if sequential {
            self.run_inline();
            return;
        }

        let job = RenderJob { camera: self.view_camera };
        let dispatched = match self.worker() {
            Ok(worker) => worker.dispatch(job),
            Err(err) => Err(AsyncRenderError::WorkerUnavailable(format!("failed to spawn: {err}"))),
        };
        match dispatched {
            Ok(()) => self.phase = RenderPhase::WorkerDispatched,
            Err(err) => {
                tracing::error!(target: "async_render", "{err}; rendering inline");
                self.worker = None;
                self.run_inline();
            }
        }
    }

    /// Blocks until the render job is done, then closes the scene.
    pub fn wait_for_async_rendering_completed(&mut self, unsupported: &mut dyn UnsupportedNodesRenderer) {
        if !protocol_check!(
            self.asserts_disabled,
            self.phase != RenderPhase::Idle,
            AsyncRenderError::WaitWithoutDispatch,
        ) {
            return;
        }

        let perf = Arc::clone(&self.perf);
        perf.time(PerfTimer::MainWaits, || {
            self.rendering_completed.acquire();
            self.phase = RenderPhase::Idle;
            call_render_world_end(self.world.as_ref(), &self.view_camera, unsupported);
        });
    }

    /// Per-frame tail that runs whether or not rendering was async.
    ///
    /// With `call_render` (level loading) the whole pipeline first runs
    /// synchronously.
    pub fn do_after_async_rendering_completed(
        &mut self,
        call_render: bool,
        unsupported: &mut dyn UnsupportedNodesRenderer,
    ) {
        if call_render {
            call_pre_render(self.world.as_ref());
            self.view_camera = self.world.view_camera();
            call_render_world(self.world.as_ref(), &self.perf, &self.view_camera);
            call_render_world_end(self.world.as_ref(), &self.view_camera, unsupported);
        }

        self.world.on_scene_3d_end();
        self.world.render_text_messages();
        self.world.world_stream_update();
        self.world.switch_to_native_resolution_backbuffer();
    }

    fn run_inline(&mut self) {
        call_wrapped_render_world(
            self.world.as_ref(),
            &self.perf,
            &self.rendering_completed,
            &self.view_camera,
        );
        self.phase = RenderPhase::InlineExecuted;
    }

    fn worker(&mut self) -> std::io::Result<&RenderWorker> {
        if self.worker.is_none() {
            self.worker = Some(RenderWorker::spawn(
                Arc::clone(&self.world),
                Arc::clone(&self.perf),
                Arc::clone(&self.rendering_completed),
            )?);
        }
        // Populated just above
        self.worker
            .as_ref()
            .ok_or_else(|| std::io::Error::other("render worker missing"))
    }
}

impl Drop for RenderWorldFunctions {
    fn drop(&mut self) {
        if self.phase == RenderPhase::WorkerDispatched {
            self.rendering_completed.acquire();
        }
    }
}

impl std::fmt::Debug for RenderWorldFunctions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderWorldFunctions")
            .field("phase", &self.phase)
            .field("view_camera", &self.view_camera)
            .field("has_worker", &self.worker.is_some())
            .finish_non_exhaustive()
    }
}

fn call_pre_render(world: &dyn WorldRenderer) {
    world.pre_render();
}

fn call_render_world(world: &dyn WorldRenderer, perf: &PerformanceWindow, camera: &Camera) {
    perf.time(PerfTimer::RenderWorld, || {
        world.prepare_occlusion(camera);
        world.draw_global_debug_info();
        world.render_world(camera);
    });
}

fn call_wrapped_render_world(
    world: &dyn WorldRenderer,
    perf: &PerformanceWindow,
    completed: &FrameSemaphore,
    camera: &Camera,
) {
    call_render_world(world, perf, camera);
    completed.release();
}

/// Closes the scene on the tick thread. Never runs with an undefined camera
/// unless the host needs the scene closed regardless.
fn call_render_world_end(
    world: &dyn WorldRenderer,
    camera: &Camera,
    unsupported: &mut dyn UnsupportedNodesRenderer,
) {
    if camera.is_undefined() && !world.is_dedicated() && !world.is_post_3d_renderer_enabled() {
        // Captures of a skipped frame are never replayed
        unsupported.discard_unsupported_nodes();
        return;
    }

    world.update_particles();
    let pass = RenderingPassInfo::general_pass(*camera);
    unsupported.render_unsupported_nodes(&pass);
    world.render_scene_end(SceneRenderFlags::GENERAL_SCENE, &pass);
    world.update_post_render(&pass);
    world.end_occlusion();
}
