//! Frame timers for the async render critical sections.
//!
//! Shared between the tick thread and the render worker. Values are in
//! milliseconds and exponentially smoothed unless smoothing is switched off.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Weight of the newest sample when smoothing.
pub const SMOOTHING_FACTOR: f32 = 0.1;

/// Frame time assumed before the first sample arrives.
const INITIAL_FRAME_TIME_MS: f32 = 16.6;

/// Instrumented sections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PerfTimer {
    /// Clone refresh and pending register/unregister in the commit step.
    Copy,
    /// End-of-scene rendering of captured unsupported nodes.
    UnsupportedNodes,
    /// The render job itself.
    RenderWorld,
    /// Tick thread blocked on the render job.
    MainWaits,
}

/// Current smoothed values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerfSnapshot {
    /// Whole frame.
    pub frame_ms: f32,
    /// [`PerfTimer::Copy`].
    pub copy_ms: f32,
    /// [`PerfTimer::UnsupportedNodes`].
    pub unsupported_nodes_ms: f32,
    /// [`PerfTimer::RenderWorld`].
    pub render_world_ms: f32,
    /// [`PerfTimer::MainWaits`].
    pub main_waits_ms: f32,
}

#[derive(Debug)]
struct PerfState {
    enabled: bool,
    smooth: bool,
    values: PerfSnapshot,
}

impl PerfState {
    fn smoothed(&self, previous: f32, sample: f32) -> f32 {
        if self.smooth {
            (1.0 - SMOOTHING_FACTOR) * previous + SMOOTHING_FACTOR * sample
        } else {
            sample
        }
    }
}

/// Smoothed timers plus a log summary.
#[derive(Debug)]
pub struct PerformanceWindow {
    state: Mutex<PerfState>,
}

impl PerformanceWindow {
    /// Creates a hidden window with smoothing on.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PerfState {
                enabled: false,
                smooth: true,
                values: PerfSnapshot {
                    frame_ms: INITIAL_FRAME_TIME_MS,
                    copy_ms: 0.0,
                    unsupported_nodes_ms: 0.0,
                    render_world_ms: 0.0,
                    main_waits_ms: 0.0,
                },
            }),
        }
    }

    /// Shows or hides the summary.
    pub fn toggle_enabled(&self) {
        let mut state = self.state.lock();
        state.enabled = !state.enabled;
    }

    /// Returns true if the summary is shown.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    /// Turns smoothing on or off.
    pub fn set_smooth(&self, smooth: bool) {
        self.state.lock().smooth = smooth;
    }

    /// Feeds one sample for `timer`.
    pub fn record(&self, timer: PerfTimer, elapsed: Duration) {
        let sample = elapsed.as_secs_f32() * 1000.0;
        let mut state = self.state.lock();
        let previous = match timer {
            PerfTimer::Copy => state.values.copy_ms,
            PerfTimer::UnsupportedNodes => state.values.unsupported_nodes_ms,
            PerfTimer::RenderWorld => state.values.render_world_ms,
            PerfTimer::MainWaits => state.values.main_waits_ms,
        };
        let value = state.smoothed(previous, sample);
        let slot = match timer {
            PerfTimer::Copy => &mut state.values.copy_ms,
            PerfTimer::UnsupportedNodes => &mut state.values.unsupported_nodes_ms,
            PerfTimer::RenderWorld => &mut state.values.render_world_ms,
            PerfTimer::MainWaits => &mut state.values.main_waits_ms,
        };
        *slot = value;
    }

    /// Runs `f` and records how long it took.
    pub fn time<R>(&self, timer: PerfTimer, f: impl FnOnce() -> R) -> R {
        let started = Instant::now();
        let result = f();
        self.record(timer, started.elapsed());
        result
    }

    /// Current values.
    #[must_use]
    pub fn snapshot(&self) -> PerfSnapshot {
        self.state.lock().values
    }

    /// Feeds the frame time and logs the summary when shown.
    pub fn show(&self, frame_time: Duration) {
        let mut state = self.state.lock();
        if !state.enabled {
            return;
        }
        let frame_ms = state.smoothed(state.values.frame_ms, frame_time.as_secs_f32() * 1000.0);
        state.values.frame_ms = frame_ms;

        let v = state.values;
        let share = |ms: f32| if v.frame_ms > 0.0 { ms / v.frame_ms * 100.0 } else { 0.0 };
        tracing::info!(
            target: "async_render::perf",
            "frame {:.1} ms | render world {:.1} ({:.0}%) | main waits {:.1} ({:.0}%) | unsupported nodes {:.1} ({:.0}%) | copy {:.1} ({:.0}%)",
            v.frame_ms,
            v.render_world_ms,
            share(v.render_world_ms),
            v.main_waits_ms,
            share(v.main_waits_ms),
            v.unsupported_nodes_ms,
            share(v.unsupported_nodes_ms),
            v.copy_ms,
            share(v.copy_ms),
        );
    }
}

impl Default for PerformanceWindow {
    fn default() -> Self {
        Self::new()
    }
}
