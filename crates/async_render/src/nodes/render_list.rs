//! Deferred renders of unsupported nodes.
//!
//! Mock nodes are traversed on the render worker but their originals may
//! only render on the tick thread. While capture is on, a mock's `render`
//! posts a [`DeferredRender`] into this list; the tick thread drains it in
//! the end-of-scene step.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_render_core::{NodeId, RenderParams, RenderingPassInfo};

/// One captured render call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeferredRender {
    /// The mock node that was traversed.
    pub node: NodeId,
    /// Draw parameters of the traversal.
    pub params: RenderParams,
    /// Pass the traversal recorded into.
    pub pass: RenderingPassInfo,
}

/// Producer side handed to every mock node.
#[derive(Clone, Debug)]
pub struct DeferredRenderSink {
    sender: Sender<DeferredRender>,
    capturing: Arc<AtomicBool>,
}

impl DeferredRenderSink {
    /// Returns true if renders should be deferred rather than issued.
    #[inline]
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }

    /// Queues a render for the end-of-scene flush.
    pub fn push(&self, render: DeferredRender) {
        // The list lives as long as the manager; a closed channel means the
        // subsystem is shutting down and the render is moot.
        if self.sender.send(render).is_err() {
            tracing::debug!(target: "async_render", "deferred render of {} dropped", render.node);
        }
    }
}

/// Consumer side, owned by the render nodes manager.
#[derive(Debug)]
pub struct UnsupportedNodesRenderList {
    sender: Sender<DeferredRender>,
    receiver: Receiver<DeferredRender>,
    capturing: Arc<AtomicBool>,
}

impl UnsupportedNodesRenderList {
    /// Creates an empty list with capture off.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            capturing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A producer handle for a mock node.
    #[must_use]
    pub fn sink(&self) -> DeferredRenderSink {
        DeferredRenderSink {
            sender: self.sender.clone(),
            capturing: Arc::clone(&self.capturing),
        }
    }

    /// Switches mocks to capture mode.
    pub fn start_capture(&self) {
        self.capturing.store(true, Ordering::Release);
    }

    /// Switches mocks back to immediate rendering.
    pub fn stop_capture(&self) {
        self.capturing.store(false, Ordering::Release);
    }

    /// Returns true while mocks defer their renders.
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }

    /// Takes every captured render, in capture order.
    pub fn drain(&self) -> Vec<DeferredRender> {
        self.receiver.try_iter().collect()
    }

    /// Number of captured renders waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true if nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Discards every captured render.
    pub fn clear(&self) {
        while self.receiver.try_recv().is_ok() {}
    }
}

impl Default for UnsupportedNodesRenderList {
    fn default() -> Self {
        Self::new()
    }
}

/// End-of-scene hook rendering the captured unsupported nodes.
///
/// Called on the tick thread once the render job has completed.
pub trait UnsupportedNodesRenderer {
    /// Renders and clears the captured list for `pass`.
    fn render_unsupported_nodes(&mut self, pass: &RenderingPassInfo);

    /// Drops the captured list and leaves capture mode without rendering.
    ///
    /// Used when the end-of-scene step is skipped for the frame.
    fn discard_unsupported_nodes(&mut self);
}
