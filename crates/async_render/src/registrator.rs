//! Octree registration through the scene engine, with in-flight tracking.
//!
//! The engine notifies the subsystem from inside `register_entity`,
//! `free_render_node_state` and `release_render_node`. Those callbacks must
//! be told apart from engine-initiated traffic, so every call made on the
//! subsystem's behalf raises a flag for its duration. The flags are atomics
//! so callbacks can read them without touching any lock the caller holds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_render_core::{SceneEngine, SharedNode};

use crate::error::AsyncRenderError;
use crate::protocol_check;

/// Lowers a flag when dropped, so an unwinding engine call cannot leave it up.
struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Scene engine handle plus the in-flight flags for calls made through it.
pub struct RenderNodesRegistratorHelper {
    engine: Arc<dyn SceneEngine>,
    register_in_engine: AtomicBool,
    unregister_in_engine: AtomicBool,
    handling_node_remove: AtomicBool,
}

impl RenderNodesRegistratorHelper {
    /// Wraps `engine`.
    #[must_use]
    pub fn new(engine: Arc<dyn SceneEngine>) -> Self {
        Self {
            engine,
            register_in_engine: AtomicBool::new(false),
            unregister_in_engine: AtomicBool::new(false),
            handling_node_remove: AtomicBool::new(false),
        }
    }

    /// The wrapped engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn SceneEngine> {
        &self.engine
    }

    /// Registers `node` in the octree.
    ///
    /// Registration must not recurse: a nested call is a protocol violation
    /// and is skipped.
    pub fn register_in_engine(&self, node: &SharedNode, asserts_disabled: bool) {
        let idle = !self.register_in_engine.load(Ordering::Acquire);
        if !protocol_check!(asserts_disabled, idle, AsyncRenderError::RegisterRecursion(node.id())) {
            return;
        }
        let _guard = FlagGuard::raise(&self.register_in_engine);
        self.engine.register_entity(node);
    }

    /// Removes `node` from the octree. Same recursion rule as registration.
    pub fn unregister_in_engine(&self, node: &SharedNode, asserts_disabled: bool) {
        let idle = !self.unregister_in_engine.load(Ordering::Acquire);
        if !protocol_check!(asserts_disabled, idle, AsyncRenderError::UnregisterRecursion(node.id())) {
            return;
        }
        let _guard = FlagGuard::raise(&self.unregister_in_engine);
        self.engine.free_render_node_state(node);
    }

    /// Hands a clone back to the engine before it is dropped.
    ///
    /// Deletion notifications arriving meanwhile are ignored by the manager.
    pub fn release_in_engine(&self, node: &SharedNode) {
        let _guard = FlagGuard::raise(&self.handling_node_remove);
        self.engine.release_render_node(node);
    }

    /// True while a registration made by the subsystem is in flight.
    #[inline]
    #[must_use]
    pub fn should_register(&self) -> bool {
        self.register_in_engine.load(Ordering::Acquire)
    }

    /// True while an unregistration made by the subsystem is in flight.
    #[inline]
    #[must_use]
    pub fn should_unregister(&self) -> bool {
        self.unregister_in_engine.load(Ordering::Acquire)
    }

    /// True while a clone is being released.
    #[inline]
    #[must_use]
    pub fn is_handling_node_remove(&self) -> bool {
        self.handling_node_remove.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for RenderNodesRegistratorHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderNodesRegistratorHelper")
            .field("register_in_engine", &self.should_register())
            .field("unregister_in_engine", &self.should_unregister())
            .field("handling_node_remove", &self.is_handling_node_remove())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_render_core::testing::{CallTrace, EngineCall, RecordingEngine, TestNode, TraceEvent};
    use async_render_core::RenderNodeKind;
    use parking_lot::Mutex;

    #[test]
    fn test_flags_visible_from_engine_callback() {
        let trace = CallTrace::new();
        let engine = RecordingEngine::new(&trace);
        let helper = Arc::new(RenderNodesRegistratorHelper::new(engine.clone()));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let (callback_helper, callback_seen) = (Arc::clone(&helper), Arc::clone(&seen));
        engine.set_callback(move |call, _| {
            callback_seen.lock().push((
                call,
                callback_helper.should_register(),
                callback_helper.should_unregister(),
                callback_helper.is_handling_node_remove(),
            ));
        });

        let node = TestNode::new("crate", RenderNodeKind::Brush, &trace).shared();
        helper.register_in_engine(&node, false);
        helper.unregister_in_engine(&node, false);
        helper.release_in_engine(&node);

        assert_eq!(
            *seen.lock(),
            vec![
                (EngineCall::Register, true, false, false),
                (EngineCall::Free, false, true, false),
                (EngineCall::Release, false, false, true),
            ]
        );
        assert!(!helper.should_register());
        assert!(!helper.should_unregister());
        assert!(!helper.is_handling_node_remove());
        assert_eq!(trace.count(TraceEvent::Register(node.id())), 1);
    }

    #[test]
    fn test_recursive_register_is_skipped_when_suppressed() {
        let trace = CallTrace::new();
        let engine = RecordingEngine::new(&trace);
        let helper = Arc::new(RenderNodesRegistratorHelper::new(engine.clone()));

        let callback_helper = Arc::clone(&helper);
        engine.set_callback(move |call, node| {
            if call == EngineCall::Register {
                callback_helper.register_in_engine(node, true);
            }
        });

        let node = TestNode::new("lamp", RenderNodeKind::Light, &trace).shared();
        helper.register_in_engine(&node, true);
        assert_eq!(trace.count(TraceEvent::Register(node.id())), 1);
    }
}
