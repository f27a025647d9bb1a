//! # Async Render Error Types
//!
//! Protocol violations are not propagated: they are logged and asserted
//! through [`protocol_check!`](crate::protocol_check). Only configuration
//! loading returns a `Result`.

use std::thread::ThreadId;

use async_render_core::NodeId;
use thiserror::Error;

/// Violations of the frame synchronization protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AsyncRenderError {
    /// A tick-thread-only operation ran on another thread.
    #[error("thread access violation: {operation} called on {actual:?}, tick thread is {expected:?}")]
    ThreadAccessViolation {
        /// Operation that was called.
        operation: &'static str,
        /// The tick thread.
        expected: ThreadId,
        /// The calling thread.
        actual: ThreadId,
    },

    /// An engine callback re-entered an operation that was still running.
    #[error("reentrant call: {0} while another operation holds the component")]
    ReentrantCall(&'static str),

    /// `register_entity` re-entered registration.
    #[error("register in engine recursion on node {0}")]
    RegisterRecursion(NodeId),

    /// `free_render_node_state` re-entered unregistration.
    #[error("unregister in engine recursion on node {0}")]
    UnregisterRecursion(NodeId),

    /// An owned clone was deleted while its entry was still active.
    #[error("unexpected delete of owned clone {0}")]
    UnexpectedOwnedDelete(NodeId),

    /// Bookkeeping survived a level unload.
    #[error("render nodes not removed after level unload: {entries} entries, {removed} removed, {owned} owned")]
    NodesLeftAfterUnload {
        /// Synchronization entries left.
        entries: usize,
        /// Parked clones left.
        removed: usize,
        /// Owned clones left.
        owned: usize,
    },

    /// A deferred render was captured on another fill thread than the flush.
    #[error("deferred render thread mismatch: captured on {captured}, flushed on {flushed}")]
    DeferredRenderThreadMismatch {
        /// Thread id of the captured pass.
        captured: u32,
        /// Thread id of the flushing pass.
        flushed: u32,
    },

    /// A render job was dispatched while the previous one was not waited on.
    #[error("render job already in flight")]
    RenderAlreadyInFlight,

    /// Wait was called without a matching dispatch.
    #[error("wait for async rendering without a dispatched render")]
    WaitWithoutDispatch,

    /// The render worker is gone.
    #[error("render worker unavailable: {0}")]
    WorkerUnavailable(String),
}

/// Configuration loading failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for [`AsyncRenderConfig`](crate::AsyncRenderConfig).
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be written back as TOML.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Checks a protocol condition.
///
/// On failure the error is logged. With asserts enabled it is an `error!`
/// followed by a debug assertion; with asserts disabled it is a `warn!` and
/// execution continues best-effort. Evaluates to the condition.
#[macro_export]
macro_rules! protocol_check {
    ($asserts_disabled:expr, $cond:expr, $err:expr $(,)?) => {{
        let ok: bool = $cond;
        if !ok {
            let err: $crate::AsyncRenderError = $err;
            if $asserts_disabled {
                ::tracing::warn!(target: "async_render", "protocol violation suppressed: {}", err);
            } else {
                ::tracing::error!(target: "async_render", "protocol violation: {}", err);
                debug_assert!(false, "(AsyncRenderWorld) {}", err);
            }
        }
        ok
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_node() {
        let id = NodeId::next();
        let message = AsyncRenderError::RegisterRecursion(id).to_string();
        assert!(message.contains(&id.to_string()));
    }

    #[test]
    fn test_suppressed_check_continues() {
        let ok = protocol_check!(true, false, AsyncRenderError::WaitWithoutDispatch);
        assert!(!ok);
        assert!(protocol_check!(false, true, AsyncRenderError::WaitWithoutDispatch));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "wait for async rendering without a dispatched render")]
    fn test_failed_check_asserts() {
        let dispatched = false;
        protocol_check!(false, dispatched, AsyncRenderError::WaitWithoutDispatch);
    }

    #[test]
    fn test_config_error_from_toml() {
        let err: ConfigError = toml::from_str::<toml::Value>("enable = ").unwrap_err().into();
        assert!(err.to_string().starts_with("invalid configuration"));
    }
}
