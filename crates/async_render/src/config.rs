//! # Configuration
//!
//! Loaded once at startup from TOML and handed to the
//! [`SystemComponent`](crate::SystemComponent). Runtime toggles (console
//! commands, debug menu) go through the component, never through a global.
//!
//! ```toml
//! enable = true
//! sequential_execution_order = false
//! min_cpu_cores = 4
//!
//! [nodes]
//! disable_asserts = false
//! actions_logging = false
//! parallel_copy = true
//! unregister_nodes_on_delete = true
//! register_unsupported_nodes = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::thread;

use crate::error::ConfigResult;

/// Minimum number of hardware threads for async rendering to pay off.
pub const DEFAULT_MIN_CPU_CORES: usize = 4;

/// Top level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsyncRenderConfig {
    /// Master switch. Off unless explicitly turned on.
    pub enable: bool,
    /// Run the render job inline on the tick thread (debug fallback).
    pub sequential_execution_order: bool,
    /// Core count below which the subsystem stays disabled.
    pub min_cpu_cores: usize,
    /// Render nodes manager toggles.
    pub nodes: NodesManagerSettings,
}

impl Default for AsyncRenderConfig {
    fn default() -> Self {
        Self {
            enable: false,
            sequential_execution_order: false,
            min_cpu_cores: DEFAULT_MIN_CPU_CORES,
            nodes: NodesManagerSettings::default(),
        }
    }
}

impl AsyncRenderConfig {
    /// Parses a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Reads and parses a TOML file.
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Serializes back to TOML.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Returns true if async rendering should run on `host`.
    ///
    /// Requires the switch to be on, a non-editor host and enough cores.
    #[must_use]
    pub fn is_async_render_allowed(&self, host: &HostEnvironment) -> bool {
        self.enable && !host.is_editor && host.cpu_cores >= self.min_cpu_cores
    }
}

/// Render nodes manager toggles, all runtime mutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodesManagerSettings {
    /// Log protocol violations as warnings instead of asserting.
    pub disable_asserts: bool,
    /// Detailed per-node operation logging.
    pub actions_logging: bool,
    /// Refresh clones in parallel.
    pub parallel_copy: bool,
    /// Unregister every deleted clone, not only the registered ones.
    pub unregister_nodes_on_delete: bool,
    /// Route nodes without async support through mock nodes.
    pub register_unsupported_nodes: bool,
}

impl Default for NodesManagerSettings {
    fn default() -> Self {
        Self {
            disable_asserts: false,
            actions_logging: false,
            parallel_copy: true,
            unregister_nodes_on_delete: true,
            register_unsupported_nodes: true,
        }
    }
}

/// Facts about the host process that gate the subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostEnvironment {
    /// Running inside the editor.
    pub is_editor: bool,
    /// Hardware threads available.
    pub cpu_cores: usize,
}

impl HostEnvironment {
    /// A game (non-editor) host with the detected core count.
    #[must_use]
    pub fn detect() -> Self {
        Self {
            is_editor: false,
            cpu_cores: thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
        }
    }
}
