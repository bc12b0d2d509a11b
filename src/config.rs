//! Configuration for the conformance harness and the emulated platform
//!
//! A single [`ConformanceConfig`] is built once (defaults, optional JSON file,
//! then command-line overrides) and handed to the driver at construction.

use crate::error::{ConformanceError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of protocol iterations per test case
pub const DEFAULT_ITERATIONS: u32 = 10;

/// Default device memory budget: 64 MiB
pub const DEFAULT_DEVICE_MEMORY: usize = 64 * 1024 * 1024;

/// Default host-pinned memory budget: 16 MiB
pub const DEFAULT_HOST_PINNED_MEMORY: usize = 16 * 1024 * 1024;

/// Shape of the emulated platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Number of devices to expose
    pub device_count: usize,

    /// Whether every pair of distinct devices is peer-capable
    pub peer_access: bool,

    /// Memory budget per device in bytes
    pub device_memory_bytes: usize,

    /// Host-pinned memory budget shared by all devices, in bytes
    pub host_pinned_bytes: usize,

    /// Maximum threads per block accepted by launches
    pub max_threads_per_block: u32,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            device_count: 2,
            peer_access: true,
            device_memory_bytes: DEFAULT_DEVICE_MEMORY,
            host_pinned_bytes: DEFAULT_HOST_PINNED_MEMORY,
            max_threads_per_block: 1024,
        }
    }
}

impl TopologyConfig {
    /// Topology with `device_count` peer-capable devices
    pub fn with_devices(device_count: usize) -> Self {
        Self {
            device_count,
            ..Default::default()
        }
    }

    /// Disable peer access between distinct devices
    pub fn without_peer_access(mut self) -> Self {
        self.peer_access = false;
        self
    }

    /// Override the per-device memory budget
    pub fn with_device_memory(mut self, bytes: usize) -> Self {
        self.device_memory_bytes = bytes;
        self
    }
}

/// Top-level harness configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConformanceConfig {
    /// Protocol repetitions per test case
    pub iterations: u32,

    /// Emulated platform shape
    pub topology: TopologyConfig,
}

impl Default for ConformanceConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            topology: TopologyConfig::default(),
        }
    }
}

impl ConformanceConfig {
    /// Config with the given iteration count and default topology
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations,
            ..Default::default()
        }
    }

    /// Replace the topology
    pub fn with_topology(mut self, topology: TopologyConfig) -> Self {
        self.topology = topology;
        self
    }

    /// Parse a config from a JSON string. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        log::debug!("Loaded configuration from {}", path.display());
        Self::from_json_str(&text)
    }

    /// Reject configurations the harness cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(ConformanceError::Config(
                "iterations must be at least 1".to_string(),
            ));
        }
        if self.topology.max_threads_per_block == 0 {
            return Err(ConformanceError::Config(
                "max_threads_per_block must be at least 1".to_string(),
            ));
        }
        if self.topology.device_count > 64 {
            return Err(ConformanceError::Config(format!(
                "device_count {} exceeds the emulator limit of 64",
                self.topology.device_count
            )));
        }
        Ok(())
    }
}
