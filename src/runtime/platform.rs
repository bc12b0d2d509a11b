//! Device enumeration and peer-to-peer access
//!
//! A [`Platform`] owns every emulated device, the host-pinned memory budget,
//! one default stream per device, and the peer-access table.

use super::device::{Device, DeviceProperties};
use super::stream::Stream;
use crate::config::TopologyConfig;
use crate::memory::MemoryBudget;
use crate::{runtime_error, Result};
use parking_lot::RwLock;
use std::sync::Arc;

/// Peer access matrix: `matrix[from][to]` says whether kernels on `from`
/// may address memory owned by `to`.
#[derive(Debug)]
pub struct PeerTable {
    matrix: RwLock<Vec<Vec<bool>>>,
}

impl PeerTable {
    /// Self-access always; cross-device access iff `peer_capable`
    pub fn new(device_count: usize, peer_capable: bool) -> Self {
        let matrix = (0..device_count)
            .map(|i| (0..device_count).map(|j| i == j || peer_capable).collect())
            .collect();
        Self {
            matrix: RwLock::new(matrix),
        }
    }

    pub fn can_access(&self, from: usize, to: usize) -> bool {
        self.matrix
            .read()
            .get(from)
            .and_then(|row| row.get(to))
            .copied()
            .unwrap_or(false)
    }

    fn set_pair(&self, a: usize, b: usize, enabled: bool) {
        let mut matrix = self.matrix.write();
        matrix[a][b] = enabled;
        matrix[b][a] = enabled;
    }
}

/// The set of devices visible to the harness.
pub struct Platform {
    devices: Vec<Arc<Device>>,
    default_streams: Vec<Stream>,
    peers: Arc<PeerTable>,
    host_memory: Arc<MemoryBudget>,
}

impl Platform {
    /// Build the devices described by `topology`, each with a default stream.
    pub fn new(topology: &TopologyConfig) -> Result<Self> {
        let peers = Arc::new(PeerTable::new(topology.device_count, topology.peer_access));
        let host_memory = Arc::new(MemoryBudget::new("host-pinned", topology.host_pinned_bytes));

        let devices: Vec<Arc<Device>> = (0..topology.device_count)
            .map(|id| {
                Arc::new(Device::new(
                    id,
                    DeviceProperties::emulated(
                        id,
                        topology.device_memory_bytes,
                        topology.max_threads_per_block,
                    ),
                    Arc::clone(&host_memory),
                    Arc::clone(&peers),
                ))
            })
            .collect();

        let default_streams = devices
            .iter()
            .map(|device| device.create_stream())
            .collect::<Result<Vec<_>>>()?;

        log::info!(
            "Emulated platform with {} device(s), peer access {}",
            devices.len(),
            if topology.peer_access { "enabled" } else { "disabled" }
        );

        Ok(Self {
            devices,
            default_streams,
            peers,
            host_memory,
        })
    }

    /// Get number of available devices (`hipGetDeviceCount`)
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Handle to device `index`
    pub fn device(&self, index: usize) -> Result<Arc<Device>> {
        self.devices.get(index).cloned().ok_or_else(|| {
            runtime_error!(
                "Device index {} out of range (have {})",
                index,
                self.devices.len()
            )
        })
    }

    /// Null stream of device `index`
    pub fn default_stream(&self, index: usize) -> Result<&Stream> {
        self.default_streams.get(index).ok_or_else(|| {
            runtime_error!(
                "Device index {} out of range (have {})",
                index,
                self.devices.len()
            )
        })
    }

    /// Whether `device` can address memory owned by `peer` (`hipDeviceCanAccessPeer`)
    pub fn can_access_peer(&self, device: usize, peer: usize) -> Result<bool> {
        self.check_pair(device, peer)?;
        Ok(self.peers.can_access(device, peer))
    }

    /// Enable access in both directions between two devices
    pub fn enable_peer_access(&self, a: usize, b: usize) -> Result<()> {
        self.check_pair(a, b)?;
        self.peers.set_pair(a, b, true);
        log::debug!("Enabled peer access between devices {} and {}", a, b);
        Ok(())
    }

    /// Disable access in both directions; self-access cannot be disabled
    pub fn disable_peer_access(&self, a: usize, b: usize) -> Result<()> {
        self.check_pair(a, b)?;
        if a == b {
            return Err(runtime_error!("Device {} cannot lose access to itself", a));
        }
        self.peers.set_pair(a, b, false);
        log::debug!("Disabled peer access between devices {} and {}", a, b);
        Ok(())
    }

    /// Host-pinned memory budget shared by all devices
    pub fn host_budget(&self) -> &Arc<MemoryBudget> {
        &self.host_memory
    }

    /// Block until every device is idle, reporting the first fault found
    pub fn synchronize_all(&self) -> Result<()> {
        let mut first_error = None;
        for device in &self.devices {
            if let Err(e) = device.synchronize() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn check_pair(&self, a: usize, b: usize) -> Result<()> {
        let n = self.devices.len();
        if a >= n || b >= n {
            return Err(runtime_error!(
                "Device pair ({}, {}) out of range (have {})",
                a,
                b,
                n
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("devices", &self.devices.len())
            .finish()
    }
}
