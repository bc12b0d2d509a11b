//! Emulated device: identity, memory budget, and device-wide synchronisation

use super::platform::PeerTable;
use super::stream::{Stream, WorkTracker};
use crate::memory::{DevicePtr, MemoryBudget, MemoryLocation};
use crate::{ConformanceError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Device properties
#[derive(Debug, Clone)]
pub struct DeviceProperties {
    pub name: String,
    pub total_memory: usize,
    pub max_threads_per_block: u32,
    pub warp_size: u32,
    pub compute_capability: (u32, u32),
}

impl DeviceProperties {
    /// Properties reported by an emulated device
    pub fn emulated(id: usize, total_memory: usize, max_threads_per_block: u32) -> Self {
        Self {
            name: format!("Emulated Device {}", id),
            total_memory,
            max_threads_per_block,
            warp_size: 1,
            compute_capability: (0, 0),
        }
    }
}

/// One execution context.
///
/// Devices are created by [`Platform`](super::Platform) and handed out as
/// `Arc<Device>`; there is no implicit "current device".
pub struct Device {
    id: usize,
    properties: DeviceProperties,
    memory: Arc<MemoryBudget>,
    host_memory: Arc<MemoryBudget>,
    peers: Arc<PeerTable>,
    work: Arc<WorkTracker>,
    launches: AtomicU64,
    next_stream: AtomicU64,
}

impl Device {
    pub(crate) fn new(
        id: usize,
        properties: DeviceProperties,
        host_memory: Arc<MemoryBudget>,
        peers: Arc<PeerTable>,
    ) -> Self {
        let memory = Arc::new(MemoryBudget::new(
            format!("device {}", id),
            properties.total_memory,
        ));
        Self {
            id,
            properties,
            memory,
            host_memory,
            peers,
            work: Arc::new(WorkTracker::new()),
            launches: AtomicU64::new(0),
            next_stream: AtomicU64::new(0),
        }
    }

    /// Device ordinal
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    /// Budget for memory resident on this device
    pub fn memory_budget(&self) -> &Arc<MemoryBudget> {
        &self.memory
    }

    /// Host-pinned budget shared with the rest of the platform
    pub fn host_budget(&self) -> &Arc<MemoryBudget> {
        &self.host_memory
    }

    /// Whether kernels on this device may address memory at `location`
    pub fn can_access(&self, location: MemoryLocation) -> bool {
        match location {
            MemoryLocation::HostPinned => true,
            MemoryLocation::Device(owner) => self.peers.can_access(self.id, owner),
        }
    }

    /// Reject pointers this device may not dereference, or that are released
    pub fn check_access(&self, ptr: &DevicePtr) -> Result<()> {
        ptr.ensure_live()?;
        match ptr.location() {
            MemoryLocation::Device(owner) if !self.can_access(ptr.location()) => {
                Err(ConformanceError::PeerAccess {
                    from: self.id,
                    to: owner,
                })
            }
            _ => Ok(()),
        }
    }

    /// Create an additional stream on this device
    pub fn create_stream(self: &Arc<Self>) -> Result<Stream> {
        let index = self.next_stream.fetch_add(1, Ordering::Relaxed);
        Stream::new(Arc::clone(self), index)
    }

    /// Block until every stream of this device is idle (`hipDeviceSynchronize`).
    ///
    /// Reports, and clears, a fault raised by any kernel since the last
    /// synchronize.
    pub fn synchronize(&self) -> Result<()> {
        self.work.wait_idle();
        self.take_fault()
    }

    /// Kernels launched on this device so far
    pub fn launch_count(&self) -> u64 {
        self.launches.load(Ordering::Relaxed)
    }

    /// Operations currently queued or running on this device
    pub fn pending_ops(&self) -> u64 {
        self.work.pending()
    }

    pub(crate) fn work(&self) -> &Arc<WorkTracker> {
        &self.work
    }

    pub(crate) fn record_launch(&self) {
        self.launches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn take_fault(&self) -> Result<()> {
        match self.work.take_fault() {
            Some(message) => Err(crate::runtime_error!(
                "Device {} fault: {}",
                self.id,
                message
            )),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("name", &self.properties.name)
            .finish()
    }
}
