//! Linear memory allocations and their scope guards
//!
//! Memory is a run of 32-bit words stored as atomics, so kernels on
//! different devices and the host can touch the same allocation without
//! data races. Every access is `Relaxed`: any ordering between accesses
//! has to come from an explicit fence.

use crate::runtime::Device;
use crate::{memory_error, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

use super::budget::MemoryBudget;

/// Size in bytes of one addressable word
pub const WORD_SIZE: usize = std::mem::size_of::<i32>();

static NEXT_ALLOCATION_ID: AtomicU64 = AtomicU64::new(1);

/// Memory space an allocation lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLocation {
    /// Device-resident memory owned by the given device ordinal
    Device(usize),
    /// Page-locked host memory, mapped into every device
    HostPinned,
}

impl fmt::Display for MemoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryLocation::Device(id) => write!(f, "device {}", id),
            MemoryLocation::HostPinned => write!(f, "host-pinned"),
        }
    }
}

/// Allocation flavours, mirroring `hipMalloc` / `hipHostMalloc`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearAllocs {
    DeviceMalloc,
    HostMalloc,
}

#[derive(Debug)]
struct Allocation {
    id: u64,
    words: Box<[AtomicI32]>,
    location: MemoryLocation,
    released: AtomicBool,
}

/// Shared view into an allocation, starting at some word offset.
///
/// Cloning is cheap and keeps the backing storage alive, but once the owning
/// [`LinearAllocGuard`] drops the pointer is marked released and launches
/// that name it are rejected.
#[derive(Clone)]
pub struct DevicePtr {
    alloc: Arc<Allocation>,
    offset: usize,
}

impl DevicePtr {
    /// Memory space the pointer refers to
    pub fn location(&self) -> MemoryLocation {
        self.alloc.location
    }

    /// Words addressable from this pointer to the end of the allocation
    pub fn len_words(&self) -> usize {
        self.alloc.words.len() - self.offset
    }

    /// Bytes addressable from this pointer to the end of the allocation
    pub fn len_bytes(&self) -> usize {
        self.len_words() * WORD_SIZE
    }

    /// Whether the owning guard has already released the allocation
    pub fn is_released(&self) -> bool {
        self.alloc.released.load(Ordering::Acquire)
    }

    /// Pointer `words` further into the same allocation (`&ptr[words]`)
    pub fn offset(&self, words: usize) -> Result<DevicePtr> {
        if words > self.len_words() {
            return Err(memory_error!(
                "Offset of {} words is past the end of a {}-word region",
                words,
                self.len_words()
            ));
        }
        Ok(DevicePtr {
            alloc: Arc::clone(&self.alloc),
            offset: self.offset + words,
        })
    }

    /// Relaxed load of word `idx`.
    ///
    /// # Panics
    ///
    /// Out-of-range access panics; inside a kernel this surfaces as a device
    /// fault at the next synchronize.
    pub fn load(&self, idx: usize) -> i32 {
        self.word(idx).load(Ordering::Relaxed)
    }

    /// Relaxed store to word `idx`.
    ///
    /// # Panics
    ///
    /// Out-of-range access panics, as for [`load`](Self::load).
    pub fn store(&self, idx: usize, value: i32) {
        self.word(idx).store(value, Ordering::Relaxed)
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.is_released() {
            return Err(memory_error!(
                "Allocation {} on {} was used after release",
                self.alloc.id,
                self.alloc.location
            ));
        }
        Ok(())
    }

    fn word(&self, idx: usize) -> &AtomicI32 {
        let len = self.len_words();
        match self.alloc.words.get(self.offset + idx) {
            Some(word) if idx < len => word,
            _ => panic!(
                "word index {} out of range for {}-word region of allocation {}",
                idx, len, self.alloc.id
            ),
        }
    }
}

impl fmt::Debug for DevicePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevicePtr")
            .field("allocation", &self.alloc.id)
            .field("location", &self.alloc.location)
            .field("offset", &self.offset)
            .field("len_words", &self.len_words())
            .finish()
    }
}

/// Scope guard over one linear allocation.
///
/// The allocation is charged to the device's (or the host-pinned) budget on
/// construction and returned on drop, on every exit path.
pub struct LinearAllocGuard {
    kind: LinearAllocs,
    ptr: DevicePtr,
    bytes: usize,
    budget: Arc<MemoryBudget>,
}

impl LinearAllocGuard {
    /// Allocate `bytes` of zeroed memory of the given kind.
    ///
    /// `device` is the issuing context: device allocations land on it, host
    /// allocations are charged to the platform's host-pinned budget it shares.
    pub fn new(kind: LinearAllocs, device: &Device, bytes: usize) -> Result<Self> {
        if bytes == 0 {
            return Err(memory_error!("Cannot allocate zero-sized buffer"));
        }
        if bytes % WORD_SIZE != 0 {
            return Err(memory_error!(
                "Allocation size {} is not a multiple of the {}-byte word size",
                bytes,
                WORD_SIZE
            ));
        }

        let (budget, location) = match kind {
            LinearAllocs::DeviceMalloc => (
                Arc::clone(device.memory_budget()),
                MemoryLocation::Device(device.id()),
            ),
            LinearAllocs::HostMalloc => {
                (Arc::clone(device.host_budget()), MemoryLocation::HostPinned)
            }
        };
        budget.reserve(bytes)?;

        let words: Box<[AtomicI32]> = (0..bytes / WORD_SIZE).map(|_| AtomicI32::new(0)).collect();
        let alloc = Arc::new(Allocation {
            id: NEXT_ALLOCATION_ID.fetch_add(1, Ordering::Relaxed),
            words,
            location,
            released: AtomicBool::new(false),
        });
        log::debug!(
            "Allocated {} bytes on {} (allocation {})",
            bytes,
            location,
            alloc.id
        );

        Ok(Self {
            kind,
            ptr: DevicePtr { alloc, offset: 0 },
            bytes,
            budget,
        })
    }

    /// Pointer usable as a kernel argument
    pub fn ptr(&self) -> DevicePtr {
        self.ptr.clone()
    }

    /// Host-side view of a host-pinned allocation.
    ///
    /// Device memory is not addressable from the host; use a copy instead.
    pub fn host_ptr(&self) -> Result<DevicePtr> {
        match self.kind {
            LinearAllocs::HostMalloc => Ok(self.ptr.clone()),
            LinearAllocs::DeviceMalloc => Err(memory_error!(
                "Allocation {} lives on {} and has no host mapping",
                self.ptr.alloc.id,
                self.ptr.location()
            )),
        }
    }

    pub fn kind(&self) -> LinearAllocs {
        self.kind
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for LinearAllocGuard {
    fn drop(&mut self) {
        self.ptr.alloc.released.store(true, Ordering::Release);
        self.budget.release(self.bytes);
        log::debug!(
            "Released {} bytes on {} (allocation {})",
            self.bytes,
            self.ptr.location(),
            self.ptr.alloc.id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopologyConfig;
    use crate::runtime::Platform;

    fn platform() -> Platform {
        Platform::new(&TopologyConfig::with_devices(2).with_device_memory(64)).unwrap()
    }

    #[test]
    fn test_device_allocation_charges_owner() {
        let platform = platform();
        let dev0 = platform.device(0).unwrap();
        let dev1 = platform.device(1).unwrap();

        let guard = LinearAllocGuard::new(LinearAllocs::DeviceMalloc, &dev0, 16).unwrap();
        assert_eq!(guard.ptr().location(), MemoryLocation::Device(0));
        assert_eq!(guard.ptr().len_words(), 4);
        assert_eq!(dev0.memory_budget().used(), 16);
        assert_eq!(dev1.memory_budget().used(), 0);

        drop(guard);
        assert_eq!(dev0.memory_budget().used(), 0);
    }

    #[test]
    fn test_host_allocation_uses_shared_budget() {
        let platform = platform();
        let dev1 = platform.device(1).unwrap();
        let guard = LinearAllocGuard::new(LinearAllocs::HostMalloc, &dev1, 8).unwrap();
        assert_eq!(guard.ptr().location(), MemoryLocation::HostPinned);
        assert_eq!(platform.host_budget().used(), 8);
        assert!(guard.host_ptr().is_ok());
    }

    #[test]
    fn test_device_memory_has_no_host_mapping() {
        let platform = platform();
        let dev0 = platform.device(0).unwrap();
        let guard = LinearAllocGuard::new(LinearAllocs::DeviceMalloc, &dev0, 8).unwrap();
        assert!(guard.host_ptr().is_err());
    }

    #[test]
    fn test_invalid_sizes() {
        let platform = platform();
        let dev0 = platform.device(0).unwrap();
        assert!(LinearAllocGuard::new(LinearAllocs::DeviceMalloc, &dev0, 0).is_err());
        assert!(LinearAllocGuard::new(LinearAllocs::DeviceMalloc, &dev0, 6).is_err());
        assert!(LinearAllocGuard::new(LinearAllocs::DeviceMalloc, &dev0, 128).is_err());
        assert_eq!(dev0.memory_budget().used(), 0);
    }

    #[test]
    fn test_release_marks_pointer() {
        let platform = platform();
        let dev0 = platform.device(0).unwrap();
        let guard = LinearAllocGuard::new(LinearAllocs::DeviceMalloc, &dev0, 8).unwrap();
        let ptr = guard.ptr();
        assert!(ptr.ensure_live().is_ok());
        drop(guard);
        assert!(ptr.is_released());
        assert!(ptr.ensure_live().is_err());
    }

    #[test]
    fn test_offset_and_access() {
        let platform = platform();
        let dev0 = platform.device(0).unwrap();
        let guard = LinearAllocGuard::new(LinearAllocs::HostMalloc, &dev0, 8).unwrap();
        let base = guard.ptr();
        let second = base.offset(1).unwrap();
        second.store(0, 42);
        assert_eq!(base.load(1), 42);
        assert_eq!(base.load(0), 0, "allocations start zeroed");
        assert_eq!(second.len_words(), 1);
        assert!(base.offset(3).is_err());
        assert!(base.offset(2).unwrap().len_words() == 0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_access_panics() {
        let platform = platform();
        let dev0 = platform.device(0).unwrap();
        let guard = LinearAllocGuard::new(LinearAllocs::HostMalloc, &dev0, 8).unwrap();
        guard.ptr().offset(1).unwrap().load(1);
    }
}
