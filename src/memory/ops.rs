//! Fill and copy operations over linear memory
//!
//! Both run on the calling thread and complete before returning. They do
//! not wait for kernels: synchronize the devices that write the source
//! before copying out of it.

use super::linear::{DevicePtr, MemoryLocation, WORD_SIZE};
use crate::{memory_error, Result};

/// Direction of a copy, inferred from the source and destination locations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemcpyKind {
    HostToHost,
    HostToDevice,
    DeviceToHost,
    DeviceToDevice,
    /// Between two distinct devices
    PeerToPeer,
}

impl MemcpyKind {
    /// Infer the direction from where the source and destination live
    pub fn infer(dst: MemoryLocation, src: MemoryLocation) -> Self {
        match (src, dst) {
            (MemoryLocation::HostPinned, MemoryLocation::HostPinned) => MemcpyKind::HostToHost,
            (MemoryLocation::HostPinned, MemoryLocation::Device(_)) => MemcpyKind::HostToDevice,
            (MemoryLocation::Device(_), MemoryLocation::HostPinned) => MemcpyKind::DeviceToHost,
            (MemoryLocation::Device(a), MemoryLocation::Device(b)) if a == b => {
                MemcpyKind::DeviceToDevice
            }
            (MemoryLocation::Device(_), MemoryLocation::Device(_)) => MemcpyKind::PeerToPeer,
        }
    }
}

/// Set `count` 32-bit words starting at `dst` to `value` (`hipMemsetD32`).
pub fn memset_d32(dst: &DevicePtr, value: i32, count: usize) -> Result<()> {
    dst.ensure_live()?;
    if count > dst.len_words() {
        return Err(memory_error!(
            "memset of {} words overruns a {}-word region",
            count,
            dst.len_words()
        ));
    }
    for idx in 0..count {
        dst.store(idx, value);
    }
    Ok(())
}

/// Copy `bytes` from `src` to `dst`, inferring the direction.
///
/// Returns the inferred [`MemcpyKind`]. Overlapping regions of the same
/// allocation are copied as if through a temporary.
pub fn memcpy(dst: &DevicePtr, src: &DevicePtr, bytes: usize) -> Result<MemcpyKind> {
    dst.ensure_live()?;
    src.ensure_live()?;
    if bytes % WORD_SIZE != 0 {
        return Err(memory_error!(
            "Copy size {} is not a multiple of the {}-byte word size",
            bytes,
            WORD_SIZE
        ));
    }
    if bytes > src.len_bytes() {
        return Err(memory_error!(
            "Copy of {} bytes overruns the {}-byte source region",
            bytes,
            src.len_bytes()
        ));
    }
    if bytes > dst.len_bytes() {
        return Err(memory_error!(
            "Copy of {} bytes overruns the {}-byte destination region",
            bytes,
            dst.len_bytes()
        ));
    }

    let kind = MemcpyKind::infer(dst.location(), src.location());
    let staged: Vec<i32> = (0..bytes / WORD_SIZE).map(|idx| src.load(idx)).collect();
    for (idx, value) in staged.into_iter().enumerate() {
        dst.store(idx, value);
    }
    log::trace!("memcpy {:?}: {} bytes", kind, bytes);
    Ok(kind)
}

/// Read `count` words starting at `src` into a host vector.
pub fn read_words(src: &DevicePtr, count: usize) -> Result<Vec<i32>> {
    src.ensure_live()?;
    if count > src.len_words() {
        return Err(memory_error!(
            "Read of {} words overruns a {}-word region",
            count,
            src.len_words()
        ));
    }
    Ok((0..count).map(|idx| src.load(idx)).collect())
}
