//! Byte accounting for a memory space (one device, or host-pinned memory)

use crate::{memory_error, Result};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Capacity-limited allocation counter for one memory space.
#[derive(Debug)]
pub struct MemoryBudget {
    label: String,
    capacity: usize,
    used: AtomicUsize,
    total_allocations: AtomicU64,
}

impl MemoryBudget {
    pub fn new(label: impl Into<String>, capacity: usize) -> Self {
        Self {
            label: label.into(),
            capacity,
            used: AtomicUsize::new(0),
            total_allocations: AtomicU64::new(0),
        }
    }

    /// Charge `bytes` against the budget, failing if it would overflow.
    pub fn reserve(&self, bytes: usize) -> Result<()> {
        let mut current = self.used.load(Ordering::Relaxed);
        loop {
            let next = current
                .checked_add(bytes)
                .filter(|next| *next <= self.capacity)
                .ok_or_else(|| {
                    memory_error!(
                        "Out of memory on {}: requested {} bytes with {} of {} bytes in use",
                        self.label,
                        bytes,
                        current,
                        self.capacity
                    )
                })?;
            match self
                .used
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        self.total_allocations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Return `bytes` previously charged with [`reserve`](Self::reserve).
    pub fn release(&self, bytes: usize) {
        let previous = self.used.fetch_sub(bytes, Ordering::AcqRel);
        debug_assert!(previous >= bytes, "released more than reserved on {}", self.label);
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently charged
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.used())
    }

    /// Number of successful reservations over the budget's lifetime
    pub fn total_allocations(&self) -> u64 {
        self.total_allocations.load(Ordering::Relaxed)
    }
}
