//! Memory management: budgets, linear allocations, fill and copy

pub mod budget;
pub mod linear;
pub mod ops;

pub use budget::MemoryBudget;
pub use linear::{DevicePtr, LinearAllocGuard, LinearAllocs, MemoryLocation, WORD_SIZE};
pub use ops::{memcpy, memset_d32, read_words, MemcpyKind};
