//! Memory fences (`__threadfence_block`, `__threadfence`, `__threadfence_system`)
//!
//! On the emulated runtime every memory access is a relaxed atomic, so a
//! fence is the only thing that orders two accesses for an observer in
//! another execution context. Scopes map onto the host memory model:
//!
//! | Scope    | Host fence |
//! |----------|------------|
//! | `Block`  | `AcqRel`   |
//! | `Device` | `AcqRel`   |
//! | `System` | `SeqCst`   |
//!
//! An `AcqRel` fence after a write and one before a read are enough for the
//! message-passing pattern the protocol checks. `System` is additionally
//! part of the single total order of `SeqCst` operations, which is the
//! strongest guarantee the host offers.

use std::fmt;
use std::sync::atomic::{fence, Ordering};

/// Set of observers a fence orders writes for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FenceScope {
    /// Threads of the issuing block
    Block,
    /// Every thread of the issuing device
    Device,
    /// All devices and the host
    System,
}

impl FenceScope {
    /// Host memory ordering used to implement this scope
    pub fn ordering(self) -> Ordering {
        match self {
            FenceScope::Block | FenceScope::Device => Ordering::AcqRel,
            FenceScope::System => Ordering::SeqCst,
        }
    }

    /// Whether a fence of this scope also orders accesses for `other`'s observers
    pub fn covers(self, other: FenceScope) -> bool {
        self >= other
    }
}

impl fmt::Display for FenceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FenceScope::Block => write!(f, "block"),
            FenceScope::Device => write!(f, "device"),
            FenceScope::System => write!(f, "system"),
        }
    }
}

/// Issue a fence of the given scope
#[inline]
pub fn threadfence_scoped(scope: FenceScope) {
    fence(scope.ordering());
}

/// `__threadfence_block`
#[inline]
pub fn threadfence_block() {
    threadfence_scoped(FenceScope::Block);
}

/// `__threadfence`
#[inline]
pub fn threadfence() {
    threadfence_scoped(FenceScope::Device);
}

/// `__threadfence_system`
#[inline]
pub fn threadfence_system() {
    threadfence_scoped(FenceScope::System);
}
