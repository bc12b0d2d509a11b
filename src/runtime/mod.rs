//! Emulated compute runtime
//!
//! Devices are host-side execution contexts. Each device runs kernels on
//! asynchronous streams backed by worker threads, so work launched on two
//! devices genuinely races, and the only ordering between them is what the
//! kernels establish with fences plus what the host establishes with
//! synchronize calls.

pub mod device;
pub mod grid;
pub mod kernel;
pub mod platform;
pub mod stream;

use std::cell::RefCell;

pub use device::{Device, DeviceProperties};
pub use grid::{Block, Dim3, Grid};
pub use kernel::{launch_kernel, KernelArgs, KernelFunction, LaunchConfig, ThreadContext};
pub use platform::Platform;
pub use stream::Stream;

// ── Kernel execution context ──────────────────────────────────────

/// Built-in variables visible to the currently executing logical thread.
///
/// The stream worker installs one of these before each logical thread of a
/// launch runs, which is what backs `thread::index()`, `block::index()`,
/// `block::dim()` and `grid_dim::dim()`.
#[derive(Debug, Clone, Copy)]
pub struct KernelContext {
    /// Thread index within the block (`threadIdx`)
    pub thread_idx: Dim3,
    /// Block index within the grid (`blockIdx`)
    pub block_idx: Dim3,
    /// Dimensions of each block (`blockDim`)
    pub block_dim: Dim3,
    /// Dimensions of the grid (`gridDim`)
    pub grid_dim: Dim3,
    /// Ordinal of the device executing the kernel
    pub device_id: usize,
}

thread_local! {
    static KERNEL_CONTEXT: RefCell<Option<KernelContext>> = const { RefCell::new(None) };
}

/// Clears the installed context when dropped, including on unwind.
struct ContextGuard;

impl Drop for ContextGuard {
    fn drop(&mut self) {
        KERNEL_CONTEXT.with(|c| {
            *c.borrow_mut() = None;
        });
    }
}

/// Execute a closure with a kernel context installed, then clear it.
///
/// The context is cleared even if the closure panics, so a faulting kernel
/// does not leak its indices into the next launch on the same worker.
pub fn with_kernel_context<F, R>(ctx: KernelContext, f: F) -> R
where
    F: FnOnce() -> R,
{
    KERNEL_CONTEXT.with(|c| {
        *c.borrow_mut() = Some(ctx);
    });
    let _guard = ContextGuard;
    f()
}

/// Device executing the current kernel, or `None` on the host.
pub fn current_device() -> Option<usize> {
    KERNEL_CONTEXT.with(|c| c.borrow().as_ref().map(|ctx| ctx.device_id))
}

/// Thread index access (`threadIdx`)
pub mod thread {
    use super::grid::Dim3;
    use super::KERNEL_CONTEXT;

    /// Current thread index, or all zeros outside a kernel.
    pub fn index() -> Dim3 {
        KERNEL_CONTEXT.with(|c| {
            c.borrow()
                .as_ref()
                .map(|ctx| ctx.thread_idx)
                .unwrap_or(Dim3 { x: 0, y: 0, z: 0 })
        })
    }
}

/// Block index and dimension access (`blockIdx` / `blockDim`)
pub mod block {
    use super::grid::Dim3;
    use super::KERNEL_CONTEXT;

    /// Current block index, or all zeros outside a kernel.
    pub fn index() -> Dim3 {
        KERNEL_CONTEXT.with(|c| {
            c.borrow()
                .as_ref()
                .map(|ctx| ctx.block_idx)
                .unwrap_or(Dim3 { x: 0, y: 0, z: 0 })
        })
    }

    /// Block dimensions; a single thread outside a kernel.
    pub fn dim() -> Dim3 {
        KERNEL_CONTEXT.with(|c| {
            c.borrow()
                .as_ref()
                .map(|ctx| ctx.block_dim)
                .unwrap_or_default()
        })
    }
}

/// Grid dimension access (`gridDim`)
pub mod grid_dim {
    use super::grid::Dim3;
    use super::KERNEL_CONTEXT;

    /// Grid dimensions; a single block outside a kernel.
    pub fn dim() -> Dim3 {
        KERNEL_CONTEXT.with(|c| {
            c.borrow()
                .as_ref()
                .map(|ctx| ctx.grid_dim)
                .unwrap_or_default()
        })
    }
}
