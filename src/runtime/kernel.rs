//! Kernel definition and launch

use super::grid::{Block, Dim3, Grid};
use super::{with_kernel_context, KernelContext, Stream};
use crate::memory::DevicePtr;
use crate::Result;
use std::sync::Arc;

/// Indices of one logical thread, passed to [`KernelFunction::execute`]
#[derive(Debug, Clone, Copy)]
pub struct ThreadContext {
    pub thread_idx: Dim3,
    pub block_idx: Dim3,
    pub block_dim: Dim3,
    pub grid_dim: Dim3,
}

impl ThreadContext {
    /// Linear thread id along x (`blockIdx.x * blockDim.x + threadIdx.x`)
    pub fn global_thread_id(&self) -> usize {
        (self.block_idx.x as usize) * (self.block_dim.x as usize) + self.thread_idx.x as usize
    }
}

/// A kernel body executed once per logical thread.
pub trait KernelFunction<A>: Send + Sync {
    fn execute(&self, args: A, ctx: ThreadContext);

    fn name(&self) -> &str {
        "anonymous_kernel"
    }
}

/// Argument bundle of a kernel launch.
///
/// Launches validate every pointer returned by [`pointers`](Self::pointers)
/// against the executing device before queuing the kernel.
pub trait KernelArgs: Clone + Send + 'static {
    fn pointers(&self) -> Vec<&DevicePtr> {
        Vec::new()
    }
}

impl KernelArgs for () {}

impl KernelArgs for DevicePtr {
    fn pointers(&self) -> Vec<&DevicePtr> {
        vec![self]
    }
}

/// Grid and block shape of a launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    pub grid: Grid,
    pub block: Block,
}

impl LaunchConfig {
    pub fn new(grid: Grid, block: Block) -> Self {
        Self { grid, block }
    }

    /// One block of one thread (`<<<1, 1>>>`)
    pub fn single() -> Self {
        Self::new(Grid::new(1u32), Block::new(1u32))
    }
}

/// Queue `kernel` on `stream` and return without waiting for it.
///
/// Geometry and pointer arguments are validated up front, so an invalid
/// launch fails here rather than at synchronize. On the stream worker, every
/// logical thread of the grid runs in turn with its built-in variables
/// installed.
pub fn launch_kernel<A, K>(stream: &Stream, kernel: Arc<K>, config: LaunchConfig, args: A) -> Result<()>
where
    A: KernelArgs,
    K: KernelFunction<A> + ?Sized + 'static,
{
    let device = Arc::clone(stream.device());
    config.grid.validate()?;
    config.block.validate_against(device.properties().max_threads_per_block)?;
    for ptr in args.pointers() {
        device.check_access(ptr)?;
    }

    let label = kernel.name().to_string();
    log::trace!(
        "Launching '{}' on device {} stream {} grid {:?} block {:?}",
        label,
        device.id(),
        stream.index(),
        config.grid.dim,
        config.block.dim
    );

    let device_id = device.id();
    stream.enqueue(&label, move || {
        let grid_dim = config.grid.dim;
        let block_dim = config.block.dim;
        for bz in 0..grid_dim.z {
            for by in 0..grid_dim.y {
                for bx in 0..grid_dim.x {
                    for tz in 0..block_dim.z {
                        for ty in 0..block_dim.y {
                            for tx in 0..block_dim.x {
                                let ctx = ThreadContext {
                                    thread_idx: Dim3::new(tx, ty, tz),
                                    block_idx: Dim3::new(bx, by, bz),
                                    block_dim,
                                    grid_dim,
                                };
                                let builtins = KernelContext {
                                    thread_idx: ctx.thread_idx,
                                    block_idx: ctx.block_idx,
                                    block_dim,
                                    grid_dim,
                                    device_id,
                                };
                                with_kernel_context(builtins, || {
                                    kernel.execute(args.clone(), ctx)
                                });
                            }
                        }
                    }
                }
            }
        }
    })?;
    device.record_launch();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopologyConfig;
    use crate::memory::{read_words, LinearAllocGuard, LinearAllocs};
    use crate::runtime::{block, thread, Platform};
    use crate::ConformanceError;

    struct FillIndexKernel;

    impl KernelFunction<DevicePtr> for FillIndexKernel {
        fn execute(&self, out: DevicePtr, ctx: ThreadContext) {
            let idx = ctx.global_thread_id();
            if idx < out.len_words() {
                out.store(idx, idx as i32);
            }
        }

        fn name(&self) -> &str {
            "fill_index"
        }
    }

    struct NoopKernel;

    impl KernelFunction<()> for NoopKernel {
        fn execute(&self, _args: (), _ctx: ThreadContext) {}
    }

    struct BuiltinsKernel;

    impl KernelFunction<DevicePtr> for BuiltinsKernel {
        fn execute(&self, out: DevicePtr, ctx: ThreadContext) {
            let tid = block::index().x * block::dim().x + thread::index().x;
            assert_eq!(tid as usize, ctx.global_thread_id());
            out.store(tid as usize, 1);
        }
    }

    #[test]
    fn test_launch_covers_grid() {
        let platform = Platform::new(&TopologyConfig::default()).unwrap();
        let device = platform.device(0).unwrap();
        let stream = platform.default_stream(0).unwrap();
        let buf = LinearAllocGuard::new(LinearAllocs::DeviceMalloc, &device, 4 * 32).unwrap();

        let config = LaunchConfig::new(Grid::new(4u32), Block::new(8u32));
        launch_kernel(stream, Arc::new(FillIndexKernel), config, buf.ptr()).unwrap();
        stream.synchronize().unwrap();

        let words = read_words(&buf.ptr(), 32).unwrap();
        assert_eq!(words, (0..32).collect::<Vec<i32>>());
        assert_eq!(device.launch_count(), 1);
    }

    #[test]
    fn test_builtins_match_thread_context() {
        let platform = Platform::new(&TopologyConfig::default()).unwrap();
        let device = platform.device(0).unwrap();
        let stream = platform.default_stream(0).unwrap();
        let buf = LinearAllocGuard::new(LinearAllocs::DeviceMalloc, &device, 4 * 6).unwrap();

        let config = LaunchConfig::new(Grid::new(3u32), Block::new(2u32));
        launch_kernel(stream, Arc::new(BuiltinsKernel), config, buf.ptr()).unwrap();
        stream.synchronize().unwrap();
        assert_eq!(read_words(&buf.ptr(), 6).unwrap(), vec![1; 6]);
    }

    #[test]
    fn test_invalid_geometry_rejected_before_queueing() {
        let platform = Platform::new(&TopologyConfig::default()).unwrap();
        let device = platform.device(0).unwrap();
        let stream = platform.default_stream(0).unwrap();

        let too_big = LaunchConfig::new(Grid::new(1u32), Block::new(2048u32));
        let err = launch_kernel(stream, Arc::new(NoopKernel), too_big, ()).unwrap_err();
        assert!(matches!(err, ConformanceError::Launch(_)));

        let empty = LaunchConfig::new(Grid::new(0u32), Block::new(1u32));
        assert!(launch_kernel(stream, Arc::new(NoopKernel), empty, ()).is_err());
        assert_eq!(device.launch_count(), 0);
        assert_eq!(stream.total_ops(), 0);
    }

    #[test]
    fn test_peer_memory_requires_access() {
        let platform =
            Platform::new(&TopologyConfig::with_devices(2).without_peer_access()).unwrap();
        let dev0 = platform.device(0).unwrap();
        let buf = LinearAllocGuard::new(LinearAllocs::DeviceMalloc, &dev0, 8).unwrap();

        let err = launch_kernel(
            platform.default_stream(1).unwrap(),
            Arc::new(FillIndexKernel),
            LaunchConfig::single(),
            buf.ptr(),
        )
        .unwrap_err();
        assert!(matches!(err, ConformanceError::PeerAccess { from: 1, to: 0 }));
    }

    #[test]
    fn test_released_pointer_rejected() {
        let platform = Platform::new(&TopologyConfig::default()).unwrap();
        let dev0 = platform.device(0).unwrap();
        let buf = LinearAllocGuard::new(LinearAllocs::DeviceMalloc, &dev0, 8).unwrap();
        let ptr = buf.ptr();
        drop(buf);

        let err = launch_kernel(
            platform.default_stream(0).unwrap(),
            Arc::new(FillIndexKernel),
            LaunchConfig::single(),
            ptr,
        )
        .unwrap_err();
        assert!(matches!(err, ConformanceError::Memory(_)));
    }

    #[test]
    fn test_launch_config_builders() {
        let config = LaunchConfig::new(Grid::new((4u32, 4u32)), Block::new((16u32, 16u32)));
        assert_eq!(config.grid.dim.y, 4);
        assert_eq!(config.block.dim.x, 16);
        assert_eq!(LaunchConfig::single().block.num_threads(), 1);
    }
}
