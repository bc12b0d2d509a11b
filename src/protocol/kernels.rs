//! Producer and consumer halves of the fence protocol
//!
//! The producer writes slot 1 then slot 2 with a fence in between. The
//! consumer reads them back in the opposite order, again with a fence in
//! between, and stores `out[0] = slot 1`, `out[1] = slot 2`.

use crate::fence::{threadfence_scoped, FenceScope};
use crate::memory::DevicePtr;
use crate::runtime::{block, thread, KernelArgs, KernelFunction, ThreadContext};

/// Sentinel held by slot 1 before the producer runs
pub const K_INIT_VAL1: i32 = 0;
/// Sentinel held by slot 2 before the producer runs
pub const K_INIT_VAL2: i32 = 0;
/// Value the producer writes to slot 1
pub const K_SET_VAL1: i32 = 1;
/// Value the producer writes to slot 2
pub const K_SET_VAL2: i32 = 2;

/// Number of 32-bit words in a slot pair or an observation
pub const SLOT_WORDS: usize = 2;

/// Write `K_SET_VAL1`, fence, write `K_SET_VAL2`.
pub fn write(slots: &DevicePtr, scope: FenceScope) {
    slots.store(0, K_SET_VAL1);
    threadfence_scoped(scope);
    slots.store(1, K_SET_VAL2);
}

/// Read slot 2, fence, read slot 1; store them as `out[0] = slot1, out[1] = slot2`.
pub fn read(out: &DevicePtr, slots: &DevicePtr, scope: FenceScope) {
    let slot2 = slots.load(1);
    threadfence_scoped(scope);
    let slot1 = slots.load(0);
    out.store(0, slot1);
    out.store(1, slot2);
}

/// Only global thread 0 of a launch touches memory.
pub(crate) fn is_first_thread() -> bool {
    let (block_idx, thread_idx) = (block::index(), thread::index());
    let tid = block_idx.x as usize * block::dim().x as usize + thread_idx.x as usize;
    tid == 0 && block_idx.y == 0 && block_idx.z == 0 && thread_idx.y == 0 && thread_idx.z == 0
}

/// Arguments of the producer kernel
#[derive(Debug, Clone)]
pub struct WriteArgs {
    pub slots: DevicePtr,
}

impl KernelArgs for WriteArgs {
    fn pointers(&self) -> Vec<&DevicePtr> {
        vec![&self.slots]
    }
}

/// Arguments of the consumer kernel
#[derive(Debug, Clone)]
pub struct ReadArgs {
    pub out: DevicePtr,
    pub slots: DevicePtr,
}

impl KernelArgs for ReadArgs {
    fn pointers(&self) -> Vec<&DevicePtr> {
        vec![&self.out, &self.slots]
    }
}

/// Producer kernel
#[derive(Debug, Clone, Copy)]
pub struct WriteKernel {
    pub scope: FenceScope,
}

impl WriteKernel {
    pub fn new(scope: FenceScope) -> Self {
        Self { scope }
    }
}

impl KernelFunction<WriteArgs> for WriteKernel {
    fn execute(&self, args: WriteArgs, _ctx: ThreadContext) {
        if is_first_thread() {
            write(&args.slots, self.scope);
        }
    }

    fn name(&self) -> &str {
        match self.scope {
            FenceScope::Block => "write_kernel<block>",
            FenceScope::Device => "write_kernel<device>",
            FenceScope::System => "write_kernel<system>",
        }
    }
}

/// Consumer kernel
#[derive(Debug, Clone, Copy)]
pub struct ReadKernel {
    pub scope: FenceScope,
}

impl ReadKernel {
    pub fn new(scope: FenceScope) -> Self {
        Self { scope }
    }
}

impl KernelFunction<ReadArgs> for ReadKernel {
    fn execute(&self, args: ReadArgs, _ctx: ThreadContext) {
        if is_first_thread() {
            read(&args.out, &args.slots, self.scope);
        }
    }

    fn name(&self) -> &str {
        match self.scope {
            FenceScope::Block => "read_kernel<block>",
            FenceScope::Device => "read_kernel<device>",
            FenceScope::System => "read_kernel<system>",
        }
    }
}
