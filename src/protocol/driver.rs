//! Fence protocol driver
//!
//! Runs the producer/consumer protocol for a configured number of iterations
//! in one of three placements and applies the oracle after every iteration.
//! The first violation or runtime error ends the case.

use super::kernels::{
    read, ReadArgs, ReadKernel, WriteArgs, WriteKernel, K_INIT_VAL1, K_INIT_VAL2, SLOT_WORDS,
};
use super::oracle::{check, Observation, Verdict};
use super::outcome::{CaseFailure, CaseOutcome};
use crate::config::ConformanceConfig;
use crate::fence::FenceScope;
use crate::memory::{memcpy, memset_d32, LinearAllocGuard, LinearAllocs, WORD_SIZE};
use crate::runtime::{launch_kernel, Device, KernelFunction, LaunchConfig, Platform};
use crate::Result;
use std::fmt;
use std::sync::Arc;

type CaseResult = std::result::Result<CaseOutcome, CaseFailure>;

const SLOT_BYTES: usize = SLOT_WORDS * WORD_SIZE;

/// Where the producer and consumer run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    /// Producer on device 0, consumer on device 1, system-scope fences
    PeerDevice,
    /// Producer on device 0 writing host-pinned memory, consumer on the host
    Host,
    /// Producer and consumer on two streams of device 0, device-scope fences
    SameDevice,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [Scenario::PeerDevice, Scenario::Host, Scenario::SameDevice];

    /// Name of the test case exercising this scenario
    pub fn case_name(self) -> &'static str {
        match self {
            Scenario::PeerDevice => "threadfence_system.positive.basic_peer",
            Scenario::Host => "threadfence_system.positive.basic_host",
            Scenario::SameDevice => "threadfence.positive.basic_device",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Scenario::PeerDevice => "System-wide fence on global memory read by a peer device",
            Scenario::Host => "System-wide fence on page-locked host memory read by the host",
            Scenario::SameDevice => "Device-wide fence between two streams of one device",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.case_name())
    }
}

/// Drives the fence protocol against a platform.
pub struct FenceProtocolDriver {
    platform: Arc<Platform>,
    config: ConformanceConfig,
    producer: Option<Arc<dyn KernelFunction<WriteArgs>>>,
}

impl FenceProtocolDriver {
    pub fn new(platform: Arc<Platform>, config: ConformanceConfig) -> Self {
        Self {
            platform,
            config,
            producer: None,
        }
    }

    /// Replace the producer kernel in every scenario
    pub fn with_producer(mut self, producer: Arc<dyn KernelFunction<WriteArgs>>) -> Self {
        self.producer = Some(producer);
        self
    }

    pub fn config(&self) -> &ConformanceConfig {
        &self.config
    }

    pub fn platform(&self) -> &Arc<Platform> {
        &self.platform
    }

    /// Run one scenario to completion
    pub fn run(&self, scenario: Scenario) -> CaseOutcome {
        log::info!(
            "Running {} ({} iterations)",
            scenario,
            self.config.iterations
        );
        let result = match scenario {
            Scenario::PeerDevice => self.run_peer(),
            Scenario::Host => self.run_host(),
            Scenario::SameDevice => self.run_same_device(),
        };
        match &result {
            Ok(CaseOutcome::Skipped { reason }) => log::warn!("{} skipped: {}", scenario, reason),
            Ok(_) => log::info!("{} passed", scenario),
            Err(failure) => log::error!("{} failed: {}", scenario, failure),
        }
        result.into()
    }

    fn producer_for(&self, scope: FenceScope) -> Arc<dyn KernelFunction<WriteArgs>> {
        match &self.producer {
            Some(producer) => Arc::clone(producer),
            None => Arc::new(WriteKernel::new(scope)),
        }
    }

    fn run_peer(&self) -> CaseResult {
        if self.platform.device_count() < 2 {
            return Ok(CaseOutcome::Skipped {
                reason: "At least 2 devices are required".to_string(),
            });
        }
        if !(self.platform.can_access_peer(0, 1)? && self.platform.can_access_peer(1, 0)?) {
            return Err(CaseFailure::Requirement(
                "devices 0 and 1 must be able to access each other's memory".to_string(),
            ));
        }

        let writer = self.platform.device(0)?;
        let reader = self.platform.device(1)?;
        let writer_stream = self.platform.default_stream(0)?;
        let reader_stream = self.platform.default_stream(1)?;

        let in_dev = LinearAllocGuard::new(LinearAllocs::DeviceMalloc, &writer, SLOT_BYTES)?;
        let out_dev = LinearAllocGuard::new(LinearAllocs::DeviceMalloc, &writer, SLOT_BYTES)?;
        let out_host = LinearAllocGuard::new(LinearAllocs::HostMalloc, &writer, SLOT_BYTES)?;

        let producer = self.producer_for(FenceScope::System);
        let consumer = Arc::new(ReadKernel::new(FenceScope::System));

        for iteration in 0..self.config.iterations {
            memset_d32(&in_dev.ptr(), K_INIT_VAL1, 1)?;
            memset_d32(&in_dev.ptr().offset(1)?, K_INIT_VAL2, 1)?;

            launch_kernel(
                writer_stream,
                Arc::clone(&producer),
                LaunchConfig::single(),
                WriteArgs { slots: in_dev.ptr() },
            )?;
            launch_kernel(
                reader_stream,
                Arc::clone(&consumer),
                LaunchConfig::single(),
                ReadArgs {
                    out: out_dev.ptr(),
                    slots: in_dev.ptr(),
                },
            )?;
            synchronize_both(&reader, &writer)?;

            memcpy(&out_host.host_ptr()?, &out_dev.ptr(), SLOT_BYTES)?;
            let observation = Observation::from_output(&out_host.host_ptr()?)?;
            assert_ordered(iteration, observation)?;
        }

        Ok(CaseOutcome::Passed {
            iterations: self.config.iterations,
        })
    }

    fn run_host(&self) -> CaseResult {
        if self.platform.device_count() < 1 {
            return Ok(CaseOutcome::Skipped {
                reason: "At least 1 device is required".to_string(),
            });
        }

        let device = self.platform.device(0)?;
        let stream = self.platform.default_stream(0)?;

        let in_host = LinearAllocGuard::new(LinearAllocs::HostMalloc, &device, SLOT_BYTES)?;
        let out_host = LinearAllocGuard::new(LinearAllocs::HostMalloc, &device, SLOT_BYTES)?;

        let producer = self.producer_for(FenceScope::System);

        for iteration in 0..self.config.iterations {
            let slots = in_host.host_ptr()?;
            slots.store(0, K_INIT_VAL1);
            slots.store(1, K_INIT_VAL2);

            launch_kernel(
                stream,
                Arc::clone(&producer),
                LaunchConfig::single(),
                WriteArgs { slots: in_host.ptr() },
            )?;
            // Runs on the host while the producer may still be in flight.
            read(&out_host.host_ptr()?, &slots, FenceScope::Device);
            device.synchronize()?;

            let observation = Observation::from_output(&out_host.host_ptr()?)?;
            assert_ordered(iteration, observation)?;
        }

        Ok(CaseOutcome::Passed {
            iterations: self.config.iterations,
        })
    }

    fn run_same_device(&self) -> CaseResult {
        if self.platform.device_count() < 1 {
            return Ok(CaseOutcome::Skipped {
                reason: "At least 1 device is required".to_string(),
            });
        }

        let device = self.platform.device(0)?;
        let writer_stream = self.platform.default_stream(0)?;
        let reader_stream = device.create_stream()?;

        let in_dev = LinearAllocGuard::new(LinearAllocs::DeviceMalloc, &device, SLOT_BYTES)?;
        let out_dev = LinearAllocGuard::new(LinearAllocs::DeviceMalloc, &device, SLOT_BYTES)?;
        let out_host = LinearAllocGuard::new(LinearAllocs::HostMalloc, &device, SLOT_BYTES)?;

        let producer = self.producer_for(FenceScope::Device);
        let consumer = Arc::new(ReadKernel::new(FenceScope::Device));

        for iteration in 0..self.config.iterations {
            memset_d32(&in_dev.ptr(), K_INIT_VAL1, 1)?;
            memset_d32(&in_dev.ptr().offset(1)?, K_INIT_VAL2, 1)?;

            launch_kernel(
                writer_stream,
                Arc::clone(&producer),
                LaunchConfig::single(),
                WriteArgs { slots: in_dev.ptr() },
            )?;
            launch_kernel(
                &reader_stream,
                Arc::clone(&consumer),
                LaunchConfig::single(),
                ReadArgs {
                    out: out_dev.ptr(),
                    slots: in_dev.ptr(),
                },
            )?;
            let reader_done = reader_stream.synchronize();
            let writer_done = writer_stream.synchronize();
            reader_done.and(writer_done)?;

            memcpy(&out_host.host_ptr()?, &out_dev.ptr(), SLOT_BYTES)?;
            let observation = Observation::from_output(&out_host.host_ptr()?)?;
            assert_ordered(iteration, observation)?;
        }

        Ok(CaseOutcome::Passed {
            iterations: self.config.iterations,
        })
    }
}

/// Drain `first` then `second`, reporting the first error only after both are idle.
fn synchronize_both(first: &Device, second: &Device) -> Result<()> {
    let first_done = first.synchronize();
    let second_done = second.synchronize();
    first_done.and(second_done)
}

fn assert_ordered(iteration: u32, observation: Observation) -> std::result::Result<(), CaseFailure> {
    log::trace!("iteration {}: observed {}", iteration, observation);
    match check(&observation) {
        Verdict::Pass => Ok(()),
        Verdict::Violation => Err(CaseFailure::Assertion {
            iteration,
            observation,
        }),
    }
}
