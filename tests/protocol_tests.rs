//! End-to-end tests of the fence protocol and the harness

#[cfg(test)]
mod protocol_tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use threadfence_conformance::protocol::kernels::{WriteArgs, K_SET_VAL1, K_SET_VAL2};
    use threadfence_conformance::protocol::{CaseFailure, CaseOutcome, FenceProtocolDriver, Scenario};
    use threadfence_conformance::runtime::{KernelFunction, ThreadContext};
    use threadfence_conformance::{
        threadfence_system, ConformanceConfig, ConformanceError, Harness, Observation, Platform,
        TopologyConfig,
    };

    fn driver_for(topology: TopologyConfig, iterations: u32) -> FenceProtocolDriver {
        let platform = Arc::new(Platform::new(&topology).unwrap());
        FenceProtocolDriver::new(
            platform,
            ConformanceConfig::new(iterations).with_topology(topology),
        )
    }

    /// Writes slot 2 only, so the consumer always sees the stale slot 1.
    struct TornProducer;

    impl KernelFunction<WriteArgs> for TornProducer {
        fn execute(&self, args: WriteArgs, _ctx: ThreadContext) {
            args.slots.store(1, K_SET_VAL2);
        }

        fn name(&self) -> &str {
            "torn_producer"
        }
    }

    /// Writes both slots in order until launch `tear_from`, then only slot 2.
    struct TearsFromLaunch {
        launches: AtomicU32,
        tear_from: u32,
    }

    impl KernelFunction<WriteArgs> for TearsFromLaunch {
        fn execute(&self, args: WriteArgs, _ctx: ThreadContext) {
            let launch = self.launches.fetch_add(1, Ordering::SeqCst);
            if launch < self.tear_from {
                args.slots.store(0, K_SET_VAL1);
                threadfence_system();
            }
            args.slots.store(1, K_SET_VAL2);
        }
    }

    struct PanickingProducer;

    impl KernelFunction<WriteArgs> for PanickingProducer {
        fn execute(&self, _args: WriteArgs, _ctx: ThreadContext) {
            panic!("illegal address");
        }

        fn name(&self) -> &str {
            "panicking_producer"
        }
    }

    #[test]
    fn test_peer_scenario_holds_across_many_iterations() {
        let driver = driver_for(TopologyConfig::with_devices(2), 500);
        let outcome = driver.run(Scenario::PeerDevice);
        assert!(
            matches!(outcome, CaseOutcome::Passed { iterations: 500 }),
            "{:?}",
            outcome
        );
        let platform = driver.platform();
        assert_eq!(platform.device(0).unwrap().launch_count(), 500);
        assert_eq!(platform.device(1).unwrap().launch_count(), 500);
    }

    #[test]
    fn test_host_scenario_holds_across_many_iterations() {
        let driver = driver_for(TopologyConfig::with_devices(1), 500);
        let outcome = driver.run(Scenario::Host);
        assert!(matches!(outcome, CaseOutcome::Passed { iterations: 500 }), "{:?}", outcome);
    }

    #[test]
    fn test_same_device_scenario_holds() {
        let driver = driver_for(TopologyConfig::with_devices(1), 200);
        let outcome = driver.run(Scenario::SameDevice);
        assert!(outcome.is_passed(), "{:?}", outcome);
    }

    #[test]
    fn test_single_device_skips_without_touching_devices() {
        let driver = driver_for(TopologyConfig::with_devices(1), 10);
        match driver.run(Scenario::PeerDevice) {
            CaseOutcome::Skipped { reason } => {
                assert_eq!(reason, "At least 2 devices are required")
            }
            other => panic!("expected skip, got {:?}", other),
        }

        let platform = driver.platform();
        let device = platform.device(0).unwrap();
        assert_eq!(device.launch_count(), 0);
        assert_eq!(device.memory_budget().total_allocations(), 0);
        assert_eq!(platform.host_budget().total_allocations(), 0);
    }

    #[test]
    fn test_no_devices_skips_every_scenario() {
        let driver = driver_for(TopologyConfig::with_devices(0), 10);
        for scenario in Scenario::ALL {
            assert!(driver.run(scenario).is_skipped(), "{}", scenario);
        }
    }

    #[test]
    fn test_missing_peer_access_is_a_failure_not_a_skip() {
        let driver = driver_for(TopologyConfig::with_devices(2).without_peer_access(), 10);
        let outcome = driver.run(Scenario::PeerDevice);
        assert!(
            matches!(outcome, CaseOutcome::Failed(CaseFailure::Requirement(_))),
            "{:?}",
            outcome
        );
        assert_eq!(driver.platform().device(0).unwrap().launch_count(), 0);
    }

    #[test]
    fn test_torn_producer_stops_at_first_violation() {
        let driver = driver_for(TopologyConfig::with_devices(2), 1000)
            .with_producer(Arc::new(TornProducer));

        let failed_at = match driver.run(Scenario::PeerDevice) {
            CaseOutcome::Failed(CaseFailure::Assertion {
                iteration,
                observation,
            }) => {
                assert_eq!(observation, Observation::new(0, K_SET_VAL2));
                iteration
            }
            other => panic!("expected assertion failure, got {:?}", other),
        };

        // No launch happens after the failing iteration.
        let platform = driver.platform();
        let launches = u64::from(failed_at) + 1;
        assert_eq!(platform.device(0).unwrap().launch_count(), launches);
        assert_eq!(platform.device(1).unwrap().launch_count(), launches);
    }

    #[test]
    fn test_correct_iterations_before_a_tear_pass() {
        let producer = Arc::new(TearsFromLaunch {
            launches: AtomicU32::new(0),
            tear_from: 3,
        });
        let driver = driver_for(TopologyConfig::with_devices(1), 1000).with_producer(producer);

        let failed_at = match driver.run(Scenario::Host) {
            CaseOutcome::Failed(CaseFailure::Assertion { iteration, .. }) => iteration,
            other => panic!("expected assertion failure, got {:?}", other),
        };
        assert!(failed_at >= 3, "failed at {}", failed_at);
        assert_eq!(
            driver.platform().device(0).unwrap().launch_count(),
            u64::from(failed_at) + 1
        );
    }

    #[test]
    fn test_kernel_fault_is_fatal() {
        let driver = driver_for(TopologyConfig::with_devices(2), 10)
            .with_producer(Arc::new(PanickingProducer));

        match driver.run(Scenario::PeerDevice) {
            CaseOutcome::Failed(CaseFailure::Fatal(ConformanceError::Runtime(message))) => {
                assert!(message.contains("panicking_producer"), "{}", message);
                assert!(message.contains("illegal address"), "{}", message);
            }
            other => panic!("expected fatal runtime error, got {:?}", other),
        }
        assert_eq!(driver.platform().device(0).unwrap().launch_count(), 1);
    }

    #[test]
    fn test_allocation_failure_is_fatal() {
        let topology = TopologyConfig::with_devices(2).with_device_memory(4);
        let driver = driver_for(topology, 10);

        let outcome = driver.run(Scenario::PeerDevice);
        assert!(
            matches!(
                outcome,
                CaseOutcome::Failed(CaseFailure::Fatal(ConformanceError::Memory(_)))
            ),
            "{:?}",
            outcome
        );
        assert_eq!(driver.platform().device(0).unwrap().launch_count(), 0);
    }

    #[test]
    fn test_memory_returned_after_failed_case() {
        let driver = driver_for(TopologyConfig::with_devices(2), 1000)
            .with_producer(Arc::new(TornProducer));
        assert!(driver.run(Scenario::PeerDevice).is_failed());
        assert!(driver.run(Scenario::SameDevice).is_failed());

        let platform = driver.platform();
        assert_eq!(platform.device(0).unwrap().memory_budget().used(), 0);
        assert_eq!(platform.host_budget().used(), 0);
    }

    #[test]
    fn test_harness_exit_codes() {
        let ok = Harness::new(ConformanceConfig::new(20)).unwrap();
        let summary = ok.run(None);
        assert_eq!(summary.passed(), 3);
        assert_eq!(summary.exit_code(), 0);

        let config = ConformanceConfig::new(5)
            .with_topology(TopologyConfig::with_devices(2).without_peer_access());
        let failing = Harness::new(config).unwrap();
        let summary = failing.run(Some("basic_peer"));
        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn test_harness_config_from_json() {
        let config = ConformanceConfig::from_json_str(
            r#"{ "iterations": 3, "topology": { "device_count": 1 } }"#,
        )
        .unwrap();
        let summary = Harness::new(config).unwrap().run(None);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.passed(), 2);
    }
}
