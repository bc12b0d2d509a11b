//! Conformance harness for scoped memory fences
//!
//! A producer writes two slots with a fence in between and a consumer in
//! another execution context reads them back in reverse order with its own
//! fence. If the consumer ever sees the second write without the first, the
//! fence failed to order them. The harness runs this protocol across a peer
//! device, the host, and two streams of one device, on an emulated runtime
//! whose devices are real host threads.
//!
//! ```no_run
//! use threadfence_conformance::{ConformanceConfig, Harness};
//!
//! let harness = Harness::new(ConformanceConfig::new(100))?;
//! let summary = harness.run(Some("threadfence_system"));
//! std::process::exit(summary.exit_code());
//! # Ok::<(), threadfence_conformance::ConformanceError>(())
//! ```

pub mod config;
pub mod error;
pub mod fence;
pub mod harness;
pub mod memory;
pub mod protocol;
pub mod runtime;

pub use config::{ConformanceConfig, TopologyConfig};
pub use error::{ConformanceError, Result};
pub use fence::{threadfence, threadfence_block, threadfence_system, FenceScope};
pub use harness::{CaseReport, Harness, RunSummary, TestCase};
pub use protocol::{CaseFailure, CaseOutcome, FenceProtocolDriver, Observation, Scenario};
pub use runtime::Platform;
