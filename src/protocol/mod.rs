//! Producer/consumer fence protocol
//!
//! - [`kernels`]: the producer and consumer halves
//! - [`oracle`]: the verdict on one observation
//! - [`driver`]: runs the protocol in each scenario
//! - [`outcome`]: how a case ended

pub mod driver;
pub mod kernels;
pub mod oracle;
pub mod outcome;

pub use driver::{FenceProtocolDriver, Scenario};
pub use kernels::{ReadArgs, ReadKernel, WriteArgs, WriteKernel};
pub use oracle::{check, Observation, Verdict};
pub use outcome::{CaseFailure, CaseOutcome};
