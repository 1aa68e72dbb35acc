//! Gas benchmark harness for the permission manager contract.
//!
//! The harness itself is small: the [`report`] module awaits pending
//! transactions, prints what they cost, and appends the numbers to a CSV
//! report file. The interesting scenarios live in the integration tests,
//! which run the permission manager fixture on a local sandbox and push every
//! state-changing call through the reporter.

pub mod logging;
pub mod report;

pub use report::{log, ReportError};
