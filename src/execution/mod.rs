//! Command Execution
//!
//! The command/response driver, its adaptive timeout policy and the
//! statistics it keeps about the console.

pub mod driver;
pub mod stats;
pub mod timeout;

pub use driver::CommandDriver;
pub use stats::{ConsoleStatus, ExecutionStats};
pub use timeout::AdaptiveTimeoutPolicy;
