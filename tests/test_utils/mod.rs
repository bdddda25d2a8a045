//! Test Utilities and Mocks
//!
//! Shared by the integration and contract tests, which pull this module in
//! with `#[path]`.

#![allow(dead_code, unused_imports)]

pub mod fixtures;
pub mod mock_console;

pub use fixtures::{start_driver, start_serializer, test_config};
pub use mock_console::{emit, reply, MockLauncher, Step, PROMPT};
