//! Integration tests for stepexec
//!
//! These tests run real processes through the public API and the `stepexec`
//! binary: timeouts, process-group cleanup, large outputs, and user switching.

pub mod cli;
pub mod execute;
pub mod identity;
