//! Logging utilities.
//!
//! The crate logs through the `log` facade only. Binaries and tests that want
//! output call [`init_logging`] once, early.

mod init;

pub use init::{init_logging, LoggingConfig};
