//! ifstat command-line front end.
//!
//! Exposed as a library so the integration tests can drive the same code
//! paths as the `ifstat` binary.

pub mod cli;
pub mod error;
pub mod logging;
pub mod metrics_server;
pub mod output;
pub mod watch;
