//! Clonewatch server library.
//!
//! HTTP routes, command-line configuration and shutdown handling for the
//! `clonewatch-server` binary. The router is exposed so that it can be driven
//! in-process by tests.

#![deny(unsafe_code)]

pub mod config;
pub mod http;
pub mod shutdown;

pub use config::{Cli, LogFormat};
pub use http::{SharedService, router, status_for};
