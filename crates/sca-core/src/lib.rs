//! Core domain + application logic for the Slack channel archiver.
//!
//! This crate is intentionally platform-agnostic. The Slack Web API lives
//! behind the `ChatApi` port, implemented in the `sca-slack` adapter crate.

pub mod archiver;
pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod ports;
pub mod retry;
pub mod writer;

pub use errors::{Error, Result};
