//! Core domain + application logic for the GitHub activity relay.
//!
//! This crate is intentionally transport-agnostic. The GitHub feed and the Slack
//! workspace live behind ports (traits) implemented in adapter crates.

pub mod checkpoint;
pub mod classify;
pub mod config;
pub mod delivery;
pub mod domain;
pub mod errors;
pub mod feed;
pub mod formatting;
pub mod logging;
pub mod relay;
pub mod render;

pub use errors::{Error, Result};
