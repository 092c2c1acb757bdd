//! # cf-core
//!
//! Shared building blocks for the crossfeed market-data engine: canonical
//! event types, exact-decimal prices, nanosecond timestamps, layered
//! configuration, and logging setup.

pub mod config;
pub mod logging;
pub mod types;
