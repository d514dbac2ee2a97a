//! # fairway-bridge: launch monitor to simulator relay
//!
//! Service that accepts a launch monitor connection, forwards every
//! shot to a golf simulator and records it in a CSV shot log.
//!
//! - **config**: TOML configuration with defaults for every field.
//! - **service**: resource setup and the serve loop.

pub mod config;
pub mod service;
