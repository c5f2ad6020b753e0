//! Episode identifier library root.
//!
//! Identifies which television episode a video file corresponds to by
//! extracting its subtitle track, normalizing it, fingerprinting it, and
//! matching it against a labelled catalogue.

/// Crate version, as declared in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod error;

pub type Result<T> = error::EpidResult<T>;
