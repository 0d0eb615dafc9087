//! Hardware module detector common library
//!
//! Shared constants and configuration loading for the detector workspace.
//!
//! # Module Structure
//!
//! - [`config`] - Generic TOML loading, log level and shared service fields
//! - [`detector`] - Detector constants and the `DetectorConfig` document
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! Add to your `Cargo.toml` with alias for shorter imports:
//! ```toml
//! [dependencies]
//! hwmod = { package = "hwmod_common", path = "../hwmod_common" }
//! ```
//!
//! Then import:
//! ```rust
//! use hwmod_common::detector::consts::MODULE_BIT_COUNT;
//! use hwmod_common::config::{ConfigLoader, SharedConfig};
//! ```

pub mod config;
pub mod detector;
pub mod prelude;
