//! Prelude module for common re-exports.
//!
//! ```rust
//! use hwmod_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig};
pub use crate::detector::config::{DetectorConfig, NamespaceConfig, RegisterResource};

// ─── Detector Constants ─────────────────────────────────────────────
pub use crate::detector::consts::{
    ATTR_MODE, MASK_ATTR_NAME, MODULE_BIT_COUNT, MODULE_REG_SIZE, bit_attr_name,
};
