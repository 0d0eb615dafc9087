//! # Hardware Module Detector
//!
//! Exposes a 32-bit hardware capability register as a queryable bitmask.
//! Each bit announces whether one hardware module is fitted to the board.
//!
//! The register is read once, at attach time. The snapshot is then served two
//! ways:
//!
//! - in-process, through [`module_present`] and [`module_mask`], which are
//!   lock-free and callable from any thread;
//! - to external observers, as read-only attributes published under a
//!   namespace node (`module_bits` plus `module_0` .. `module_31`).
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────┐    ┌───────────────┐    ┌────────────────────┐
//! │ RegisterMapper├───►│ ModuleBits    ├───►│ Attribute registry │
//! │ (mmap, 4 B)   │    │ (snapshot)    │    │ 1 + 32 attributes  │
//! └───────────────┘    └───────┬───────┘    └─────────┬──────────┘
//!                              │                      │
//!                              ▼                      ▼
//!                     ┌─────────────────┐    ┌────────────────────┐
//!                     │ module_present  │    │ AttributeTree      │
//!                     │ module_mask     │    │ (memory / dir)     │
//!                     └─────────────────┘    └────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hwmod_detector::{attach_with_config, detach, module_mask, module_present};
//! use hwmod::prelude::*;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DetectorConfig::load(Path::new("/etc/hwmod/detector.toml"))?;
//! attach_with_config(&config)?;
//!
//! if module_present(3) {
//!     println!("module 3 fitted, mask {:#010x}", module_mask());
//! }
//!
//! detach();
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Attach returns `Result<(), DetectorError>`; by the time an error is seen
//! every partially created resource has been released. Queries never fail:
//! an absent module, an out-of-range bit and a detached detector all read as
//! `false` / `0`.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod attributes;
pub mod bitmask;
pub mod detector;
pub mod error;
pub mod register;

pub use attributes::{
    Attribute, AttributeSet, AttributeSetBuilder, AttributeTree, DirTree, MemoryTree, NodeId,
    publish, unpublish,
};
pub use bitmask::{ModuleBits, module_mask, module_present};
pub use detector::{
    Detector, LifecycleState, attach, attach_with_config, detach, state, with_detector,
};
pub use error::{DetectorError, DetectorResult, TreeError};
pub use register::{MmapRegisterMapper, RegisterMapper, RegisterWindow};

/// Initialize tracing from `RUST_LOG`
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_line_number(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
