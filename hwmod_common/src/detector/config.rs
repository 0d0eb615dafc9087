//! Detector configuration types.
//!
//! - `RegisterResource` - Descriptor of the 4-byte capability register
//! - `NamespaceConfig` - Where the attribute surface is published
//! - `DetectorConfig` - Whole document loaded from `detector.toml`
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! service_name = "hwmod-board-a"
//!
//! [register]
//! path = "/dev/mem"
//! offset = 0x4000_1000
//!
//! [namespace]
//! root = "/run/hwmod"
//! ```

use crate::config::{ConfigError, SharedConfig};
use crate::detector::consts::{
    DEFAULT_CLASS_NAME, DEFAULT_DEVICE_NAME, DEFAULT_TREE_ROOT, MODULE_REG_SIZE,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_reg_size() -> usize {
    MODULE_REG_SIZE
}

fn default_tree_root() -> PathBuf {
    PathBuf::from(DEFAULT_TREE_ROOT)
}

fn default_class() -> String {
    DEFAULT_CLASS_NAME.to_string()
}

fn default_device() -> String {
    DEFAULT_DEVICE_NAME.to_string()
}

/// Memory-mapped register region handed over by the bus binding.
///
/// `path` is the file that backs physical memory (`/dev/mem`, a UIO node,
/// or a plain file in tests); `offset` is the register address within it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResource {
    /// Backing file of the register window.
    pub path: PathBuf,
    /// Byte offset of the register within `path`.
    #[serde(default)]
    pub offset: u64,
    /// Region length in bytes, must equal `MODULE_REG_SIZE`.
    #[serde(default = "default_reg_size")]
    pub size: usize,
}

impl RegisterResource {
    /// Descriptor for a 4-byte register at `offset` in `path`.
    pub fn new(path: impl Into<PathBuf>, offset: u64) -> Self {
        Self {
            path: path.into(),
            offset,
            size: MODULE_REG_SIZE,
        }
    }

    /// Byte offset one past the register, `None` if it overflows `u64`.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(MODULE_REG_SIZE as u64)
    }

    /// Check region geometry: exactly one register, naturally aligned,
    /// addressable without overflow.
    pub fn check_geometry(&self) -> Result<(), String> {
        if self.size != MODULE_REG_SIZE {
            return Err(format!(
                "region is {} bytes, expected {}",
                self.size, MODULE_REG_SIZE
            ));
        }
        if self.offset % MODULE_REG_SIZE as u64 != 0 {
            return Err(format!(
                "offset {:#x} is not {}-byte aligned",
                self.offset, MODULE_REG_SIZE
            ));
        }
        if self.end().is_none() {
            return Err(format!("register offset {:#x} overflows", self.offset));
        }
        Ok(())
    }
}

/// Placement of the published attribute surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Root directory of the directory-backed attribute tree.
    #[serde(default = "default_tree_root")]
    pub root: PathBuf,
    /// Class directory under `root`.
    #[serde(default = "default_class")]
    pub class: String,
    /// Device directory under the class; attributes live here.
    #[serde(default = "default_device")]
    pub device: String,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            root: default_tree_root(),
            class: default_class(),
            device: default_device(),
        }
    }
}

/// Configuration loaded from `detector.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Logging and instance naming.
    #[serde(default)]
    pub shared: SharedConfig,

    /// Register descriptor. Absent until the bus binding supplies one.
    #[serde(default)]
    pub register: Option<RegisterResource>,

    /// Attribute namespace placement.
    #[serde(default)]
    pub namespace: NamespaceConfig,
}

impl DetectorConfig {
    /// Validate the configuration.
    ///
    /// A missing register is not a validation error; it surfaces at attach
    /// time as an unavailable resource.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if let Some(register) = &self.register {
            register
                .check_geometry()
                .map_err(|reason| ConfigError::ValidationError(format!("register: {reason}")))?;
        }

        for (field, value) in [
            ("namespace.class", &self.namespace.class),
            ("namespace.device", &self.namespace.device),
        ] {
            if value.is_empty() || value.contains('/') || value == "." || value == ".." {
                return Err(ConfigError::ValidationError(format!(
                    "{field} must be a single non-empty path component, got {value:?}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_geometry() {
        assert!(RegisterResource::new("/dev/mem", 0x1000).check_geometry().is_ok());
        assert!(RegisterResource::new("/dev/mem", 0x1002).check_geometry().is_err());

        let mut wide = RegisterResource::new("/dev/mem", 0);
        wide.size = 8;
        assert!(wide.check_geometry().is_err());
    }

    #[test]
    fn test_register_end_overflow() {
        let last = RegisterResource::new("/dev/mem", u64::MAX - 7);
        assert_eq!(last.end(), Some(u64::MAX - 3));
        assert!(last.check_geometry().is_ok());

        let wrapped = RegisterResource::new("/dev/mem", u64::MAX - 3);
        assert_eq!(wrapped.end(), None);
        assert!(wrapped.check_geometry().is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = DetectorConfig::default();
        assert!(config.register.is_none());
        assert_eq!(config.namespace.class, "hw_module");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_namespace_component_validation() {
        let mut config = DetectorConfig::default();
        config.namespace.device = "a/b".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_namespace_rejects_dot_components() {
        for name in [".", ".."] {
            let mut config = DetectorConfig::default();
            config.namespace.class = name.to_string();
            assert!(config.validate().is_err(), "class {name:?} accepted");

            let mut config = DetectorConfig::default();
            config.namespace.device = name.to_string();
            assert!(config.validate().is_err(), "device {name:?} accepted");
        }

        let mut config = DetectorConfig::default();
        config.namespace.device = "..hw".to_string();
        assert!(config.validate().is_ok());
    }
}
