//! Detector constants.
//!
//! Register geometry, driver identity and the fixed names of the published
//! attribute surface.

use static_assertions::const_assert_eq;

/// Driver name used for logging and as the default service name.
pub const DRIVER_NAME: &str = "hw_module_detector";

/// Device-tree compatible string the bus binding matches against.
pub const COMPATIBLE: &str = "vendor,hw-module-detector";

/// Width of the capability register in bytes.
pub const MODULE_REG_SIZE: usize = 4;

/// Number of module bits carried by the register.
pub const MODULE_BIT_COUNT: usize = 32;

const_assert_eq!(MODULE_REG_SIZE * 8, MODULE_BIT_COUNT);

/// Class directory of the namespace node.
pub const DEFAULT_CLASS_NAME: &str = "hw_module";

/// Device directory of the namespace node (under the class).
pub const DEFAULT_DEVICE_NAME: &str = "hw_module";

/// Name of the aggregate attribute holding the whole mask.
pub const MASK_ATTR_NAME: &str = "module_bits";

/// Prefix of the per-bit attributes (`module_0` .. `module_31`).
pub const BIT_ATTR_PREFIX: &str = "module_";

/// Permission bits of every published attribute (read-only).
pub const ATTR_MODE: u32 = 0o444;

/// Default root of the directory-backed attribute tree.
pub const DEFAULT_TREE_ROOT: &str = "/run/hwmod";

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/hwmod/detector.toml";

/// Build the attribute name for module bit `bit`.
pub fn bit_attr_name(bit: usize) -> String {
    format!("{BIT_ATTR_PREFIX}{bit}")
}
