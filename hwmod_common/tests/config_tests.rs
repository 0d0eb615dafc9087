//! Detector configuration loading tests.

use hwmod_common::prelude::*;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_full_detector_config() {
    let file = write_config(
        r#"
[shared]
log_level = "debug"
service_name = "board-a"

[register]
path = "/dev/mem"
offset = 0x40001000

[namespace]
root = "/tmp/hwmod"
class = "hw_module"
device = "detector0"
"#,
    );

    let config = DetectorConfig::load(file.path()).unwrap();
    assert_eq!(config.shared.log_level, LogLevel::Debug);
    assert_eq!(config.shared.service_name, "board-a");

    let register = config.register.as_ref().unwrap();
    assert_eq!(register.path, PathBuf::from("/dev/mem"));
    assert_eq!(register.offset, 0x4000_1000);
    assert_eq!(register.size, MODULE_REG_SIZE);

    assert_eq!(config.namespace.root, PathBuf::from("/tmp/hwmod"));
    assert_eq!(config.namespace.device, "detector0");
    assert!(config.validate().is_ok());
}

#[test]
fn test_empty_document_uses_defaults() {
    let file = write_config("");
    let config = DetectorConfig::load(file.path()).unwrap();

    assert_eq!(config.shared.service_name, "hw_module_detector");
    assert!(config.register.is_none());
    assert_eq!(config.namespace, NamespaceConfig::default());
}

#[test]
fn test_misaligned_register_fails_validation() {
    let file = write_config(
        r#"
[register]
path = "/dev/mem"
offset = 6
"#,
    );

    let config = DetectorConfig::load(file.path()).unwrap();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));
    assert!(err.to_string().contains("aligned"));
}

#[test]
fn test_wrong_register_size_fails_validation() {
    let file = write_config(
        r#"
[register]
path = "/dev/mem"
size = 8
"#,
    );

    let config = DetectorConfig::load(file.path()).unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_unknown_log_level_is_parse_error() {
    let file = write_config(
        r#"
[shared]
log_level = "chatty"
"#,
    );

    assert!(matches!(
        DetectorConfig::load(file.path()),
        Err(ConfigError::ParseError(_))
    ));
}
