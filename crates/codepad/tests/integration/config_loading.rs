use std::path::PathBuf;

use codepad::config::{Config, EXAMPLE_CONFIG};
use codepad::registry::ToolchainRegistry;

use super::FIXTURES_PATH;

#[test]
fn test_load_valid_config() {
    let path = format!("{FIXTURES_PATH}/configs/valid_full.toml");
    let config = Config::from_file(&path).expect("Failed to load config");

    assert!(config.toolchains.contains_key("python"));
    assert!(config.toolchains.contains_key("java"));
    assert_eq!(config.timeout, 2.0);
    assert_eq!(config.max_output, 65536);
    assert_eq!(config.workspace_root, PathBuf::from("/tmp/codepad-fixture"));
}

#[test]
fn test_load_minimal_config() {
    let path = format!("{FIXTURES_PATH}/configs/valid_minimal.toml");
    let config = Config::from_file(&path).expect("Failed to load config");

    assert!(config.toolchains.contains_key("test"));
    assert_eq!(config.timeout, 5.0);
}

#[test]
fn test_load_invalid_empty_name() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_empty_name.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_invalid_empty_extension() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_empty_extension.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_invalid_empty_run_command() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_empty_run_command.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_invalid_empty_build_command() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_empty_build_command.toml");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_load_missing_file() {
    assert!(Config::from_file("/nonexistent/codepad.toml").is_err());
}

#[test]
fn test_example_config_round_trips_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("codepad.toml");
    std::fs::write(&path, EXAMPLE_CONFIG).unwrap();

    let config = Config::from_file(&path).expect("example config should load");
    let registry = ToolchainRegistry::from_config(&config).unwrap();
    assert_eq!(registry.len(), 4);
}
