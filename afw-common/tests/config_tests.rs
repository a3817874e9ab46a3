//! Configuration loading and root folder resolution
//!
//! Uses serial_test: tests that touch AFW_ROOT_FOLDER run one at a time.

use afw_common::config::{AppConfig, ROOT_FOLDER_ENV};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};

#[test]
fn test_missing_config_file_uses_defaults() {
    let config = AppConfig::load(Some(Path::new("/nonexistent/afw/config.toml"))).unwrap();
    assert_eq!(config, AppConfig::default());
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
bind_addr = "0.0.0.0"
port = 6001
root_folder = "/srv/afw"

[cache]
ttl_secs = 5

[rate_limit]
requests_per_minute = 0
"#
    )
    .unwrap();

    let config = AppConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.bind_addr, "0.0.0.0");
    assert_eq!(config.port, 6001);
    assert_eq!(config.cache.ttl_secs, 5);
    assert_eq!(config.cache.capacity, 1024);
    assert_eq!(config.rate_limit.requests_per_minute, 0);
}

#[test]
fn test_malformed_config_file_is_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "port = [").unwrap();
    assert!(AppConfig::load(Some(file.path())).is_err());
}

#[test]
#[serial]
fn test_cli_argument_has_highest_priority() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/afw-from-env");
    let config = AppConfig {
        root_folder: Some(PathBuf::from("/tmp/afw-from-toml")),
        ..AppConfig::default()
    };

    let resolved = config.resolve_root_folder(Some(Path::new("/tmp/afw-from-cli")));
    assert_eq!(resolved, PathBuf::from("/tmp/afw-from-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_env_var_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/afw-from-env");
    let config = AppConfig {
        root_folder: Some(PathBuf::from("/tmp/afw-from-toml")),
        ..AppConfig::default()
    };

    assert_eq!(config.resolve_root_folder(None), PathBuf::from("/tmp/afw-from-env"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_toml_beats_default() {
    env::remove_var(ROOT_FOLDER_ENV);
    let config = AppConfig {
        root_folder: Some(PathBuf::from("/tmp/afw-from-toml")),
        ..AppConfig::default()
    };

    assert_eq!(config.resolve_root_folder(None), PathBuf::from("/tmp/afw-from-toml"));
}

#[test]
#[serial]
fn test_default_root_folder_is_non_empty() {
    env::remove_var(ROOT_FOLDER_ENV);
    let resolved = AppConfig::default().resolve_root_folder(None);
    assert!(!resolved.as_os_str().is_empty());
}
