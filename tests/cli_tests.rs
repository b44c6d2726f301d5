//! Integration tests for the ocbridge command line
//!
//! Runs the built binary against a temporary config directory.

use ocbridge_core::config::toml_config::{profile_path_in, save_profile_to_path, ProfileFile};
use ocbridge_core::config::DriverConfig;
use ocbridge_core::types::SessionProfile;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

const OCBRIDGE_BINARY: &str = env!("CARGO_BIN_EXE_ocbridge");

fn ocbridge(config_dir: &Path, args: &[&str]) -> Output {
    Command::new(OCBRIDGE_BINARY)
        .args(args)
        .env("OCBRIDGE_CONFIG_DIR", config_dir)
        .env_remove("JOURNAL_STREAM")
        .output()
        .expect("Failed to run ocbridge")
}

fn write_profile(config_dir: &Path) -> ProfileFile {
    let file = ProfileFile::new(
        SessionProfile::new(
            "office".to_string(),
            "vpn.example.com".to_string(),
            "alice".to_string(),
        ),
        DriverConfig::default(),
    );
    save_profile_to_path(&file, profile_path_in(config_dir, &file.profile.uuid)).unwrap();
    file
}

#[test]
fn test_help_lists_commands() {
    let dir = tempdir().unwrap();
    let output = ocbridge(dir.path(), &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["setup", "show", "connect"] {
        assert!(stdout.contains(command), "help should mention {}", command);
    }
}

#[test]
fn test_connect_requires_tun_fd() {
    let dir = tempdir().unwrap();
    let output = ocbridge(
        dir.path(),
        &["connect", "6f1c9a52-3a57-4a0e-9d7c-1b8f9a0b2c3d"],
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--tun-fd"));
}

#[test]
fn test_invalid_uuid_rejected() {
    let dir = tempdir().unwrap();
    let output = ocbridge(dir.path(), &["show", "not-a-uuid"]);
    assert!(!output.status.success());
}

#[test]
fn test_show_missing_profile_is_config_error() {
    let dir = tempdir().unwrap();
    let output = ocbridge(dir.path(), &["show", "6f1c9a52-3a57-4a0e-9d7c-1b8f9a0b2c3d"]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to load profile file"));
}

#[test]
fn test_connect_rejects_closed_tun_fd() {
    let dir = tempdir().unwrap();
    let file = write_profile(dir.path());
    let uuid = file.profile.uuid.to_string();

    let output = ocbridge(dir.path(), &["connect", &uuid, "--tun-fd", "987"]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not an open descriptor"));
}

#[test]
#[ignore] // Reads the system keyring, which may prompt for unlock
fn test_show_json() {
    let dir = tempdir().unwrap();
    let file = write_profile(dir.path());
    let uuid = file.profile.uuid.to_string();

    let output = ocbridge(dir.path(), &["show", &uuid, "--json"]);
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["uuid"], uuid);
    assert_eq!(json["server_url"], "https://vpn.example.com");
    assert_eq!(json["username"], "alice");
    assert_eq!(json["driver"]["reconnect_timeout_secs"], 300);
    assert_ne!(json["password"], serde_json::Value::Null);
}
