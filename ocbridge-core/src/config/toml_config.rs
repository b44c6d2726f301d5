//! TOML profile file I/O
//!
//! Profiles live one per file under `~/.config/ocbridge/profiles/<uuid>.toml`,
//! each holding the endpoint and optional driver tunables.

use crate::config::DriverConfig;
use crate::error::{BridgeError, ConfigError};
use crate::types::SessionProfile;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Directory holding profile files, relative to the config dir
const PROFILES_DIR_NAME: &str = "profiles";

/// Complete contents of a profile file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileFile {
    pub profile: SessionProfile,

    #[serde(default)]
    pub driver: DriverConfig,
}

impl ProfileFile {
    pub fn new(profile: SessionProfile, driver: DriverConfig) -> Self {
        Self { profile, driver }
    }

    /// Validate both sections
    pub fn validate(&self) -> Result<(), BridgeError> {
        self.profile
            .validate()
            .map_err(|message| ConfigError::ValidationError { message })?;
        self.driver.validate().map_err(|e| ConfigError::ValidationError {
            message: format!("Invalid driver settings: {}", e),
        })?;
        Ok(())
    }
}

/// Get the configuration directory
///
/// Returns ~/.config/ocbridge, or OCBRIDGE_CONFIG_DIR if set
pub fn get_config_dir() -> Result<PathBuf, BridgeError> {
    if let Ok(config_dir) = std::env::var("OCBRIDGE_CONFIG_DIR") {
        return Ok(PathBuf::from(config_dir));
    }

    let home = std::env::var("HOME").map_err(|_| ConfigError::IoError {
        message: "HOME environment variable not set".to_string(),
    })?;

    Ok(PathBuf::from(home).join(".config").join("ocbridge"))
}

/// Path of the profile file for `uuid` under `config_dir`
pub fn profile_path_in(config_dir: &Path, uuid: &Uuid) -> PathBuf {
    config_dir
        .join(PROFILES_DIR_NAME)
        .join(format!("{}.toml", uuid))
}

/// Path of the profile file for `uuid` in the default config dir
pub fn profile_path(uuid: &Uuid) -> Result<PathBuf, BridgeError> {
    Ok(profile_path_in(&get_config_dir()?, uuid))
}

/// Load and validate a profile file
pub fn load_profile_from_path<P: AsRef<Path>>(path: P) -> Result<ProfileFile, BridgeError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigError::LoadFailed {
            path: path.to_string_lossy().to_string(),
        },
        _ => ConfigError::IoError {
            message: format!("Failed to read profile file: {}", e),
        },
    })?;

    let file: ProfileFile = toml::from_str(&contents)?;
    file.validate()?;

    debug!("Loaded profile {} from {:?}", file.profile.uuid, path);
    Ok(file)
}

/// Load the profile with `uuid` from the default config dir
pub fn load_profile(uuid: &Uuid) -> Result<ProfileFile, BridgeError> {
    load_profile_from_path(profile_path(uuid)?)
}

/// Validate and save a profile file, creating parent directories
pub fn save_profile_to_path<P: AsRef<Path>>(file: &ProfileFile, path: P) -> Result<(), BridgeError> {
    let path = path.as_ref();
    file.validate()?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError {
            message: format!("Failed to create config directory: {}", e),
        })?;
    }

    let contents = toml::to_string_pretty(file)?;
    std::fs::write(path, contents).map_err(|_| ConfigError::SaveFailed {
        path: path.to_string_lossy().to_string(),
    })?;

    info!("Saved profile {} to {:?}", file.profile.uuid, path);
    Ok(())
}

/// Save a profile file into the default config dir
pub fn save_profile(file: &ProfileFile) -> Result<PathBuf, BridgeError> {
    let path = profile_path(&file.profile.uuid)?;
    save_profile_to_path(file, &path)?;
    Ok(path)
}

/// List the profile ids stored under `config_dir`, sorted
pub fn list_profiles_in(config_dir: &Path) -> Result<Vec<Uuid>, BridgeError> {
    let dir = config_dir.join(PROFILES_DIR_NAME);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut ids = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        match path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(Uuid::parse_str)
        {
            Some(Ok(id)) => ids.push(id),
            _ => debug!("Skipping non-profile file {:?}", path),
        }
    }

    ids.sort();
    Ok(ids)
}
