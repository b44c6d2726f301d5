//! Setup command implementation
//!
//! Interactive command that creates a profile file and stores its password in
//! the system keyring under the profile's own service name.

use colored::Colorize;
use ocbridge_core::config::toml_config::{self, ProfileFile};
use ocbridge_core::config::DriverConfig;
use ocbridge_core::credentials::{KeyringStore, KEY_PASSWORD};
use ocbridge_core::error::{BridgeError, ConfigError, CredentialError};
use ocbridge_core::types::SessionProfile;
use secrecy::SecretString;
use std::io::{self, Write};

/// Key used to probe whether the keyring accepts writes
const PROBE_KEY: &str = "__ocbridge_probe__";

/// Run the setup command
pub fn run_setup() -> Result<(), BridgeError> {
    println!("{}", "ocbridge profile setup".bold());
    println!("======================");
    println!();
    println!("This creates a VPN profile. The password is stored in your");
    println!("system keyring; everything else goes to the profile file.");
    println!();

    let profile = collect_profile()?;
    profile
        .validate()
        .map_err(|message| ConfigError::ValidationError {
            message: format!("Profile validation failed: {}", message),
        })?;

    let keyring = KeyringStore::new(&profile.uuid);
    check_keyring_availability(&keyring)?;

    let password = collect_password()?;

    println!();
    println!("Saving profile...");

    let file = ProfileFile::new(profile, DriverConfig::default());
    let path = toml_config::save_profile(&file)?;
    keyring.set(KEY_PASSWORD, &password)?;

    println!("{} Profile saved to {}", "✓".green(), path.display());
    println!();
    println!("Profile id: {}", file.profile.uuid.to_string().bold());
    println!();
    println!("You can now use:");
    println!("  ocbridge show {}", file.profile.uuid);
    println!("  ocbridge connect {} --tun-fd <fd>", file.profile.uuid);

    Ok(())
}

/// Check that the keyring is reachable and unlocked
fn check_keyring_availability(keyring: &KeyringStore) -> Result<(), BridgeError> {
    let probe = SecretString::new("probe".to_string());
    match keyring.set(PROBE_KEY, &probe) {
        Ok(()) => {
            let _ = keyring.delete(PROBE_KEY);
            Ok(())
        }
        Err(e @ (CredentialError::Locked | CredentialError::ServiceUnavailable)) => {
            println!("{} Keyring is not available or locked.", "✗".red());
            println!("Please ensure your system keyring is unlocked and available.");
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Collect the profile fields interactively
fn collect_profile() -> Result<SessionProfile, BridgeError> {
    println!("VPN Profile:");
    println!("------------");

    let name = prompt_optional("Profile name", "default")?;
    let server = prompt_required("VPN server (hostname, IP or URL)", "vpn.example.com")?;
    let username = prompt_required("Username", "")?;

    Ok(SessionProfile::new(name, server, username))
}

/// Prompt for the password until a non-empty one is entered
fn collect_password() -> Result<SecretString, BridgeError> {
    loop {
        let password = prompt_input("Password: ")?;
        if password.is_empty() {
            println!("{} Password cannot be empty. Please try again.", "✗".red());
            continue;
        }
        return Ok(SecretString::new(password));
    }
}

/// Prompt for a required value with default
fn prompt_required(prompt: &str, default: &str) -> Result<String, BridgeError> {
    let prompt_text = if default.is_empty() {
        format!("{}: ", prompt)
    } else {
        format!("{} [{}]: ", prompt, default)
    };

    loop {
        let input = prompt_input(&prompt_text)?;

        if input.trim().is_empty() {
            if !default.is_empty() {
                return Ok(default.to_string());
            }
            println!("{} This field is required. Please enter a value.", "✗".red());
            continue;
        }

        return Ok(input.trim().to_string());
    }
}

/// Prompt for an optional value
fn prompt_optional(prompt: &str, default: &str) -> Result<String, BridgeError> {
    let input = prompt_input(&format!("{} [{}]: ", prompt, default))?;

    if input.trim().is_empty() {
        Ok(default.to_string())
    } else {
        Ok(input.trim().to_string())
    }
}

/// Low-level input prompting
fn prompt_input(prompt: &str) -> Result<String, BridgeError> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(input.trim_end().to_string())
}
