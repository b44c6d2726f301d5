//! Show command implementation
//!
//! Prints a stored profile. The password itself is never printed, only
//! whether the keyring holds one.

use colored::Colorize;
use ocbridge_core::config::toml_config::{self, ProfileFile};
use ocbridge_core::config::CertPolicy;
use ocbridge_core::credentials::{CredentialStore, KeyringStore, KEY_PASSWORD};
use ocbridge_core::error::BridgeError;
use uuid::Uuid;

/// Whether the keyring holds a password for the profile
fn password_state(uuid: &Uuid) -> &'static str {
    match KeyringStore::new(uuid).get(KEY_PASSWORD) {
        Ok(Some(_)) => "stored",
        Ok(None) => "missing",
        Err(_) => "unavailable",
    }
}

/// Run the show command
pub fn run_show(uuid: &Uuid, json: bool) -> Result<(), BridgeError> {
    let file = toml_config::load_profile(uuid)?;
    let password = password_state(uuid);

    if json {
        let output = serde_json::json!({
            "uuid": file.profile.uuid,
            "name": file.profile.name,
            "server_address": file.profile.server_address,
            "server_url": file.profile.server_url(),
            "username": file.profile.username,
            "password": password,
            "driver": file.driver,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).map_err(std::io::Error::from)?
        );
        return Ok(());
    }

    print_profile(&file, password);
    Ok(())
}

fn print_profile(file: &ProfileFile, password: &str) {
    let profile = &file.profile;
    let driver = &file.driver;

    println!("{}", "Profile".bold());
    println!("  id:        {}", profile.uuid);
    println!("  name:      {}", profile.name);
    println!("  server:    {}", profile.server_url());
    println!("  username:  {}", profile.username);
    let password = match password {
        "stored" => password.green(),
        "missing" => password.red(),
        _ => password.yellow(),
    };
    println!("  password:  {}", password);

    println!("{}", "Driver".bold());
    println!("  dtls attempt period: {}s", driver.dtls_attempt_period_secs);
    println!(
        "  reconnect:           timeout {}s, interval {}s",
        driver.reconnect_timeout_secs, driver.reconnect_interval_secs
    );
    let cert = match &driver.cert_policy {
        CertPolicy::AcceptAll => "accept all".yellow().to_string(),
        CertPolicy::RejectAll => "reject all".to_string(),
        CertPolicy::Pinned { hashes } => format!("pinned ({} hash(es))", hashes.len()),
    };
    println!("  certificates:        {}", cert);
}
