//! ocbridge - OpenConnect connection driver CLI
//!
//! Creates profiles with keyring-backed credentials and drives a single
//! OpenConnect session for a profile on an already opened TUN device.

use clap::{Parser, Subcommand};
use ocbridge_core::error::BridgeError;
use ocbridge_core::init_logging;
use ocbridge_core::types::ConnectionStatus;
use std::os::fd::RawFd;
use uuid::Uuid;

mod cli;

#[derive(Parser)]
#[command(name = "ocbridge")]
#[command(about = "Drive OpenConnect sessions from stored profiles")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a profile and store its password in the system keyring
    Setup,
    /// Show a stored profile
    Show {
        /// Profile identifier
        uuid: Uuid,
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Connect a profile over an inherited TUN descriptor
    Connect {
        /// Profile identifier
        uuid: Uuid,
        /// Open TUN device descriptor to hand to the engine
        #[arg(long)]
        tun_fd: RawFd,
    },
}

fn main() {
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(2);
    }

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Setup => cli::setup::run_setup().map(|()| 0),
        Commands::Show { uuid, json } => cli::show::run_show(&uuid, json).map(|()| 0),
        Commands::Connect { uuid, tun_fd } => {
            cli::connect::run_connect(&uuid, tun_fd).map(|status| match status {
                ConnectionStatus::AuthFailed => 1,
                _ => 0,
            })
        }
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            let exit_code = match e {
                // Configuration errors (exit code 2)
                BridgeError::Config(_) | BridgeError::Toml(_) | BridgeError::TomlSerialize(_) => 2,
                // Credential store unusable (exit code 2 - setup issue)
                BridgeError::Credential(_) => 2,
                // Runtime errors (exit code 1)
                BridgeError::Engine(_) | BridgeError::Ui(_) | BridgeError::Io(_) => 1,
            };

            eprintln!("{}", e);
            std::process::exit(exit_code);
        }
    }
}
