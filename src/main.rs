//! uggcli: terminal hypermedia browser for the UGTP protocol.
//!
//! Connects to UGTP servers (`ugtp://` plain, `ugtps://` TLS), renders
//! their pages into the terminal, and keeps per-origin cookies in an
//! encrypted vault between runs.
//!
//! The terminal owns stdout for the whole run; logs go to `uggcli.log`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use uggcli::browser::Browser;
use uggcli::logging;
use uggcli::settings::{
    DEFAULT_CONFIG_FILE, DEFAULT_VAULT_FILE, DEFAULT_VAULT_PASS_ENV_VAR, Settings,
};
use uggcli::vault;

/// Terminal hypermedia browser for the UGTP protocol.
#[derive(Parser, Debug)]
#[command(name = "uggcli", version, about = "Terminal hypermedia browser for the UGTP protocol")]
struct Args {
    /// The uggly resource identifier to open at startup,
    /// e.g. ugtps://myserver.domain.net:8443/home
    #[arg(long = "UGRI")]
    ugri: Option<String>,

    /// Log level: 'info' or 'debug'
    #[arg(long, default_value = "info")]
    loglevel: String,

    /// Generate a vault encryption password, print it to stdout and exit.
    /// Useful as `export UGGSECP=$(uggcli --vault-pass-gen)`
    #[arg(long = "vault-pass-gen")]
    vault_pass_gen: bool,

    /// The ENV var that stores the vault encryption password
    #[arg(long = "vault-password-env-var", default_value = DEFAULT_VAULT_PASS_ENV_VAR)]
    vault_password_env_var: String,

    /// Filename where encrypted cookies are stored
    #[arg(long = "vault-file", default_value = DEFAULT_VAULT_FILE)]
    vault_file: String,

    /// Filename where browser settings are stored. Command parameters
    /// always override settings loaded from file.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.vault_pass_gen {
        println!("{}", vault::new_vault_password());
        return ExitCode::SUCCESS;
    }

    let _log_guard = logging::init(&args.loglevel);
    info!(target: "main", version = env!("CARGO_PKG_VERSION"), "uggcli started");

    let config_path = PathBuf::from(&args.config);
    let mut settings = Settings::load(&config_path);
    // CLI parameters override loaded settings when they differ from defaults
    if args.vault_password_env_var != DEFAULT_VAULT_PASS_ENV_VAR {
        settings.vault_pass_env_var = args.vault_password_env_var;
    }
    if args.vault_file != DEFAULT_VAULT_FILE {
        settings.vault_file = args.vault_file;
    }

    match Browser::run(settings, config_path, args.ugri).await {
        Ok(code) => ExitCode::from(code.clamp(0, u8::MAX as i32) as u8),
        Err(e) => {
            error!(target: "main", "error starting browser: {}", e);
            eprintln!("error starting browser: {}", e);
            ExitCode::FAILURE
        }
    }
}
