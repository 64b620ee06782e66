//! BrightRoot command-line client.
//!
//! Thin front end over the session manager: sign in, register, sign out,
//! and inspect or edit the cached profile. All session state handling
//! lives in the `auth` module; this binary only prompts and prints.

mod api;
mod auth;
mod config;
mod models;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Result;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use api::{ApiClient, AuthError};
use auth::credentials::RememberedLogin;
use auth::{FileStore, RegisterOutcome, SessionManager, SessionStatus};
use config::Config;
use models::ProfileUpdate;

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn print_usage() {
    eprintln!("Usage: brightroot <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  login [identifier]              Sign in with a username or email");
    eprintln!("  register                        Create a new account");
    eprintln!("  logout                          Sign out and clear the stored session");
    eprintln!("  whoami                          Show the current session");
    eprintln!("  profile set <field> <value>     Edit the cached profile");
    eprintln!("                                  (first-name, last-name, study-goal, dark-mode)");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };

    let api = Arc::new(ApiClient::new(config.api_base_url())?);
    let store = Arc::new(FileStore::new(Config::session_dir()?));
    let manager = SessionManager::new(api, store);

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("login") => cmd_login(&manager, &mut config, args.get(2).cloned()).await,
        Some("register") => cmd_register(&manager).await,
        Some("logout") => cmd_logout(&manager, &config),
        Some("whoami") => cmd_whoami(&manager).await,
        Some("profile") => cmd_profile(&manager, &args[2..]).await,
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn prompt_identifier(default: Option<&str>) -> Result<String> {
    let input = match default {
        Some(default) => prompt(&format!("Username or email [{}]: ", default))?,
        None => prompt("Username or email: ")?,
    };
    if input.is_empty() {
        if let Some(default) = default {
            return Ok(default.to_string());
        }
    }
    Ok(input)
}

async fn cmd_login(
    manager: &SessionManager,
    config: &mut Config,
    identifier_arg: Option<String>,
) -> Result<()> {
    let identifier = match identifier_arg.or_else(|| std::env::var("BRIGHTROOT_USERNAME").ok()) {
        Some(identifier) => identifier,
        None => prompt_identifier(config.last_username.as_deref())?,
    };
    if identifier.is_empty() {
        anyhow::bail!("An identifier is required");
    }

    // Environment, then keychain, then an interactive prompt. A freshly
    // typed password is remembered after a successful sign-in.
    let mut freshly_typed = false;
    let password = match std::env::var("BRIGHTROOT_PASSWORD") {
        Ok(password) => password,
        Err(_) => match RememberedLogin::recall(&identifier) {
            Some(password) => {
                println!("Using remembered password for {}", identifier);
                password
            }
            None => {
                freshly_typed = true;
                rpassword::prompt_password("Password: ")?
            }
        },
    };
    if password.is_empty() {
        anyhow::bail!("A password is required");
    }

    println!("Signing in...");
    match manager.login(&identifier, &password).await {
        Ok(profile) => {
            if freshly_typed {
                if let Err(e) = RememberedLogin::remember(&identifier, &password) {
                    warn!(error = %e, "Failed to remember password");
                }
            }
            config.last_username = Some(identifier);
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
            println!("Signed in as {}", profile.display_name());
            Ok(())
        }
        Err(AuthError::StorageUnavailable(message)) => {
            eprintln!("Signed in, but the session could not be saved: {}", message);
            eprintln!("You will need to sign in again next time.");
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    }
}

async fn cmd_register(manager: &SessionManager) -> Result<()> {
    let username = prompt("Username: ")?;
    let email = prompt("Email: ")?;
    let password = rpassword::prompt_password("Password: ")?;
    let confirmation = rpassword::prompt_password("Confirm password: ")?;
    if password != confirmation {
        anyhow::bail!("Passwords do not match");
    }

    println!("Creating account...");
    match manager.register(&username, &email, &password).await {
        Ok(RegisterOutcome::SignedIn(profile)) => {
            println!("Account created, signed in as {}", profile.display_name());
            Ok(())
        }
        Ok(RegisterOutcome::Registered) => {
            println!("Account created. Run `brightroot login` to sign in.");
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    }
}

fn cmd_logout(manager: &SessionManager, config: &Config) -> Result<()> {
    manager.logout();
    if let Some(ref username) = config.last_username {
        RememberedLogin::forget(username);
    }
    println!("Signed out.");
    Ok(())
}

async fn cmd_whoami(manager: &SessionManager) -> Result<()> {
    manager.recover().await?;

    let snapshot = manager.watch().snapshot();
    match snapshot.status() {
        SessionStatus::Authenticated => {
            if let Some(profile) = snapshot.profile() {
                println!("Signed in as {} <{}>", profile.display_name(), profile.email);
                if !profile.study_goal.is_empty() {
                    println!("Study goal: {}", profile.study_goal);
                }
            }
        }
        _ => {
            println!("Not signed in.");
            if let Some(error) = snapshot.last_error() {
                println!("Last error: {}", error);
            }
        }
    }
    Ok(())
}

async fn cmd_profile(manager: &SessionManager, args: &[String]) -> Result<()> {
    let (field, value) = match args {
        [action, field, value] if action == "set" => (field.as_str(), value.clone()),
        _ => {
            print_usage();
            return Ok(());
        }
    };

    let update = match field {
        "first-name" => ProfileUpdate {
            first_name: Some(value),
            ..Default::default()
        },
        "last-name" => ProfileUpdate {
            last_name: Some(value),
            ..Default::default()
        },
        "study-goal" => ProfileUpdate {
            study_goal: Some(value),
            ..Default::default()
        },
        "dark-mode" => ProfileUpdate {
            dark_mode: Some(value.parse().map_err(|_| {
                anyhow::anyhow!("dark-mode expects true or false, got '{}'", value)
            })?),
            ..Default::default()
        },
        _ => anyhow::bail!("Unknown profile field: {}", field),
    };

    manager.recover().await?;
    match manager.update_profile(&update) {
        Some(profile) => {
            println!("Profile updated for {}", profile.display_name());
            Ok(())
        }
        None => anyhow::bail!("Not signed in. Run `brightroot login` first."),
    }
}
