//! lkweb - command-line login for the LK match-analysis dashboard.
//!
//! Logs in through the identity provider's web page, keeps the resulting
//! token in the configured session store, and reports who is logged in.

mod browser;

use std::io;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lkweb_core::api::ApiClient;
use lkweb_core::auth::Auth;
use lkweb_core::config::Config;
use lkweb_core::handshake::{
    CallbackServer, CloseHandle, HandshakeCoordinator, LoginOutcome, MessageChannel,
};

use browser::SystemBrowserOpener;

/// Log file name prefix in the cache directory
const LOG_FILE: &str = "lkweb.log";

#[derive(Parser)]
#[command(name = "lkweb", version, about = "Log in to the LK match-analysis dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in through the provider's login page
    Login,
    /// Forget the stored session
    Logout,
    /// Show who is logged in
    Whoami,
    /// Set the name shown instead of the provider nickname (omit to clear)
    Nickname { name: Option<String> },
}

/// Initialize the tracing subscriber for logging.
///
/// Logs go to a daily file in the cache directory so stdout stays clean;
/// stderr is used when there is no cache directory.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match config.cache_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

fn load_config() -> Config {
    match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config ({}), using defaults", e);
            Config::default()
        }
    }
}

fn build_auth(config: &Config) -> Result<Auth> {
    let api = ApiClient::new(&config.api_base_url())?;
    Ok(Auth::new(
        api,
        config.session_store(),
        config.custom_nickname.clone(),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = load_config();
    let _log_guard = init_tracing(&config);
    info!("lkweb starting");

    let auth = build_auth(&config)?;
    match cli.command {
        Command::Login => login(&config, auth).await?,
        Command::Logout => {
            auth.logout().await;
            println!("✓ Logged out");
        }
        Command::Whoami => whoami(&auth).await,
        Command::Nickname { name } => {
            let nickname = auth.set_custom_nickname(name.as_deref().unwrap_or_default());
            config.custom_nickname = nickname;
            config.save()?;
            println!("Display name: {}", auth.snapshot().display_name);
        }
    }
    Ok(())
}

async fn whoami(auth: &Auth) {
    let snapshot = auth.refresh().await;
    match snapshot.user {
        Some(user) if snapshot.is_authenticated => {
            println!("{} (id {})", snapshot.display_name, user.id);
            if let Some(email) = user.email {
                println!("  {}", email);
            }
        }
        _ => println!("Not logged in. Run `lkweb login`."),
    }
}

async fn login(config: &Config, auth: Auth) -> Result<()> {
    let snapshot = auth.refresh().await;
    if snapshot.is_authenticated {
        println!("Already logged in as {}.", snapshot.display_name);
        return Ok(());
    }

    let channel = MessageChannel::new();
    let window = CloseHandle::new();

    let callback = CallbackServer::bind(config.callback_port()).await?;
    debug!(redirect = %callback.redirect_uri(), "Callback server ready");
    let server = tokio::spawn(callback.serve(
        auth.api().clone(),
        channel.clone(),
        window.clone(),
    ));

    let coordinator = HandshakeCoordinator::new(
        auth,
        channel,
        SystemBrowserOpener::new(window.clone()),
        config.origin_policy()?,
    )
    .with_poll_interval(config.poll_interval());

    let (outcome, ()) = tokio::join!(coordinator.begin_login(), async {
        println!("{}", coordinator.control().label());
    });
    server.abort();

    match outcome {
        LoginOutcome::Success(_) => {
            println!("✓ Logged in as {}", coordinator.auth().snapshot().display_name);
        }
        LoginOutcome::Failed(e) => {
            warn!(error = %e, "Login did not complete");
            if e.is_alert() {
                eprintln!("{}", e.alert_message());
            }
        }
        LoginOutcome::Cancelled => println!("Login cancelled."),
    }
    Ok(())
}
