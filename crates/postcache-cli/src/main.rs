//! postcache - post to a social account from the command line.
//!
//! Sessions are cached per account between runs, so a password is only
//! needed when the cached session is missing or has been revoked.

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use postcache_core::{
    AccountIdentity, Config, Credentials, ErrorKind, PostError, PostOrchestrator, PostRequest,
};

/// Environment variable consulted for the account password.
const PASSWORD_ENV: &str = "POSTCACHE_PASSWORD";

/// Number of posts `recent` shows when `--count` is not given.
const DEFAULT_RECENT_COUNT: usize = 20;

#[derive(Parser, Debug)]
#[command(name = "postcache")]
#[command(about = "Post to a social account, reusing a cached login session")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish a message, logging in only if the cached session is unusable
    Post {
        identity: String,
        message: String,

        /// Id of the post to reply to
        #[arg(long, value_name = "ID")]
        reply_to: Option<String>,

        #[command(flatten)]
        login: LoginArgs,
    },
    /// Log in and cache the session without posting
    Login {
        /// Account handle (defaults to the last one used)
        identity: Option<String>,

        #[command(flatten)]
        login: LoginArgs,
    },
    /// Report whether the cached session is still accepted
    Check {
        identity: Option<String>,
    },
    /// Show the account's most recent posts using the cached session
    Recent {
        identity: Option<String>,

        #[arg(long, default_value_t = DEFAULT_RECENT_COUNT)]
        count: usize,
    },
}

#[derive(Args, Debug)]
struct LoginArgs {
    /// Login name, if it differs from the handle
    #[arg(long)]
    username: Option<String>,

    /// Email for platforms that ask for it during login
    #[arg(long)]
    email: Option<String>,

    /// Prompt for the password when POSTCACHE_PASSWORD is not set
    #[arg(long)]
    prompt_password: bool,
}

impl LoginArgs {
    /// Build credentials from the environment or a prompt.
    /// Returns `None` when no password is available and prompting is off.
    fn credentials(&self, identity: &AccountIdentity, prompt: bool) -> Result<Option<Credentials>> {
        let password = match std::env::var(PASSWORD_ENV) {
            Ok(password) if !password.is_empty() => password,
            _ if prompt || self.prompt_password => {
                rpassword::prompt_password(format!("Password for {}: ", identity))
                    .context("Failed to read password")?
            }
            _ => {
                debug!("No password available, relying on the cached session");
                return Ok(None);
            }
        };

        let username = self
            .username
            .clone()
            .unwrap_or_else(|| identity.handle().to_string());
        let mut credentials = Credentials::new(username, password);
        if let Some(ref email) = self.email {
            credentials = credentials.with_email(email.clone());
        }
        Ok(Some(credentials))
    }
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins over `-v`. The returned guard flushes the log file on drop.
fn init_tracing(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;
            let dir = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    Ok(guard)
}

fn exit_code(err: &anyhow::Error) -> u8 {
    let Some(err) = err.downcast_ref::<PostError>() else {
        return 1;
    };
    match err.kind() {
        ErrorKind::Configuration => 2,
        ErrorKind::Authentication => 3,
        ErrorKind::TransientSubmission => 4,
        ErrorKind::ContentRejected => 5,
        ErrorKind::OutcomeUnknown => 6,
        ErrorKind::Storage => 7,
        ErrorKind::InvalidRequest => 8,
        ErrorKind::DeadlineExceeded => 9,
        ErrorKind::Fetch => 10,
    }
}

fn resolve_identity(arg: Option<String>, config: &Config) -> Result<AccountIdentity> {
    let handle = arg
        .or_else(|| config.last_identity.clone())
        .context("No account given and no previously used account in config")?;
    Ok(AccountIdentity::new(handle)?)
}

/// Record the account for next time. Failure only costs the default.
fn remember(config: &mut Config, path: &Path, identity: &AccountIdentity) {
    if config.last_identity.as_deref() == Some(identity.handle()) {
        return;
    }
    config.last_identity = Some(identity.handle().to_string());
    if let Err(e) = config.save_to(path) {
        warn!(error = %e, "Failed to save config");
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::config_path()?,
    };
    let mut config = Config::load_from(&config_path)?;
    debug!(path = %config_path.display(), "Config loaded");

    let orchestrator = PostOrchestrator::from_config(&config)?;

    match cli.command {
        Command::Post {
            identity,
            message,
            reply_to,
            login,
        } => {
            let identity = AccountIdentity::new(identity)?;
            let mut request = PostRequest::new(message)?;
            if let Some(id) = reply_to {
                request = request.in_reply_to(id);
            }
            let credentials = login.credentials(&identity, false)?;

            let result = orchestrator.submit_post(&identity, credentials, request).await?;
            info!(identity = %identity, id = ?result.id(), "Posted");
            remember(&mut config, &config_path, &identity);
            print_json(&result)?;
        }
        Command::Login { identity, login } => {
            let identity = resolve_identity(identity, &config)?;
            let credentials = login
                .credentials(&identity, true)?
                .context("A password is required to log in")?;

            let session = orchestrator.login_and_store(&identity, credentials).await?;
            remember(&mut config, &config_path, &identity);
            print_json(&json!({
                "identity": identity.handle(),
                "tokens": session.len(),
            }))?;
        }
        Command::Check { identity } => {
            let identity = resolve_identity(identity, &config)?;
            let status = orchestrator.check_session(&identity).await?;
            print_json(&status)?;
        }
        Command::Recent { identity, count } => {
            let identity = resolve_identity(identity, &config)?;
            let posts = orchestrator.recent_posts(&identity, count).await?;
            print_json(&posts)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = match init_tracing(cli.verbose, cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}
