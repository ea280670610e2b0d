//! ldaptest - verify credentials against an LDAP directory service.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::CommandContext;
use ldaptest_auth::{AuthChecker, CancellationToken};
use ldaptest_core::ConfigStore;
use secrecy::SecretString;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ldaptest")]
#[command(version)]
#[command(about = "Verify credentials against an LDAP directory", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory configuration file (JSON)
    #[arg(short, long, global = true, env = "LDAPTEST_CONFIG", default_value = "cfg.json")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LDAPTEST_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a single username/password pair
    Check {
        /// Username substituted into the bind DN template
        #[arg(short, long)]
        username: String,

        /// Password
        #[arg(short, long, env = "LDAPTEST_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Verify one `username password` pair per input line
    Batch {
        /// Input file, `-` for stdin
        #[arg(short, long, default_value = "-")]
        input: String,

        /// Maximum number of binds in flight
        #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u16).range(1..))]
        concurrency: u16,
    },

    /// Repeatedly verify one account, as a health check
    Probe {
        /// Username substituted into the bind DN template
        #[arg(short, long)]
        username: String,

        /// Password
        #[arg(short, long, env = "LDAPTEST_PASSWORD", hide_env_values = true)]
        password: String,

        /// Seconds between probes
        #[arg(long, default_value_t = 30)]
        interval_secs: u64,

        /// Stop after this many probes
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        count: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the per-credential report.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    let store = ConfigStore::new();
    let config = store
        .load_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling outstanding checks");
            trigger.cancel();
        }
    });

    let ctx = CommandContext {
        checker: AuthChecker::new(),
        config,
        cancel,
    };

    let passed = match cli.command {
        Commands::Check { username, password } => {
            let password = SecretString::from(password);
            commands::check::execute(&ctx, &username, &password).await
        }
        Commands::Batch { input, concurrency } => {
            commands::batch::execute(&ctx, &input, usize::from(concurrency)).await?
        }
        Commands::Probe {
            username,
            password,
            interval_secs,
            count,
        } => {
            let password = SecretString::from(password);
            let opts = commands::probe::ProbeOptions {
                interval: std::time::Duration::from_secs(interval_secs),
                count,
            };
            commands::probe::execute(&ctx, &username, &password, &opts).await
        }
    };

    info!(passed, "done");
    Ok(if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
