#![forbid(unsafe_code)]

//! `stack-warden` — local multi-service supervisor binary.
//!
//! Boots the configured service stack in dependency order, waits for each
//! service's readiness probe, then holds the stack up until a shutdown
//! signal or an unexpected service exit tears everything down.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use stack_warden::models::plan::DependencyPlan;
use stack_warden::session::SessionController;
use stack_warden::{AppError, LaunchError, Result, StackConfig};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "stack-warden", about = "Local multi-service supervisor", version, long_about = None)]
struct Cli {
    /// Path to the TOML stack configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Validate the configuration, print the launch order, and exit
    /// without spawning anything.
    #[arg(long)]
    check: bool,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::from(err.exit_code());
    }
    info!("stack-warden bootstrap");

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "failed to build tokio runtime");
            return ExitCode::from(AppError::Io(err.to_string()).exit_code());
        }
    };

    ExitCode::from(runtime.block_on(run(args)))
}

async fn run(args: Cli) -> u8 {
    let config = match StackConfig::load_from_path(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "configuration rejected");
            return err.exit_code();
        }
    };
    info!(services = config.services.len(), "configuration loaded");

    if args.check {
        return check_plan(&config);
    }

    let controller = SessionController::new(config);
    let ready_session = controller.session_id().to_string();
    let fatal_session = controller.session_id().to_string();
    controller
        .run(
            move || info!(session = %ready_session, "environment ready"),
            move |err| report_fatal(&fatal_session, err),
        )
        .await
}

/// Validate the plan and print the resolved launch order.
fn check_plan(config: &StackConfig) -> u8 {
    match DependencyPlan::build(&config.services) {
        Ok(plan) => {
            println!("configuration valid; launch order:");
            for (index, name) in plan.start_order().iter().enumerate() {
                println!("  {}. {name}", index + 1);
            }
            0
        }
        Err(err) => {
            error!(%err, "plan validation failed");
            err.exit_code()
        }
    }
}

/// Emit the fatal launch report as one JSON object on stderr.
fn report_fatal(session: &str, err: &LaunchError) {
    error!(%err, "launch failed, stack torn down");
    let report = serde_json::json!({
        "failed_service": err.service,
        "cause": err.cause.to_string(),
        "attempted_duration_ms": err.attempted_ms(),
        "session": session,
    });
    eprintln!("{report}");
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
