//! pgb - Run PhoneGap Build steps from any CI host
//!
//! This is the host side of a build step: it loads the step file, wires the
//! process environment, Ctrl-C and the timeout into the step's runtime
//! context, and writes a newly created app id back into the step file.

mod cli;
mod display;
mod error;
mod events;

use crate::cli::{Cli, Commands, RunArgs};
use crate::display::OutputRenderer;
use crate::error::CliError;
use crate::events::EventHandler;
use clap::Parser;
use pgb_config::Config;
use pgb_events::{EventEmitter, EventReceiver, EventSender};
use pgb_step::{validate_definition, BuildStepAdapter, RuntimeContext};
use pgb_types::{BuildStepConfig, ColorChoice};
use secrecy::SecretString;
use std::future::Future;
use std::path::Path;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument};

#[tokio::main]
async fn main() {
    // Parse command line arguments first to check for JSON mode
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    let config = match load_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(e.exit_code());
        }
    };

    // Initialize tracing with JSON awareness
    init_tracing(json_mode, cli.global.debug, &config.log_dir());

    // Run the application and handle errors
    if let Err(e) = run(cli, config).await {
        error!("Application error: {}", e);
        if !json_mode {
            eprintln!("Error: {e}");
        }
        process::exit(e.exit_code());
    }
}

/// Load configuration with proper precedence
async fn load_config(cli: &Cli) -> Result<Config, CliError> {
    // 1. Start with file config (or defaults)
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;

    // 2. Merge environment variables
    config.merge_env()?;

    // 3. Apply CLI flags (highest precedence)
    if let Some(color) = cli.global.color {
        config.general.color = color;
    }

    Ok(config)
}

/// Main application logic
async fn run(cli: Cli, config: Config) -> Result<(), CliError> {
    info!("Starting pgb v{}", env!("CARGO_PKG_VERSION"));

    let colors_enabled = match config.general.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => console::Term::stdout().features().colors_supported(),
    };
    let renderer = OutputRenderer::new(cli.global.json, colors_enabled);
    let mut event_handler = EventHandler::new(colors_enabled, cli.global.json, cli.global.debug);

    // Create event channel
    let (event_sender, event_receiver) = pgb_events::channel();

    let command = execute_command(cli.command, &config, &renderer, event_sender);
    execute_command_with_events(command, event_receiver, &mut event_handler).await?;

    info!("Command completed successfully");
    Ok(())
}

/// Execute command with concurrent event handling
async fn execute_command_with_events<F>(
    command: F,
    mut event_receiver: EventReceiver,
    event_handler: &mut EventHandler,
) -> Result<(), CliError>
where
    F: Future<Output = Result<(), CliError>>,
{
    let mut command_future = Box::pin(command);

    // Handle events concurrently with command execution
    loop {
        select! {
            // Command completed
            result = &mut command_future => {
                // Drain any remaining events
                while let Ok(event) = event_receiver.try_recv() {
                    event_handler.handle_event(event);
                }
                return result;
            }

            // Event received
            event = event_receiver.recv() => {
                match event {
                    Some(event) => event_handler.handle_event(event),
                    None => { /* Channel closed: keep waiting for command to finish */ }
                }
            }
        }
    }
}

/// Execute the specified command
async fn execute_command(
    command: Commands,
    config: &Config,
    renderer: &OutputRenderer,
    events: EventSender,
) -> Result<(), CliError> {
    match command {
        Commands::Run(args) => run_step(args, config, renderer, events).await,
        Commands::Check { step } => check_step(&step, config, renderer).await,
        Commands::Status { step } => show_status(&step, config, renderer).await,
    }
}

/// `pgb run`
async fn run_step(
    args: RunArgs,
    config: &Config,
    renderer: &OutputRenderer,
    events: EventSender,
) -> Result<(), CliError> {
    let mut definition = pgb_config::load_step(&args.step).await?;

    let report = validate_definition(&definition, config.validation.name_check);
    for warning in report.warnings() {
        events.emit_warning(warning.to_string());
    }
    report.ensure_valid()?;

    let step_config = BuildStepConfig::from_definition(&definition)?;
    let adapter = BuildStepAdapter::new(pgb_net::service_from_config(config)?);

    let workspace = match args.workspace {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    let cancel = CancellationToken::new();
    let timed_out = Arc::new(AtomicBool::new(false));
    let watchers = [
        tokio::spawn(cancel_on_ctrl_c(cancel.clone())),
        tokio::spawn(cancel_after(args.timeout, cancel.clone(), timed_out.clone())),
    ];

    let ctx = RuntimeContext::new(workspace, events)
        .with_environment(process_environment())
        .with_cancellation(cancel);

    let span = tracing::info_span!("run", run_id = %uuid::Uuid::new_v4(), step = %args.step.display());
    let run = adapter.execute(&step_config, &ctx).instrument(span).await;

    for watcher in watchers {
        watcher.abort();
    }

    // Persist a provisioned app even when the build itself failed
    if !args.no_persist && definition.apply_target(&run.target) {
        pgb_config::save_step(&args.step, &definition).await?;
        info!(app_id = ?run.target.app_id(), "step file updated with new app id");
    }

    if run.is_cancelled() && timed_out.load(Ordering::SeqCst) {
        return Err(CliError::TimedOut(args.timeout.unwrap_or_default()));
    }

    let report = run.into_result()?;
    renderer.render_build_report(&report)?;
    Ok(())
}

/// `pgb check`
async fn check_step(step: &Path, config: &Config, renderer: &OutputRenderer) -> Result<(), CliError> {
    pgb_net::parse_url(&config.service.base_url)?;

    let definition = pgb_config::load_step(step).await?;
    let report = validate_definition(&definition, config.validation.name_check);
    renderer.render_validation(&report)?;
    report.ensure_valid()?;
    Ok(())
}

/// `pgb status`
async fn show_status(step: &Path, config: &Config, renderer: &OutputRenderer) -> Result<(), CliError> {
    let definition = pgb_config::load_step(step).await?;
    let step_config = BuildStepConfig::from_definition(&definition)?;
    let Some(app_id) = step_config.remote_app_id() else {
        return Err(CliError::InvalidArguments(
            "the step has no app yet; run it once to create one".to_string(),
        ));
    };

    let service = pgb_net::service_from_config(config)?;
    let token: &SecretString = step_config.api_token();
    let app = service.fetch_app(token, app_id).await?;
    renderer.render_remote_app(&app)?;
    Ok(())
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("interrupt received, cancelling");
        cancel.cancel();
    }
}

async fn cancel_after(timeout: Option<u64>, cancel: CancellationToken, timed_out: Arc<AtomicBool>) {
    let Some(secs) = timeout else {
        return;
    };
    tokio::time::sleep(Duration::from_secs(secs)).await;
    tracing::warn!(secs, "timeout reached, cancelling");
    timed_out.store(true, Ordering::SeqCst);
    cancel.cancel();
}

/// Process environment; variables that are not valid UTF-8 are skipped
fn process_environment() -> impl Iterator<Item = (String, String)> {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
}

/// Initialize tracing/logging
fn init_tracing(json_mode: bool, debug_enabled_flag: bool, log_dir: &Path) {
    // Check if debug logging is enabled
    let debug_enabled = std::env::var("RUST_LOG").is_ok() || debug_enabled_flag;

    if debug_enabled {
        // Debug mode: structured JSON logs to file
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            if !json_mode {
                eprintln!("Warning: Failed to create log directory: {e}");
            }
        }

        let log_file = log_dir.join(format!(
            "pgb-{}.log",
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        ));

        match std::fs::File::create(&log_file) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .json()
                    .with_writer(file)
                    .with_env_filter(
                        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
                            |_| tracing_subscriber::EnvFilter::new("info,pgb=debug,pgb_step=debug,pgb_net=debug"),
                        ),
                    )
                    .init();

                if !json_mode {
                    eprintln!("Debug logging enabled: {}", log_file.display());
                }
                return;
            }
            Err(e) => {
                if !json_mode {
                    eprintln!("Warning: Failed to create log file: {e}");
                }
            }
        }
    }

    if json_mode {
        // JSON mode: suppress console logging to avoid contaminating JSON
        tracing_subscriber::fmt()
            .with_writer(std::io::sink)
            .with_env_filter("off")
            .init();
    } else {
        // Normal mode: minimal logging to stderr
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .init();
    }
}
