//! herakles-memguard - version 0.1.0
//!
//! Memory pressure guard with tracing logging.
//! This is the main entry point that starts the guard loop and handles subcommands.

mod cli;
mod commands;
mod config;
mod startup_checks;

use clap::Parser;
use herakles_memguard::notify::{Notifier, WebhookNotifier};
use herakles_memguard::store::{EventStore, MemoryStore};
use herakles_memguard::{Coordinator, Dependencies};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn, Level};

use cli::{Args, Commands, LogLevel};
use commands::{
    command_candidates, command_config, command_dry_run, command_kill, command_status,
};
use config::{
    resolve_config, show_config, validate_effective_config, Config, DEFAULT_HISTORY_LIMIT,
    DEFAULT_WEBHOOK_TIMEOUT_MS,
};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = match args.log_level {
        LogLevel::Off => return Ok(()),
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Logging initialized with level: {:?}", args.log_level);
    Ok(())
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Builds a coordinator wired to the real system.
fn build_coordinator(config: &Config) -> Result<Coordinator, Box<dyn std::error::Error>> {
    let store: Arc<dyn EventStore> = Arc::new(MemoryStore::new(
        config.history_limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
    ));
    let mut deps = Dependencies::system(config.proc_root()).with_store(store);

    if let Some(url) = config.webhook_url.as_deref() {
        let timeout = Duration::from_millis(
            config
                .webhook_timeout_ms
                .unwrap_or(DEFAULT_WEBHOOK_TIMEOUT_MS),
        );
        let notifier: Arc<dyn Notifier> = Arc::new(WebhookNotifier::new(url, timeout)?);
        deps = deps.with_notifier(notifier);
        info!("Webhook notifications enabled: {}", url);
    }

    Ok(Coordinator::new(config.guard_config(), deps))
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format.clone());
    }

    setup_logging(&args)?;

    // Handle subcommands
    if let Some(command) = &args.command {
        match command {
            Commands::CheckRequirements => {
                println!("🔍 Checking Runtime Requirements");
                println!("================================\n");

                let proc_root = resolve_config(&args)?.proc_root();
                match startup_checks::validate_requirements(&proc_root) {
                    Ok(_) => {
                        println!("\n✅ All requirements met - ready to guard!");
                        std::process::exit(0);
                    }
                    Err(e) => {
                        eprintln!("\n❌ Requirements check failed: {}", e);
                        std::process::exit(1);
                    }
                }
            }
            Commands::Config {
                output,
                format,
                commented,
            } => return command_config(output.clone(), format.clone(), *commented),
            _ => {
                // Other commands need config validation
            }
        }

        let config = load_validated_config(&args)?;
        let coordinator = build_coordinator(&config)?;

        return match command {
            Commands::Status { format } => command_status(&coordinator, format.clone()).await,
            Commands::Candidates { limit, all, format } => {
                command_candidates(&coordinator, *limit, *all, format.clone()).await
            }
            Commands::DryRun { max_kills, format } => {
                command_dry_run(&coordinator, *max_kills, format.clone()).await
            }
            Commands::Kill { pid, reason, yes } => {
                command_kill(&coordinator, *pid, reason, *yes).await
            }
            Commands::Config { .. } => unreachable!("Config handled above"),
            Commands::CheckRequirements => unreachable!("CheckRequirements handled above"),
        };
    }

    // Guard mode
    let config = load_validated_config(&args)?;

    if let Err(e) = startup_checks::validate_requirements(&config.proc_root()) {
        eprintln!("❌ Startup validation failed: {}", e);
        std::process::exit(1);
    }

    let coordinator = build_coordinator(&config)?;
    let guard = coordinator.config();
    info!(
        "Guarding processes of user '{}' ({} protected names, min {:.0} MB)",
        guard.target_user,
        guard.protected_process_names.len(),
        guard.min_process_memory_mb
    );
    if !guard.enable_auto_kill {
        warn!("Auto-kill disabled: memory pressure will be recorded but nothing terminated");
    }

    coordinator.start();
    shutdown_signal().await;

    coordinator.stop();
    coordinator.wait_idle().await;

    let stats = coordinator.store().stats();
    info!(
        "Shutdown complete: {} samples, {} terminations ({} failed), ~{:.1} MB freed",
        stats.snapshots_recorded, stats.kills_total, stats.kills_failed, stats.total_freed_mb
    );

    Ok(())
}
