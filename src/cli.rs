//! CLI arguments and subcommands for herakles-memguard.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Output format for one-shot commands
#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-memguard",
    about = "Memory pressure guard that terminates runaway user processes",
    long_about = "Memory pressure guard that terminates runaway user processes.\n\n\
                  Samples RAM usage from /proc and, once usage stays above the configured \
                  threshold for several consecutive samples, terminates the largest killable \
                  process of the target user with SIGTERM, escalating to SIGKILL if needed. \
                  Protected processes, shells and the guard itself are never touched.",
    author = "Michael Moll <exporter@herakles.now> - Herakles",
    version = "0.1.0",
    propagate_version = true,
    after_help = "Project: https://github.com/cansp-dev/herakles-memguard | More info: https://www.herakles.now | Support: exporter@herakles.now"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Memory-used percentage that counts as a breach
    #[arg(short = 't', long)]
    pub threshold: Option<f64>,

    /// Sampling interval in milliseconds
    #[arg(short = 'i', long)]
    pub interval_ms: Option<u64>,

    /// Base cooldown after a remediation, in milliseconds
    #[arg(long)]
    pub cooldown_base_ms: Option<u64>,

    /// Detect and record pressure but never terminate anything
    #[arg(long)]
    pub no_auto_kill: bool,

    /// Additional protected process names (comma-separated, substring match)
    #[arg(long)]
    pub protect: Option<String>,

    /// Minimum resident memory (MB) for a process to be a candidate
    #[arg(long)]
    pub min_memory_mb: Option<f64>,

    /// User whose processes are managed (default: current user)
    #[arg(short = 'u', long)]
    pub user: Option<String>,

    /// Webhook URL notified after each remediation
    #[arg(long)]
    pub webhook_url: Option<String>,

    /// Alternative /proc root (testing)
    #[arg(long)]
    pub proc_root: Option<PathBuf>,
}

/// Subcommands for one-shot operations
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sample memory once and print the snapshot and detector settings
    Status {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List killable candidates in selection order
    Candidates {
        /// Maximum number of candidates to show
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,

        /// Show every process of the user with the filter that excluded it
        #[arg(long)]
        all: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show which processes a remediation would terminate, without signalling
    DryRun {
        /// Maximum number of processes in the plan
        #[arg(short = 'm', long, default_value_t = 1)]
        max_kills: usize,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Terminate a single process by PID (SIGTERM, then SIGKILL)
    Kill {
        /// Target process ID
        pid: u32,

        /// Reason recorded with the outcome
        #[arg(short = 'r', long, default_value = "manual")]
        reason: String,

        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Check runtime requirements and permissions
    CheckRequirements,
}
