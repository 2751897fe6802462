//! CLI command implementations for herakles-memguard.
//!
//! This module provides implementations for the one-shot subcommands:
//! - `status`: Memory snapshot and detector state
//! - `candidates`: Killable process listing
//! - `dry_run`: Remediation preview
//! - `kill`: Manual termination by PID
//! - `config`: Configuration file generation

pub mod candidates;
pub mod config;
pub mod dry_run;
pub mod kill;
pub mod status;

// Re-export command functions
pub use candidates::command_candidates;
pub use config::command_config;
pub use dry_run::command_dry_run;
pub use kill::command_kill;
pub use status::command_status;
