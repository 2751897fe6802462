//! Configuration management for herakles-memguard.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat};
use herakles_memguard::guard_config::{GuardConfig, DEFAULT_PROTECTED_NAMES};
use nix::unistd::{geteuid, User};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// Default configuration constants
pub const DEFAULT_THRESHOLD: f64 = 90.0;
pub const DEFAULT_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_COOLDOWN_BASE_MS: u64 = 60_000;
pub const DEFAULT_MIN_MEMORY_MB: f64 = 100.0;
pub const DEFAULT_WEBHOOK_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_HISTORY_LIMIT: usize = 500;
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Smallest accepted sampling interval.
pub const MIN_INTERVAL_MS: u64 = 500;

/// Effective configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Detection
    pub threshold: Option<f64>,
    #[serde(alias = "monitor-interval-ms", alias = "monitorIntervalMs")]
    pub monitor_interval_ms: Option<u64>,
    #[serde(alias = "cooldown-base-ms", alias = "cooldownBaseMs")]
    pub cooldown_base_ms: Option<u64>,

    // Remediation
    #[serde(alias = "enable-auto-kill", alias = "enableAutoKill")]
    pub enable_auto_kill: Option<bool>,
    #[serde(alias = "protected-process-names", alias = "protectedProcessNames")]
    pub protected_process_names: Option<Vec<String>>,
    #[serde(alias = "min-process-memory-mb", alias = "minProcessMemoryMb")]
    pub min_process_memory_mb: Option<f64>,
    /// User whose processes are managed; None = effective user
    #[serde(alias = "target-user")]
    pub target_user: Option<String>,

    // Notification
    #[serde(alias = "webhook-url", alias = "webhookUrl")]
    pub webhook_url: Option<String>,
    #[serde(alias = "webhook-timeout-ms")]
    pub webhook_timeout_ms: Option<u64>,

    // Internals
    #[serde(alias = "history-limit")]
    pub history_limit: Option<usize>,
    #[serde(alias = "proc-root")]
    pub proc_root: Option<PathBuf>,

    // Logging
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: Some(DEFAULT_THRESHOLD),
            monitor_interval_ms: Some(DEFAULT_INTERVAL_MS),
            cooldown_base_ms: Some(DEFAULT_COOLDOWN_BASE_MS),
            enable_auto_kill: Some(true),
            protected_process_names: Some(
                DEFAULT_PROTECTED_NAMES.iter().map(|s| s.to_string()).collect(),
            ),
            min_process_memory_mb: Some(DEFAULT_MIN_MEMORY_MB),
            target_user: None,
            webhook_url: None,
            webhook_timeout_ms: Some(DEFAULT_WEBHOOK_TIMEOUT_MS),
            history_limit: Some(DEFAULT_HISTORY_LIMIT),
            proc_root: Some(PathBuf::from(DEFAULT_PROC_ROOT)),
            log_level: Some("info".into()),
        }
    }
}

impl Config {
    /// Converts to the settings consumed by the remediation core.
    pub fn guard_config(&self) -> GuardConfig {
        let defaults = GuardConfig::default();
        GuardConfig {
            threshold: self.threshold.unwrap_or(defaults.threshold),
            monitor_interval_ms: self
                .monitor_interval_ms
                .unwrap_or(defaults.monitor_interval_ms),
            cooldown_base_ms: self.cooldown_base_ms.unwrap_or(defaults.cooldown_base_ms),
            enable_auto_kill: self.enable_auto_kill.unwrap_or(defaults.enable_auto_kill),
            protected_process_names: self
                .protected_process_names
                .clone()
                .unwrap_or(defaults.protected_process_names),
            min_process_memory_mb: self
                .min_process_memory_mb
                .unwrap_or(defaults.min_process_memory_mb),
            target_user: self.target_user.clone().unwrap_or_else(current_username),
        }
    }

    pub fn proc_root(&self) -> PathBuf {
        self.proc_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_ROOT))
    }
}

/// Name of the effective user, falling back to $USER and then the numeric uid.
pub fn current_username() -> String {
    let uid = geteuid();
    match User::from_uid(uid) {
        Ok(Some(user)) => user.name,
        Ok(None) | Err(_) => {
            warn!("Could not resolve user name for uid {}", uid);
            std::env::var("USER").unwrap_or_else(|_| uid.to_string())
        }
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let threshold = cfg.threshold.unwrap_or(DEFAULT_THRESHOLD);
    if !(threshold > 0.0 && threshold <= 100.0) {
        return Err(format!("threshold must be in (0, 100], got {}", threshold).into());
    }

    let interval = cfg.monitor_interval_ms.unwrap_or(DEFAULT_INTERVAL_MS);
    if interval < MIN_INTERVAL_MS {
        return Err(format!(
            "monitor_interval_ms must be at least {}, got {}",
            MIN_INTERVAL_MS, interval
        )
        .into());
    }

    if cfg.cooldown_base_ms == Some(0) {
        return Err("cooldown_base_ms must be greater than 0".into());
    }

    if let Some(min_mb) = cfg.min_process_memory_mb {
        if min_mb < 0.0 || !min_mb.is_finite() {
            return Err(format!("min_process_memory_mb must be >= 0, got {}", min_mb).into());
        }
    }

    if let Some(names) = &cfg.protected_process_names {
        if names.iter().any(|n| n.trim().is_empty()) {
            // An empty entry would be contained in every command line.
            return Err("protected_process_names must not contain empty entries".into());
        }
    }

    if let Some(url) = cfg.webhook_url.as_deref() {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(format!("webhook_url must be an http(s) URL, got '{}'", url).into());
        }
    }

    if cfg.history_limit == Some(0) {
        return Err("history_limit must be greater than 0".into());
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(threshold) = args.threshold {
        config.threshold = Some(threshold);
    }
    if let Some(interval) = args.interval_ms {
        config.monitor_interval_ms = Some(interval);
    }
    if let Some(cooldown) = args.cooldown_base_ms {
        config.cooldown_base_ms = Some(cooldown);
    }
    if args.no_auto_kill {
        config.enable_auto_kill = Some(false);
    }
    if let Some(min_mb) = args.min_memory_mb {
        config.min_process_memory_mb = Some(min_mb);
    }
    if let Some(user) = &args.user {
        config.target_user = Some(user.clone());
    }
    if let Some(url) = &args.webhook_url {
        config.webhook_url = Some(url.clone());
    }
    if let Some(root) = &args.proc_root {
        config.proc_root = Some(root.clone());
    }

    // Extra protected names extend the configured list
    if let Some(protect_str) = &args.protect {
        let names = config.protected_process_names.get_or_insert_with(Vec::new);
        names.extend(
            protect_str
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        );
    }

    Ok(config)
}

/// Configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            // Try default locations
            let defaults = [
                "/etc/herakles/memguard.yaml",
                "/etc/herakles/memguard.yml",
                "/etc/herakles/memguard.json",
                "./herakles-memguard.yaml",
                "./herakles-memguard.yml",
                "./herakles-memguard.json",
            ];

            match defaults.iter().find(|p| Path::new(p).exists()) {
                Some(p) => PathBuf::from(p),
                None => return Ok(Config::default()),
            }
        }
    };

    if !path.exists() {
        return Err(format!("Config file not found: {}", path.display()).into());
    }

    let content = fs::read_to_string(&path)?;
    let config = parse_config(&content, path.extension().and_then(|s| s.to_str()))?;
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// Parses configuration content; the extension selects the format (YAML by default).
pub fn parse_config(
    content: &str,
    extension: Option<&str>,
) -> Result<Config, Box<dyn std::error::Error>> {
    let config = match extension {
        Some("json") => serde_json::from_str(content)?,
        Some("toml") => toml::from_str(content)?,
        _ => serde_yaml::from_str(content)?,
    };
    Ok(config)
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };

    println!("{output}");
    Ok(())
}
