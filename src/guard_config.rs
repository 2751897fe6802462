//! Configuration types consumed by the remediation core.
//!
//! These are the already-resolved values the detector, catalog, executor and
//! coordinator work with. File parsing and CLI merging live in the binary.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Process names that are never terminated, matched case-insensitively as substrings
/// of the command name or the full command line.
pub const DEFAULT_PROTECTED_NAMES: &[&str] = &[
    "systemd",
    "init",
    "sshd",
    "dbus-daemon",
    "Xorg",
    "Xwayland",
    "gnome-shell",
    "kwin",
    "plasmashell",
    "pipewire",
    "pulseaudio",
    "herakles-memguard",
];

/// Settings for the remediation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Memory-used percentage above which breaches are counted (0-100).
    pub threshold: f64,
    /// Sampling interval of the coordinator loop.
    pub monitor_interval_ms: u64,
    /// Base cooldown applied after the first trigger.
    pub cooldown_base_ms: u64,
    /// When false, detection still runs and is recorded but nothing is terminated.
    pub enable_auto_kill: bool,
    /// Case-insensitive substring protection list.
    pub protected_process_names: Vec<String>,
    /// Candidates holding less resident memory than this are never selected.
    pub min_process_memory_mb: f64,
    /// User whose processes are enumerated.
    pub target_user: String,
}

impl GuardConfig {
    /// Sampling interval as a `Duration`.
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    /// Cooldown base as a `Duration`.
    pub fn cooldown_base(&self) -> Duration {
        Duration::from_millis(self.cooldown_base_ms)
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            threshold: 90.0,
            monitor_interval_ms: 5000,
            cooldown_base_ms: 60_000,
            enable_auto_kill: true,
            protected_process_names: DEFAULT_PROTECTED_NAMES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            min_process_memory_mb: 100.0,
            target_user: String::new(),
        }
    }
}
