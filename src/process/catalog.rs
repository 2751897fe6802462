//! Candidate selection under safety constraints.
//!
//! The catalog enumerates the target user's processes and runs each one through
//! an ordered filter chain. The first failing filter drops the candidate; the
//! survivors keep their memory-descending order.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::guard_config::GuardConfig;
use crate::process::lister::{CatalogError, ProcessCandidate, ProcessLister};

/// Interactive shells that are never selected.
pub const SHELL_NAMES: &[&str] = &["bash", "zsh", "fish", "sh", "dash", "ksh", "tcsh"];

/// Why a candidate was dropped by the filter chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterReason {
    BelowMinimum,
    Protected,
    SelfOrParent,
    Shell,
    Defunct,
}

impl FilterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterReason::BelowMinimum => "below-minimum",
            FilterReason::Protected => "protected",
            FilterReason::SelfOrParent => "is-self-or-parent",
            FilterReason::Shell => "shell",
            FilterReason::Defunct => "defunct",
        }
    }
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured rejection returned by [`ProcessCatalog::validate_single`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rejection {
    NotFound,
    WrongOwner { owner: String },
    Protected { entry: String },
    IsSelfOrParent,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::NotFound => "not-found",
            Rejection::WrongOwner { .. } => "wrong-owner",
            Rejection::Protected { .. } => "protected",
            Rejection::IsSelfOrParent => "is-self-or-parent",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::WrongOwner { owner } => write!(f, "wrong-owner (owned by {owner})"),
            Rejection::Protected { entry } => write!(f, "protected (matches '{entry}')"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Identity of the guard process itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelfIdentity {
    pub pid: u32,
    pub parent_pid: u32,
}

impl SelfIdentity {
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            parent_pid: nix::unistd::getppid().as_raw() as u32,
        }
    }
}

/// Settings for the filter chain.
#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub user: String,
    /// Uid of `user`; ownership is compared by uid when known.
    pub uid: Option<u32>,
    pub min_memory_mb: f64,
    pub protected_names: Vec<String>,
    pub identity: SelfIdentity,
}

impl CatalogSettings {
    pub fn from_config(config: &GuardConfig, identity: SelfIdentity) -> Self {
        Self {
            user: config.target_user.clone(),
            uid: resolve_uid(&config.target_user),
            min_memory_mb: config.min_process_memory_mb,
            protected_names: config.protected_process_names.clone(),
            identity,
        }
    }
}

/// Looks up the uid for a user name in the password database.
pub fn resolve_uid(user: &str) -> Option<u32> {
    match nix::unistd::User::from_name(user) {
        Ok(Some(u)) => Some(u.uid.as_raw()),
        Ok(None) => {
            warn!("User '{}' not found, comparing owners by name", user);
            None
        }
        Err(e) => {
            warn!("Failed to resolve user '{}': {}", user, e);
            None
        }
    }
}

/// Enumerates and filters the target user's processes.
pub struct ProcessCatalog {
    settings: CatalogSettings,
    /// Lowercased protected entries, empty ones removed.
    protected_lower: Vec<String>,
    lister: Arc<dyn ProcessLister>,
}

impl ProcessCatalog {
    pub fn new(settings: CatalogSettings, lister: Arc<dyn ProcessLister>) -> Self {
        let protected_lower = settings
            .protected_names
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            settings,
            protected_lower,
            lister,
        }
    }

    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    /// All processes of the target user, memory descending.
    ///
    /// Ties keep enumeration order.
    pub fn list_all(&self) -> Result<Vec<ProcessCandidate>, CatalogError> {
        let mut all = self.lister.list_user(&self.settings.user)?;
        all.sort_by(|a, b| b.memory_mb.total_cmp(&a.memory_mb));
        Ok(all)
    }

    /// Candidates that pass the full filter chain, memory descending.
    ///
    /// An enumeration failure yields an empty set.
    pub fn list_killable(&self) -> Vec<ProcessCandidate> {
        match self.list_all() {
            Ok(all) => all
                .into_iter()
                .filter(|c| match self.filter_reason(c) {
                    Some(reason) => {
                        debug!("Skipping pid {} ({}): {}", c.pid, c.name, reason);
                        false
                    }
                    None => true,
                })
                .collect(),
            Err(e) => {
                warn!("Process enumeration failed, treating as nothing to kill: {}", e);
                Vec::new()
            }
        }
    }

    /// Every process of the user together with the filter that dropped it, if any.
    pub fn explain(&self) -> Result<Vec<(ProcessCandidate, Option<FilterReason>)>, CatalogError> {
        Ok(self
            .list_all()?
            .into_iter()
            .map(|c| {
                let reason = self.filter_reason(&c);
                (c, reason)
            })
            .collect())
    }

    /// Prefix of [`list_killable`](Self::list_killable).
    pub fn top_n(&self, limit: usize) -> Vec<ProcessCandidate> {
        let mut killable = self.list_killable();
        killable.truncate(limit);
        killable
    }

    /// Re-resolves a single pid and applies the protection and self checks only.
    pub fn validate_single(&self, pid: u32) -> Result<ProcessCandidate, Rejection> {
        let candidate = match self.lister.find(pid) {
            Ok(Some(c)) => c,
            Ok(None) => return Err(Rejection::NotFound),
            Err(e) => {
                warn!("Failed to resolve pid {}: {}", pid, e);
                return Err(Rejection::NotFound);
            }
        };

        if !self.is_owned(&candidate) {
            return Err(Rejection::WrongOwner {
                owner: candidate.user,
            });
        }
        if let Some(entry) = self.protected_match(&candidate) {
            return Err(Rejection::Protected {
                entry: entry.to_string(),
            });
        }
        if self.is_self_or_parent(&candidate) {
            return Err(Rejection::IsSelfOrParent);
        }

        Ok(candidate)
    }

    /// Runs the ordered filter chain, returning the first filter that drops `c`.
    pub fn filter_reason(&self, c: &ProcessCandidate) -> Option<FilterReason> {
        if c.memory_mb < self.settings.min_memory_mb {
            return Some(FilterReason::BelowMinimum);
        }
        if self.protected_match(c).is_some() {
            return Some(FilterReason::Protected);
        }
        if self.is_self_or_parent(c) {
            return Some(FilterReason::SelfOrParent);
        }
        if self.is_shell(c) {
            return Some(FilterReason::Shell);
        }
        if c.is_defunct() {
            return Some(FilterReason::Defunct);
        }
        None
    }

    /// First protected entry contained (case-insensitively) in the name or command line.
    fn protected_match(&self, c: &ProcessCandidate) -> Option<&str> {
        let name = c.name.to_lowercase();
        let command = c.command.to_lowercase();
        self.protected_lower
            .iter()
            .find(|p| name.contains(p.as_str()) || command.contains(p.as_str()))
            .map(|p| p.as_str())
    }

    /// `ps` may print a truncated owner name, so the uid wins when available.
    fn is_owned(&self, c: &ProcessCandidate) -> bool {
        match self.settings.uid {
            Some(uid) => c.uid == uid,
            None => c.user == self.settings.user,
        }
    }

    fn is_self_or_parent(&self, c: &ProcessCandidate) -> bool {
        let id = self.settings.identity;
        c.pid == id.pid || c.pid == id.parent_pid
    }

    /// Siblings of the guard (same parent) and known shells.
    fn is_shell(&self, c: &ProcessCandidate) -> bool {
        c.ppid == self.settings.identity.parent_pid || SHELL_NAMES.contains(&c.name.as_str())
    }
}
