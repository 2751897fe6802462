//! Process enumeration through `ps`.
//!
//! The listing utility is invoked as
//! `ps -o pid=,uid=,user:64=,%mem=,%cpu=,vsz=,rss=,ppid=,state=,comm=,args= --sort=-rss`
//! and every output line is whitespace-tokenized. The trailing `args` column is
//! the remainder of the line joined back together.
//!
//! procps truncates long user names to the column width (`verylon+`), so the
//! numeric uid is carried alongside the name and used for ownership checks.

use serde::Serialize;
use std::process::Command;
use tracing::debug;

/// Column list passed to `ps -o`.
pub const PS_COLUMNS: &str = "pid=,uid=,user:64=,%mem=,%cpu=,vsz=,rss=,ppid=,state=,comm=,args=";

/// A process that may be considered for termination.
///
/// Built fresh on every query; never cached across cycles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessCandidate {
    pub pid: u32,
    /// Real owner uid.
    pub uid: u32,
    /// Owner name as printed by `ps`; may be truncated on systems without wide columns.
    pub user: String,
    /// Resident memory in MB (RSS / 1024).
    pub memory_mb: f64,
    pub memory_percent: f64,
    pub cpu_percent: f64,
    pub vsz_kb: u64,
    /// Short command name (`comm`).
    pub name: String,
    /// Full command line (`args`), or `name` when absent.
    pub command: String,
    pub ppid: u32,
    /// Process state code as reported by `ps` (e.g. `S`, `R`, `Z`).
    pub state: String,
}

impl ProcessCandidate {
    /// Zombie, stopped, traced or dead.
    pub fn is_defunct(&self) -> bool {
        matches!(
            self.state.chars().next(),
            Some('Z') | Some('T') | Some('t') | Some('X') | Some('x')
        )
    }
}

/// Errors raised while enumerating processes.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to run ps: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("ps exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },
}

/// Source of process listings.
pub trait ProcessLister: Send + Sync {
    /// All processes owned by `user`, sorted by memory descending.
    fn list_user(&self, user: &str) -> Result<Vec<ProcessCandidate>, CatalogError>;

    /// A single process regardless of owner, `None` if it does not exist.
    fn find(&self, pid: u32) -> Result<Option<ProcessCandidate>, CatalogError>;
}

/// [`ProcessLister`] backed by the `ps` binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct PsLister;

impl PsLister {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, args: &[&str]) -> Result<Option<String>, CatalogError> {
        debug!("Running ps {}", args.join(" "));
        let output = Command::new("ps").args(args).output()?;

        if output.status.success() {
            return Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()));
        }

        // ps exits 1 with empty output when nothing matches.
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if output.status.code() == Some(1) && stderr.is_empty() {
            return Ok(None);
        }

        Err(CatalogError::Failed {
            status: output.status.code().unwrap_or(-1),
            stderr,
        })
    }
}

impl ProcessLister for PsLister {
    fn list_user(&self, user: &str) -> Result<Vec<ProcessCandidate>, CatalogError> {
        let out = self.run(&["-u", user, "-o", PS_COLUMNS, "--sort=-rss"])?;
        Ok(out.map(|s| parse_ps_output(&s)).unwrap_or_default())
    }

    fn find(&self, pid: u32) -> Result<Option<ProcessCandidate>, CatalogError> {
        let pid_arg = pid.to_string();
        let out = self.run(&["-p", &pid_arg, "-o", PS_COLUMNS])?;
        Ok(out.and_then(|s| parse_ps_output(&s).into_iter().find(|c| c.pid == pid)))
    }
}

/// Parses `ps` output (no header), skipping malformed lines.
pub fn parse_ps_output(output: &str) -> Vec<ProcessCandidate> {
    output.lines().filter_map(parse_ps_line).collect()
}

/// Parses a single `ps` line with the [`PS_COLUMNS`] layout.
///
/// Format: "1234 1000 alice 3.2 0.5 812344 524288 1200 S chrome /opt/chrome/chrome --type=renderer"
pub fn parse_ps_line(line: &str) -> Option<ProcessCandidate> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 10 {
        return None;
    }

    let pid = parts[0].parse::<u32>().ok()?;
    let uid = parts[1].parse::<u32>().ok()?;
    let user = parts[2].to_string();
    let memory_percent = parts[3].parse::<f64>().unwrap_or(0.0);
    let cpu_percent = parts[4].parse::<f64>().unwrap_or(0.0);
    let vsz_kb = parts[5].parse::<u64>().unwrap_or(0);
    let rss_kb = parts[6].parse::<u64>().unwrap_or(0);
    let ppid = parts[7].parse::<u32>().unwrap_or(0);
    let state = parts[8].to_string();
    let name = parts[9].to_string();
    let command = if parts.len() > 10 {
        parts[10..].join(" ")
    } else {
        name.clone()
    };

    Some(ProcessCandidate {
        pid,
        uid,
        user,
        memory_mb: rss_kb as f64 / 1024.0,
        memory_percent,
        cpu_percent,
        vsz_kb,
        name,
        command,
        ppid,
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ps_line_full() {
        let c = parse_ps_line(
            " 4242 1000 alice  12.5  3.1 2048000 1048576  1200 S chrome /opt/google/chrome/chrome --type=renderer",
        )
        .unwrap();
        assert_eq!(c.pid, 4242);
        assert_eq!(c.uid, 1000);
        assert_eq!(c.user, "alice");
        assert_eq!(c.memory_mb, 1024.0);
        assert_eq!(c.memory_percent, 12.5);
        assert_eq!(c.cpu_percent, 3.1);
        assert_eq!(c.vsz_kb, 2_048_000);
        assert_eq!(c.ppid, 1200);
        assert_eq!(c.state, "S");
        assert_eq!(c.name, "chrome");
        assert_eq!(c.command, "/opt/google/chrome/chrome --type=renderer");
    }

    #[test]
    fn test_parse_ps_line_without_args_falls_back_to_name() {
        let c = parse_ps_line("10 1001 bob 0.0 0.0 100 200 1 Z defunct").unwrap();
        assert_eq!(c.command, "defunct");
        assert!(c.is_defunct());
    }

    #[test]
    fn test_parse_ps_line_rejects_short_or_bad_lines() {
        assert!(parse_ps_line("").is_none());
        assert!(parse_ps_line("12 1001 bob 0.0").is_none());
        assert!(parse_ps_line("abc 1001 bob 0.0 0.0 1 1 1 S x").is_none());
        assert!(parse_ps_line("12 bob 0.0 0.0 1 1 1 S x y").is_none());
    }

    #[test]
    fn test_parse_ps_output_skips_garbage() {
        let out = "1 0 a 0 0 1 2048 0 S one one\n\ngarbage\n2 0 a 0 0 1 1024 0 R two two --flag\n";
        let list = parse_ps_output(out);
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].command, "two --flag");
    }

    #[test]
    fn test_defunct_states() {
        let mut c = parse_ps_line("1 0 a 0 0 1 1 0 S x").unwrap();
        assert!(!c.is_defunct());
        for s in ["Z", "T", "t", "X", "Zs"] {
            c.state = s.to_string();
            assert!(c.is_defunct(), "state {s} should be defunct");
        }
        c.state = "Ssl".to_string();
        assert!(!c.is_defunct());
    }

    #[test]
    fn test_parse_truncated_owner_keeps_uid() {
        let c = parse_ps_line("4441 1001 verylon+ 0.0 0.0 8200 1024 4400 S sleep sleep 30").unwrap();
        assert_eq!(c.user, "verylon+");
        assert_eq!(c.uid, 1001);
        assert_eq!(c.command, "sleep 30");
    }
}
