//! Startup requirement validation for herakles-memguard.
//!
//! This module validates that the guard can sample memory, list processes and
//! signal them before the loop starts.

use nix::unistd::geteuid;
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::{debug, error, info, warn};

/// Validate all runtime requirements
pub fn validate_requirements(proc_root: &Path) -> Result<(), ValidationError> {
    info!("🔍 Validating runtime requirements...");

    check_user_privileges();
    check_meminfo(proc_root)?;
    check_ps_available()?;

    info!("✅ All runtime requirements validated");
    Ok(())
}

/// Check which processes we will be able to signal
fn check_user_privileges() {
    if geteuid().is_root() {
        warn!("⚠️  Running as root - the guard can signal processes of any user");
        warn!("   Recommendation: run as the user whose processes should be guarded");
    } else {
        info!("✅ Running as uid={}", geteuid());
    }
}

/// Check that meminfo is readable and parseable
fn check_meminfo(proc_root: &Path) -> Result<(), ValidationError> {
    let path = proc_root.join("meminfo");

    match fs::read_to_string(&path) {
        Ok(content) if content.contains("MemTotal:") => {
            info!("✅ {} readable", path.display());
            Ok(())
        }
        Ok(_) => {
            error!("❌ {} does not contain MemTotal", path.display());
            Err(ValidationError::MeminfoUnavailable(format!(
                "{}: missing MemTotal",
                path.display()
            )))
        }
        Err(e) => {
            error!("❌ Cannot read {}: {}", path.display(), e);
            Err(ValidationError::MeminfoUnavailable(format!(
                "{}: {}",
                path.display(),
                e
            )))
        }
    }
}

/// Check that `ps` can be executed
fn check_ps_available() -> Result<(), ValidationError> {
    debug!("Checking ps availability...");

    match Command::new("ps").args(["-o", "pid=", "-p", "1"]).output() {
        Ok(output) if output.status.success() => {
            info!("✅ ps available");
            Ok(())
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("❌ ps exited with {}: {}", output.status, stderr.trim());
            Err(ValidationError::PsUnavailable(stderr.trim().to_string()))
        }
        Err(e) => {
            error!("❌ Cannot execute ps: {}", e);
            error!("   Solution: install procps (apt install procps / dnf install procps-ng)");
            Err(ValidationError::PsUnavailable(e.to_string()))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Memory statistics unavailable: {0}")]
    MeminfoUnavailable(String),

    #[error("Process listing unavailable: {0}")]
    PsUnavailable(String),
}
