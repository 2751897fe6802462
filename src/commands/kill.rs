//! Kill command implementation.
//!
//! Terminates a single process by PID after the same protection checks as
//! automatic remediation.

use std::io::{self, Write};

use herakles_memguard::{Coordinator, KillByPidError};

/// Terminates one process, asking for confirmation unless `skip_confirm`.
pub async fn command_kill(
    coordinator: &Coordinator,
    pid: u32,
    reason: &str,
    skip_confirm: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    // Validate before prompting so the prompt shows what will be hit
    let candidate = match coordinator.catalog().validate_single(pid) {
        Ok(c) => c,
        Err(rejection) => {
            eprintln!("❌ Refusing to terminate PID {}: {}", pid, rejection);
            std::process::exit(1);
        }
    };

    if !skip_confirm {
        println!(
            "⚠️  Terminate {} (PID: {}, {:.1} MB, user {})? (yes/no): ",
            candidate.name, candidate.pid, candidate.memory_mb, candidate.user
        );

        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input != "yes" && input != "y" {
            println!("❌ Cancelled.");
            return Ok(());
        }
    }

    match coordinator.kill_by_pid(pid, reason).await {
        Ok(outcome) if outcome.success => {
            println!(
                "✅ Terminated {} (PID: {}) with {} after {} attempt(s), ~{:.1} MB freed",
                outcome.name, outcome.pid, outcome.signal, outcome.attempts, outcome.memory_mb
            );
            Ok(())
        }
        Ok(outcome) => {
            eprintln!(
                "❌ Failed to terminate {} (PID: {}): {}",
                outcome.name,
                outcome.pid,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
            std::process::exit(1);
        }
        Err(KillByPidError::Rejected(rejection)) => {
            eprintln!("❌ Refusing to terminate PID {}: {}", pid, rejection);
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
