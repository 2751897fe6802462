//! Candidates command implementation.
//!
//! Lists the processes a remediation would choose from, largest first.

use herakles_memguard::process::FilterReason;
use herakles_memguard::{Coordinator, ProcessCandidate};

use crate::cli::OutputFormat;

/// Lists killable candidates, or every process with its filter verdict.
pub async fn command_candidates(
    coordinator: &Coordinator,
    limit: usize,
    all: bool,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = coordinator.catalog();

    let rows: Vec<(ProcessCandidate, Option<FilterReason>)> = if all {
        catalog.explain()?.into_iter().take(limit).collect()
    } else {
        catalog
            .top_n(limit)
            .into_iter()
            .map(|c| (c, None))
            .collect()
    };

    if let OutputFormat::Json = format {
        let body: Vec<_> = rows
            .iter()
            .map(|(c, reason)| {
                serde_json::json!({
                    "candidate": c,
                    "excludedBy": reason.map(|r| r.as_str()),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let settings = catalog.settings();
    println!(
        "📋 Processes of '{}' (min {:.0} MB)",
        settings.user, settings.min_memory_mb
    );
    println!("{}", "─".repeat(78));
    println!(
        "{:>8} {:>10} {:>6} {:>6} {:<5} {:<20} {}",
        "PID", "RSS MB", "%MEM", "%CPU", "STAT", "NAME", "STATUS"
    );

    for (c, reason) in &rows {
        let status = match reason {
            Some(r) => format!("excluded: {}", r.as_str()),
            None => "killable".to_string(),
        };
        println!(
            "{:>8} {:>10.1} {:>6.1} {:>6.1} {:<5} {:<20} {}",
            c.pid, c.memory_mb, c.memory_percent, c.cpu_percent, c.state, c.name, status
        );
    }

    if rows.is_empty() {
        println!("   (no processes)");
    }

    Ok(())
}
