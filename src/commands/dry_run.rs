//! Dry-run command implementation.
//!
//! Shows what the next remediation would terminate without sending signals.

use herakles_memguard::Coordinator;

use crate::cli::OutputFormat;

/// Prints the remediation plan.
pub async fn command_dry_run(
    coordinator: &Coordinator,
    max_kills: usize,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let plan = coordinator.dry_run_preview(max_kills).await;

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("🧪 Dry run (no signals sent, max {} processes)", max_kills);
    println!("================================================");

    if plan.targets.is_empty() {
        println!("\n   No killable process found");
        return Ok(());
    }

    for (i, target) in plan.targets.iter().enumerate() {
        println!(
            "   {}. {} (PID: {}) - {:.1} MB",
            i + 1,
            target.name,
            target.pid,
            target.memory_mb
        );
    }
    println!(
        "\n📉 Estimated memory freed: {:.1} MB",
        plan.estimated_memory_mb
    );

    Ok(())
}
