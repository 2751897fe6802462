//! Status command implementation.
//!
//! Samples memory once and prints the snapshot with the detector state.

use herakles_memguard::Coordinator;

use crate::cli::OutputFormat;

/// Prints a single memory snapshot and the detector status.
pub async fn command_status(
    coordinator: &Coordinator,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = coordinator.sample_now()?;
    let status = coordinator.get_status();
    let config = coordinator.config();

    if let OutputFormat::Json = format {
        let body = serde_json::json!({
            "snapshot": snapshot,
            "detector": status.detector,
            "autoKillEnabled": status.auto_kill_enabled,
            "targetUser": config.target_user,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("🧠 Herakles Memory Guard - Status");
    println!("=================================");

    println!("\n💾 Memory:");
    println!(
        "   ├─ Used: {:.0} / {:.0} MB ({:.1}%)",
        snapshot.used_mb, snapshot.total_mb, snapshot.percent
    );
    println!("   ├─ Available: {:.0} MB", snapshot.available_mb);
    println!(
        "   ├─ Buffers/Cached: {:.0} / {:.0} MB",
        snapshot.buffers_mb, snapshot.cached_mb
    );
    println!(
        "   ├─ Swap: {:.0} / {:.0} MB ({:.1}%)",
        snapshot.swap_used_mb, snapshot.swap_total_mb, snapshot.swap_percent
    );
    println!(
        "   ├─ Load: {:.2} {:.2} {:.2}",
        snapshot.load.one_min, snapshot.load.five_min, snapshot.load.fifteen_min
    );
    println!("   └─ Uptime: {:.0}s", snapshot.uptime_seconds);

    let detector = &status.detector;
    let state = if snapshot.percent > detector.threshold {
        "⚠️  above threshold"
    } else {
        "✅ below threshold"
    };

    println!("\n🔎 Detector:");
    println!("   ├─ Threshold: {:.1}% ({})", detector.threshold, state);
    println!(
        "   ├─ Confirmation: {} consecutive samples at {} ms",
        detector.required_consecutive, config.monitor_interval_ms
    );
    println!("   ├─ Cooldown multiplier: {}x", detector.multiplier);
    println!(
        "   ├─ Auto-kill: {}",
        if status.auto_kill_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("   └─ Target user: {}", config.target_user);

    Ok(())
}
