//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::Config;

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = match output {
        Some(path) => path,
        None => PathBuf::from("herakles-memguard.yaml"),
    };

    let content = render_config(&config, format, commented)?;

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Serializes a config; comments are only added to YAML output.
fn render_config(
    config: &Config,
    format: ConfigFormat,
    commented: bool,
) -> Result<String, Box<dyn std::error::Error>> {
    let content = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => {
            let mut content = serde_yaml::to_string(config)?;
            if commented {
                content = add_config_comments(content);
            }
            content
        }
    };
    Ok(content)
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Herakles Memory Guard Configuration
# ===================================
#
# Detection
# ---------
# threshold: 90.0              # RAM used percent that counts as a breach (0-100]
# monitor_interval_ms: 5000    # Sampling interval (>= 500). Also selects how many
#                              # consecutive breaches are required:
#                              #   < 3000 ms -> 5, < 7000 ms -> 3, otherwise 2
# cooldown_base_ms: 60000      # Base cooldown after a remediation; doubles per
#                              # trigger up to 8x, capped at 30 minutes, +/-10% jitter
#
# Remediation
# -----------
# enable_auto_kill: true       # false = record pressure events but never terminate
# protected_process_names:     # Case-insensitive substring match on name/command line
#   - systemd
# min_process_memory_mb: 100   # Smaller processes are never candidates
# target_user: null            # Whose processes are managed (null = current user)
#
# Notification
# ------------
# webhook_url: null            # POSTed {event, ramPercent, freedMemoryMb, timestamp}
# webhook_timeout_ms: 5000
#
# Internals
# ---------
# history_limit: 500           # Snapshots/kills/events kept in memory
# proc_root: "/proc"
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
"#;

    format!("{comments}\n{yaml}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn test_commented_yaml_parses_back() {
        let content = render_config(&Config::default(), ConfigFormat::Yaml, true).unwrap();
        assert!(content.starts_with("# Herakles Memory Guard Configuration"));

        let parsed = parse_config(&content, Some("yaml")).unwrap();
        assert_eq!(parsed.threshold, Some(90.0));
        assert_eq!(parsed.monitor_interval_ms, Some(5000));
    }

    #[test]
    fn test_json_output_parses_back() {
        let content = render_config(&Config::default(), ConfigFormat::Json, false).unwrap();
        let parsed = parse_config(&content, Some("json")).unwrap();
        assert_eq!(parsed.cooldown_base_ms, Some(60_000));
    }
}
