//! modlink loopback host: entry point.
//!
//! Runs one complete host↔module session inside a single process.  A demo
//! module is bound to one end of an in-memory channel and driven through every
//! operation from the other end; a device-list change is then relayed to a
//! client mirror.  Useful as a smoke test of the whole stack and as a worked
//! example of wiring it together.
//!
//! # Usage
//!
//! ```text
//! modlink-loopback [OPTIONS]
//!
//! Options:
//!   --config          <PATH>  TOML config file [default: modlink.toml]
//!   --log-level       <LVL>   Log level when RUST_LOG is unset
//!   --call-timeout-ms <MS>    Reply timeout for host calls (0 = wait forever)
//!   --label           <NAME>  Label passed to the module's init
//!   --seed-file       <PATH>  JSON file with the initial device list
//!   --save-config             Write the effective config back and exit
//! ```
//!
//! # Environment variable overrides
//!
//! CLI args take precedence when both are present.  Values not given either
//! way come from the config file, then from built-in defaults.
//!
//! | Variable                  | Description                      |
//! |---------------------------|----------------------------------|
//! | `MODLINK_CONFIG`          | Config file path                 |
//! | `MODLINK_LOG_LEVEL`       | Log level                        |
//! | `MODLINK_CALL_TIMEOUT_MS` | Reply timeout in milliseconds    |
//! | `MODLINK_LABEL`           | Module label                     |
//! | `MODLINK_SEED_FILE`       | Device list seed file            |

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use modlink_host::domain::{load_config_from, save_config_to, HostConfig};
use modlink_host::infrastructure::run_loopback;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// In-process modlink host driving a demo module.
#[derive(Debug, Parser)]
#[command(
    name = "modlink-loopback",
    about = "Runs a host and a demo module over an in-memory modlink channel",
    version
)]
struct Cli {
    /// Path of the TOML config file.  A missing file means all defaults.
    #[arg(long, default_value = "modlink.toml", env = "MODLINK_CONFIG")]
    config: PathBuf,

    /// Log level used when `RUST_LOG` is not set (e.g. `debug`).
    #[arg(long, env = "MODLINK_LOG_LEVEL")]
    log_level: Option<String>,

    /// How long the host waits for each reply, in milliseconds.
    #[arg(long, env = "MODLINK_CALL_TIMEOUT_MS")]
    call_timeout_ms: Option<u64>,

    /// Label handed to the module in `init`.
    #[arg(long, env = "MODLINK_LABEL")]
    label: Option<String>,

    /// JSON file holding the initial device list.
    #[arg(long, env = "MODLINK_SEED_FILE")]
    seed_file: Option<PathBuf>,

    /// Write the effective configuration to `--config` and exit.
    #[arg(long)]
    save_config: bool,
}

impl Cli {
    /// Loads the config file and applies the command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed.
    fn into_host_config(&self) -> anyhow::Result<HostConfig> {
        let mut config = load_config_from(&self.config)
            .with_context(|| format!("loading config from {}", self.config.display()))?;
        self.apply_overrides(&mut config);
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut HostConfig) {
        if let Some(level) = &self.log_level {
            config.host.log_level = level.clone();
        }
        if let Some(ms) = self.call_timeout_ms {
            config.channel.call_timeout_ms = ms;
        }
        if let Some(label) = &self.label {
            config.host.module_label = label.clone();
        }
        if let Some(seed) = &self.seed_file {
            config.surfaces.seed_file = Some(seed.clone());
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and merged over the config file.
/// 2. `tracing_subscriber` is initialised.  `RUST_LOG` wins; otherwise the
///    configured log level applies.
/// 3. Either the effective config is saved (`--save-config`) or
///    [`run_loopback`] runs one session and its outcome is logged.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.into_host_config()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.host.log_level)),
        )
        .init();

    if cli.save_config {
        save_config_to(&cli.config, &config)
            .with_context(|| format!("saving config to {}", cli.config.display()))?;
        info!("config written to {}", cli.config.display());
        return Ok(());
    }

    info!(
        label = %config.host.module_label,
        timeout_ms = config.channel.call_timeout_ms,
        "modlink loopback starting"
    );

    let report = run_loopback(config).await?;

    info!(
        fields = report.fields.len(),
        visible = ?report.visible_fields,
        updates = report.updates_relayed,
        devices = report.devices.len(),
        "modlink loopback finished"
    );
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        // Arrange / Act: parse with no arguments (all defaults apply)
        let cli = Cli::parse_from(["modlink-loopback"]);

        // Assert
        assert_eq!(cli.config, PathBuf::from("modlink.toml"));
        assert_eq!(cli.log_level, None);
        assert_eq!(cli.call_timeout_ms, None);
        assert!(!cli.save_config);
    }

    #[test]
    fn test_cli_call_timeout_override() {
        let cli = Cli::parse_from(["modlink-loopback", "--call-timeout-ms", "250"]);
        assert_eq!(cli.call_timeout_ms, Some(250));
    }

    #[test]
    fn test_cli_rejects_non_numeric_timeout() {
        let result = Cli::try_parse_from(["modlink-loopback", "--call-timeout-ms", "soon"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_replace_only_given_values() {
        // Arrange
        let cli = Cli::parse_from([
            "modlink-loopback",
            "--log-level",
            "debug",
            "--label",
            "desk",
        ]);
        let mut config = HostConfig::default();

        // Act
        cli.apply_overrides(&mut config);

        // Assert
        assert_eq!(config.host.log_level, "debug");
        assert_eq!(config.host.module_label, "desk");
        assert_eq!(config.channel.call_timeout_ms, 5000);
        assert_eq!(config.surfaces.seed_file, None);
    }

    #[test]
    fn test_into_host_config_with_missing_file_uses_defaults() {
        let cli = Cli::parse_from([
            "modlink-loopback",
            "--config",
            "/nonexistent/modlink/modlink.toml",
            "--call-timeout-ms",
            "0",
        ]);

        let config = cli.into_host_config().unwrap();

        assert_eq!(config.call_timeout(), None);
        assert_eq!(config.host.log_level, "info");
    }

    #[test]
    fn test_into_host_config_reports_bad_toml() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("modlink_cli_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.toml");
        std::fs::write(&path, "[[[ not toml").unwrap();
        let cli = Cli::parse_from(["modlink-loopback", "--config", path.to_str().unwrap()]);

        // Act
        let err = cli.into_host_config().unwrap_err();

        // Assert
        assert!(err.to_string().starts_with("loading config from"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
