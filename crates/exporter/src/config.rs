//! Exporter configuration
//!
//! Settings are layered: built-in defaults, an optional config file,
//! `VMWAREGUEST_*` environment variables, then command-line flags.

use anyhow::{bail, Context, Result};
use clap::Parser;
use exporter_lib::RefreshFailurePolicy;
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_LISTEN_ADDRESS: &str = ":9263";
pub const DEFAULT_TELEMETRY_PATH: &str = "/metrics";
const ENV_PREFIX: &str = "VMWAREGUEST";

/// Prometheus exporter for VMware guest statistics
#[derive(Debug, Default, Parser)]
#[command(name = "vmwareguest-exporter")]
#[command(author, version, long_about = None)]
pub struct Cli {
    /// Address on which to expose metrics and web interface.
    #[arg(long = "web.listen-address", value_name = "ADDR")]
    pub listen_address: Option<String>,

    /// Path under which to expose metrics.
    #[arg(long = "web.telemetry-path", value_name = "PATH")]
    pub telemetry_path: Option<String>,

    /// Explicit path to libvmGuestLib.so
    #[arg(long = "guestlib.path", value_name = "FILE")]
    pub guestlib_path: Option<PathBuf>,

    /// What to do when refreshing guest statistics fails: exit or skip
    #[arg(long = "collector.refresh-failure", value_name = "POLICY")]
    pub refresh_failure: Option<String>,

    /// Optional configuration file (toml, yaml or json)
    #[arg(long = "config.file", value_name = "FILE")]
    pub config_file: Option<PathBuf>,
}

/// Resolved exporter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    pub listen_address: String,
    pub telemetry_path: String,
    #[serde(default)]
    pub guestlib_path: Option<PathBuf>,
    pub refresh_failure: RefreshFailurePolicy,
}

impl ExporterConfig {
    /// Load configuration from defaults, file, environment and flags
    pub fn load(cli: &Cli) -> Result<Self> {
        Self::load_with_env_prefix(cli, ENV_PREFIX)
    }

    fn load_with_env_prefix(cli: &Cli, env_prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("listen_address", DEFAULT_LISTEN_ADDRESS)?
            .set_default("telemetry_path", DEFAULT_TELEMETRY_PATH)?
            .set_default("refresh_failure", "exit")?;

        if let Some(path) = &cli.config_file {
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }

        let config = builder
            .add_source(config::Environment::with_prefix(env_prefix))
            .set_override_option("listen_address", cli.listen_address.clone())?
            .set_override_option("telemetry_path", cli.telemetry_path.clone())?
            .set_override_option(
                "guestlib_path",
                cli.guestlib_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
            )?
            .set_override_option("refresh_failure", cli.refresh_failure.clone())?
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to parse configuration")?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.telemetry_path.starts_with('/') {
            bail!(
                "telemetry path '{}' must start with '/'",
                self.telemetry_path
            );
        }
        if self.telemetry_path == "/" || self.telemetry_path == "/healthz" {
            bail!(
                "telemetry path '{}' collides with a built-in route",
                self.telemetry_path
            );
        }
        self.bind_address()?;
        Ok(())
    }

    /// Socket address to bind; `:port` listens on all interfaces
    pub fn bind_address(&self) -> Result<String> {
        let (host, port) = self
            .listen_address
            .rsplit_once(':')
            .with_context(|| format!("listen address '{}' has no port", self.listen_address))?;
        let port: u16 = port
            .parse()
            .with_context(|| format!("invalid port in listen address '{}'", self.listen_address))?;
        let host = if host.is_empty() { "0.0.0.0" } else { host };

        Ok(format!("{}:{}", host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load(cli: &Cli) -> Result<ExporterConfig> {
        // Unused prefix keeps the process environment out of these tests
        ExporterConfig::load_with_env_prefix(cli, "VMWAREGUEST_TEST_UNSET")
    }

    #[test]
    fn test_defaults() {
        let config = load(&Cli::default()).unwrap();
        assert_eq!(config.listen_address, ":9263");
        assert_eq!(config.telemetry_path, "/metrics");
        assert_eq!(config.guestlib_path, None);
        assert_eq!(config.refresh_failure, RefreshFailurePolicy::Exit);
        assert_eq!(config.bind_address().unwrap(), "0.0.0.0:9263");
    }

    #[test]
    fn test_flags_parse() {
        let cli = Cli::try_parse_from([
            "vmwareguest-exporter",
            "--web.listen-address",
            "127.0.0.1:9100",
            "--web.telemetry-path=/guest",
            "--collector.refresh-failure",
            "skip",
        ])
        .unwrap();
        let config = load(&cli).unwrap();

        assert_eq!(config.bind_address().unwrap(), "127.0.0.1:9100");
        assert_eq!(config.telemetry_path, "/guest");
        assert_eq!(config.refresh_failure, RefreshFailurePolicy::SkipScrape);
    }

    #[test]
    fn test_file_then_flags() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "listen_address = \":9999\"\ntelemetry_path = \"/from-file\"\nguestlib_path = \"/opt/lib/libvmGuestLib.so\""
        )
        .unwrap();

        let cli = Cli {
            config_file: Some(file.path().to_path_buf()),
            telemetry_path: Some("/from-flag".to_string()),
            ..Default::default()
        };
        let config = load(&cli).unwrap();

        assert_eq!(config.listen_address, ":9999");
        assert_eq!(config.telemetry_path, "/from-flag");
        assert_eq!(
            config.guestlib_path,
            Some(PathBuf::from("/opt/lib/libvmGuestLib.so"))
        );
    }

    #[test]
    fn test_refresh_failure_from_file() {
        for (value, expected) in [
            ("exit", RefreshFailurePolicy::Exit),
            ("skip", RefreshFailurePolicy::SkipScrape),
            ("skip-scrape", RefreshFailurePolicy::SkipScrape),
        ] {
            let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
            writeln!(file, "refresh_failure = \"{value}\"").unwrap();

            let cli = Cli {
                config_file: Some(file.path().to_path_buf()),
                ..Default::default()
            };
            assert_eq!(load(&cli).unwrap().refresh_failure, expected, "{value}");
        }
    }

    #[test]
    fn test_invalid_settings_rejected() {
        for cli in [
            Cli {
                telemetry_path: Some("metrics".to_string()),
                ..Default::default()
            },
            Cli {
                telemetry_path: Some("/".to_string()),
                ..Default::default()
            },
            Cli {
                listen_address: Some("9263".to_string()),
                ..Default::default()
            },
            Cli {
                listen_address: Some(":http".to_string()),
                ..Default::default()
            },
            Cli {
                refresh_failure: Some("restart".to_string()),
                ..Default::default()
            },
        ] {
            assert!(load(&cli).is_err(), "{cli:?}");
        }
    }

    #[test]
    fn test_missing_config_file_rejected() {
        let cli = Cli {
            config_file: Some(PathBuf::from("/nonexistent/vmwareguest.toml")),
            ..Default::default()
        };
        assert!(load(&cli).is_err());
    }
}
