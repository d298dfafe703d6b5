//! CLI argument parsing using clap derive API
//!
//! Purely declarative. The only behaviour here is [`Cli::apply_overrides`],
//! which layers command-line values on top of the loaded configuration.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use ifstat_core::config::IfstatConfig;
use ifstat_core::types::XdpMode;

/// Count ingress packets per filter rule on a network interface.
///
/// Attaches an XDP classifier to INTERFACE, prints per-rule counters every
/// interval and detaches on SIGINT/SIGTERM. Packets are never dropped.
#[derive(Parser, Debug)]
#[command(name = "ifstat", version, about, long_about = None)]
pub struct Cli {
    /// Network interface to attach to (e.g. eth0).
    pub interface: String,

    /// Path to an ifstat.toml configuration file.
    ///
    /// Without it, defaults plus `IFSTAT_*` environment variables are used.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the polling interval in milliseconds.
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Output format for counter snapshots.
    #[arg(long, default_value = "text")]
    pub output: OutputFormat,

    /// Override the XDP attach mode (skb, native, hw).
    #[arg(long)]
    pub xdp_mode: Option<XdpMode>,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One human-readable line per rule.
    Text,
    /// One JSON object per snapshot.
    Json,
}

impl Cli {
    /// Apply command-line overrides. Callers must re-run `validate()` afterwards.
    pub fn apply_overrides(&self, config: &mut IfstatConfig) {
        if let Some(interval_ms) = self.interval_ms {
            config.monitor.interval_ms = interval_ms;
        }
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
        if let Some(mode) = self.xdp_mode {
            config.xdp.mode = mode;
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use clap::error::ErrorKind;

    use super::*;

    #[test]
    fn verify_cli_structure() {
        Cli::command().debug_assert();
    }

    #[test]
    fn interface_is_required() {
        let err = Cli::try_parse_from(["ifstat"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn extra_positional_is_rejected() {
        let err = Cli::try_parse_from(["ifstat", "eth0", "eth1"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn parses_all_options() {
        let cli = Cli::try_parse_from([
            "ifstat",
            "-c",
            "/etc/ifstat.toml",
            "--interval-ms",
            "250",
            "--log-level",
            "debug",
            "--log-format",
            "json",
            "--output",
            "json",
            "--xdp-mode",
            "driver",
            "veth0",
        ])
        .unwrap();

        assert_eq!(cli.interface, "veth0");
        assert_eq!(cli.config, Some(PathBuf::from("/etc/ifstat.toml")));
        assert_eq!(cli.interval_ms, Some(250));
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.xdp_mode, Some(XdpMode::Native));
    }

    #[test]
    fn invalid_xdp_mode_is_usage_error() {
        let err = Cli::try_parse_from(["ifstat", "--xdp-mode", "turbo", "eth0"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn overrides_replace_config_values() {
        let cli = Cli::try_parse_from([
            "ifstat",
            "--interval-ms",
            "50",
            "--log-level",
            "warn",
            "--xdp-mode",
            "hw",
            "eth0",
        ])
        .unwrap();
        let mut config = IfstatConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.monitor.interval_ms, 50);
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.xdp.mode, XdpMode::Hw);
        // untouched values keep their defaults
        assert_eq!(
            config.general.log_format,
            IfstatConfig::default().general.log_format
        );
    }

    #[test]
    fn zero_interval_override_fails_validation() {
        let cli = Cli::try_parse_from(["ifstat", "--interval-ms", "0", "eth0"]).unwrap();
        let mut config = IfstatConfig::default();
        cli.apply_overrides(&mut config);
        assert!(config.validate().is_err());
    }
}
