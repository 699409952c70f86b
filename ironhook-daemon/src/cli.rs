//! CLI argument definitions for ironhook-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use ironhook_core::config::IronhookConfig;

/// Ironhook Alertmanager webhook daemon.
///
/// Receives Alertmanager webhook batches, evaluates every alert against
/// the loaded rule knowledge base and forwards the annotated facts.
#[derive(Parser, Debug)]
#[command(name = "ironhook-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to ironhook.toml configuration file.
    #[arg(short, long, default_value = "ironhook.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the rule definition file path.
    #[arg(short, long)]
    pub rules: Option<PathBuf>,

    /// Validate configuration and rules, then exit without starting the listener.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Apply CLI overrides on top of an already loaded configuration.
    pub fn apply_overrides(&self, config: &mut IronhookConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(rules) = &self.rules {
            config.rules.path = rules.display().to_string();
        }
    }
}
