// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `run`: Start the gateway (default)
//! - `validate`: Validate the configuration file
//! - `browse`: Print the address space of one server as JSON lines
//! - `read`: Print the value or the attributes of one node
//! - `version`: Show version information

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use ua104_config::LogFormat as ConfigLogFormat;

// =============================================================================
// Main CLI Structure
// =============================================================================

/// ua104 - OPC UA to IEC 60870-5-104 gateway
///
/// Subscribes to OPC UA server nodes and republishes their values as
/// information objects of an IEC 104 controlled station.
#[derive(Parser, Debug)]
#[command(
    name = "ua104",
    author = "Sylvex <contact@sylvex.io>",
    version = ua104_core::VERSION,
    about = "OPC UA to IEC 60870-5-104 gateway",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "ua104.yaml",
        env = "UA104_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the gateway
    ///
    /// This is the default command when no subcommand is specified.
    Run(RunArgs),

    /// Validate the configuration file
    ///
    /// Parses and validates the configuration file without connecting to
    /// any server.
    Validate(ValidateArgs),

    /// Browse the address space of one configured server
    ///
    /// Connects, walks the hierarchy and prints one JSON object per node.
    Browse(BrowseArgs),

    /// Read the current value or the attributes of one node
    Read(ReadArgs),

    /// Show detailed version information
    Version,
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `run` command.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Skip the initial connection sweep
    #[arg(long)]
    pub skip_connect: bool,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Default, Clone)]
pub struct ValidateArgs {
    /// Print the parsed configuration as JSON
    #[arg(short, long)]
    pub show_config: bool,

    /// Treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for the `browse` command.
#[derive(Args, Debug, Clone)]
pub struct BrowseArgs {
    /// Server id from the configuration file
    pub server_id: String,

    /// Maximum depth (0..=10)
    #[arg(short, long, default_value_t = 3)]
    pub depth: i64,

    /// Start node, defaults to the Objects folder
    #[arg(short, long)]
    pub start: Option<String>,

    /// Give up after this many seconds
    #[arg(long, default_value_t = 300)]
    pub timeout_secs: u64,
}

/// Arguments for the `read` command.
#[derive(Args, Debug, Clone)]
pub struct ReadArgs {
    /// Server id from the configuration file
    pub server_id: String,

    /// Node id in text form, e.g. `ns=2;s=Temperature`
    pub node_id: String,

    /// Read every common attribute instead of the value only
    #[arg(long)]
    pub details: bool,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

impl From<ConfigLogFormat> for LogFormat {
    fn from(format: ConfigLogFormat) -> Self {
        match format {
            ConfigLogFormat::Text => LogFormat::Text,
            ConfigLogFormat::Json => LogFormat::Json,
            ConfigLogFormat::Compact => LogFormat::Compact,
        }
    }
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective command, defaulting to `Run` if none specified.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Run(RunArgs::default()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command() {
        let cli = Cli::parse_from(["ua104"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.effective_command(), Commands::Run(_)));
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::parse_from(["ua104", "-c", "/etc/ua104/gateway.yaml", "validate"]);
        assert_eq!(cli.config, PathBuf::from("/etc/ua104/gateway.yaml"));
        assert!(matches!(cli.command, Some(Commands::Validate(_))));
    }

    #[test]
    fn test_log_overrides() {
        let cli = Cli::parse_from(["ua104", "--log-level", "debug", "--log-format", "json"]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.log_format, Some(LogFormat::Json));

        let cli = Cli::parse_from(["ua104"]);
        assert!(cli.log_level.is_none());
        assert!(cli.log_format.is_none());
    }

    #[test]
    fn test_browse_command() {
        let cli = Cli::parse_from(["ua104", "browse", "plant", "--depth", "5", "--start", "ns=2;s=Line1"]);
        let Some(Commands::Browse(args)) = cli.command else {
            panic!("Expected Browse command");
        };
        assert_eq!(args.server_id, "plant");
        assert_eq!(args.depth, 5);
        assert_eq!(args.start.as_deref(), Some("ns=2;s=Line1"));

        let cli = Cli::parse_from(["ua104", "browse", "plant"]);
        let Some(Commands::Browse(args)) = cli.command else {
            panic!("Expected Browse command");
        };
        assert_eq!(args.depth, 3);
        assert!(args.start.is_none());
    }

    #[test]
    fn test_read_command() {
        let cli = Cli::parse_from(["ua104", "read", "plant", "ns=2;s=Level", "--details"]);
        let Some(Commands::Read(args)) = cli.command else {
            panic!("Expected Read command");
        };
        assert_eq!(args.node_id, "ns=2;s=Level");
        assert!(args.details);
    }

    #[test]
    fn test_format_conversion() {
        assert_eq!(LogFormat::from(ConfigLogFormat::Compact), LogFormat::Compact);
    }
}
