// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `run`: Start the server (default)
//! - `validate`: Validate a configuration file
//! - `token issue` / `token inspect`: Mint and decode tokens with the
//!   configured secret
//! - `version`: Show version information

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use gatehouse_config::{LogLevel, LoggingConfig};

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "gatehouse.yaml";

// =============================================================================
// Main CLI Structure
// =============================================================================

/// Gatehouse - request authorization gateway
///
/// Authenticates bearer tokens, enforces role and path permissions, and rate
/// limits callers in front of an HTTP API.
#[derive(Parser, Debug)]
#[command(
    name = "gatehouse",
    author = "Sylvex <contact@sylvex.io>",
    version = gatehouse_api::VERSION,
    about = "Request authorization gateway",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path (yaml, toml or json)
    #[arg(short, long, env = "GATEHOUSE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Log format
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Enable quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

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
    /// Start the server
    ///
    /// This is the default command when no subcommand is specified.
    Run(RunArgs),

    /// Validate the configuration file
    ///
    /// Parses and validates the configuration without starting the server.
    Validate(ValidateArgs),

    /// Issue or inspect tokens
    #[command(subcommand)]
    Token(TokenCommand),

    /// Show detailed version information
    Version,
}

/// Token subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum TokenCommand {
    /// Issue a signed token
    Issue(IssueArgs),
    /// Verify a token and print its claims
    Inspect(InspectArgs),
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `run` command.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Override the listen port
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Show parsed configuration after validation
    #[arg(short, long)]
    pub show_config: bool,

    /// Output format for validation results
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Strict mode: treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for `token issue`.
#[derive(Args, Debug, Clone)]
pub struct IssueArgs {
    /// Username (the `sub` claim). Looked up in the configured directory
    /// when `--user-id` is not given.
    #[arg(short, long)]
    pub username: String,

    /// Numeric user id
    #[arg(long)]
    pub user_id: Option<i64>,

    /// Role claim. Defaults to the user's primary role in the directory.
    #[arg(short, long)]
    pub role: Option<String>,

    /// Issue a refresh token instead of an access token
    #[arg(long)]
    pub refresh: bool,

    /// Extra claim as `key=value`; the value is parsed as JSON when possible
    #[arg(long = "claim", value_name = "KEY=VALUE")]
    pub claims: Vec<String>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for `token inspect`.
#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// The token to inspect
    #[arg(required_unless_present = "stdin")]
    pub token: Option<String>,

    /// Read the token from stdin
    #[arg(long)]
    pub stdin: bool,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
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

impl From<gatehouse_config::LogFormat> for LogFormat {
    fn from(format: gatehouse_config::LogFormat) -> Self {
        match format {
            gatehouse_config::LogFormat::Text => LogFormat::Text,
            gatehouse_config::LogFormat::Json => LogFormat::Json,
            gatehouse_config::LogFormat::Compact => LogFormat::Compact,
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for programmatic parsing
    Json,
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

    /// The configuration file to read, if any.
    ///
    /// Falls back to `gatehouse.yaml` in the working directory when it exists.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(|| {
            let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
            fallback.exists().then_some(fallback)
        })
    }

    /// Get the effective log level. Flags win over the file.
    pub fn effective_log_level(&self, file: Option<&LoggingConfig>) -> String {
        if self.quiet {
            "warn".to_string()
        } else if self.verbose {
            "debug".to_string()
        } else if let Some(level) = &self.log_level {
            level.clone()
        } else {
            file.map(|l| l.level)
                .unwrap_or(LogLevel::Info)
                .as_str()
                .to_string()
        }
    }

    /// Get the effective log format. The flag wins over the file.
    pub fn effective_log_format(&self, file: Option<&LoggingConfig>) -> LogFormat {
        self.log_format
            .or_else(|| file.map(|l| l.format.into()))
            .unwrap_or_default()
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
        let cli = Cli::parse_from(["gatehouse"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.effective_command(), Commands::Run(_)));
    }

    #[test]
    fn test_validate_command() {
        let cli = Cli::parse_from(["gatehouse", "validate", "--show-config", "--strict"]);
        let Some(Commands::Validate(args)) = cli.command else {
            panic!("Expected Validate command");
        };
        assert!(args.show_config);
        assert!(args.strict);
        assert_eq!(args.format, OutputFormat::Text);
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::parse_from(["gatehouse", "-c", "/etc/gatehouse/config.toml"]);
        assert_eq!(
            cli.config_path(),
            Some(PathBuf::from("/etc/gatehouse/config.toml"))
        );
    }

    #[test]
    fn test_token_issue() {
        let cli = Cli::parse_from([
            "gatehouse", "token", "issue", "-u", "alice", "--user-id", "7", "--claim",
            "tenant=acme", "--refresh",
        ]);
        let Some(Commands::Token(TokenCommand::Issue(args))) = cli.command else {
            panic!("Expected token issue");
        };
        assert_eq!(args.username, "alice");
        assert_eq!(args.user_id, Some(7));
        assert!(args.refresh);
        assert_eq!(args.claims, vec!["tenant=acme".to_string()]);
    }

    #[test]
    fn test_token_inspect_requires_input() {
        assert!(Cli::try_parse_from(["gatehouse", "token", "inspect"]).is_err());
        assert!(Cli::try_parse_from(["gatehouse", "token", "inspect", "--stdin"]).is_ok());
    }

    #[test]
    fn test_log_level_precedence() {
        let file = LoggingConfig {
            level: LogLevel::Error,
            ..Default::default()
        };

        let cli = Cli::parse_from(["gatehouse"]);
        assert_eq!(cli.effective_log_level(Some(&file)), "error");
        assert_eq!(cli.effective_log_level(None), "info");

        let cli = Cli::parse_from(["gatehouse", "-l", "trace"]);
        assert_eq!(cli.effective_log_level(Some(&file)), "trace");

        let cli = Cli::parse_from(["gatehouse", "-q", "-l", "trace"]);
        assert_eq!(cli.effective_log_level(Some(&file)), "warn");
    }

    #[test]
    fn test_log_format_precedence() {
        let file = LoggingConfig {
            format: gatehouse_config::LogFormat::Json,
            ..Default::default()
        };
        let cli = Cli::parse_from(["gatehouse"]);
        assert_eq!(cli.effective_log_format(Some(&file)), LogFormat::Json);

        let cli = Cli::parse_from(["gatehouse", "--log-format", "compact"]);
        assert_eq!(cli.effective_log_format(Some(&file)), LogFormat::Compact);
    }
}
