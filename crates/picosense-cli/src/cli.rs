//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    /// Parse a format name as written in the config file.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "text" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

/// Requested relay state
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RelayState {
    On,
    Off,
}

impl RelayState {
    pub fn is_on(self) -> bool {
        self == RelayState::On
    }
}

#[derive(Debug, Parser)]
#[command(name = "picosense")]
#[command(author, version, about = "CLI for the Pi Pico environmental sensor and relay board", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Number of relays on the board (overrides config)
    #[arg(short = 'r', long, global = true, env = "PICOSENSE_RELAY_COUNT")]
    pub relay_count: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan for nearby sensor boards
    Scan {
        /// Scan timeout in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,

        /// Output format (overrides config)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Connect to the first board in range and print every state change
    Watch {
        /// Output format (overrides config)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Switch one relay on or off
    Relay {
        /// Relay index, starting at 0
        index: usize,

        /// Requested state
        #[arg(value_enum)]
        state: RelayState,

        /// Seconds to wait for the board to start streaming
        #[arg(short, long, default_value = "30")]
        timeout: u64,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigAction {
    /// Print the config file location
    Path,
    /// Print the effective configuration
    Show,
    /// Write the effective configuration to the config file
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_relay_command() {
        let cli = Cli::try_parse_from(["picosense", "relay", "3", "on"]).unwrap();
        match cli.command {
            Commands::Relay {
                index,
                state,
                timeout,
            } => {
                assert_eq!(index, 3);
                assert!(state.is_on());
                assert_eq!(timeout, 30);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_relay_state() {
        assert!(Cli::try_parse_from(["picosense", "relay", "0", "toggle"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["picosense", "watch", "--relay-count", "8", "-q"]).unwrap();
        assert_eq!(cli.relay_count, Some(8));
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Watch { format: None }));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["picosense", "-v", "-q", "scan"]).is_err());
    }

    #[test]
    fn test_parse_config_action() {
        let cli = Cli::try_parse_from(["picosense", "config", "init"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Init
            }
        ));
    }

    #[test]
    fn test_format_from_name() {
        assert_eq!(OutputFormat::from_name("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_name(" Text "), Some(OutputFormat::Text));
        assert_eq!(OutputFormat::from_name("csv"), None);
    }
}
