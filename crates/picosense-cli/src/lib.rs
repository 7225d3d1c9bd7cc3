//! Command-line interface for the Pi Pico environmental sensor and relay board.
//!
//! The `picosense` binary hosts a single peripheral session from
//! `picosense-core` and prints what it publishes.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scan` | List nearby boards advertising the environmental sensing service |
//! | `watch` | Connect to the first board in range and print every state change |
//! | `relay` | Switch one relay on or off |
//!
//! # Output Formats
//!
//! - **Text** (default): one coloured line per state change
//! - **JSON**: one object per line, with an RFC 3339 `timestamp`
//!
//! # Configuration
//!
//! The CLI reads `~/.config/picosense/config.toml` (or platform equivalent):
//!
//! - `relay_count`: Number of relays on the board (default 2)
//! - `format`: Default output format (`text` or `json`)
//! - `log_level`: Log filter used when `RUST_LOG` is unset
//!
//! Command-line flags override the file.
//!
//! # Environment Variables
//!
//! - `PICOSENSE_RELAY_COUNT`: Relay count (overridden by `--relay-count`)
//! - `RUST_LOG`: Log filter (overridden by `--verbose` and `--quiet`)
//!
//! # Examples
//!
//! ```bash
//! picosense scan --timeout 5
//! picosense watch --format json
//! picosense --relay-count 4 relay 2 on
//! ```

// This crate is primarily a binary CLI application.
// The command implementations live next to main.rs.

// Re-export core dependencies for convenience
pub use picosense_core;
