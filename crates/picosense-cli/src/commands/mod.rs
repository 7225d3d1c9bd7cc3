//! Command implementations for the CLI.

mod config;
mod relay;
mod scan;
mod watch;

pub use config::cmd_config;
pub use relay::cmd_relay;
pub use scan::cmd_scan;
pub use watch::cmd_watch;
