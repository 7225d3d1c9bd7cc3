//! Config command implementation.

use anyhow::{Context, Result};

use crate::cli::ConfigAction;
use crate::config::Config;

pub fn cmd_config(action: ConfigAction, config: &Config, relay_count: Option<usize>) -> Result<()> {
    match action {
        ConfigAction::Path => {
            println!("{}", Config::path().display());
        }
        ConfigAction::Show => {
            let content = toml::to_string_pretty(&effective(config, relay_count))
                .context("Failed to serialize config")?;
            print!("{}", content);
        }
        ConfigAction::Init => {
            effective(config, relay_count).save()?;
            eprintln!("Wrote {}", Config::path().display());
        }
    }
    Ok(())
}

/// The file contents with every unset value filled in.
fn effective(config: &Config, relay_count: Option<usize>) -> Config {
    Config {
        relay_count: Some(config.resolve_relay_count(relay_count)),
        format: Some(
            config
                .format
                .clone()
                .unwrap_or_else(|| "text".to_string()),
        ),
        log_level: Some(
            config
                .log_level
                .clone()
                .unwrap_or_else(|| "info".to_string()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_fills_defaults() {
        let filled = effective(&Config::default(), None);
        assert_eq!(filled.relay_count, Some(2));
        assert_eq!(filled.format.as_deref(), Some("text"));
        assert_eq!(filled.log_level.as_deref(), Some("info"));
    }

    #[test]
    fn test_effective_keeps_file_values_and_flag() {
        let config = Config {
            relay_count: Some(4),
            format: Some("json".to_string()),
            log_level: None,
        };
        let filled = effective(&config, Some(12));
        assert_eq!(filled.relay_count, Some(12));
        assert_eq!(filled.format.as_deref(), Some("json"));
    }
}
