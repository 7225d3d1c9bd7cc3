//! Session configuration.

use picosense_types::{DEFAULT_RELAY_COUNT, MAX_RELAY_COUNT};

use crate::error::{Error, Result};

/// Default capacity of the diagnostics broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Configuration for a peripheral session.
///
/// The relay count cannot be read from the hardware, so it is supplied here
/// and fixes the length of the relay vector for every connection.
///
/// ```
/// use picosense_core::SessionConfig;
///
/// let config = SessionConfig::default().relay_count(4);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Number of relays on the board.
    pub relay_count: usize,
    /// Buffer size of the diagnostics channel.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            relay_count: DEFAULT_RELAY_COUNT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the relay count.
    #[must_use]
    pub fn relay_count(mut self, count: usize) -> Self {
        self.relay_count = count;
        self
    }

    /// Set the diagnostics channel capacity.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Validate the config and return an error if invalid.
    ///
    /// Checks that:
    /// - `relay_count` is between 1 and [`MAX_RELAY_COUNT`]
    /// - `event_capacity` is > 0
    pub fn validate(&self) -> Result<()> {
        if self.relay_count == 0 {
            return Err(Error::invalid_config("relay_count must be > 0"));
        }
        if self.relay_count > MAX_RELAY_COUNT {
            return Err(Error::invalid_config(format!(
                "relay_count must be <= {}",
                MAX_RELAY_COUNT
            )));
        }
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be > 0"));
        }
        Ok(())
    }
}
