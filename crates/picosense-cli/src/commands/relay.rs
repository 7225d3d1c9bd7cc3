//! Relay command implementation.

use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use picosense_core::{BtleplugLink, Session, SessionConfig, SessionDiagnostic, SessionHandle};
use tokio::time::timeout;
use tracing::debug;

use crate::format::format_relays;
use crate::style;

pub async fn cmd_relay(
    config: SessionConfig,
    index: usize,
    on: bool,
    wait_secs: u64,
    quiet: bool,
) -> Result<()> {
    if index >= config.relay_count {
        bail!(
            "Relay index {} is out of range (the board has {} relays)",
            index,
            config.relay_count
        );
    }

    let link = Arc::new(
        BtleplugLink::new()
            .await
            .context("Failed to open the Bluetooth adapter")?,
    );
    let session = Session::spawn(link, config).context("Failed to start session")?;

    let spinner = (!quiet).then(style::connecting_spinner);
    let result = switch_relay(&session, index, on, Duration::from_secs(wait_secs)).await;
    if let Some(sp) = spinner {
        sp.finish_and_clear();
    }
    session.shutdown().await;

    let relays = result?;
    if quiet {
        println!("{}", format_relays(&relays, true));
    } else {
        println!(
            "Relay {} switched {}. Relays: {}",
            index,
            if on { "on" } else { "off" },
            format_relays(&relays, !io::stdout().is_terminal())
        );
    }
    Ok(())
}

/// Wait for the board to stream with its relay characteristic bound, then
/// set relay `index` and return the vector that was written.
pub(crate) async fn switch_relay(
    session: &SessionHandle,
    index: usize,
    on: bool,
    wait: Duration,
) -> Result<Vec<bool>> {
    let mut observer = session.observer();
    let ready = timeout(
        wait,
        observer.wait_for(|s| s.is_streaming() && !s.relays.is_empty()),
    )
    .await
    .map_err(|_| anyhow!("No sensor board ready after {}s", wait.as_secs()))?
    .context("Session stopped before the board was ready")?;
    debug!(relays = ?ready.relays, "Board ready");

    let mut diagnostics = session.diagnostics();
    session
        .set_relay(index, on)
        .await
        .context("Session stopped before the relay command was sent")?;

    timeout(wait, async {
        loop {
            match diagnostics.recv().await {
                Ok(SessionDiagnostic::RelayWritten { relays }) => return Ok(relays),
                Ok(SessionDiagnostic::RelayWriteIgnored { reason, .. }) => {
                    return Err(anyhow!("Relay command was ignored: {:?}", reason));
                }
                Ok(_) => {}
                Err(e) => return Err(anyhow!("Lost session diagnostics: {}", e)),
            }
        }
    })
    .await
    .map_err(|_| anyhow!("Relay write not confirmed after {}s", wait.as_secs()))?
}
