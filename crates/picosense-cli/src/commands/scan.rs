//! Scan command implementation.

use std::io::{self, IsTerminal, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use picosense_core::{BtleplugLink, LinkAdapter, uuids};
use tracing::debug;

use crate::cli::OutputFormat;
use crate::format::{ScanEntry, format_scan_json, format_scan_text};
use crate::style;

pub async fn cmd_scan(timeout: u64, format: OutputFormat, quiet: bool) -> Result<()> {
    // Show spinner for text output (unless quiet)
    let spinner = if !quiet && matches!(format, OutputFormat::Text) {
        Some(style::scanning_spinner(timeout))
    } else {
        None
    };

    let link = BtleplugLink::new()
        .await
        .context("Failed to open the Bluetooth adapter")?;
    let entries = collect_advertisers(&link, Duration::from_secs(timeout)).await;

    if let Some(sp) = spinner {
        sp.finish_and_clear();
    }
    let entries = entries?;

    let content = match format {
        OutputFormat::Json => format_scan_json(&entries)? + "\n",
        OutputFormat::Text => format_scan_text(&entries, !io::stdout().is_terminal()),
    };
    io::stdout()
        .write_all(content.as_bytes())
        .context("Failed to write output")?;
    Ok(())
}

/// Scan for `window` and return every board heard, once per id.
///
/// A board heard twice keeps its first position with the latest RSSI.
pub(crate) async fn collect_advertisers<A: LinkAdapter>(
    link: &A,
    window: Duration,
) -> Result<Vec<ScanEntry>> {
    let mut found = link
        .start_discovery(&uuids::REQUIRED_SERVICES)
        .await
        .context("Failed to start scanning")?;

    let mut entries: Vec<ScanEntry> = Vec::new();
    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            next = found.next() => match next {
                Some(peripheral) => {
                    debug!(peripheral = %peripheral.identity, rssi = ?peripheral.rssi, "Heard advertisement");
                    let entry = ScanEntry::from(&peripheral);
                    match entries.iter_mut().find(|e| e.id == entry.id) {
                        Some(existing) => *existing = entry,
                        None => entries.push(entry),
                    }
                }
                None => break,
            },
        }
    }

    link.stop_discovery()
        .await
        .context("Failed to stop scanning")?;
    Ok(entries)
}
