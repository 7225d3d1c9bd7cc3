//! Watch command implementation.
//!
//! Runs a session against the first board in range and prints every snapshot
//! it publishes until Ctrl-C. Reconnection is left to the session, which
//! returns to scanning whenever the link drops.

use std::future::Future;
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use picosense_core::{BtleplugLink, Session, SessionConfig, SessionSnapshot, StateObserver};
use time::OffsetDateTime;
use tracing::info;

use crate::cli::OutputFormat;
use crate::format::{format_snapshot_json, format_snapshot_text};

pub async fn cmd_watch(config: SessionConfig, format: OutputFormat, quiet: bool) -> Result<()> {
    let link = Arc::new(
        BtleplugLink::new()
            .await
            .context("Failed to open the Bluetooth adapter")?,
    );
    let session = Session::spawn(link, config).context("Failed to start session")?;

    if !quiet && format == OutputFormat::Text {
        eprintln!("Watching for sensor boards (Ctrl-C to stop)...");
    }

    let no_color = format == OutputFormat::Json || !io::stdout().is_terminal();
    let stop = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let result = print_snapshots(session.observer(), &mut io::stdout(), format, no_color, stop).await;

    if !quiet {
        eprintln!("\nShutting down...");
    }
    session.shutdown().await;
    info!("Session stopped");
    result
}

fn write_snapshot<W: Write>(
    out: &mut W,
    snapshot: &SessionSnapshot,
    format: OutputFormat,
    no_color: bool,
) -> Result<()> {
    let now = OffsetDateTime::now_utc();
    let line = match format {
        OutputFormat::Json => format_snapshot_json(snapshot, now)?,
        OutputFormat::Text => format_snapshot_text(snapshot, now, no_color),
    };
    writeln!(out, "{}", line).context("Failed to write output")?;
    out.flush().context("Failed to write output")
}

/// Print the current snapshot, then each change, until `stop` resolves or
/// the session ends.
pub(crate) async fn print_snapshots<W, F>(
    mut observer: StateObserver,
    out: &mut W,
    format: OutputFormat,
    no_color: bool,
    stop: F,
) -> Result<()>
where
    W: Write,
    F: Future<Output = ()>,
{
    tokio::pin!(stop);

    let mut last = observer.snapshot();
    write_snapshot(out, &last, format, no_color)?;

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => return Ok(()),
            changed = observer.changed() => match changed {
                Ok(snapshot) => {
                    if snapshot != last {
                        write_snapshot(out, &snapshot, format, no_color)?;
                        last = snapshot;
                    }
                }
                // Session ended
                Err(_) => return Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use picosense_core::{MockLink, SessionHandle, uuids};

    async fn streaming_board() -> (Arc<MockLink>, SessionHandle) {
        let link = Arc::new(MockLink::new());
        link.advertise("AA:01", Some("Pi Pico Sensor")).await;
        link.set_value(uuids::TEMPERATURE, &[0x39, 0x09]).await;
        link.set_value(uuids::HUMIDITY, &[0x88, 0x13]).await;
        link.set_value(uuids::RELAY_CONTROL, &[0x01]).await;
        let session = Session::spawn(Arc::clone(&link), SessionConfig::default()).unwrap();
        (link, session)
    }

    #[tokio::test]
    async fn test_prints_until_session_ends() {
        let (_link, session) = streaming_board().await;
        let observer = session.observer();
        let mut waiter = session.observer();
        let mut out = Vec::new();

        let printer = print_snapshots(
            observer,
            &mut out,
            OutputFormat::Text,
            true,
            std::future::pending(),
        );
        let driver = async move {
            waiter
                .wait_for(|s| s.is_streaming() && s.temperature.is_some() && s.relays.len() == 2)
                .await
                .unwrap();
            session.shutdown().await;
        };

        let (printed, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(printer, driver)
        })
        .await
        .unwrap();
        printed.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("streaming Pi Pico Sensor"), "{}", text);
        assert!(text.contains("23.61 °C"), "{}", text);
        assert!(text.contains("relays 0:ON 1:off"), "{}", text);
    }

    #[tokio::test]
    async fn test_json_lines_parse() {
        let (_link, session) = streaming_board().await;
        let mut waiter = session.observer();
        let mut out = Vec::new();

        let printer = print_snapshots(
            session.observer(),
            &mut out,
            OutputFormat::Json,
            true,
            std::future::pending(),
        );
        let driver = async move {
            waiter.wait_for(|s| s.is_streaming()).await.unwrap();
            session.shutdown().await;
        };
        let (printed, ()) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(printer, driver)
        })
        .await
        .unwrap();
        printed.unwrap();

        let text = String::from_utf8(out).unwrap();
        let phases: Vec<String> = text
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                assert!(value["timestamp"].is_string());
                value["phase"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(phases.last().map(String::as_str), Some("streaming"));
    }

    #[tokio::test]
    async fn test_stop_future_ends_printing() {
        let link = Arc::new(MockLink::new());
        let session = Session::spawn(link, SessionConfig::default()).unwrap();
        let mut out = Vec::new();

        print_snapshots(session.observer(), &mut out, OutputFormat::Text, true, async {})
            .await
            .unwrap();

        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
        session.shutdown().await;
    }
}
