//! Output formatting utilities for text and JSON output.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use picosense_core::{DiscoveredPeripheral, SessionSnapshot};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::style;

/// A scan result as printed by `picosense scan`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanEntry {
    pub id: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
}

impl From<&DiscoveredPeripheral> for ScanEntry {
    fn from(found: &DiscoveredPeripheral) -> Self {
        Self {
            id: found.identity.id.clone(),
            name: found.identity.name.clone(),
            rssi: found.rssi,
        }
    }
}

pub fn format_scan_json(entries: &[ScanEntry]) -> Result<String> {
    serde_json::to_string_pretty(entries).context("Failed to serialize scan results")
}

pub fn format_scan_text(entries: &[ScanEntry], no_color: bool) -> String {
    if entries.is_empty() {
        return "No sensor boards found.\n".to_string();
    }

    let mut out = String::new();
    let header = format!("{:<40} {:<24} {:>6}", "ID", "NAME", "RSSI");
    if no_color {
        out.push_str(&header);
    } else {
        out.push_str(&header.bold().to_string());
    }
    out.push('\n');

    for entry in entries {
        let rssi = entry
            .rssi
            .map(|r| format!("{} dBm", r))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<40} {:<24} {:>6}\n",
            entry.id,
            entry.name.as_deref().unwrap_or("-"),
            rssi
        ));
    }
    out
}

/// Wall-clock time of day, `HH:MM:SS` UTC.
pub fn format_clock(at: OffsetDateTime) -> String {
    format!("{:02}:{:02}:{:02}", at.hour(), at.minute(), at.second())
}

/// Relay states as `index:state` pairs.
pub fn format_relays(relays: &[bool], no_color: bool) -> String {
    if relays.is_empty() {
        return "-".to_string();
    }
    relays
        .iter()
        .enumerate()
        .map(|(i, on)| format!("{}:{}", i, style::relay_state(*on, no_color)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_value(value: Option<f32>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:.2}{}", v, unit),
        None => "--".to_string(),
    }
}

/// One line per published snapshot.
pub fn format_snapshot_text(snapshot: &SessionSnapshot, at: OffsetDateTime, no_color: bool) -> String {
    let phase = style::phase(
        &snapshot.phase.to_string(),
        snapshot.is_streaming(),
        no_color,
    );
    let mut line = format!("[{}] {}", format_clock(at), phase);
    if let Some(name) = &snapshot.peripheral_name {
        line.push_str(&format!(" {}", name));
    }
    if snapshot.is_connected {
        line.push_str(&format!(
            "  temp {}  humidity {}  relays {}",
            format_value(snapshot.temperature, " °C"),
            format_value(snapshot.humidity, " %"),
            format_relays(&snapshot.relays, no_color)
        ));
    }
    line
}

#[derive(Serialize)]
struct SnapshotRecord<'a> {
    timestamp: String,
    #[serde(flatten)]
    snapshot: &'a SessionSnapshot,
}

/// One compact JSON object per published snapshot.
pub fn format_snapshot_json(snapshot: &SessionSnapshot, at: OffsetDateTime) -> Result<String> {
    let record = SnapshotRecord {
        timestamp: at.format(&Rfc3339).context("Failed to format timestamp")?,
        snapshot,
    };
    serde_json::to_string(&record).context("Failed to serialize snapshot")
}

#[cfg(test)]
mod tests {
    use super::*;
    use picosense_core::{ConnectionPhase, PeripheralIdentity};
    use time::macros::datetime;

    fn streaming() -> SessionSnapshot {
        SessionSnapshot {
            phase: ConnectionPhase::Streaming,
            is_connected: true,
            peripheral_name: Some("Pi Pico Sensor".to_string()),
            temperature: Some(23.61),
            humidity: Some(41.5),
            relays: vec![true, false],
            ..Default::default()
        }
    }

    #[test]
    fn test_scan_entry_from_discovery() {
        let found = DiscoveredPeripheral {
            identity: PeripheralIdentity::with_name("AA:BB", "Pi Pico Sensor"),
            services: vec![],
            rssi: Some(-60),
        };
        let entry = ScanEntry::from(&found);
        assert_eq!(entry.id, "AA:BB");
        assert_eq!(entry.name.as_deref(), Some("Pi Pico Sensor"));
        assert_eq!(entry.rssi, Some(-60));
    }

    #[test]
    fn test_scan_text_lists_entries() {
        let entries = vec![ScanEntry {
            id: "AA:BB".to_string(),
            name: None,
            rssi: Some(-71),
        }];
        let text = format_scan_text(&entries, true);
        assert!(text.starts_with("ID"));
        assert!(text.contains("AA:BB"));
        assert!(text.contains("-71 dBm"));
    }

    #[test]
    fn test_scan_text_empty() {
        assert_eq!(format_scan_text(&[], true), "No sensor boards found.\n");
    }

    #[test]
    fn test_scan_json() {
        let entries = vec![ScanEntry {
            id: "AA:BB".to_string(),
            name: Some("board".to_string()),
            rssi: None,
        }];
        let json: serde_json::Value =
            serde_json::from_str(&format_scan_json(&entries).unwrap()).unwrap();
        assert_eq!(json[0]["id"], "AA:BB");
        assert_eq!(json[0]["name"], "board");
        assert!(json[0]["rssi"].is_null());
    }

    #[test]
    fn test_format_relays_plain() {
        assert_eq!(format_relays(&[true, false, true], true), "0:ON 1:off 2:ON");
        assert_eq!(format_relays(&[], true), "-");
    }

    #[test]
    fn test_snapshot_text_streaming() {
        let at = datetime!(2026-03-01 09:05:07 UTC);
        let line = format_snapshot_text(&streaming(), at, true);
        assert_eq!(
            line,
            "[09:05:07] streaming Pi Pico Sensor  temp 23.61 °C  humidity 41.50 %  relays 0:ON 1:off"
        );
    }

    #[test]
    fn test_snapshot_text_scanning_omits_readings() {
        let at = datetime!(2026-03-01 09:05:07 UTC);
        let snapshot = SessionSnapshot::detached(ConnectionPhase::Scanning);
        assert_eq!(format_snapshot_text(&snapshot, at, true), "[09:05:07] scanning");
    }

    #[test]
    fn test_snapshot_json_carries_timestamp_and_state() {
        let at = datetime!(2026-03-01 09:05:07 UTC);
        let json: serde_json::Value =
            serde_json::from_str(&format_snapshot_json(&streaming(), at).unwrap()).unwrap();
        assert_eq!(json["timestamp"], "2026-03-01T09:05:07Z");
        assert_eq!(json["phase"], "streaming");
        assert_eq!(json["is_connected"], true);
        assert_eq!(json["relays"], serde_json::json!([true, false]));
    }
}
