//! Output formatting for handy-cli (table, json, csv)

use std::time::Duration;

use clap::ValueEnum;
use colored::Colorize;
use handy_client::{
    DeviceSettings, HandyClient, PlaybackState, PublishedFile, SessionEvent, SpatialReading,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tabled::{Table, Tabled};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print a single item in the configured format
    pub fn print_one<T: Tabled + Serialize>(&self, data: &T) {
        match self.format {
            OutputFormat::Table => {
                let table = Table::new([data]).to_string();
                println!("{}", table);
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
                );
            }
            OutputFormat::Csv => {
                print_csv(&[data]);
            }
        }
    }

    /// Print key-value pairs
    pub fn print_kv(&self, pairs: &[(&str, String)]) {
        match self.format {
            OutputFormat::Table => {
                for (key, value) in pairs {
                    println!("{}: {}", key.bold(), value);
                }
            }
            OutputFormat::Json => {
                let map: serde_json::Map<String, serde_json::Value> = pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&map).unwrap_or_else(|_| "{}".to_string())
                );
            }
            OutputFormat::Csv => {
                let keys: Vec<String> = pairs.iter().map(|(k, _)| escape_csv(k)).collect();
                println!("{}", keys.join(","));
                let values: Vec<String> = pairs.iter().map(|(_, v)| escape_csv(v)).collect();
                println!("{}", values.join(","));
            }
        }
    }

    /// Show a spinner while commands run on `client`.
    ///
    /// Only shown for interactive table output.
    pub fn spinner(&self, client: &HandyClient) -> Option<CommandSpinner> {
        if self.quiet || self.format != OutputFormat::Table {
            return None;
        }
        Some(CommandSpinner::attach(client))
    }
}

/// Print data as CSV
fn print_csv<T: Serialize>(data: &[T]) {
    let Some(first) = data.first() else {
        return;
    };

    // Get field names from the first item
    if let Ok(serde_json::Value::Object(map)) = serde_json::to_value(first) {
        let headers: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
        println!("{}", headers.join(","));

        for item in data {
            if let Ok(serde_json::Value::Object(row)) = serde_json::to_value(item) {
                let values: Vec<String> = headers
                    .iter()
                    .map(|h| {
                        row.get(*h)
                            .map(|v| match v {
                                serde_json::Value::String(s) => escape_csv(s),
                                serde_json::Value::Null => String::new(),
                                other => escape_csv(&other.to_string()),
                            })
                            .unwrap_or_default()
                    })
                    .collect();
                println!("{}", values.join(","));
            }
        }
    }
}

/// Escape a value for CSV output
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// =============================================================================
// Command spinner
// =============================================================================

/// Spinner driven by the client's command notifications
pub struct CommandSpinner {
    bar: ProgressBar,
    handle: JoinHandle<()>,
}

impl CommandSpinner {
    fn attach(client: &HandyClient) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        let mut events = client.subscribe();
        let task_bar = bar.clone();
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::CommandStarted { command }) => {
                        task_bar.set_message(format!("{}...", command));
                        task_bar.enable_steady_tick(Duration::from_millis(100));
                    }
                    Ok(SessionEvent::CommandEnded { .. }) => {
                        task_bar.disable_steady_tick();
                        task_bar.set_message("");
                    }
                    Ok(SessionEvent::ModeChanged(mode)) => {
                        task_bar.println(format!("{} {}", "Mode:".dimmed(), mode));
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Self { bar, handle }
    }

    /// Stop listening and clear the spinner line
    pub fn finish(self) {
        self.handle.abort();
        self.bar.finish_and_clear();
    }
}

// =============================================================================
// Display types for various commands
// =============================================================================

/// Settings display for settings command
#[derive(Debug, Tabled, Serialize)]
pub struct SettingsRow {
    #[tabled(rename = "Mode")]
    pub mode: String,
    #[tabled(rename = "Position")]
    pub position: f64,
    #[tabled(rename = "Speed")]
    pub speed: f64,
    #[tabled(rename = "Stroke")]
    pub stroke: f64,
}

impl From<DeviceSettings> for SettingsRow {
    fn from(settings: DeviceSettings) -> Self {
        Self {
            mode: settings.mode.to_string(),
            position: settings.position,
            speed: settings.speed,
            stroke: settings.stroke,
        }
    }
}

/// Reading display for step commands
#[derive(Debug, Tabled, Serialize)]
pub struct ReadingRow {
    #[tabled(rename = "Percent")]
    pub percent: f64,
    #[tabled(rename = "Value")]
    pub value: String,
}

impl ReadingRow {
    pub fn new(reading: SpatialReading, unit: &str) -> Self {
        Self {
            percent: reading.percent,
            value: format!("{:.1} {}", reading.raw, unit),
        }
    }
}

/// Uploaded file display for upload command
#[derive(Debug, Tabled, Serialize)]
pub struct PublishedRow {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "URL")]
    pub url: String,
    #[tabled(rename = "Size")]
    pub size: String,
}

impl From<&PublishedFile> for PublishedRow {
    fn from(file: &PublishedFile) -> Self {
        Self {
            name: file.name.clone(),
            url: file.url.clone(),
            size: file
                .size_bytes
                .map(|s| format!("{} bytes", s))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Playback display for play/pause commands
#[derive(Debug, Tabled, Serialize)]
pub struct PlaybackRow {
    #[tabled(rename = "Playing")]
    pub playing: bool,
    #[tabled(rename = "Offset (ms)")]
    pub offset_ms: String,
}

impl From<PlaybackState> for PlaybackRow {
    fn from(state: PlaybackState) -> Self {
        Self {
            playing: state.playing,
            offset_ms: state
                .offset_ms
                .map(|o| o.to_string())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_playback_row() {
        let row = PlaybackRow::from(PlaybackState {
            playing: true,
            offset_ms: None,
        });
        assert!(row.playing);
        assert_eq!(row.offset_ms, "-");
    }

    #[test]
    fn test_reading_row() {
        let row = ReadingRow::new(
            SpatialReading {
                percent: 60.0,
                raw: 120.0,
            },
            "mm",
        );
        assert_eq!(row.value, "120.0 mm");
    }
}
