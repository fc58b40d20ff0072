//! Request and response types for the Handy client

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::session::Mode;

// =============================================================================
// Command Results
// =============================================================================

/// A measurement reported both as a percentage and in device units
///
/// Both fields describe the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialReading {
    /// Percentage of the device range (0-100)
    pub percent: f64,
    /// Device units (mm for stroke, mm/s for speed)
    pub raw: f64,
}

/// Settings snapshot returned by `getSettings`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    pub mode: Mode,
    pub position: f64,
    pub speed: f64,
    pub stroke: f64,
}

/// Position reported after a speed or stroke change
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionStatus {
    pub current_position: f64,
}

/// Firmware versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub current: String,
    pub latest: String,
}

impl VersionInfo {
    /// Whether a newer firmware than the installed one is published
    pub fn update_available(&self) -> bool {
        !self.latest.is_empty() && self.current != self.latest
    }
}

/// Playback state returned by the sync commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaybackState {
    pub playing: bool,
    /// Device-side sync offset in milliseconds, when reported
    pub offset_ms: Option<i64>,
}

// =============================================================================
// Control Files
// =============================================================================

/// One point of a motion pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternPoint {
    /// Milliseconds from the start of the pattern
    pub time_ms: u32,
    /// Position as a percentage of the current stroke (0-100)
    pub position: u8,
}

impl PatternPoint {
    pub fn new(time_ms: u32, position: u8) -> Self {
        Self { time_ms, position }
    }
}

impl From<(u32, u8)> for PatternPoint {
    fn from((time_ms, position): (u32, u8)) -> Self {
        Self::new(time_ms, position)
    }
}

/// Kind of a pre-authored control file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlFileKind {
    /// `time,position` lines
    Csv,
    /// JSON funscript
    Funscript,
}

impl ControlFileKind {
    pub fn extension(self) -> &'static str {
        match self {
            ControlFileKind::Csv => "csv",
            ControlFileKind::Funscript => "funscript",
        }
    }

    /// Detect the kind from a file extension
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" => Some(ControlFileKind::Csv),
            "funscript" => Some(ControlFileKind::Funscript),
            _ => None,
        }
    }
}

/// A control file hosted by the upload service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedFile {
    /// Durable URL of the hosted file; empty if the service returned none
    pub url: String,
    /// File name used for the upload
    pub name: String,
    /// Uploaded size in bytes
    pub size_bytes: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_path() {
        assert_eq!(
            ControlFileKind::from_path("scripts/intro.funscript"),
            Some(ControlFileKind::Funscript)
        );
        assert_eq!(
            ControlFileKind::from_path("PATTERN.CSV"),
            Some(ControlFileKind::Csv)
        );
        assert_eq!(ControlFileKind::from_path("notes.txt"), None);
        assert_eq!(ControlFileKind::from_path("no_extension"), None);
    }

    #[test]
    fn test_update_available() {
        let info = VersionInfo {
            current: "2.1.0".into(),
            latest: "2.2.0".into(),
        };
        assert!(info.update_available());

        let info = VersionInfo {
            current: "2.2.0".into(),
            latest: "2.2.0".into(),
        };
        assert!(!info.update_available());
    }
}
