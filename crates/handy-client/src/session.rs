//! Per-client session state: connection key, cached mode, clock offset

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Operating mode of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Off,
    Automatic,
    /// Position hold
    Position,
    Calibration,
    /// Time-synchronized playback of a prepared control file
    Sync,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::Off,
        Mode::Automatic,
        Mode::Position,
        Mode::Calibration,
        Mode::Sync,
    ];

    /// Wire value used by the device API
    pub fn code(self) -> i64 {
        match self {
            Mode::Off => 0,
            Mode::Automatic => 1,
            Mode::Position => 2,
            Mode::Calibration => 3,
            Mode::Sync => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.code() == code)
    }

    /// Mode reached by toggling `target` while in `self`
    pub fn toggled(self, target: Mode) -> Mode {
        if self == target {
            Mode::Off
        } else {
            target
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Off => "off",
            Mode::Automatic => "automatic",
            Mode::Position => "position",
            Mode::Calibration => "calibration",
            Mode::Sync => "sync",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Ok(Mode::Off),
            "automatic" | "auto" | "1" => Ok(Mode::Automatic),
            "position" | "hold" | "2" => Ok(Mode::Position),
            "calibration" | "3" => Ok(Mode::Calibration),
            "sync" | "4" => Ok(Mode::Sync),
            _ => Err(format!(
                "Unknown mode: {}. Valid modes: off, automatic, position, calibration, sync",
                s
            )),
        }
    }
}

/// Verbosity of command lifecycle logging
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    None,
    #[default]
    Errors,
    Responses,
    Verbose,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(LogLevel::None),
            "errors" => Ok(LogLevel::Errors),
            "responses" => Ok(LogLevel::Responses),
            "verbose" => Ok(LogLevel::Verbose),
            _ => Err(format!(
                "Unknown log level: {}. Valid levels: none, errors, responses, verbose",
                s
            )),
        }
    }
}

/// Notification broadcast to session subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A command began; always the first thing a command does
    CommandStarted { command: &'static str },
    /// A command finished; always the last thing a command does
    CommandEnded {
        command: &'static str,
        success: bool,
    },
    /// The cached device mode changed
    ModeChanged(Mode),
}

/// Mutable session state owned by one client
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub connection_key: String,
    pub mode: Mode,
    /// Estimated server time minus local time, in milliseconds
    pub server_time_offset: i64,
    pub log_level: LogLevel,
}

impl Session {
    pub fn new(connection_key: impl Into<String>, log_level: LogLevel) -> Self {
        Self {
            connection_key: connection_key.into(),
            log_level,
            ..Default::default()
        }
    }

    pub fn has_connection_key(&self) -> bool {
        !self.connection_key.is_empty()
    }

    /// Record an observed mode; returns true if it differs from the cached one
    pub fn observe_mode(&mut self, mode: Mode) -> bool {
        if self.mode == mode {
            return false;
        }
        self.mode = mode;
        true
    }
}
