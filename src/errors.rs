// SPDX-License-Identifier: GPL-3.0-only

//! Error types for capture sessions

use crate::backends::camera::types::{
    BackendError, DevicePosition, FlashMode, FocusMode, TorchMode,
};
use crate::constants::SessionPreset;
use crate::session::SetupResult;
use std::fmt;

/// Result type alias using SessionError
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors surfaced by [`CaptureSession`](crate::session::CaptureSession) operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Operation requires a successful setup; carries the setup state seen
    /// (`None` while setup is still pending)
    NotConfigured(Option<SetupResult>),
    /// Re-acquiring the device after `stop` failed
    Configuration(BackendError),
    /// Requested setting is not supported by the current device
    Capability(CapabilityError),
    /// Operation is not allowed while the pipeline streams
    Busy(&'static str),
    /// Hardware failure while changing state
    Backend(BackendError),
    /// The work queue went away before the operation ran
    QueueClosed,
}

/// Capability-mismatch errors from property setters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityError {
    FlashMode(FlashMode),
    TorchMode(TorchMode),
    FocusMode(FocusMode),
    /// No camera at this position
    Position(DevicePosition),
    /// The camera at the new position cannot produce the session preset
    Preset(SessionPreset),
}

/// Configuration file errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Reading or writing the file failed
    Io(String),
    /// The file is not valid JSON for [`Config`](crate::config::Config)
    Parse(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NotConfigured(None) => write!(f, "Session setup has not completed"),
            SessionError::NotConfigured(Some(result)) => {
                write!(f, "Session is not configured: {}", result)
            }
            SessionError::Configuration(e) => write!(f, "Session configuration failed: {}", e),
            SessionError::Capability(e) => write!(f, "Unsupported setting: {}", e),
            SessionError::Busy(what) => write!(f, "Cannot {} while capturing", what),
            SessionError::Backend(e) => write!(f, "Capture device error: {}", e),
            SessionError::QueueClosed => write!(f, "Session work queue is closed"),
        }
    }
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityError::FlashMode(mode) => write!(f, "flash mode '{}'", mode),
            CapabilityError::TorchMode(mode) => write!(f, "torch mode '{}'", mode),
            CapabilityError::FocusMode(mode) => write!(f, "focus mode '{}'", mode),
            CapabilityError::Position(position) => write!(f, "no {} camera", position),
            CapabilityError::Preset(preset) => {
                write!(f, "preset '{}' on the selected camera", preset)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "Configuration I/O error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}
impl std::error::Error for CapabilityError {}
impl std::error::Error for ConfigError {}

impl From<CapabilityError> for SessionError {
    fn from(err: CapabilityError) -> Self {
        SessionError::Capability(err)
    }
}

impl From<BackendError> for SessionError {
    fn from(err: BackendError) -> Self {
        SessionError::Backend(err)
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
