// SPDX-License-Identifier: GPL-3.0-only

//! Session state types and the observer interface

use crate::backends::camera::types::DeviceSettings;
use crate::errors::SessionError;

/// Outcome of the one-time authorization and configuration pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetupResult {
    Success,
    CameraNotAuthorized,
    SessionConfigurationFailed,
}

impl SetupResult {
    pub fn is_success(self) -> bool {
        self == SetupResult::Success
    }
}

impl std::fmt::Display for SetupResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetupResult::Success => write!(f, "success"),
            SetupResult::CameraNotAuthorized => write!(f, "camera not authorized"),
            SetupResult::SessionConfigurationFailed => write!(f, "session configuration failed"),
        }
    }
}

/// Pipeline state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunState {
    /// Setup has not finished
    #[default]
    Configuring,
    /// Device acquired, not streaming
    Ready,
    /// Frames are being delivered
    Running,
    /// Streaming suspended, device still held
    Paused,
    /// Device released by `stop`
    Stopped,
    /// Setup failed; nothing will ever run
    Inert,
}

impl RunState {
    /// Whether the session holds the hardware in this state
    pub fn holds_device(self) -> bool {
        matches!(self, RunState::Ready | RunState::Running | RunState::Paused)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Configuring => "configuring",
            RunState::Ready => "ready",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Stopped => "stopped",
            RunState::Inert => "inert",
        };
        f.write_str(name)
    }
}

/// Receives session events
///
/// Methods are called on the session's work queue, in the order the events
/// happen. Implementations must not block.
pub trait SessionObserver: Send + Sync {
    fn setup_resolved(&self, _result: SetupResult) {}

    fn run_state_changed(&self, _state: RunState) {}

    fn settings_changed(&self, _settings: DeviceSettings) {}

    /// An operation failed; the caller also receives the error
    fn runtime_error(&self, _error: &SessionError) {}
}
