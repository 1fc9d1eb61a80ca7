// SPDX-License-Identifier: GPL-3.0-only
// Shared types for capture backend abstraction

//! Shared types for capture backends

use crate::constants::SessionPreset;
use crate::errors::CapabilityError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Which side of the device a camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePosition {
    /// Rear-facing camera
    #[default]
    Back,
    /// User-facing camera
    Front,
}

impl DevicePosition {
    pub const ALL: [DevicePosition; 2] = [DevicePosition::Back, DevicePosition::Front];

    /// The camera on the opposite side
    pub fn flipped(self) -> Self {
        match self {
            DevicePosition::Back => DevicePosition::Front,
            DevicePosition::Front => DevicePosition::Back,
        }
    }
}

impl std::fmt::Display for DevicePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DevicePosition::Back => write!(f, "back"),
            DevicePosition::Front => write!(f, "front"),
        }
    }
}

impl std::str::FromStr for DevicePosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "back" | "rear" => Ok(DevicePosition::Back),
            "front" | "user" => Ok(DevicePosition::Front),
            other => Err(format!("unknown device position '{}'", other)),
        }
    }
}

/// Camera access authorization as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorizationStatus {
    /// The user has not been asked yet
    NotDetermined,
    /// Access is blocked by policy (parental controls, MDM)
    Restricted,
    /// The user refused access
    Denied,
    /// Access granted
    Authorized,
}

impl AuthorizationStatus {
    pub fn is_authorized(self) -> bool {
        self == AuthorizationStatus::Authorized
    }
}

/// Flash behaviour during still capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashMode {
    /// Flash never fires
    #[default]
    Off,
    /// Flash always fires
    On,
    /// Flash fires when the scene is dark
    Auto,
}

impl FlashMode {
    /// Cycle to the next mode: Off -> On -> Auto -> Off
    pub fn next(self) -> Self {
        match self {
            FlashMode::Off => FlashMode::On,
            FlashMode::On => FlashMode::Auto,
            FlashMode::Auto => FlashMode::Off,
        }
    }
}

/// Continuous LED (flashlight) behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TorchMode {
    #[default]
    Off,
    On,
    Auto,
}

/// Lens focus behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FocusMode {
    /// Lens position is fixed
    Locked,
    /// Single autofocus pass, then locked
    AutoFocus,
    /// Autofocus keeps tracking the scene
    #[default]
    ContinuousAutoFocus,
}

macro_rules! impl_mode_display {
    ($ty:ty { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($name),)+
                }
            }
        }

        impl std::str::FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($name => Ok(Self::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($ty), other)),
                }
            }
        }
    };
}

impl_mode_display!(FlashMode { Off => "off", On => "on", Auto => "auto" });
impl_mode_display!(TorchMode { Off => "off", On => "on", Auto => "auto" });
impl_mode_display!(FocusMode {
    Locked => "locked",
    AutoFocus => "auto",
    ContinuousAutoFocus => "continuous",
});

/// The runtime settings applied to a device as one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub flash: FlashMode,
    pub torch: TorchMode,
    pub focus: FocusMode,
}

/// A partial update to [`DeviceSettings`]
///
/// Fields left as `None` keep their current value. A change is validated and
/// applied as a whole: either every field lands or none does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SettingsChange {
    pub flash: Option<FlashMode>,
    pub torch: Option<TorchMode>,
    pub focus: Option<FocusMode>,
}

impl SettingsChange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flash(mut self, mode: FlashMode) -> Self {
        self.flash = Some(mode);
        self
    }

    pub fn torch(mut self, mode: TorchMode) -> Self {
        self.torch = Some(mode);
        self
    }

    pub fn focus(mut self, mode: FocusMode) -> Self {
        self.focus = Some(mode);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.flash.is_none() && self.torch.is_none() && self.focus.is_none()
    }

    /// The settings that result from applying this change on top of `current`
    pub fn applied_to(&self, current: &DeviceSettings) -> DeviceSettings {
        DeviceSettings {
            flash: self.flash.unwrap_or(current.flash),
            torch: self.torch.unwrap_or(current.torch),
            focus: self.focus.unwrap_or(current.focus),
        }
    }
}

/// What a device can do
///
/// The first entry of each mode list is the device's fallback for that
/// setting when a requested value is unsupported at setup time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub presets: Vec<SessionPreset>,
    pub flash_modes: Vec<FlashMode>,
    pub torch_modes: Vec<TorchMode>,
    pub focus_modes: Vec<FocusMode>,
}

impl DeviceCapabilities {
    /// A rear camera with an LED and an autofocus lens
    pub fn full() -> Self {
        Self {
            presets: SessionPreset::ALL.to_vec(),
            flash_modes: vec![FlashMode::Off, FlashMode::On, FlashMode::Auto],
            torch_modes: vec![TorchMode::Off, TorchMode::On, TorchMode::Auto],
            focus_modes: vec![
                FocusMode::ContinuousAutoFocus,
                FocusMode::AutoFocus,
                FocusMode::Locked,
            ],
        }
    }

    /// A fixed-focus camera without an LED
    pub fn basic(presets: &[SessionPreset]) -> Self {
        Self {
            presets: presets.to_vec(),
            flash_modes: vec![FlashMode::Off],
            torch_modes: vec![TorchMode::Off],
            focus_modes: vec![FocusMode::Locked],
        }
    }

    pub fn supports_preset(&self, preset: SessionPreset) -> bool {
        self.presets.contains(&preset)
    }

    pub fn has_flash(&self) -> bool {
        self.flash_modes.iter().any(|m| *m != FlashMode::Off)
    }

    pub fn has_torch(&self) -> bool {
        self.torch_modes.iter().any(|m| *m != TorchMode::Off)
    }

    /// Check every field of `settings`
    ///
    /// Fields are validated independently; the first unsupported one is
    /// reported.
    pub fn validate(&self, settings: &DeviceSettings) -> Result<(), CapabilityError> {
        if !self.flash_modes.contains(&settings.flash) {
            return Err(CapabilityError::FlashMode(settings.flash));
        }
        if !self.torch_modes.contains(&settings.torch) {
            return Err(CapabilityError::TorchMode(settings.torch));
        }
        if !self.focus_modes.contains(&settings.focus) {
            return Err(CapabilityError::FocusMode(settings.focus));
        }
        Ok(())
    }

    /// Replace unsupported fields with the device fallback
    pub fn sanitize(&self, settings: &DeviceSettings) -> DeviceSettings {
        fn pick<T: Copy + PartialEq + Default>(supported: &[T], wanted: T) -> T {
            if supported.contains(&wanted) {
                wanted
            } else {
                supported.first().copied().unwrap_or_default()
            }
        }

        DeviceSettings {
            flash: pick(&self.flash_modes, settings.flash),
            torch: pick(&self.torch_modes, settings.torch),
            focus: pick(&self.focus_modes, settings.focus),
        }
    }
}

/// Represents a camera device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    /// Stable backend identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    pub position: DevicePosition,
    pub capabilities: DeviceCapabilities,
}

/// One delivered video frame
#[derive(Debug, Clone)]
pub struct CameraFrame {
    /// Value of the session's active video frame counter when delivered
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// Pixel payload, shared without copying
    pub data: Arc<[u8]>,
    /// Camera that produced the frame
    pub position: DevicePosition,
    /// Device settings in effect for this frame
    pub settings: DeviceSettings,
    /// Timestamp when frame was captured (for latency diagnostics)
    pub captured_at: Instant,
}

/// Raw frame as produced by a [`FrameSource`](super::FrameSource)
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// No camera exists for the request
    DeviceNotFound(String),
    /// Camera is held by another pipeline
    DeviceBusy(String),
    /// The device cannot produce the requested preset
    PresetNotSupported(SessionPreset),
    /// The device rejected a settings transaction
    ConfigurationRejected(String),
    /// Device went away
    Disconnected,
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::DeviceBusy(msg) => write!(f, "Device busy: {}", msg),
            BackendError::PresetNotSupported(preset) => {
                write!(f, "Preset not supported: {}", preset)
            }
            BackendError::ConfigurationRejected(msg) => {
                write!(f, "Configuration rejected: {}", msg)
            }
            BackendError::Disconnected => write!(f, "Device disconnected"),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}
