// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capture session presets
///
/// A preset fixes the output resolution of a capture pipeline. It is chosen
/// once when the session is built and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPreset {
    /// 640x480, for low-bandwidth streaming
    Low,
    /// 1280x720
    Medium,
    /// 1920x1080 (default)
    #[default]
    High,
    /// 3840x2160, only on sensors that can deliver it
    Uhd,
    /// Full sensor resolution at 4:3, photo quality
    Photo,
}

impl SessionPreset {
    /// All presets ordered from lowest to highest resolution
    pub const ALL: [SessionPreset; 5] = [
        SessionPreset::Low,
        SessionPreset::Medium,
        SessionPreset::High,
        SessionPreset::Uhd,
        SessionPreset::Photo,
    ];

    /// Get display name for the preset
    pub fn display_name(&self) -> &'static str {
        match self {
            SessionPreset::Low => "Low (480p)",
            SessionPreset::Medium => "Medium (720p)",
            SessionPreset::High => "High (1080p)",
            SessionPreset::Uhd => "UHD (2160p)",
            SessionPreset::Photo => "Photo",
        }
    }

    /// Output frame dimensions (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            SessionPreset::Low => (640, 480),
            SessionPreset::Medium => (1280, 720),
            SessionPreset::High => (1920, 1080),
            SessionPreset::Uhd => (3840, 2160),
            SessionPreset::Photo => (4032, 3024),
        }
    }

    /// Pixel count of one frame
    pub fn pixel_count(&self) -> u64 {
        let (w, h) = self.dimensions();
        w as u64 * h as u64
    }
}

impl std::fmt::Display for SessionPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionPreset::Low => "low",
            SessionPreset::Medium => "medium",
            SessionPreset::High => "high",
            SessionPreset::Uhd => "uhd",
            SessionPreset::Photo => "photo",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for SessionPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "480p" => Ok(SessionPreset::Low),
            "medium" | "720p" => Ok(SessionPreset::Medium),
            "high" | "1080p" => Ok(SessionPreset::High),
            "uhd" | "4k" | "2160p" => Ok(SessionPreset::Uhd),
            "photo" => Ok(SessionPreset::Photo),
            other => Err(format!("unknown session preset '{}'", other)),
        }
    }
}

/// Timing constants for the capture pipeline
pub mod timing {
    use super::Duration;

    /// Frame interval of the virtual backend (~30 fps)
    pub const VIRTUAL_FRAME_INTERVAL: Duration = Duration::from_millis(33);

    /// Back-off after a frame source reports a transient error
    pub const FRAME_ERROR_BACKOFF: Duration = Duration::from_millis(10);

    /// Log a frame-loop heartbeat every N frames
    pub const FRAME_LOG_INTERVAL: u64 = 300;
}

/// Label given to a session's work queue thread when none is supplied
pub const DEFAULT_QUEUE_LABEL: &str = "capture.session";

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
