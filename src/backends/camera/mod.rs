// SPDX-License-Identifier: GPL-3.0-only

//! Capture hardware abstraction
//!
//! The session never talks to a camera API directly. Platforms plug in by
//! implementing the traits below.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │   Owner (UI layer)  │
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │   CaptureSession    │  ← Authorization, lifecycle, settings
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ CaptureHardware     │  ← Enumeration, access, open
//! │  └ CaptureDevice    │  ← Settings transactions, streaming
//! │     └ FrameSource   │  ← Frame pull, runs on the frame loop
//! └──────────┬──────────┘
//!            │
//!            ▼
//!      ┌───────────┐
//!      │  Virtual  │  ← In-process implementation
//!      └───────────┘
//! ```

pub mod authorization;
pub mod frame_loop;
pub mod types;
pub mod virtual_device;

pub use authorization::{AccessCompletion, AccessRequest, AccessState};
pub use types::*;
pub use virtual_device::{AccessPolicy, VirtualCameraSpec, VirtualHardware};

use crate::constants::SessionPreset;

/// Platform capture subsystem
///
/// Shared between sessions; implementations arbitrate device access
/// themselves.
pub trait CaptureHardware: Send + Sync {
    // ===== Authorization =====

    /// Current camera access authorization
    fn authorization_status(&self) -> AuthorizationStatus;

    /// Ask the user for camera access
    ///
    /// The completion may be invoked on any thread, at any later time.
    /// Implementations must either call it or drop it.
    fn request_access(&self, completion: AccessCompletion);

    // ===== Enumeration =====

    /// All cameras known to the platform
    fn devices(&self) -> Vec<CameraDevice>;

    /// The camera at `position`, if any
    fn discover(&self, position: DevicePosition) -> Option<CameraDevice> {
        self.devices().into_iter().find(|d| d.position == position)
    }

    // ===== Lifecycle =====

    /// Acquire exclusive use of `device` and build a pipeline for `preset`
    ///
    /// The returned device holds the hardware until it is dropped.
    fn open(
        &self,
        device: &CameraDevice,
        preset: SessionPreset,
    ) -> BackendResult<Box<dyn CaptureDevice>>;
}

/// An opened camera
///
/// Dropping the value releases the hardware.
pub trait CaptureDevice: Send {
    /// Device this handle was opened for
    fn info(&self) -> &CameraDevice;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.info().capabilities
    }

    /// Apply `settings` as a single transaction
    ///
    /// On error the device keeps its previous settings.
    fn apply(&mut self, settings: &DeviceSettings) -> BackendResult<()>;

    /// Begin streaming and hand out the frame source for the delivery loop
    fn start_streaming(&mut self) -> BackendResult<Box<dyn FrameSource>>;

    /// Stop streaming; outstanding frame sources end
    fn stop_streaming(&mut self);

    fn is_streaming(&self) -> bool;
}

/// Pull side of a streaming device
pub trait FrameSource: Send {
    /// Block until the next frame is ready
    ///
    /// `Ok(None)` signals the end of the stream.
    fn next_frame(&mut self) -> BackendResult<Option<RawFrame>>;
}
