// SPDX-License-Identifier: GPL-3.0-only

//! Capture - camera capture session lifecycle
//!
//! This library manages a single camera capture pipeline: authorization,
//! one-time configuration, start/pause/stop, live device settings and a
//! passive preview binding.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Capture hardware abstraction and the virtual backend
//! - [`session`]: The capture session, its work queue and state machine
//! - [`preview`]: Preview surfaces bound to a session
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```no_run
//! use capture::backends::camera::{DevicePosition, VirtualHardware};
//! use capture::{CaptureSession, SessionPreset, SetupResult, WorkQueue};
//! use std::sync::Arc;
//!
//! let queue = WorkQueue::new("capture.session").unwrap();
//! let session = CaptureSession::new(
//!     SessionPreset::High,
//!     DevicePosition::Back,
//!     queue,
//!     Arc::new(VirtualHardware::standard()),
//! );
//! session.queue().barrier().wait().unwrap();
//! if session.setup_result() == Some(SetupResult::Success) {
//!     session.start().wait().unwrap();
//! }
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod preview;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use constants::SessionPreset;
pub use errors::{SessionError, SessionResult};
pub use preview::{CapturePreview, VideoPreviewLayer};
pub use session::{
    CaptureSession, Pending, RunState, SessionObserver, SessionOutput, SetupResult, WorkQueue,
};
