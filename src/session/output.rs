// SPDX-License-Identifier: GPL-3.0-only

//! Read-only view of a session's video output

use crate::backends::camera::types::{CameraFrame, DevicePosition};
use crate::constants::SessionPreset;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use uuid::Uuid;

/// Video output of a capture pipeline
///
/// Handed to consumers such as previews and recorders. It can observe the
/// pipeline but has no way to change it.
#[derive(Debug, Clone)]
pub struct SessionOutput {
    pub(crate) session_id: Uuid,
    pub(crate) preset: SessionPreset,
    pub(crate) frames: watch::Receiver<Option<Arc<CameraFrame>>>,
    pub(crate) position: watch::Receiver<DevicePosition>,
    pub(crate) counter: Arc<AtomicU64>,
}

impl SessionOutput {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn preset(&self) -> SessionPreset {
        self.preset
    }

    /// Camera currently feeding the pipeline
    pub fn position(&self) -> DevicePosition {
        *self.position.borrow()
    }

    pub fn latest_frame(&self) -> Option<Arc<CameraFrame>> {
        self.frames.borrow().clone()
    }

    /// Active video frame counter of the session
    pub fn frames_delivered(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    /// New receiver for published frames
    pub fn subscribe_frames(&self) -> watch::Receiver<Option<Arc<CameraFrame>>> {
        self.frames.clone()
    }

    pub fn subscribe_position(&self) -> watch::Receiver<DevicePosition> {
        self.position.clone()
    }

    /// `false` once the session is gone
    pub fn is_live(&self) -> bool {
        self.frames.has_changed().is_ok()
    }
}
