// SPDX-License-Identifier: GPL-3.0-only

//! Video preview layer

use crate::backends::camera::types::{CameraFrame, DevicePosition};
use crate::session::SessionOutput;
use futures::Stream;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Display surface for one session's live video
///
/// Read-only: it observes the session's frame output and can never change
/// the session.
#[derive(Debug, Clone)]
pub struct VideoPreviewLayer {
    output: SessionOutput,
    frames: watch::Receiver<Option<Arc<CameraFrame>>>,
    mirror_front: bool,
}

impl VideoPreviewLayer {
    pub fn new(output: SessionOutput, mirror_front: bool) -> Self {
        Self {
            frames: output.subscribe_frames(),
            output,
            mirror_front,
        }
    }

    /// Session this layer displays
    pub fn session_id(&self) -> Uuid {
        self.output.session_id()
    }

    /// Output this layer is bound to
    pub fn output(&self) -> &SessionOutput {
        &self.output
    }

    /// Frames the session has delivered so far
    pub fn frames_delivered(&self) -> u64 {
        self.output.frames_delivered()
    }

    /// Most recent frame, if any was delivered
    pub fn latest_frame(&self) -> Option<Arc<CameraFrame>> {
        self.frames.borrow().clone()
    }

    /// Camera currently feeding the session
    pub fn position(&self) -> DevicePosition {
        self.output.position()
    }

    /// Front camera output is shown mirrored (selfie view) when enabled
    pub fn is_mirrored(&self) -> bool {
        self.mirror_front && self.position() == DevicePosition::Front
    }

    /// `false` once the session is gone
    pub fn is_live(&self) -> bool {
        self.output.is_live()
    }

    /// Wait for a frame newer than the last one seen through this layer
    ///
    /// Returns `None` once the session is gone.
    pub async fn next_frame(&mut self) -> Option<Arc<CameraFrame>> {
        loop {
            self.frames.changed().await.ok()?;
            if let Some(frame) = self.frames.borrow_and_update().clone() {
                return Some(frame);
            }
        }
    }

    /// Stream of frames as they arrive; frames arriving faster than the
    /// consumer polls are skipped
    pub fn frames(&self) -> impl Stream<Item = Arc<CameraFrame>> + Send + use<> {
        let mut frames = self.frames.clone();
        async_stream::stream! {
            while frames.changed().await.is_ok() {
                let frame = frames.borrow_and_update().clone();
                if let Some(frame) = frame {
                    yield frame;
                }
            }
        }
    }
}
