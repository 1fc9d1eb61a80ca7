// SPDX-License-Identifier: GPL-3.0-only

//! Capture preview
//!
//! A passive binding between a display surface and a capture session. The
//! preview keeps only a weak reference: binding, rebinding or dropping a
//! preview never starts, stops or keeps alive a session.

mod layer;

pub use layer::VideoPreviewLayer;

use crate::session::{CaptureSession, SessionShared};
use std::sync::{Arc, Weak};
use tracing::{debug, info};
use uuid::Uuid;

struct PreviewBinding {
    session: Weak<SessionShared>,
    layer: VideoPreviewLayer,
}

impl PreviewBinding {
    fn is_alive(&self) -> bool {
        self.session.strong_count() > 0
    }
}

/// Displays whatever session is bound to it
pub struct CapturePreview {
    binding: Option<PreviewBinding>,
    mirror_front: bool,
}

impl CapturePreview {
    /// Unbound preview, mirroring the front camera
    pub fn new() -> Self {
        Self {
            binding: None,
            mirror_front: true,
        }
    }

    /// Enable or disable selfie mirroring for the front camera
    pub fn with_mirroring(mut self, mirror_front: bool) -> Self {
        self.mirror_front = mirror_front;
        self
    }

    /// Bind to `session`, or unbind with `None`
    ///
    /// The previous session is left untouched.
    pub fn set_session(&mut self, session: Option<&CaptureSession>) {
        let binding = session.map(|session| {
            let shared = session.shared();
            PreviewBinding {
                session: Arc::downgrade(shared),
                layer: VideoPreviewLayer::new(session.output(), self.mirror_front),
            }
        });

        match &binding {
            Some(b) => info!(session = %b.layer.session_id(), "Preview bound to session"),
            None => debug!("Preview unbound"),
        }
        self.binding = binding;
    }

    /// Currently bound session, if it is still alive
    pub fn session_id(&self) -> Option<Uuid> {
        self.live_binding().map(|b| b.layer.session_id())
    }

    pub fn is_bound(&self) -> bool {
        self.live_binding().is_some()
    }

    /// Layer for the bound session; `None` when unbound or the session is gone
    pub fn video_preview_layer(&self) -> Option<&VideoPreviewLayer> {
        self.live_binding().map(|b| &b.layer)
    }

    /// Frames delivered by the bound session so far
    pub fn frames_delivered(&self) -> Option<u64> {
        self.live_binding().map(|b| b.layer.frames_delivered())
    }

    fn live_binding(&self) -> Option<&PreviewBinding> {
        self.binding.as_ref().filter(|b| b.is_alive())
    }
}

impl Default for CapturePreview {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CapturePreview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturePreview")
            .field("session", &self.session_id())
            .field("mirror_front", &self.mirror_front)
            .finish()
    }
}
