// SPDX-License-Identifier: GPL-3.0-only

//! Camera access authorization plumbing
//!
//! Platforms answer an access request through a completion callback that may
//! run on any thread. [`AccessRequest`] turns that callback into a two-state
//! value (pending → resolved) that the session reads back on its own work
//! queue.

use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// State of an authorization request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessState {
    /// The platform has not answered yet
    Pending,
    /// The platform answered; `true` when access was granted
    Resolved(bool),
}

/// Shared slot holding the answer to one authorization request
#[derive(Debug, Clone)]
pub struct AccessRequest {
    state: Arc<Mutex<AccessState>>,
}

impl AccessRequest {
    /// A request still waiting for the platform
    pub fn pending() -> Self {
        Self {
            state: Arc::new(Mutex::new(AccessState::Pending)),
        }
    }

    /// A request whose answer is already known
    pub fn resolved(granted: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(AccessState::Resolved(granted))),
        }
    }

    pub fn state(&self) -> AccessState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `Some(granted)` once resolved
    pub fn granted(&self) -> Option<bool> {
        match self.state() {
            AccessState::Pending => None,
            AccessState::Resolved(granted) => Some(granted),
        }
    }

    /// Build the completion handed to the platform
    ///
    /// `on_resolved` runs right after the answer is stored, on whatever
    /// thread the platform completes on.
    pub fn completion<F>(&self, on_resolved: F) -> AccessCompletion
    where
        F: FnOnce() + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        AccessCompletion::new(move |granted| {
            {
                let mut slot = state.lock().unwrap_or_else(|e| e.into_inner());
                // First answer wins
                if *slot == AccessState::Pending {
                    *slot = AccessState::Resolved(granted);
                }
            }
            on_resolved();
        })
    }
}

/// One-shot callback answering an access request
///
/// Dropping a completion without calling [`complete`](Self::complete) counts
/// as a denial, so a request can never stay pending forever because a backend
/// lost the callback.
pub struct AccessCompletion {
    callback: Option<Box<dyn FnOnce(bool) + Send + 'static>>,
}

impl AccessCompletion {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(bool) + Send + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// Deliver the user's answer
    pub fn complete(mut self, granted: bool) {
        if let Some(callback) = self.callback.take() {
            debug!(granted, "Camera access request answered");
            callback(granted);
        }
    }
}

impl Drop for AccessCompletion {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            warn!("Camera access request dropped without an answer, treating as denied");
            callback(false);
        }
    }
}

impl std::fmt::Debug for AccessCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessCompletion")
            .field("answered", &self.callback.is_none())
            .finish()
    }
}
