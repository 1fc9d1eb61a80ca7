// SPDX-License-Identifier: GPL-3.0-only

//! Virtual capture backend
//!
//! An in-process implementation of [`CaptureHardware`] that simulates a set
//! of cameras. It enforces the same rules a real platform does: access must
//! be authorized before a device opens, and a device can only be held by one
//! pipeline at a time. Every hardware interaction is counted so callers can
//! check that sessions acquire and release devices correctly.

use super::authorization::AccessCompletion;
use super::types::*;
use super::{CaptureDevice, CaptureHardware, FrameSource};
use crate::constants::{SessionPreset, timing};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Description of one simulated camera
#[derive(Debug, Clone)]
pub struct VirtualCameraSpec {
    pub name: String,
    pub position: DevicePosition,
    pub capabilities: DeviceCapabilities,
    pub frame_interval: Duration,
}

impl VirtualCameraSpec {
    /// Rear camera with flash, torch and autofocus, all presets
    pub fn back() -> Self {
        Self {
            name: "Virtual Back Camera".to_string(),
            position: DevicePosition::Back,
            capabilities: DeviceCapabilities::full(),
            frame_interval: timing::VIRTUAL_FRAME_INTERVAL,
        }
    }

    /// Fixed-focus front camera without LED, up to 1080p
    pub fn front() -> Self {
        Self {
            name: "Virtual Front Camera".to_string(),
            position: DevicePosition::Front,
            capabilities: DeviceCapabilities::basic(&[
                SessionPreset::Low,
                SessionPreset::Medium,
                SessionPreset::High,
            ]),
            frame_interval: timing::VIRTUAL_FRAME_INTERVAL,
        }
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    fn id(&self) -> String {
        format!("virtual:{}", self.position)
    }

    fn device(&self) -> CameraDevice {
        CameraDevice {
            id: self.id(),
            name: self.name.clone(),
            position: self.position,
            capabilities: self.capabilities.clone(),
        }
    }
}

/// How the virtual platform answers access requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPolicy {
    /// Grant from a background thread
    Grant,
    /// Deny from a background thread
    Deny,
    /// Hold the completion until [`VirtualHardware::answer_pending`]
    Manual,
}

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    releases: AtomicUsize,
    device_calls: AtomicUsize,
    access_requests: AtomicUsize,
}

struct HardwareState {
    cameras: Vec<VirtualCameraSpec>,
    status: Mutex<AuthorizationStatus>,
    policy: Mutex<AccessPolicy>,
    parked: Mutex<Vec<AccessCompletion>>,
    held: Mutex<HashSet<String>>,
    applied: Mutex<HashMap<String, DeviceSettings>>,
    reject_settings: AtomicBool,
    counters: Counters,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Simulated capture platform
///
/// Cloning yields another handle to the same platform.
#[derive(Clone)]
pub struct VirtualHardware {
    state: Arc<HardwareState>,
}

impl VirtualHardware {
    /// Platform with the given cameras, access already authorized
    pub fn new(cameras: Vec<VirtualCameraSpec>) -> Self {
        info!(count = cameras.len(), "Creating virtual capture hardware");
        Self {
            state: Arc::new(HardwareState {
                cameras,
                status: Mutex::new(AuthorizationStatus::Authorized),
                policy: Mutex::new(AccessPolicy::Grant),
                parked: Mutex::new(Vec::new()),
                held: Mutex::new(HashSet::new()),
                applied: Mutex::new(HashMap::new()),
                reject_settings: AtomicBool::new(false),
                counters: Counters::default(),
            }),
        }
    }

    /// A back and a front camera
    pub fn standard() -> Self {
        Self::new(vec![VirtualCameraSpec::back(), VirtualCameraSpec::front()])
    }

    pub fn with_authorization(self, status: AuthorizationStatus) -> Self {
        *lock(&self.state.status) = status;
        self
    }

    pub fn with_access_policy(self, policy: AccessPolicy) -> Self {
        *lock(&self.state.policy) = policy;
        self
    }

    /// Answer every parked access request
    ///
    /// Completions run on the calling thread.
    pub fn answer_pending(&self, granted: bool) -> usize {
        let parked: Vec<AccessCompletion> = lock(&self.state.parked).drain(..).collect();
        *lock(&self.state.status) = if granted {
            AuthorizationStatus::Authorized
        } else {
            AuthorizationStatus::Denied
        };
        let count = parked.len();
        for completion in parked {
            completion.complete(granted);
        }
        count
    }

    /// Number of access requests waiting for [`answer_pending`](Self::answer_pending)
    pub fn pending_requests(&self) -> usize {
        lock(&self.state.parked).len()
    }

    /// Make every following settings transaction fail at the device
    pub fn set_reject_settings(&self, reject: bool) {
        self.state.reject_settings.store(reject, Ordering::SeqCst);
    }

    /// Times any device was opened
    pub fn open_count(&self) -> usize {
        self.state.counters.opens.load(Ordering::SeqCst)
    }

    /// Times any device was released
    pub fn release_count(&self) -> usize {
        self.state.counters.releases.load(Ordering::SeqCst)
    }

    /// Device-level calls of any kind (open, apply, stream start/stop)
    pub fn device_calls(&self) -> usize {
        self.state.counters.device_calls.load(Ordering::SeqCst)
    }

    pub fn access_requests(&self) -> usize {
        self.state.counters.access_requests.load(Ordering::SeqCst)
    }

    /// Number of devices currently held open
    pub fn held_count(&self) -> usize {
        lock(&self.state.held).len()
    }

    pub fn is_held(&self, position: DevicePosition) -> bool {
        lock(&self.state.held).contains(&format!("virtual:{}", position))
    }

    /// Settings most recently committed to the camera at `position`
    pub fn applied_settings(&self, position: DevicePosition) -> Option<DeviceSettings> {
        lock(&self.state.applied)
            .get(&format!("virtual:{}", position))
            .copied()
    }
}

impl std::fmt::Debug for VirtualHardware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualHardware")
            .field("cameras", &self.state.cameras.len())
            .field("held", &self.held_count())
            .finish()
    }
}

impl CaptureHardware for VirtualHardware {
    fn authorization_status(&self) -> AuthorizationStatus {
        *lock(&self.state.status)
    }

    fn request_access(&self, completion: AccessCompletion) {
        self.state
            .counters
            .access_requests
            .fetch_add(1, Ordering::SeqCst);

        let policy = *lock(&self.state.policy);
        debug!(?policy, "Virtual access request");

        match policy {
            AccessPolicy::Manual => lock(&self.state.parked).push(completion),
            AccessPolicy::Grant | AccessPolicy::Deny => {
                let granted = policy == AccessPolicy::Grant;
                let state = Arc::clone(&self.state);
                // Answer from an unrelated thread, like a system prompt does
                thread::spawn(move || {
                    *lock(&state.status) = if granted {
                        AuthorizationStatus::Authorized
                    } else {
                        AuthorizationStatus::Denied
                    };
                    completion.complete(granted);
                });
            }
        }
    }

    fn devices(&self) -> Vec<CameraDevice> {
        self.state.cameras.iter().map(|c| c.device()).collect()
    }

    fn open(
        &self,
        device: &CameraDevice,
        preset: SessionPreset,
    ) -> BackendResult<Box<dyn CaptureDevice>> {
        self.state
            .counters
            .device_calls
            .fetch_add(1, Ordering::SeqCst);

        if !self.authorization_status().is_authorized() {
            return Err(BackendError::Other("camera access not authorized".to_string()));
        }

        let spec = self
            .state
            .cameras
            .iter()
            .find(|c| c.id() == device.id)
            .ok_or_else(|| BackendError::DeviceNotFound(device.id.clone()))?;

        if !spec.capabilities.supports_preset(preset) {
            return Err(BackendError::PresetNotSupported(preset));
        }

        if !lock(&self.state.held).insert(spec.id()) {
            return Err(BackendError::DeviceBusy(spec.id()));
        }

        self.state.counters.opens.fetch_add(1, Ordering::SeqCst);
        info!(device = %spec.name, %preset, "Virtual device opened");

        Ok(Box::new(VirtualDevice {
            state: Arc::clone(&self.state),
            info: spec.device(),
            preset,
            frame_interval: spec.frame_interval,
            settings: DeviceSettings::default(),
            streaming: Arc::new(AtomicBool::new(false)),
            payload: Arc::from(vec![spec.position as u8; 64]),
        }))
    }
}

struct VirtualDevice {
    state: Arc<HardwareState>,
    info: CameraDevice,
    preset: SessionPreset,
    frame_interval: Duration,
    settings: DeviceSettings,
    streaming: Arc<AtomicBool>,
    payload: Arc<[u8]>,
}

impl CaptureDevice for VirtualDevice {
    fn info(&self) -> &CameraDevice {
        &self.info
    }

    fn apply(&mut self, settings: &DeviceSettings) -> BackendResult<()> {
        self.state
            .counters
            .device_calls
            .fetch_add(1, Ordering::SeqCst);

        if self.state.reject_settings.load(Ordering::SeqCst) {
            return Err(BackendError::ConfigurationRejected(
                "device refused configuration lock".to_string(),
            ));
        }
        self.info
            .capabilities
            .validate(settings)
            .map_err(|e| BackendError::ConfigurationRejected(e.to_string()))?;

        self.settings = *settings;
        lock(&self.state.applied).insert(self.info.id.clone(), self.settings);
        debug!(device = %self.info.name, ?settings, "Virtual device settings committed");
        Ok(())
    }

    fn start_streaming(&mut self) -> BackendResult<Box<dyn FrameSource>> {
        self.state
            .counters
            .device_calls
            .fetch_add(1, Ordering::SeqCst);

        // A new source replaces any previous one
        self.streaming.store(false, Ordering::SeqCst);
        self.streaming = Arc::new(AtomicBool::new(true));

        let (width, height) = self.preset.dimensions();
        Ok(Box::new(VirtualFrameSource {
            streaming: Arc::clone(&self.streaming),
            interval: self.frame_interval,
            width,
            height,
            payload: Arc::clone(&self.payload),
        }))
    }

    fn stop_streaming(&mut self) {
        self.state
            .counters
            .device_calls
            .fetch_add(1, Ordering::SeqCst);
        self.streaming.store(false, Ordering::SeqCst);
    }

    fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }
}

impl Drop for VirtualDevice {
    fn drop(&mut self) {
        self.streaming.store(false, Ordering::SeqCst);
        if lock(&self.state.held).remove(&self.info.id) {
            self.state.counters.releases.fetch_add(1, Ordering::SeqCst);
            info!(device = %self.info.name, "Virtual device released");
        } else {
            warn!(device = %self.info.name, "Released a device that was not held");
        }
    }
}

struct VirtualFrameSource {
    streaming: Arc<AtomicBool>,
    interval: Duration,
    width: u32,
    height: u32,
    payload: Arc<[u8]>,
}

impl FrameSource for VirtualFrameSource {
    fn next_frame(&mut self) -> BackendResult<Option<RawFrame>> {
        if !self.streaming.load(Ordering::SeqCst) {
            return Ok(None);
        }

        thread::sleep(self.interval);

        if !self.streaming.load(Ordering::SeqCst) {
            return Ok(None);
        }

        Ok(Some(RawFrame {
            width: self.width,
            height: self.height,
            data: Arc::clone(&self.payload),
        }))
    }
}
