// SPDX-License-Identifier: GPL-3.0-only

//! Capture session lifecycle
//!
//! A [`CaptureSession`] owns one camera pipeline. All of its mutating work
//! (setup, start, pause, stop, settings changes) runs on the [`WorkQueue`]
//! handed to it at construction, strictly in submission order. Frame delivery
//! runs on its own thread and only shares atomics and watch channels with
//! the queue.
//!
//! Setup is queued by the constructor:
//!
//! 1. Authorization. If the user has not been asked yet, the queue is
//!    suspended while the platform prompt is up and resumed by the access
//!    completion, so configuration only runs once the answer is known.
//! 2. Configuration. The device for the requested position is discovered,
//!    opened with the session preset and given its initial settings.
//!
//! The outcome lands in [`setup_result`](CaptureSession::setup_result) and
//! never changes afterwards.
//!
//! After [`stop`](CaptureSession::stop) the device is released. A later
//! [`start`](CaptureSession::start) re-acquires it without asking for
//! authorization again; if that fails the start reports
//! [`SessionError::Configuration`] and the session stays stopped.
//!
//! A stream that ends without being asked to is settled on the queue: a
//! finished stream returns the session to [`RunState::Ready`], a failed device
//! is released and the session stops, reporting the error to the observer.
//!
//! Settings changes that the current camera cannot honour are rejected with
//! [`SessionError::Capability`]. A valid change the device refuses to commit
//! fails with [`SessionError::Backend`]. Either way the previous value stays
//! in place. Switching cameras adjusts the committed settings to what the new
//! camera supports and reports the result through
//! [`SessionObserver::settings_changed`].

mod output;
mod pending;
pub mod queue;
mod state;

pub use output::SessionOutput;
pub use pending::Pending;
pub use queue::WorkQueue;
pub use state::{RunState, SessionObserver, SetupResult};

use crate::backends::camera::frame_loop::{FrameLoopController, FrameSink, StreamEnd};
use crate::backends::camera::{
    AccessRequest, AuthorizationStatus, BackendError, BackendResult, CameraFrame, CaptureDevice,
    CaptureHardware, DevicePosition, DeviceSettings, FlashMode, FocusMode, SettingsChange,
    TorchMode,
};
use crate::constants::SessionPreset;
use crate::errors::{CapabilityError, SessionError, SessionResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// State readable from any thread
pub(crate) struct SessionShared {
    id: Uuid,
    preset: SessionPreset,
    hardware: Arc<dyn CaptureHardware>,
    setup: watch::Sender<Option<SetupResult>>,
    run_state: watch::Sender<RunState>,
    position: watch::Sender<DevicePosition>,
    /// Committed settings; frames stamp themselves with this value
    settings: watch::Sender<DeviceSettings>,
    active_video_frame: Arc<AtomicU64>,
    frames: Arc<watch::Sender<Option<Arc<CameraFrame>>>>,
    observer: Mutex<Option<Arc<dyn SessionObserver>>>,
}

impl SessionShared {
    pub(crate) fn output(&self) -> SessionOutput {
        SessionOutput {
            session_id: self.id,
            preset: self.preset,
            frames: self.frames.subscribe(),
            position: self.position.subscribe(),
            counter: Arc::clone(&self.active_video_frame),
        }
    }

    fn active_video_frame(&self) -> u64 {
        self.active_video_frame.load(Ordering::Relaxed)
    }

    fn setup_result(&self) -> Option<SetupResult> {
        *self.setup.borrow()
    }

    fn run_state(&self) -> RunState {
        *self.run_state.borrow()
    }

    fn position(&self) -> DevicePosition {
        *self.position.borrow()
    }

    fn settings(&self) -> DeviceSettings {
        *self.settings.borrow()
    }

    fn observer(&self) -> Option<Arc<dyn SessionObserver>> {
        self.observer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Record the setup outcome; later calls are ignored
    fn resolve_setup(&self, result: SetupResult) {
        let changed = self.setup.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(result);
            true
        });

        if changed {
            info!(session = %self.id, %result, "Capture session setup resolved");
            if let Some(observer) = self.observer() {
                observer.setup_resolved(result);
            }
        }
    }

    fn set_run_state(&self, state: RunState) {
        let previous = self.run_state.send_replace(state);
        if previous != state {
            debug!(session = %self.id, from = %previous, to = %state, "Run state changed");
            if let Some(observer) = self.observer() {
                observer.run_state_changed(state);
            }
        }
    }

    fn commit_settings(&self, settings: DeviceSettings) {
        let previous = self.settings.send_replace(settings);
        if previous != settings {
            if let Some(observer) = self.observer() {
                observer.settings_changed(settings);
            }
        }
    }

    fn report(&self, error: &SessionError) {
        warn!(session = %self.id, %error, "Capture session operation failed");
        if let Some(observer) = self.observer() {
            observer.runtime_error(error);
        }
    }

    /// Fail unless setup succeeded
    fn require_setup(&self) -> SessionResult<()> {
        match self.setup_result() {
            Some(SetupResult::Success) => Ok(()),
            other => Err(SessionError::NotConfigured(other)),
        }
    }

    /// Discover, open and configure the camera at `position`
    ///
    /// On any failure the opened device is dropped, releasing it.
    fn acquire(&self, position: DevicePosition) -> BackendResult<Box<dyn CaptureDevice>> {
        let device = self
            .hardware
            .discover(position)
            .ok_or_else(|| BackendError::DeviceNotFound(format!("no {} camera", position)))?;

        if !device.capabilities.supports_preset(self.preset) {
            return Err(BackendError::PresetNotSupported(self.preset));
        }

        let mut handle = self.hardware.open(&device, self.preset)?;

        let wanted = self.settings();
        let settings = handle.capabilities().sanitize(&wanted);
        if settings != wanted {
            info!(
                device = %device.name,
                ?wanted,
                ?settings,
                "Adjusted settings to device capabilities"
            );
        }
        handle.apply(&settings)?;
        self.commit_settings(settings);

        info!(device = %device.name, preset = %self.preset, "Capture device acquired");
        Ok(handle)
    }
}

/// Routes frame-thread notifications back onto the work queue
struct StreamLink {
    shared: Weak<SessionShared>,
    inner: Weak<Mutex<SessionInner>>,
    queue: WorkQueue,
}

impl StreamLink {
    /// Queue the handling of a stream that ended on its own
    ///
    /// Called from the frame thread; never waits on the queue.
    fn stream_ended(&self, generation: u64, end: StreamEnd) {
        let shared = Weak::clone(&self.shared);
        let inner = Weak::clone(&self.inner);
        self.queue.dispatch(move || {
            let (Some(shared), Some(inner)) = (shared.upgrade(), inner.upgrade()) else {
                return;
            };
            lock_inner(&inner).finish_stream(&shared, generation, end);
        });
    }
}

/// State touched only from the work queue
struct SessionInner {
    access: Option<AccessRequest>,
    device: Option<Box<dyn CaptureDevice>>,
    frame_loop: Option<FrameLoopController>,
    /// Bumped on every stream start; stale end notifications are ignored
    stream_generation: u64,
    link: Arc<StreamLink>,
}

impl SessionInner {
    fn begin_streaming(&mut self, shared: &SessionShared) -> SessionResult<()> {
        let device = self
            .device
            .as_mut()
            .ok_or(SessionError::NotConfigured(shared.setup_result()))?;

        let source = device.start_streaming()?;
        let position = shared.position();
        let sink = FrameSink {
            counter: Arc::clone(&shared.active_video_frame),
            frames: Arc::clone(&shared.frames),
            settings: shared.settings.subscribe(),
            position,
        };

        self.stream_generation += 1;
        let generation = self.stream_generation;
        let link = Arc::clone(&self.link);
        self.frame_loop = Some(FrameLoopController::deliver(
            &format!("capture-frames-{}", position),
            source,
            sink,
            move |end| link.stream_ended(generation, end),
        ));
        shared.set_run_state(RunState::Running);
        Ok(())
    }

    /// Whether frames are actually flowing
    fn is_delivering(&self) -> bool {
        self.frame_loop.as_ref().is_some_and(|l| l.is_running())
    }

    /// Settle the session after its stream ended without being asked to
    ///
    /// A finished stream leaves the device held and the session ready to
    /// start again. A failed device is released and the session stops.
    fn finish_stream(&mut self, shared: &SessionShared, generation: u64, end: StreamEnd) {
        if generation != self.stream_generation || shared.run_state() != RunState::Running {
            debug!(session = %shared.id, generation, "Ignoring stale stream end");
            return;
        }

        self.halt_streaming();
        match end {
            StreamEnd::Finished => {
                info!(session = %shared.id, "Capture stream ended");
                shared.set_run_state(RunState::Ready);
            }
            StreamEnd::Failed(e) => {
                self.teardown(shared);
                shared.report(&SessionError::Backend(e));
            }
        }
    }

    fn halt_streaming(&mut self) {
        if let Some(mut frame_loop) = self.frame_loop.take() {
            frame_loop.request_stop();
            if let Some(device) = self.device.as_mut()
                && device.is_streaming()
            {
                device.stop_streaming();
            }
            frame_loop.stop();
        }
    }

    /// Stop everything and release the device
    fn teardown(&mut self, shared: &SessionShared) {
        self.halt_streaming();
        if let Some(device) = self.device.take() {
            info!(device = %device.info().name, "Releasing capture device");
            drop(device);
        }
        if shared.run_state().holds_device() {
            shared.set_run_state(RunState::Stopped);
        }
    }
}

/// A camera capture pipeline
///
/// Construction queues the setup pass and returns immediately; use
/// [`wait_for_setup`](Self::wait_for_setup) or
/// [`setup_result`](Self::setup_result) before enabling capture controls.
///
/// Dropping the session queues a final teardown that releases the device.
pub struct CaptureSession {
    shared: Arc<SessionShared>,
    inner: Arc<Mutex<SessionInner>>,
    queue: WorkQueue,
}

fn lock_inner(inner: &Mutex<SessionInner>) -> MutexGuard<'_, SessionInner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

impl CaptureSession {
    /// Create a session for the camera at `position`
    ///
    /// * `preset` - fixed output resolution of the pipeline
    /// * `position` - camera to open
    /// * `queue` - serialized context for every mutating operation
    /// * `hardware` - platform capture subsystem
    pub fn new(
        preset: SessionPreset,
        position: DevicePosition,
        queue: WorkQueue,
        hardware: Arc<dyn CaptureHardware>,
    ) -> Self {
        let session = Self::new_unscheduled(preset, position, queue, hardware);
        session.schedule_setup();
        session
    }

    /// Like [`new`](Self::new), starting from `settings` instead of the
    /// defaults; unsupported values fall back to what the device offers
    pub fn with_settings(
        preset: SessionPreset,
        position: DevicePosition,
        settings: DeviceSettings,
        queue: WorkQueue,
        hardware: Arc<dyn CaptureHardware>,
    ) -> Self {
        let session = Self::new_unscheduled(preset, position, queue, hardware);
        session.shared.settings.send_replace(settings);
        session.schedule_setup();
        session
    }

    fn new_unscheduled(
        preset: SessionPreset,
        position: DevicePosition,
        queue: WorkQueue,
        hardware: Arc<dyn CaptureHardware>,
    ) -> Self {
        let id = Uuid::new_v4();
        info!(session = %id, %preset, %position, queue = %queue.label(), "Creating capture session");

        let (frames, _) = watch::channel(None);
        let shared = Arc::new(SessionShared {
            id,
            preset,
            hardware,
            setup: watch::Sender::new(None),
            run_state: watch::Sender::new(RunState::Configuring),
            position: watch::Sender::new(position),
            settings: watch::Sender::new(DeviceSettings::default()),
            active_video_frame: Arc::new(AtomicU64::new(0)),
            frames: Arc::new(frames),
            observer: Mutex::new(None),
        });
        let inner = Arc::new_cyclic(|inner| {
            Mutex::new(SessionInner {
                access: None,
                device: None,
                frame_loop: None,
                stream_generation: 0,
                link: Arc::new(StreamLink {
                    shared: Arc::downgrade(&shared),
                    inner: Weak::clone(inner),
                    queue: queue.clone(),
                }),
            })
        });

        Self {
            shared,
            inner,
            queue,
        }
    }

    fn schedule_setup(&self) {
        // Authorization
        let shared = Arc::clone(&self.shared);
        let inner = Arc::clone(&self.inner);
        let queue = self.queue.clone();
        self.queue.dispatch(move || {
            let status = shared.hardware.authorization_status();
            debug!(session = %shared.id, ?status, "Camera authorization status");

            let request = match status {
                AuthorizationStatus::Authorized => AccessRequest::resolved(true),
                AuthorizationStatus::Denied | AuthorizationStatus::Restricted => {
                    AccessRequest::resolved(false)
                }
                AuthorizationStatus::NotDetermined => {
                    let request = AccessRequest::pending();
                    // Configuration stays queued until the user answers
                    queue.suspend();
                    let resume = queue.clone();
                    info!(session = %shared.id, "Requesting camera access");
                    shared
                        .hardware
                        .request_access(request.completion(move || resume.resume()));
                    request
                }
            };
            lock_inner(&inner).access = Some(request);
        });

        // Configuration
        let shared = Arc::clone(&self.shared);
        let inner = Arc::clone(&self.inner);
        self.queue.dispatch(move || {
            let mut inner = lock_inner(&inner);

            let granted = match inner.access.as_ref().and_then(|r| r.granted()) {
                Some(granted) => granted,
                None => {
                    warn!(session = %shared.id, "Authorization still pending at configuration");
                    false
                }
            };
            if !granted {
                shared.resolve_setup(SetupResult::CameraNotAuthorized);
                shared.set_run_state(RunState::Inert);
                return;
            }

            match shared.acquire(shared.position()) {
                Ok(device) => {
                    inner.device = Some(device);
                    shared.resolve_setup(SetupResult::Success);
                    shared.set_run_state(RunState::Ready);
                }
                Err(e) => {
                    warn!(session = %shared.id, error = %e, "Capture session configuration failed");
                    shared.resolve_setup(SetupResult::SessionConfigurationFailed);
                    shared.set_run_state(RunState::Inert);
                }
            }
        });
    }

    /// Run `op` on the work queue with exclusive access to the session
    fn submit<T, F>(&self, op: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&SessionShared, &mut SessionInner) -> SessionResult<T> + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let inner = Arc::clone(&self.inner);
        self.queue.run(move || {
            let result = op(&*shared, &mut lock_inner(&inner));
            if let Err(e) = &result {
                shared.report(e);
            }
            result
        })
    }

    // ===== Lifecycle =====

    /// Start delivering frames
    ///
    /// Fails with [`SessionError::NotConfigured`] without touching the
    /// hardware unless setup succeeded. Idempotent while running; resumes a
    /// paused pipeline; re-acquires the device after [`stop`](Self::stop).
    pub fn start(&self) -> Pending<()> {
        self.submit(|shared, inner| {
            shared.require_setup()?;

            match shared.run_state() {
                RunState::Running if inner.is_delivering() => Ok(()),
                RunState::Running => {
                    // Stream died and its end has not been handled yet
                    warn!(session = %shared.id, "Frame loop not running, restarting stream");
                    inner.halt_streaming();
                    inner.begin_streaming(shared)
                }
                RunState::Ready | RunState::Paused => inner.begin_streaming(shared),
                RunState::Stopped => {
                    info!(session = %shared.id, "Re-acquiring capture device");
                    let device = shared
                        .acquire(shared.position())
                        .map_err(SessionError::Configuration)?;
                    inner.device = Some(device);
                    shared.set_run_state(RunState::Ready);
                    inner.begin_streaming(shared)
                }
                RunState::Configuring | RunState::Inert => {
                    Err(SessionError::NotConfigured(shared.setup_result()))
                }
            }
        })
    }

    /// Suspend frame delivery, keeping the device
    ///
    /// No-op unless running.
    pub fn pause(&self) -> Pending<()> {
        self.submit(|shared, inner| {
            if shared.run_state() == RunState::Running {
                inner.halt_streaming();
                shared.set_run_state(RunState::Paused);
                info!(session = %shared.id, "Capture session paused");
            }
            Ok(())
        })
    }

    /// Tear down the pipeline and release the device
    ///
    /// Safe at any time. Issued before setup finishes, it runs right after
    /// setup.
    pub fn stop(&self) -> Pending<()> {
        self.submit(|shared, inner| {
            inner.teardown(shared);
            info!(session = %shared.id, "Capture session stopped");
            Ok(())
        })
    }

    // ===== Runtime properties =====

    /// Switch to the camera at `position`
    ///
    /// Rejected with [`SessionError::Busy`] while running or paused. When
    /// the session holds a device, the new camera is opened before the old
    /// one is released, so a failed switch keeps the current camera.
    ///
    /// Settings the new camera cannot honour fall back to its defaults and
    /// are not restored when switching back.
    pub fn set_position(&self, position: DevicePosition) -> Pending<()> {
        self.submit(move |shared, inner| {
            shared.require_setup()?;
            if shared.position() == position {
                return Ok(());
            }

            match shared.run_state() {
                RunState::Running | RunState::Paused => {
                    return Err(SessionError::Busy("change camera position"));
                }
                RunState::Ready => {
                    let device = shared.acquire(position).map_err(|e| match e {
                        BackendError::DeviceNotFound(_) => {
                            SessionError::Capability(CapabilityError::Position(position))
                        }
                        BackendError::PresetNotSupported(preset) => {
                            SessionError::Capability(CapabilityError::Preset(preset))
                        }
                        other => SessionError::Backend(other),
                    })?;
                    // Old device released here
                    inner.device = Some(device);
                }
                _ => {
                    let device = shared
                        .hardware
                        .discover(position)
                        .ok_or(CapabilityError::Position(position))?;
                    if !device.capabilities.supports_preset(shared.preset) {
                        return Err(CapabilityError::Preset(shared.preset).into());
                    }
                }
            }

            shared.position.send_replace(position);
            info!(session = %shared.id, %position, "Camera position changed");
            Ok(())
        })
    }

    pub fn set_flash_mode(&self, mode: FlashMode) -> Pending<()> {
        self.apply_settings(SettingsChange::new().flash(mode))
    }

    pub fn set_torch_mode(&self, mode: TorchMode) -> Pending<()> {
        self.apply_settings(SettingsChange::new().torch(mode))
    }

    pub fn set_focus_mode(&self, mode: FocusMode) -> Pending<()> {
        self.apply_settings(SettingsChange::new().focus(mode))
    }

    /// Apply several settings as one transaction
    ///
    /// Each field is validated against the current camera independently of
    /// the others. If any is unsupported the change fails with
    /// [`SessionError::Capability`]; if the device refuses the transaction it
    /// fails with [`SessionError::Backend`]. Either way nothing changes.
    pub fn apply_settings(&self, change: SettingsChange) -> Pending<()> {
        self.submit(move |shared, inner| {
            shared.require_setup()?;
            if change.is_empty() {
                return Ok(());
            }

            let current = shared.settings();
            let next = change.applied_to(&current);

            let capabilities = match inner.device.as_ref() {
                Some(device) => device.capabilities().clone(),
                None => {
                    let position = shared.position();
                    shared
                        .hardware
                        .discover(position)
                        .ok_or(CapabilityError::Position(position))?
                        .capabilities
                }
            };
            capabilities.validate(&next)?;

            if next == current {
                return Ok(());
            }
            if let Some(device) = inner.device.as_mut() {
                device.apply(&next)?;
            }
            shared.commit_settings(next);
            debug!(session = %shared.id, settings = ?next, "Device settings committed");
            Ok(())
        })
    }

    /// Install the event observer, replacing any previous one
    pub fn set_observer(&self, observer: Arc<dyn SessionObserver>) {
        *self
            .shared
            .observer
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(observer);
    }

    // ===== Accessors =====

    /// Unique identifier of this session
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn session_preset(&self) -> SessionPreset {
        self.shared.preset
    }

    /// `None` while setup is pending
    pub fn setup_result(&self) -> Option<SetupResult> {
        self.shared.setup_result()
    }

    /// Resolves once setup has finished
    pub async fn wait_for_setup(&self) -> SetupResult {
        let mut setup = self.shared.setup.subscribe();
        match setup.wait_for(Option::is_some).await {
            Ok(result) => (*result).unwrap_or(SetupResult::SessionConfigurationFailed),
            Err(_) => SetupResult::SessionConfigurationFailed,
        }
    }

    pub fn run_state(&self) -> RunState {
        self.shared.run_state()
    }

    /// Watch run state transitions
    pub fn subscribe_run_state(&self) -> watch::Receiver<RunState> {
        self.shared.run_state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.run_state() == RunState::Running
    }

    pub fn position(&self) -> DevicePosition {
        self.shared.position()
    }

    pub fn settings(&self) -> DeviceSettings {
        self.shared.settings()
    }

    pub fn flash_mode(&self) -> FlashMode {
        self.settings().flash
    }

    pub fn torch_mode(&self) -> TorchMode {
        self.settings().torch
    }

    pub fn focus_mode(&self) -> FocusMode {
        self.settings().focus
    }

    /// Number of frames delivered so far; never decreases
    pub fn active_video_frame(&self) -> u64 {
        self.shared.active_video_frame()
    }

    /// Read-only handle to the pipeline's video output
    pub fn output(&self) -> SessionOutput {
        self.shared.output()
    }

    /// The queue this session runs on
    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    pub(crate) fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        let shared = Arc::clone(&self.shared);
        let inner = Arc::clone(&self.inner);
        self.queue.dispatch(move || {
            lock_inner(&inner).teardown(&shared);
            debug!(session = %shared.id, "Capture session dropped");
        });
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("id", &self.shared.id)
            .field("preset", &self.shared.preset)
            .field("position", &self.position())
            .field("setup_result", &self.setup_result())
            .field("run_state", &self.run_state())
            .finish()
    }
}
