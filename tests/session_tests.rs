// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the capture session lifecycle

use capture::backends::camera::{
    AccessCompletion, AccessPolicy, AuthorizationStatus, BackendError, BackendResult,
    CameraDevice, CaptureDevice, CaptureHardware, DeviceCapabilities, DevicePosition,
    DeviceSettings, FlashMode, FocusMode, FrameSource, RawFrame, SettingsChange, TorchMode,
    VirtualCameraSpec, VirtualHardware,
};
use capture::errors::CapabilityError;
use capture::{
    CaptureSession, RunState, SessionError, SessionObserver, SessionPreset, SetupResult,
    WorkQueue,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const FAST: Duration = Duration::from_millis(1);

fn fast_hardware() -> VirtualHardware {
    VirtualHardware::new(vec![
        VirtualCameraSpec::back().with_frame_interval(FAST),
        VirtualCameraSpec::front().with_frame_interval(FAST),
    ])
}

fn open_session(
    hardware: &VirtualHardware,
    preset: SessionPreset,
    position: DevicePosition,
) -> CaptureSession {
    let queue = WorkQueue::new("test.session").unwrap();
    CaptureSession::new(preset, position, queue, Arc::new(hardware.clone()))
}

/// Session on the back camera with setup finished
fn ready_session(hardware: &VirtualHardware) -> CaptureSession {
    let session = open_session(hardware, SessionPreset::High, DevicePosition::Back);
    session.queue().barrier().wait().unwrap();
    assert_eq!(session.setup_result(), Some(SetupResult::Success));
    session
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(1));
    }
}

// ===== Setup =====

#[test]
fn test_setup_acquires_device() {
    let hardware = fast_hardware();
    let session = ready_session(&hardware);

    assert_eq!(session.run_state(), RunState::Ready);
    assert!(hardware.is_held(DevicePosition::Back));
    assert_eq!(hardware.open_count(), 1);
    assert_eq!(
        hardware.applied_settings(DevicePosition::Back),
        Some(DeviceSettings::default())
    );
}

#[test]
fn test_denied_authorization_never_touches_hardware() {
    let hardware = fast_hardware().with_authorization(AuthorizationStatus::Denied);
    let session = open_session(&hardware, SessionPreset::High, DevicePosition::Back);

    assert_eq!(
        session.start().wait(),
        Err(SessionError::NotConfigured(Some(
            SetupResult::CameraNotAuthorized
        )))
    );
    assert_eq!(session.setup_result(), Some(SetupResult::CameraNotAuthorized));
    assert_eq!(session.run_state(), RunState::Inert);
    assert_eq!(hardware.access_requests(), 0);
    assert_eq!(hardware.device_calls(), 0);
    assert_eq!(hardware.open_count(), 0);
}

#[test]
fn test_restricted_authorization_is_not_authorized() {
    let hardware = fast_hardware().with_authorization(AuthorizationStatus::Restricted);
    let session = open_session(&hardware, SessionPreset::High, DevicePosition::Back);
    session.queue().barrier().wait().unwrap();

    assert_eq!(session.setup_result(), Some(SetupResult::CameraNotAuthorized));
    assert_eq!(hardware.access_requests(), 0);
}

#[test]
fn test_prompt_denied_by_user() {
    let hardware = fast_hardware()
        .with_authorization(AuthorizationStatus::NotDetermined)
        .with_access_policy(AccessPolicy::Deny);
    let session = open_session(&hardware, SessionPreset::High, DevicePosition::Back);
    session.queue().barrier().wait().unwrap();

    assert_eq!(session.setup_result(), Some(SetupResult::CameraNotAuthorized));
    assert_eq!(hardware.access_requests(), 1);
    assert_eq!(hardware.device_calls(), 0);
}

#[test]
fn test_prompt_granted_by_user() {
    let hardware = fast_hardware()
        .with_authorization(AuthorizationStatus::NotDetermined)
        .with_access_policy(AccessPolicy::Grant);
    let session = open_session(&hardware, SessionPreset::High, DevicePosition::Back);
    session.queue().barrier().wait().unwrap();

    assert_eq!(session.setup_result(), Some(SetupResult::Success));
    assert_eq!(hardware.access_requests(), 1);
}

#[test]
fn test_configuration_waits_for_authorization_answer() {
    let hardware = fast_hardware()
        .with_authorization(AuthorizationStatus::NotDetermined)
        .with_access_policy(AccessPolicy::Manual);
    let session = open_session(&hardware, SessionPreset::High, DevicePosition::Back);

    wait_until("access prompt", || hardware.pending_requests() == 1);
    let started = session.start();

    thread::sleep(Duration::from_millis(20));
    assert!(session.queue().is_suspended());
    assert_eq!(session.setup_result(), None);
    assert_eq!(session.run_state(), RunState::Configuring);
    assert_eq!(hardware.device_calls(), 0);

    assert_eq!(hardware.answer_pending(true), 1);
    assert_eq!(started.wait(), Ok(()));
    assert_eq!(session.setup_result(), Some(SetupResult::Success));
    assert!(session.is_running());
}

#[test]
fn test_unsupported_preset_fails_configuration() {
    let hardware = fast_hardware();
    let session = open_session(&hardware, SessionPreset::Uhd, DevicePosition::Front);
    session.queue().barrier().wait().unwrap();

    assert_eq!(
        session.setup_result(),
        Some(SetupResult::SessionConfigurationFailed)
    );
    assert_eq!(session.run_state(), RunState::Inert);
    assert_eq!(hardware.held_count(), 0);
    assert_eq!(
        session.start().wait(),
        Err(SessionError::NotConfigured(Some(
            SetupResult::SessionConfigurationFailed
        )))
    );
}

#[test]
fn test_missing_camera_fails_configuration() {
    let hardware = VirtualHardware::new(vec![VirtualCameraSpec::back().with_frame_interval(FAST)]);
    let session = open_session(&hardware, SessionPreset::High, DevicePosition::Front);
    session.queue().barrier().wait().unwrap();

    assert_eq!(
        session.setup_result(),
        Some(SetupResult::SessionConfigurationFailed)
    );
}

#[test]
fn test_busy_device_fails_configuration() {
    let hardware = fast_hardware();
    let _first = ready_session(&hardware);
    let second = open_session(&hardware, SessionPreset::High, DevicePosition::Back);
    second.queue().barrier().wait().unwrap();

    assert_eq!(
        second.setup_result(),
        Some(SetupResult::SessionConfigurationFailed)
    );
    assert_eq!(hardware.open_count(), 1);
}

#[test]
fn test_initial_settings_fall_back_to_device_modes() {
    let hardware = fast_hardware();
    let wanted = DeviceSettings {
        flash: FlashMode::On,
        torch: TorchMode::Off,
        focus: FocusMode::ContinuousAutoFocus,
    };
    let session = CaptureSession::with_settings(
        SessionPreset::Medium,
        DevicePosition::Front,
        wanted,
        WorkQueue::new("test.settings").unwrap(),
        Arc::new(hardware.clone()),
    );
    session.queue().barrier().wait().unwrap();

    assert_eq!(session.setup_result(), Some(SetupResult::Success));
    assert_eq!(session.flash_mode(), FlashMode::Off);
    assert_eq!(session.focus_mode(), FocusMode::Locked);
    assert_eq!(
        hardware.applied_settings(DevicePosition::Front),
        Some(session.settings())
    );
}

// ===== Lifecycle =====

#[test]
fn test_start_delivers_frames() {
    let hardware = fast_hardware();
    let session = ready_session(&hardware);

    session.start().wait().unwrap();
    assert!(session.is_running());
    wait_until("frames", || session.active_video_frame() >= 5);

    session.stop().wait().unwrap();
    assert_eq!(session.run_state(), RunState::Stopped);
}

#[test]
fn test_start_is_idempotent() {
    let hardware = fast_hardware();
    let session = ready_session(&hardware);

    session.start().wait().unwrap();
    session.start().wait().unwrap();
    assert!(session.is_running());
    assert_eq!(hardware.open_count(), 1);
}

#[test]
fn test_pause_keeps_device() {
    let hardware = fast_hardware();
    let session = ready_session(&hardware);

    session.start().wait().unwrap();
    wait_until("frames", || session.active_video_frame() > 0);
    session.pause().wait().unwrap();

    assert_eq!(session.run_state(), RunState::Paused);
    assert!(hardware.is_held(DevicePosition::Back));

    let paused_at = session.active_video_frame();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(session.active_video_frame(), paused_at);

    session.start().wait().unwrap();
    wait_until("frames after resume", || {
        session.active_video_frame() > paused_at
    });
    assert_eq!(hardware.open_count(), 1);

    session.stop().wait().unwrap();
    assert!(!hardware.is_held(DevicePosition::Back));
}

#[test]
fn test_pause_when_not_running_is_noop() {
    let hardware = fast_hardware();
    let session = ready_session(&hardware);

    session.pause().wait().unwrap();
    assert_eq!(session.run_state(), RunState::Ready);
}

#[test]
fn test_stop_while_paused_releases_device() {
    let hardware = fast_hardware();
    let session = ready_session(&hardware);

    session.start().wait().unwrap();
    wait_until("frames", || session.active_video_frame() > 0);
    session.pause().wait().unwrap();
    session.stop().wait().unwrap();

    assert_eq!(session.run_state(), RunState::Stopped);
    assert_eq!(hardware.release_count(), 1);
    assert_eq!(hardware.held_count(), 0);

    let stopped_at = session.active_video_frame();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(session.active_video_frame(), stopped_at);
}

#[test]
fn test_stop_releases_and_start_reacquires() {
    let hardware = fast_hardware();
    let session = ready_session(&hardware);

    session.start().wait().unwrap();
    session.stop().wait().unwrap();
    assert!(!hardware.is_held(DevicePosition::Back));
    assert_eq!(hardware.release_count(), 1);

    session.start().wait().unwrap();
    assert!(session.is_running());
    assert!(hardware.is_held(DevicePosition::Back));
    assert_eq!(hardware.open_count(), 2);
    assert_eq!(hardware.access_requests(), 0);

    session.stop().wait().unwrap();
    assert_eq!(hardware.release_count(), 2);
}

#[test]
fn test_failed_reacquire_keeps_session_stopped() {
    let hardware = fast_hardware();
    let session = ready_session(&hardware);
    session.stop().wait().unwrap();

    // Someone else grabs the camera in the meantime
    let other = ready_session(&hardware);

    assert!(matches!(
        session.start().wait(),
        Err(SessionError::Configuration(BackendError::DeviceBusy(_)))
    ));
    assert_eq!(session.run_state(), RunState::Stopped);
    assert_eq!(session.setup_result(), Some(SetupResult::Success));

    drop(other);
}

#[test]
fn test_stop_before_setup_runs_after_setup() {
    let hardware = fast_hardware()
        .with_authorization(AuthorizationStatus::NotDetermined)
        .with_access_policy(AccessPolicy::Manual);
    let session = open_session(&hardware, SessionPreset::High, DevicePosition::Back);

    wait_until("access prompt", || hardware.pending_requests() == 1);
    let stopped = session.stop();
    hardware.answer_pending(true);

    assert_eq!(stopped.wait(), Ok(()));
    assert_eq!(session.setup_result(), Some(SetupResult::Success));
    assert_eq!(session.run_state(), RunState::Stopped);
    assert_eq!(hardware.held_count(), 0);
}

#[test]
fn test_stop_on_failed_session_is_harmless() {
    let hardware = fast_hardware().with_authorization(AuthorizationStatus::Denied);
    let session = open_session(&hardware, SessionPreset::High, DevicePosition::Back);

    assert_eq!(session.stop().wait(), Ok(()));
    assert_eq!(session.run_state(), RunState::Inert);
}

#[test]
fn test_active_video_frame_is_monotonic() {
    let hardware = fast_hardware();
    let session = ready_session(&hardware);
    session.start().wait().unwrap();

    let mut last = 0;
    for _ in 0..50 {
        let current = session.active_video_frame();
        assert!(current >= last);
        last = current;
        thread::sleep(Duration::from_micros(500));
    }

    session.stop().wait().unwrap();
    let after_stop = session.active_video_frame();
    assert!(after_stop >= last);

    session.start().wait().unwrap();
    wait_until("frames after restart", || {
        session.active_video_frame() > after_stop
    });
}

#[test]
fn test_dropping_session_releases_device() {
    let hardware = fast_hardware();
    let session = ready_session(&hardware);
    session.start().wait().unwrap();

    let queue = session.queue().clone();
    drop(session);
    queue.barrier().wait().unwrap();

    assert_eq!(hardware.held_count(), 0);
    assert_eq!(hardware.release_count(), 1);
}

// ===== Settings =====

#[test]
fn test_back_to_back_settings_changes_all_land() {
    let hardware = fast_hardware();
    let session = ready_session(&hardware);

    session.set_flash_mode(FlashMode::On).detach();
    session.set_focus_mode(FocusMode::Locked).detach();
    session.set_torch_mode(TorchMode::Auto).detach();
    session.queue().barrier().wait().unwrap();

    let expected = DeviceSettings {
        flash: FlashMode::On,
        torch: TorchMode::Auto,
        focus: FocusMode::Locked,
    };
    assert_eq!(session.settings(), expected);
    assert_eq!(
        hardware.applied_settings(DevicePosition::Back),
        Some(expected)
    );
}

fn full_change(settings: DeviceSettings) -> SettingsChange {
    SettingsChange::new()
        .flash(settings.flash)
        .torch(settings.torch)
        .focus(settings.focus)
}

#[test]
fn test_concurrent_joint_changes_never_reach_frames_half_applied() {
    let hardware = fast_hardware();
    let session = ready_session(&hardware);
    let initial = session.settings();
    let day = DeviceSettings {
        flash: FlashMode::On,
        torch: TorchMode::On,
        focus: FocusMode::Locked,
    };
    let night = DeviceSettings {
        flash: FlashMode::Auto,
        torch: TorchMode::Auto,
        focus: FocusMode::AutoFocus,
    };

    session.start().wait().unwrap();
    let output = session.output();
    let mut seen = HashSet::new();

    thread::scope(|scope| {
        let writers: Vec<_> = (0..4)
            .map(|writer| {
                let session = &session;
                scope.spawn(move || {
                    for round in 0..25 {
                        let target = if (writer + round) % 2 == 0 { day } else { night };
                        session.apply_settings(full_change(target)).wait().unwrap();
                        thread::sleep(Duration::from_micros(300));
                    }
                })
            })
            .collect();

        while writers.iter().any(|w| !w.is_finished()) {
            if let Some(frame) = output.latest_frame() {
                seen.insert(frame.settings);
            }
            thread::sleep(Duration::from_micros(200));
        }
    });

    let settled = session.settings();
    assert!(settled == day || settled == night);
    assert_eq!(hardware.applied_settings(DevicePosition::Back), Some(settled));

    let after = session.active_video_frame();
    wait_until("frames after the last change", || {
        session.active_video_frame() > after + 1
    });
    seen.insert(output.latest_frame().unwrap().settings);
    assert_eq!(output.latest_frame().unwrap().settings, settled);

    assert!(!seen.is_empty());
    for settings in &seen {
        assert!(
            [initial, day, night].contains(settings),
            "frame carried mixed settings {:?}",
            settings
        );
    }
    session.stop().wait().unwrap();
}

#[test]
fn test_unsupported_mode_keeps_previous_value() {
    let hardware = fast_hardware();
    let session = open_session(&hardware, SessionPreset::High, DevicePosition::Front);

    assert_eq!(
        session.set_flash_mode(FlashMode::On).wait(),
        Err(SessionError::Capability(CapabilityError::FlashMode(
            FlashMode::On
        )))
    );
    assert_eq!(session.flash_mode(), FlashMode::Off);

    assert_eq!(
        session.set_focus_mode(FocusMode::AutoFocus).wait(),
        Err(SessionError::Capability(CapabilityError::FocusMode(
            FocusMode::AutoFocus
        )))
    );
    assert_eq!(session.focus_mode(), FocusMode::Locked);
}

#[test]
fn test_joint_change_is_all_or_nothing() {
    let no_torch = DeviceCapabilities {
        torch_modes: vec![TorchMode::Off],
        ..DeviceCapabilities::full()
    };
    let hardware = VirtualHardware::new(vec![
        VirtualCameraSpec::back()
            .with_frame_interval(FAST)
            .with_capabilities(no_torch),
    ]);
    let session = ready_session(&hardware);
    let before = session.settings();

    let result = session
        .apply_settings(
            SettingsChange::new()
                .flash(FlashMode::On)
                .torch(TorchMode::On),
        )
        .wait();

    assert_eq!(
        result,
        Err(SessionError::Capability(CapabilityError::TorchMode(
            TorchMode::On
        )))
    );
    assert_eq!(session.settings(), before);
    assert_eq!(hardware.applied_settings(DevicePosition::Back), Some(before));
}

#[test]
fn test_joint_change_order_does_not_matter() {
    let hardware = fast_hardware();
    let session = ready_session(&hardware);

    session
        .apply_settings(
            SettingsChange::new()
                .focus(FocusMode::AutoFocus)
                .flash(FlashMode::Auto),
        )
        .wait()
        .unwrap();

    assert_eq!(session.flash_mode(), FlashMode::Auto);
    assert_eq!(session.focus_mode(), FocusMode::AutoFocus);
}

#[test]
fn test_device_refusal_keeps_settings() {
    let hardware = fast_hardware();
    let session = ready_session(&hardware);
    hardware.set_reject_settings(true);

    assert!(matches!(
        session.set_torch_mode(TorchMode::On).wait(),
        Err(SessionError::Backend(BackendError::ConfigurationRejected(_)))
    ));
    assert_eq!(session.torch_mode(), TorchMode::Off);
}

#[test]
fn test_settings_before_setup_require_configuration() {
    let hardware = fast_hardware().with_authorization(AuthorizationStatus::Denied);
    let session = open_session(&hardware, SessionPreset::High, DevicePosition::Back);

    assert!(matches!(
        session.set_flash_mode(FlashMode::On).wait(),
        Err(SessionError::NotConfigured(_))
    ));
}

#[test]
fn test_settings_while_stopped_apply_on_restart() {
    let hardware = fast_hardware();
    let session = ready_session(&hardware);
    session.stop().wait().unwrap();

    session.set_flash_mode(FlashMode::Auto).wait().unwrap();
    assert_eq!(session.flash_mode(), FlashMode::Auto);

    session.start().wait().unwrap();
    assert_eq!(
        hardware
            .applied_settings(DevicePosition::Back)
            .map(|s| s.flash),
        Some(FlashMode::Auto)
    );
}

// ===== Position =====

#[test]
fn test_position_change_rejected_while_running() {
    let hardware = fast_hardware();
    let session = ready_session(&hardware);
    session.start().wait().unwrap();

    assert!(matches!(
        session.set_position(DevicePosition::Front).wait(),
        Err(SessionError::Busy(_))
    ));
    assert_eq!(session.position(), DevicePosition::Back);
}

#[test]
fn test_position_change_when_ready_swaps_device() {
    let hardware = fast_hardware();
    let session = ready_session(&hardware);
    session.set_flash_mode(FlashMode::On).wait().unwrap();

    session.set_position(DevicePosition::Front).wait().unwrap();

    assert_eq!(session.position(), DevicePosition::Front);
    assert!(hardware.is_held(DevicePosition::Front));
    assert!(!hardware.is_held(DevicePosition::Back));
    assert_eq!(session.flash_mode(), FlashMode::Off);

    session.start().wait().unwrap();
    wait_until("front frames", || session.active_video_frame() > 0);
}

#[test]
fn test_position_change_reports_adjusted_settings() {
    let hardware = fast_hardware();
    let session = ready_session(&hardware);
    let observer = Arc::new(RecordingObserver::default());
    session.set_observer(observer.clone());

    session.set_flash_mode(FlashMode::On).wait().unwrap();
    session.set_position(DevicePosition::Front).wait().unwrap();

    let reported = observer.settings();
    assert_eq!(reported.len(), 2);
    assert_eq!(reported[0].flash, FlashMode::On);
    assert_eq!(reported[1], session.settings());
    assert_eq!(reported[1].flash, FlashMode::Off);

    session.set_position(DevicePosition::Back).wait().unwrap();
    assert_eq!(session.flash_mode(), FlashMode::Off);
    assert!(observer.errors().is_empty());
}

#[test]
fn test_position_change_to_missing_camera_keeps_current() {
    let hardware = VirtualHardware::new(vec![VirtualCameraSpec::back().with_frame_interval(FAST)]);
    let session = ready_session(&hardware);

    assert_eq!(
        session.set_position(DevicePosition::Front).wait(),
        Err(SessionError::Capability(CapabilityError::Position(
            DevicePosition::Front
        )))
    );
    assert_eq!(session.position(), DevicePosition::Back);
    assert!(hardware.is_held(DevicePosition::Back));
}

#[test]
fn test_position_change_while_stopped_applies_on_start() {
    let hardware = fast_hardware();
    let session = ready_session(&hardware);
    session.stop().wait().unwrap();

    session.set_position(DevicePosition::Front).wait().unwrap();
    assert_eq!(hardware.held_count(), 0);

    session.start().wait().unwrap();
    assert!(hardware.is_held(DevicePosition::Front));
}

// ===== Observer =====

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<String>>,
    errors: Mutex<Vec<SessionError>>,
    settings: Mutex<Vec<DeviceSettings>>,
}

impl RecordingObserver {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn errors(&self) -> Vec<SessionError> {
        self.errors.lock().unwrap().clone()
    }

    fn settings(&self) -> Vec<DeviceSettings> {
        self.settings.lock().unwrap().clone()
    }
}

impl SessionObserver for RecordingObserver {
    fn setup_resolved(&self, result: SetupResult) {
        self.events.lock().unwrap().push(format!("setup:{}", result));
    }

    fn run_state_changed(&self, state: RunState) {
        self.events.lock().unwrap().push(format!("state:{}", state));
    }

    fn runtime_error(&self, error: &SessionError) {
        self.events.lock().unwrap().push("error".to_string());
        self.errors.lock().unwrap().push(error.clone());
    }

    fn settings_changed(&self, settings: DeviceSettings) {
        self.settings.lock().unwrap().push(settings);
    }
}

#[test]
fn test_observer_sees_lifecycle_in_order() {
    let hardware = fast_hardware();
    let queue = WorkQueue::new("test.observer").unwrap();
    queue.suspend();

    let session = CaptureSession::new(
        SessionPreset::High,
        DevicePosition::Back,
        queue.clone(),
        Arc::new(hardware.clone()),
    );
    let observer = Arc::new(RecordingObserver::default());
    session.set_observer(observer.clone());
    queue.resume();

    session.start().wait().unwrap();
    session.stop().wait().unwrap();
    let _ = session.set_position(DevicePosition::Front).wait();
    let _ = session.set_flash_mode(FlashMode::On).wait();

    assert_eq!(
        observer.events(),
        vec![
            "setup:success",
            "state:ready",
            "state:running",
            "state:stopped",
            "error",
        ]
    );
}

// ===== Streams that end by themselves =====

const STREAM_LENGTH: u64 = 3;

/// One back camera whose stream stops after [`STREAM_LENGTH`] frames
///
/// With `failure` set the stream ends in that error, otherwise it finishes.
struct EndingHardware {
    failure: Option<BackendError>,
    releases: Arc<AtomicUsize>,
}

impl EndingHardware {
    fn new(failure: Option<BackendError>) -> Self {
        Self {
            failure,
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl CaptureHardware for EndingHardware {
    fn authorization_status(&self) -> AuthorizationStatus {
        AuthorizationStatus::Authorized
    }

    fn request_access(&self, completion: AccessCompletion) {
        completion.complete(true);
    }

    fn devices(&self) -> Vec<CameraDevice> {
        vec![CameraDevice {
            id: "ending:back".to_string(),
            name: "Ending Camera".to_string(),
            position: DevicePosition::Back,
            capabilities: DeviceCapabilities::full(),
        }]
    }

    fn open(
        &self,
        device: &CameraDevice,
        _preset: SessionPreset,
    ) -> BackendResult<Box<dyn CaptureDevice>> {
        Ok(Box::new(EndingDevice {
            info: device.clone(),
            failure: self.failure.clone(),
            streaming: false,
            releases: Arc::clone(&self.releases),
        }))
    }
}

struct EndingDevice {
    info: CameraDevice,
    failure: Option<BackendError>,
    streaming: bool,
    releases: Arc<AtomicUsize>,
}

impl CaptureDevice for EndingDevice {
    fn info(&self) -> &CameraDevice {
        &self.info
    }

    fn apply(&mut self, _settings: &DeviceSettings) -> BackendResult<()> {
        Ok(())
    }

    fn start_streaming(&mut self) -> BackendResult<Box<dyn FrameSource>> {
        self.streaming = true;
        Ok(Box::new(EndingSource {
            remaining: STREAM_LENGTH,
            failure: self.failure.clone(),
        }))
    }

    fn stop_streaming(&mut self) {
        self.streaming = false;
    }

    fn is_streaming(&self) -> bool {
        self.streaming
    }
}

impl Drop for EndingDevice {
    fn drop(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

struct EndingSource {
    remaining: u64,
    failure: Option<BackendError>,
}

impl FrameSource for EndingSource {
    fn next_frame(&mut self) -> BackendResult<Option<RawFrame>> {
        if self.remaining == 0 {
            return match &self.failure {
                Some(error) => Err(error.clone()),
                None => Ok(None),
            };
        }
        self.remaining -= 1;
        thread::sleep(FAST);
        Ok(Some(RawFrame {
            width: 4,
            height: 2,
            data: Arc::from(vec![0u8; 8]),
        }))
    }
}

fn ending_session(hardware: EndingHardware) -> (CaptureSession, Arc<RecordingObserver>) {
    let queue = WorkQueue::new("test.ending").unwrap();
    queue.suspend();
    let session = CaptureSession::new(
        SessionPreset::High,
        DevicePosition::Back,
        queue.clone(),
        Arc::new(hardware),
    );
    let observer = Arc::new(RecordingObserver::default());
    session.set_observer(observer.clone());
    queue.resume();
    queue.barrier().wait().unwrap();
    assert_eq!(session.setup_result(), Some(SetupResult::Success));
    (session, observer)
}

#[test]
fn test_disconnected_stream_stops_session() {
    let hardware = EndingHardware::new(Some(BackendError::Disconnected));
    let releases = Arc::clone(&hardware.releases);
    let (session, observer) = ending_session(hardware);

    session.start().wait().unwrap();
    wait_until("disconnect handled", || {
        session.run_state() == RunState::Stopped
    });
    session.queue().barrier().wait().unwrap();

    assert_eq!(session.active_video_frame(), STREAM_LENGTH);
    assert_eq!(releases.load(Ordering::SeqCst), 1);
    assert_eq!(
        observer.errors(),
        vec![SessionError::Backend(BackendError::Disconnected)]
    );
    assert!(observer.events().ends_with(&[
        "state:running".to_string(),
        "state:stopped".to_string(),
        "error".to_string(),
    ]));

    // A later start opens the camera again
    session.start().wait().unwrap();
    wait_until("second stream", || {
        session.active_video_frame() == 2 * STREAM_LENGTH
            && session.run_state() == RunState::Stopped
    });
    session.queue().barrier().wait().unwrap();
    assert_eq!(releases.load(Ordering::SeqCst), 2);
    assert_eq!(observer.errors().len(), 2);
}

#[test]
fn test_finished_stream_returns_to_ready() {
    let hardware = EndingHardware::new(None);
    let releases = Arc::clone(&hardware.releases);
    let (session, observer) = ending_session(hardware);

    session.start().wait().unwrap();
    wait_until("stream finished", || session.run_state() == RunState::Ready);
    session.queue().barrier().wait().unwrap();

    assert_eq!(session.active_video_frame(), STREAM_LENGTH);
    assert_eq!(releases.load(Ordering::SeqCst), 0);
    assert!(observer.errors().is_empty());

    session.start().wait().unwrap();
    wait_until("second stream", || {
        session.active_video_frame() == 2 * STREAM_LENGTH
            && session.run_state() == RunState::Ready
    });

    session.stop().wait().unwrap();
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}
