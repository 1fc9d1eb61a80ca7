// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for capture sessions
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Running a session against the virtual backend
//! - Showing how a session behaves when access is denied

use capture::backends::camera::{
    AccessPolicy, AuthorizationStatus, CaptureHardware, DevicePosition, FlashMode, FocusMode,
    SettingsChange, TorchMode, VirtualCameraSpec, VirtualHardware,
};
use capture::constants::{SessionPreset, app_info};
use capture::{CapturePreview, CaptureSession, Config, SetupResult, WorkQueue};
use chrono::Local;
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Options for [`run_session`]; unset values come from the config file
pub struct RunOptions {
    pub position: Option<DevicePosition>,
    pub preset: Option<SessionPreset>,
    pub frames: u64,
    pub timeout: Duration,
    pub flash: Option<FlashMode>,
    pub torch: Option<TorchMode>,
    pub focus: Option<FocusMode>,
}

fn virtual_hardware(config: &Config) -> VirtualHardware {
    let interval = config.frame_interval();
    VirtualHardware::new(vec![
        VirtualCameraSpec::back().with_frame_interval(interval),
        VirtualCameraSpec::front().with_frame_interval(interval),
    ])
}

/// List all available cameras
pub fn list_cameras() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let cameras = virtual_hardware(&config).devices();

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for camera in &cameras {
        println!("  [{}] {}", camera.position, camera.name);

        let caps = &camera.capabilities;
        let presets: Vec<String> = caps
            .presets
            .iter()
            .map(|p| {
                let (w, h) = p.dimensions();
                format!("{} ({}x{})", p, w, h)
            })
            .collect();
        println!("      Presets: {}", presets.join(", "));
        println!(
            "      Flash: {}  Torch: {}",
            if caps.has_flash() { "yes" } else { "no" },
            if caps.has_torch() { "yes" } else { "no" }
        );

        let focus: Vec<String> = caps.focus_modes.iter().map(|m| m.to_string()).collect();
        println!("      Focus: {}", focus.join(", "));
        println!();
    }

    Ok(())
}

/// Set up a session, stream the requested number of frames and stop
pub fn run_session(options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let position = options.position.unwrap_or(config.position);
    let preset = options.preset.unwrap_or(config.preset);

    println!("capture {}", app_info::version());
    println!("Started: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!("Camera: {}  Preset: {}", position, preset.display_name());

    let hardware = Arc::new(virtual_hardware(&config));
    let queue = WorkQueue::new(&config.queue_label)?;
    let session = CaptureSession::with_settings(
        preset,
        position,
        config.settings,
        queue,
        Arc::clone(&hardware) as Arc<dyn CaptureHardware>,
    );

    let mut preview = CapturePreview::new().with_mirroring(config.mirror_preview);
    preview.set_session(Some(&session));

    let mut change = SettingsChange::new();
    change.flash = options.flash;
    change.torch = options.torch;
    change.focus = options.focus;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let setup = session.wait_for_setup().await;
        println!("Setup: {}", setup);
        if setup != SetupResult::Success {
            return Err::<(), Box<dyn std::error::Error>>(format!("setup failed: {}", setup).into());
        }

        session.apply_settings(change).await?;
        let settings = session.settings();
        println!(
            "Settings: flash={} torch={} focus={}",
            settings.flash, settings.torch, settings.focus
        );

        let Some(layer) = preview.video_preview_layer() else {
            return Err("preview lost its session".into());
        };
        if layer.is_mirrored() {
            println!("Preview: mirrored");
        }
        let frames = layer.frames();

        session.start().await?;
        let started = Instant::now();

        let received = tokio::time::timeout(
            options.timeout,
            frames
                .take(options.frames as usize)
                .fold(0u64, |count, frame| async move {
                    if frame.sequence % 10 == 0 {
                        println!(
                            "  frame {:>5}  {}x{}  {} bytes",
                            frame.sequence,
                            frame.width,
                            frame.height,
                            frame.data.len()
                        );
                    }
                    count + 1
                }),
        )
        .await
        .unwrap_or_else(|_| {
            println!("Timed out after {:?}", options.timeout);
            0
        });

        session.stop().await?;

        let elapsed = started.elapsed().as_secs_f64();
        println!();
        println!("Frames received: {}", received);
        println!("Frames delivered: {}", session.active_video_frame());
        if elapsed > 0.0 {
            println!(
                "Average rate: {:.1} fps",
                session.active_video_frame() as f64 / elapsed
            );
        }
        Ok(())
    })?;

    println!(
        "Devices opened: {}  released: {}",
        hardware.open_count(),
        hardware.release_count()
    );
    Ok(())
}

/// Set up a session where the user denies the access prompt
pub fn denied_session() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let hardware = Arc::new(
        virtual_hardware(&config)
            .with_authorization(AuthorizationStatus::NotDetermined)
            .with_access_policy(AccessPolicy::Deny),
    );

    let queue = WorkQueue::new(&config.queue_label)?;
    let session = CaptureSession::new(
        config.preset,
        config.position,
        queue,
        Arc::clone(&hardware) as Arc<dyn CaptureHardware>,
    );

    session.queue().barrier().wait()?;
    let setup = session
        .setup_result()
        .unwrap_or(SetupResult::SessionConfigurationFailed);
    println!("Setup: {}", setup);

    match session.start().wait() {
        Ok(()) => println!("Start: unexpectedly succeeded"),
        Err(e) => println!("Start: {}", e),
    }
    println!(
        "Access requests: {}  devices opened: {}",
        hardware.access_requests(),
        hardware.open_count()
    );
    Ok(())
}
