// SPDX-License-Identifier: GPL-3.0-only
//! Frame delivery thread
//!
//! Each running pipeline pulls frames from its [`FrameSource`] on a dedicated
//! thread. The thread only touches atomics and watch channels, so it never
//! waits on the session work queue.

use super::FrameSource;
use super::types::{BackendError, CameraFrame, DevicePosition, DeviceSettings};
use crate::constants::timing;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Action returned by the loop body to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Why a frame source stopped producing frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The source reported the end of the stream
    Finished,
    /// The device failed
    Failed(BackendError),
}

/// Where delivered frames go
///
/// Cloned into the frame thread on every start; the session keeps the
/// originals.
#[derive(Clone)]
pub struct FrameSink {
    /// Active video frame counter, shared with the session
    pub counter: Arc<AtomicU64>,
    /// Latest frame, read by previews
    pub frames: Arc<watch::Sender<Option<Arc<CameraFrame>>>>,
    /// Settings currently committed to the device
    pub settings: watch::Receiver<DeviceSettings>,
    pub position: DevicePosition,
}

impl FrameSink {
    /// Stamp and publish one frame
    fn publish(&self, raw: super::types::RawFrame) -> u64 {
        // Relaxed: the counter orders nothing else
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let settings = *self.settings.borrow();

        let frame = CameraFrame {
            sequence,
            width: raw.width,
            height: raw.height,
            data: raw.data,
            position: self.position,
            settings,
            captured_at: Instant::now(),
        };
        self.frames.send_replace(Some(Arc::new(frame)));
        sequence
    }
}

/// Controller for a frame loop running in a separate thread
pub struct FrameLoopController {
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<()>>,
    /// Signal to stop the loop
    stop_signal: Arc<AtomicBool>,
    /// Name for logging
    name: String,
}

impl FrameLoopController {
    /// Run `loop_fn` repeatedly on a new thread until it returns
    /// [`LoopAction::Stop`] or the controller is stopped
    pub fn start<F>(name: &str, loop_fn: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        Self::start_with_signal(name, Arc::new(AtomicBool::new(false)), loop_fn)
    }

    fn start_with_signal<F>(name: &str, stop_signal: Arc<AtomicBool>, mut loop_fn: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, "Starting frame loop");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %name_clone, "Frame loop thread started");

                while !stop_signal_clone.load(Ordering::SeqCst) {
                    if loop_fn() == LoopAction::Stop {
                        debug!(name = %name_clone, "Loop requested stop");
                        break;
                    }
                }

                info!(name = %name_clone, "Frame loop thread exiting");
            });

        let thread_handle = match thread_handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to spawn frame loop thread");
                None
            }
        };

        Self {
            thread_handle,
            stop_signal,
            name: name.to_string(),
        }
    }

    /// Pull frames from `source` and publish them to `sink`
    ///
    /// `on_end` runs on the frame thread when the source ends on its own. It
    /// is not called when the loop is stopped through the controller.
    pub fn deliver<E>(
        name: &str,
        mut source: Box<dyn FrameSource>,
        sink: FrameSink,
        on_end: E,
    ) -> Self
    where
        E: FnOnce(StreamEnd) + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stopping = Arc::clone(&stop_signal);
        let mut on_end = Some(on_end);
        let mut finish = move |end: StreamEnd| {
            if stopping.load(Ordering::SeqCst) {
                return;
            }
            if let Some(on_end) = on_end.take() {
                on_end(end);
            }
        };

        Self::start_with_signal(name, stop_signal, move || match source.next_frame() {
            Ok(Some(raw)) => {
                let sequence = sink.publish(raw);
                if sequence % timing::FRAME_LOG_INTERVAL == 0 {
                    debug!(sequence, position = %sink.position, "Frames delivered");
                }
                LoopAction::Continue
            }
            Ok(None) => {
                finish(StreamEnd::Finished);
                LoopAction::Stop
            }
            Err(BackendError::Disconnected) => {
                warn!(position = %sink.position, "Camera disconnected, ending frame loop");
                finish(StreamEnd::Failed(BackendError::Disconnected));
                LoopAction::Stop
            }
            Err(e) => {
                warn!(error = %e, "Frame source error");
                thread::sleep(timing::FRAME_ERROR_BACKOFF);
                LoopAction::Continue
            }
        })
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting frame loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending stop signal
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for frame loop thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Frame loop thread panicked: {:?}", e);
            }
        }
    }
}

impl Drop for FrameLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "FrameLoopController dropped, stopping loop");
            self.stop();
        }
    }
}
