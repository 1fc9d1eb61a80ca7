// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for camera capture
//!
//! - [`camera`]: Capture hardware traits, device types and the virtual
//!   backend used by the demo binary and the test suite

pub mod camera;
