// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

/// Status code used when no output device matches the requested name.
pub const DEVICE_NOT_FOUND: i32 = 1;
/// Status code used when the device can't be driven with the requested format.
pub const DEVICE_UNSUPPORTED_FORMAT: i32 = 2;
/// Status code used when the output stream could not be built.
pub const DEVICE_STREAM_BUILD_FAILED: i32 = 3;
/// Status code used when the output stream refused to start.
pub const DEVICE_STREAM_START_FAILED: i32 = 4;
/// Status code used when the device thread exited before reporting back.
pub const DEVICE_THREAD_DIED: i32 = 5;

/// Errors raised synchronously by the metronome engine. Transient fragment rejections during
/// playback are never surfaced through this type.
#[derive(Debug, thiserror::Error)]
pub enum MetronomeError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Audio device error (status {status}): {reason}")]
    Device { status: i32, reason: String },
}

impl MetronomeError {
    /// Shorthand for a device error with the given status code.
    pub fn device(status: i32, reason: impl Into<String>) -> MetronomeError {
        MetronomeError::Device {
            status,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MetronomeError>;
