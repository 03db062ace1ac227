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
use std::{fmt, sync::Arc};

use crate::error::Result;

pub mod cpal;
pub mod format;
pub mod mock;
pub mod pool;
pub mod thread_priority;

pub use format::OutputFormat;

/// One beat's worth of samples handed to an output. The output owns the fragment from a
/// successful submit until it passes it back through the completion callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    samples: Vec<i16>,
    epoch: u64,
    sequence: u64,
}

impl Fragment {
    /// Creates a fragment. The epoch identifies the play session it was produced in and the
    /// sequence its position within that session.
    pub fn new(samples: Vec<i16>, epoch: u64, sequence: u64) -> Fragment {
        Fragment {
            samples,
            epoch,
            sequence,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Gives back the sample buffer for reuse.
    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }
}

/// Called by an output, from a context of its choosing, once per fragment that has finished
/// playing or has been flushed. Fragments come back in the order they were submitted.
pub type FragmentDone = Arc<dyn Fn(Fragment) + Send + Sync>;

/// A sound output device that can be opened for fragment playback.
pub trait Device: fmt::Display + Send + Sync {
    /// Opens the device with the given format. Completed fragments are passed to `on_done`.
    fn open(&self, format: OutputFormat, on_done: FragmentDone) -> Result<Box<dyn Output>>;
}

/// An opened output queue.
pub trait Output: Send + Sync {
    /// Queues a fragment for playback. A rejected fragment is handed straight back and will
    /// never be reported through the completion callback.
    fn submit(&self, fragment: Fragment) -> std::result::Result<(), Fragment>;

    /// Sets the output level, 0.0 to 1.0.
    fn set_volume(&self, volume: f32);

    /// (Re)starts streaming.
    fn restart(&self);

    /// Flushes every queued fragment. Flushed fragments are reported through the completion
    /// callback before this returns.
    fn reset(&self);

    /// Releases the device. Nothing is reported after this returns.
    fn close(&self);
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>> {
    cpal::Device::list()
}

/// Gets a device with the given name. Names starting with "mock" produce a mock device.
pub fn get_device(name: &str, queue_depth: usize) -> Result<Arc<dyn Device>> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(name)));
    };

    Ok(Arc::new(cpal::Device::get(name, queue_depth)?))
}
