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
use std::{collections::VecDeque, fmt, sync::Arc, thread, time::Duration};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, span, Level};

use crate::audio::{Fragment, FragmentDone, OutputFormat};
use crate::bar::fragment_duration;
use crate::error::{MetronomeError, Result, DEVICE_UNSUPPORTED_FORMAT};

/// How a mock device finishes fragments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Playback {
    /// A worker thread plays each fragment for its real duration.
    Realtime,
    /// Fragments only finish when `complete_next` is called.
    Manual,
}

/// Everything the mock records. Shared between the device handle and its opened output.
#[derive(Default)]
struct State {
    format: Option<OutputFormat>,
    on_done: Option<FragmentDone>,
    open: bool,
    opens: usize,
    closes: usize,
    restarts: usize,
    resets: usize,
    volume: Option<f32>,
    pending: VecDeque<Fragment>,
    submitted: Vec<Fragment>,
    rejected: usize,
    completed: usize,
}

struct Shared {
    state: Mutex<State>,
    changed: Condvar,
}

/// A mock device. Doesn't actually play anything, but keeps fragments in a FIFO queue and
/// records everything done to it.
#[derive(Clone)]
pub struct Device {
    name: String,
    playback: Playback,
    /// Maximum number of queued fragments before submits are rejected.
    capacity: Option<usize>,
    shared: Arc<Shared>,
}

impl Device {
    /// Gets the given mock device. Fragments finish after their playback duration. Names
    /// starting with "mock-fail" refuse to open.
    pub fn get(name: &str) -> Device {
        Device::new(name, Playback::Realtime)
    }

    /// Gets a mock device whose fragments only finish through `complete_next`.
    pub fn manual(name: &str) -> Device {
        Device::new(name, Playback::Manual)
    }

    fn new(name: &str, playback: Playback) -> Device {
        Device {
            name: name.to_string(),
            playback,
            capacity: None,
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                changed: Condvar::new(),
            }),
        }
    }

    /// Limits the number of queued fragments.
    pub fn with_capacity(mut self, capacity: usize) -> Device {
        self.capacity = Some(capacity);
        self
    }

    /// Finishes the oldest queued fragment, calling the completion callback on the current
    /// thread. Returns false if nothing was queued.
    pub fn complete_next(&self) -> bool {
        let (fragment, on_done) = {
            let mut state = self.shared.state.lock();
            let Some(fragment) = state.pending.pop_front() else {
                return false;
            };
            state.completed += 1;
            (fragment, state.on_done.clone())
        };
        if let Some(on_done) = on_done {
            on_done(fragment);
        }
        true
    }

    /// The format the device was last opened with.
    pub fn format(&self) -> Option<OutputFormat> {
        self.shared.state.lock().format
    }

    /// Returns true while the device is open.
    pub fn is_open(&self) -> bool {
        self.shared.state.lock().open
    }

    pub fn opens(&self) -> usize {
        self.shared.state.lock().opens
    }

    pub fn closes(&self) -> usize {
        self.shared.state.lock().closes
    }

    pub fn restarts(&self) -> usize {
        self.shared.state.lock().restarts
    }

    pub fn resets(&self) -> usize {
        self.shared.state.lock().resets
    }

    /// The last volume set on the device.
    pub fn volume(&self) -> Option<f32> {
        self.shared.state.lock().volume
    }

    /// Number of fragments queued and not yet finished.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Every fragment accepted so far, in submission order.
    pub fn submitted(&self) -> Vec<Fragment> {
        self.shared.state.lock().submitted.clone()
    }

    pub fn submitted_count(&self) -> usize {
        self.shared.state.lock().submitted.len()
    }

    /// Number of fragments refused because the queue was full.
    pub fn rejected(&self) -> usize {
        self.shared.state.lock().rejected
    }

    /// Number of fragments that finished playing.
    pub fn completed(&self) -> usize {
        self.shared.state.lock().completed
    }
}

impl crate::audio::Device for Device {
    fn open(
        &self,
        format: OutputFormat,
        on_done: FragmentDone,
    ) -> Result<Box<dyn crate::audio::Output>> {
        if self.name.starts_with("mock-fail") {
            return Err(MetronomeError::device(
                DEVICE_UNSUPPORTED_FORMAT,
                format!("mock device {} refuses format {}", self.name, format),
            ));
        }

        {
            let mut state = self.shared.state.lock();
            state.format = Some(format);
            state.on_done = Some(on_done);
            state.open = true;
            state.opens += 1;
        }
        info!(device = self.name, format = %format, "Opened mock output.");

        let worker = match self.playback {
            Playback::Realtime => {
                let shared = self.shared.clone();
                let name = self.name.clone();
                Some(thread::spawn(move || play_fragments(name, shared)))
            }
            Playback::Manual => None,
        };

        Ok(Box::new(Output {
            capacity: self.capacity,
            shared: self.shared.clone(),
            worker: Mutex::new(worker),
        }))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}

/// Pops queued fragments and "plays" each one for its duration until the output closes.
fn play_fragments(name: String, shared: Arc<Shared>) {
    let span = span!(Level::INFO, "mock playback", device = name);
    let _enter = span.enter();

    loop {
        let (fragment, duration) = {
            let mut state = shared.state.lock();
            shared
                .changed
                .wait_while(&mut state, |state| state.open && state.pending.is_empty());
            if !state.open {
                return;
            }
            let Some(fragment) = state.pending.front().cloned() else {
                continue;
            };
            let sample_rate = state.format.map(|f| f.sample_rate).unwrap_or(44100);
            let duration = fragment_duration(fragment.len(), sample_rate);
            (fragment, duration)
        };

        // Wait out the fragment unless the output is closed first.
        let mut state = shared.state.lock();
        let timeout = shared
            .changed
            .wait_while_for(&mut state, |state| state.open, duration);
        if !state.open {
            return;
        }
        if !timeout.timed_out() {
            continue;
        }

        // A reset may have flushed the fragment while it was playing.
        let finished = match state.pending.front() {
            Some(front) if front == &fragment => state.pending.pop_front(),
            _ => None,
        };
        let Some(finished) = finished else {
            continue;
        };
        state.completed += 1;
        let on_done = state.on_done.clone();
        drop(state);

        debug!(sequence = finished.sequence(), "Mock fragment finished.");
        if let Some(on_done) = on_done {
            on_done(finished);
        }
    }
}

/// An opened mock output.
struct Output {
    capacity: Option<usize>,
    shared: Arc<Shared>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl crate::audio::Output for Output {
    fn submit(&self, fragment: Fragment) -> std::result::Result<(), Fragment> {
        let mut state = self.shared.state.lock();
        if !state.open {
            return Err(fragment);
        }
        if self
            .capacity
            .is_some_and(|capacity| state.pending.len() >= capacity)
        {
            state.rejected += 1;
            return Err(fragment);
        }

        state.submitted.push(fragment.clone());
        state.pending.push_back(fragment);
        self.shared.changed.notify_all();
        Ok(())
    }

    fn set_volume(&self, volume: f32) {
        self.shared.state.lock().volume = Some(volume);
    }

    fn restart(&self) {
        self.shared.state.lock().restarts += 1;
    }

    fn reset(&self) {
        let (flushed, on_done) = {
            let mut state = self.shared.state.lock();
            state.resets += 1;
            let flushed: Vec<Fragment> = state.pending.drain(..).collect();
            self.shared.changed.notify_all();
            (flushed, state.on_done.clone())
        };

        if let Some(on_done) = on_done {
            for fragment in flushed {
                on_done(fragment);
            }
        }
    }

    fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            if !state.open {
                return;
            }
            state.open = false;
            state.closes += 1;
            state.pending.clear();
            state.on_done = None;
            self.shared.changed.notify_all();
        }

        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        crate::audio::Output::close(self);
    }
}
