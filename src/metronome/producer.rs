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
use std::{
    io,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::{debug, info, span, warn, Level};

use super::playhead::Playhead;
use super::Params;
use crate::audio::thread_priority;
use crate::audio::{Fragment, Output};
use crate::bar::fragment_duration;
use crate::playsync::StopSignal;

/// Fragments submitted up front so the device always has the next beat queued while the
/// current one plays.
const LEAD_FRAGMENTS: usize = 1;

/// Slices one beat per interval out of the bar and submits it to the output.
pub(super) struct Producer {
    pub(super) params: Arc<Mutex<Params>>,
    pub(super) output: Arc<dyn Output>,
    pub(super) playhead: Arc<Playhead>,
    pub(super) stop: StopSignal,
    pub(super) epoch: u64,
    pub(super) sample_rate: u32,
}

impl Producer {
    /// Starts the producer loop on its own thread.
    pub(super) fn spawn(self) -> io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("clicktrack-producer".into())
            .spawn(move || self.run())
    }

    fn run(self) {
        let span = span!(Level::INFO, "producer", epoch = self.epoch);
        let _enter = span.enter();

        thread_priority::configure_current_thread(
            thread_priority::producer_thread_priority(),
            thread_priority::rt_audio_enabled(),
        );
        info!("Producer started.");

        let mut sequence: u64 = 0;
        let mut lead = LEAD_FRAGMENTS;
        let mut next_deadline = Instant::now();

        while self.playhead.is_running() && !self.stop.is_stopped() {
            let fragment = self.next_fragment(sequence);
            let interval = fragment_duration(fragment.len(), self.sample_rate);
            self.submit(fragment);
            sequence += 1;

            if lead > 0 {
                lead -= 1;
                continue;
            }

            next_deadline = advance_deadline(next_deadline, interval, Instant::now());
            if self.stop.sleep_until(next_deadline) {
                break;
            }
        }

        info!(fragments = sequence, "Producer stopped.");
    }

    /// Slices the next fragment under the parameter lock and advances the write cursor.
    fn next_fragment(&self, sequence: u64) -> Fragment {
        let mut samples = self.playhead.pool().take();
        let mut params = self.params.lock();
        let Params { bar, cursor, .. } = &mut *params;
        cursor.slice_next(bar, &mut samples);
        Fragment::new(samples, self.epoch, sequence)
    }

    /// Submits a fragment. A full device queue just drops this beat.
    fn submit(&self, fragment: Fragment) {
        let sequence = fragment.sequence();
        match self.output.submit(fragment) {
            Ok(()) => debug!(sequence, "Submitted fragment."),
            Err(rejected) => {
                warn!(sequence, "Output rejected fragment, skipping beat.");
                self.playhead.recycle(rejected);
            }
        }
    }
}

/// Moves the deadline on by one interval. If the loop has fallen more than an interval
/// behind, the schedule is re-anchored on now rather than bursting to catch up.
fn advance_deadline(deadline: Instant, interval: Duration, now: Instant) -> Instant {
    let next = deadline + interval;
    let behind = now.saturating_duration_since(next);
    if behind > interval {
        warn!(
            behind_ms = behind.as_millis() as u64,
            "Producer fell behind, re-anchoring schedule."
        );
        return now;
    }
    next
}
