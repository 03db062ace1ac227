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

//! Bookkeeping driven by the output's completion callback.
//!
//! The callback may run on any thread, including the control caller's own thread during a
//! device reset. It only ever touches state behind the cursor lock here and never the bar
//! buffer, so a rebuild can't block it and it can't observe a half-built bar.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::audio::pool::FragmentPool;
use crate::audio::Fragment;
use crate::bar::is_unaccented;
use crate::tick::TickRegistry;

#[derive(Debug, Default)]
struct PlayState {
    /// Samples confirmed played this session.
    play_cursor: u64,
    /// The beat that is now playing, within the bar.
    current_beat: u32,
    beats_per_bar: u32,
    /// Only fragments produced in this play session count.
    epoch: u64,
    /// Total counted completions, used to wake waiters.
    completions: u64,
}

pub(crate) struct Playhead {
    running: AtomicBool,
    state: Mutex<PlayState>,
    completed: Condvar,
    ticks: TickRegistry,
    pool: FragmentPool,
}

impl Playhead {
    pub(crate) fn new() -> Playhead {
        Playhead {
            running: AtomicBool::new(false),
            state: Mutex::new(PlayState::default()),
            completed: Condvar::new(),
            ticks: TickRegistry::new(),
            pool: FragmentPool::default(),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Sets the running flag, returning the previous value.
    pub(crate) fn set_running(&self, running: bool) -> bool {
        self.running.swap(running, Ordering::AcqRel)
    }

    /// Prepares for a new play session.
    pub(crate) fn begin(&self, epoch: u64, beats_per_bar: u32) {
        let mut state = self.state.lock();
        state.play_cursor = 0;
        state.current_beat = 0;
        state.beats_per_bar = beats_per_bar;
        state.epoch = epoch;
    }

    /// Zeroes the play cursor and beat index.
    pub(crate) fn reset(&self) {
        let mut state = self.state.lock();
        state.play_cursor = 0;
        state.current_beat = 0;
    }

    pub(crate) fn play_cursor(&self) -> u64 {
        self.state.lock().play_cursor
    }

    pub(crate) fn current_beat(&self) -> u32 {
        self.state.lock().current_beat
    }

    pub(crate) fn ticks(&self) -> &TickRegistry {
        &self.ticks
    }

    pub(crate) fn pool(&self) -> &FragmentPool {
        &self.pool
    }

    /// Takes back a fragment that never reached the device.
    pub(crate) fn recycle(&self, fragment: Fragment) {
        self.pool.give(fragment.into_samples());
    }

    /// Handles a fragment the output has finished with. Fragments arriving after a stop, or
    /// from an earlier session, only return their buffer.
    pub(crate) fn on_fragment_done(&self, fragment: Fragment) {
        let beat = {
            let mut state = self.state.lock();
            if self.is_running() && fragment.epoch() == state.epoch {
                state.play_cursor += fragment.len() as u64;
                // Counts completions. A beat the output rejected never completes.
                state.current_beat = if is_unaccented(state.beats_per_bar) {
                    0
                } else {
                    (state.current_beat + 1) % state.beats_per_bar
                };
                state.completions += 1;
                Some(state.current_beat)
            } else {
                None
            }
        };

        // Sinks run without the cursor lock so they may read engine state.
        match beat {
            Some(beat) => {
                self.completed.notify_all();
                self.ticks.notify(beat);
            }
            None => debug!(
                epoch = fragment.epoch(),
                sequence = fragment.sequence(),
                "Discarding completion outside of playback"
            ),
        }

        self.recycle(fragment);
    }

    /// Blocks until the next counted completion or the timeout. Returns true if a fragment
    /// completed.
    pub(crate) fn wait_for_completion(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        let seen = state.completions;
        !self
            .completed
            .wait_while_until(&mut state, |state| state.completions == seen, deadline)
            .timed_out()
    }
}
