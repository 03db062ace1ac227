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
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

/// How long before a deadline the stop signal hands over to a spin sleep.
const SPIN_MARGIN: Duration = Duration::from_millis(2);

/// Represents the current stop state.
#[derive(PartialEq)]
enum StopState {
    Running,
    Stopped,
}

/// A stop signal is handed to the producer loop for one play session. The loop sleeps on it
/// between fragments, so stopping wakes the loop immediately instead of after a full beat.
#[derive(Clone)]
pub struct StopSignal {
    state: Arc<Mutex<StopState>>,
    condvar: Arc<Condvar>,
}

impl StopSignal {
    /// Creates a new stop signal.
    pub fn new() -> StopSignal {
        StopSignal {
            state: Arc::new(Mutex::new(StopState::Running)),
            condvar: Arc::new(Condvar::new()),
        }
    }

    /// Returns true once the signal has been stopped.
    pub fn is_stopped(&self) -> bool {
        *self.state.lock() == StopState::Stopped
    }

    /// Stops the signal and wakes any sleeper.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if *state == StopState::Running {
            *state = StopState::Stopped;
            self.condvar.notify_all();
        }
    }

    /// Sleeps until the deadline. Returns true if the signal was stopped before or during the
    /// sleep. The last couple of milliseconds are spun for precision.
    pub fn sleep_until(&self, deadline: Instant) -> bool {
        {
            let mut state = self.state.lock();
            let coarse_deadline = deadline.checked_sub(SPIN_MARGIN).unwrap_or(deadline);
            self.condvar
                .wait_while_until(&mut state, |state| *state == StopState::Running, coarse_deadline);
            if *state == StopState::Stopped {
                return true;
            }
        }

        spin_sleep::sleep(deadline.saturating_duration_since(Instant::now()));
        self.is_stopped()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        StopSignal::new()
    }
}
