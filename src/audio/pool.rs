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

//! Recycles fragment sample buffers between the producer and the completion callback.
//!
//! The producer takes a buffer, fills it and hands it to the output inside a fragment. When the
//! output reports the fragment done the buffer is given back. Buffers beyond the pool's
//! capacity are dropped.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender};

/// Default number of idle buffers kept around.
pub const DEFAULT_POOL_CAPACITY: usize = 8;

pub struct FragmentPool {
    free_tx: Sender<Vec<i16>>,
    free_rx: Receiver<Vec<i16>>,
    /// Number of buffers allocated because the pool was empty.
    allocated: AtomicUsize,
}

impl FragmentPool {
    pub fn new(capacity: usize) -> FragmentPool {
        let (free_tx, free_rx) = crossbeam_channel::bounded(capacity.max(1));
        FragmentPool {
            free_tx,
            free_rx,
            allocated: AtomicUsize::new(0),
        }
    }

    /// Takes an empty buffer, reusing an idle one when possible.
    pub fn take(&self) -> Vec<i16> {
        match self.free_rx.try_recv() {
            Ok(mut buffer) => {
                buffer.clear();
                buffer
            }
            Err(_) => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                Vec::new()
            }
        }
    }

    /// Returns a buffer to the pool. Never blocks.
    pub fn give(&self, buffer: Vec<i16>) {
        let _ = self.free_tx.try_send(buffer);
    }

    /// Number of idle buffers.
    pub fn idle(&self) -> usize {
        self.free_rx.len()
    }

    /// Number of buffers allocated so far.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

impl Default for FragmentPool {
    fn default() -> Self {
        FragmentPool::new(DEFAULT_POOL_CAPACITY)
    }
}
