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

//! Beat notifications for listeners outside the engine.

use std::sync::{Arc, Weak};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use tracing::debug;

/// Receives the index of each beat as it starts playing.
pub trait TickSink: Send + Sync {
    /// Called from the device's completion context. Must not block.
    fn notify(&self, beat_index: u32);
}

/// Holds at most one tick sink. The engine keeps only a weak reference, so a sink dropped by
/// its owner simply stops receiving ticks.
#[derive(Default)]
pub struct TickRegistry {
    sink: RwLock<Option<Weak<dyn TickSink>>>,
}

impl TickRegistry {
    pub fn new() -> TickRegistry {
        TickRegistry {
            sink: RwLock::new(None),
        }
    }

    /// Registers a sink, replacing any earlier one.
    pub fn register(&self, sink: &Arc<dyn TickSink>) {
        *self.sink.write() = Some(Arc::downgrade(sink));
    }

    pub fn clear(&self) {
        *self.sink.write() = None;
    }

    /// Returns true if a live sink is registered.
    pub fn is_registered(&self) -> bool {
        self.sink
            .read()
            .as_ref()
            .is_some_and(|sink| sink.strong_count() > 0)
    }

    /// Notifies the registered sink, if there is one and it is still alive.
    pub fn notify(&self, beat_index: u32) {
        let sink = self.sink.read().as_ref().and_then(Weak::upgrade);
        if let Some(sink) = sink {
            sink.notify(beat_index);
        }
    }
}

/// A tick sink that forwards beat indexes over a bounded channel. Ticks are dropped when the
/// channel is full or its receiver is gone.
pub struct ChannelTickSink {
    tx: Sender<u32>,
}

impl ChannelTickSink {
    /// Creates a sink and the receiver its ticks arrive on.
    pub fn new(capacity: usize) -> (ChannelTickSink, Receiver<u32>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        (ChannelTickSink { tx }, rx)
    }
}

impl TickSink for ChannelTickSink {
    fn notify(&self, beat_index: u32) {
        match self.tx.try_send(beat_index) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!(beat_index, "Tick channel full, dropping tick"),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_notify_without_sink() {
        let registry = TickRegistry::new();
        assert!(!registry.is_registered());
        registry.notify(3);
    }

    #[test]
    fn test_last_registration_wins() {
        let registry = TickRegistry::new();
        let (first, first_rx) = ChannelTickSink::new(4);
        let (second, second_rx) = ChannelTickSink::new(4);
        let first: Arc<dyn TickSink> = Arc::new(first);
        let second: Arc<dyn TickSink> = Arc::new(second);

        registry.register(&first);
        registry.notify(0);
        registry.register(&second);
        registry.notify(1);

        assert_eq!(vec![0], first_rx.try_iter().collect::<Vec<u32>>());
        assert_eq!(vec![1], second_rx.try_iter().collect::<Vec<u32>>());
    }

    #[test]
    fn test_dropped_sink_is_ignored() {
        let registry = TickRegistry::new();
        let (sink, rx) = ChannelTickSink::new(4);
        let sink: Arc<dyn TickSink> = Arc::new(sink);

        registry.register(&sink);
        assert!(registry.is_registered());
        drop(sink);
        assert!(!registry.is_registered());

        registry.notify(2);
        assert!(rx.recv_timeout(Duration::from_millis(10)).is_err());
    }

    #[test]
    fn test_clear() {
        let registry = TickRegistry::new();
        let (sink, rx) = ChannelTickSink::new(4);
        let sink: Arc<dyn TickSink> = Arc::new(sink);

        registry.register(&sink);
        registry.clear();
        registry.notify(1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_channel_does_not_block() {
        let (sink, rx) = ChannelTickSink::new(1);
        sink.notify(0);
        sink.notify(1);
        assert_eq!(vec![0], rx.try_iter().collect::<Vec<u32>>());
    }
}
