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

use crate::bar::BarBuffer;

/// Tracks where the next fragment is sliced from the bar. The position grows without bound and
/// is reduced modulo the bar length when used.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RingCursor {
    position: u64,
}

impl RingCursor {
    pub fn new() -> RingCursor {
        RingCursor { position: 0 }
    }

    /// The unbounded sample position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// The position within a bar of the given length.
    pub fn offset_in(&self, bar_length: usize) -> usize {
        (self.position % bar_length.max(1) as u64) as usize
    }

    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Fills `fragment` with one beat of samples starting at the cursor, wrapping to the start
    /// of the bar when the slice runs past the end, and advances the cursor by one beat.
    pub fn slice_next(&mut self, bar: &BarBuffer, fragment: &mut Vec<i16>) {
        let beat_length = bar.beat_length();
        let samples = bar.samples();

        fragment.clear();
        fragment.reserve(beat_length);

        let mut start = self.offset_in(samples.len());
        while fragment.len() < beat_length {
            let take = (beat_length - fragment.len()).min(samples.len() - start);
            fragment.extend_from_slice(&samples[start..start + take]);
            start = 0;
        }

        self.position += beat_length as u64;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::samples::{SampleStore, Waveform};

    fn bar(beats_per_bar: u32) -> BarBuffer {
        // 100 * 60 / 600 = 10 samples per beat.
        let sounds = SampleStore::new(
            Waveform::from_samples((1..=10).collect()),
            Some(Waveform::from_samples((101..=110).collect())),
        );
        BarBuffer::build(600, beats_per_bar, &sounds, 100).unwrap()
    }

    #[test]
    fn test_slices_beats_in_order() {
        let bar = bar(3);
        let mut cursor = RingCursor::new();
        let mut fragment = Vec::new();

        cursor.slice_next(&bar, &mut fragment);
        assert_eq!(bar.beat(0).unwrap(), fragment.as_slice());
        cursor.slice_next(&bar, &mut fragment);
        assert_eq!(bar.beat(1).unwrap(), fragment.as_slice());
        cursor.slice_next(&bar, &mut fragment);
        assert_eq!(bar.beat(2).unwrap(), fragment.as_slice());
        assert_eq!(30, cursor.position());

        // Next slice starts the bar over.
        cursor.slice_next(&bar, &mut fragment);
        assert_eq!(bar.beat(0).unwrap(), fragment.as_slice());
        assert_eq!(40, cursor.position());
        assert_eq!(10, cursor.offset_in(bar.len()));
    }

    #[test]
    fn test_slice_wraps_around_end() {
        let bar = bar(2);
        let mut cursor = RingCursor { position: 15 };
        let mut fragment = Vec::new();

        cursor.slice_next(&bar, &mut fragment);

        let mut expected = bar.samples()[15..20].to_vec();
        expected.extend_from_slice(&bar.samples()[0..5]);
        assert_eq!(expected, fragment);
        assert_eq!(25, cursor.position());
        assert_eq!(5, cursor.offset_in(bar.len()));
    }

    #[test]
    fn test_single_beat_bar_repeats() {
        let bar = bar(1);
        let mut cursor = RingCursor::new();
        let mut fragment = Vec::new();

        for _ in 0..5 {
            cursor.slice_next(&bar, &mut fragment);
            assert_eq!(bar.samples(), fragment.as_slice());
        }
        assert_eq!(50, cursor.position());
    }

    #[test]
    fn test_reset() {
        let bar = bar(4);
        let mut cursor = RingCursor::new();
        let mut fragment = Vec::new();
        cursor.slice_next(&bar, &mut fragment);
        cursor.reset();
        assert_eq!(0, cursor.position());
        cursor.slice_next(&bar, &mut fragment);
        assert_eq!(bar.beat(0).unwrap(), fragment.as_slice());
    }
}
