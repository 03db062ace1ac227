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

//! Synthesis of one full bar of click audio.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{MetronomeError, Result};
use crate::samples::SampleStore;

/// The longest bar that will be built, a little over 25 minutes at 44.1kHz.
pub const MAX_BAR_SAMPLES: usize = 1 << 26;

/// Returns the number of samples in one beat: `round(sample_rate * 60 / bpm)`.
pub fn beat_length_samples(bpm: u32, sample_rate: u32) -> Result<usize> {
    if bpm == 0 {
        return Err(MetronomeError::InvalidArgument(
            "bpm must be greater than 0".into(),
        ));
    }
    if sample_rate == 0 {
        return Err(MetronomeError::InvalidArgument(
            "sample rate must be greater than 0".into(),
        ));
    }

    let beat_length = (sample_rate as f64 * 60.0 / bpm as f64).round() as usize;
    if beat_length == 0 {
        return Err(MetronomeError::InvalidArgument(format!(
            "{} bpm is too fast for a sample rate of {}Hz",
            bpm, sample_rate
        )));
    }
    Ok(beat_length)
}

/// Returns the number of samples in one bar, rejecting bars longer than [MAX_BAR_SAMPLES].
pub fn bar_length_samples(bpm: u32, beats_per_bar: u32, sample_rate: u32) -> Result<usize> {
    let beat_length = beat_length_samples(bpm, sample_rate)?;
    let beats = if is_unaccented(beats_per_bar) {
        1
    } else {
        beats_per_bar as usize
    };

    match beat_length.checked_mul(beats) {
        Some(bar_length) if bar_length <= MAX_BAR_SAMPLES => Ok(bar_length),
        _ => Err(MetronomeError::InvalidArgument(format!(
            "{} beats per bar at {} bpm exceeds the maximum bar length of {} samples",
            beats_per_bar, bpm, MAX_BAR_SAMPLES
        ))),
    }
}

/// Returns the playback time of the given number of samples.
pub fn fragment_duration(samples: usize, sample_rate: u32) -> Duration {
    Duration::from_nanos((samples as u128 * 1_000_000_000 / sample_rate.max(1) as u128) as u64)
}

/// Returns true if the signature plays a single repeating, unaccented beat.
pub fn is_unaccented(beats_per_bar: u32) -> bool {
    beats_per_bar < 2
}

/// One bar of audio at a fixed tempo and signature. The bar is a whole number of beat slots,
/// each holding the start of a waveform followed by silence.
#[derive(Clone, PartialEq, Eq)]
pub struct BarBuffer {
    samples: Arc<[i16]>,
    beat_length: usize,
    beats_per_bar: u32,
}

impl BarBuffer {
    /// Builds a bar. With fewer than two beats per bar the bar is a single beat built from the
    /// main waveform; otherwise beat 0 uses the accent waveform and the rest use the main one.
    /// Waveforms longer than a beat are truncated to the beat.
    pub fn build(
        bpm: u32,
        beats_per_bar: u32,
        sounds: &SampleStore,
        sample_rate: u32,
    ) -> Result<BarBuffer> {
        let beat_length = beat_length_samples(bpm, sample_rate)?;
        let bar_length = bar_length_samples(bpm, beats_per_bar, sample_rate)?;

        let samples = if is_unaccented(beats_per_bar) {
            let mut bar = vec![0i16; bar_length];
            copy_into_slot(&mut bar, sounds.main().samples());
            bar
        } else {
            let mut bar = vec![0i16; bar_length];
            for (beat, slot) in bar.chunks_exact_mut(beat_length).enumerate() {
                let sound = if beat == 0 {
                    sounds.accent()
                } else {
                    sounds.main()
                };
                copy_into_slot(slot, sound.samples());
            }
            bar
        };

        Ok(BarBuffer {
            samples: samples.into(),
            beat_length,
            beats_per_bar,
        })
    }

    /// The samples of the whole bar.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// The length of the bar in samples. Always a positive multiple of the beat length.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false; a bar holds at least one beat of at least one sample.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The length of one beat in samples.
    pub fn beat_length(&self) -> usize {
        self.beat_length
    }

    /// The signature the bar was built for.
    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    /// The samples of the given beat slot, or None past the end of the bar.
    pub fn beat(&self, index: usize) -> Option<&[i16]> {
        let start = index.checked_mul(self.beat_length)?;
        self.samples.get(start..start.checked_add(self.beat_length)?)
    }
}

impl fmt::Debug for BarBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BarBuffer")
            .field("len", &self.samples.len())
            .field("beat_length", &self.beat_length)
            .field("beats_per_bar", &self.beats_per_bar)
            .finish()
    }
}

fn copy_into_slot(slot: &mut [i16], sound: &[i16]) {
    let copy_length = slot.len().min(sound.len());
    slot[..copy_length].copy_from_slice(&sound[..copy_length]);
}
