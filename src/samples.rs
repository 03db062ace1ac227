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

//! Single-beat waveforms for the normal and accented click.
//!
//! Waveforms arrive as raw little-endian 16-bit mono PCM and are kept in memory as shared,
//! immutable sample slices. Replacing a sound swaps the whole waveform.

use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{MetronomeError, Result};

/// Length of a synthesized click in milliseconds.
const CLICK_DURATION_MS: u32 = 20;

/// Length of a synthesized accent click in milliseconds.
const ACCENT_DURATION_MS: u32 = 30;

/// An immutable mono waveform of signed 16-bit samples.
#[derive(Clone, PartialEq, Eq)]
pub struct Waveform {
    samples: Arc<[i16]>,
}

impl Waveform {
    /// Decodes raw 16-bit PCM bytes into a waveform. The bytes must be non-empty and hold a
    /// whole number of samples.
    pub fn load(bytes: &[u8]) -> Result<Waveform> {
        Ok(Waveform {
            samples: bytes_to_samples(bytes)?.into(),
        })
    }

    /// Wraps already decoded samples.
    pub fn from_samples(samples: Vec<i16>) -> Waveform {
        Waveform {
            samples: samples.into(),
        }
    }

    /// Returns the samples of this waveform.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Returns the number of samples in this waveform.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the waveform holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl fmt::Debug for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waveform")
            .field("samples", &self.samples.len())
            .finish()
    }
}

/// Converts little-endian 16-bit PCM bytes into samples.
pub fn bytes_to_samples(bytes: &[u8]) -> Result<Vec<i16>> {
    if bytes.is_empty() {
        return Err(MetronomeError::InvalidArgument(
            "PCM data cannot be empty".into(),
        ));
    }
    if bytes.len() % 2 != 0 {
        return Err(MetronomeError::InvalidArgument(format!(
            "invalid byte length {} for 16-bit PCM",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Holds the main and accent waveforms. An accent that was never supplied resolves to the main
/// waveform.
#[derive(Clone, Debug)]
pub struct SampleStore {
    main: Waveform,
    accent: Option<Waveform>,
}

impl SampleStore {
    /// Creates a store from raw PCM bytes. Empty accent bytes mean "no separate accent".
    pub fn load(main: &[u8], accent: &[u8]) -> Result<SampleStore> {
        let main = Waveform::load(main)?;
        let accent = if accent.is_empty() {
            None
        } else {
            Some(Waveform::load(accent)?)
        };
        Ok(SampleStore { main, accent })
    }

    /// Creates a store from decoded waveforms.
    pub fn new(main: Waveform, accent: Option<Waveform>) -> SampleStore {
        SampleStore { main, accent }
    }

    /// The waveform used for every beat but the first of a bar.
    pub fn main(&self) -> &Waveform {
        &self.main
    }

    /// The waveform used for the first beat of a bar.
    pub fn accent(&self) -> &Waveform {
        self.accent.as_ref().unwrap_or(&self.main)
    }

    /// Returns true if a separate accent waveform was supplied.
    pub fn has_accent(&self) -> bool {
        self.accent.is_some()
    }

    /// Replaces the main waveform.
    pub fn replace_main(&mut self, main: Waveform) {
        self.main = main;
    }

    /// Replaces the accent waveform.
    pub fn replace_accent(&mut self, accent: Waveform) {
        self.accent = Some(accent);
    }
}

/// Synthesizes a short click: a seeded noise burst with an exponential decay. The accent
/// variant is longer and louder. Output is identical across calls for the same arguments.
pub fn synthesize_click(sample_rate: u32, accent: bool) -> Waveform {
    let (duration_ms, peak, seed) = if accent {
        (ACCENT_DURATION_MS, 0.9, 7)
    } else {
        (CLICK_DURATION_MS, 0.6, 42)
    };
    let num_samples = (sample_rate as u64 * duration_ms as u64 / 1000).max(1) as usize;

    let mut rng = StdRng::seed_from_u64(seed);
    // Decay to roughly -60dB at the end of the burst.
    let decay = (-6.9 / num_samples as f32).exp();
    let mut envelope = peak;

    let samples = (0..num_samples)
        .map(|_| {
            let noise: f32 = rng.gen_range(-1.0..1.0);
            let sample = noise * envelope * i16::MAX as f32;
            envelope *= decay;
            sample as i16
        })
        .collect();

    Waveform::from_samples(samples)
}
