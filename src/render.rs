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
use std::path::Path;

use tracing::info;

use crate::audio::OutputFormat;
use crate::bar::BarBuffer;

/// Writes one bar to a 16-bit mono WAV file, repeated the given number of times.
pub fn write_wav(
    path: &Path,
    bar: &BarBuffer,
    format: OutputFormat,
    repeats: usize,
) -> Result<(), hound::Error> {
    let mut writer = hound::WavWriter::create(path, format.wav_spec())?;
    for _ in 0..repeats {
        for sample in bar.samples() {
            writer.write_sample(*sample)?;
        }
    }
    writer.finalize()?;

    info!(
        path = %path.display(),
        bars = repeats,
        samples = bar.len() * repeats,
        "Rendered bar."
    );
    Ok(())
}
