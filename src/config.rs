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

use crate::audio;

pub use self::error::ConfigError;
pub use self::metronome::Metronome;

mod error;
mod metronome;

/// Initializes a metronome from the given config file. Environment variables prefixed with
/// CLICKTRACK_ override values from the file.
pub fn init_metronome(
    path: &Path,
) -> Result<crate::metronome::Metronome, Box<dyn std::error::Error>> {
    let config = Metronome::deserialize(path)?;
    let settings = config.settings()?;
    let sounds = config.sounds()?;
    let device = audio::get_device(config.device(), config.queue_depth())?;

    info!(
        config = %path.display(),
        device = %device,
        "Loaded metronome configuration."
    );
    Ok(crate::metronome::Metronome::with_sounds(
        device.as_ref(),
        sounds,
        settings,
    )?)
}
