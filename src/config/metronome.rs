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
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, Environment, File};
use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::metronome::Settings;
use crate::samples::{synthesize_click, SampleStore, Waveform};

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_BPM: u32 = 120;
const DEFAULT_BEATS_PER_BAR: u32 = 4;
const DEFAULT_VOLUME: f32 = 1.0;
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_QUEUE_DEPTH: usize = 2;

/// A YAML representation of the metronome configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Metronome {
    /// The output device (default: "default").
    device: Option<String>,

    /// Output sample rate in Hz (default: 44100)
    sample_rate: Option<u32>,

    /// Tempo in beats per minute (default: 120)
    bpm: Option<u32>,

    /// Beats per bar; less than 2 means no accent (default: 4)
    beats_per_bar: Option<u32>,

    /// Output level from 0.0 to 1.0 (default: 1.0)
    volume: Option<f32>,

    /// Raw little-endian 16-bit mono PCM for regular beats. A click is synthesized if unset.
    main_sound: Option<PathBuf>,

    /// Raw little-endian 16-bit mono PCM for the first beat of each bar.
    accent_sound: Option<PathBuf>,

    /// Pause between halting and resuming when a parameter changes (default: 100ms)
    settle_delay: Option<String>,

    /// Fragments that may wait in the device queue (default: 2)
    queue_depth: Option<usize>,

    /// Relative sound paths are resolved against this directory.
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Metronome {
    /// Parses a metronome configuration from a YAML file, with CLICKTRACK_ environment
    /// variables taking precedence.
    pub fn deserialize(path: &Path) -> Result<Metronome, ConfigError> {
        let mut metronome = Config::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix("CLICKTRACK").try_parsing(true))
            .build()?
            .try_deserialize::<Metronome>()?;
        metronome.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(metronome)
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    pub fn bpm(&self) -> u32 {
        self.bpm.unwrap_or(DEFAULT_BPM)
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar.unwrap_or(DEFAULT_BEATS_PER_BAR)
    }

    pub fn volume(&self) -> f32 {
        self.volume.unwrap_or(DEFAULT_VOLUME)
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.unwrap_or(DEFAULT_QUEUE_DEPTH).max(1)
    }

    /// Returns the settle delay from the configuration.
    pub fn settle_delay(&self) -> Result<Duration, ConfigError> {
        match &self.settle_delay {
            Some(settle_delay) => Ok(DurationString::from_string(settle_delay.clone())
                .map_err(|e| ConfigError::Duration {
                    value: settle_delay.clone(),
                    reason: e.to_string(),
                })?
                .into()),
            None => Ok(DEFAULT_SETTLE_DELAY),
        }
    }

    /// The engine settings described by this configuration.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        Ok(Settings {
            bpm: self.bpm(),
            beats_per_bar: self.beats_per_bar(),
            volume: self.volume(),
            sample_rate: self.sample_rate(),
            settle_delay: self.settle_delay()?,
        })
    }

    /// Loads the configured sounds. Without a main sound, synthesized clicks are used.
    pub fn sounds(&self) -> Result<SampleStore, ConfigError> {
        let accent = self
            .accent_sound
            .as_deref()
            .map(|path| self.load_sound(path))
            .transpose()?;

        match self.main_sound.as_deref() {
            Some(path) => Ok(SampleStore::new(self.load_sound(path)?, accent)),
            None => Ok(SampleStore::new(
                synthesize_click(self.sample_rate(), false),
                Some(accent.unwrap_or_else(|| synthesize_click(self.sample_rate(), true))),
            )),
        }
    }

    fn load_sound(&self, path: &Path) -> Result<Waveform, ConfigError> {
        let path = self.base_dir.join(path);
        let bytes = fs::read(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Waveform::load(&bytes).map_err(|source| ConfigError::Sound { path, source })
    }
}
