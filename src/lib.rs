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

//! A gapless metronome. A bar of clicks is built once per tempo and signature, then sliced
//! into one-beat fragments that are double-buffered to an audio output.

pub mod audio;
pub mod bar;
pub mod config;
pub mod cursor;
pub mod error;
pub mod metronome;
pub mod playsync;
pub mod render;
pub mod samples;
pub mod tick;
#[cfg(test)]
pub mod testutil;

pub use error::{MetronomeError, Result};
pub use metronome::{Metronome, Settings};
