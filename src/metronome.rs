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

//! The metronome engine and its control surface.
//!
//! Two locks guard the shared state. The parameter lock covers the bar buffer, the write
//! cursor and everything the bar is built from; the producer takes it briefly for each slice.
//! The cursor lock lives in the playhead and is only taken by the completion handler and
//! readers, so a bar rebuild never blocks the device's callback.

use std::{sync::Arc, thread, time::Duration};

use parking_lot::Mutex;
use tracing::{debug, error, info, span, Level, Span};

use crate::audio::{self, FragmentDone, Output, OutputFormat};
use crate::bar::{bar_length_samples, BarBuffer};
use crate::cursor::RingCursor;
use crate::error::{MetronomeError, Result, DEVICE_THREAD_DIED};
use crate::playsync::StopSignal;
use crate::samples::{SampleStore, Waveform};
use crate::tick::TickSink;

use self::playhead::Playhead;
use self::producer::Producer;

mod playhead;
mod producer;
#[cfg(test)]
mod tests;

/// Initial engine parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub bpm: u32,
    /// Values below 2 play a single unaccented beat.
    pub beats_per_bar: u32,
    /// Output level, 0.0 to 1.0.
    pub volume: f32,
    pub sample_rate: u32,
    /// How long to wait between halting and resuming when a parameter changes mid-playback.
    pub settle_delay: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            bpm: 120,
            beats_per_bar: 4,
            volume: 1.0,
            sample_rate: 44100,
            settle_delay: Duration::from_millis(100),
        }
    }
}

/// State behind the parameter lock.
struct Params {
    bpm: u32,
    beats_per_bar: u32,
    volume: f32,
    sample_rate: u32,
    sounds: SampleStore,
    bar: BarBuffer,
    cursor: RingCursor,
    /// Incremented on every play so completions can be matched to their session.
    epoch: u64,
}

/// A live play session.
struct Session {
    stop: StopSignal,
    join: thread::JoinHandle<()>,
}

/// A metronome that plays a bar of clicks through an output device, one beat per fragment.
pub struct Metronome {
    device_name: String,
    params: Arc<Mutex<Params>>,
    playhead: Arc<Playhead>,
    output: Arc<dyn Output>,
    /// Serializes play, stop and reconfiguration. Holds the producer while playing.
    session: Mutex<Option<Session>>,
    settle_delay: Duration,
    span: Span,
}

impl Metronome {
    /// Creates a metronome from raw little-endian 16-bit PCM. The main sound is required; empty
    /// accent bytes mean the accent beat uses the main sound. The device is opened here and
    /// stays open until the metronome is dropped.
    pub fn new(
        device: &dyn audio::Device,
        main: &[u8],
        accent: &[u8],
        settings: Settings,
    ) -> Result<Metronome> {
        let sounds = SampleStore::load(main, accent)?;
        Metronome::with_sounds(device, sounds, settings)
    }

    /// Creates a metronome from already decoded sounds.
    pub fn with_sounds(
        device: &dyn audio::Device,
        sounds: SampleStore,
        settings: Settings,
    ) -> Result<Metronome> {
        let span = span!(Level::INFO, "metronome", device = %device);
        let enter = span.enter();

        check_volume(settings.volume)?;
        let format = OutputFormat::new(settings.sample_rate)?;
        let bar = BarBuffer::build(
            settings.bpm,
            settings.beats_per_bar,
            &sounds,
            settings.sample_rate,
        )?;

        let playhead = Arc::new(Playhead::new());
        let on_done: FragmentDone = {
            let playhead = playhead.clone();
            Arc::new(move |fragment| playhead.on_fragment_done(fragment))
        };
        let output: Arc<dyn Output> = Arc::from(device.open(format, on_done)?);
        output.set_volume(settings.volume);

        info!(
            bpm = settings.bpm,
            beats_per_bar = settings.beats_per_bar,
            volume = settings.volume,
            format = %format,
            "Opened metronome."
        );

        drop(enter);
        Ok(Metronome {
            device_name: device.to_string(),
            params: Arc::new(Mutex::new(Params {
                bpm: settings.bpm,
                beats_per_bar: settings.beats_per_bar,
                volume: settings.volume,
                sample_rate: settings.sample_rate,
                sounds,
                bar,
                cursor: RingCursor::new(),
                epoch: 0,
            })),
            playhead,
            output,
            session: Mutex::new(None),
            settle_delay: settings.settle_delay,
            span,
        })
    }

    /// Starts playback from the top of a freshly built bar. Does nothing if already playing.
    pub fn play(&self) -> Result<()> {
        let _enter = self.span.enter();
        let mut session = self.session.lock();
        self.start(&mut session)
    }

    /// Halts playback and rewinds to the top of the bar. Returns false if nothing was playing.
    /// No fragment is submitted after this returns.
    pub fn pause(&self) -> bool {
        let _enter = self.span.enter();
        let mut session = self.session.lock();
        self.halt(&mut session)
    }

    /// Halts playback. Behaves exactly like `pause`.
    pub fn stop(&self) -> bool {
        self.pause()
    }

    pub fn is_playing(&self) -> bool {
        self.playhead.is_running()
    }

    /// Changes the tempo, restarting playback if it was running.
    pub fn set_tempo(&self, bpm: u32) -> Result<()> {
        let _enter = self.span.enter();
        let mut session = self.session.lock();

        let (beats_per_bar, sample_rate) = {
            let params = self.params.lock();
            if params.bpm == bpm {
                return Ok(());
            }
            (params.beats_per_bar, params.sample_rate)
        };
        bar_length_samples(bpm, beats_per_bar, sample_rate)?;

        info!(bpm, "Changing tempo.");
        self.reconfigure(&mut session, |params| params.bpm = bpm)
    }

    /// Changes the number of beats per bar, restarting playback if it was running.
    pub fn set_time_signature(&self, beats_per_bar: u32) -> Result<()> {
        let _enter = self.span.enter();
        let mut session = self.session.lock();

        let (bpm, sample_rate) = {
            let params = self.params.lock();
            if params.beats_per_bar == beats_per_bar {
                return Ok(());
            }
            (params.bpm, params.sample_rate)
        };
        bar_length_samples(bpm, beats_per_bar, sample_rate)?;

        info!(beats_per_bar, "Changing time signature.");
        self.reconfigure(&mut session, |params| params.beats_per_bar = beats_per_bar)
    }

    /// Sets the output level without interrupting playback.
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        check_volume(volume)?;
        self.params.lock().volume = volume;
        self.output.set_volume(volume);
        debug!(parent: &self.span, volume, "Set volume.");
        Ok(())
    }

    /// Replaces the main and/or accent sound. Missing or empty sounds are left alone. The new
    /// sounds are decoded before playback is touched, so bad input never interrupts it.
    pub fn replace_samples(&self, main: Option<&[u8]>, accent: Option<&[u8]>) -> Result<()> {
        let main = decode_replacement(main)?;
        let accent = decode_replacement(accent)?;
        if main.is_none() && accent.is_none() {
            return Ok(());
        }

        let _enter = self.span.enter();
        let mut session = self.session.lock();
        info!(
            main = main.is_some(),
            accent = accent.is_some(),
            "Replacing samples."
        );
        self.reconfigure(&mut session, move |params| {
            if let Some(main) = main {
                params.sounds.replace_main(main);
            }
            if let Some(accent) = accent {
                params.sounds.replace_accent(accent);
            }
        })
    }

    /// Registers the tick sink, replacing any earlier one. Only a weak reference is kept.
    pub fn register_tick_sink(&self, sink: &Arc<dyn TickSink>) {
        self.playhead.ticks().register(sink);
    }

    pub fn clear_tick_sink(&self) {
        self.playhead.ticks().clear();
    }

    /// Blocks until the next beat finishes playing or the timeout passes. Returns true if a
    /// beat finished.
    pub fn wait_for_beat(&self, timeout: Duration) -> bool {
        self.playhead.wait_for_completion(timeout)
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn bpm(&self) -> u32 {
        self.params.lock().bpm
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.params.lock().beats_per_bar
    }

    pub fn volume(&self) -> f32 {
        self.params.lock().volume
    }

    /// The volume as a whole percentage, truncated.
    pub fn volume_percent(&self) -> u32 {
        (self.volume() * 100.0) as u32
    }

    pub fn sample_rate(&self) -> u32 {
        self.params.lock().sample_rate
    }

    pub fn beat_length_samples(&self) -> usize {
        self.params.lock().bar.beat_length()
    }

    pub fn bar_length(&self) -> usize {
        self.params.lock().bar.len()
    }

    /// The current bar buffer.
    pub fn bar(&self) -> BarBuffer {
        self.params.lock().bar.clone()
    }

    /// Samples sliced for submission this session.
    pub fn write_cursor(&self) -> u64 {
        self.params.lock().cursor.position()
    }

    /// Samples confirmed played this session.
    pub fn play_cursor(&self) -> u64 {
        self.playhead.play_cursor()
    }

    /// The beat that is now playing, within the bar.
    pub fn current_beat(&self) -> u32 {
        self.playhead.current_beat()
    }

    fn start(&self, session: &mut Option<Session>) -> Result<()> {
        if session.is_some() {
            debug!("Already playing.");
            return Ok(());
        }

        self.rebuild()?;
        let (epoch, beats_per_bar, sample_rate) = {
            let mut params = self.params.lock();
            params.cursor.reset();
            params.epoch += 1;
            (params.epoch, params.beats_per_bar, params.sample_rate)
        };

        self.playhead.begin(epoch, beats_per_bar);
        self.output.restart();
        self.playhead.set_running(true);

        let stop = StopSignal::new();
        let producer = Producer {
            params: self.params.clone(),
            output: self.output.clone(),
            playhead: self.playhead.clone(),
            stop: stop.clone(),
            epoch,
            sample_rate,
        };
        match producer.spawn() {
            Ok(join) => {
                info!(epoch, "Playing.");
                *session = Some(Session { stop, join });
                Ok(())
            }
            Err(e) => {
                self.playhead.set_running(false);
                error!(err = %e, "Unable to start producer thread.");
                Err(MetronomeError::device(DEVICE_THREAD_DIED, e.to_string()))
            }
        }
    }

    fn halt(&self, session: &mut Option<Session>) -> bool {
        let Some(Session { stop, join }) = session.take() else {
            debug!("Already stopped.");
            return false;
        };

        self.playhead.set_running(false);
        stop.stop();
        if join.join().is_err() {
            error!("Producer thread panicked.");
        }

        // Flushed fragments come back through the completion handler, which ignores them now
        // that the running flag is down.
        self.output.reset();
        self.params.lock().cursor.reset();
        self.playhead.reset();

        info!("Stopped.");
        true
    }

    /// Applies a parameter change. A running metronome is halted, given the settle delay and
    /// started again on a bar built from the new parameters.
    fn reconfigure<F>(&self, session: &mut Option<Session>, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Params),
    {
        let was_playing = self.halt(session);
        apply(&mut *self.params.lock());

        if !was_playing {
            return self.rebuild();
        }

        thread::sleep(self.settle_delay);
        self.start(session)
    }

    /// Builds a bar from the current parameters outside the lock, then swaps it in.
    fn rebuild(&self) -> Result<()> {
        let (bpm, beats_per_bar, sounds, sample_rate) = {
            let params = self.params.lock();
            (
                params.bpm,
                params.beats_per_bar,
                params.sounds.clone(),
                params.sample_rate,
            )
        };

        let bar = BarBuffer::build(bpm, beats_per_bar, &sounds, sample_rate)?;
        debug!(
            bpm,
            beats_per_bar,
            beat_length = bar.beat_length(),
            len = bar.len(),
            "Built bar."
        );
        self.params.lock().bar = bar;
        Ok(())
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        let _enter = self.span.enter();
        let mut session = self.session.lock();
        self.halt(&mut session);
        self.output.close();
        info!("Closed metronome.");
    }
}

fn check_volume(volume: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&volume) {
        return Err(MetronomeError::OutOfRange {
            name: "volume",
            value: volume as f64,
            min: 0.0,
            max: 1.0,
        });
    }
    Ok(())
}

fn decode_replacement(bytes: Option<&[u8]>) -> Result<Option<Waveform>> {
    bytes
        .filter(|bytes| !bytes.is_empty())
        .map(Waveform::load)
        .transpose()
}
