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
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
        Arc,
    },
    thread,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, span, Level};

use crate::audio::{Device as AudioDevice, Fragment, FragmentDone, OutputFormat};
use crate::error::{
    MetronomeError, Result, DEVICE_NOT_FOUND, DEVICE_STREAM_BUILD_FAILED,
    DEVICE_STREAM_START_FAILED, DEVICE_THREAD_DIED, DEVICE_UNSUPPORTED_FORMAT,
};

/// A cpal output device.
#[derive(Clone)]
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// How many fragments may wait behind the one that is playing.
    queue_depth: usize,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn AudioDevice>>> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn AudioDevice> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal devices that have at least one output channel.
    fn list_cpal_devices() -> Result<Vec<Device>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout().map_err(enumeration_error)?;
        let _shh_stderr = shh::stderr().map_err(enumeration_error)?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)
                .map_err(enumeration_error)?
                .devices()
            {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                if let Some(device) = Device::from_cpal(host_id, device, 0) {
                    devices.push(device);
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Wraps a cpal device, skipping devices without outputs.
    fn from_cpal(host_id: cpal::HostId, device: cpal::Device, queue_depth: usize) -> Option<Device> {
        let max_channels = device
            .supported_output_configs()
            .ok()?
            .map(|config| config.channels())
            .max()
            .unwrap_or(0);
        if max_channels == 0 {
            return None;
        }

        Some(Device {
            name: device.name().ok()?,
            max_channels,
            host_id,
            device,
            queue_depth,
        })
    }

    /// Gets the given cpal device. "default" is the default host's default output.
    pub fn get(name: &str, queue_depth: usize) -> Result<Device> {
        let not_found = || {
            MetronomeError::device(DEVICE_NOT_FOUND, format!("no device found with name {name}"))
        };

        if name == "default" {
            let host = cpal::default_host();
            let device = host.default_output_device().ok_or_else(not_found)?;
            return Device::from_cpal(host.id(), device, queue_depth).ok_or_else(not_found);
        }

        Device::list_cpal_devices()?
            .into_iter()
            .find(|device| device.name.trim() == name)
            .map(|device| Device {
                queue_depth,
                ..device
            })
            .ok_or_else(not_found)
    }

    /// Picks a stream configuration for the format, preferring 16-bit output and as few
    /// channels as possible. Mono fragments are copied to every channel.
    fn stream_config(&self, format: OutputFormat) -> Result<(cpal::StreamConfig, cpal::SampleFormat)> {
        let sample_rate: cpal::SampleRate = format.sample_rate;
        let supported = self.device.supported_output_configs().map_err(|e| {
            MetronomeError::device(DEVICE_UNSUPPORTED_FORMAT, e.to_string())
        })?;

        let range = supported
            .filter(|range| {
                range.min_sample_rate() <= sample_rate && range.max_sample_rate() >= sample_rate
            })
            .filter_map(|range| {
                sample_format_rank(range.sample_format()).map(|rank| (rank, range))
            })
            .min_by_key(|(rank, range)| (*rank, range.channels()))
            .map(|(_, range)| range)
            .ok_or_else(|| {
                MetronomeError::device(
                    DEVICE_UNSUPPORTED_FORMAT,
                    format!("{} does not support {}", self.name, format),
                )
            })?;

        Ok((
            cpal::StreamConfig {
                channels: range.channels(),
                sample_rate,
                buffer_size: cpal::BufferSize::Default,
            },
            range.sample_format(),
        ))
    }
}

impl AudioDevice for Device {
    fn open(
        &self,
        format: OutputFormat,
        on_done: FragmentDone,
    ) -> Result<Box<dyn crate::audio::Output>> {
        let span = span!(Level::INFO, "open output (cpal)", device = self.name);
        let _enter = span.enter();

        let (config, sample_format) = self.stream_config(format)?;
        info!(
            format = %format,
            channels = config.channels,
            sample_format = %sample_format,
            queue_depth = self.queue_depth,
            "Opening output stream."
        );

        let (pending_tx, pending_rx) = crossbeam_channel::bounded(self.queue_depth.max(1));
        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let volume = Arc::new(AtomicU32::new(1.0f32.to_bits()));
        let flushes = Arc::new(AtomicU64::new(0));

        let feed = StreamFeed::new(
            pending_rx.clone(),
            done_tx,
            volume.clone(),
            flushes.clone(),
        );

        // Some backends can't move a stream between threads, so it's built and held on its
        // own thread.
        let device = self.device.clone();
        let stream_thread = thread::Builder::new()
            .name("clicktrack-stream".into())
            .spawn(move || run_stream(device, config, sample_format, feed, ready_tx, command_rx))
            .map_err(|e| MetronomeError::device(DEVICE_THREAD_DIED, e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = stream_thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = stream_thread.join();
                return Err(MetronomeError::device(
                    DEVICE_THREAD_DIED,
                    "stream thread exited before the stream was ready",
                ));
            }
        }

        let completion_thread = {
            let on_done = on_done.clone();
            thread::Builder::new()
                .name("clicktrack-completion".into())
                .spawn(move || {
                    for fragment in done_rx.iter() {
                        on_done(fragment);
                    }
                })
        };
        let completion_thread = match completion_thread {
            Ok(completion_thread) => completion_thread,
            Err(e) => {
                let _ = command_tx.send(StreamCommand::Close);
                let _ = stream_thread.join();
                return Err(MetronomeError::device(DEVICE_THREAD_DIED, e.to_string()));
            }
        };

        Ok(Box::new(Output {
            name: self.name.clone(),
            pending_tx,
            pending_rx,
            on_done,
            volume,
            flushes,
            commands: command_tx,
            closed: AtomicBool::new(false),
            stream_thread: Mutex::new(Some(stream_thread)),
            completion_thread: Mutex::new(Some(completion_thread)),
        }))
    }
}

/// Lower is preferred. Formats the feed can't write are skipped.
fn sample_format_rank(sample_format: cpal::SampleFormat) -> Option<u8> {
    match sample_format {
        cpal::SampleFormat::I16 => Some(0),
        cpal::SampleFormat::F32 => Some(1),
        cpal::SampleFormat::I32 => Some(2),
        _ => None,
    }
}

fn enumeration_error(e: impl fmt::Display) -> MetronomeError {
    MetronomeError::device(DEVICE_NOT_FOUND, format!("unable to enumerate devices: {e}"))
}

enum StreamCommand {
    Play,
    Close,
}

/// Builds and starts the stream, reports back, then holds the stream until closed.
fn run_stream(
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    feed: StreamFeed,
    ready: Sender<Result<()>>,
    commands: Receiver<StreamCommand>,
) {
    let stream = match sample_format {
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, feed),
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, feed),
        cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, feed),
        other => Err(MetronomeError::device(
            DEVICE_UNSUPPORTED_FORMAT,
            format!("unsupported sample format {other}"),
        )),
    };
    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready.send(Err(MetronomeError::device(
            DEVICE_STREAM_START_FAILED,
            e.to_string(),
        )));
        return;
    }
    info!("Output stream started.");
    let _ = ready.send(Ok(()));

    for command in commands.iter() {
        match command {
            StreamCommand::Play => {
                if let Err(e) = stream.play() {
                    error!(err = %e, "Unable to restart output stream.");
                }
            }
            StreamCommand::Close => break,
        }
    }
    debug!("Output stream closed.");
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut feed: StreamFeed,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| feed.fill(data, channels),
            |err| error!("CPAL output stream error: {}", err),
            None,
        )
        .map_err(|e| MetronomeError::device(DEVICE_STREAM_BUILD_FAILED, e.to_string()))
}

/// The audio callback's side of an output. Plays queued fragments back to back and hands each
/// finished fragment to the completion thread.
struct StreamFeed {
    pending: Receiver<Fragment>,
    done: Sender<Fragment>,
    current: Option<Fragment>,
    position: usize,
    volume: Arc<AtomicU32>,
    flushes: Arc<AtomicU64>,
    seen_flushes: u64,
}

impl StreamFeed {
    fn new(
        pending: Receiver<Fragment>,
        done: Sender<Fragment>,
        volume: Arc<AtomicU32>,
        flushes: Arc<AtomicU64>,
    ) -> StreamFeed {
        StreamFeed {
            pending,
            done,
            current: None,
            position: 0,
            volume,
            flushes,
            seen_flushes: 0,
        }
    }

    /// Fills an interleaved buffer, writing each mono sample to every channel. Silence fills
    /// any gap between fragments.
    fn fill<T>(&mut self, data: &mut [T], channels: usize)
    where
        T: SizedSample + FromSample<f32>,
    {
        self.check_flush();
        let volume = f32::from_bits(self.volume.load(Ordering::Relaxed));
        for frame in data.chunks_mut(channels.max(1)) {
            let value = f32::from(self.next_sample()) / 32768.0 * volume;
            frame.fill(T::from_sample(value));
        }
        // Report a fragment as soon as its last sample is out.
        self.finish_current();
    }

    /// A reset abandons the fragment that was playing.
    fn check_flush(&mut self) {
        let flushes = self.flushes.load(Ordering::Acquire);
        if flushes != self.seen_flushes {
            self.seen_flushes = flushes;
            if let Some(fragment) = self.current.take() {
                let _ = self.done.send(fragment);
            }
        }
    }

    fn next_sample(&mut self) -> i16 {
        loop {
            if let Some(fragment) = &self.current {
                if let Some(sample) = fragment.samples().get(self.position) {
                    self.position += 1;
                    return *sample;
                }
            }
            self.finish_current();
            match self.pending.try_recv() {
                Ok(fragment) => {
                    self.current = Some(fragment);
                    self.position = 0;
                }
                Err(_) => return 0,
            }
        }
    }

    fn finish_current(&mut self) {
        let finished = self
            .current
            .as_ref()
            .is_some_and(|fragment| self.position >= fragment.len());
        if finished {
            if let Some(fragment) = self.current.take() {
                let _ = self.done.send(fragment);
            }
        }
    }
}

/// An opened cpal output.
struct Output {
    name: String,
    pending_tx: Sender<Fragment>,
    /// Kept so a reset can drain fragments the stream hasn't picked up yet.
    pending_rx: Receiver<Fragment>,
    on_done: FragmentDone,
    volume: Arc<AtomicU32>,
    flushes: Arc<AtomicU64>,
    commands: Sender<StreamCommand>,
    closed: AtomicBool,
    stream_thread: Mutex<Option<thread::JoinHandle<()>>>,
    completion_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl crate::audio::Output for Output {
    fn submit(&self, fragment: Fragment) -> std::result::Result<(), Fragment> {
        if self.closed.load(Ordering::Acquire) {
            return Err(fragment);
        }
        self.pending_tx.try_send(fragment).map_err(|e| e.into_inner())
    }

    fn set_volume(&self, volume: f32) {
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    fn restart(&self) {
        let _ = self.commands.send(StreamCommand::Play);
    }

    fn reset(&self) {
        self.flushes.fetch_add(1, Ordering::AcqRel);
        let mut flushed = 0;
        for fragment in self.pending_rx.try_iter() {
            (self.on_done)(fragment);
            flushed += 1;
        }
        debug!(device = self.name, flushed, "Reset output.");
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let _ = self.commands.send(StreamCommand::Close);
        if let Some(stream_thread) = self.stream_thread.lock().take() {
            if stream_thread.join().is_err() {
                error!(device = self.name, "Stream thread panicked.");
            }
        }
        // Dropping the stream dropped the feed's sender, so the completion thread drains and
        // exits.
        if let Some(completion_thread) = self.completion_thread.lock().take() {
            if completion_thread.join().is_err() {
                error!(device = self.name, "Completion thread panicked.");
            }
        }
        let dropped = self.pending_rx.try_iter().count();
        info!(device = self.name, dropped, "Closed output.");
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        crate::audio::Output::close(self);
    }
}
