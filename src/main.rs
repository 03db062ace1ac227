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
use std::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{crate_version, Args, Parser, Subcommand};
use duration_string::DurationString;
use tracing::info;
use tracing_subscriber::EnvFilter;

use clicktrack::audio::{self, OutputFormat};
use clicktrack::bar::BarBuffer;
use clicktrack::config::init_metronome;
use clicktrack::render::write_wav;
use clicktrack::samples::{synthesize_click, SampleStore, Waveform};
use clicktrack::tick::{ChannelTickSink, TickSink};
use clicktrack::{Metronome, Settings};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A gapless metronome."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Plays a click track through the audio interface.
    Play {
        /// The device name to play through. "default" uses the system default output.
        device_name: String,
        #[command(flatten)]
        sound: SoundArgs,
        /// The output level, from 0.0 to 1.0.
        #[arg(short, long, default_value_t = 1.0)]
        volume: f32,
        /// Fragments that may wait in the device queue.
        #[arg(short, long, default_value_t = 2)]
        queue_depth: usize,
        /// Stop after this long, e.g. 30s. Plays until Enter is pressed otherwise.
        #[arg(short, long)]
        duration: Option<String>,
    },
    /// Start will start the metronome from a config file.
    Start {
        /// The path to the metronome config.
        config_path: String,
        /// Stop after this long, e.g. 30s. Plays until Enter is pressed otherwise.
        #[arg(short, long)]
        duration: Option<String>,
    },
    /// Renders bars to a WAV file.
    Render {
        /// The WAV file to write.
        output: String,
        #[command(flatten)]
        sound: SoundArgs,
        /// The number of bars to write.
        #[arg(long, default_value_t = 1)]
        bars: usize,
    },
}

/// Options describing the bar.
#[derive(Args)]
struct SoundArgs {
    /// Raw little-endian 16-bit mono PCM for regular beats. A click is synthesized if unset.
    #[arg(short, long)]
    main: Option<PathBuf>,
    /// Raw little-endian 16-bit mono PCM for the first beat of each bar.
    #[arg(short, long)]
    accent: Option<PathBuf>,
    /// Tempo in beats per minute.
    #[arg(short, long, default_value_t = 120)]
    bpm: u32,
    /// Beats per bar. Less than 2 plays a single unaccented beat.
    #[arg(short = 'n', long, default_value_t = 4)]
    beats_per_bar: u32,
    /// Output sample rate in Hz.
    #[arg(short, long, default_value_t = 44100)]
    sample_rate: u32,
}

impl SoundArgs {
    fn sounds(&self) -> Result<SampleStore, Box<dyn Error>> {
        let accent = self.accent.as_deref().map(read_sound).transpose()?;
        Ok(match self.main.as_deref() {
            Some(main) => SampleStore::new(read_sound(main)?, accent),
            None => SampleStore::new(
                synthesize_click(self.sample_rate, false),
                Some(accent.unwrap_or_else(|| synthesize_click(self.sample_rate, true))),
            ),
        })
    }
}

fn read_sound(path: &Path) -> Result<Waveform, Box<dyn Error>> {
    let bytes = fs::read(path)
        .map_err(|e| format!("unable to read sound file {}: {}", path.display(), e))?;
    Ok(Waveform::load(&bytes)?)
}

fn parse_duration(duration: Option<String>) -> Result<Option<Duration>, Box<dyn Error>> {
    match duration {
        Some(duration) => Ok(Some(DurationString::from_string(duration)?.into())),
        None => Ok(None),
    }
}

/// Plays until the duration passes or Enter is pressed, logging each beat.
fn run(metronome: &Metronome, duration: Option<Duration>) -> Result<(), Box<dyn Error>> {
    let (sink, ticks) = ChannelTickSink::new(64);
    let sink: Arc<dyn TickSink> = Arc::new(sink);
    metronome.register_tick_sink(&sink);

    // Ends once the sink is dropped.
    let tick_logger = thread::spawn(move || {
        for beat in ticks.iter() {
            info!(beat, "Tick");
        }
    });

    let (enter_tx, enter_rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let mut line = String::new();
        let _ = io::stdin().read_line(&mut line);
        let _ = enter_tx.send(());
    });

    metronome.play()?;
    match duration {
        Some(duration) => {
            let _ = enter_rx.recv_timeout(duration);
        }
        None => {
            println!("Press Enter to stop.");
            let _ = enter_rx.recv();
        }
    }
    metronome.stop();

    metronome.clear_tick_sink();
    drop(sink);
    let _ = tick_logger.join();
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play {
            device_name,
            sound,
            volume,
            queue_depth,
            duration,
        } => {
            let duration = parse_duration(duration)?;
            let device = audio::get_device(&device_name, queue_depth)?;
            let settings = Settings {
                bpm: sound.bpm,
                beats_per_bar: sound.beats_per_bar,
                volume,
                sample_rate: sound.sample_rate,
                ..Settings::default()
            };
            let metronome = Metronome::with_sounds(device.as_ref(), sound.sounds()?, settings)?;
            run(&metronome, duration)?;
        }
        Commands::Start {
            config_path,
            duration,
        } => {
            let duration = parse_duration(duration)?;
            let metronome = init_metronome(&PathBuf::from(config_path))?;
            run(&metronome, duration)?;
        }
        Commands::Render { output, sound, bars } => {
            let bar = BarBuffer::build(
                sound.bpm,
                sound.beats_per_bar,
                &sound.sounds()?,
                sound.sample_rate,
            )?;
            let format = OutputFormat::new(sound.sample_rate)?;
            write_wav(&PathBuf::from(output), &bar, format, bars)?;
        }
    }

    Ok(())
}
