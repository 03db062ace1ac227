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
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use super::*;
use crate::audio::mock;
use crate::error::DEVICE_UNSUPPORTED_FORMAT;
use crate::testutil::{eventually, pcm_bytes};
use crate::tick::ChannelTickSink;

fn main_bytes() -> Vec<u8> {
    pcm_bytes(&[1000; 100])
}

fn accent_bytes() -> Vec<u8> {
    pcm_bytes(&[2000; 100])
}

fn settings() -> Settings {
    Settings {
        settle_delay: Duration::ZERO,
        ..Settings::default()
    }
}

fn metronome(device: &mock::Device, accent: &[u8]) -> Metronome {
    Metronome::new(device, &main_bytes(), accent, settings()).unwrap()
}

fn tick_sink(metronome: &Metronome) -> (Arc<dyn TickSink>, Receiver<u32>) {
    let (sink, rx) = ChannelTickSink::new(64);
    let sink: Arc<dyn TickSink> = Arc::new(sink);
    metronome.register_tick_sink(&sink);
    (sink, rx)
}

/// Completes fragments one at a time as the producer submits them.
fn complete(device: &mock::Device, count: usize) {
    for _ in 0..count {
        eventually(|| device.complete_next(), "Fragment was never submitted");
    }
}

#[test]
fn test_construct_rejects_bad_main_sound() {
    let device = mock::Device::manual("mock");
    for main in [Vec::<u8>::new(), vec![1u8, 2, 3]] {
        assert!(matches!(
            Metronome::new(&device, &main, &[], settings()),
            Err(MetronomeError::InvalidArgument(_))
        ));
    }
    assert_eq!(0, device.opens());
}

#[test]
fn test_construct_rejects_bad_settings() {
    let device = mock::Device::manual("mock");
    let bad = [
        Settings {
            bpm: 0,
            ..settings()
        },
        Settings {
            sample_rate: 0,
            ..settings()
        },
    ];
    for settings in bad {
        assert!(matches!(
            Metronome::new(&device, &main_bytes(), &[], settings),
            Err(MetronomeError::InvalidArgument(_))
        ));
    }

    assert!(matches!(
        Metronome::new(
            &device,
            &main_bytes(),
            &[],
            Settings {
                volume: 1.5,
                ..settings()
            }
        ),
        Err(MetronomeError::OutOfRange { name: "volume", .. })
    ));
    assert_eq!(0, device.opens());
}

#[test]
fn test_construct_device_failure() {
    let device = mock::Device::manual("mock-fail");
    match Metronome::new(&device, &main_bytes(), &[], settings()) {
        Err(MetronomeError::Device { status, .. }) => {
            assert_eq!(DEVICE_UNSUPPORTED_FORMAT, status)
        }
        Err(e) => panic!("unexpected error {e}"),
        Ok(_) => panic!("mock-fail device opened"),
    }
}

#[test]
fn test_construct_opens_device() {
    let device = mock::Device::manual("mock");
    let metronome = Metronome::new(
        &device,
        &main_bytes(),
        &accent_bytes(),
        Settings {
            volume: 0.25,
            ..settings()
        },
    )
    .unwrap();

    assert!(device.is_open());
    assert_eq!(1, device.opens());
    assert_eq!(Some(0.25), device.volume());
    assert_eq!(44100, device.format().unwrap().sample_rate);
    assert_eq!("mock (Mock)", metronome.device_name());
    assert!(!metronome.is_playing());
    assert_eq!(25, metronome.volume_percent());
}

#[test]
fn test_bar_layout() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &accent_bytes());

    assert_eq!(22050, metronome.beat_length_samples());
    assert_eq!(88200, metronome.bar_length());

    let bar = metronome.bar();
    assert_eq!(2000, bar.beat(0).unwrap()[0]);
    assert_eq!(1000, bar.beat(1).unwrap()[0]);
    assert_eq!(0, bar.beat(1).unwrap()[100]);
}

#[test]
fn test_full_bar_of_completions() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &accent_bytes());

    metronome.play().unwrap();
    assert!(metronome.is_playing());
    complete(&device, 4);

    assert_eq!(0, metronome.current_beat());
    assert_eq!(88200, metronome.play_cursor());
    assert!(metronome.write_cursor() >= 88200);
}

#[test]
fn test_tick_sequence() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &accent_bytes());
    let (_sink, rx) = tick_sink(&metronome);

    metronome.play().unwrap();
    complete(&device, 5);

    assert_eq!(vec![1, 2, 3, 0, 1], rx.try_iter().collect::<Vec<u32>>());
}

#[test]
fn test_fragments_follow_bar() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &accent_bytes());

    metronome.play().unwrap();
    eventually(|| device.submitted_count() >= 2, "Lead fragments never arrived");

    let bar = metronome.bar();
    let submitted = device.submitted();
    assert_eq!(bar.beat(0).unwrap(), submitted[0].samples());
    assert_eq!(bar.beat(1).unwrap(), submitted[1].samples());
    assert_eq!(0, submitted[0].sequence());
    assert_eq!(1, submitted[1].sequence());
}

#[test]
fn test_accent_falls_back_to_main() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &[]);
    let (_sink, rx) = tick_sink(&metronome);

    let bar = metronome.bar();
    assert_eq!(bar.beat(0).unwrap(), bar.beat(1).unwrap());

    metronome.play().unwrap();
    complete(&device, 4);
    assert_eq!(vec![1, 2, 3, 0], rx.try_iter().collect::<Vec<u32>>());
}

#[test]
fn test_play_is_idempotent() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &accent_bytes());

    metronome.play().unwrap();
    metronome.play().unwrap();

    assert!(metronome.is_playing());
    assert_eq!(1, device.restarts());
}

#[test]
fn test_stop_when_stopped() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &accent_bytes());

    assert!(!metronome.stop());
    assert!(!metronome.pause());
    assert_eq!(0, device.resets());
}

#[test]
fn test_stop_resets_cursors() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &accent_bytes());

    metronome.play().unwrap();
    complete(&device, 2);
    assert_eq!(2, metronome.current_beat());

    assert!(metronome.stop());
    assert!(!metronome.is_playing());
    assert_eq!(0, metronome.write_cursor());
    assert_eq!(0, metronome.play_cursor());
    assert_eq!(0, metronome.current_beat());
    assert_eq!(0, device.pending());
    assert_eq!(1, device.resets());

    // Nothing is submitted once stop has returned.
    let submitted = device.submitted_count();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(submitted, device.submitted_count());

    // The next session slices from the top of the bar again.
    metronome.play().unwrap();
    eventually(
        || device.submitted_count() > submitted,
        "New session never submitted",
    );
    let fragment = &device.submitted()[submitted];
    assert_eq!(0, fragment.sequence());
    assert_eq!(metronome.bar().beat(0).unwrap(), fragment.samples());
}

#[test]
fn test_pause_behaves_like_stop() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &accent_bytes());

    metronome.play().unwrap();
    complete(&device, 1);
    assert!(metronome.pause());
    assert!(!metronome.is_playing());
    assert_eq!(0, metronome.write_cursor());
    assert_eq!(0, metronome.current_beat());
}

#[test]
fn test_completions_after_stop_are_ignored() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &accent_bytes());
    let (_sink, rx) = tick_sink(&metronome);

    metronome.play().unwrap();
    eventually(|| device.pending() >= 2, "Lead fragments never arrived");
    metronome.stop();

    // The reset flushed pending fragments through the completion handler.
    assert!(!device.complete_next());
    assert!(rx.try_iter().next().is_none());
    assert_eq!(0, metronome.play_cursor());
}

#[test]
fn test_set_volume() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &accent_bytes());
    metronome.play().unwrap();

    for volume in [-0.1, 1.5, f32::NAN] {
        assert!(matches!(
            metronome.set_volume(volume),
            Err(MetronomeError::OutOfRange { .. })
        ));
    }
    assert_eq!(1.0, metronome.volume());

    metronome.set_volume(0.0).unwrap();
    assert_eq!(Some(0.0), device.volume());
    metronome.set_volume(1.0).unwrap();
    assert_eq!(Some(1.0), device.volume());
    metronome.set_volume(0.5).unwrap();
    assert_eq!(50, metronome.volume_percent());

    // Volume never interrupts playback.
    assert!(metronome.is_playing());
    assert_eq!(0, device.resets());
}

#[test]
fn test_set_tempo_while_playing() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &accent_bytes());

    metronome.play().unwrap();
    complete(&device, 1);
    metronome.set_tempo(240).unwrap();

    assert!(metronome.is_playing());
    assert_eq!(240, metronome.bpm());
    assert_eq!(11025, metronome.beat_length_samples());
    assert_eq!(44100, metronome.bar_length());
    assert_eq!(1, device.resets());
    assert_eq!(2, device.restarts());
    assert_eq!(0, metronome.current_beat());

    complete(&device, 2);
    assert_eq!(2, metronome.current_beat());
    assert_eq!(22050, metronome.play_cursor());
    assert!(device
        .submitted()
        .iter()
        .rev()
        .take(2)
        .all(|fragment| fragment.len() == 11025));
}

#[test]
fn test_set_tempo_while_stopped() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &accent_bytes());

    metronome.set_tempo(60).unwrap();
    assert!(!metronome.is_playing());
    assert_eq!(44100, metronome.beat_length_samples());
    assert_eq!(0, device.restarts());
}

#[test]
fn test_set_tempo_same_value() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &accent_bytes());

    metronome.play().unwrap();
    metronome.set_tempo(120).unwrap();
    assert_eq!(0, device.resets());
    assert_eq!(1, device.restarts());
}

#[test]
fn test_set_tempo_invalid() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &accent_bytes());

    metronome.play().unwrap();
    assert!(matches!(
        metronome.set_tempo(0),
        Err(MetronomeError::InvalidArgument(_))
    ));
    assert!(metronome.is_playing());
    assert_eq!(120, metronome.bpm());
    assert_eq!(0, device.resets());
}

#[test]
fn test_set_time_signature() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &accent_bytes());
    let (_sink, rx) = tick_sink(&metronome);

    metronome.set_time_signature(3).unwrap();
    assert_eq!(3, metronome.beats_per_bar());
    assert_eq!(66150, metronome.bar_length());

    metronome.play().unwrap();
    complete(&device, 4);
    assert_eq!(vec![1, 2, 0, 1], rx.try_iter().collect::<Vec<u32>>());

    metronome.set_time_signature(1).unwrap();
    assert!(metronome.is_playing());
    assert_eq!(22050, metronome.bar_length());
    complete(&device, 2);
    assert_eq!(vec![0, 0], rx.try_iter().collect::<Vec<u32>>());

    // The single beat uses the main sound.
    assert_eq!(1000, metronome.bar().beat(0).unwrap()[0]);
}

#[test]
fn test_set_time_signature_too_long() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &accent_bytes());

    metronome.play().unwrap();
    assert!(matches!(
        metronome.set_time_signature(u32::MAX),
        Err(MetronomeError::InvalidArgument(_))
    ));
    assert!(metronome.is_playing());
    assert_eq!(4, metronome.beats_per_bar());
    assert_eq!(88200, metronome.bar_length());
    assert_eq!(0, device.resets());

    // A tempo slow enough to overflow the current signature is refused the same way.
    metronome.set_time_signature(26).unwrap();
    assert!(matches!(
        metronome.set_tempo(1),
        Err(MetronomeError::InvalidArgument(_))
    ));
    assert_eq!(120, metronome.bpm());
    assert!(metronome.is_playing());
}

#[test]
fn test_replace_samples() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &[]);

    metronome
        .replace_samples(None, Some(pcm_bytes(&[3000; 10]).as_slice()))
        .unwrap();
    let bar = metronome.bar();
    assert_eq!(3000, bar.beat(0).unwrap()[0]);
    assert_eq!(1000, bar.beat(1).unwrap()[0]);

    metronome
        .replace_samples(Some(pcm_bytes(&[4000; 10]).as_slice()), None)
        .unwrap();
    let bar = metronome.bar();
    assert_eq!(3000, bar.beat(0).unwrap()[0]);
    assert_eq!(4000, bar.beat(1).unwrap()[0]);
}

#[test]
fn test_replace_main_moves_fallback_accent() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &[]);

    metronome
        .replace_samples(Some(pcm_bytes(&[4000; 10]).as_slice()), Some(&b""[..]))
        .unwrap();
    let bar = metronome.bar();
    assert_eq!(4000, bar.beat(0).unwrap()[0]);
    assert_eq!(4000, bar.beat(1).unwrap()[0]);
}

#[test]
fn test_replace_samples_while_playing() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &accent_bytes());

    metronome.play().unwrap();
    metronome
        .replace_samples(Some(pcm_bytes(&[4000; 10]).as_slice()), None)
        .unwrap();
    assert!(metronome.is_playing());
    assert_eq!(1, device.resets());
    assert_eq!(4000, metronome.bar().beat(1).unwrap()[0]);

    // Nothing to replace means nothing happens.
    metronome.replace_samples(None, Some(&b""[..])).unwrap();
    assert_eq!(1, device.resets());
}

#[test]
fn test_replace_samples_invalid() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &accent_bytes());

    metronome.play().unwrap();
    assert!(matches!(
        metronome.replace_samples(Some(&[1u8, 2, 3][..]), None),
        Err(MetronomeError::InvalidArgument(_))
    ));
    assert!(metronome.is_playing());
    assert_eq!(0, device.resets());
    assert_eq!(1000, metronome.bar().beat(1).unwrap()[0]);
}

#[test]
fn test_rejected_fragments_are_skipped() {
    let device = mock::Device::manual("mock").with_capacity(1);
    let metronome = metronome(&device, &accent_bytes());

    metronome.play().unwrap();
    eventually(|| device.rejected() >= 1, "No fragment was rejected");
    assert!(metronome.is_playing());

    // Playback carries on once the device drains.
    complete(&device, 2);
    assert_eq!(2, metronome.current_beat());
}

#[test]
fn test_dropped_sink_stops_ticks() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &accent_bytes());
    let (sink, rx) = tick_sink(&metronome);

    metronome.play().unwrap();
    complete(&device, 1);
    drop(sink);
    complete(&device, 1);

    assert_eq!(vec![1], rx.try_iter().collect::<Vec<u32>>());
    assert_eq!(2, metronome.current_beat());
}

#[test]
fn test_clear_tick_sink() {
    let device = mock::Device::manual("mock");
    let metronome = metronome(&device, &accent_bytes());
    let (_sink, rx) = tick_sink(&metronome);

    metronome.clear_tick_sink();
    metronome.play().unwrap();
    complete(&device, 1);
    assert!(rx.try_recv().is_err());
}

/// Records the engine's own view of the beat from inside the tick callback.
struct StateReadingSink {
    metronome: Weak<Metronome>,
    tx: Sender<(u32, u32, u64)>,
}

impl TickSink for StateReadingSink {
    fn notify(&self, beat_index: u32) {
        if let Some(metronome) = self.metronome.upgrade() {
            let _ = self.tx.send((
                beat_index,
                metronome.current_beat(),
                metronome.play_cursor(),
            ));
        }
    }
}

#[test]
fn test_sink_can_read_state() {
    let device = mock::Device::manual("mock");
    let metronome = Arc::new(metronome(&device, &accent_bytes()));
    let (tx, rx) = crossbeam_channel::unbounded();
    let sink: Arc<dyn TickSink> = Arc::new(StateReadingSink {
        metronome: Arc::downgrade(&metronome),
        tx,
    });
    metronome.register_tick_sink(&sink);
    metronome.play().unwrap();

    let completer = {
        let device = device.clone();
        thread::spawn(move || complete(&device, 2))
    };

    assert_eq!((1, 1, 22050), rx.recv_timeout(Duration::from_secs(5)).unwrap());
    assert_eq!((2, 2, 44100), rx.recv_timeout(Duration::from_secs(5)).unwrap());
    completer.join().unwrap();
    assert!(metronome.stop());
}

#[test]
fn test_realtime_playback() {
    // 600 bpm at 8kHz is 800 samples, 100ms, per beat.
    let device = mock::Device::get("mock");
    let metronome = Metronome::new(
        &device,
        &main_bytes(),
        &accent_bytes(),
        Settings {
            bpm: 600,
            sample_rate: 8000,
            ..settings()
        },
    )
    .unwrap();
    let (_sink, rx) = tick_sink(&metronome);

    metronome.play().unwrap();
    let ticks: Vec<u32> = (0..6)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    assert_eq!(vec![1, 2, 3, 0, 1, 2], ticks);
    assert!(metronome.wait_for_beat(Duration::from_secs(5)));

    metronome.stop();
    assert_eq!(0, metronome.current_beat());
}

#[test]
fn test_drop_closes_device() {
    let device = mock::Device::manual("mock");
    {
        let metronome = metronome(&device, &accent_bytes());
        metronome.play().unwrap();
        eventually(|| device.pending() >= 1, "Nothing was submitted");
    }

    assert!(!device.is_open());
    assert_eq!(1, device.closes());
    assert_eq!(1, device.resets());
}
