// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Disk-to-ring streaming against the public API: decode a generated file
//! on one thread, consume frames on another, and verify bit-exact,
//! gapless delivery.

use std::path::{Path, PathBuf};
use std::thread;
use zynamix::player::decoder::AudioFile;
use zynamix::realtime::FrameRing;

fn write_wav(dir: &Path, name: &str, rate: u32, frames: u32) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for frame in 0..frames {
        let value = (frame % 3000) as i16;
        writer.write_sample(value).unwrap();
        writer.write_sample(-value).unwrap();
    }
    writer.finalize().unwrap();
    path
}

#[test]
fn test_decoded_file_streams_through_ring_intact() {
    const FRAMES: u32 = 48000;
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path(), "stream.wav", 48000, FRAMES);

    let (mut writer, mut reader) = FrameRing::new(8192).split();

    let producer_path = path.clone();
    let producer = thread::spawn(move || {
        let mut file = AudioFile::open(&producer_path).unwrap();
        let mut a = Vec::new();
        let mut b = Vec::new();
        loop {
            a.clear();
            b.clear();
            let read = file.read_planar(&mut a, &mut b, 4096).unwrap();
            if read == 0 {
                break;
            }
            let mut offset = 0;
            while offset < read {
                let pushed = writer.push(&a[offset..read], &b[offset..read]);
                offset += pushed;
                if pushed == 0 {
                    thread::yield_now();
                }
            }
        }
        writer.position()
    });

    let mut a = vec![0.0f32; 1024];
    let mut b = vec![0.0f32; 1024];
    let mut received = 0u64;
    let mut mismatches = 0usize;
    while received < FRAMES as u64 {
        let got = reader.pop(&mut a, &mut b, 1024);
        for i in 0..got {
            let frame = received + i as u64;
            let expected = (frame % 3000) as f32 / 32768.0;
            if (a[i] - expected).abs() > 1e-4 || (b[i] + expected).abs() > 1e-4 {
                mismatches += 1;
            }
        }
        received += got as u64;
        if got == 0 {
            thread::yield_now();
        }
    }

    let produced = producer.join().unwrap();
    assert_eq!(produced, FRAMES as u64);
    assert_eq!(received, FRAMES as u64);
    assert_eq!(mismatches, 0);
    assert_eq!(reader.used(), 0);
}

#[test]
fn test_engine_config_defaults_cover_both_subsystems() {
    let config = zynamix::EngineConfig::default();
    assert_eq!(config.osc.port, 1370);
    assert!(config.mixer.strip_limit() >= 1);
    assert!(config.player.ring_seconds >= 1);
}
