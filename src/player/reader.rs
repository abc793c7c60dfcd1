// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! File reader worker.
//!
//! One thread per open file: decodes from disk, converts the sample rate
//! when the file and engine rates differ, and pushes stereo frames into the
//! ring buffer. Seek requests, the loop flag and shutdown all arrive as
//! atomic state transitions; the worker polls them between blocks so the
//! real-time side never has to signal.

use super::decoder::AudioFile;
use super::resampler::StreamResampler;
use super::state::{PlayerState, SeekState};
use crate::realtime::FrameWriter;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Upper bound on output frames produced per block.
const OUT_BLOCK_FRAMES: usize = 16384;
/// Poll interval of the main loop.
const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Sleep while waiting for ring buffer space.
const SPACE_WAIT: Duration = Duration::from_millis(1);

/// Run the reader until the file is closed. Consumes the thread.
pub(crate) fn run(state: &PlayerState, writer: &mut FrameWriter, path: &Path) {
    let mut file = match AudioFile::open(path) {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to open {}: {}", path.display(), e);
            state.clear_file();
            return;
        }
    };

    state.set_file_info(
        file.sample_rate(),
        file.channels() as u32,
        file.frames().unwrap_or(0),
    );
    state.set_position_frames(0);
    state.set_more(true);
    state.set_seek_state(SeekState::Seeking);
    state.set_file_open(true);

    let ratio = state.samplerate_out() as f64 / file.sample_rate() as f64;
    let mut resampler = if (ratio - 1.0).abs() < f64::EPSILON {
        None
    } else {
        match StreamResampler::new(ratio, state.src_quality()) {
            Ok(resampler) => Some(resampler),
            Err(e) => {
                error!("Failed to construct sample-rate converter: {}", e);
                state.clear_file();
                return;
            }
        }
    };

    // Keep each block's output within the ring's headroom.
    let max_read = if ratio > 1.0 {
        ((OUT_BLOCK_FRAMES as f64 / ratio) as usize).max(1)
    } else {
        OUT_BLOCK_FRAMES
    };

    let mut in_a: Vec<f32> = Vec::with_capacity(max_read);
    let mut in_b: Vec<f32> = Vec::with_capacity(max_read);

    while state.file_open() {
        if state.seek_state() == SeekState::Seeking {
            writer.reset();
            // The stream is live again; any recorded final frame is stale.
            state.clear_last_frame();
            let source_frame = (state.position_frames() as f64 / ratio) as u64;
            if let Err(e) = file.seek(source_frame) {
                warn!("Seek to frame {} failed: {}", source_frame, e);
            }
            if let Some(resampler) = resampler.as_mut() {
                resampler.reset();
            }
            state.set_seek_state(SeekState::Loading);
        }

        if state.more() || state.seek_state() == SeekState::Loading {
            in_a.clear();
            in_b.clear();
            let read = match file.read_planar(&mut in_a, &mut in_b, max_read) {
                Ok(read) => read,
                Err(e) => {
                    warn!("Read failed: {}", e);
                    0
                }
            };

            // A short read means end of file: wrap when looping, otherwise
            // flag the stream as finished.
            let mut end_of_input = false;
            if read == max_read {
                state.set_more(true);
            } else if state.looping() {
                end_of_input = true;
                if let Err(e) = file.seek(0) {
                    warn!("Loop seek failed: {}", e);
                }
                state.set_more(true);
            } else {
                end_of_input = true;
                state.set_more(false);
                debug!("Read to end of input file");
            }

            let processed;
            let (out_a, out_b): (&[f32], &[f32]) = match resampler.as_mut() {
                Some(resampler) => match resampler.process(&in_a, &in_b, end_of_input) {
                    Ok(output) => {
                        processed = output;
                        (&processed.0, &processed.1)
                    }
                    Err(e) => {
                        warn!("Sample-rate conversion failed: {}", e);
                        (&[], &[])
                    }
                },
                None => (&in_a, &in_b),
            };
            if end_of_input {
                if let Some(resampler) = resampler.as_mut() {
                    resampler.reset();
                }
            }

            // Wait for ring space, bailing out if a new seek arrives or the
            // file is being closed.
            let mut offset = 0;
            while offset < out_a.len() {
                if state.seek_state() == SeekState::Seeking || !state.file_open() {
                    break;
                }
                let pushed = writer.push(&out_a[offset..], &out_b[offset..]);
                offset += pushed;
                if pushed == 0 {
                    thread::sleep(SPACE_WAIT);
                }
            }

            if !state.more() {
                state.set_last_frame(writer.position());
            }
            if state.seek_state() == SeekState::Loading {
                state.set_seek_state(SeekState::Idle);
            }
        }

        thread::sleep(POLL_INTERVAL);
    }

    // No audio from a closed file.
    writer.reset();
    state.set_position_frames(0);
    state.clear_last_frame();
    debug!("File reader thread ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::state::SrcQuality;
    use crate::realtime::{FrameReader, FrameRing};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::thread::JoinHandle;
    use std::time::Instant;

    fn write_wav(dir: &Path, name: &str, rate: u32, frames: u32, value: impl Fn(u32) -> i16) -> PathBuf {
        let path = dir.join(name);
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for frame in 0..frames {
            writer.write_sample(value(frame)).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    fn start_reader(
        state: &Arc<PlayerState>,
        path: &Path,
        ring_frames: usize,
    ) -> (JoinHandle<FrameWriter>, FrameReader) {
        let (mut writer, reader) = FrameRing::new(ring_frames).split();
        let state = Arc::clone(state);
        let path = path.to_path_buf();
        let handle = std::thread::spawn(move || {
            run(&state, &mut writer, &path);
            writer
        });
        (handle, reader)
    }

    fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn stop_reader(state: &PlayerState, handle: JoinHandle<FrameWriter>) {
        state.set_file_open(false);
        handle.join().unwrap();
    }

    #[test]
    fn test_playback_produces_exact_frame_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "one-second.wav", 48000, 48000, |_| 1000);

        let state = Arc::new(PlayerState::new(48000, SrcQuality::default()));
        let (handle, mut reader) = start_reader(&state, &path, 96000);

        wait_until("end of file", || state.last_frame().is_some());
        assert_eq!(state.last_frame(), Some(48000));
        assert_eq!(state.seek_state(), SeekState::Idle);
        assert!((state.duration() - 1.0).abs() < 1e-6);

        let mut a = vec![0.0; 1024];
        let mut b = vec![0.0; 1024];
        let mut total = 0;
        let mut nonzero = 0;
        loop {
            let got = reader.pop(&mut a, &mut b, 1024);
            if got == 0 {
                break;
            }
            total += got;
            nonzero += a[..got].iter().filter(|s| **s != 0.0).count();
        }
        assert_eq!(total, 48000);
        assert_eq!(nonzero, 48000);

        stop_reader(&state, handle);
    }

    #[test]
    fn test_upconversion_produces_engine_rate_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "halfrate.wav", 22050, 22050, |_| 800);

        let state = Arc::new(PlayerState::new(44100, SrcQuality::Linear));
        let (handle, mut reader) = start_reader(&state, &path, 131072);

        wait_until("end of file", || state.last_frame().is_some());

        let mut a = vec![0.0; 4096];
        let mut b = vec![0.0; 4096];
        let mut total = 0;
        loop {
            let got = reader.pop(&mut a, &mut b, 4096);
            if got == 0 {
                break;
            }
            total += got;
        }
        // One second of source becomes one second at the engine rate, give
        // or take resampler edges.
        assert!(total.abs_diff(44100) < 2205, "got {} frames", total);

        stop_reader(&state, handle);
    }

    #[test]
    fn test_mid_play_seek_discards_stale_samples() {
        let dir = tempfile::tempdir().unwrap();
        // Value encodes the frame's position in 100-frame steps.
        let path = write_wav(dir.path(), "ramp.wav", 48000, 48000, |f| (f / 100) as i16);

        let state = Arc::new(PlayerState::new(48000, SrcQuality::default()));
        let (handle, mut reader) = start_reader(&state, &path, 131072);

        wait_until("initial load", || state.seek_state() == SeekState::Idle);

        // Simulate some playback before the seek.
        let mut a = vec![0.0; 4800];
        let mut b = vec![0.0; 4800];
        reader.pop(&mut a, &mut b, 4800);

        state.request_seek(0.5);
        assert_eq!(state.seek_state(), SeekState::Seeking);
        wait_until("seek to complete", || state.seek_state() == SeekState::Idle);

        let got = reader.pop(&mut a, &mut b, 100);
        assert!(got > 0);
        // Frame 24000 carries the value 240; nothing older may surface.
        assert!((a[0] - 240.0 / 32768.0).abs() < 1e-4, "sample {}", a[0]);

        stop_reader(&state, handle);
    }

    #[test]
    fn test_looping_never_reaches_end_and_is_periodic() {
        let dir = tempfile::tempdir().unwrap();
        const FILE_FRAMES: u32 = 4800;
        let path = write_wav(dir.path(), "loop.wav", 48000, FILE_FRAMES, |f| {
            (f % 997) as i16
        });

        let state = Arc::new(PlayerState::new(48000, SrcQuality::default()));
        state.set_looping(true);
        let (handle, mut reader) = start_reader(&state, &path, 65536);

        wait_until("initial load", || state.seek_state() == SeekState::Idle);

        let want = FILE_FRAMES as usize * 3;
        let mut a = Vec::new();
        let mut b = vec![0.0; 1024];
        let mut chunk = vec![0.0; 1024];
        wait_until("three file lengths", || {
            let got = reader.pop(&mut chunk, &mut b, 1024);
            a.extend_from_slice(&chunk[..got]);
            a.len() >= want
        });

        // Looping: the end-of-stream marker must never appear.
        assert_eq!(state.last_frame(), None);

        // The stream repeats with the file's period.
        let period = FILE_FRAMES as usize;
        for k in 0..period {
            assert_eq!(a[k], a[k + period], "mismatch at frame {}", k);
            assert_eq!(a[k], a[k + 2 * period], "mismatch at frame {}", k);
        }

        stop_reader(&state, handle);
    }

    #[test]
    fn test_open_failure_clears_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.wav");

        let state = Arc::new(PlayerState::new(48000, SrcQuality::default()));
        state.set_filename("missing.wav");
        let (handle, _reader) = start_reader(&state, &path, 4096);

        handle.join().unwrap();
        assert!(!state.file_open());
        assert_eq!(state.filename(), "");
        assert_eq!(state.play_state(), crate::player::state::PlayState::Stopped);
    }
}
