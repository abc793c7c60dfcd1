// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Player engine: JACK client, transport control and the MIDI surface.
//!
//! The audio callback only pops from the ring buffer, applies the master
//! level and consumes MIDI control changes; everything expensive happens on
//! the reader thread. `open` spawns one reader per file and `close` joins
//! it, recovering the ring writer for the next file.

use super::decoder::{self, MetaField};
use super::reader;
use super::state::{PlayState, PlayerState, SeekState, SrcQuality};
use crate::config::EngineConfig;
use crate::realtime::{FrameReader, FrameRing, FrameWriter};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, info, warn};

/// MIDI controller numbers understood by the player.
const CC_POSITION: u8 = 1;
const CC_VOLUME: u8 = 7;
const CC_TRANSPORT: u8 = 68;
const CC_LOOP: u8 = 69;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("JACK error: {0}")]
    Jack(#[from] jack::Error),
    #[error("failed to spawn file reader: {0}")]
    Reader(#[from] std::io::Error),
    #[error("ring buffer writer unavailable")]
    WriterUnavailable,
}

struct PlayerProcess {
    state: Arc<PlayerState>,
    reader: FrameReader,
    out_a: jack::Port<jack::AudioOut>,
    out_b: jack::Port<jack::AudioOut>,
    midi_in: jack::Port<jack::MidiIn>,
}

impl jack::ProcessHandler for PlayerProcess {
    fn process(&mut self, _: &jack::Client, ps: &jack::ProcessScope) -> jack::Control {
        {
            let out_a = self.out_a.as_mut_slice(ps);
            let out_b = self.out_b.as_mut_slice(ps);
            render(&self.state, &mut self.reader, out_a, out_b);
        }
        for event in self.midi_in.iter(ps) {
            handle_midi(&self.state, event.bytes);
        }
        jack::Control::Continue
    }
}

struct PlayerNotifications {
    state: Arc<PlayerState>,
}

impl jack::NotificationHandler for PlayerNotifications {
    fn sample_rate(&mut self, _: &jack::Client, srate: jack::Frames) -> jack::Control {
        if srate > 0 {
            debug!("Engine sample rate now {}", srate);
            self.state.set_samplerate_out(srate);
        }
        jack::Control::Continue
    }
}

/// Produce one period of output.
///
/// While a seek is pending the callback emits silence and leaves the
/// position untouched; the reader owns the ring during that window.
pub(crate) fn render(
    state: &PlayerState,
    reader: &mut FrameReader,
    out_a: &mut [f32],
    out_b: &mut [f32],
) {
    let frames = out_a.len().min(out_b.len());

    if state.play_state() == PlayState::Starting && state.seek_state() == SeekState::Idle {
        state.set_play_state(PlayState::Playing);
    }

    let mut count = 0;
    let play = state.play_state();
    if (play == PlayState::Playing || play == PlayState::Stopping)
        && state.seek_state() == SeekState::Idle
    {
        count = reader.pop(out_a, out_b, frames);
        let reached_end = state
            .last_frame()
            .is_some_and(|last| reader.position() >= last);
        if play == PlayState::Stopping || reached_end {
            state.set_play_state(PlayState::Stopped);
            state.clear_last_frame();
        }
        state.add_position_frames(count as u64);
    }

    let volume = state.volume();
    for sample in &mut out_a[..count] {
        *sample *= volume;
    }
    for sample in &mut out_b[..count] {
        *sample *= volume;
    }
    out_a[count..frames].fill(0.0);
    out_b[count..frames].fill(0.0);
}

/// Dispatch one raw MIDI message. Only control changes are interpreted.
pub(crate) fn handle_midi(state: &PlayerState, bytes: &[u8]) {
    if bytes.len() < 3 || bytes[0] & 0xF0 != 0xB0 {
        return;
    }
    let value = bytes[2];
    match bytes[1] {
        CC_POSITION => state.request_seek(value as f32 * state.duration() / 127.0),
        CC_VOLUME => state.set_volume(value as f32 / 100.0),
        CC_TRANSPORT => {
            if value > 63 {
                state.set_play_state(PlayState::Starting);
            } else if state.play_state() != PlayState::Stopped {
                state.set_play_state(PlayState::Stopping);
            }
        }
        CC_LOOP => state.set_looping(value > 63),
        _ => {}
    }
}

/// Streaming audio file player bound to its own JACK client.
pub struct PlayerEngine {
    state: Arc<PlayerState>,
    ring: Arc<FrameRing>,
    writer: Option<FrameWriter>,
    reader_thread: Option<JoinHandle<FrameWriter>>,
    _client: jack::AsyncClient<PlayerNotifications, PlayerProcess>,
}

impl PlayerEngine {
    /// Register with the audio server and activate. Fatal on host-client
    /// failure.
    pub fn new(config: &EngineConfig) -> Result<Self, PlayerError> {
        let (client, _status) =
            jack::Client::new("zynaudioplayer", jack::ClientOptions::NO_START_SERVER)?;
        let samplerate = client.sample_rate() as u32;

        let quality = SrcQuality::from_u8(config.player.src_quality).unwrap_or_default();
        let state = Arc::new(PlayerState::new(samplerate, quality));
        let ring = Arc::new(FrameRing::new(
            config.player.ring_seconds.max(1) * samplerate as usize,
        ));

        let out_a = client.register_port("output_a", jack::AudioOut::default())?;
        let out_b = client.register_port("output_b", jack::AudioOut::default())?;
        let midi_in = client.register_port("input", jack::MidiIn::default())?;

        let client = client.activate_async(
            PlayerNotifications {
                state: Arc::clone(&state),
            },
            PlayerProcess {
                state: Arc::clone(&state),
                reader: FrameReader::new(Arc::clone(&ring)),
                out_a,
                out_b,
                midi_in,
            },
        )?;

        info!("Started audio player ({} Hz)", samplerate);
        Ok(Self {
            state,
            writer: Some(FrameWriter::new(Arc::clone(&ring))),
            ring,
            reader_thread: None,
            _client: client,
        })
    }

    /// Open a file for playback, closing any current one. The reader thread
    /// reports open failures through the player state (stopped, empty
    /// filename).
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<(), PlayerError> {
        self.close();
        let writer = self.writer.take().ok_or(PlayerError::WriterUnavailable)?;

        let path = path.as_ref().to_path_buf();
        self.state.set_filename(&path.to_string_lossy());
        let state = Arc::clone(&self.state);
        let handle = thread::Builder::new()
            .name("zynaudioplayer-reader".to_string())
            .spawn(move || {
                let mut writer = writer;
                reader::run(&state, &mut writer, &path);
                writer
            });
        match handle {
            Ok(handle) => {
                self.reader_thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                // The closure (and the writer inside it) is gone.
                self.writer = Some(FrameWriter::new(Arc::clone(&self.ring)));
                self.state.clear_file();
                Err(e.into())
            }
        }
    }

    /// Stop playback, signal the reader thread to exit and join it.
    pub fn close(&mut self) {
        self.stop_playback();
        self.state.set_file_open(false);
        if let Some(handle) = self.reader_thread.take() {
            match handle.join() {
                Ok(writer) => self.writer = Some(writer),
                Err(_) => {
                    warn!("File reader thread panicked; rebuilding ring writer");
                    self.writer = Some(FrameWriter::new(Arc::clone(&self.ring)));
                }
            }
        }
        self.state.clear_file();
    }

    // --- transport ---------------------------------------------------------

    pub fn start_playback(&self) {
        self.state.set_play_state(PlayState::Starting);
    }

    pub fn stop_playback(&self) {
        if self.state.play_state() == PlayState::Stopped {
            return;
        }
        self.state.set_play_state(PlayState::Stopping);
    }

    pub fn play_state(&self) -> PlayState {
        self.state.play_state()
    }

    /// Playback position in seconds.
    pub fn position(&self) -> f32 {
        self.state.position()
    }

    /// Seek to a position in seconds.
    pub fn set_position(&self, seconds: f32) {
        self.state.request_seek(seconds);
    }

    pub fn looping(&self) -> bool {
        self.state.looping()
    }

    pub fn set_loop(&self, looping: bool) {
        self.state.set_looping(looping);
    }

    // --- levels and quality ------------------------------------------------

    pub fn volume(&self) -> f32 {
        self.state.volume()
    }

    /// Set the playback level (0..=2). Out-of-range values are ignored.
    pub fn set_volume(&self, volume: f32) {
        self.state.set_volume(volume);
    }

    pub fn src_quality(&self) -> SrcQuality {
        self.state.src_quality()
    }

    /// Select the conversion quality used the next time a file is opened.
    pub fn set_src_quality(&self, quality: SrcQuality) {
        self.state.set_src_quality(quality);
    }

    // --- file information --------------------------------------------------

    /// Duration of the open file in seconds.
    pub fn duration(&self) -> f32 {
        self.state.duration()
    }

    pub fn filename(&self) -> String {
        self.state.filename()
    }

    /// Sample rate of the open file.
    pub fn samplerate(&self) -> u32 {
        self.state.samplerate_in()
    }

    /// Channel count of the open file.
    pub fn channels(&self) -> u32 {
        self.state.channels()
    }

    /// Frame count of the open file.
    pub fn frames(&self) -> u64 {
        self.state.file_frames()
    }

    /// Duration of an arbitrary file on disk, in seconds.
    pub fn file_duration(path: impl AsRef<Path>) -> f32 {
        decoder::file_duration(path.as_ref())
    }

    /// String metadata field of an arbitrary file on disk.
    pub fn file_info(path: impl AsRef<Path>, field: MetaField) -> String {
        decoder::file_info(path.as_ref(), field)
    }
}

impl Drop for PlayerEngine {
    fn drop(&mut self) {
        self.close();
        info!("Stopped audio player");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(samplerate: u32) -> (Arc<PlayerState>, FrameWriter, FrameReader) {
        let state = Arc::new(PlayerState::new(samplerate, SrcQuality::default()));
        let ring = Arc::new(FrameRing::new(4096));
        (
            state,
            FrameWriter::new(Arc::clone(&ring)),
            FrameReader::new(ring),
        )
    }

    #[test]
    fn test_starting_promotes_to_playing_when_idle() {
        let (state, _writer, mut reader) = fixture(48000);
        state.set_play_state(PlayState::Starting);

        let mut a = [0.0; 64];
        let mut b = [0.0; 64];
        render(&state, &mut reader, &mut a, &mut b);
        assert_eq!(state.play_state(), PlayState::Playing);
    }

    #[test]
    fn test_starting_waits_for_seek() {
        let (state, _writer, mut reader) = fixture(48000);
        state.set_play_state(PlayState::Starting);
        state.set_seek_state(SeekState::Loading);

        let mut a = [0.0; 64];
        let mut b = [0.0; 64];
        render(&state, &mut reader, &mut a, &mut b);
        assert_eq!(state.play_state(), PlayState::Starting);
    }

    #[test]
    fn test_render_applies_volume_and_zero_fills() {
        let (state, mut writer, mut reader) = fixture(48000);
        writer.push(&[1.0; 32], &[0.5; 32]);
        state.set_play_state(PlayState::Playing);
        state.set_volume(0.5);

        let mut a = [9.0; 64];
        let mut b = [9.0; 64];
        render(&state, &mut reader, &mut a, &mut b);

        for frame in 0..32 {
            assert!((a[frame] - 0.5).abs() < 1e-6);
            assert!((b[frame] - 0.25).abs() < 1e-6);
        }
        for frame in 32..64 {
            assert_eq!(a[frame], 0.0);
            assert_eq!(b[frame], 0.0);
        }
        assert_eq!(state.position_frames(), 32);
    }

    #[test]
    fn test_render_during_seek_is_silent_and_holds_position() {
        let (state, mut writer, mut reader) = fixture(48000);
        writer.push(&[1.0; 64], &[1.0; 64]);
        state.set_play_state(PlayState::Playing);
        state.set_seek_state(SeekState::Seeking);
        state.set_position_frames(1000);

        let mut a = [9.0; 64];
        let mut b = [9.0; 64];
        render(&state, &mut reader, &mut a, &mut b);

        assert!(a.iter().all(|s| *s == 0.0));
        assert_eq!(state.position_frames(), 1000);
        // Nothing was popped while seeking.
        assert_eq!(reader.used(), 64);
    }

    #[test]
    fn test_stopping_stops_after_one_period() {
        let (state, mut writer, mut reader) = fixture(48000);
        writer.push(&[1.0; 128], &[1.0; 128]);
        state.set_play_state(PlayState::Stopping);

        let mut a = [0.0; 64];
        let mut b = [0.0; 64];
        render(&state, &mut reader, &mut a, &mut b);
        assert_eq!(state.play_state(), PlayState::Stopped);
    }

    #[test]
    fn test_reaching_last_frame_stops() {
        let (state, mut writer, mut reader) = fixture(48000);
        writer.push(&[1.0; 100], &[1.0; 100]);
        state.set_last_frame(100);
        state.set_play_state(PlayState::Playing);

        let mut a = [0.0; 64];
        let mut b = [0.0; 64];
        render(&state, &mut reader, &mut a, &mut b);
        assert_eq!(state.play_state(), PlayState::Playing);

        render(&state, &mut reader, &mut a, &mut b);
        assert_eq!(state.play_state(), PlayState::Stopped);
        assert_eq!(state.last_frame(), None);
        assert_eq!(state.position_frames(), 100);
    }

    #[test]
    fn test_midi_volume() {
        let (state, _writer, _reader) = fixture(48000);
        handle_midi(&state, &[0xB0, CC_VOLUME, 100]);
        assert!((state.volume() - 1.0).abs() < 1e-6);
        handle_midi(&state, &[0xB5, CC_VOLUME, 50]);
        assert!((state.volume() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_midi_transport() {
        let (state, _writer, _reader) = fixture(48000);
        handle_midi(&state, &[0xB0, CC_TRANSPORT, 127]);
        assert_eq!(state.play_state(), PlayState::Starting);

        state.set_play_state(PlayState::Playing);
        handle_midi(&state, &[0xB0, CC_TRANSPORT, 0]);
        assert_eq!(state.play_state(), PlayState::Stopping);

        // Stop while already stopped stays stopped.
        state.set_play_state(PlayState::Stopped);
        handle_midi(&state, &[0xB0, CC_TRANSPORT, 10]);
        assert_eq!(state.play_state(), PlayState::Stopped);
    }

    #[test]
    fn test_midi_loop_and_position() {
        let (state, _writer, _reader) = fixture(48000);
        state.set_file_info(48000, 2, 96000);

        handle_midi(&state, &[0xB0, CC_LOOP, 127]);
        assert!(state.looping());
        handle_midi(&state, &[0xB0, CC_LOOP, 0]);
        assert!(!state.looping());

        // CC1 positions proportionally across the 2 s duration.
        handle_midi(&state, &[0xB0, CC_POSITION, 64]);
        assert_eq!(state.seek_state(), SeekState::Seeking);
        let expected = 64.0 / 127.0 * 2.0;
        assert!((state.position() - expected).abs() < 1e-3);
    }

    #[test]
    fn test_midi_ignores_non_control_messages() {
        let (state, _writer, _reader) = fixture(48000);
        handle_midi(&state, &[0x90, 60, 127]);
        handle_midi(&state, &[0xB0, CC_VOLUME]);
        assert_eq!(state.play_state(), PlayState::Stopped);
        assert!((state.volume() - 1.0).abs() < 1e-6);
    }
}
