// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Shared player state.
//!
//! Every field is an individual atomic (or a briefly-locked string), shared
//! between the control surface, the file reader thread and the audio
//! callback. The play and seek state machines are small tagged enums stored
//! as bytes.

use crate::realtime::AtomicF32;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

/// Marker value meaning "no final frame recorded".
const NO_LAST_FRAME: u64 = u64::MAX;

/// Transport state of the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlayState {
    Stopped = 0,
    Starting = 1,
    Playing = 2,
    Stopping = 3,
}

impl PlayState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PlayState::Starting,
            2 => PlayState::Playing,
            3 => PlayState::Stopping,
            _ => PlayState::Stopped,
        }
    }
}

/// Seek state of the reader/callback handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SeekState {
    /// Not seeking.
    Idle = 0,
    /// A seek was requested; the reader must drain and reposition.
    Seeking = 1,
    /// Seek done, the reader is refilling the ring buffer.
    Loading = 2,
}

impl SeekState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SeekState::Seeking,
            2 => SeekState::Loading,
            _ => SeekState::Idle,
        }
    }
}

/// Sample-rate conversion quality, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SrcQuality {
    SincBest = 0,
    SincMedium = 1,
    #[default]
    SincFastest = 2,
    ZeroOrderHold = 3,
    Linear = 4,
}

impl SrcQuality {
    /// Parse a quality index; out-of-range values are rejected.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(SrcQuality::SincBest),
            1 => Some(SrcQuality::SincMedium),
            2 => Some(SrcQuality::SincFastest),
            3 => Some(SrcQuality::ZeroOrderHold),
            4 => Some(SrcQuality::Linear),
            _ => None,
        }
    }
}

/// All mutable player state shared across threads.
#[derive(Debug)]
pub struct PlayerState {
    play_state: AtomicU8,
    seek_state: AtomicU8,
    looping: AtomicBool,
    /// True while the file still has unread data (or is looping).
    more: AtomicBool,
    /// Cleared by the control side to ask the reader thread to exit.
    file_open: AtomicBool,
    /// Playback position in output frames at the engine sample rate.
    position_frames: AtomicU64,
    /// Ring-buffer write position of the final sample, when known.
    last_frame: AtomicU64,
    volume: AtomicF32,
    src_quality: AtomicU8,
    samplerate_out: AtomicU32,
    samplerate_in: AtomicU32,
    channels: AtomicU32,
    file_frames: AtomicU64,
    filename: Mutex<String>,
}

impl PlayerState {
    pub fn new(samplerate_out: u32, src_quality: SrcQuality) -> Self {
        Self {
            play_state: AtomicU8::new(PlayState::Stopped as u8),
            seek_state: AtomicU8::new(SeekState::Idle as u8),
            looping: AtomicBool::new(false),
            more: AtomicBool::new(false),
            file_open: AtomicBool::new(false),
            position_frames: AtomicU64::new(0),
            last_frame: AtomicU64::new(NO_LAST_FRAME),
            volume: AtomicF32::new(1.0),
            src_quality: AtomicU8::new(src_quality as u8),
            samplerate_out: AtomicU32::new(samplerate_out),
            samplerate_in: AtomicU32::new(0),
            channels: AtomicU32::new(0),
            file_frames: AtomicU64::new(0),
            filename: Mutex::new(String::new()),
        }
    }

    // --- transport ---------------------------------------------------------

    pub fn play_state(&self) -> PlayState {
        PlayState::from_u8(self.play_state.load(Ordering::Acquire))
    }

    pub fn set_play_state(&self, state: PlayState) {
        self.play_state.store(state as u8, Ordering::Release);
    }

    pub fn seek_state(&self) -> SeekState {
        SeekState::from_u8(self.seek_state.load(Ordering::Acquire))
    }

    pub fn set_seek_state(&self, state: SeekState) {
        self.seek_state.store(state as u8, Ordering::Release);
    }

    pub fn looping(&self) -> bool {
        self.looping.load(Ordering::Relaxed)
    }

    /// Set the loop flag. Re-arms `more` so a reader parked at end-of-file
    /// resumes producing.
    pub fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Relaxed);
        self.more.store(true, Ordering::Relaxed);
    }

    pub fn more(&self) -> bool {
        self.more.load(Ordering::Relaxed)
    }

    pub fn set_more(&self, more: bool) {
        self.more.store(more, Ordering::Relaxed);
    }

    pub fn file_open(&self) -> bool {
        self.file_open.load(Ordering::Acquire)
    }

    pub fn set_file_open(&self, open: bool) {
        self.file_open.store(open, Ordering::Release);
    }

    // --- position ----------------------------------------------------------

    pub fn position_frames(&self) -> u64 {
        self.position_frames.load(Ordering::Relaxed)
    }

    pub fn set_position_frames(&self, frames: u64) {
        self.position_frames.store(frames, Ordering::Relaxed);
    }

    pub fn add_position_frames(&self, frames: u64) {
        self.position_frames.fetch_add(frames, Ordering::Relaxed);
    }

    /// Playback position in seconds.
    pub fn position(&self) -> f32 {
        let rate = self.samplerate_out();
        if rate == 0 {
            return 0.0;
        }
        self.position_frames() as f32 / rate as f32
    }

    /// Request a seek to a position in seconds.
    pub fn request_seek(&self, seconds: f32) {
        let rate = self.samplerate_out();
        let frames = (seconds.max(0.0) * rate as f32) as u64;
        self.set_position_frames(frames);
        self.set_seek_state(SeekState::Seeking);
    }

    pub fn last_frame(&self) -> Option<u64> {
        match self.last_frame.load(Ordering::Acquire) {
            NO_LAST_FRAME => None,
            frame => Some(frame),
        }
    }

    pub fn set_last_frame(&self, frame: u64) {
        self.last_frame.store(frame, Ordering::Release);
    }

    pub fn clear_last_frame(&self) {
        self.last_frame.store(NO_LAST_FRAME, Ordering::Release);
    }

    // --- levels and quality ------------------------------------------------

    pub fn volume(&self) -> f32 {
        self.volume.get()
    }

    /// Set the playback level. Values outside 0..=2 are ignored.
    pub fn set_volume(&self, volume: f32) {
        if !(0.0..=2.0).contains(&volume) {
            return;
        }
        self.volume.set(volume);
    }

    pub fn src_quality(&self) -> SrcQuality {
        SrcQuality::from_u8(self.src_quality.load(Ordering::Relaxed)).unwrap_or_default()
    }

    /// Store the conversion quality used the next time a file is opened.
    pub fn set_src_quality(&self, quality: SrcQuality) {
        self.src_quality.store(quality as u8, Ordering::Relaxed);
    }

    // --- file info ---------------------------------------------------------

    pub fn samplerate_out(&self) -> u32 {
        self.samplerate_out.load(Ordering::Relaxed)
    }

    pub fn set_samplerate_out(&self, rate: u32) {
        self.samplerate_out.store(rate, Ordering::Relaxed);
    }

    pub fn samplerate_in(&self) -> u32 {
        self.samplerate_in.load(Ordering::Relaxed)
    }

    pub fn channels(&self) -> u32 {
        self.channels.load(Ordering::Relaxed)
    }

    pub fn file_frames(&self) -> u64 {
        self.file_frames.load(Ordering::Relaxed)
    }

    pub fn set_file_info(&self, samplerate: u32, channels: u32, frames: u64) {
        self.samplerate_in.store(samplerate, Ordering::Relaxed);
        self.channels.store(channels, Ordering::Relaxed);
        self.file_frames.store(frames, Ordering::Relaxed);
    }

    /// Duration of the open file in seconds.
    pub fn duration(&self) -> f32 {
        let rate = self.samplerate_in();
        if rate == 0 {
            return 0.0;
        }
        self.file_frames() as f32 / rate as f32
    }

    pub fn filename(&self) -> String {
        self.filename.lock().clone()
    }

    pub fn set_filename(&self, name: &str) {
        *self.filename.lock() = name.to_string();
    }

    /// Reset everything tied to the open file. Called when the reader exits.
    pub fn clear_file(&self) {
        self.set_play_state(PlayState::Stopped);
        self.set_seek_state(SeekState::Idle);
        self.set_file_open(false);
        self.set_more(false);
        self.set_position_frames(0);
        self.clear_last_frame();
        self.set_file_info(0, 0, 0);
        self.set_filename("");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = PlayerState::new(48000, SrcQuality::SincFastest);
        assert_eq!(state.play_state(), PlayState::Stopped);
        assert_eq!(state.seek_state(), SeekState::Idle);
        assert!(!state.looping());
        assert_eq!(state.last_frame(), None);
        assert_eq!(state.volume(), 1.0);
        assert_eq!(state.duration(), 0.0);
    }

    #[test]
    fn test_volume_bounds() {
        let state = PlayerState::new(48000, SrcQuality::default());
        state.set_volume(1.5);
        assert!((state.volume() - 1.5).abs() < f32::EPSILON);
        state.set_volume(2.5);
        assert!((state.volume() - 1.5).abs() < f32::EPSILON);
        state.set_volume(-0.1);
        assert!((state.volume() - 1.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_request_seek_converts_to_frames() {
        let state = PlayerState::new(48000, SrcQuality::default());
        state.request_seek(0.5);
        assert_eq!(state.position_frames(), 24000);
        assert_eq!(state.seek_state(), SeekState::Seeking);
        assert!((state.position() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_duration_from_file_info() {
        let state = PlayerState::new(48000, SrcQuality::default());
        state.set_file_info(22050, 1, 22050);
        assert!((state.duration() - 1.0).abs() < 1e-6);
        assert_eq!(state.channels(), 1);
    }

    #[test]
    fn test_set_looping_rearms_more() {
        let state = PlayerState::new(48000, SrcQuality::default());
        state.set_more(false);
        state.set_looping(true);
        assert!(state.more());
        assert!(state.looping());
    }

    #[test]
    fn test_src_quality_parse() {
        assert_eq!(SrcQuality::from_u8(0), Some(SrcQuality::SincBest));
        assert_eq!(SrcQuality::from_u8(4), Some(SrcQuality::Linear));
        assert_eq!(SrcQuality::from_u8(5), None);
    }

    #[test]
    fn test_clear_file_resets_everything() {
        let state = PlayerState::new(48000, SrcQuality::default());
        state.set_filename("/tmp/test.wav");
        state.set_file_info(44100, 2, 44100);
        state.set_play_state(PlayState::Playing);
        state.set_last_frame(1234);

        state.clear_file();
        assert_eq!(state.play_state(), PlayState::Stopped);
        assert_eq!(state.filename(), "");
        assert_eq!(state.last_frame(), None);
        assert_eq!(state.file_frames(), 0);
    }
}
