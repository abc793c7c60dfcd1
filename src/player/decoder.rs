// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Sound-file decoding seam.
//!
//! Wraps symphonia behind a small sequential-read interface: open a file,
//! seek to a source frame, and pull planar stereo blocks. Mono sources are
//! widened by duplicating channel 0 onto both legs; sources with more than
//! two channels contribute their first two.

use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, StandardTagKey};
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("failed to open file: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported or corrupt file: {0}")]
    Format(#[from] SymphoniaError),
    #[error("file contains no decodable audio track")]
    NoTrack,
}

/// String metadata fields exposed through `file_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaField {
    Title,
    Copyright,
    Software,
    Artist,
    Comment,
    Date,
    Album,
    License,
    TrackNumber,
    Genre,
}

impl MetaField {
    fn matches(self, key: StandardTagKey) -> bool {
        matches!(
            (self, key),
            (MetaField::Title, StandardTagKey::TrackTitle)
                | (MetaField::Copyright, StandardTagKey::Copyright)
                | (MetaField::Software, StandardTagKey::Encoder)
                | (MetaField::Artist, StandardTagKey::Artist)
                | (MetaField::Comment, StandardTagKey::Comment)
                | (MetaField::Date, StandardTagKey::Date)
                | (MetaField::Album, StandardTagKey::Album)
                | (MetaField::License, StandardTagKey::License)
                | (MetaField::TrackNumber, StandardTagKey::TrackNumber)
                | (MetaField::Genre, StandardTagKey::Genre)
        )
    }
}

/// An open audio file positioned for sequential planar reads.
pub struct AudioFile {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    frames: Option<u64>,
    codec_name: String,
    /// Decoded frames not yet handed out, split into the two legs.
    pending_a: Vec<f32>,
    pending_b: Vec<f32>,
    sample_buf: Option<SampleBuffer<f32>>,
    eof: bool,
}

impl AudioFile {
    /// Probe and open a file, preparing its default audio track.
    pub fn open(path: &Path) -> Result<Self, DecoderError> {
        let file = File::open(path)?;
        let source = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;

        let format = probed.format;
        let track = format.default_track().ok_or(DecoderError::NoTrack)?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params.sample_rate.unwrap_or(44100);
        let channels = params.channels.map(|c| c.count()).unwrap_or(2);
        let frames = params.n_frames;
        let codec_name = format!("{:?}", params.codec);

        let decoder =
            symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;

        debug!(
            "Opened {}: {} Hz, {} channel(s), {:?} frames",
            path.display(),
            sample_rate,
            channels,
            frames
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            frames,
            codec_name,
            pending_a: Vec::new(),
            pending_b: Vec::new(),
            sample_buf: None,
            eof: false,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Total frames in the track, when the container reports it.
    pub fn frames(&self) -> Option<u64> {
        self.frames
    }

    /// Identifier of the compression format in use.
    pub fn codec_name(&self) -> &str {
        &self.codec_name
    }

    /// Seek to an absolute source frame. Pending decoded data is dropped.
    pub fn seek(&mut self, frame: u64) -> Result<(), DecoderError> {
        let seconds = frame / self.sample_rate as u64;
        let frac = (frame % self.sample_rate as u64) as f64 / self.sample_rate as f64;
        self.format.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time: Time::new(seconds, frac),
                track_id: Some(self.track_id),
            },
        )?;
        self.decoder.reset();
        self.pending_a.clear();
        self.pending_b.clear();
        self.eof = false;
        Ok(())
    }

    /// Read up to `max_frames` frames, appending them to `out_a`/`out_b`.
    ///
    /// Returns the number of frames appended; a short count means the end of
    /// the file was reached. Corrupt packets are skipped.
    pub fn read_planar(
        &mut self,
        out_a: &mut Vec<f32>,
        out_b: &mut Vec<f32>,
        max_frames: usize,
    ) -> Result<usize, DecoderError> {
        let mut produced = 0;

        while produced < max_frames {
            if self.pending_a.is_empty() {
                if self.eof || !self.decode_next_packet()? {
                    break;
                }
            }

            let take = (max_frames - produced).min(self.pending_a.len());
            out_a.extend(self.pending_a.drain(..take));
            out_b.extend(self.pending_b.drain(..take));
            produced += take;
        }

        Ok(produced)
    }

    /// Decode one packet into the pending planes. Returns false at EOF.
    fn decode_next_packet(&mut self) -> Result<bool, DecoderError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.eof = true;
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.eof = true;
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }

            let needs_alloc = self
                .sample_buf
                .as_ref()
                .map_or(true, |buf| buf.capacity() < frames * spec.channels.count());
            if needs_alloc {
                self.sample_buf = Some(SampleBuffer::new(frames as u64, spec));
            }
            let Some(buf) = self.sample_buf.as_mut() else {
                continue;
            };
            buf.copy_interleaved_ref(decoded);

            let channels = spec.channels.count().max(1);
            let samples = buf.samples();
            let leg_b = usize::from(channels > 1);
            for frame in samples.chunks_exact(channels) {
                self.pending_a.push(frame[0]);
                self.pending_b.push(frame[leg_b]);
            }
            return Ok(true);
        }
    }
}

/// Duration in seconds of a file on disk, without opening the player.
pub fn file_duration(path: &Path) -> f32 {
    match AudioFile::open(path) {
        Ok(file) => match file.frames() {
            Some(frames) => frames as f32 / file.sample_rate() as f32,
            None => 0.0,
        },
        Err(_) => 0.0,
    }
}

/// Look up a string metadata field of a file. Returns an empty string when
/// the file cannot be read or the field is absent.
pub fn file_info(path: &Path, field: MetaField) -> String {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return String::new(),
    };
    let source = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mut probed = match symphonia::default::get_probe().format(
        &hint,
        source,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    ) {
        Ok(probed) => probed,
        Err(_) => return String::new(),
    };

    let mut format = probed.format;
    if let Some(value) = tag_value(format.metadata().current(), field) {
        return value;
    }
    if let Some(metadata) = probed.metadata.get() {
        if let Some(value) = tag_value(metadata.current(), field) {
            return value;
        }
    }
    String::new()
}

fn tag_value(
    revision: Option<&symphonia::core::meta::MetadataRevision>,
    field: MetaField,
) -> Option<String> {
    let revision = revision?;
    revision
        .tags()
        .iter()
        .find(|tag| tag.std_key.is_some_and(|key| field.matches(key)))
        .map(|tag| tag.value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_wav(dir: &Path, name: &str, channels: u16, rate: u32, frames: u32) -> PathBuf {
        let path = dir.join(name);
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for frame in 0..frames {
            // Small ramp so position within the file is recoverable.
            let value = (frame % 1000) as i16;
            for channel in 0..channels {
                writer
                    .write_sample(if channel == 0 { value } else { -value })
                    .unwrap();
            }
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn test_open_reports_file_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "stereo.wav", 2, 44100, 4410);

        let file = AudioFile::open(&path).unwrap();
        assert_eq!(file.sample_rate(), 44100);
        assert_eq!(file.channels(), 2);
        assert_eq!(file.frames(), Some(4410));
        assert!(!file.codec_name().is_empty());
    }

    #[test]
    fn test_read_planar_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "stereo.wav", 2, 48000, 2000);

        let mut file = AudioFile::open(&path).unwrap();
        let mut a = Vec::new();
        let mut b = Vec::new();
        let read = file.read_planar(&mut a, &mut b, 500).unwrap();
        assert_eq!(read, 500);
        assert_eq!(a.len(), 500);

        // Channel 1 was written as the negation of channel 0.
        for (left, right) in a.iter().zip(b.iter()) {
            assert!((left + right).abs() < 1e-6);
        }
        // Frame 100 carries the ramp value 100/32768.
        assert!((a[100] - 100.0 / 32768.0).abs() < 1e-3);
    }

    #[test]
    fn test_read_planar_widens_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "mono.wav", 1, 48000, 1000);

        let mut file = AudioFile::open(&path).unwrap();
        let mut a = Vec::new();
        let mut b = Vec::new();
        file.read_planar(&mut a, &mut b, 200).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_short_read_at_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "short.wav", 1, 48000, 300);

        let mut file = AudioFile::open(&path).unwrap();
        let mut a = Vec::new();
        let mut b = Vec::new();
        let read = file.read_planar(&mut a, &mut b, 1000).unwrap();
        assert_eq!(read, 300);

        a.clear();
        b.clear();
        let read = file.read_planar(&mut a, &mut b, 1000).unwrap();
        assert_eq!(read, 0);
    }

    #[test]
    fn test_seek_repositions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "seek.wav", 1, 48000, 48000);

        let mut file = AudioFile::open(&path).unwrap();
        file.seek(24000).unwrap();
        let mut a = Vec::new();
        let mut b = Vec::new();
        file.read_planar(&mut a, &mut b, 10).unwrap();
        // 24000 % 1000 == 0: the ramp restarts at the seek target.
        assert!((a[0] - 0.0).abs() < 1e-3);
        assert!((a[5] - 5.0 / 32768.0).abs() < 1e-3);
    }

    #[test]
    fn test_seek_back_after_eof_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "loop.wav", 1, 48000, 500);

        let mut file = AudioFile::open(&path).unwrap();
        let mut a = Vec::new();
        let mut b = Vec::new();
        assert_eq!(file.read_planar(&mut a, &mut b, 1000).unwrap(), 500);

        file.seek(0).unwrap();
        a.clear();
        b.clear();
        assert_eq!(file.read_planar(&mut a, &mut b, 1000).unwrap(), 500);
    }

    #[test]
    fn test_file_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "dur.wav", 2, 22050, 22050);
        assert!((file_duration(&path) - 1.0).abs() < 1e-3);
        assert_eq!(file_duration(&dir.path().join("missing.wav")), 0.0);
    }

    #[test]
    fn test_file_info_absent_field_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "meta.wav", 1, 48000, 100);
        assert_eq!(file_info(&path, MetaField::Title), "");
        assert_eq!(file_info(&dir.path().join("missing.wav"), MetaField::Artist), "");
    }
}
