// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Streaming audio file player.
//!
//! Disk-to-audio pipeline: a reader thread decodes and rate-converts into a
//! lock-free ring buffer, and the audio callback drains it under MIDI
//! transport control.

pub mod decoder;
pub mod engine;
mod reader;
pub mod resampler;
pub mod state;

pub use decoder::MetaField;
pub use engine::{PlayerEngine, PlayerError};
pub use state::{PlayState, PlayerState, SeekState, SrcQuality};
