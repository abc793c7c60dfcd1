// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Zynamix - polyphonic audio engine for JACK.
//!
//! Two cooperating subsystems behind one control API: a streaming file
//! player (disk thread → lock-free ring buffer → real-time callback) and a
//! two-tier summing mixer (channel strips with effect sends feeding
//! mixbuses with a normalise bus). Both keep the audio callback wait-free:
//! parameters travel through atomics, structure changes swap slots under a
//! short-lived lock, and meters flow back out over OSC.

pub mod config;
pub mod mixer;
pub mod osc;
pub mod player;
pub mod realtime;

pub use config::EngineConfig;
pub use mixer::{EngineMode, MixerEngine, MixerError, SendMode};
pub use player::{MetaField, PlayState, PlayerEngine, PlayerError, SrcQuality};
