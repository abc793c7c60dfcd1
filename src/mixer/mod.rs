// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Two-tier summing mixer.
//!
//! One engine type serves both tiers: the *channel* tier feeds effect sends,
//! the *mixbus* tier owns the main output and the normalise bus. The tier is
//! fixed at construction via [`EngineMode`].

pub mod engine;
pub mod meter;
mod process;
pub mod strip;

pub use engine::{MixerEngine, MixerError};
pub use strip::{SendMode, Strip};

/// Which mixer tier an engine instance implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// Input channels: effect sends, no normalise-to-main.
    Channel,
    /// Mixbuses: normalise-to-main, strip 0 is the main output.
    Mixbus,
}

impl EngineMode {
    /// Name this engine registers with the audio server.
    pub fn client_name(self) -> &'static str {
        match self {
            EngineMode::Channel => "zynmixer_chan",
            EngineMode::Mixbus => "zynmixer_bus",
        }
    }

    /// Tier segment used in OSC paths.
    pub(crate) fn osc_tier(self) -> &'static str {
        match self {
            EngineMode::Channel => "channel",
            EngineMode::Mixbus => "mixbus",
        }
    }
}
