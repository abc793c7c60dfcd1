// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Engine configuration.
//!
//! All settings are optional; the defaults reproduce the stock engine
//! (32-strip mixers, 8 sends, OSC on port 1370, two seconds of ring buffer).
//! Configuration is read once at startup; the host re-asserts all mutable
//! state through the control API.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Hard upper bound on mixer strips per engine.
pub const STRIP_SLOTS: usize = 64;
/// Hard upper bound on effect sends.
pub const SEND_SLOTS: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// OSC output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OscSettings {
    /// UDP port subscribers listen on.
    #[serde(default = "default_osc_port")]
    pub port: u16,
    /// Maximum number of registered clients.
    #[serde(default = "default_osc_clients")]
    pub max_clients: usize,
}

impl Default for OscSettings {
    fn default() -> Self {
        Self {
            port: default_osc_port(),
            max_clients: default_osc_clients(),
        }
    }
}

/// Mixer engine settings, shared by the channel and mixbus tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixerSettings {
    #[serde(default = "default_max_strips")]
    pub max_strips: usize,
    #[serde(default = "default_max_sends")]
    pub max_sends: usize,
    /// Scale factor applied on each peak-meter damping step.
    #[serde(default = "default_dpm_decay")]
    pub dpm_decay: f32,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            max_strips: default_max_strips(),
            max_sends: default_max_sends(),
            dpm_decay: default_dpm_decay(),
        }
    }
}

impl MixerSettings {
    /// Strip count clamped to the compiled slot table size.
    pub fn strip_limit(&self) -> usize {
        self.max_strips.clamp(1, STRIP_SLOTS)
    }

    /// Send count clamped to the compiled slot table size.
    pub fn send_limit(&self) -> usize {
        self.max_sends.min(SEND_SLOTS)
    }
}

/// File player settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSettings {
    /// Ring buffer length in seconds of audio at the engine sample rate.
    #[serde(default = "default_ring_seconds")]
    pub ring_seconds: usize,
    /// Default sample-rate conversion quality (0 best .. 4 linear).
    #[serde(default = "default_src_quality")]
    pub src_quality: u8,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            ring_seconds: default_ring_seconds(),
            src_quality: default_src_quality(),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub osc: OscSettings,
    #[serde(default)]
    pub mixer: MixerSettings,
    #[serde(default)]
    pub player: PlayerSettings,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml(&text)?;
        debug!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

fn default_osc_port() -> u16 {
    1370
}

fn default_osc_clients() -> usize {
    5
}

fn default_max_strips() -> usize {
    32
}

fn default_max_sends() -> usize {
    8
}

fn default_dpm_decay() -> f32 {
    0.9
}

fn default_ring_seconds() -> usize {
    2
}

fn default_src_quality() -> u8 {
    2
}
