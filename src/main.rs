// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Zynamix daemon - runs the player and both mixer tiers against JACK.

use std::sync::mpsc;
use tracing::info;
use zynamix::{EngineConfig, EngineMode, MixerEngine, PlayerEngine};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("zynamix=info".parse()?),
        )
        .init();

    info!("Zynamix starting...");

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let player = PlayerEngine::new(&config)?;
    let channel_mixer = MixerEngine::new(EngineMode::Channel, &config)?;
    let mixbus_mixer = MixerEngine::new(EngineMode::Mixbus, &config)?;

    info!("Zynamix ready");

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })?;
    shutdown_rx.recv()?;

    info!("Shutting down...");
    drop(player);
    drop(channel_mixer);
    drop(mixbus_mixer);
    info!("Zynamix stopped");
    Ok(())
}
