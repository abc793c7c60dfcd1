// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Mixer engine: JACK client, port lifecycle and the control surface.
//!
//! Two locks with distinct roles: the *table* lock guards the port/strip
//! slot table and is held by the process callback for the whole period, so
//! it is only taken elsewhere for structural changes (add/remove) and host
//! callbacks. The *params* lock guards a control-plane registry of strip
//! handles and is never taken by the audio callback, so parameter setters
//! and the meter publisher stay off the real-time path entirely.

use super::meter::{convert_to_dbfs, meter_changed, MeterClock};
use super::process::{mix_period, SendLane, StripLane};
use super::strip::{SendMode, Strip, DEFAULT_LEVEL};
use super::EngineMode;
use crate::config::{EngineConfig, SEND_SLOTS, STRIP_SLOTS};
use crate::osc::OscRegistry;
use crate::realtime::AtomicF32;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Interval between meter publisher scans.
const METER_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum MixerError {
    #[error("JACK error: {0}")]
    Jack(#[from] jack::Error),
    #[error("no free strip slot")]
    StripTableFull,
    #[error("no free send slot")]
    SendTableFull,
    #[error("effect sends are only available on the channel tier")]
    SendsUnavailable,
    #[error("the main mix strip cannot be removed")]
    MainStripProtected,
    #[error("no strip at index {0}")]
    UnknownStrip(usize),
    #[error("no send at index {0}")]
    UnknownSend(usize),
    #[error("failed to spawn meter publisher: {0}")]
    Publisher(#[from] std::io::Error),
}

/// A strip slot in the real-time table: parameters plus its four ports.
struct StripEntry {
    strip: Arc<Strip>,
    in_a: jack::Port<jack::AudioIn>,
    in_b: jack::Port<jack::AudioIn>,
    out_a: jack::Port<jack::AudioOut>,
    out_b: jack::Port<jack::AudioOut>,
}

/// An effect send: master level, output ports and period accumulators.
struct SendEntry {
    level: Arc<AtomicF32>,
    out_a: jack::Port<jack::AudioOut>,
    out_b: jack::Port<jack::AudioOut>,
    acc_a: Vec<f32>,
    acc_b: Vec<f32>,
}

/// Slot table read by the process callback.
struct MixerTable {
    strips: Vec<Option<StripEntry>>,
    sends: Vec<Option<SendEntry>>,
    norm_a: Vec<f32>,
    norm_b: Vec<f32>,
    clock: MeterClock,
}

/// Control-plane registry: strip and send handles without the ports.
struct ParamTable {
    strips: Vec<Option<Arc<Strip>>>,
    sends: Vec<Option<Arc<AtomicF32>>>,
}

struct MixerShared {
    mode: EngineMode,
    osc: Arc<OscRegistry>,
    params: Mutex<ParamTable>,
    table: Mutex<MixerTable>,
    global_solo: AtomicBool,
    dpm_decay: f32,
    samplerate: AtomicUsize,
    buffersize: AtomicUsize,
    max_sends: usize,
}

impl MixerShared {
    fn strip(&self, index: usize) -> Option<Arc<Strip>> {
        self.params.lock().strips.get(index).and_then(|s| s.clone())
    }

    fn strip_snapshot(&self) -> Vec<(usize, Arc<Strip>)> {
        self.params
            .lock()
            .strips
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.clone().map(|strip| (index, strip)))
            .collect()
    }

    fn refresh_global_solo(&self) {
        let any = self
            .params
            .lock()
            .strips
            .iter()
            .flatten()
            .any(|strip| strip.solo());
        self.global_solo.store(any, Ordering::Relaxed);
    }

    /// Re-derive routing flags from each port's connection count.
    fn refresh_routing(&self) {
        let table = self.table.lock();
        for entry in table.strips.iter().flatten() {
            let in_routed = entry.in_a.connected_count().unwrap_or(0) > 0
                || entry.in_b.connected_count().unwrap_or(0) > 0;
            let out_routed = entry.out_a.connected_count().unwrap_or(0) > 0
                || entry.out_b.connected_count().unwrap_or(0) > 0;
            entry.strip.set_in_routed(in_routed);
            entry.strip.set_out_routed(out_routed);
        }
    }
}

struct MixerProcess {
    shared: Arc<MixerShared>,
}

impl jack::ProcessHandler for MixerProcess {
    fn process(&mut self, _: &jack::Client, ps: &jack::ProcessScope) -> jack::Control {
        let frames = ps.n_frames() as usize;
        let mut guard = self.shared.table.lock();
        let table = &mut *guard;

        if table.norm_a.len() < frames {
            // Scratch not sized yet (no buffer-size callback seen): silence.
            for entry in table.strips.iter_mut().flatten() {
                entry.out_a.as_mut_slice(ps).fill(0.0);
                entry.out_b.as_mut_slice(ps).fill(0.0);
            }
            for send in table.sends.iter_mut().flatten() {
                send.out_a.as_mut_slice(ps).fill(0.0);
                send.out_b.as_mut_slice(ps).fill(0.0);
            }
            return jack::Control::Continue;
        }

        let MixerTable {
            strips,
            sends,
            norm_a,
            norm_b,
            clock,
        } = table;

        let strip_count = strips.len();
        let send_count = sends.len();
        {
            let mut lanes: [Option<StripLane>; STRIP_SLOTS] = std::array::from_fn(|_| None);
            for (index, slot) in strips.iter_mut().enumerate() {
                if let Some(entry) = slot {
                    lanes[index] = Some(StripLane {
                        strip: entry.strip.as_ref(),
                        in_a: entry.in_a.as_slice(ps),
                        in_b: entry.in_b.as_slice(ps),
                        out_a: entry.out_a.as_mut_slice(ps),
                        out_b: entry.out_b.as_mut_slice(ps),
                    });
                }
            }

            let mut send_lanes: [Option<SendLane>; SEND_SLOTS] = std::array::from_fn(|_| None);
            for (index, slot) in sends.iter_mut().enumerate() {
                if let Some(send) = slot {
                    if send.acc_a.len() < frames {
                        continue;
                    }
                    send_lanes[index] = Some(SendLane {
                        master: send.level.get(),
                        acc_a: &mut send.acc_a[..frames],
                        acc_b: &mut send.acc_b[..frames],
                    });
                }
            }

            mix_period(
                self.shared.mode,
                &mut lanes[..strip_count],
                &mut send_lanes[..send_count],
                norm_a,
                norm_b,
                clock,
                self.shared.dpm_decay,
                self.shared.global_solo.load(Ordering::Relaxed),
                frames,
            );
        }

        // Hand the accumulated send buses to their output ports.
        for send in sends.iter_mut().flatten() {
            let out_a = send.out_a.as_mut_slice(ps);
            let out_b = send.out_b.as_mut_slice(ps);
            if send.acc_a.len() >= frames {
                out_a.copy_from_slice(&send.acc_a[..frames]);
                out_b.copy_from_slice(&send.acc_b[..frames]);
            } else {
                out_a.fill(0.0);
                out_b.fill(0.0);
            }
        }

        jack::Control::Continue
    }

    fn buffer_size(&mut self, _: &jack::Client, frames: jack::Frames) -> jack::Control {
        let frames = frames as usize;
        if frames == 0 {
            return jack::Control::Continue;
        }
        self.shared.buffersize.store(frames, Ordering::Relaxed);

        let mut table = self.shared.table.lock();
        table.norm_a.resize(frames, 0.0);
        table.norm_b.resize(frames, 0.0);
        for send in table.sends.iter_mut().flatten() {
            send.acc_a.resize(frames, 0.0);
            send.acc_b.resize(frames, 0.0);
        }
        let samplerate = self.shared.samplerate.load(Ordering::Relaxed);
        table
            .clock
            .configure(self.shared.dpm_decay, samplerate, frames);
        jack::Control::Continue
    }
}

struct MixerNotifications {
    shared: Arc<MixerShared>,
}

impl jack::NotificationHandler for MixerNotifications {
    fn sample_rate(&mut self, _: &jack::Client, srate: jack::Frames) -> jack::Control {
        if srate == 0 {
            return jack::Control::Continue;
        }
        self.shared.samplerate.store(srate as usize, Ordering::Relaxed);
        let buffersize = self.shared.buffersize.load(Ordering::Relaxed);
        self.shared
            .table
            .lock()
            .clock
            .configure(self.shared.dpm_decay, srate as usize, buffersize);
        jack::Control::Continue
    }

    fn ports_connected(
        &mut self,
        _: &jack::Client,
        _port_a: jack::PortId,
        _port_b: jack::PortId,
        _are_connected: bool,
    ) {
        self.shared.refresh_routing();
    }
}

/// One tier of the summing mixer, bound to its own JACK client.
///
/// All control methods are callable from any thread. Invalid indices and
/// out-of-range values are silently ignored; getters on empty slots return
/// neutral values.
pub struct MixerEngine {
    shared: Arc<MixerShared>,
    client: jack::AsyncClient<MixerNotifications, MixerProcess>,
    publisher: Option<JoinHandle<()>>,
    publisher_running: Arc<AtomicBool>,
}

impl MixerEngine {
    /// Register with the audio server, activate, and (for the mixbus tier)
    /// create the main-mix strip. Fatal on host-client failure.
    pub fn new(mode: EngineMode, config: &EngineConfig) -> Result<Self, MixerError> {
        let (client, _status) =
            jack::Client::new(mode.client_name(), jack::ClientOptions::NO_START_SERVER)?;
        let samplerate = client.sample_rate() as usize;
        let buffersize = client.buffer_size() as usize;

        let strip_limit = config.mixer.strip_limit();
        let send_limit = match mode {
            EngineMode::Channel => config.mixer.send_limit(),
            EngineMode::Mixbus => 0,
        };

        let shared = Arc::new(MixerShared {
            mode,
            osc: Arc::new(OscRegistry::new(&config.osc)),
            params: Mutex::new(ParamTable {
                strips: vec![None; strip_limit],
                sends: vec![None; send_limit],
            }),
            table: Mutex::new(MixerTable {
                strips: (0..strip_limit).map(|_| None).collect(),
                sends: (0..send_limit).map(|_| None).collect(),
                norm_a: vec![0.0; buffersize],
                norm_b: vec![0.0; buffersize],
                clock: MeterClock::new(config.mixer.dpm_decay, samplerate, buffersize),
            }),
            global_solo: AtomicBool::new(false),
            dpm_decay: config.mixer.dpm_decay,
            samplerate: AtomicUsize::new(samplerate),
            buffersize: AtomicUsize::new(buffersize),
            max_sends: send_limit,
        });

        let client = client.activate_async(
            MixerNotifications {
                shared: Arc::clone(&shared),
            },
            MixerProcess {
                shared: Arc::clone(&shared),
            },
        )?;

        let publisher_running = Arc::new(AtomicBool::new(true));
        let publisher = spawn_meter_publisher(Arc::clone(&shared), Arc::clone(&publisher_running))?;

        let engine = Self {
            shared,
            client,
            publisher: Some(publisher),
            publisher_running,
        };

        if mode == EngineMode::Mixbus {
            engine.add_strip()?;
        }

        info!("Started {} engine", mode.client_name());
        Ok(engine)
    }

    /// Which tier this engine implements.
    pub fn mode(&self) -> EngineMode {
        self.shared.mode
    }

    // --- strip lifecycle ---------------------------------------------------

    /// Register four ports, wire a new strip into the lowest free slot and
    /// return its index. Partially registered ports are unwound on failure.
    pub fn add_strip(&self) -> Result<usize, MixerError> {
        let client = self.client.as_client();
        let mut params = self.shared.params.lock();
        let index = params
            .strips
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(MixerError::StripTableFull)?;

        let in_a = client.register_port(&format!("input_{index:02}a"), jack::AudioIn::default())?;
        let in_b = match client.register_port(&format!("input_{index:02}b"), jack::AudioIn::default())
        {
            Ok(port) => port,
            Err(e) => {
                unregister(client, in_a);
                return Err(e.into());
            }
        };
        let out_a =
            match client.register_port(&format!("output_{index:02}a"), jack::AudioOut::default()) {
                Ok(port) => port,
                Err(e) => {
                    unregister(client, in_a);
                    unregister(client, in_b);
                    return Err(e.into());
                }
            };
        let out_b =
            match client.register_port(&format!("output_{index:02}b"), jack::AudioOut::default()) {
                Ok(port) => port,
                Err(e) => {
                    unregister(client, in_a);
                    unregister(client, in_b);
                    unregister(client, out_a);
                    return Err(e.into());
                }
            };

        let strip = Arc::new(Strip::new(self.shared.max_sends));
        params.strips[index] = Some(Arc::clone(&strip));
        self.shared.table.lock().strips[index] = Some(StripEntry {
            strip,
            in_a,
            in_b,
            out_a,
            out_b,
        });

        debug!("Added strip {}", index);
        Ok(index)
    }

    /// Remove a strip and unregister its ports. The mixbus main strip is
    /// protected.
    pub fn remove_strip(&self, index: usize) -> Result<(), MixerError> {
        if self.shared.mode == EngineMode::Mixbus && index == 0 {
            warn!("Cannot remove the main mix strip");
            return Err(MixerError::MainStripProtected);
        }

        let entry = {
            let mut params = self.shared.params.lock();
            if params.strips.get(index).map_or(true, |slot| slot.is_none()) {
                return Err(MixerError::UnknownStrip(index));
            }
            params.strips[index] = None;
            self.shared.table.lock().strips[index].take()
        };

        if let Some(StripEntry {
            in_a,
            in_b,
            out_a,
            out_b,
            ..
        }) = entry
        {
            let client = self.client.as_client();
            unregister(client, in_a);
            unregister(client, in_b);
            unregister(client, out_a);
            unregister(client, out_b);
        }

        self.shared.refresh_global_solo();
        debug!("Removed strip {}", index);
        Ok(())
    }

    /// Number of occupied strip slots.
    pub fn strip_count(&self) -> usize {
        self.shared
            .params
            .lock()
            .strips
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    /// Capacity of the strip table.
    pub fn max_strips(&self) -> usize {
        self.shared.params.lock().strips.len()
    }

    // --- send lifecycle ----------------------------------------------------

    /// Register an effect send output pair and return the send index.
    /// Channel tier only.
    pub fn add_send(&self) -> Result<usize, MixerError> {
        if self.shared.mode == EngineMode::Mixbus {
            warn!("Effect sends are not available on the mixbus tier");
            return Err(MixerError::SendsUnavailable);
        }

        let client = self.client.as_client();
        let mut params = self.shared.params.lock();
        let index = params
            .sends
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(MixerError::SendTableFull)?;

        let out_a = client.register_port(&format!("send_{index:02}a"), jack::AudioOut::default())?;
        let out_b = match client.register_port(&format!("send_{index:02}b"), jack::AudioOut::default())
        {
            Ok(port) => port,
            Err(e) => {
                unregister(client, out_a);
                return Err(e.into());
            }
        };

        let level = Arc::new(AtomicF32::new(1.0));
        let buffersize = self.shared.buffersize.load(Ordering::Relaxed);
        params.sends[index] = Some(Arc::clone(&level));
        self.shared.table.lock().sends[index] = Some(SendEntry {
            level,
            out_a,
            out_b,
            acc_a: vec![0.0; buffersize],
            acc_b: vec![0.0; buffersize],
        });

        debug!("Added send {}", index);
        Ok(index)
    }

    /// Remove an effect send and unregister its ports.
    pub fn remove_send(&self, index: usize) -> Result<(), MixerError> {
        let entry = {
            let mut params = self.shared.params.lock();
            if params.sends.get(index).map_or(true, |slot| slot.is_none()) {
                return Err(MixerError::UnknownSend(index));
            }
            params.sends[index] = None;
            self.shared.table.lock().sends[index].take()
        };

        if let Some(SendEntry { out_a, out_b, .. }) = entry {
            let client = self.client.as_client();
            unregister(client, out_a);
            unregister(client, out_b);
        }

        debug!("Removed send {}", index);
        Ok(())
    }

    /// Number of occupied send slots.
    pub fn send_count(&self) -> usize {
        self.shared
            .params
            .lock()
            .sends
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    /// Master level for a send bus.
    pub fn send_master(&self, send: usize) -> f32 {
        self.shared
            .params
            .lock()
            .sends
            .get(send)
            .and_then(|slot| slot.as_ref())
            .map_or(0.0, |level| level.get())
    }

    /// Set the master level for a send bus.
    pub fn set_send_master(&self, send: usize, level: f32) {
        if !(0.0..=1.0).contains(&level) {
            return;
        }
        if let Some(slot) = self
            .shared
            .params
            .lock()
            .sends
            .get(send)
            .and_then(|slot| slot.clone())
        {
            slot.set(level);
        }
    }

    // --- per-strip parameters ----------------------------------------------

    pub fn set_level(&self, index: usize, level: f32) {
        if !(0.0..=1.0).contains(&level) {
            return;
        }
        let Some(strip) = self.shared.strip(index) else {
            return;
        };
        strip.set_req_level(level);
        self.osc_float(index, "fader", level);
    }

    pub fn level(&self, index: usize) -> f32 {
        self.shared.strip(index).map_or(0.0, |s| s.req_level())
    }

    pub fn set_balance(&self, index: usize, balance: f32) {
        if balance.abs() > 1.0 {
            return;
        }
        let Some(strip) = self.shared.strip(index) else {
            return;
        };
        strip.set_req_balance(balance);
        self.osc_float(index, "balance", balance);
    }

    pub fn balance(&self, index: usize) -> f32 {
        self.shared.strip(index).map_or(0.0, |s| s.req_balance())
    }

    pub fn set_mute(&self, index: usize, mute: bool) {
        let Some(strip) = self.shared.strip(index) else {
            return;
        };
        strip.set_mute(mute);
        self.osc_int(index, "mute", mute as i32);
    }

    pub fn mute(&self, index: usize) -> bool {
        self.shared.strip(index).is_some_and(|s| s.mute())
    }

    pub fn toggle_mute(&self, index: usize) {
        let muted = self.mute(index);
        self.set_mute(index, !muted);
    }

    /// Set solo. Soloing the mixbus main strip clears every solo instead:
    /// the main output is always audible, so its solo acts as "solo off".
    pub fn set_solo(&self, index: usize, solo: bool) {
        if self.shared.mode == EngineMode::Mixbus && index == 0 && solo {
            for (other, strip) in self.shared.strip_snapshot() {
                if strip.solo() {
                    strip.set_solo(false);
                    self.osc_int(other, "solo", 0);
                }
            }
        } else {
            let Some(strip) = self.shared.strip(index) else {
                return;
            };
            strip.set_solo(solo);
            self.osc_int(index, "solo", solo as i32);
        }
        self.shared.refresh_global_solo();
    }

    pub fn solo(&self, index: usize) -> bool {
        self.shared.strip(index).is_some_and(|s| s.solo())
    }

    pub fn toggle_solo(&self, index: usize) {
        let solo = self.solo(index);
        self.set_solo(index, !solo);
    }

    /// True when any strip is soloed.
    pub fn global_solo(&self) -> bool {
        self.shared.global_solo.load(Ordering::Relaxed)
    }

    pub fn set_mono(&self, index: usize, mono: bool) {
        let Some(strip) = self.shared.strip(index) else {
            return;
        };
        strip.set_mono(mono);
        self.osc_int(index, "mono", mono as i32);
    }

    pub fn mono(&self, index: usize) -> bool {
        self.shared.strip(index).is_some_and(|s| s.mono())
    }

    pub fn toggle_mono(&self, index: usize) {
        let mono = self.mono(index);
        self.set_mono(index, !mono);
    }

    pub fn set_ms(&self, index: usize, ms: bool) {
        let Some(strip) = self.shared.strip(index) else {
            return;
        };
        strip.set_ms(ms);
        self.osc_int(index, "ms", ms as i32);
    }

    pub fn ms(&self, index: usize) -> bool {
        self.shared.strip(index).is_some_and(|s| s.ms())
    }

    pub fn toggle_ms(&self, index: usize) {
        let ms = self.ms(index);
        self.set_ms(index, !ms);
    }

    pub fn set_phase(&self, index: usize, phase: bool) {
        let Some(strip) = self.shared.strip(index) else {
            return;
        };
        strip.set_phase(phase);
        self.osc_int(index, "phase", phase as i32);
    }

    pub fn phase(&self, index: usize) -> bool {
        self.shared.strip(index).is_some_and(|s| s.phase())
    }

    pub fn toggle_phase(&self, index: usize) {
        let phase = self.phase(index);
        self.set_phase(index, !phase);
    }

    /// Enable folding a strip into the main output when its direct outputs
    /// are unrouted. Mixbus tier only; the main strip itself is excluded.
    pub fn set_normalise(&self, index: usize, normalise: bool) {
        if self.shared.mode == EngineMode::Channel {
            warn!("Normalisation is not available on the channel tier");
            return;
        }
        if index == 0 {
            return;
        }
        let Some(strip) = self.shared.strip(index) else {
            return;
        };
        strip.set_normalise(normalise);
        self.osc_int(index, "normalise", normalise as i32);
    }

    pub fn normalise(&self, index: usize) -> bool {
        if self.shared.mode == EngineMode::Channel {
            return false;
        }
        self.shared.strip(index).is_some_and(|s| s.normalise())
    }

    pub fn set_send(&self, index: usize, send: usize, level: f32) {
        if !(0.0..=1.0).contains(&level) || send >= self.shared.max_sends {
            return;
        }
        let Some(strip) = self.shared.strip(index) else {
            return;
        };
        strip.set_send_level(send, level);
        self.osc_float(index, &format!("send_{send}"), level);
    }

    pub fn send(&self, index: usize, send: usize) -> f32 {
        self.shared.strip(index).map_or(0.0, |s| s.send_level(send))
    }

    pub fn set_send_mode(&self, index: usize, send: usize, mode: SendMode) {
        if send >= self.shared.max_sends {
            return;
        }
        let Some(strip) = self.shared.strip(index) else {
            return;
        };
        strip.set_send_mode(send, mode);
        self.osc_int(index, &format!("sendmode_{send}"), mode as i32);
    }

    pub fn send_mode(&self, index: usize, send: usize) -> SendMode {
        self.shared
            .strip(index)
            .map_or(SendMode::PostFader, |s| s.send_mode(send))
    }

    /// Restore a strip's defaults: level 0.8, balance 0, mute/mono/phase/solo
    /// off, all sends at zero, post-fader.
    pub fn reset(&self, index: usize) {
        self.set_level(index, DEFAULT_LEVEL);
        self.set_balance(index, 0.0);
        self.set_mute(index, false);
        self.set_mono(index, false);
        self.set_phase(index, false);
        self.set_solo(index, false);
        for send in 0..self.shared.max_sends {
            self.set_send(index, send, 0.0);
            self.set_send_mode(index, send, SendMode::PostFader);
        }
    }

    // --- metering ----------------------------------------------------------

    /// Instantaneous peak in dBFS for one leg (0 = A, 1 = B).
    pub fn dpm(&self, index: usize, leg: usize) -> f32 {
        self.shared
            .strip(index)
            .map_or(0.0, |s| convert_to_dbfs(s.dpm(leg)))
    }

    /// Held peak in dBFS for one leg (0 = A, 1 = B).
    pub fn dpm_hold(&self, index: usize, leg: usize) -> f32 {
        self.shared
            .strip(index)
            .map_or(0.0, |s| convert_to_dbfs(s.hold(leg)))
    }

    /// Meter state for a range of strips: five values per strip
    /// (dpm A, dpm B, hold A, hold B, mono flag).
    pub fn dpm_states(&self, start: usize, end: usize) -> Vec<f32> {
        let (start, end) = if start > end { (end, start) } else { (start, end) };
        let mut values = Vec::with_capacity((end - start + 1) * 5);
        for index in start..=end {
            values.push(self.dpm(index, 0));
            values.push(self.dpm(index, 1));
            values.push(self.dpm_hold(index, 0));
            values.push(self.dpm_hold(index, 1));
            values.push(self.mono(index) as i32 as f32);
        }
        values
    }

    /// Enable or disable peak metering for a range of strips.
    pub fn enable_dpm(&self, start: usize, end: usize, enable: bool) {
        let (start, end) = if start > end { (end, start) } else { (start, end) };
        for (index, strip) in self.shared.strip_snapshot() {
            if index >= start && index <= end {
                strip.set_dpm_enabled(enable);
            }
        }
    }

    // --- OSC clients -------------------------------------------------------

    /// Register an OSC subscriber and synchronise the full strip state to
    /// it. Returns the client slot, or `None` on a bad address or a full
    /// registry.
    pub fn add_osc_client(&self, address: &str) -> Option<usize> {
        let slot = self.shared.osc.add_client(address)?;
        for (index, strip) in self.shared.strip_snapshot() {
            self.osc_float(index, "fader", strip.req_level());
            self.osc_float(index, "balance", strip.req_balance());
            self.osc_int(index, "mute", strip.mute() as i32);
            self.osc_int(index, "solo", strip.solo() as i32);
            self.osc_int(index, "mono", strip.mono() as i32);
            self.osc_int(index, "ms", strip.ms() as i32);
            self.osc_int(index, "phase", strip.phase() as i32);
            if self.shared.mode == EngineMode::Mixbus {
                self.osc_int(index, "normalise", strip.normalise() as i32);
            }
            for send in 0..self.shared.max_sends {
                self.osc_float(index, &format!("send_{send}"), strip.send_level(send));
                self.osc_int(
                    index,
                    &format!("sendmode_{send}"),
                    strip.send_mode(send) as i32,
                );
            }
            strip.invalidate_published_meters();
        }
        Some(slot)
    }

    /// Remove an OSC subscriber.
    pub fn remove_osc_client(&self, address: &str) {
        self.shared.osc.remove_client(address);
    }

    fn osc_float(&self, index: usize, param: &str, value: f32) {
        let tier = self.shared.mode.osc_tier();
        self.shared
            .osc
            .send_float(&format!("/mixer/{tier}/{index}/{param}"), value);
    }

    fn osc_int(&self, index: usize, param: &str, value: i32) {
        let tier = self.shared.mode.osc_tier();
        self.shared
            .osc
            .send_int(&format!("/mixer/{tier}/{index}/{param}"), value);
    }
}

impl Drop for MixerEngine {
    fn drop(&mut self) {
        self.publisher_running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.publisher.take() {
            let _ = handle.join();
        }
        // Fade the main output before the client deactivates.
        self.set_level(0, 0.0);
        thread::sleep(Duration::from_millis(100));
        info!("Stopped {} engine", self.shared.mode.client_name());
    }
}

fn unregister<PS: jack::PortSpec>(client: &jack::Client, port: jack::Port<PS>) {
    if let Err(e) = client.unregister_port(port) {
        warn!("Failed to unregister port: {}", e);
    }
}

/// Low-priority thread publishing changed meter values every 10 ms.
fn spawn_meter_publisher(
    shared: Arc<MixerShared>,
    running: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("{}-meters", shared.mode.client_name()))
        .spawn(move || {
            debug!("Meter publisher started");
            while running.load(Ordering::Relaxed) {
                if shared.osc.has_clients() {
                    let tier = shared.mode.osc_tier();
                    for (index, strip) in shared.strip_snapshot() {
                        for (leg, dpm_param, hold_param) in
                            [(0, "dpma", "holda"), (1, "dpmb", "holdb")]
                        {
                            let dpm = strip.dpm(leg);
                            if meter_changed(strip.published_dpm(leg), dpm) {
                                shared.osc.send_float(
                                    &format!("/mixer/{tier}/{index}/{dpm_param}"),
                                    convert_to_dbfs(dpm),
                                );
                                strip.set_published_dpm(leg, dpm);
                            }
                            let hold = strip.hold(leg);
                            if meter_changed(strip.published_hold(leg), hold) {
                                shared.osc.send_float(
                                    &format!("/mixer/{tier}/{index}/{hold_param}"),
                                    convert_to_dbfs(hold),
                                );
                                strip.set_published_hold(leg, hold);
                            }
                        }
                    }
                }
                thread::sleep(METER_INTERVAL);
            }
            debug!("Meter publisher stopped");
        })
}
