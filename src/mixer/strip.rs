// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Per-strip parameter store.
//!
//! A strip's scalar parameters are individual atomics: control threads write
//! them, the audio callback reads them on the next period. Level and balance
//! are requested/current pairs. `level`/`balance` hold the value the last
//! period finished on and are latched by the callback, which ramps toward
//! the requested pair across each period.

use crate::realtime::AtomicF32;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Fader level applied to freshly reset strips.
pub const DEFAULT_LEVEL: f32 = 0.8;

/// Linear-domain sentinel for "no signal" meter state; converts to the
/// −200 dBFS floor.
pub const DPM_FLOOR: f32 = -200.0;

/// Mirror value that compares unequal to any real meter reading, forcing the
/// publisher to emit a fresh value.
pub const METER_REPUBLISH: f32 = 100.0;

/// Source tap for an effect send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SendMode {
    /// Tap after the fader (scaled by the strip gain).
    PostFader = 0,
    /// Tap before the fader.
    PreFader = 1,
}

impl SendMode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => SendMode::PreFader,
            _ => SendMode::PostFader,
        }
    }
}

/// Per-send state within a strip.
#[derive(Debug)]
struct SendSlot {
    level: AtomicF32,
    mode: AtomicU8,
}

impl SendSlot {
    fn new() -> Self {
        Self {
            level: AtomicF32::new(0.0),
            mode: AtomicU8::new(SendMode::PostFader as u8),
        }
    }
}

/// One mixer channel's parameter and meter state.
///
/// Shared between the control surface (writers), the audio callback (reader
/// plus meter writer) and the meter publisher (meter reader).
#[derive(Debug)]
pub struct Strip {
    level: AtomicF32,
    req_level: AtomicF32,
    balance: AtomicF32,
    req_balance: AtomicF32,

    mute: AtomicBool,
    solo: AtomicBool,
    mono: AtomicBool,
    ms: AtomicBool,
    phase: AtomicBool,
    normalise: AtomicBool,
    in_routed: AtomicBool,
    out_routed: AtomicBool,
    enable_dpm: AtomicBool,

    sends: Vec<SendSlot>,

    dpm_a: AtomicF32,
    dpm_b: AtomicF32,
    hold_a: AtomicF32,
    hold_b: AtomicF32,
    // Last values published over OSC.
    dpm_a_pub: AtomicF32,
    dpm_b_pub: AtomicF32,
    hold_a_pub: AtomicF32,
    hold_b_pub: AtomicF32,
}

impl Strip {
    /// Create a strip with `max_sends` send slots and default parameters.
    pub fn new(max_sends: usize) -> Self {
        Self {
            level: AtomicF32::new(0.0),
            req_level: AtomicF32::new(DEFAULT_LEVEL),
            balance: AtomicF32::new(0.0),
            req_balance: AtomicF32::new(0.0),
            mute: AtomicBool::new(false),
            solo: AtomicBool::new(false),
            mono: AtomicBool::new(false),
            ms: AtomicBool::new(false),
            phase: AtomicBool::new(false),
            normalise: AtomicBool::new(false),
            in_routed: AtomicBool::new(false),
            out_routed: AtomicBool::new(false),
            enable_dpm: AtomicBool::new(false),
            sends: (0..max_sends).map(|_| SendSlot::new()).collect(),
            dpm_a: AtomicF32::new(0.0),
            dpm_b: AtomicF32::new(0.0),
            hold_a: AtomicF32::new(0.0),
            hold_b: AtomicF32::new(0.0),
            dpm_a_pub: AtomicF32::new(METER_REPUBLISH),
            dpm_b_pub: AtomicF32::new(METER_REPUBLISH),
            hold_a_pub: AtomicF32::new(METER_REPUBLISH),
            hold_b_pub: AtomicF32::new(METER_REPUBLISH),
        }
    }

    // --- fader ------------------------------------------------------------

    pub fn level(&self) -> f32 {
        self.level.get()
    }

    /// Latch the level the current period finished on. Audio callback only.
    pub fn latch_level(&self, value: f32) {
        self.level.set(value);
    }

    pub fn req_level(&self) -> f32 {
        self.req_level.get()
    }

    pub fn set_req_level(&self, value: f32) {
        self.req_level.set(value);
    }

    pub fn balance(&self) -> f32 {
        self.balance.get()
    }

    /// Latch the balance the current period finished on. Audio callback only.
    pub fn latch_balance(&self, value: f32) {
        self.balance.set(value);
    }

    pub fn req_balance(&self) -> f32 {
        self.req_balance.get()
    }

    pub fn set_req_balance(&self, value: f32) {
        self.req_balance.set(value);
    }

    // --- flags ------------------------------------------------------------

    pub fn mute(&self) -> bool {
        self.mute.load(Ordering::Relaxed)
    }

    pub fn set_mute(&self, value: bool) {
        self.mute.store(value, Ordering::Relaxed);
    }

    pub fn solo(&self) -> bool {
        self.solo.load(Ordering::Relaxed)
    }

    pub fn set_solo(&self, value: bool) {
        self.solo.store(value, Ordering::Relaxed);
    }

    pub fn mono(&self) -> bool {
        self.mono.load(Ordering::Relaxed)
    }

    pub fn set_mono(&self, value: bool) {
        self.mono.store(value, Ordering::Relaxed);
    }

    pub fn ms(&self) -> bool {
        self.ms.load(Ordering::Relaxed)
    }

    pub fn set_ms(&self, value: bool) {
        self.ms.store(value, Ordering::Relaxed);
    }

    pub fn phase(&self) -> bool {
        self.phase.load(Ordering::Relaxed)
    }

    pub fn set_phase(&self, value: bool) {
        self.phase.store(value, Ordering::Relaxed);
    }

    pub fn normalise(&self) -> bool {
        self.normalise.load(Ordering::Relaxed)
    }

    pub fn set_normalise(&self, value: bool) {
        self.normalise.store(value, Ordering::Relaxed);
    }

    pub fn in_routed(&self) -> bool {
        self.in_routed.load(Ordering::Relaxed)
    }

    pub fn set_in_routed(&self, value: bool) {
        self.in_routed.store(value, Ordering::Relaxed);
    }

    pub fn out_routed(&self) -> bool {
        self.out_routed.load(Ordering::Relaxed)
    }

    pub fn set_out_routed(&self, value: bool) {
        self.out_routed.store(value, Ordering::Relaxed);
    }

    pub fn dpm_enabled(&self) -> bool {
        self.enable_dpm.load(Ordering::Relaxed)
    }

    pub fn set_dpm_enabled(&self, value: bool) {
        self.enable_dpm.store(value, Ordering::Relaxed);
    }

    // --- sends ------------------------------------------------------------

    pub fn send_count(&self) -> usize {
        self.sends.len()
    }

    pub fn send_level(&self, send: usize) -> f32 {
        self.sends.get(send).map_or(0.0, |s| s.level.get())
    }

    pub fn set_send_level(&self, send: usize, level: f32) {
        if let Some(slot) = self.sends.get(send) {
            slot.level.set(level);
        }
    }

    pub fn send_mode(&self, send: usize) -> SendMode {
        self.sends
            .get(send)
            .map_or(SendMode::PostFader, |s| SendMode::from_u8(s.mode.load(Ordering::Relaxed)))
    }

    pub fn set_send_mode(&self, send: usize, mode: SendMode) {
        if let Some(slot) = self.sends.get(send) {
            slot.mode.store(mode as u8, Ordering::Relaxed);
        }
    }

    // --- meters -----------------------------------------------------------

    pub fn dpm(&self, leg: usize) -> f32 {
        if leg == 0 {
            self.dpm_a.get()
        } else {
            self.dpm_b.get()
        }
    }

    pub fn hold(&self, leg: usize) -> f32 {
        if leg == 0 {
            self.hold_a.get()
        } else {
            self.hold_b.get()
        }
    }

    pub fn set_dpm(&self, a: f32, b: f32) {
        self.dpm_a.set(a);
        self.dpm_b.set(b);
    }

    pub fn set_hold(&self, a: f32, b: f32) {
        self.hold_a.set(a);
        self.hold_b.set(b);
    }

    pub fn published_dpm(&self, leg: usize) -> f32 {
        if leg == 0 {
            self.dpm_a_pub.get()
        } else {
            self.dpm_b_pub.get()
        }
    }

    pub fn set_published_dpm(&self, leg: usize, value: f32) {
        if leg == 0 {
            self.dpm_a_pub.set(value);
        } else {
            self.dpm_b_pub.set(value);
        }
    }

    pub fn published_hold(&self, leg: usize) -> f32 {
        if leg == 0 {
            self.hold_a_pub.get()
        } else {
            self.hold_b_pub.get()
        }
    }

    pub fn set_published_hold(&self, leg: usize, value: f32) {
        if leg == 0 {
            self.hold_a_pub.set(value);
        } else {
            self.hold_b_pub.set(value);
        }
    }

    /// Force the publisher to re-emit the next meter reading on both legs.
    pub fn invalidate_published_meters(&self) {
        self.dpm_a_pub.set(METER_REPUBLISH);
        self.dpm_b_pub.set(METER_REPUBLISH);
        self.hold_a_pub.set(METER_REPUBLISH);
        self.hold_b_pub.set(METER_REPUBLISH);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let strip = Strip::new(4);
        assert_eq!(strip.level(), 0.0);
        assert!((strip.req_level() - DEFAULT_LEVEL).abs() < f32::EPSILON);
        assert_eq!(strip.balance(), 0.0);
        assert!(!strip.mute());
        assert!(!strip.solo());
        assert!(!strip.dpm_enabled());
        assert_eq!(strip.send_count(), 4);
        for send in 0..4 {
            assert_eq!(strip.send_level(send), 0.0);
            assert_eq!(strip.send_mode(send), SendMode::PostFader);
        }
    }

    #[test]
    fn test_send_slot_bounds() {
        let strip = Strip::new(2);
        strip.set_send_level(7, 1.0);
        assert_eq!(strip.send_level(7), 0.0);

        strip.set_send_level(1, 0.5);
        assert!((strip.send_level(1) - 0.5).abs() < f32::EPSILON);
        strip.set_send_mode(1, SendMode::PreFader);
        assert_eq!(strip.send_mode(1), SendMode::PreFader);
    }

    #[test]
    fn test_meter_mirrors_start_invalid() {
        let strip = Strip::new(0);
        // Mirrors must differ from any real reading so the first publish fires.
        assert!((strip.published_dpm(0) - METER_REPUBLISH).abs() < f32::EPSILON);
        strip.set_published_dpm(0, 0.25);
        assert!((strip.published_dpm(0) - 0.25).abs() < f32::EPSILON);
        strip.invalidate_published_meters();
        assert!((strip.published_dpm(0) - METER_REPUBLISH).abs() < f32::EPSILON);
    }
}
