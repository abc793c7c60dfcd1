// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Per-period mixing DSP.
//!
//! [`mix_period`] is a pure function over plain sample slices so the whole
//! signal path (ramping, phase/MS/mono, sends, the normalise bus and the
//! peak meters) can be exercised without an audio server. The engine's
//! process callback only gathers port buffers into [`StripLane`]s and calls
//! in here.

use super::meter::MeterClock;
use super::strip::{SendMode, Strip, DPM_FLOOR};
use super::EngineMode;

/// One strip's buffers for the current period.
pub(crate) struct StripLane<'a> {
    pub strip: &'a Strip,
    pub in_a: &'a [f32],
    pub in_b: &'a [f32],
    pub out_a: &'a mut [f32],
    pub out_b: &'a mut [f32],
}

/// One effect send's accumulators for the current period.
pub(crate) struct SendLane<'a> {
    pub master: f32,
    pub acc_a: &'a mut [f32],
    pub acc_b: &'a mut [f32],
}

/// Mix one period.
///
/// Strips are processed in reverse index order so that the mixbus main strip
/// (index 0) runs last and sees every normalised contribution. Level and
/// balance are ramped linearly from the latched values to the requested ones
/// across the period; mute and solo set the target to zero, which gives the
/// same click-free fade.
#[allow(clippy::too_many_arguments)]
pub(crate) fn mix_period(
    mode: EngineMode,
    lanes: &mut [Option<StripLane>],
    sends: &mut [Option<SendLane>],
    norm_a: &mut [f32],
    norm_b: &mut [f32],
    clock: &mut MeterClock,
    dpm_decay: f32,
    global_solo: bool,
    frames: usize,
) {
    match mode {
        EngineMode::Mixbus => {
            norm_a[..frames].fill(0.0);
            norm_b[..frames].fill(0.0);
        }
        EngineMode::Channel => {
            for send in sends.iter_mut().flatten() {
                send.acc_a[..frames].fill(0.0);
                send.acc_b[..frames].fill(0.0);
            }
        }
    }

    let damping_due = clock.damping_due();
    let hold_due = clock.hold_due();

    for index in (0..lanes.len()).rev() {
        let Some(lane) = lanes[index].as_mut() else {
            continue;
        };
        let strip = lane.strip;
        let main_mix = mode == EngineMode::Mixbus && index == 0;

        let out_a = &mut lane.out_a[..frames];
        let out_b = &mut lane.out_b[..frames];
        out_a.fill(0.0);
        out_b.fill(0.0);

        // The main mixbus strip always runs: it drains the normalise bus
        // even with nothing connected to its own inputs.
        if !strip.in_routed() && !main_mix {
            if strip.dpm_enabled() {
                strip.set_dpm(DPM_FLOOR, DPM_FLOOR);
                strip.set_hold(DPM_FLOOR, DPM_FLOOR);
            }
            continue;
        }

        // Gain the last period finished on.
        let level = strip.level();
        let balance = strip.balance();
        let mut cur_a = level * (1.0 - balance.max(0.0));
        let mut cur_b = level * (1.0 + balance.min(0.0));

        // Target gain for the end of this period.
        let (target_a, target_b) = if strip.mute() || (global_solo && !strip.solo() && !main_mix) {
            strip.latch_level(0.0);
            (0.0, 0.0)
        } else {
            let req_level = strip.req_level();
            let req_balance = strip.req_balance();
            strip.latch_level(req_level);
            strip.latch_balance(req_balance);
            (
                req_level * (1.0 - req_balance.max(0.0)),
                req_level * (1.0 + req_balance.min(0.0)),
            )
        };

        let delta_a = (target_a - cur_a) / frames as f32;
        let delta_b = (target_b - cur_b) / frames as f32;

        let out_routed = strip.out_routed();
        let phase = strip.phase();
        let ms = strip.ms();
        let mono = strip.mono();
        let normalise = !main_mix && strip.normalise();
        let dpm_enabled = strip.dpm_enabled();

        let mut dpm_a = strip.dpm(0);
        let mut dpm_b = strip.dpm(1);
        let mut hold_a = strip.hold(0);
        let mut hold_b = strip.hold(1);

        let in_a = &lane.in_a[..frames];
        let in_b = &lane.in_b[..frames];

        for frame in 0..frames {
            let mut sample_a = in_a[frame];
            let mut sample_b = in_b[frame];
            if main_mix {
                sample_a += norm_a[frame];
                sample_b += norm_b[frame];
            }

            if phase {
                sample_b = -sample_b;
            }

            if ms {
                let mid = sample_a + sample_b;
                sample_b = sample_a - sample_b;
                sample_a = mid;
            }

            if mono {
                sample_a = (sample_a + sample_b) / 2.0;
                sample_b = sample_a;
            }

            let mut pre_a = sample_a;
            let mut pre_b = sample_b;
            sample_a *= cur_a;
            sample_b *= cur_b;

            if sample_a.is_infinite() {
                sample_a = 1.0;
            }
            if sample_b.is_infinite() {
                sample_b = 1.0;
            }
            if pre_a.is_infinite() {
                pre_a = 1.0;
            }
            if pre_b.is_infinite() {
                pre_b = 1.0;
            }

            if out_routed {
                out_a[frame] += sample_a;
                out_b[frame] += sample_b;
            }

            match mode {
                EngineMode::Channel => {
                    for (send_index, send) in sends.iter_mut().enumerate() {
                        let Some(send) = send else { continue };
                        let gain = strip.send_level(send_index) * send.master;
                        let (tap_a, tap_b) = match strip.send_mode(send_index) {
                            SendMode::PostFader => (sample_a, sample_b),
                            SendMode::PreFader => (pre_a, pre_b),
                        };
                        send.acc_a[frame] += tap_a * gain;
                        send.acc_b[frame] += tap_b * gain;
                        if send.acc_a[frame].is_infinite() {
                            send.acc_a[frame] = 1.0;
                        }
                        if send.acc_b[frame].is_infinite() {
                            send.acc_b[frame] = 1.0;
                        }
                    }
                }
                EngineMode::Mixbus => {
                    if normalise {
                        norm_a[frame] += sample_a;
                        norm_b[frame] += sample_b;
                    }
                }
            }

            cur_a += delta_a;
            cur_b += delta_b;

            if dpm_enabled {
                let abs_a = sample_a.abs();
                if abs_a > dpm_a {
                    dpm_a = abs_a;
                }
                let abs_b = sample_b.abs();
                if abs_b > dpm_b {
                    dpm_b = abs_b;
                }
                if dpm_a > hold_a {
                    hold_a = dpm_a;
                }
                if dpm_b > hold_b {
                    hold_b = dpm_b;
                }
            }
        }

        if hold_due {
            hold_a = dpm_a;
            hold_b = dpm_b;
        }
        if damping_due {
            dpm_a *= dpm_decay;
            dpm_b *= dpm_decay;
        }
        strip.set_dpm(dpm_a, dpm_b);
        strip.set_hold(hold_a, hold_b);
    }

    clock.tick();
}
