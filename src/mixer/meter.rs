// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Peak-meter timing and dBFS conversion.

/// Floor for dBFS conversion; non-positive linear values clamp here.
pub const DBFS_FLOOR: f32 = -200.0;

/// Convert a linear amplitude to dBFS, clamped to [`DBFS_FLOOR`].
pub fn convert_to_dbfs(raw: f32) -> f32 {
    if raw <= 0.0 {
        return DBFS_FLOOR;
    }
    let value = 20.0 * raw.log10();
    value.max(DBFS_FLOOR)
}

/// Returns true when two meter readings differ at 1/100000 linear
/// resolution, i.e. the value is worth re-publishing.
pub fn meter_changed(last: f32, current: f32) -> bool {
    (last * 100_000.0) as i64 != (current * 100_000.0) as i64
}

/// Cycle counters deciding when peak damping and hold refresh apply.
///
/// The damping period is derived from the decay factor, sample rate and
/// buffer size so the visual release rate is independent of the host
/// configuration; hold refreshes every twenty damping periods.
#[derive(Debug)]
pub struct MeterClock {
    damping_period: u32,
    damping_count: u32,
    hold_count: u32,
}

impl MeterClock {
    pub fn new(decay: f32, samplerate: usize, buffersize: usize) -> Self {
        let mut clock = Self {
            damping_period: 10,
            damping_count: 0,
            hold_count: 0,
        };
        clock.configure(decay, samplerate, buffersize);
        clock
    }

    /// Recompute the damping period after a sample-rate or buffer-size
    /// change.
    pub fn configure(&mut self, decay: f32, samplerate: usize, buffersize: usize) {
        if samplerate == 0 || buffersize == 0 {
            return;
        }
        self.damping_period = (decay * samplerate as f32 / buffersize as f32 / 15.0) as u32;
    }

    /// Whether this period applies the damping decay.
    pub fn damping_due(&self) -> bool {
        self.damping_count == 0
    }

    /// Whether this period copies the peak down into the hold value.
    pub fn hold_due(&self) -> bool {
        self.hold_count == 0
    }

    /// Advance one period, refilling expired counters.
    pub fn tick(&mut self) {
        if self.damping_count == 0 {
            self.damping_count = self.damping_period;
        } else {
            self.damping_count -= 1;
        }
        if self.hold_count == 0 {
            self.hold_count = self.damping_period * 20;
        } else {
            self.hold_count -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_dbfs_reference_points() {
        assert_eq!(convert_to_dbfs(0.0), -200.0);
        assert_eq!(convert_to_dbfs(-1.0), -200.0);
        assert_relative_eq!(convert_to_dbfs(1.0), 0.0, epsilon = 1e-6);
        assert_relative_eq!(convert_to_dbfs(0.5), -6.0206, epsilon = 1e-3);
    }

    #[test]
    fn test_dbfs_monotone() {
        let mut last = convert_to_dbfs(0.001);
        for i in 2..1000 {
            let value = convert_to_dbfs(i as f32 * 0.001);
            assert!(value > last);
            last = value;
        }
    }

    #[test]
    fn test_meter_changed_threshold() {
        assert!(!meter_changed(0.5, 0.5));
        assert!(!meter_changed(0.5, 0.500_001));
        assert!(meter_changed(0.5, 0.500_2));
        assert!(meter_changed(100.0, 0.0));
    }

    #[test]
    fn test_clock_periods() {
        // 0.9 * 48000 / 1024 / 15 = 2.8 -> period 2.
        let mut clock = MeterClock::new(0.9, 48000, 1024);
        let mut damping_hits = 0;
        for _ in 0..9 {
            if clock.damping_due() {
                damping_hits += 1;
            }
            clock.tick();
        }
        assert_eq!(damping_hits, 3);
    }

    #[test]
    fn test_hold_period_is_twenty_damping_periods() {
        let mut clock = MeterClock::new(0.9, 48000, 1024);
        assert!(clock.hold_due());
        clock.tick();
        let mut gap = 0;
        while !clock.hold_due() {
            clock.tick();
            gap += 1;
        }
        assert_eq!(gap, 2 * 20);
    }

    #[test]
    fn test_configure_ignores_zero_rates() {
        let mut clock = MeterClock::new(0.9, 48000, 1024);
        clock.configure(0.9, 0, 1024);
        clock.configure(0.9, 48000, 0);
        // Still ticking with the last valid period.
        assert!(clock.damping_due());
    }
}
