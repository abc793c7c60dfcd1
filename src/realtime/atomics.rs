// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Atomic parameter cells for lock-free control ↔ audio communication.
//!
//! Control threads write parameters while the audio callback reads them,
//! without locking. `Relaxed` ordering is sufficient for independent
//! parameters: each field is torn-free on its own, and the per-period gain
//! ramp absorbs any interleaving of writes from different control calls.

use std::sync::atomic::{AtomicU32, Ordering};

/// Atomic f32 for lock-free parameter updates.
#[derive(Debug)]
pub struct AtomicF32 {
    bits: AtomicU32,
}

impl AtomicF32 {
    /// Create a new atomic f32 with the given initial value.
    #[inline]
    pub const fn new(value: f32) -> Self {
        Self {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    /// Get the current value.
    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Set a new value.
    #[inline]
    pub fn set(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Swap the value and return the old one.
    #[inline]
    pub fn swap(&self, value: f32) -> f32 {
        f32::from_bits(self.bits.swap(value.to_bits(), Ordering::Relaxed))
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Clone for AtomicF32 {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set() {
        let param = AtomicF32::new(1.0);
        assert!((param.get() - 1.0).abs() < 0.0001);

        param.set(0.5);
        assert!((param.get() - 0.5).abs() < 0.0001);
    }

    #[test]
    fn test_swap() {
        let param = AtomicF32::new(0.5);
        let old = param.swap(0.75);
        assert!((old - 0.5).abs() < 0.0001);
        assert!((param.get() - 0.75).abs() < 0.0001);
    }

    #[test]
    fn test_negative_and_special_values() {
        let param = AtomicF32::new(-1.0);
        assert!((param.get() + 1.0).abs() < 0.0001);

        param.set(f32::INFINITY);
        assert!(param.get().is_infinite());
    }
}
