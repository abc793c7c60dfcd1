// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Streaming sample-rate conversion.
//!
//! Feeds fixed-size chunks through a rubato resampler, buffering the
//! remainder between calls. The three sinc qualities map onto sinc
//! interpolation of decreasing length; the zero-order-hold and linear
//! qualities use polynomial interpolation.

use crate::player::state::SrcQuality;
use rubato::{
    FastFixedIn, PolynomialDegree, Resampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use thiserror::Error;

/// Input frames handed to the resampler per processing call.
const CHUNK_FRAMES: usize = 1024;

#[derive(Debug, Error)]
pub enum ResamplerError {
    #[error("failed to construct resampler: {0}")]
    Construction(#[from] rubato::ResamplerConstructionError),
    #[error("resampling failed: {0}")]
    Process(#[from] rubato::ResampleError),
}

enum Engine {
    Sinc(SincFixedIn<f32>),
    Fast(FastFixedIn<f32>),
}

impl Engine {
    fn process(&mut self, input: &[&[f32]; 2]) -> Result<Vec<Vec<f32>>, rubato::ResampleError> {
        match self {
            Engine::Sinc(r) => r.process(input, None),
            Engine::Fast(r) => r.process(input, None),
        }
    }

    fn process_partial(
        &mut self,
        input: Option<&[&[f32]; 2]>,
    ) -> Result<Vec<Vec<f32>>, rubato::ResampleError> {
        let input = input.map(|i| i.as_slice());
        match self {
            Engine::Sinc(r) => r.process_partial(input, None),
            Engine::Fast(r) => r.process_partial(input, None),
        }
    }

    fn reset(&mut self) {
        match self {
            Engine::Sinc(r) => r.reset(),
            Engine::Fast(r) => r.reset(),
        }
    }
}

/// Stereo streaming resampler with inter-call buffering.
pub struct StreamResampler {
    engine: Engine,
    pending_a: Vec<f32>,
    pending_b: Vec<f32>,
}

impl StreamResampler {
    /// Build a resampler for a fixed output/input rate ratio.
    pub fn new(ratio: f64, quality: SrcQuality) -> Result<Self, ResamplerError> {
        let engine = match quality {
            SrcQuality::SincBest => Engine::Sinc(SincFixedIn::new(
                ratio,
                1.0,
                sinc_parameters(256, SincInterpolationType::Cubic),
                CHUNK_FRAMES,
                2,
            )?),
            SrcQuality::SincMedium => Engine::Sinc(SincFixedIn::new(
                ratio,
                1.0,
                sinc_parameters(128, SincInterpolationType::Linear),
                CHUNK_FRAMES,
                2,
            )?),
            SrcQuality::SincFastest => Engine::Sinc(SincFixedIn::new(
                ratio,
                1.0,
                sinc_parameters(64, SincInterpolationType::Linear),
                CHUNK_FRAMES,
                2,
            )?),
            SrcQuality::ZeroOrderHold => Engine::Fast(FastFixedIn::new(
                ratio,
                1.0,
                PolynomialDegree::Nearest,
                CHUNK_FRAMES,
                2,
            )?),
            SrcQuality::Linear => Engine::Fast(FastFixedIn::new(
                ratio,
                1.0,
                PolynomialDegree::Linear,
                CHUNK_FRAMES,
                2,
            )?),
        };

        Ok(Self {
            engine,
            pending_a: Vec::new(),
            pending_b: Vec::new(),
        })
    }

    /// Convert a block. Input shorter than the chunk size is buffered; set
    /// `end_of_input` to flush the remainder and the filter tail (at end of
    /// file, or just before a loop wrap).
    pub fn process(
        &mut self,
        in_a: &[f32],
        in_b: &[f32],
        end_of_input: bool,
    ) -> Result<(Vec<f32>, Vec<f32>), ResamplerError> {
        self.pending_a.extend_from_slice(in_a);
        self.pending_b.extend_from_slice(in_b);

        let mut out_a = Vec::new();
        let mut out_b = Vec::new();

        while self.pending_a.len() >= CHUNK_FRAMES {
            let chunk_a: Vec<f32> = self.pending_a.drain(..CHUNK_FRAMES).collect();
            let chunk_b: Vec<f32> = self.pending_b.drain(..CHUNK_FRAMES).collect();
            let output = self.engine.process(&[chunk_a.as_slice(), chunk_b.as_slice()])?;
            append_output(&mut out_a, &mut out_b, output);
        }

        if end_of_input {
            if !self.pending_a.is_empty() {
                let rest_a = std::mem::take(&mut self.pending_a);
                let rest_b = std::mem::take(&mut self.pending_b);
                let output = self
                    .engine
                    .process_partial(Some(&[rest_a.as_slice(), rest_b.as_slice()]))?;
                append_output(&mut out_a, &mut out_b, output);
            }
            let tail = self.engine.process_partial(None)?;
            append_output(&mut out_a, &mut out_b, tail);
        }

        Ok((out_a, out_b))
    }

    /// Drop buffered input and internal filter state (seek transition).
    pub fn reset(&mut self) {
        self.pending_a.clear();
        self.pending_b.clear();
        self.engine.reset();
    }
}

fn sinc_parameters(
    sinc_len: usize,
    interpolation: SincInterpolationType,
) -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len,
        f_cutoff: 0.95,
        interpolation,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    }
}

fn append_output(out_a: &mut Vec<f32>, out_b: &mut Vec<f32>, mut output: Vec<Vec<f32>>) {
    if output.len() < 2 {
        return;
    }
    let b = output.pop().unwrap_or_default();
    let a = output.pop().unwrap_or_default();
    out_a.extend(a);
    out_b.extend(b);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsample_doubles_length() {
        let mut resampler = StreamResampler::new(2.0, SrcQuality::Linear).unwrap();
        let input = vec![0.5f32; 8192];
        let (out_a, out_b) = resampler.process(&input, &input, true).unwrap();

        let expected = input.len() * 2;
        assert!(out_a.len().abs_diff(expected) < expected / 10);
        assert_eq!(out_a.len(), out_b.len());
    }

    #[test]
    fn test_downsample_halves_length() {
        let mut resampler = StreamResampler::new(0.5, SrcQuality::SincFastest).unwrap();
        let input = vec![0.25f32; 8192];
        let (out_a, _) = resampler.process(&input, &input, true).unwrap();

        let expected = input.len() / 2;
        assert!(out_a.len().abs_diff(expected) < expected / 10);
    }

    #[test]
    fn test_dc_level_is_preserved() {
        let mut resampler = StreamResampler::new(2.0, SrcQuality::Linear).unwrap();
        let input = vec![0.5f32; 8192];
        let (out_a, _) = resampler.process(&input, &input, true).unwrap();

        // Ignore the filter edges; the steady-state must carry the DC value.
        let core = &out_a[out_a.len() / 4..out_a.len() * 3 / 4];
        for sample in core {
            assert!((sample - 0.5).abs() < 1e-3, "sample {} off DC", sample);
        }
    }

    #[test]
    fn test_short_input_is_buffered_until_flush() {
        let mut resampler = StreamResampler::new(2.0, SrcQuality::Linear).unwrap();
        let input = vec![0.1f32; 100];
        let (out_a, _) = resampler.process(&input, &input, false).unwrap();
        assert!(out_a.is_empty());

        let (out_a, _) = resampler.process(&[], &[], true).unwrap();
        assert!(!out_a.is_empty());
    }

    #[test]
    fn test_reset_discards_pending() {
        let mut resampler = StreamResampler::new(2.0, SrcQuality::Linear).unwrap();
        let input = vec![0.9f32; 100];
        resampler.process(&input, &input, false).unwrap();
        resampler.reset();

        let (out_a, _) = resampler.process(&[], &[], true).unwrap();
        // Nothing pending: only the (silent) filter tail comes out.
        assert!(out_a.iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn test_all_qualities_construct() {
        for quality in [
            SrcQuality::SincBest,
            SrcQuality::SincMedium,
            SrcQuality::SincFastest,
            SrcQuality::ZeroOrderHold,
            SrcQuality::Linear,
        ] {
            assert!(StreamResampler::new(44100.0 / 48000.0, quality).is_ok());
        }
    }
}

