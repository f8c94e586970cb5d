//! Audio resampling using rubato

use anyhow::{Context, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

/// Input block size fed to the sinc resampler per iteration.
const RESAMPLE_BLOCK: usize = 4096;

/// Resample a mono buffer from `source_rate` to `target_rate`.
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    if source_rate == target_rate {
        return Ok(samples.to_vec());
    }
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        target_rate as f64 / source_rate as f64,
        2.0,
        params,
        RESAMPLE_BLOCK,
        1, // mono
    )
    .context("failed to create resampler")?;

    let mut output = Vec::with_capacity(
        (samples.len() as f64 * target_rate as f64 / source_rate as f64) as usize + 1,
    );

    let mut chunks = samples.chunks_exact(RESAMPLE_BLOCK);
    for chunk in &mut chunks {
        let out = resampler
            .process(&[chunk.to_vec()], None)
            .context("resampler block failed")?;
        output.extend_from_slice(&out[0]);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let out = resampler
            .process_partial(Some(&[tail.to_vec()]), None)
            .context("resampler tail failed")?;
        output.extend_from_slice(&out[0]);
    }

    Ok(output)
}

/// Resample to the pipeline's standard 16 kHz rate.
pub fn resample_to_16khz(samples: &[f32], source_rate: u32) -> Result<Vec<f32>> {
    resample(samples, source_rate, 16_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_rate_is_identity() {
        let samples = vec![0.1f32, 0.2, 0.3];
        let out = resample(&samples, 16_000, 16_000).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn downsample_halves_length_approximately() {
        let samples: Vec<f32> = (0..32_000)
            .map(|i| (i as f32 * 0.05).sin() * 0.5)
            .collect();
        let out = resample(&samples, 32_000, 16_000).unwrap();
        let expected = samples.len() / 2;
        let tolerance = expected / 10;
        assert!(
            out.len().abs_diff(expected) <= tolerance,
            "expected ~{} samples, got {}",
            expected,
            out.len()
        );
    }
}
