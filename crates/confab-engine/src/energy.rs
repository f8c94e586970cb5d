//! Offline energy/pitch heuristic diarizer
//!
//! Distinguishes voices by two cheap acoustic features per 250 ms
//! frame: fundamental frequency (autocorrelation over the 80-400 Hz
//! speech band) and spectral centroid (FFT). Frames cluster against
//! per-call voice profiles with a weighted feature distance; silent
//! frames split spans.
//!
//! Accuracy is far below a real diarization model. It exists as a
//! dependency-free fallback behind the same [`DiarizationEngine`]
//! contract, with window-local labels.

use crate::traits::DiarizationEngine;
use anyhow::Result;
use confab_audio::calculate_rms;
use confab_types::{DiarizationSpan, LabelScope};
use realfft::RealFftPlanner;

/// Energy diarizer configuration
#[derive(Debug, Clone)]
pub struct EnergyDiarizerConfig {
    /// Analysis frame length in milliseconds
    pub frame_ms: u32,
    /// RMS below this is silence
    pub silence_threshold: f32,
    /// Maximum weighted feature distance to match an existing profile
    pub match_threshold: f32,
    /// Profile cap per call
    pub max_profiles: usize,
}

impl Default for EnergyDiarizerConfig {
    fn default() -> Self {
        Self {
            frame_ms: 250,
            silence_threshold: 0.01,
            match_threshold: 150.0,
            max_profiles: 10,
        }
    }
}

pub struct EnergyDiarizer {
    config: EnergyDiarizerConfig,
}

impl EnergyDiarizer {
    pub fn new(config: EnergyDiarizerConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(EnergyDiarizerConfig::default())
    }
}

impl DiarizationEngine for EnergyDiarizer {
    fn name(&self) -> &str {
        "energy"
    }

    fn label_scope(&self) -> LabelScope {
        LabelScope::WindowLocal
    }

    fn diarize(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<DiarizationSpan>> {
        let frame_len = (sample_rate as usize * self.config.frame_ms as usize) / 1000;
        if frame_len == 0 || samples.len() < frame_len {
            return Ok(Vec::new());
        }

        let frame_secs = frame_len as f32 / sample_rate as f32;
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(frame_len);

        // Per-frame profile index, None for silence.
        let mut profiles: Vec<(f32, f32)> = Vec::new();
        let mut frame_labels: Vec<Option<usize>> = Vec::new();

        for frame in samples.chunks_exact(frame_len) {
            if calculate_rms(frame) < self.config.silence_threshold {
                frame_labels.push(None);
                continue;
            }

            let pitch = fundamental_frequency(frame, sample_rate);
            let centroid = spectral_centroid(frame, sample_rate, fft.as_ref());
            frame_labels.push(Some(self.assign_profile(&mut profiles, pitch, centroid)));
        }

        tracing::debug!(
            "energy diarizer: {} frames, {} voice profiles",
            frame_labels.len(),
            profiles.len()
        );

        // Merge consecutive same-profile frames into spans.
        let mut spans: Vec<DiarizationSpan> = Vec::new();
        for (i, label) in frame_labels.iter().enumerate() {
            let profile = match label {
                Some(p) => *p,
                None => continue,
            };
            let start = i as f32 * frame_secs;
            let end = (i + 1) as f32 * frame_secs;

            match spans.last_mut() {
                Some(last) if last.label == format!("S{profile}") && last.end >= start - 1e-3 => {
                    last.end = end;
                }
                _ => spans.push(DiarizationSpan {
                    start,
                    end,
                    label: format!("S{profile}"),
                }),
            }
        }

        Ok(spans)
    }
}

impl EnergyDiarizer {
    /// Match a frame's features against existing profiles, appending a
    /// new profile only while under the cap.
    fn assign_profile(&self, profiles: &mut Vec<(f32, f32)>, pitch: f32, centroid: f32) -> usize {
        let mut best: Option<(usize, f32)> = None;
        for (idx, &(p, c)) in profiles.iter().enumerate() {
            // Pitch is the more reliable cue, weight it up.
            let distance = (pitch - p).abs() * 2.0 + (centroid - c).abs() / 10.0;
            if best.map(|(_, d)| distance < d).unwrap_or(true) {
                best = Some((idx, distance));
            }
        }

        match best {
            Some((idx, distance)) if distance < self.config.match_threshold => idx,
            _ if profiles.len() < self.config.max_profiles => {
                profiles.push((pitch, centroid));
                profiles.len() - 1
            }
            Some((idx, _)) => idx,
            None => {
                profiles.push((pitch, centroid));
                0
            }
        }
    }
}

/// Autocorrelation pitch estimate over the 80-400 Hz speech band.
fn fundamental_frequency(frame: &[f32], sample_rate: u32) -> f32 {
    const DEFAULT_PITCH: f32 = 150.0;

    let min_lag = (sample_rate / 400) as usize;
    let max_lag = (sample_rate / 80) as usize;
    if max_lag >= frame.len() || min_lag == 0 {
        return DEFAULT_PITCH;
    }

    let mut best_lag = 0usize;
    let mut best_corr = f32::MIN;
    for lag in min_lag..=max_lag {
        let mut corr = 0.0f32;
        for i in 0..frame.len() - lag {
            corr += frame[i] * frame[i + lag];
        }
        if corr > best_corr {
            best_corr = corr;
            best_lag = lag;
        }
    }

    if best_lag == 0 || best_corr <= 0.0 {
        DEFAULT_PITCH
    } else {
        sample_rate as f32 / best_lag as f32
    }
}

/// Brightness of the frame: magnitude-weighted mean frequency.
fn spectral_centroid(frame: &[f32], sample_rate: u32, fft: &dyn realfft::RealToComplex<f32>) -> f32 {
    const DEFAULT_CENTROID: f32 = 1000.0;

    let mut input = frame.to_vec();
    let mut spectrum = fft.make_output_vec();
    if fft.process(&mut input, &mut spectrum).is_err() {
        return DEFAULT_CENTROID;
    }

    let bin_hz = sample_rate as f32 / frame.len() as f32;
    let mut weighted = 0.0f32;
    let mut total = 0.0f32;
    for (i, c) in spectrum.iter().enumerate() {
        let magnitude = c.norm();
        weighted += i as f32 * bin_hz * magnitude;
        total += magnitude;
    }

    if total > 0.0 {
        weighted / total
    } else {
        DEFAULT_CENTROID
    }
}
