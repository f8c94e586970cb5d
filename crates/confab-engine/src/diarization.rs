//! Diarization adapter and the external subprocess diarizer
//!
//! The adapter normalizes engine spans onto the session time axis and
//! wraps failures as window-scoped errors. The pipeline degrades
//! gracefully on diarization failure: the affected window's segments
//! fall back to the Unknown speaker instead of failing the session.
//!
//! [`ExternalDiarizer`] drives a diarization binary as a subprocess
//! (one call = one process, no long-lived state to leak): raw
//! little-endian f32 samples go to its stdin, JSON segments come back
//! on its stdout.

use crate::error::PipelineError;
use crate::traits::DiarizationEngine;
use anyhow::{Context, Result};
use confab_audio::AudioWindow;
use confab_types::{DiarizationSpan, LabelScope};
use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};

// ============================================================================
// Adapter
// ============================================================================

pub struct DiarizationAdapter {
    engine: Arc<dyn DiarizationEngine>,
}

impl DiarizationAdapter {
    pub fn new(engine: Arc<dyn DiarizationEngine>) -> Self {
        Self { engine }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn label_scope(&self) -> LabelScope {
        self.engine.label_scope()
    }

    /// Diarize one window (window-local policy), shifting spans into
    /// session time.
    pub fn diarize_window(&self, window: &AudioWindow) -> Result<Vec<DiarizationSpan>, PipelineError> {
        let offset = window.start_ms as f32 / 1000.0;
        let spans = self
            .engine
            .diarize(&window.samples, window.sample_rate)
            .map_err(|source| PipelineError::Diarization {
                window: window.index,
                source,
            })?;

        Ok(spans
            .into_iter()
            .map(|s| DiarizationSpan {
                start: s.start + offset,
                end: s.end + offset,
                label: s.label,
            })
            .collect())
    }

    /// Diarize the full accumulated session audio (cumulative policy);
    /// spans come back already on the session axis.
    pub fn diarize_session(
        &self,
        session_samples: &[f32],
        sample_rate: u32,
        window_index: usize,
    ) -> Result<Vec<DiarizationSpan>, PipelineError> {
        self.engine
            .diarize(session_samples, sample_rate)
            .map_err(|source| PipelineError::Diarization {
                window: window_index,
                source,
            })
    }
}

// ============================================================================
// External subprocess diarizer
// ============================================================================

/// External diarizer configuration
#[derive(Debug, Clone)]
pub struct ExternalDiarizerConfig {
    /// Path to the diarizer binary
    pub binary_path: PathBuf,
    /// Clustering threshold (0.0-1.0)
    pub clustering_threshold: f64,
    /// Minimum segment duration in seconds
    pub min_segment_duration: f64,
    /// Whether the binary derives session-stable labels (it is fed the
    /// accumulated session audio each call) or window-local ones
    pub session_stable: bool,
}

impl Default for ExternalDiarizerConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("diarizer"),
            clustering_threshold: 0.70,
            min_segment_duration: 0.2,
            session_stable: false,
        }
    }
}

/// JSON output of the diarizer binary
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiarizerOutput {
    segments: Vec<DiarizerSegment>,
    #[serde(default)]
    num_speakers: i32,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiarizerSegment {
    speaker: i32,
    start: f64,
    end: f64,
}

/// Subprocess-based speaker diarization engine.
pub struct ExternalDiarizer {
    config: ExternalDiarizerConfig,
    last_num_speakers: Mutex<usize>,
}

impl ExternalDiarizer {
    pub fn new(config: ExternalDiarizerConfig) -> Result<Self> {
        if !config.binary_path.exists() {
            anyhow::bail!("diarizer binary not found at {:?}", config.binary_path);
        }

        tracing::info!(
            "external diarizer: {:?} (threshold={:.2}, minSeg={:.2}, stable={})",
            config.binary_path,
            config.clustering_threshold,
            config.min_segment_duration,
            config.session_stable
        );

        Ok(Self {
            config,
            last_num_speakers: Mutex::new(0),
        })
    }

    /// Number of speakers reported by the last call.
    pub fn num_speakers(&self) -> usize {
        *self.last_num_speakers.lock().unwrap()
    }

    fn run(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<DiarizationSpan>> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let start_time = std::time::Instant::now();

        let mut child = Command::new(&self.config.binary_path)
            .arg("--samples")
            .arg("--sample-rate")
            .arg(sample_rate.to_string())
            .arg("--clustering-threshold")
            .arg(format!("{:.2}", self.config.clustering_threshold))
            .arg("--min-segment-duration")
            .arg(format!("{:.2}", self.config.min_segment_duration))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed to start diarizer process")?;

        {
            let stdin = child.stdin.as_mut().context("failed to get stdin")?;
            let bytes: Vec<u8> = samples.iter().flat_map(|&s| s.to_le_bytes()).collect();
            stdin.write_all(&bytes).context("failed to write samples")?;
        }

        let output = child
            .wait_with_output()
            .context("failed to wait for diarizer")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("diarizer failed: {}", stderr);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let result: DiarizerOutput = serde_json::from_str(&stdout)
            .with_context(|| format!("failed to parse diarizer result: {}", stdout))?;

        if let Some(error) = result.error {
            anyhow::bail!("diarizer error: {}", error);
        }

        let spans: Vec<DiarizationSpan> = result
            .segments
            .iter()
            .map(|seg| DiarizationSpan {
                start: seg.start as f32,
                end: seg.end as f32,
                label: format!("spk{}", seg.speaker),
            })
            .collect();

        *self.last_num_speakers.lock().unwrap() = result.num_speakers.max(0) as usize;

        tracing::debug!(
            "external diarizer: {:.1}s audio in {:.2}s, {} spans from {} speakers",
            samples.len() as f64 / sample_rate as f64,
            start_time.elapsed().as_secs_f64(),
            spans.len(),
            result.num_speakers
        );

        Ok(spans)
    }
}

impl DiarizationEngine for ExternalDiarizer {
    fn name(&self) -> &str {
        "external"
    }

    fn label_scope(&self) -> LabelScope {
        if self.config.session_stable {
            LabelScope::SessionStable
        } else {
            LabelScope::WindowLocal
        }
    }

    fn diarize(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<DiarizationSpan>> {
        self.run(samples, sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        scope: LabelScope,
        spans: Vec<DiarizationSpan>,
    }

    impl DiarizationEngine for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        fn label_scope(&self) -> LabelScope {
            self.scope
        }
        fn diarize(&self, _: &[f32], _: u32) -> Result<Vec<DiarizationSpan>> {
            Ok(self.spans.clone())
        }
    }

    fn window(index: usize, start_ms: i64) -> AudioWindow {
        AudioWindow {
            index,
            start_ms,
            end_ms: start_ms + 8_000,
            samples: vec![0.0; 128_000],
            sample_rate: 16_000,
        }
    }

    #[test]
    fn window_local_spans_are_shifted() {
        let adapter = DiarizationAdapter::new(Arc::new(Scripted {
            scope: LabelScope::WindowLocal,
            spans: vec![DiarizationSpan {
                start: 1.0,
                end: 3.0,
                label: "SPEAKER_00".into(),
            }],
        }));

        let out = adapter.diarize_window(&window(2, 16_000)).unwrap();
        assert_eq!(out[0].start, 17.0);
        assert_eq!(out[0].end, 19.0);
        assert_eq!(out[0].label, "SPEAKER_00");
    }

    #[test]
    fn failure_carries_the_window_index() {
        struct Broken;
        impl DiarizationEngine for Broken {
            fn name(&self) -> &str {
                "broken"
            }
            fn label_scope(&self) -> LabelScope {
                LabelScope::WindowLocal
            }
            fn diarize(&self, _: &[f32], _: u32) -> Result<Vec<DiarizationSpan>> {
                anyhow::bail!("no dice")
            }
        }

        let adapter = DiarizationAdapter::new(Arc::new(Broken));
        match adapter.diarize_window(&window(5, 40_000)) {
            Err(PipelineError::Diarization { window, .. }) => assert_eq!(window, 5),
            other => panic!("expected diarization failure, got {other:?}"),
        }
    }

    #[test]
    fn missing_binary_is_rejected_up_front() {
        let config = ExternalDiarizerConfig {
            binary_path: PathBuf::from("/nonexistent/diarizer"),
            ..Default::default()
        };
        assert!(ExternalDiarizer::new(config).is_err());
    }
}
