//! Recognition adapter
//!
//! Normalizes per-window engine output into absolute session time and
//! clamped confidence, regardless of provider. Silence (an empty or
//! whitespace-only result) is an empty list; an engine failure is a
//! window-scoped [`PipelineError::Recognition`] — the two are never
//! conflated.

use crate::error::PipelineError;
use crate::traits::RecognitionEngine;
use confab_audio::AudioWindow;
use confab_types::RecognitionSegment;
use std::sync::Arc;

pub struct RecognitionAdapter {
    engine: Arc<dyn RecognitionEngine>,
}

impl RecognitionAdapter {
    pub fn new(engine: Arc<dyn RecognitionEngine>) -> Self {
        Self { engine }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Recognize one window, shifting timestamps into session time.
    pub fn recognize(&self, window: &AudioWindow) -> Result<Vec<RecognitionSegment>, PipelineError> {
        let raw = self
            .engine
            .transcribe(&window.samples, window.sample_rate)
            .map_err(|source| PipelineError::Recognition {
                window: window.index,
                source,
            })?;

        let segments: Vec<RecognitionSegment> = raw
            .into_iter()
            .filter(|seg| !seg.text.trim().is_empty())
            .map(|seg| RecognitionSegment {
                start_ms: seg.start_ms + window.start_ms,
                end_ms: seg.end_ms + window.start_ms,
                text: seg.text,
                confidence: seg.confidence.clamp(0.0, 1.0),
            })
            .collect();

        tracing::debug!(
            "window {}: {} recognized {} segments",
            window.index,
            self.engine.name(),
            segments.len()
        );

        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    struct Scripted(Vec<RecognitionSegment>);

    impl RecognitionEngine for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        fn transcribe(&self, _: &[f32], _: u32) -> Result<Vec<RecognitionSegment>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl RecognitionEngine for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn transcribe(&self, _: &[f32], _: u32) -> Result<Vec<RecognitionSegment>> {
            anyhow::bail!("engine exploded")
        }
    }

    fn window(index: usize, start_ms: i64) -> AudioWindow {
        AudioWindow {
            index,
            start_ms,
            end_ms: start_ms + 10_000,
            samples: vec![0.0; 160_000],
            sample_rate: 16_000,
        }
    }

    #[test]
    fn shifts_timestamps_and_clamps_confidence() {
        let adapter = RecognitionAdapter::new(Arc::new(Scripted(vec![RecognitionSegment {
            start_ms: 500,
            end_ms: 2_000,
            text: "hello".into(),
            confidence: 1.7,
        }])));

        let out = adapter.recognize(&window(3, 30_000)).unwrap();
        assert_eq!(out[0].start_ms, 30_500);
        assert_eq!(out[0].end_ms, 32_000);
        assert_eq!(out[0].confidence, 1.0);
    }

    #[test]
    fn whitespace_only_segments_are_dropped() {
        let adapter = RecognitionAdapter::new(Arc::new(Scripted(vec![
            RecognitionSegment {
                start_ms: 0,
                end_ms: 1_000,
                text: "   ".into(),
                confidence: 0.5,
            },
            RecognitionSegment {
                start_ms: 1_000,
                end_ms: 2_000,
                text: "kept".into(),
                confidence: 0.5,
            },
        ])));

        let out = adapter.recognize(&window(0, 0)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "kept");
    }

    #[test]
    fn engine_failure_is_an_error_not_silence() {
        let adapter = RecognitionAdapter::new(Arc::new(Broken));
        match adapter.recognize(&window(7, 70_000)) {
            Err(PipelineError::Recognition { window, .. }) => assert_eq!(window, 7),
            other => panic!("expected recognition failure, got {other:?}"),
        }
    }
}
