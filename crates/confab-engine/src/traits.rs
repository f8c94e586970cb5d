//! Engine traits
//!
//! The pipeline is written against these two contracts; concrete
//! engines (whisper-rs, an external diarizer binary, the offline
//! energy heuristic) are swappable behind them.

use anyhow::Result;
use confab_types::{DiarizationSpan, LabelScope, RecognitionSegment};

/// A speech-recognition engine.
///
/// Returns segments with **buffer-relative** millisecond timestamps and
/// confidence already normalized to `[0.0, 1.0]` (engines reporting a
/// no-speech probability invert it). Silence is an empty list, never an
/// error; an error means the engine could not be asked.
pub trait RecognitionEngine: Send + Sync {
    /// Engine name
    fn name(&self) -> &str;

    /// Transcribe a mono audio buffer.
    fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<RecognitionSegment>>;
}

/// A speaker-diarization engine.
///
/// Returns speaker-activity spans with **buffer-relative** second
/// timestamps. Labels are opaque provider strings; [`label_scope`]
/// declares whether they survive across calls.
///
/// [`label_scope`]: DiarizationEngine::label_scope
pub trait DiarizationEngine: Send + Sync {
    /// Engine name
    fn name(&self) -> &str;

    /// Whether labels are stable across calls for one session.
    fn label_scope(&self) -> LabelScope;

    /// Diarize a mono audio buffer.
    fn diarize(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<DiarizationSpan>>;
}
