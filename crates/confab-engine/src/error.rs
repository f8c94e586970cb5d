//! Pipeline error taxonomy
//!
//! Window-scoped failures (`Recognition`, `Diarization`) are isolated:
//! the affected window degrades (silence / Unknown speaker) and the
//! session continues. `StreamRead` is fatal to intake; everything
//! already assembled is still finalized.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The input audio stream failed; no further windows can be produced.
    #[error("audio stream read failed: {0}")]
    StreamRead(String),

    /// Recognition could not be asked for a window. The window
    /// contributes zero segments but the session continues.
    #[error("recognition failed for window {window}: {source}")]
    Recognition {
        window: usize,
        #[source]
        source: anyhow::Error,
    },

    /// Diarization could not be asked for a window. Segments from that
    /// window fall back to the Unknown speaker.
    #[error("diarization failed for window {window}: {source}")]
    Diarization {
        window: usize,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    /// Whether this error aborts the session (vs. degrading one window).
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::StreamRead(_))
    }
}
