//! Confab core engine
//!
//! Recognition and diarization adapters over swappable engines, the
//! speaker reconciler that turns volatile provider labels into durable
//! session speaker ids, and the transcript assembler.

pub mod assembler;
pub mod diarization;
pub mod energy;
pub mod error;
pub mod reconciler;
pub mod recognition;
pub mod traits;
#[cfg(feature = "whisper")]
pub mod whisper;

pub use assembler::TranscriptAssembler;
pub use diarization::{
    DiarizationAdapter, ExternalDiarizer, ExternalDiarizerConfig,
};
pub use energy::{EnergyDiarizer, EnergyDiarizerConfig};
pub use error::PipelineError;
pub use reconciler::{ReconcilerConfig, SpeakerReconciler};
pub use recognition::RecognitionAdapter;
pub use traits::{DiarizationEngine, RecognitionEngine};
#[cfg(feature = "whisper")]
pub use whisper::{WhisperConfig, WhisperEngine};
