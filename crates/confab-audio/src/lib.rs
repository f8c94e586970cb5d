//! Audio intake for Confab
//!
//! Provides the window chunker that slices a live stream into analysis
//! windows, plus capture, resampling, and file loading.
//!
//! # Features
//! - **Window chunking** with bounded, backpressured handoff
//! - **Microphone capture** via cpal (feature `capture`)
//! - **Resampling** via rubato
//! - **File loading** via hound (WAV) and symphonia (mp3/m4a/ogg/flac)

#[cfg(feature = "capture")]
pub mod capture;
pub mod chunker;
pub mod file_io;
pub mod level;
pub mod resampling;

#[cfg(feature = "capture")]
pub use capture::{list_input_devices, AudioCapture, InputDevice};
pub use chunker::{AudioWindow, ChunkerClosed, ChunkerConfig, WindowChunker};
pub use file_io::{load_audio_file, samples_to_wav_bytes};
pub use level::{calculate_rms, is_silent, SILENCE_RMS_THRESHOLD};
pub use resampling::{resample, resample_to_16khz};
