//! Window chunker: slices a pushed audio stream into fixed-duration
//! analysis windows.
//!
//! The chunker accumulates frames and cuts one [`AudioWindow`] each time
//! the buffered duration reaches the configured window length. Windows
//! are handed off through a bounded channel: when the consumer falls
//! behind, `push` blocks, applying backpressure to the audio source
//! instead of dropping anything.

use std::sync::mpsc::{Receiver, SyncSender};
use std::time::Duration;

/// Chunker configuration
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Window length (must be positive)
    pub window: Duration,
    /// Sample rate of the pushed stream
    pub sample_rate: u32,
    /// Capacity of the handoff queue, in windows
    pub queue_capacity: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(10),
            sample_rate: 16_000,
            queue_capacity: 4,
        }
    }
}

/// A contiguous span of session audio, processed as one
/// recognition/diarization unit.
///
/// Produced once by the chunker, consumed once by the pipeline worker,
/// dropped afterwards.
#[derive(Debug, Clone)]
pub struct AudioWindow {
    /// Window index (0-based, sequential)
    pub index: usize,
    /// Start of the window in milliseconds of session time
    pub start_ms: i64,
    /// End of the window in milliseconds of session time
    pub end_ms: i64,
    /// Mono samples at [`AudioWindow::sample_rate`]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioWindow {
    /// Window duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// The chunker's handoff queue was closed by the consumer.
#[derive(Debug, thiserror::Error)]
#[error("window consumer is gone, audio stream closed")]
pub struct ChunkerClosed;

/// Accumulates pushed frames and emits fixed-length [`AudioWindow`]s.
pub struct WindowChunker {
    sample_rate: u32,
    window_samples: usize,
    buffer: Vec<f32>,
    /// Samples already cut into windows
    emitted_samples: i64,
    window_count: usize,
    tx: SyncSender<AudioWindow>,
}

impl WindowChunker {
    /// Create a chunker and the receiving end of its window queue.
    ///
    /// # Panics
    /// Panics if the configured window length or sample rate is zero.
    pub fn new(config: &ChunkerConfig) -> (Self, Receiver<AudioWindow>) {
        assert!(!config.window.is_zero(), "window length must be positive");
        assert!(config.sample_rate > 0, "sample rate must be positive");

        let window_samples =
            (config.window.as_secs_f64() * config.sample_rate as f64) as usize;
        let (tx, rx) = std::sync::mpsc::sync_channel(config.queue_capacity.max(1));

        let chunker = Self {
            sample_rate: config.sample_rate,
            window_samples: window_samples.max(1),
            buffer: Vec::with_capacity(window_samples),
            emitted_samples: 0,
            window_count: 0,
            tx,
        };
        (chunker, rx)
    }

    /// Push frames into the buffer, emitting windows as they fill.
    ///
    /// Blocks when the handoff queue is full.
    pub fn push(&mut self, samples: &[f32]) -> Result<(), ChunkerClosed> {
        self.buffer.extend_from_slice(samples);

        while self.buffer.len() >= self.window_samples {
            let window = self.cut(self.window_samples);
            tracing::debug!(
                "chunker: emitting window {} ({} - {} ms)",
                window.index,
                window.start_ms,
                window.end_ms
            );
            self.tx.send(window).map_err(|_| ChunkerClosed)?;
        }
        Ok(())
    }

    /// Graceful end of stream: flush any buffered remainder as one final
    /// (possibly short) window and close the queue.
    ///
    /// Short tails are processed identically to full windows downstream.
    pub fn finish(mut self) -> Result<(), ChunkerClosed> {
        if !self.buffer.is_empty() {
            let len = self.buffer.len();
            let window = self.cut(len);
            tracing::debug!(
                "chunker: flushing tail window {} ({:.2}s)",
                window.index,
                window.duration_secs()
            );
            self.tx.send(window).map_err(|_| ChunkerClosed)?;
        }
        Ok(())
    }

    /// Stream error path: discard any partially buffered audio and close
    /// the queue without flushing.
    pub fn abort(self) {
        if !self.buffer.is_empty() {
            tracing::warn!(
                "chunker: discarding {} buffered samples after stream error",
                self.buffer.len()
            );
        }
    }

    fn cut(&mut self, len: usize) -> AudioWindow {
        let samples: Vec<f32> = self.buffer.drain(..len).collect();
        let start_ms = self.emitted_samples * 1000 / self.sample_rate as i64;
        self.emitted_samples += len as i64;
        let end_ms = self.emitted_samples * 1000 / self.sample_rate as i64;

        let window = AudioWindow {
            index: self.window_count,
            start_ms,
            end_ms,
            samples,
            sample_rate: self.sample_rate,
        };
        self.window_count += 1;
        window
    }

    /// Number of windows emitted so far.
    pub fn window_count(&self) -> usize {
        self.window_count
    }

    /// Total duration pushed so far (emitted + buffered), in milliseconds.
    pub fn total_duration_ms(&self) -> i64 {
        (self.emitted_samples + self.buffer.len() as i64) * 1000 / self.sample_rate as i64
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
