//! Whisper recognition engine using whisper-rs

use crate::traits::RecognitionEngine;
use anyhow::{Context, Result};
use confab_types::RecognitionSegment;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Instant;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Whisper emits bracketed control tokens ([_TT_xxx], [_EOT_], [_BEG_],
/// language markers) inside segment text; they must not reach the
/// transcript.
fn special_tokens_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\[_[A-Z]+_?\d*\]").unwrap())
}

fn clean_special_tokens(text: &str) -> String {
    let cleaned = special_tokens_regex().replace_all(text, "");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whisper engine configuration
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    /// Path to a ggml model file
    pub model_path: String,
    /// ISO 639-1 language code, or "auto"
    pub language: String,
    /// Hotwords injected as the initial prompt
    pub hotwords: Vec<String>,
    pub use_gpu: bool,
    pub threads: i32,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            language: "auto".to_string(),
            hotwords: Vec::new(),
            use_gpu: true,
            threads: 4,
        }
    }
}

/// Speech recognition via whisper.cpp.
pub struct WhisperEngine {
    ctx: WhisperContext,
    config: WhisperConfig,
    /// Initial prompt built from the configured hotwords
    prompt: String,
}

impl WhisperEngine {
    pub fn new(config: WhisperConfig) -> Result<Self> {
        tracing::info!("loading whisper model from {}", config.model_path);

        let mut params = WhisperContextParameters::default();
        params.use_gpu(config.use_gpu);

        let ctx = WhisperContext::new_with_params(&config.model_path, params)
            .context("failed to load whisper model")?;

        let prompt = config.hotwords.join(", ");
        Ok(Self { ctx, config, prompt })
    }

    fn create_params(&self) -> FullParams<'_, '_> {
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        if self.config.language != "auto" {
            params.set_language(Some(&self.config.language));
        }
        if !self.prompt.is_empty() {
            params.set_initial_prompt(&self.prompt);
        }

        params.set_n_threads(self.config.threads);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        params
    }
}

/// whisper.cpp operates on 16 kHz mono input.
const WHISPER_SAMPLE_RATE: u32 = 16_000;

impl RecognitionEngine for WhisperEngine {
    fn name(&self) -> &str {
        "whisper"
    }

    fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<RecognitionSegment>> {
        let start = Instant::now();

        let samples_16k;
        let input: &[f32] = if sample_rate != WHISPER_SAMPLE_RATE {
            samples_16k = confab_audio::resample(samples, sample_rate, WHISPER_SAMPLE_RATE)?;
            &samples_16k
        } else {
            samples
        };

        let mut state = self
            .ctx
            .create_state()
            .context("failed to create whisper state")?;

        state
            .full(self.create_params(), input)
            .context("whisper inference failed")?;

        let num_segments = state.full_n_segments();
        let mut segments = Vec::new();

        for i in 0..num_segments {
            let segment = match state.get_segment(i) {
                Some(seg) => seg,
                None => continue,
            };

            let text = match segment.to_str() {
                Ok(t) => t.to_string(),
                Err(_) => match segment.to_str_lossy() {
                    Ok(t) => t.to_string(),
                    Err(_) => continue,
                },
            };

            let clean_text = clean_special_tokens(text.trim());
            if clean_text.is_empty() {
                continue;
            }

            // Timestamps come back in centiseconds.
            segments.push(RecognitionSegment {
                start_ms: (segment.start_timestamp() * 10) as i64,
                end_ms: (segment.end_timestamp() * 10) as i64,
                text: clean_text,
                confidence: 1.0 - segment.no_speech_probability(),
            });
        }

        let elapsed = start.elapsed();
        let audio_duration = input.len() as f64 / WHISPER_SAMPLE_RATE as f64;
        tracing::debug!(
            "whisper: {:.1}s audio in {:.2}s, {} segments",
            audio_duration,
            elapsed.as_secs_f64(),
            segments.len()
        );

        Ok(segments)
    }
}
