//! Shared types for Confab
//!
//! This crate contains the data structures passed between the audio,
//! engine, and session crates, plus the worker IPC protocol.
//!
//! Time conventions: recognized text carries millisecond timestamps
//! (`i64`, absolute session time); diarization spans carry seconds
//! (`f32`, same time axis). The assembler converts at the attribution
//! boundary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Speaker identity
// ============================================================================

/// Durable per-session speaker identifier.
///
/// Real speakers are minted 1, 2, 3... in order of first appearance and
/// never reused. 0 is reserved for [`UNKNOWN_SPEAKER`].
pub type SpeakerId = u32;

/// Sentinel id for segments with no usable diarization data.
pub const UNKNOWN_SPEAKER: SpeakerId = 0;

/// A speaker identity minted by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakerIdentity {
    pub id: SpeakerId,
    /// Session time at which this speaker was first heard.
    pub first_seen_ms: i64,
}

/// Notification emitted when the reconciler mints a new identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakerDiscovered {
    pub id: SpeakerId,
    pub first_seen_ms: i64,
}

// ============================================================================
// Recognition & diarization
// ============================================================================

/// A recognized utterance in absolute session time.
///
/// `text` is never empty: silent windows produce zero segments, not
/// empty ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionSegment {
    /// Start time in milliseconds
    pub start_ms: i64,
    /// End time in milliseconds
    pub end_ms: i64,
    /// Recognized text
    pub text: String,
    /// Confidence score (0.0 - 1.0), 1.0 is most confident
    pub confidence: f32,
}

impl RecognitionSegment {
    /// Segment midpoint in seconds, for speaker attribution.
    pub fn midpoint_secs(&self) -> f32 {
        (self.start_ms + self.end_ms) as f32 / 2000.0
    }
}

/// A raw speaker-activity span from a diarization engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiarizationSpan {
    /// Start time in seconds
    pub start: f32,
    /// End time in seconds
    pub end: f32,
    /// Provider-local speaker label. Opaque; cross-window stability
    /// depends on the engine's [`LabelScope`].
    pub label: String,
}

impl DiarizationSpan {
    pub fn duration(&self) -> f32 {
        (self.end - self.start).max(0.0)
    }
}

/// Whether a diarization engine's labels survive across calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelScope {
    /// Labels are meaningful only within a single call.
    WindowLocal,
    /// The engine re-derives consistent labels from accumulated session
    /// audio; labels are stable for the session (not across sessions).
    SessionStable,
}

/// A diarization span after reconciliation, expressed as a durable
/// session speaker id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSpan {
    /// Start time in seconds
    pub start: f32,
    /// End time in seconds
    pub end: f32,
    /// Reconciled speaker id
    pub speaker: SpeakerId,
}

// ============================================================================
// Transcript
// ============================================================================

/// The final unit of output: one speaker-attributed utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    /// Position in the transcript (0-based, gap-free, strictly increasing)
    pub sequence: u64,
    /// Reconciled speaker, [`UNKNOWN_SPEAKER`] when diarization had
    /// nothing to say
    pub speaker: SpeakerId,
    /// Recognized text
    pub text: String,
    /// Start time in milliseconds
    pub start_ms: i64,
    /// End time in milliseconds
    pub end_ms: i64,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
}

impl TranscriptSegment {
    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }
}

/// Per-speaker aggregates, maintained incrementally by the assembler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakerStats {
    pub segment_count: u32,
    pub speaking_ms: i64,
}

/// An immutable, finalized transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    /// Segments ordered by `sequence` (and identically by `start_ms`)
    pub segments: Vec<TranscriptSegment>,
    /// Aggregates keyed by speaker id, [`UNKNOWN_SPEAKER`] included
    pub stats: BTreeMap<SpeakerId, SpeakerStats>,
    /// Unique speakers heard, excluding [`UNKNOWN_SPEAKER`]
    pub speaker_count: usize,
}

impl Transcript {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Concatenated text of all segments, in order.
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ============================================================================
// Session records (store layer)
// ============================================================================

/// A finished session as handed to the session store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    /// RFC 3339 start timestamp
    pub started_at: String,
    pub duration_ms: i64,
    pub transcript: Transcript,
    /// Windows whose recognition call failed (treated as silence)
    #[serde(default)]
    pub failed_recognitions: u32,
    /// Windows whose diarization call failed (speakers degraded to Unknown)
    #[serde(default)]
    pub failed_diarizations: u32,
}

/// Lightweight session info for lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub id: String,
    pub started_at: String,
    pub title: String,
    pub duration_ms: i64,
    pub segment_count: usize,
    pub speaker_count: usize,
}

// ============================================================================
// Worker IPC
// ============================================================================

/// Recognition engine selection for the worker binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RecognizerChoice {
    /// whisper-rs engine (requires the `whisper` feature)
    #[serde(rename_all = "camelCase")]
    Whisper {
        model_path: String,
        #[serde(default)]
        language: Option<String>,
    },
}

/// Diarization engine selection for the worker binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DiarizerChoice {
    /// Offline energy/pitch heuristic (window-local labels, low accuracy)
    Energy,
    /// External diarizer subprocess
    #[serde(rename_all = "camelCase")]
    External {
        binary_path: String,
        #[serde(default)]
        session_stable: bool,
    },
}

/// Session tuning knobs accepted over the wire; all optional, the
/// session supplies defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub look_back_secs: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_overlap_fraction: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_speakers: Option<usize>,
}

/// Worker command for IPC
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerCommand {
    /// Begin a session
    Start {
        #[serde(default)]
        config: WorkerSessionConfig,
        recognizer: RecognizerChoice,
        diarizer: DiarizerChoice,
    },
    /// Push audio frames into the active session
    PushAudio { samples: Vec<f32> },
    /// Stop the active session and return its transcript
    Finish,
    /// Shutdown worker
    Shutdown,
}

/// Worker response for IPC
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerResponse {
    /// Session started
    #[serde(rename_all = "camelCase")]
    Started { session_id: String },
    /// A new speaker was heard
    SpeakerDiscovered(SpeakerDiscovered),
    /// Finished session result
    Finished(SessionRecord),
    /// Error
    Error { message: String },
    /// Acknowledgement
    Ok,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_record_round_trip_preserves_order_and_speakers() {
        let segments = vec![
            TranscriptSegment {
                sequence: 0,
                speaker: 2,
                text: "hello".into(),
                start_ms: 0,
                end_ms: 1200,
                confidence: 0.9,
            },
            TranscriptSegment {
                sequence: 1,
                speaker: 1,
                text: "hi there".into(),
                start_ms: 1300,
                end_ms: 2600,
                confidence: 0.8,
            },
        ];
        let mut stats = BTreeMap::new();
        stats.insert(
            2,
            SpeakerStats {
                segment_count: 1,
                speaking_ms: 1200,
            },
        );
        stats.insert(
            1,
            SpeakerStats {
                segment_count: 1,
                speaking_ms: 1300,
            },
        );
        let record = SessionRecord {
            id: "abc".into(),
            started_at: "2025-11-03T10:00:00Z".into(),
            duration_ms: 2600,
            transcript: Transcript {
                segments,
                stats,
                speaker_count: 2,
            },
            failed_recognitions: 1,
            failed_diarizations: 0,
        };

        let json = serde_json::to_string(&record).unwrap();
        let back: SessionRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(back, record);
        let sequences: Vec<u64> = back.transcript.segments.iter().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![0, 1]);
        assert_eq!(back.transcript.segments[0].speaker, 2);
    }

    #[test]
    fn worker_command_wire_format() {
        let cmd: WorkerCommand = serde_json::from_str(
            r#"{"type":"Start","recognizer":{"type":"whisper","modelPath":"/m.bin"},"diarizer":{"type":"energy"}}"#,
        )
        .unwrap();
        match cmd {
            WorkerCommand::Start {
                recognizer: RecognizerChoice::Whisper { model_path, language },
                diarizer: DiarizerChoice::Energy,
                ..
            } => {
                assert_eq!(model_path, "/m.bin");
                assert!(language.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
