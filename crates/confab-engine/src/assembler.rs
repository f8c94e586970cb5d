//! Transcript assembly
//!
//! Merges recognition segments with reconciled speaker activity into
//! the ordered, speaker-attributed transcript, maintaining per-speaker
//! aggregates as segments are appended.
//!
//! Attribution uses the dominant speaker at the segment midpoint: the
//! resolved span containing the midpoint wins; failing that, the
//! nearest span by time gap; with no diarization data at all, the
//! Unknown sentinel. Recognition segments are short enough that the
//! midpoint rule tracks majority overlap in practice.

use confab_types::{
    RecognitionSegment, ResolvedSpan, SpeakerId, SpeakerStats, Transcript, TranscriptSegment,
    UNKNOWN_SPEAKER,
};
use std::collections::BTreeMap;

/// Builds the transcript incrementally; consumed by [`finalize`].
///
/// Segments must be appended in non-decreasing start order, which the
/// chunker's sequential windowing already guarantees.
///
/// [`finalize`]: TranscriptAssembler::finalize
#[derive(Default)]
pub struct TranscriptAssembler {
    segments: Vec<TranscriptSegment>,
    stats: BTreeMap<SpeakerId, SpeakerStats>,
    next_sequence: u64,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute a recognition segment and append it with the next
    /// sequence number.
    pub fn append(
        &mut self,
        segment: RecognitionSegment,
        spans: &[ResolvedSpan],
    ) -> &TranscriptSegment {
        debug_assert!(
            self.segments
                .last()
                .map(|prev| segment.start_ms >= prev.start_ms)
                .unwrap_or(true),
            "recognition segments must arrive in non-decreasing start order"
        );

        let speaker = speaker_at(segment.midpoint_secs(), spans);

        let entry = TranscriptSegment {
            sequence: self.next_sequence,
            speaker,
            text: segment.text,
            start_ms: segment.start_ms,
            end_ms: segment.end_ms,
            confidence: segment.confidence,
        };
        self.next_sequence += 1;

        let stats = self.stats.entry(speaker).or_default();
        stats.segment_count += 1;
        stats.speaking_ms += entry.duration_ms();

        self.segments.push(entry);
        self.segments.last().expect("segment just pushed")
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Finish the session and return the immutable transcript.
    ///
    /// Zero appended segments is a valid terminal state and yields an
    /// empty transcript.
    pub fn finalize(self) -> Transcript {
        let speaker_count = self
            .stats
            .keys()
            .filter(|&&id| id != UNKNOWN_SPEAKER)
            .count();

        tracing::info!(
            "transcript finalized: {} segments, {} speakers",
            self.segments.len(),
            speaker_count
        );

        Transcript {
            segments: self.segments,
            stats: self.stats,
            speaker_count,
        }
    }
}

/// Dominant speaker at a point in time.
fn speaker_at(midpoint_secs: f32, spans: &[ResolvedSpan]) -> SpeakerId {
    if spans.is_empty() {
        return UNKNOWN_SPEAKER;
    }

    for span in spans {
        if span.start <= midpoint_secs && midpoint_secs < span.end {
            return span.speaker;
        }
    }

    // No span contains the midpoint: take the nearest by time gap.
    let mut best = UNKNOWN_SPEAKER;
    let mut best_gap = f32::MAX;
    for span in spans {
        let gap = if midpoint_secs < span.start {
            span.start - midpoint_secs
        } else {
            midpoint_secs - span.end
        };
        if gap < best_gap {
            best_gap = gap;
            best = span.speaker;
        }
    }
    best
}
