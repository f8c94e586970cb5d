//! Speaker reconciliation
//!
//! Diarization providers hand back per-call speaker labels that are not
//! guaranteed stable across windows: the same physical speaker may be
//! "SPEAKER_00" in one window and "SPEAKER_01" in the next. The
//! reconciler converts those volatile labels into durable session
//! speaker ids, minted 1, 2, 3... in order of first appearance and
//! never reused or merged.
//!
//! Two policies, selected by the engine's [`LabelScope`]:
//!
//! - **Session-stable**: the provider re-derives consistent labels from
//!   accumulated session audio, so a single grow-only label table is
//!   enough.
//! - **Window-local**: labels reset each call, so identity is inferred
//!   by temporal-overlap voting against each known speaker's recent
//!   activity. Windows are disjoint in time, so continuity is judged
//!   against activity extended by the look-back horizon: a speaker whose
//!   last span ended within the look-back still competes for the new
//!   window's labels. A label whose best overlap clears the configured
//!   fraction of its duration reuses that speaker; ties break by
//!   recency; anything else mints, up to a cap.
//!
//! Reconciliation never fails: ambiguity is data, and every label
//! resolves to some id.

use confab_types::{
    DiarizationSpan, LabelScope, ResolvedSpan, SpeakerDiscovered, SpeakerId, SpeakerIdentity,
};
use std::collections::HashMap;

/// Reconciler tuning knobs.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// How far back resolved speaker activity competes for new labels.
    pub look_back_secs: f32,
    /// Minimum overlap, as a fraction of a label's duration in the
    /// window, required to reuse an existing speaker.
    pub min_overlap_fraction: f32,
    /// Sanity bound on identity creation from noisy diarization; once
    /// reached, unmatched labels are forced onto the best candidate.
    pub max_speakers: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            look_back_secs: 30.0,
            min_overlap_fraction: 0.2,
            max_speakers: 16,
        }
    }
}

/// Maps volatile provider labels onto durable session speaker ids.
pub struct SpeakerReconciler {
    config: ReconcilerConfig,
    scope: LabelScope,
    /// Grow-only label table (session-stable policy only)
    session_table: HashMap<String, SpeakerId>,
    identities: Vec<SpeakerIdentity>,
    /// Resolved activity within the look-back horizon (window-local policy)
    recent: Vec<ResolvedSpan>,
    latest_secs: f32,
    next_id: SpeakerId,
    events: Vec<SpeakerDiscovered>,
}

impl SpeakerReconciler {
    pub fn new(scope: LabelScope, config: ReconcilerConfig) -> Self {
        Self {
            config,
            scope,
            session_table: HashMap::new(),
            identities: Vec::new(),
            recent: Vec::new(),
            latest_secs: 0.0,
            next_id: 1,
            events: Vec::new(),
        }
    }

    /// Resolve one diarization result (absolute session times) into
    /// durable speaker ids.
    ///
    /// Calls must arrive in window order: the look-back state is
    /// advanced as a side effect, and out-of-order application would
    /// corrupt the overlap voting.
    pub fn observe(&mut self, spans: &[DiarizationSpan]) -> Vec<ResolvedSpan> {
        if spans.is_empty() {
            return Vec::new();
        }
        let resolved = match self.scope {
            LabelScope::SessionStable => self.observe_stable(spans),
            LabelScope::WindowLocal => self.observe_windowed(spans),
        };
        self.remember(&resolved);
        resolved
    }

    fn observe_stable(&mut self, spans: &[DiarizationSpan]) -> Vec<ResolvedSpan> {
        spans
            .iter()
            .map(|span| {
                let speaker = match self.session_table.get(&span.label) {
                    Some(&id) => id,
                    None => {
                        let id = self.mint(span.start);
                        self.session_table.insert(span.label.clone(), id);
                        id
                    }
                };
                ResolvedSpan {
                    start: span.start,
                    end: span.end,
                    speaker,
                }
            })
            .collect()
    }

    fn observe_windowed(&mut self, spans: &[DiarizationSpan]) -> Vec<ResolvedSpan> {
        // Per-call table: labels are meaningless outside this window.
        let mut window_table: HashMap<&str, SpeakerId> = HashMap::new();
        let mut label_order: Vec<&str> = Vec::new();
        let mut totals: HashMap<&str, f32> = HashMap::new();

        for span in spans {
            if !totals.contains_key(span.label.as_str()) {
                label_order.push(&span.label);
            }
            *totals.entry(&span.label).or_insert(0.0) += span.duration();
        }

        for label in label_order {
            let label_spans: Vec<&DiarizationSpan> =
                spans.iter().filter(|s| s.label == label).collect();
            let total = totals[label];
            let speaker = self.vote(&label_spans, total);
            window_table.insert(label, speaker);
        }

        spans
            .iter()
            .map(|span| ResolvedSpan {
                start: span.start,
                end: span.end,
                speaker: window_table[span.label.as_str()],
            })
            .collect()
    }

    /// Pick a speaker for one label's spans by overlap voting against
    /// the recent activity of every known speaker.
    fn vote(&mut self, label_spans: &[&DiarizationSpan], label_total: f32) -> SpeakerId {
        // Overlap and last-active time per candidate speaker.
        let mut overlap: HashMap<SpeakerId, f32> = HashMap::new();
        let mut last_active: HashMap<SpeakerId, f32> = HashMap::new();

        for r in &self.recent {
            let reach = r.end + self.config.look_back_secs;
            for s in label_spans {
                let covered = s.end.min(reach) - s.start.max(r.start);
                if covered > 0.0 {
                    *overlap.entry(r.speaker).or_insert(0.0) += covered;
                }
            }
            let entry = last_active.entry(r.speaker).or_insert(r.end);
            if r.end > *entry {
                *entry = r.end;
            }
        }

        let best = overlap
            .iter()
            .map(|(&id, &ov)| (id, ov, last_active.get(&id).copied().unwrap_or(0.0)))
            .max_by(|a, b| {
                // Greatest overlap wins; equal overlap goes to the
                // most recently active speaker, not label order.
                a.1.total_cmp(&b.1).then(a.2.total_cmp(&b.2))
            });

        let threshold = self.config.min_overlap_fraction * label_total;

        if let Some((id, ov, _)) = best {
            if ov >= threshold && ov > 0.0 {
                return id;
            }
        }

        if self.identities.len() < self.config.max_speakers {
            let first_seen = label_spans
                .iter()
                .map(|s| s.start)
                .fold(f32::INFINITY, f32::min);
            return self.mint(first_seen);
        }

        // Cap reached: force the best candidate even below threshold.
        if let Some((id, ov, _)) = best {
            tracing::debug!(
                "speaker cap reached, forcing label onto speaker {} (overlap {:.2}s)",
                id,
                ov
            );
            return id;
        }
        match last_active
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(&id, _)| id)
        {
            Some(id) => id,
            // No recent activity either: fall back to the newest identity.
            None => self
                .identities
                .last()
                .map(|i| i.id)
                .unwrap_or(confab_types::UNKNOWN_SPEAKER),
        }
    }

    fn mint(&mut self, first_seen_secs: f32) -> SpeakerId {
        let id = self.next_id;
        self.next_id += 1;
        let first_seen_ms = (first_seen_secs.max(0.0) * 1000.0) as i64;
        self.identities.push(SpeakerIdentity { id, first_seen_ms });
        self.events.push(SpeakerDiscovered { id, first_seen_ms });
        tracing::debug!("new speaker {} first heard at {} ms", id, first_seen_ms);
        id
    }

    /// Record resolved activity and prune spans past the look-back
    /// horizon.
    fn remember(&mut self, resolved: &[ResolvedSpan]) {
        for span in resolved {
            if span.end > self.latest_secs {
                self.latest_secs = span.end;
            }
        }
        self.recent.extend_from_slice(resolved);
        let horizon = self.latest_secs - self.config.look_back_secs;
        self.recent.retain(|r| r.end >= horizon);
    }

    /// Identities minted so far, in order of first appearance.
    pub fn identities(&self) -> &[SpeakerIdentity] {
        &self.identities
    }

    pub fn speaker_count(&self) -> usize {
        self.identities.len()
    }

    /// Drain pending new-speaker notifications.
    pub fn take_events(&mut self) -> Vec<SpeakerDiscovered> {
        std::mem::take(&mut self.events)
    }
}
