//! Live session orchestration
//!
//! A session owns its whole pipeline: the window chunker fed from the
//! caller's audio thread, a bounded handoff queue, and one pipeline
//! worker that runs recognition and diarization per window and applies
//! the results to the reconciler and assembler strictly in window
//! order. No module-level state; multiple sessions can run side by
//! side.
//!
//! The handoff queue is small and blocking: if the worker falls behind,
//! `push_audio` stalls the audio intake rather than dropping windows —
//! the record stays complete at the cost of latency.

use confab_audio::{is_silent, AudioWindow, ChunkerConfig, WindowChunker};
use confab_engine::{
    DiarizationAdapter, DiarizationEngine, PipelineError, ReconcilerConfig, RecognitionAdapter,
    RecognitionEngine, SpeakerReconciler, TranscriptAssembler,
};
use confab_types::{LabelScope, SessionRecord, SpeakerDiscovered};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Analysis window length
    pub window: Duration,
    /// Pipeline sample rate; pushed audio must already be mono at this
    /// rate (resample at intake with `confab_audio::resample`)
    pub sample_rate: u32,
    /// Chunker-to-worker queue capacity, in windows
    pub queue_capacity: usize,
    /// Speaker reconciliation knobs
    pub reconciler: ReconcilerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(10),
            sample_rate: 16_000,
            queue_capacity: 4,
            reconciler: ReconcilerConfig::default(),
        }
    }
}

/// What the pipeline worker hands back when the window queue closes.
struct WorkerOutcome {
    transcript: confab_types::Transcript,
    failed_recognitions: u32,
    failed_diarizations: u32,
}

/// A running session.
pub struct Session;

impl Session {
    /// Spin up the pipeline and return its handle.
    pub fn start(
        config: SessionConfig,
        recognizer: Arc<dyn RecognitionEngine>,
        diarizer: Arc<dyn DiarizationEngine>,
    ) -> anyhow::Result<SessionHandle> {
        let id = uuid::Uuid::new_v4().to_string();
        let started_at = chrono::Utc::now();

        let chunker_config = ChunkerConfig {
            window: config.window,
            sample_rate: config.sample_rate,
            queue_capacity: config.queue_capacity,
        };
        let (chunker, window_rx) = WindowChunker::new(&chunker_config);
        let (discovered_tx, discovered_rx) = std::sync::mpsc::channel();

        let recognition = RecognitionAdapter::new(recognizer);
        let diarization = DiarizationAdapter::new(diarizer);
        let reconciler_config = config.reconciler.clone();
        let sample_rate = config.sample_rate;

        tracing::info!(
            "session {} started: window={:?}, recognizer={}, diarizer={} ({:?} labels)",
            id,
            config.window,
            recognition.engine_name(),
            diarization.engine_name(),
            diarization.label_scope()
        );

        let worker = std::thread::Builder::new()
            .name("confab-pipeline".into())
            .spawn(move || {
                pipeline_worker(
                    window_rx,
                    recognition,
                    diarization,
                    reconciler_config,
                    sample_rate,
                    discovered_tx,
                )
            })?;

        Ok(SessionHandle {
            id,
            started_at,
            chunker,
            worker,
            discovered_rx,
        })
    }
}

/// Handle to a live session.
///
/// Stopping consumes the handle, so `finalize` runs exactly once and
/// no audio can be pushed afterwards.
pub struct SessionHandle {
    id: String,
    started_at: chrono::DateTime<chrono::Utc>,
    chunker: WindowChunker,
    worker: JoinHandle<WorkerOutcome>,
    discovered_rx: Receiver<SpeakerDiscovered>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Feed mono frames at the configured sample rate.
    ///
    /// Blocks while the window queue is full (backpressure to the
    /// audio source).
    pub fn push_audio(&mut self, samples: &[f32]) -> Result<(), PipelineError> {
        self.chunker
            .push(samples)
            .map_err(|_| PipelineError::StreamRead("pipeline worker is gone".into()))
    }

    /// New-speaker notifications observed so far (non-blocking drain).
    pub fn take_discovered(&self) -> Vec<SpeakerDiscovered> {
        self.discovered_rx.try_iter().collect()
    }

    /// Graceful stop: flush the buffered tail as a final short window,
    /// let in-flight windows finish, finalize, and return the record.
    pub fn stop(self) -> Result<SessionRecord, PipelineError> {
        let duration_ms = self.chunker.total_duration_ms();
        if self.chunker.finish().is_err() {
            tracing::warn!("session {}: worker was gone before the tail flush", self.id);
        }
        Self::collect(self.id, self.started_at, duration_ms, self.worker)
    }

    /// Input-stream failure: discard the partial window, finalize what
    /// was already assembled, and return the (possibly sparse) record.
    pub fn abort(self) -> Result<SessionRecord, PipelineError> {
        let duration_ms = self.chunker.total_duration_ms();
        self.chunker.abort();
        Self::collect(self.id, self.started_at, duration_ms, self.worker)
    }

    fn collect(
        id: String,
        started_at: chrono::DateTime<chrono::Utc>,
        duration_ms: i64,
        worker: JoinHandle<WorkerOutcome>,
    ) -> Result<SessionRecord, PipelineError> {
        let outcome = worker
            .join()
            .map_err(|_| PipelineError::StreamRead("pipeline worker panicked".into()))?;

        tracing::info!(
            "session {} stopped: {} segments, {} failed recognitions, {} failed diarizations",
            id,
            outcome.transcript.segments.len(),
            outcome.failed_recognitions,
            outcome.failed_diarizations
        );

        Ok(SessionRecord {
            id,
            started_at: started_at.to_rfc3339(),
            duration_ms,
            transcript: outcome.transcript,
            failed_recognitions: outcome.failed_recognitions,
            failed_diarizations: outcome.failed_diarizations,
        })
    }
}

/// Sequential pipeline worker.
///
/// Windows arrive in order; the two adapter calls for one window run
/// concurrently with each other, but results are applied to the
/// reconciler and assembler before the next window is taken, so the
/// look-back state never sees windows out of order.
fn pipeline_worker(
    window_rx: Receiver<AudioWindow>,
    recognition: RecognitionAdapter,
    diarization: DiarizationAdapter,
    reconciler_config: ReconcilerConfig,
    sample_rate: u32,
    discovered_tx: Sender<SpeakerDiscovered>,
) -> WorkerOutcome {
    let scope = diarization.label_scope();
    let mut reconciler = SpeakerReconciler::new(scope, reconciler_config);
    let mut assembler = TranscriptAssembler::new();

    // Cumulative policy: the diarizer re-processes the whole session
    // each window.
    let mut session_audio: Vec<f32> = Vec::new();

    let mut failed_recognitions = 0u32;
    let mut failed_diarizations = 0u32;

    while let Ok(window) = window_rx.recv() {
        if is_silent(&window.samples, None) {
            // Nothing to recognize or diarize; time bookkeeping only.
            if scope == LabelScope::SessionStable {
                session_audio.extend_from_slice(&window.samples);
            }
            tracing::debug!("window {}: silent, skipped", window.index);
            continue;
        }

        if scope == LabelScope::SessionStable {
            session_audio.extend_from_slice(&window.samples);
        }

        // No data dependency between the two calls; run them together.
        let (recognized, diarized) = std::thread::scope(|s| {
            let rec = s.spawn(|| recognition.recognize(&window));
            let diar = s.spawn(|| match scope {
                LabelScope::SessionStable => {
                    diarization.diarize_session(&session_audio, sample_rate, window.index)
                }
                LabelScope::WindowLocal => diarization.diarize_window(&window),
            });
            (rec.join(), diar.join())
        });

        let segments = match recognized {
            Ok(Ok(segments)) => segments,
            Ok(Err(err)) => {
                tracing::warn!("{err}; window treated as silence");
                failed_recognitions += 1;
                Vec::new()
            }
            Err(_) => {
                tracing::error!("recognition panicked on window {}", window.index);
                failed_recognitions += 1;
                Vec::new()
            }
        };

        let spans = match diarized {
            Ok(Ok(spans)) => spans,
            Ok(Err(err)) => {
                tracing::warn!("{err}; speakers degrade to Unknown for this window");
                failed_diarizations += 1;
                Vec::new()
            }
            Err(_) => {
                tracing::error!("diarization panicked on window {}", window.index);
                failed_diarizations += 1;
                Vec::new()
            }
        };

        let resolved = reconciler.observe(&spans);
        for event in reconciler.take_events() {
            let _ = discovered_tx.send(event);
        }

        for segment in segments {
            assembler.append(segment, &resolved);
        }
    }

    WorkerOutcome {
        transcript: assembler.finalize(),
        failed_recognitions,
        failed_diarizations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use confab_types::{DiarizationSpan, RecognitionSegment, UNKNOWN_SPEAKER};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Test config: 1 kHz sample rate so 1 sample = 1 ms, 100 ms windows.
    fn test_config() -> SessionConfig {
        SessionConfig {
            window: Duration::from_millis(100),
            sample_rate: 1_000,
            queue_capacity: 4,
            reconciler: ReconcilerConfig {
                look_back_secs: 30.0,
                min_overlap_fraction: 0.2,
                max_speakers: 16,
            },
        }
    }

    /// One segment per call, window-relative [10, 90) ms.
    struct CountingRecognizer {
        calls: AtomicUsize,
        fail_on: Option<usize>,
    }

    impl CountingRecognizer {
        fn new(fail_on: Option<usize>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on,
            }
        }
    }

    impl RecognitionEngine for CountingRecognizer {
        fn name(&self) -> &str {
            "counting"
        }
        fn transcribe(&self, _: &[f32], _: u32) -> Result<Vec<RecognitionSegment>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(call) {
                anyhow::bail!("scripted failure on call {call}");
            }
            Ok(vec![RecognitionSegment {
                start_ms: 10,
                end_ms: 90,
                text: format!("utterance {call}"),
                confidence: 0.9,
            }])
        }
    }

    /// Window-local diarizer covering each window with one label.
    struct OneLabelPerWindow {
        calls: AtomicUsize,
        fail_on: Option<usize>,
    }

    impl OneLabelPerWindow {
        fn new(fail_on: Option<usize>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on,
            }
        }
    }

    impl DiarizationEngine for OneLabelPerWindow {
        fn name(&self) -> &str {
            "one-label"
        }
        fn label_scope(&self) -> LabelScope {
            LabelScope::WindowLocal
        }
        fn diarize(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<DiarizationSpan>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(call) {
                anyhow::bail!("scripted diarization failure on call {call}");
            }
            Ok(vec![DiarizationSpan {
                start: 0.0,
                end: samples.len() as f32 / sample_rate as f32,
                // A fresh provider label every call: reconciliation has
                // to bridge the drift.
                label: format!("LOCAL_{call}"),
            }])
        }
    }

    /// Session-stable diarizer: alternating halves of the accumulated
    /// audio belong to "A" and "B".
    struct CumulativeDiarizer;

    impl DiarizationEngine for CumulativeDiarizer {
        fn name(&self) -> &str {
            "cumulative"
        }
        fn label_scope(&self) -> LabelScope {
            LabelScope::SessionStable
        }
        fn diarize(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<DiarizationSpan>> {
            let total = samples.len() as f32 / sample_rate as f32;
            let mut spans = Vec::new();
            let mut t = 0.0f32;
            let mut flip = false;
            while t < total {
                let end = (t + 0.1).min(total);
                spans.push(DiarizationSpan {
                    start: t,
                    end,
                    label: if flip { "B".into() } else { "A".into() },
                });
                t = end;
                flip = !flip;
            }
            Ok(spans)
        }
    }

    struct NoSpeakers;

    impl DiarizationEngine for NoSpeakers {
        fn name(&self) -> &str {
            "mute"
        }
        fn label_scope(&self) -> LabelScope {
            LabelScope::WindowLocal
        }
        fn diarize(&self, _: &[f32], _: u32) -> Result<Vec<DiarizationSpan>> {
            Ok(Vec::new())
        }
    }

    fn voiced(ms: usize) -> Vec<f32> {
        vec![0.1; ms] // 1 kHz test rate: 1 sample per ms
    }

    #[test]
    fn end_to_end_ordering_and_stats() {
        let mut handle = Session::start(
            test_config(),
            Arc::new(CountingRecognizer::new(None)),
            Arc::new(OneLabelPerWindow::new(None)),
        )
        .unwrap();

        // Three full windows of voiced audio.
        handle.push_audio(&voiced(300)).unwrap();
        let record = handle.stop().unwrap();

        let segments = &record.transcript.segments;
        assert_eq!(segments.len(), 3);
        for (i, seg) in segments.iter().enumerate() {
            assert_eq!(seg.sequence, i as u64);
            assert_eq!(seg.start_ms, i as i64 * 100 + 10);
        }
        // Non-decreasing starts, non-overlapping spans
        for pair in segments.windows(2) {
            assert!(pair[0].start_ms <= pair[1].start_ms);
            assert!(pair[0].end_ms <= pair[1].start_ms);
        }
        // Continuous speech, drifting labels: one durable speaker.
        assert!(segments.iter().all(|s| s.speaker == 1));
        assert_eq!(record.transcript.speaker_count, 1);

        let stats = &record.transcript.stats[&1];
        assert_eq!(stats.segment_count, 3);
        assert_eq!(stats.speaking_ms, 3 * 80);
        assert_eq!(record.duration_ms, 300);
    }

    #[test]
    fn short_tail_is_flushed_on_stop() {
        let mut handle = Session::start(
            test_config(),
            Arc::new(CountingRecognizer::new(None)),
            Arc::new(OneLabelPerWindow::new(None)),
        )
        .unwrap();

        // One full window plus a 40 ms tail.
        handle.push_audio(&voiced(140)).unwrap();
        let record = handle.stop().unwrap();

        assert_eq!(record.transcript.segments.len(), 2);
        assert_eq!(record.duration_ms, 140);
    }

    #[test]
    fn abort_discards_partial_window_but_keeps_the_rest() {
        let mut handle = Session::start(
            test_config(),
            Arc::new(CountingRecognizer::new(None)),
            Arc::new(OneLabelPerWindow::new(None)),
        )
        .unwrap();

        handle.push_audio(&voiced(140)).unwrap();
        let record = handle.abort().unwrap();

        // The 40 ms remainder never became a window.
        assert_eq!(record.transcript.segments.len(), 1);
    }

    #[test]
    fn recognition_failure_degrades_one_window_only() {
        let mut handle = Session::start(
            test_config(),
            Arc::new(CountingRecognizer::new(Some(1))),
            Arc::new(OneLabelPerWindow::new(None)),
        )
        .unwrap();

        handle.push_audio(&voiced(300)).unwrap();
        let record = handle.stop().unwrap();

        assert_eq!(record.failed_recognitions, 1);
        assert_eq!(record.transcript.segments.len(), 2);
        // Sequences stay gap-free even with the hole in the middle.
        let sequences: Vec<u64> = record.transcript.segments.iter().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![0, 1]);
    }

    #[test]
    fn diarization_failure_falls_back_to_unknown_for_that_window() {
        let mut handle = Session::start(
            test_config(),
            Arc::new(CountingRecognizer::new(None)),
            Arc::new(OneLabelPerWindow::new(Some(0))),
        )
        .unwrap();

        handle.push_audio(&voiced(200)).unwrap();
        let record = handle.stop().unwrap();

        assert_eq!(record.failed_diarizations, 1);
        let segments = &record.transcript.segments;
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].speaker, UNKNOWN_SPEAKER);
        assert_ne!(segments[1].speaker, UNKNOWN_SPEAKER);
    }

    #[test]
    fn sessionwide_diarization_silence_means_unknown_everywhere() {
        let mut handle = Session::start(
            test_config(),
            Arc::new(CountingRecognizer::new(None)),
            Arc::new(NoSpeakers),
        )
        .unwrap();

        handle.push_audio(&voiced(300)).unwrap();
        let record = handle.stop().unwrap();

        assert!(record
            .transcript
            .segments
            .iter()
            .all(|s| s.speaker == UNKNOWN_SPEAKER));
        assert_eq!(record.transcript.speaker_count, 0);
    }

    #[test]
    fn cumulative_labels_resolve_to_stable_ids() {
        let mut handle = Session::start(
            test_config(),
            Arc::new(CountingRecognizer::new(None)),
            Arc::new(CumulativeDiarizer),
        )
        .unwrap();

        handle.push_audio(&voiced(400)).unwrap();
        let record = handle.stop().unwrap();

        // "A" spans cover [0,100), [200,300)...; every segment midpoint
        // (x50ms into its window) alternates A, B, A, B.
        let speakers: Vec<_> = record
            .transcript
            .segments
            .iter()
            .map(|s| s.speaker)
            .collect();
        assert_eq!(speakers, vec![1, 2, 1, 2]);
        assert_eq!(record.transcript.speaker_count, 2);
    }

    #[test]
    fn silent_windows_change_nothing_but_time() {
        let mut handle = Session::start(
            test_config(),
            Arc::new(CountingRecognizer::new(None)),
            Arc::new(OneLabelPerWindow::new(None)),
        )
        .unwrap();

        handle.push_audio(&voiced(100)).unwrap();
        handle.push_audio(&vec![0.0; 100]).unwrap(); // pure silence
        handle.push_audio(&voiced(100)).unwrap();
        let record = handle.stop().unwrap();

        assert_eq!(record.transcript.segments.len(), 2);
        assert_eq!(record.duration_ms, 300);
    }

    #[test]
    fn empty_session_yields_empty_transcript() {
        let handle = Session::start(
            test_config(),
            Arc::new(CountingRecognizer::new(None)),
            Arc::new(OneLabelPerWindow::new(None)),
        )
        .unwrap();

        let record = handle.stop().unwrap();
        assert!(record.transcript.is_empty());
        assert_eq!(record.transcript.speaker_count, 0);
        assert_eq!(record.duration_ms, 0);
    }

    #[test]
    fn discovery_event_is_observable_before_stop() {
        let mut handle = Session::start(
            test_config(),
            Arc::new(CountingRecognizer::new(None)),
            Arc::new(OneLabelPerWindow::new(None)),
        )
        .unwrap();

        handle.push_audio(&voiced(100)).unwrap();

        // The worker runs asynchronously; poll briefly.
        let mut events = Vec::new();
        for _ in 0..50 {
            events.extend(handle.take_discovered());
            if !events.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, 1);

        let _ = handle.stop().unwrap();
    }
}
