//! Confab worker process
//!
//! Runs the transcription pipeline out of process for host
//! applications: line-delimited JSON commands on stdin, responses on
//! stdout, logs on stderr.
//!
//! One session at a time: `Start` wires engines and opens the session,
//! `PushAudio` feeds it, `Finish` stops it and returns the record.
//! New-speaker notifications are interleaved as extra response lines
//! before a command's acknowledgement.

use anyhow::Result;
use confab_engine::{
    DiarizationEngine, EnergyDiarizer, ExternalDiarizer, ExternalDiarizerConfig, RecognitionEngine,
};
use confab_session::{Session, SessionConfig, SessionHandle};
use confab_types::{
    DiarizerChoice, RecognizerChoice, WorkerCommand, WorkerResponse, WorkerSessionConfig,
};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    // Tracing goes to stderr; stdout carries IPC.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    tracing::info!("confab worker starting");

    if let Err(e) = run_worker() {
        tracing::error!("worker error: {}", e);
        std::process::exit(1);
    }
}

fn run_worker() -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut session: Option<SessionHandle> = None;

    tracing::info!("worker ready, listening for commands");

    for line in stdin.lock().lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        let command: WorkerCommand = match serde_json::from_str(&line) {
            Ok(cmd) => cmd,
            Err(e) => {
                respond(
                    &mut stdout,
                    &WorkerResponse::Error {
                        message: format!("invalid command: {}", e),
                    },
                )?;
                continue;
            }
        };

        // Forward any pending new-speaker notifications first.
        if let Some(handle) = &session {
            for event in handle.take_discovered() {
                respond(&mut stdout, &WorkerResponse::SpeakerDiscovered(event))?;
            }
        }

        let response = match command {
            WorkerCommand::Start {
                config,
                recognizer,
                diarizer,
            } => {
                if session.is_some() {
                    WorkerResponse::Error {
                        message: "a session is already active".to_string(),
                    }
                } else {
                    match start_session(&config, &recognizer, &diarizer) {
                        Ok(handle) => {
                            let session_id = handle.id().to_string();
                            session = Some(handle);
                            WorkerResponse::Started { session_id }
                        }
                        Err(e) => WorkerResponse::Error {
                            message: format!("failed to start session: {:#}", e),
                        },
                    }
                }
            }

            WorkerCommand::PushAudio { samples } => match session.as_mut() {
                Some(handle) => match handle.push_audio(&samples) {
                    Ok(()) => WorkerResponse::Ok,
                    Err(e) => WorkerResponse::Error {
                        message: e.to_string(),
                    },
                },
                None => WorkerResponse::Error {
                    message: "no active session".to_string(),
                },
            },

            WorkerCommand::Finish => match session.take() {
                Some(handle) => match handle.stop() {
                    Ok(record) => WorkerResponse::Finished(record),
                    Err(e) => WorkerResponse::Error {
                        message: e.to_string(),
                    },
                },
                None => WorkerResponse::Error {
                    message: "no active session".to_string(),
                },
            },

            WorkerCommand::Shutdown => {
                tracing::info!("shutdown command received");
                if let Some(handle) = session.take() {
                    // Finish whatever is in flight before going away.
                    let _ = handle.stop();
                }
                respond(&mut stdout, &WorkerResponse::Ok)?;
                break;
            }
        };

        respond(&mut stdout, &response)?;
    }

    tracing::info!("worker shutting down");
    Ok(())
}

fn respond(stdout: &mut io::Stdout, response: &WorkerResponse) -> Result<()> {
    writeln!(stdout, "{}", serde_json::to_string(response)?)?;
    stdout.flush()?;
    Ok(())
}

fn start_session(
    config: &WorkerSessionConfig,
    recognizer: &RecognizerChoice,
    diarizer: &DiarizerChoice,
) -> Result<SessionHandle> {
    let recognizer = build_recognizer(recognizer)?;
    let diarizer = build_diarizer(diarizer)?;
    Session::start(session_config(config), recognizer, diarizer)
}

fn session_config(wire: &WorkerSessionConfig) -> SessionConfig {
    let mut config = SessionConfig::default();
    if let Some(window_ms) = wire.window_ms {
        config.window = Duration::from_millis(window_ms.max(1) as u64);
    }
    if let Some(sample_rate) = wire.sample_rate {
        config.sample_rate = sample_rate;
    }
    if let Some(look_back) = wire.look_back_secs {
        config.reconciler.look_back_secs = look_back;
    }
    if let Some(fraction) = wire.min_overlap_fraction {
        config.reconciler.min_overlap_fraction = fraction;
    }
    if let Some(max) = wire.max_speakers {
        config.reconciler.max_speakers = max;
    }
    config
}

#[cfg(feature = "whisper")]
fn build_recognizer(choice: &RecognizerChoice) -> Result<Arc<dyn RecognitionEngine>> {
    match choice {
        RecognizerChoice::Whisper {
            model_path,
            language,
        } => {
            let engine = confab_engine::WhisperEngine::new(confab_engine::WhisperConfig {
                model_path: model_path.clone(),
                language: language.clone().unwrap_or_else(|| "auto".to_string()),
                ..Default::default()
            })?;
            Ok(Arc::new(engine))
        }
    }
}

#[cfg(not(feature = "whisper"))]
fn build_recognizer(choice: &RecognizerChoice) -> Result<Arc<dyn RecognitionEngine>> {
    match choice {
        RecognizerChoice::Whisper { .. } => {
            anyhow::bail!("whisper support not compiled in; rebuild with --features whisper")
        }
    }
}

fn build_diarizer(choice: &DiarizerChoice) -> Result<Arc<dyn DiarizationEngine>> {
    match choice {
        DiarizerChoice::Energy => Ok(Arc::new(EnergyDiarizer::with_defaults())),
        DiarizerChoice::External {
            binary_path,
            session_stable,
        } => {
            let engine = ExternalDiarizer::new(ExternalDiarizerConfig {
                binary_path: binary_path.into(),
                session_stable: *session_stable,
                ..Default::default()
            })?;
            Ok(Arc::new(engine))
        }
    }
}
