/*!
 * Spoken feedback
 * Announcer front-end plus an external speech program backend
 */

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SpeechConfig;
use crate::error::{Result, SinkError};
use crate::platform::{QueueMode, SpeechEngine};

/// Logs every utterance and plays it when an engine is available.
pub struct Announcer<E> {
    engine: Option<E>,
    mode: QueueMode,
}

impl<E: SpeechEngine> Announcer<E> {
    /// Finish engine setup. A failed open leaves the announcer log-only.
    pub async fn initialize(opened: Result<E>, locale: &str, mode: QueueMode) -> Self {
        let engine = match opened {
            Ok(engine) => {
                if let Err(e) = engine.set_language(locale).await {
                    warn!("Could not set speech language to {}: {}", locale, e);
                }
                Some(engine)
            }
            Err(e) => {
                warn!("Could not open speech engine ({}). Ignoring text to speech", e);
                None
            }
        };
        Self { engine, mode }
    }

    pub fn disabled() -> Self {
        Self {
            engine: None,
            mode: QueueMode::Add,
        }
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    pub async fn speak(&self, utterance: &str) {
        info!("{}", utterance);
        if let Some(engine) = &self.engine {
            if let Err(e) = engine.speak(utterance, self.mode).await {
                warn!("Speech engine dropped utterance: {}", e);
            }
        }
    }

    pub async fn shutdown(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.stop().await;
            engine.shutdown().await;
        }
    }
}

struct Utterance {
    text: String,
    generation: u64,
}

/// Speaks through an external program such as `espeak-ng`, one utterance at a time.
pub struct EspeakEngine {
    queue: mpsc::UnboundedSender<Utterance>,
    voice: Arc<Mutex<String>>,
    generation: Arc<AtomicU64>,
    worker: JoinHandle<()>,
}

impl EspeakEngine {
    pub async fn open(config: &SpeechConfig) -> Result<Self> {
        let probe = Command::new(&config.program)
            .arg("--version")
            .output()
            .await
            .map_err(|e| SinkError::SpeechUnavailable(format!("{}: {}", config.program, e)))?;
        if !probe.status.success() {
            return Err(SinkError::SpeechUnavailable(format!(
                "{} exited with {}",
                config.program, probe.status
            )));
        }
        debug!(
            "Speech program ready: {}",
            String::from_utf8_lossy(&probe.stdout).trim()
        );

        let (queue, rx) = mpsc::unbounded_channel();
        let voice = Arc::new(Mutex::new(voice_for_locale(&config.locale)));
        let generation = Arc::new(AtomicU64::new(0));
        let worker = tokio::spawn(run_queue(
            config.program.clone(),
            voice.clone(),
            generation.clone(),
            rx,
        ));

        Ok(Self {
            queue,
            voice,
            generation,
            worker,
        })
    }
}

#[async_trait]
impl SpeechEngine for EspeakEngine {
    async fn set_language(&self, locale: &str) -> Result<()> {
        let voice = voice_for_locale(locale);
        debug!("Speech voice set to {}", voice);
        *lock_voice(&self.voice) = voice;
        Ok(())
    }

    async fn speak(&self, utterance: &str, mode: QueueMode) -> Result<()> {
        let generation = match mode {
            QueueMode::Add => self.generation.load(Ordering::SeqCst),
            QueueMode::Flush => self.generation.fetch_add(1, Ordering::SeqCst) + 1,
        };
        self.queue
            .send(Utterance {
                text: utterance.to_string(),
                generation,
            })
            .map_err(|_| SinkError::SpeechUnavailable("speech worker stopped".to_string()))
    }

    async fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    async fn shutdown(&self) {
        self.worker.abort();
    }
}

async fn run_queue(
    program: String,
    voice: Arc<Mutex<String>>,
    generation: Arc<AtomicU64>,
    mut rx: mpsc::UnboundedReceiver<Utterance>,
) {
    while let Some(utterance) = rx.recv().await {
        if utterance.generation < generation.load(Ordering::SeqCst) {
            debug!("Skipping flushed utterance: {}", utterance.text);
            continue;
        }
        let voice = lock_voice(&voice).clone();

        let status = Command::new(&program)
            .arg("-v")
            .arg(&voice)
            .arg(&utterance.text)
            .kill_on_drop(true)
            .status()
            .await;
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => warn!("{} exited with {}", program, status),
            Err(e) => warn!("Failed to run {}: {}", program, e),
        }
    }
}

/// The voice stays usable even if a holder of the lock panicked.
fn lock_voice(voice: &Mutex<String>) -> MutexGuard<'_, String> {
    voice.lock().unwrap_or_else(|poisoned| {
        warn!("Speech voice lock was poisoned; keeping the last voice");
        poisoned.into_inner()
    })
}

/// `en-US` style locales map onto espeak voice names like `en-us`.
fn voice_for_locale(locale: &str) -> String {
    let voice = locale.trim().replace('_', "-").to_lowercase();
    if voice.is_empty() {
        "en".to_string()
    } else {
        voice
    }
}
