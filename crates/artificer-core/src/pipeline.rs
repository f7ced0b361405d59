//! Render orchestration: synthesis, effects, and disposition.
//!
//! [`PipelineOrchestrator::run`] validates the request, takes the busy flag for
//! its domain, and spawns one worker thread that walks
//! `Synthesizing → EffectProcessing → Dispositioning → Idle`. Progress is
//! streamed as [`PipelineEvent`]s over a channel; the final result arrives on
//! the [`RunHandle`] either blocking or awaited.
//!
//! A run is refused, not queued, while any other run is in flight. Only
//! Discord sends honour cancellation.

use crate::audio_buffer::AudioBuffer;
use crate::config::AppConfig;
use crate::effect_params::{EffectParameters, DEFAULT_ROOM_SIZE};
use crate::effects::EffectsChainBuilder;
use crate::error::{ArtificerError, ArtificerResult};
use crate::playback::{open_with_system_default, wait_until_finished, Player};
use crate::routing::{DeviceRoutingManager, RouteInfo, RoutingPhase};
use crate::scratch::{default_export_name, ScratchSpace};
use crate::synthesizer::{SpeechSynthesizer, SynthesisRequest};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Cooperative cancellation flag shared between a caller and a worker
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that is not cancelled
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What to do with the processed audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineMode {
    /// Play through the current default output
    Preview,
    /// Write a WAV file, to the given path or a timestamped name in the exports directory
    Export(Option<PathBuf>),
    /// Route through the virtual cable and play
    DiscordSend,
}

impl PipelineMode {
    /// Busy flag this mode takes
    #[must_use]
    pub const fn domain(&self) -> BusyDomain {
        match self {
            Self::Preview | Self::Export(_) => BusyDomain::Generation,
            Self::DiscordSend => BusyDomain::DiscordSend,
        }
    }
}

/// The two independently tracked kinds of run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusyDomain {
    /// Preview and export
    Generation,
    /// Routed playback
    DiscordSend,
}

impl std::fmt::Display for BusyDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generation => write!(f, "generation"),
            Self::DiscordSend => write!(f, "Discord send"),
        }
    }
}

/// Stage of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Nothing running
    Idle,
    /// Waiting on the speech synthesizer
    Synthesizing,
    /// Decoding and running the effects chain
    EffectProcessing,
    /// Previewing, exporting, or sending
    Dispositioning,
}

/// Status update emitted by a worker
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The run entered a new stage
    Stage(PipelineStage),
    /// The routing state machine moved during a Discord send
    Routing(RoutingPhase),
    /// The run finished successfully
    Completed(Outcome),
    /// The run failed
    Failed(ArtificerError),
}

/// Successful result of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Preview played, or was handed to the system player
    Previewed {
        /// Transient WAV, kept until scratch cleanup
        path: PathBuf,
        /// Whether the OS default handler was used instead of the player
        opened_externally: bool,
    },
    /// File written
    Exported {
        /// Resolved output path
        path: PathBuf,
    },
    /// Routed playback ran and the original devices were restored
    Sent {
        /// Whether playback was cut short
        cancelled: bool,
        /// The devices involved
        route: RouteInfo,
    },
    /// Cancelled before any device was touched
    Cancelled,
}

/// Result of asking for a run
#[derive(Debug)]
pub enum Submission {
    /// The run is in flight
    Started(RunHandle),
    /// Another run holds the entry gate; nothing was started
    InProgress(BusyDomain),
}

impl Submission {
    /// The handle, if a run started
    #[must_use]
    pub fn started(self) -> Option<RunHandle> {
        match self {
            Self::Started(handle) => Some(handle),
            Self::InProgress(_) => None,
        }
    }
}

/// Caller's side of a running render
#[derive(Debug)]
pub struct RunHandle {
    id: Uuid,
    mode: PipelineMode,
    events: Receiver<PipelineEvent>,
    outcome: oneshot::Receiver<ArtificerResult<Outcome>>,
    cancel: CancelToken,
}

impl RunHandle {
    /// Identifier used in log lines for this run
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Mode the run was started with
    #[must_use]
    pub const fn mode(&self) -> &PipelineMode {
        &self.mode
    }

    /// Stream of status updates; closes when the worker exits
    #[must_use]
    pub const fn events(&self) -> &Receiver<PipelineEvent> {
        &self.events
    }

    /// Request cancellation; only Discord sends observe it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Clone of the cancellation token, e.g. for a signal handler
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Block the current thread until the run ends
    ///
    /// Must not be called from inside an async runtime; use [`RunHandle::outcome`] there.
    ///
    /// # Errors
    ///
    /// Returns the run's error, or `ConcurrencyError` if the worker vanished
    pub fn wait(self) -> ArtificerResult<Outcome> {
        self.outcome
            .blocking_recv()
            .map_err(|_| ArtificerError::concurrency("Pipeline worker exited without a result"))?
    }

    /// Await the end of the run
    ///
    /// # Errors
    ///
    /// Returns the run's error, or `ConcurrencyError` if the worker vanished
    pub async fn outcome(self) -> ArtificerResult<Outcome> {
        self.outcome
            .await
            .map_err(|_| ArtificerError::concurrency("Pipeline worker exited without a result"))?
    }
}

/// Opens a file with something outside the pipeline
pub type FileOpener = Arc<dyn Fn(&Path) -> ArtificerResult<()> + Send + Sync>;

/// Fixed settings for every run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Voice model passed to the synthesizer
    pub model: Option<PathBuf>,
    /// Where exports without an explicit path go
    pub exports_dir: PathBuf,
    /// Room size of the reverb stage
    pub room_size: f32,
    /// Poll interval for playback completion and cancellation
    pub poll_interval: Duration,
}

impl PipelineSettings {
    /// Settings from the loaded config
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.model_path(),
            exports_dir: config.paths.exports_dir.clone(),
            room_size: DEFAULT_ROOM_SIZE,
            poll_interval: config.poll_interval(),
        }
    }
}

#[derive(Debug, Default)]
struct BusyFlags {
    generation: bool,
    discord_send: bool,
}

impl BusyFlags {
    fn slot(&mut self, domain: BusyDomain) -> &mut bool {
        match domain {
            BusyDomain::Generation => &mut self.generation,
            BusyDomain::DiscordSend => &mut self.discord_send,
        }
    }
}

/// Clears its busy flag when dropped, whatever way the worker exits
struct BusyGuard {
    flags: Arc<Mutex<BusyFlags>>,
    domain: BusyDomain,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        *self.flags.lock().slot(self.domain) = false;
        debug!("Released {} busy flag", self.domain);
    }
}

/// Runs renders on background workers
pub struct PipelineOrchestrator {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    player: Arc<dyn Player>,
    routing: Arc<DeviceRoutingManager>,
    scratch: Arc<ScratchSpace>,
    settings: PipelineSettings,
    opener: FileOpener,
    busy: Arc<Mutex<BusyFlags>>,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("settings", &self.settings)
            .field("busy", &*self.busy.lock())
            .finish_non_exhaustive()
    }
}

impl PipelineOrchestrator {
    /// Orchestrator over the given collaborators
    ///
    /// Preview falls back to [`open_with_system_default`] when the player fails.
    #[must_use]
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        player: Arc<dyn Player>,
        routing: Arc<DeviceRoutingManager>,
        scratch: Arc<ScratchSpace>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            synthesizer,
            player,
            routing,
            scratch,
            settings,
            opener: Arc::new(open_with_system_default),
            busy: Arc::new(Mutex::new(BusyFlags::default())),
        }
    }

    /// Replace the preview fallback
    #[must_use]
    pub fn with_fallback_opener(mut self, opener: FileOpener) -> Self {
        self.opener = opener;
        self
    }

    /// Routing manager shared with the front end
    #[must_use]
    pub fn routing(&self) -> &Arc<DeviceRoutingManager> {
        &self.routing
    }

    /// Scratch space shared with the front end
    #[must_use]
    pub fn scratch(&self) -> &Arc<ScratchSpace> {
        &self.scratch
    }

    /// Whether a run of `domain` is in flight
    #[must_use]
    pub fn is_busy(&self, domain: BusyDomain) -> bool {
        *self.busy.lock().slot(domain)
    }

    fn try_acquire(&self, domain: BusyDomain) -> Result<BusyGuard, BusyDomain> {
        let mut flags = self.busy.lock();
        if flags.discord_send {
            return Err(BusyDomain::DiscordSend);
        }
        if flags.generation {
            return Err(BusyDomain::Generation);
        }
        *flags.slot(domain) = true;
        Ok(BusyGuard {
            flags: Arc::clone(&self.busy),
            domain,
        })
    }

    /// Start a render of `text` with `params` on a new worker thread
    ///
    /// Returns [`Submission::InProgress`] without doing anything while another
    /// run holds the entry gate.
    ///
    /// # Errors
    ///
    /// Returns `ConcurrencyError` if the worker thread cannot be spawned
    pub fn run<S: Into<String>>(
        &self,
        mode: PipelineMode,
        text: S,
        params: EffectParameters,
    ) -> ArtificerResult<Submission> {
        let guard = match self.try_acquire(mode.domain()) {
            Ok(guard) => guard,
            Err(busy) => {
                info!("Refusing {:?} run: {busy} already in progress", mode);
                return Ok(Submission::InProgress(busy));
            }
        };

        let id = Uuid::new_v4();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let cancel = CancelToken::new();
        let worker = Worker {
            id,
            synthesizer: Arc::clone(&self.synthesizer),
            player: Arc::clone(&self.player),
            routing: Arc::clone(&self.routing),
            scratch: Arc::clone(&self.scratch),
            settings: self.settings.clone(),
            opener: Arc::clone(&self.opener),
            events: event_tx,
            cancel: cancel.clone(),
        };
        let text = text.into();
        let worker_mode = mode.clone();

        std::thread::Builder::new()
            .name(format!("artificer-run-{}", &id.simple().to_string()[..8]))
            .spawn(move || {
                let result = worker.execute(worker_mode, &text, &params);
                drop(guard);
                worker.finish(result, outcome_tx);
            })
            .map_err(|e| ArtificerError::concurrency(format!("Could not start pipeline worker: {e}")))?;

        info!("Started {:?} run {id}", mode);
        Ok(Submission::Started(RunHandle {
            id,
            mode,
            events: event_rx,
            outcome: outcome_rx,
            cancel,
        }))
    }
}

struct Worker {
    id: Uuid,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    player: Arc<dyn Player>,
    routing: Arc<DeviceRoutingManager>,
    scratch: Arc<ScratchSpace>,
    settings: PipelineSettings,
    opener: FileOpener,
    events: Sender<PipelineEvent>,
    cancel: CancelToken,
}

impl Worker {
    fn emit(&self, event: PipelineEvent) {
        // Receiver gone means nobody is watching
        let _ = self.events.send(event);
    }

    fn stage(&self, stage: PipelineStage) {
        debug!("Run {}: {:?}", self.id, stage);
        self.emit(PipelineEvent::Stage(stage));
    }

    fn execute(&self, mode: PipelineMode, text: &str, params: &EffectParameters) -> ArtificerResult<Outcome> {
        params.validate()?;
        let model = self
            .settings
            .model
            .clone()
            .ok_or_else(|| ArtificerError::invalid_input("No voice model selected"))?;
        let request = SynthesisRequest::new(text, model, params);
        request.validate()?;

        self.stage(PipelineStage::Synthesizing);
        let raw_path = self.scratch.synthesis_path()?;
        self.synthesizer.synthesize(&request, &raw_path)?;

        self.stage(PipelineStage::EffectProcessing);
        let raw = AudioBuffer::read_wav(&raw_path)?;
        let processed = EffectsChainBuilder::process(raw, params, self.settings.room_size)?;
        info!(
            "Run {}: rendered {:.2}s at {} Hz",
            self.id,
            processed.duration_secs(),
            processed.sample_rate()
        );

        self.stage(PipelineStage::Dispositioning);
        match mode {
            PipelineMode::Preview => self.preview(&processed),
            PipelineMode::Export(path) => self.export(&processed, path),
            PipelineMode::DiscordSend => self.send(&processed),
        }
    }

    fn preview(&self, audio: &AudioBuffer) -> ArtificerResult<Outcome> {
        let path = self.scratch.preview_path()?;
        audio.write_wav(&path)?;

        let played = self
            .player
            .play(&path)
            .and_then(|mut handle| wait_until_finished(handle.as_mut(), self.settings.poll_interval));
        match played {
            Ok(()) => Ok(Outcome::Previewed {
                path,
                opened_externally: false,
            }),
            Err(e) => {
                warn!("Preview playback failed, opening with the system player: {e}");
                (self.opener)(&path)?;
                Ok(Outcome::Previewed {
                    path,
                    opened_externally: true,
                })
            }
        }
    }

    fn export(&self, audio: &AudioBuffer, path: Option<PathBuf>) -> ArtificerResult<Outcome> {
        let target = path.unwrap_or_else(|| self.settings.exports_dir.join(default_export_name()));
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        audio.write_wav(&target)?;
        let resolved = target.canonicalize()?;
        info!("Exported to {}", resolved.display());
        Ok(Outcome::Exported { path: resolved })
    }

    fn send(&self, audio: &AudioBuffer) -> ArtificerResult<Outcome> {
        if self.cancel.is_cancelled() {
            info!("Run {} cancelled before routing", self.id);
            return Ok(Outcome::Cancelled);
        }
        let path = self.scratch.send_path()?;
        audio.write_wav(&path)?;

        let on_phase = |phase: RoutingPhase| self.emit(PipelineEvent::Routing(phase));
        let routed = self.routing.play_routed(
            &path,
            self.player.as_ref(),
            &self.cancel,
            self.settings.poll_interval,
            &on_phase,
        )?;
        Ok(Outcome::Sent {
            cancelled: routed.cancelled,
            route: routed.route,
        })
    }

    fn finish(self, result: ArtificerResult<Outcome>, outcome_tx: oneshot::Sender<ArtificerResult<Outcome>>) {
        match &result {
            Ok(outcome) => {
                info!("Run {} finished: {:?}", self.id, outcome);
                self.emit(PipelineEvent::Completed(outcome.clone()));
            }
            Err(e) => {
                error!("Run {} failed ({}): {e}", self.id, e.category());
                self.emit(PipelineEvent::Failed(e.clone()));
            }
        }
        self.stage(PipelineStage::Idle);
        if outcome_tx.send(result).is_err() {
            debug!("Run {} outcome dropped, handle already gone", self.id);
        }
    }
}
