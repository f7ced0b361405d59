//! `artificer` - render NPC dialogue with voice effects and route it into voice chat

use anyhow::{bail, Context, Result};
use artificer_core::{
    AppConfig, CpalPlayer, DeviceRoutingManager, EffectParameters, EndpointBackend, Outcome,
    PactlEndpoints, PiperSynthesizer, PipelineEvent, PipelineMode, PipelineOrchestrator,
    PipelineSettings, Player, ScratchSpace, SimulatedEndpoints, SimulatedPlayer, Submission,
    VoiceModelDiscovery,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "artificer", version)]
#[command(about = "Render NPC dialogue with voice effects and send it into voice chat", long_about = None)]
struct Cli {
    /// Configuration file path (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use in-memory audio devices and a silent player
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render a line and play it on the current output
    Preview {
        /// Text to speak
        text: String,
        #[command(flatten)]
        effects: EffectArgs,
    },
    /// Render a line to a WAV file
    Export {
        /// Text to speak
        text: String,
        /// Output file (defaults to a timestamped name in the exports directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        effects: EffectArgs,
    },
    /// Render a line and play it into the virtual cable; Ctrl-C stops playback
    Send {
        /// Text to speak
        text: String,
        #[command(flatten)]
        effects: EffectArgs,
    },
    /// List recording and playback devices
    Devices,
    /// Point the default microphone back at a real device
    EmergencyReset,
    /// Save the virtual cable device identifiers
    ConfigureCable {
        /// Recording device id of the cable's capture half
        #[arg(long)]
        capture: String,
        /// Playback device id of the cable's playback half
        #[arg(long)]
        playback: Option<String>,
    },
    /// List installed voice models
    Voices,
}

#[derive(Debug, Args)]
struct EffectArgs {
    /// Voice model by display name, file name or stem
    #[arg(long)]
    voice: Option<String>,
    /// Speech rate multiplier (0.5 to 2)
    #[arg(long, default_value_t = 1.0)]
    rate: f32,
    /// Pitch shift in semitones (-12 to 12)
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pitch: f32,
    /// Distortion drive in dB (0 to 20)
    #[arg(long, default_value_t = 0.0)]
    drive: f32,
    /// Ring modulator frequency in Hz (0 to 200)
    #[arg(long, default_value_t = 0.0)]
    ring: f32,
    /// Volume boost in dB (0 to 12)
    #[arg(long, default_value_t = 3.0)]
    volume: f32,
    /// Reverb wetness (0 to 1)
    #[arg(long, default_value_t = 0.3)]
    reverb: f32,
    /// Chorus depth (0 to 1)
    #[arg(long, default_value_t = 0.0)]
    chorus: f32,
    /// Echo delay in milliseconds (0 to 500)
    #[arg(long, default_value_t = 0.0)]
    delay: f32,
    /// Lowpass cutoff in Hz (1000 to 8000)
    #[arg(long, default_value_t = 8000.0)]
    lowpass: f32,
    /// Highpass cutoff in Hz (50 to 500)
    #[arg(long, default_value_t = 50.0)]
    highpass: f32,
    /// Pause between sentences in seconds
    #[arg(long, default_value_t = 0.2)]
    sentence_silence: f32,
}

impl EffectArgs {
    fn params(&self) -> EffectParameters {
        EffectParameters {
            speech_rate: self.rate,
            pitch_semitones: self.pitch,
            distortion_drive_db: self.drive,
            ring_mod_freq_hz: self.ring,
            volume_boost_db: self.volume,
            reverb_wetness: self.reverb,
            chorus_depth: self.chorus,
            delay_ms: self.delay,
            lowpass_cutoff_hz: self.lowpass,
            highpass_cutoff_hz: self.highpass,
            sentence_silence_s: self.sentence_silence,
        }
    }

    fn describe(&self) -> String {
        let p = self.params();
        format!(
            "rate {}, pitch {}, drive {}, ring {}, volume {}, reverb {}, chorus {}, delay {}, lowpass {}, highpass {}",
            p.speech_rate_label(),
            p.pitch_label(),
            p.distortion_label(),
            p.ring_mod_label(),
            p.volume_label(),
            p.reverb_label(),
            p.chorus_label(),
            p.delay_label(),
            p.lowpass_label(),
            p.highpass_label(),
        )
    }
}

/// Everything a command needs, built once from the config
struct App {
    config: AppConfig,
    config_path: Option<PathBuf>,
    backend: Arc<dyn EndpointBackend>,
    player: Arc<dyn Player>,
}

impl App {
    fn load(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => AppConfig::load_from(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => AppConfig::load_or_default().context("Failed to load config")?,
        };

        let (backend, player): (Arc<dyn EndpointBackend>, Arc<dyn Player>) = if cli.simulate {
            config
                .virtual_cable
                .capture_device
                .get_or_insert_with(|| "cable-output".to_string());
            (
                Arc::new(SimulatedEndpoints::demo()),
                Arc::new(SimulatedPlayer::new(Duration::from_secs(1))),
            )
        } else {
            (
                Arc::new(PactlEndpoints::default()),
                Arc::new(CpalPlayer::from_config(&config.playback)),
            )
        };

        Ok(Self {
            config,
            config_path: cli.config.clone(),
            backend,
            player,
        })
    }

    fn routing(&self) -> Arc<DeviceRoutingManager> {
        Arc::new(DeviceRoutingManager::new(
            Arc::clone(&self.backend),
            self.config.virtual_cable.clone(),
        ))
    }

    fn pipeline(&self, voice: Option<&str>) -> Result<PipelineOrchestrator> {
        let mut settings = PipelineSettings::from_config(&self.config);
        if let Some(query) = voice {
            let model = VoiceModelDiscovery::new(&self.config.synthesizer.models_dir).find(query)?;
            info!("Using voice {}", model.display_name);
            settings.model = Some(model.path);
        }

        Ok(PipelineOrchestrator::new(
            Arc::new(PiperSynthesizer::from_config(&self.config.synthesizer)),
            Arc::clone(&self.player),
            self.routing(),
            Arc::new(ScratchSpace::new(self.config.scratch_dir())),
            settings,
        ))
    }

    fn save_config(&self) -> Result<PathBuf> {
        let path = match &self.config_path {
            Some(path) => path.clone(),
            None => AppConfig::default_path()?,
        };
        self.config.save_to(&path)?;
        Ok(path)
    }
}

async fn render(app: &App, mode: PipelineMode, text: String, effects: &EffectArgs) -> Result<()> {
    let pipeline = app.pipeline(effects.voice.as_deref())?;
    info!("Rendering with {}", effects.describe());

    let handle = match pipeline.run(mode, text, effects.params())? {
        Submission::Started(handle) => handle,
        Submission::InProgress(domain) => {
            println!("A {domain} is already in progress");
            return Ok(());
        }
    };

    let cancel = handle.cancel_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancelling, restoring audio devices...");
            cancel.cancel();
        }
    });

    let events = handle.events().clone();
    let progress = tokio::task::spawn_blocking(move || {
        for event in events {
            match event {
                PipelineEvent::Stage(stage) => info!("{stage:?}"),
                PipelineEvent::Routing(phase) => info!("Routing: {phase}"),
                PipelineEvent::Completed(_) | PipelineEvent::Failed(_) => {}
            }
        }
    });

    let outcome = handle.outcome().await;
    ctrl_c.abort();
    progress.await.context("Progress reporter failed")?;
    let removed = pipeline.scratch().cleanup();
    info!("Removed {removed} temporary file(s)");

    match outcome? {
        Outcome::Previewed { path, opened_externally } => {
            if opened_externally {
                println!("Opened {} in the system player", path.display());
            } else {
                println!("Preview finished");
            }
        }
        Outcome::Exported { path } => println!("Saved {}", path.display()),
        Outcome::Sent { cancelled, route } => {
            let verb = if cancelled { "Cancelled" } else { "Sent" };
            println!(
                "{verb}; restored output {} and input {}",
                route.original_output, route.original_input
            );
        }
        Outcome::Cancelled => println!("Cancelled before sending"),
    }
    Ok(())
}

fn list_devices(app: &App) -> Result<()> {
    let routing = app.routing();
    let default_in = routing.current_default_input().ok();
    let default_out = routing.current_default_output().ok();

    println!("Recording devices:");
    for device in routing.enumerate_recording_devices()? {
        let marker = if default_in.as_ref() == Some(&device) { "*" } else { " " };
        println!(" {marker} {device}");
    }
    println!("Playback devices:");
    for device in routing.enumerate_playback_devices()? {
        let marker = if default_out.as_ref() == Some(&device) { "*" } else { " " };
        println!(" {marker} {device}");
    }

    match routing.resolve_virtual_cable_input() {
        Ok(cable) => println!("Virtual cable capture: {cable}"),
        Err(e) => println!("Virtual cable capture: {e}"),
    }
    match routing.resolve_virtual_cable_output() {
        Ok(cable) => println!("Virtual cable playback: {cable}"),
        Err(e) => println!("Virtual cable playback: {e}"),
    }
    Ok(())
}

fn configure_cable(mut app: App, capture: String, playback: Option<String>) -> Result<()> {
    let routing = app.routing();
    if !routing.enumerate_recording_devices()?.iter().any(|d| d.id == capture) {
        warn!("'{capture}' is not an active recording device right now");
    }
    app.config.virtual_cable.capture_device = Some(capture);
    app.config.virtual_cable.playback_device = playback;
    let path = app.save_config()?;
    println!("Saved virtual cable settings to {}", path.display());
    Ok(())
}

fn list_voices(app: &App) -> Result<()> {
    let discovery = VoiceModelDiscovery::new(&app.config.synthesizer.models_dir);
    let models = discovery.discover()?;
    if models.is_empty() {
        bail!("No voice models found in {}", discovery.models_dir().display());
    }
    let selected = app.config.model_path();
    for model in models {
        let marker = if selected.as_ref() == Some(&model.path) { "*" } else { " " };
        println!(" {marker} {}  ({})", model.display_name, model.path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "artificer=info,artificer_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let app = App::load(&cli)?;

    match cli.command {
        Commands::Preview { text, effects } => render(&app, PipelineMode::Preview, text, &effects).await,
        Commands::Export { text, output, effects } => {
            render(&app, PipelineMode::Export(output), text, &effects).await
        }
        Commands::Send { text, effects } => render(&app, PipelineMode::DiscordSend, text, &effects).await,
        Commands::Devices => list_devices(&app),
        Commands::EmergencyReset => {
            let device = app.routing().emergency_reset()?;
            println!("Default microphone set to {device}");
            Ok(())
        }
        Commands::ConfigureCable { capture, playback } => configure_cable(app, capture, playback),
        Commands::Voices => list_voices(&app),
    }
}
