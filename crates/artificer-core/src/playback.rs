//! Playback of rendered WAV files through the default output device.
//!
//! [`Player`] starts playback and returns a [`PlaybackHandle`] that can be
//! polled and stopped. Routed sends rely on the default output having been
//! switched to the virtual cable before playback starts.

use crate::audio_buffer::AudioBuffer;
use crate::config::PlaybackConfig;
use crate::error::{ArtificerError, ArtificerResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// A playback in progress
pub trait PlaybackHandle: Send {
    /// `Ok(true)` once playback has ended normally
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError` if the player failed
    fn poll_finished(&mut self) -> ArtificerResult<bool>;

    /// Stop output immediately; a no-op if already finished
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError` if the player could not be stopped
    fn stop(&mut self) -> ArtificerResult<()>;
}

/// Something that can play a WAV file on the default output
pub trait Player: Send + Sync {
    /// Start playing `path`
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError` if playback cannot start
    fn play(&self, path: &Path) -> ArtificerResult<Box<dyn PlaybackHandle>>;
}

/// Block until `handle` finishes, polling every `interval`
///
/// # Errors
///
/// Returns the player's error if it fails
pub fn wait_until_finished(handle: &mut dyn PlaybackHandle, interval: Duration) -> ArtificerResult<()> {
    while !handle.poll_finished()? {
        std::thread::sleep(interval);
    }
    Ok(())
}

/// Open `path` with the operating system's default handler without waiting
///
/// # Errors
///
/// Returns `PlaybackError` if the opener cannot be spawned
pub fn open_with_system_default(path: &Path) -> ArtificerResult<()> {
    let mut cmd = if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", ""]);
        cmd
    } else if cfg!(target_os = "macos") {
        Command::new("open")
    } else {
        Command::new("xdg-open")
    };

    cmd.arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| info!("Opened {} with the system default player", path.display()))
        .map_err(|e| ArtificerError::playback(format!("Could not open {}: {e}", path.display())))
}

/// Plays files through a `cpal` output stream on the default output device
///
/// The device is looked up on every `play`, so a default output switched to
/// the virtual cable just before playback is honored. The stream lives on a
/// dedicated audio thread that owns it until the handle is stopped or dropped.
#[derive(Debug, Clone)]
pub struct CpalPlayer {
    volume: f32,
}

impl Default for CpalPlayer {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl CpalPlayer {
    /// Player scaling samples by `volume` (0 to 1)
    #[must_use]
    pub fn new(volume: f32) -> Self {
        Self {
            volume: volume.clamp(0.0, 1.0),
        }
    }

    /// Build from the `[playback]` config section
    #[must_use]
    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self::new(config.volume)
    }
}

impl Player for CpalPlayer {
    fn play(&self, path: &Path) -> ArtificerResult<Box<dyn PlaybackHandle>> {
        let audio = AudioBuffer::read_wav(path)?;
        let shared = Arc::new(StreamShared::default());
        let (ready_tx, ready_rx) = bounded::<ArtificerResult<()>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let thread_shared = Arc::clone(&shared);
        let volume = self.volume;
        let worker = std::thread::Builder::new()
            .name("artificer-playback".to_string())
            .spawn(move || match open_stream(audio, volume, thread_shared) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Returns on an explicit stop or when the handle is dropped
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| ArtificerError::playback(format!("Could not start audio thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                debug!("Playing {} on the default output", path.display());
                Ok(Box::new(StreamPlayback {
                    shared,
                    stop_tx: Some(stop_tx),
                    worker: Some(worker),
                }))
            }
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => Err(ArtificerError::playback("Audio thread exited before playback started")),
        }
    }
}

#[derive(Default)]
struct StreamShared {
    finished: AtomicBool,
    error: Mutex<Option<String>>,
}

fn open_stream(audio: AudioBuffer, volume: f32, shared: Arc<StreamShared>) -> ArtificerResult<Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| ArtificerError::playback("No default output device"))?;
    let supported = device
        .default_output_config()
        .map_err(|e| ArtificerError::playback(format!("No usable output config: {e}")))?;
    let format = supported.sample_format();
    let config = supported.config();

    let feed = Feed::new(audio, config.sample_rate, usize::from(config.channels), volume, Arc::clone(&shared));
    debug!(
        "Output stream: {} channel(s) at {} Hz, {:?}",
        config.channels, config.sample_rate, format
    );

    match format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, feed, shared),
        SampleFormat::I16 => build_stream::<i16>(&device, &config, feed, shared),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, feed, shared),
        SampleFormat::I32 => build_stream::<i32>(&device, &config, feed, shared),
        other => Err(ArtificerError::playback(format!("Unsupported output sample format {other:?}"))),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut feed: Feed,
    shared: Arc<StreamShared>,
) -> ArtificerResult<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| feed.fill(data),
            move |err: cpal::StreamError| {
                error!("Audio stream error: {err}");
                *shared.error.lock() = Some(err.to_string());
            },
            None,
        )
        .map_err(|e| ArtificerError::playback(format!("Could not build output stream: {e}")))?;
    stream
        .play()
        .map_err(|e| ArtificerError::playback(format!("Could not start output stream: {e}")))?;
    Ok(stream)
}

/// Mono source spread over the device's channels at the device's rate
///
/// Rate conversion picks the nearest earlier source sample. `finished` is set
/// one callback after the last sample went out so the device drains its tail.
struct Feed {
    samples: Vec<f32>,
    cursor: f64,
    step: f64,
    channels: usize,
    volume: f32,
    exhausted: bool,
    shared: Arc<StreamShared>,
}

impl Feed {
    fn new(audio: AudioBuffer, device_rate: u32, channels: usize, volume: f32, shared: Arc<StreamShared>) -> Self {
        let step = f64::from(audio.sample_rate()) / f64::from(device_rate.max(1));
        Self {
            samples: audio.into_samples(),
            cursor: 0.0,
            step,
            channels: channels.max(1),
            volume,
            exhausted: false,
            shared,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn fill<T: Sample + FromSample<f32>>(&mut self, data: &mut [T]) {
        if self.exhausted {
            self.shared.finished.store(true, Ordering::Release);
        }
        for frame in data.chunks_mut(self.channels) {
            let value = match self.samples.get(self.cursor as usize) {
                Some(sample) => {
                    self.cursor += self.step;
                    sample * self.volume
                }
                None => 0.0,
            };
            frame.fill(T::from_sample(value));
        }
        if self.cursor as usize >= self.samples.len() {
            self.exhausted = true;
        }
    }
}

struct StreamPlayback {
    shared: Arc<StreamShared>,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl PlaybackHandle for StreamPlayback {
    fn poll_finished(&mut self) -> ArtificerResult<bool> {
        if let Some(message) = self.shared.error.lock().take() {
            return Err(ArtificerError::playback(message));
        }
        Ok(self.stop_tx.is_none() || self.shared.finished.load(Ordering::Acquire))
    }

    fn stop(&mut self) -> ArtificerResult<()> {
        // Dropping the sender wakes the audio thread, which drops the stream
        if self.stop_tx.take().is_none() {
            return Ok(());
        }
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| ArtificerError::playback("Audio thread panicked"))?;
        }
        debug!("Output stream closed");
        Ok(())
    }
}

impl Drop for StreamPlayback {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("{e}");
        }
    }
}

/// In-memory player that "plays" for a fixed duration
///
/// Used with simulated devices and in tests.
#[derive(Debug, Clone)]
pub struct SimulatedPlayer {
    duration: Duration,
    fail_to_start: bool,
    fail_during_playback: bool,
    played: Arc<Mutex<Vec<PathBuf>>>,
    stops: Arc<AtomicUsize>,
}

impl SimulatedPlayer {
    /// Player whose playbacks last `duration`
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            fail_to_start: false,
            fail_during_playback: false,
            played: Arc::new(Mutex::new(Vec::new())),
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Player whose `play` always fails
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_to_start: true,
            ..Self::new(Duration::ZERO)
        }
    }

    /// Player that starts but reports an error when polled
    #[must_use]
    pub fn failing_during_playback() -> Self {
        Self {
            fail_during_playback: true,
            ..Self::new(Duration::ZERO)
        }
    }

    /// Files passed to `play`, in order
    #[must_use]
    pub fn played(&self) -> Vec<PathBuf> {
        self.played.lock().clone()
    }

    /// Number of playbacks stopped before they finished
    #[must_use]
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Player for SimulatedPlayer {
    fn play(&self, path: &Path) -> ArtificerResult<Box<dyn PlaybackHandle>> {
        if self.fail_to_start {
            return Err(ArtificerError::playback("Simulated player refused to start"));
        }
        self.played.lock().push(path.to_path_buf());
        Ok(Box::new(TimedPlayback {
            ends_at: Instant::now() + self.duration,
            fail: self.fail_during_playback,
            stopped: false,
            stops: Arc::clone(&self.stops),
        }))
    }
}

struct TimedPlayback {
    ends_at: Instant,
    fail: bool,
    stopped: bool,
    stops: Arc<AtomicUsize>,
}

impl PlaybackHandle for TimedPlayback {
    fn poll_finished(&mut self) -> ArtificerResult<bool> {
        if self.fail {
            return Err(ArtificerError::playback("Simulated playback failure"));
        }
        Ok(self.stopped || Instant::now() >= self.ends_at)
    }

    fn stop(&mut self) -> ArtificerResult<()> {
        if !self.stopped && Instant::now() < self.ends_at {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
        self.stopped = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_player_finishes() {
        let player = SimulatedPlayer::new(Duration::from_millis(20));
        let mut handle = player.play(Path::new("a.wav")).unwrap();
        assert!(!handle.poll_finished().unwrap());
        wait_until_finished(handle.as_mut(), Duration::from_millis(5)).unwrap();
        assert_eq!(player.played(), vec![PathBuf::from("a.wav")]);
        assert_eq!(player.stop_count(), 0);
    }

    #[test]
    fn test_simulated_player_stop() {
        let player = SimulatedPlayer::new(Duration::from_secs(60));
        let mut handle = player.play(Path::new("a.wav")).unwrap();
        handle.stop().unwrap();
        assert!(handle.poll_finished().unwrap());
        assert_eq!(player.stop_count(), 1);
    }

    #[test]
    fn test_simulated_failures() {
        assert!(SimulatedPlayer::failing().play(Path::new("a.wav")).is_err());

        let player = SimulatedPlayer::failing_during_playback();
        let mut handle = player.play(Path::new("a.wav")).unwrap();
        assert!(matches!(
            handle.poll_finished().unwrap_err(),
            ArtificerError::PlaybackError { .. }
        ));
    }

    fn mono_feed(samples: Vec<f32>, source_rate: u32, device_rate: u32, channels: usize) -> (Feed, Arc<StreamShared>) {
        let shared = Arc::new(StreamShared::default());
        let audio = AudioBuffer::new(samples, source_rate).unwrap();
        (Feed::new(audio, device_rate, channels, 1.0, Arc::clone(&shared)), shared)
    }

    #[test]
    fn test_feed_spreads_mono_over_channels() {
        let (mut feed, shared) = mono_feed(vec![0.5, -0.5], 22_050, 22_050, 2);
        let mut out = [1.0_f32; 6];
        feed.fill(&mut out);
        assert_eq!(out, [0.5, 0.5, -0.5, -0.5, 0.0, 0.0]);
        assert!(!shared.finished.load(Ordering::Acquire));

        // Finished only after a callback of silence has gone out
        feed.fill(&mut out);
        assert_eq!(out, [0.0; 6]);
        assert!(shared.finished.load(Ordering::Acquire));
    }

    #[test]
    fn test_feed_converts_rate() {
        let (mut up, _) = mono_feed(vec![0.1, 0.2, 0.3], 22_050, 44_100, 1);
        let mut out = [0.0_f32; 6];
        up.fill(&mut out);
        assert_eq!(out, [0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);

        let (mut down, _) = mono_feed(vec![0.1, 0.2, 0.3, 0.4], 44_100, 22_050, 1);
        let mut out = [0.0_f32; 2];
        down.fill(&mut out);
        assert_eq!(out, [0.1, 0.3]);
    }

    #[test]
    fn test_feed_integer_output_and_volume() {
        let shared = Arc::new(StreamShared::default());
        let audio = AudioBuffer::new(vec![1.0, -1.0], 16_000).unwrap();
        let mut feed = Feed::new(audio, 16_000, 1, 0.5, shared);
        let mut out = [0_i16; 2];
        feed.fill(&mut out);
        assert!((i32::from(out[0]) - 16_384).abs() <= 1, "{out:?}");
        assert!((i32::from(out[1]) + 16_384).abs() <= 1, "{out:?}");
    }

    #[test]
    fn test_stream_error_fails_poll() {
        let shared = Arc::new(StreamShared::default());
        *shared.error.lock() = Some("device unplugged".to_string());
        let (stop_tx, _stop_rx) = bounded(1);
        let mut handle = StreamPlayback {
            shared,
            stop_tx: Some(stop_tx),
            worker: None,
        };
        assert!(matches!(
            handle.poll_finished().unwrap_err(),
            ArtificerError::PlaybackError { .. }
        ));
        handle.stop().unwrap();
        assert!(handle.poll_finished().unwrap());
    }

    #[test]
    fn test_cpal_player_reads_file_before_opening_device() {
        let err = CpalPlayer::default().play(Path::new("/nonexistent/dir/line.wav")).err().unwrap();
        assert!(matches!(err, ArtificerError::FileError { .. }));
    }

    #[test]
    fn test_cpal_player_clamps_volume() {
        assert_eq!(CpalPlayer::new(3.0).volume, 1.0);
        assert_eq!(CpalPlayer::from_config(&PlaybackConfig { volume: 0.25 }).volume, 0.25);
    }
}
