//! Default audio device routing through a virtual cable.
//!
//! [`DeviceRoutingManager`] moves the OS default output onto the cable's
//! playback half and the default input onto its capture half, so a voice-chat
//! application reading the default microphone hears rendered speech. The
//! original defaults are always captured before anything is changed, and
//! restoration is the only way out of a routed session.
//!
//! Phases run `Idle → CapturingOriginals → Switching → Routed → Restoring → Idle`,
//! with `Cancelling` between `Routed` and `Restoring` when a send is cancelled.

pub mod endpoint;
pub mod pactl;
pub mod simulated;

pub use endpoint::{DeviceEndpoint, Direction, EndpointBackend, EndpointRecord, EndpointState};
pub use pactl::PactlEndpoints;
pub use simulated::SimulatedEndpoints;

use crate::config::VirtualCableConfig;
use crate::error::{ArtificerError, ArtificerResult};
use crate::pipeline::CancelToken;
use crate::playback::Player;
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Name fragment of the cable's playback half when no id is configured
pub const CABLE_PLAYBACK_NAME: &str = "CABLE Input";

/// Name fragments that mark a recording device as virtual
pub const VIRTUAL_DEVICE_KEYWORDS: &[&str] = &["cable", "virtual", "voicemeeter", "vb-audio", "vb audio"];

/// Whether `endpoint` looks like a virtual device
#[must_use]
pub fn is_virtual_device(endpoint: &DeviceEndpoint) -> bool {
    let name = endpoint.friendly_name.to_lowercase();
    let id = endpoint.id.to_lowercase();
    VIRTUAL_DEVICE_KEYWORDS
        .iter()
        .any(|keyword| name.contains(keyword) || id.contains(keyword))
}

/// Whether the OS defaults are currently changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    /// Defaults untouched, nothing captured
    Idle,
    /// Originals captured and the defaults may be half switched
    Indeterminate,
    /// Both defaults point at the cable
    Routed,
}

/// Progress of the routing state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingPhase {
    /// No routing operation running
    Idle,
    /// Reading the current defaults
    CapturingOriginals,
    /// Changing the defaults to the cable
    Switching,
    /// Defaults point at the cable
    Routed,
    /// Stopping routed playback after cancellation
    Cancelling,
    /// Putting the original defaults back
    Restoring,
    /// Some defaults still point at the cable; a restore is owed
    Indeterminate,
}

impl std::fmt::Display for RoutingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::CapturingOriginals => "capturing original devices",
            Self::Switching => "switching to virtual cable",
            Self::Routed => "routed",
            Self::Cancelling => "cancelling",
            Self::Restoring => "restoring original devices",
            Self::Indeterminate => "partially routed, restore needed",
        };
        f.write_str(label)
    }
}

/// Defaults to put back once routing ends
///
/// `mode == Routed` implies both originals are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingState {
    /// Default output before the switch
    pub original_output: Option<DeviceEndpoint>,
    /// Default input before the switch
    pub original_input: Option<DeviceEndpoint>,
    /// Current mode
    pub mode: RoutingMode,
}

impl Default for RoutingState {
    fn default() -> Self {
        Self {
            original_output: None,
            original_input: None,
            mode: RoutingMode::Idle,
        }
    }
}

/// Devices involved in an established route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    /// Cable playback half, now the default output
    pub cable_playback: DeviceEndpoint,
    /// Cable capture half, now the default input
    pub cable_capture: DeviceEndpoint,
    /// Output restored afterwards
    pub original_output: DeviceEndpoint,
    /// Input restored afterwards
    pub original_input: DeviceEndpoint,
}

/// Result of a routed playback that restored cleanly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedPlayback {
    /// Whether playback was cut short by cancellation
    pub cancelled: bool,
    /// The route that was used
    pub route: RouteInfo,
}

/// Owns the routing state machine over an endpoint backend
pub struct DeviceRoutingManager {
    backend: Arc<dyn EndpointBackend>,
    cable: RwLock<VirtualCableConfig>,
    state: Mutex<RoutingState>,
    phase: Mutex<RoutingPhase>,
}

impl std::fmt::Debug for DeviceRoutingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRoutingManager")
            .field("cable", &*self.cable.read())
            .field("state", &*self.state.lock())
            .field("phase", &*self.phase.lock())
            .finish_non_exhaustive()
    }
}

impl DeviceRoutingManager {
    /// Manager over `backend` with the persisted cable identifiers
    #[must_use]
    pub fn new(backend: Arc<dyn EndpointBackend>, cable: VirtualCableConfig) -> Self {
        Self {
            backend,
            cable: RwLock::new(cable),
            state: Mutex::new(RoutingState::default()),
            phase: Mutex::new(RoutingPhase::Idle),
        }
    }

    /// Replace the cable identifiers
    pub fn set_cable_config(&self, cable: VirtualCableConfig) {
        info!(
            "Virtual cable set to playback {:?}, capture {:?}",
            cable.playback_device, cable.capture_device
        );
        *self.cable.write() = cable;
    }

    /// Current cable identifiers
    #[must_use]
    pub fn cable_config(&self) -> VirtualCableConfig {
        self.cable.read().clone()
    }

    /// Snapshot of the routing state
    #[must_use]
    pub fn state(&self) -> RoutingState {
        self.state.lock().clone()
    }

    /// Current mode
    #[must_use]
    pub fn mode(&self) -> RoutingMode {
        self.state.lock().mode
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> RoutingPhase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: RoutingPhase, on_phase: &dyn Fn(RoutingPhase)) {
        *self.phase.lock() = phase;
        debug!("Routing phase: {phase}");
        on_phase(phase);
    }

    fn active_endpoints(&self, direction: Direction) -> ArtificerResult<Vec<DeviceEndpoint>> {
        Ok(self
            .backend
            .list_endpoints(direction)?
            .into_iter()
            .filter(EndpointRecord::is_active)
            .map(|r| r.endpoint)
            .collect())
    }

    /// Active capture endpoints
    ///
    /// # Errors
    ///
    /// Returns `DeviceEnumerationError` if the backend cannot be queried
    pub fn enumerate_recording_devices(&self) -> ArtificerResult<Vec<DeviceEndpoint>> {
        self.active_endpoints(Direction::Input)
    }

    /// Active playback endpoints
    ///
    /// # Errors
    ///
    /// Returns `DeviceEnumerationError` if the backend cannot be queried
    pub fn enumerate_playback_devices(&self) -> ArtificerResult<Vec<DeviceEndpoint>> {
        self.active_endpoints(Direction::Output)
    }

    fn current_default(&self, direction: Direction) -> ArtificerResult<DeviceEndpoint> {
        self.backend.default_endpoint(direction)?.ok_or_else(|| {
            ArtificerError::device_enumeration(format!("No default {direction} device is set"))
        })
    }

    /// Present default capture endpoint
    ///
    /// # Errors
    ///
    /// Returns `DeviceEnumerationError` if there is none or the backend fails
    pub fn current_default_input(&self) -> ArtificerResult<DeviceEndpoint> {
        self.current_default(Direction::Input)
    }

    /// Present default playback endpoint
    ///
    /// # Errors
    ///
    /// Returns `DeviceEnumerationError` if there is none or the backend fails
    pub fn current_default_output(&self) -> ArtificerResult<DeviceEndpoint> {
        self.current_default(Direction::Output)
    }

    /// The cable's playback half, by configured id or by name
    ///
    /// # Errors
    ///
    /// Returns `VirtualCableNotFound` if no matching active playback device exists
    pub fn resolve_virtual_cable_output(&self) -> ArtificerResult<DeviceEndpoint> {
        let configured = self.cable.read().playback_device.clone();
        let outputs = self.enumerate_playback_devices()?;

        if let Some(id) = configured {
            return outputs
                .into_iter()
                .find(|e| e.id == id)
                .ok_or_else(|| ArtificerError::cable_not_found("playback", format!("no active device with id '{id}'")));
        }

        let needle = CABLE_PLAYBACK_NAME.to_lowercase();
        outputs
            .into_iter()
            .find(|e| e.friendly_name.to_lowercase().contains(&needle))
            .ok_or_else(|| {
                ArtificerError::cable_not_found(
                    "playback",
                    format!("no active playback device named like '{CABLE_PLAYBACK_NAME}'"),
                )
            })
    }

    /// The cable's capture half, from the configured id only
    ///
    /// # Errors
    ///
    /// Returns `VirtualCableNotConfigured` if no id is saved and
    /// `VirtualCableNotFound` if the saved id is not an active recording device
    pub fn resolve_virtual_cable_input(&self) -> ArtificerResult<DeviceEndpoint> {
        let id = self
            .cable
            .read()
            .capture_device
            .clone()
            .ok_or(ArtificerError::VirtualCableNotConfigured)?;

        self.enumerate_recording_devices()?
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| ArtificerError::cable_not_found("capture", format!("no active device with id '{id}'")))
    }

    /// Capture both defaults, then point them at the cable
    ///
    /// # Errors
    ///
    /// Returns `DeviceSwitchError` with `partial == false` if nothing was
    /// changed and `partial == true` if the output switched but the input did
    /// not; in the partial case the originals stay captured for restoration
    pub fn switch_to_virtual_cable(&self) -> ArtificerResult<RouteInfo> {
        self.switch_with(&|_| {})
    }

    fn switch_with(&self, on_phase: &dyn Fn(RoutingPhase)) -> ArtificerResult<RouteInfo> {
        let mut state = self.state.lock();
        if state.mode != RoutingMode::Idle {
            return Err(ArtificerError::device_switch(
                "Audio devices are already routed to the virtual cable; restore them first",
            ));
        }

        self.set_phase(RoutingPhase::CapturingOriginals, on_phase);
        let captured = self.capture_originals();
        let (cable_playback, cable_capture, original_output, original_input) = match captured {
            Ok(devices) => devices,
            Err(e) => {
                self.set_phase(RoutingPhase::Idle, on_phase);
                return Err(e);
            }
        };
        info!(
            "Captured original devices: output {}, input {}",
            original_output, original_input
        );
        state.original_output = Some(original_output.clone());
        state.original_input = Some(original_input.clone());

        self.set_phase(RoutingPhase::Switching, on_phase);
        if let Err(e) = self.backend.set_default_endpoint(&cable_playback) {
            *state = RoutingState::default();
            self.set_phase(RoutingPhase::Idle, on_phase);
            warn!("Output switch failed, nothing changed: {e}");
            return Err(ArtificerError::device_switch(format!(
                "could not set default output to {cable_playback}: {e}"
            )));
        }
        state.mode = RoutingMode::Indeterminate;
        info!("Default output switched to {cable_playback}");

        if let Err(e) = self.backend.set_default_endpoint(&cable_capture) {
            self.set_phase(RoutingPhase::Indeterminate, on_phase);
            error!("Input switch failed after output switched: {e}");
            return Err(ArtificerError::partial_device_switch(format!(
                "default output moved to {cable_playback} but default input could not be set to {cable_capture}: {e}"
            )));
        }
        state.mode = RoutingMode::Routed;
        info!("Default input switched to {cable_capture}");
        self.set_phase(RoutingPhase::Routed, on_phase);

        Ok(RouteInfo {
            cable_playback,
            cable_capture,
            original_output,
            original_input,
        })
    }

    fn capture_originals(&self) -> ArtificerResult<(DeviceEndpoint, DeviceEndpoint, DeviceEndpoint, DeviceEndpoint)> {
        let cable_playback = self.resolve_virtual_cable_output()?;
        let cable_capture = self.resolve_virtual_cable_input()?;
        let original_output = self.current_default_output()?;
        let original_input = self.current_default_input()?;
        Ok((cable_playback, cable_capture, original_output, original_input))
    }

    /// Put the captured defaults back and clear the state
    ///
    /// # Errors
    ///
    /// Returns `NothingToRestore` without touching any device when nothing was
    /// captured, and a partial `DeviceSwitchError` if either default could not
    /// be restored, in which case the originals are kept for a retry
    pub fn restore_original_devices(&self) -> ArtificerResult<()> {
        self.restore_with(&|_| {})
    }

    fn restore_with(&self, on_phase: &dyn Fn(RoutingPhase)) -> ArtificerResult<()> {
        let mut state = self.state.lock();
        let (Some(output), Some(input)) = (state.original_output.clone(), state.original_input.clone()) else {
            return Err(ArtificerError::NothingToRestore);
        };
        if state.mode == RoutingMode::Idle {
            return Err(ArtificerError::NothingToRestore);
        }

        self.set_phase(RoutingPhase::Restoring, on_phase);
        let mut failures = Vec::new();
        for original in [&output, &input] {
            match self.backend.set_default_endpoint(original) {
                Ok(()) => info!("Restored default {} to {original}", original.direction),
                Err(e) => {
                    error!("Could not restore default {} to {original}: {e}", original.direction);
                    failures.push(format!("{original}: {e}"));
                }
            }
        }
        if failures.is_empty() {
            *state = RoutingState::default();
            self.set_phase(RoutingPhase::Idle, on_phase);
            Ok(())
        } else {
            state.mode = RoutingMode::Indeterminate;
            self.set_phase(RoutingPhase::Indeterminate, on_phase);
            Err(ArtificerError::partial_device_switch(format!(
                "could not restore {}",
                failures.join("; ")
            )))
        }
    }

    /// Make the first non-virtual recording device the default input
    ///
    /// If a switch left the default output on the cable, the captured output
    /// is put back too. The routing state is cleared only once that succeeds.
    ///
    /// # Errors
    ///
    /// Returns `NoRealDeviceFound` if every active recording device looks
    /// virtual, the backend's error if the input switch fails, or a partial
    /// `DeviceSwitchError` if the captured output could not be restored
    pub fn emergency_reset(&self) -> ArtificerResult<DeviceEndpoint> {
        let mut state = self.state.lock();
        let candidates = self.enumerate_recording_devices()?;
        let real = candidates
            .into_iter()
            .find(|e| !is_virtual_device(e))
            .ok_or(ArtificerError::NoRealDeviceFound)?;

        self.backend.set_default_endpoint(&real).map_err(|e| {
            ArtificerError::device_switch(format!("could not set default input to {real}: {e}"))
        })?;
        warn!("Emergency reset: default input set to {real}");

        if state.mode != RoutingMode::Idle {
            if let Some(output) = state.original_output.clone() {
                if let Err(e) = self.backend.set_default_endpoint(&output) {
                    state.mode = RoutingMode::Indeterminate;
                    *self.phase.lock() = RoutingPhase::Indeterminate;
                    error!("Emergency reset could not restore default output to {output}: {e}");
                    return Err(ArtificerError::partial_device_switch(format!(
                        "default input reset to {real} but default output could not be restored to {output}: {e}"
                    )));
                }
                warn!("Emergency reset: default output restored to {output}");
            }
        }
        *state = RoutingState::default();
        *self.phase.lock() = RoutingPhase::Idle;
        Ok(real)
    }

    /// Switch to the cable, play `wav`, and always restore
    ///
    /// `cancel` is polled every `poll_interval`; on cancellation playback is
    /// stopped immediately and restoration runs. If switching fails partway,
    /// restoration is attempted before the switch error is returned. When both
    /// playback and restoration fail, the restoration error is returned.
    ///
    /// # Errors
    ///
    /// Returns the switch, playback or restoration error
    pub fn play_routed(
        &self,
        wav: &Path,
        player: &dyn Player,
        cancel: &CancelToken,
        poll_interval: Duration,
        on_phase: &dyn Fn(RoutingPhase),
    ) -> ArtificerResult<RoutedPlayback> {
        let route = match self.switch_with(on_phase) {
            Ok(route) => route,
            Err(switch_err) => {
                if self.mode() == RoutingMode::Indeterminate {
                    if let Err(restore_err) = self.restore_with(on_phase) {
                        error!("Restore after partial switch failed: {restore_err}");
                    }
                }
                return Err(switch_err);
            }
        };

        let playback = self.play_until_done(wav, player, cancel, poll_interval, on_phase);
        let restored = self.restore_with(on_phase);

        match (playback, restored) {
            (Ok(cancelled), Ok(())) => Ok(RoutedPlayback { cancelled, route }),
            (Err(playback_err), Ok(())) => Err(playback_err),
            (Ok(_), Err(restore_err)) => Err(restore_err),
            (Err(playback_err), Err(restore_err)) => {
                error!("Routed playback failed before restore also failed: {playback_err}");
                Err(restore_err)
            }
        }
    }

    fn play_until_done(
        &self,
        wav: &Path,
        player: &dyn Player,
        cancel: &CancelToken,
        poll_interval: Duration,
        on_phase: &dyn Fn(RoutingPhase),
    ) -> ArtificerResult<bool> {
        if cancel.is_cancelled() {
            self.set_phase(RoutingPhase::Cancelling, on_phase);
            return Ok(true);
        }

        let mut handle = player.play(wav)?;
        info!("Routed playback of {} started", wav.display());
        loop {
            if cancel.is_cancelled() {
                self.set_phase(RoutingPhase::Cancelling, on_phase);
                handle.stop()?;
                info!("Routed playback cancelled");
                return Ok(true);
            }
            if handle.poll_finished()? {
                info!("Routed playback finished");
                return Ok(false);
            }
            std::thread::sleep(poll_interval);
        }
    }
}
