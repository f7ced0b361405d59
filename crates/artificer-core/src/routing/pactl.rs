//! PulseAudio / PipeWire endpoint backend driving the `pactl` tool.
//!
//! Sinks are playback endpoints and sources are capture endpoints. Listings
//! are read as JSON (`pactl --format=json`, PulseAudio 16 or PipeWire).
//! Monitor sources are not recording devices and are skipped.

use super::endpoint::{DeviceEndpoint, Direction, EndpointBackend, EndpointRecord, EndpointState};
use crate::error::{ArtificerError, ArtificerResult};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::{Command, Output};
use tracing::debug;

/// Endpoint backend for PulseAudio-compatible sound servers
#[derive(Debug, Clone)]
pub struct PactlEndpoints {
    program: PathBuf,
}

impl Default for PactlEndpoints {
    fn default() -> Self {
        Self::new("pactl")
    }
}

impl PactlEndpoints {
    /// Backend invoking `program`
    #[must_use]
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[&str]) -> std::io::Result<Output> {
        debug!("Running {} {}", self.program.display(), args.join(" "));
        // Force untranslated field names
        Command::new(&self.program).env("LC_ALL", "C").args(args).output()
    }

    fn query(&self, args: &[&str]) -> ArtificerResult<String> {
        let output = self.run(args).map_err(|e| {
            ArtificerError::device_enumeration(format!("Could not run {}: {e}", self.program.display()))
        })?;
        if !output.status.success() {
            return Err(ArtificerError::device_enumeration(format!(
                "{} {} failed: {}",
                self.program.display(),
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    const fn list_kind(direction: Direction) -> &'static str {
        match direction {
            Direction::Output => "sinks",
            Direction::Input => "sources",
        }
    }

    const fn default_kind(direction: Direction) -> &'static str {
        match direction {
            Direction::Output => "sink",
            Direction::Input => "source",
        }
    }
}

impl EndpointBackend for PactlEndpoints {
    fn list_endpoints(&self, direction: Direction) -> ArtificerResult<Vec<EndpointRecord>> {
        let listing = self.query(&["--format=json", "list", Self::list_kind(direction)])?;
        parse_list(&listing, direction)
    }

    fn default_endpoint(&self, direction: Direction) -> ArtificerResult<Option<DeviceEndpoint>> {
        let command = format!("get-default-{}", Self::default_kind(direction));
        let id = self.query(&[command.as_str()])?.trim().to_string();
        if id.is_empty() {
            return Ok(None);
        }

        let known = self
            .list_endpoints(direction)?
            .into_iter()
            .map(|r| r.endpoint)
            .find(|e| e.id == id);
        Ok(Some(known.unwrap_or_else(|| DeviceEndpoint::new(id.clone(), id, direction))))
    }

    fn set_default_endpoint(&self, endpoint: &DeviceEndpoint) -> ArtificerResult<()> {
        let command = format!("set-default-{}", Self::default_kind(endpoint.direction));
        let output = self.run(&[command.as_str(), endpoint.id.as_str()]).map_err(|e| {
            ArtificerError::device_switch(format!("Could not run {}: {e}", self.program.display()))
        })?;
        if !output.status.success() {
            return Err(ArtificerError::device_switch(format!(
                "{command} {} failed: {}",
                endpoint.id,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// One entry of `pactl --format=json list sinks|sources`
#[derive(Debug, Deserialize)]
struct PactlDevice {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    monitor_of_sink: Option<String>,
}

impl PactlDevice {
    fn is_monitor(&self) -> bool {
        self.monitor_of_sink.as_deref().is_some_and(|sink| sink != "n/a")
    }

    fn into_record(self, direction: Direction) -> EndpointRecord {
        let state = match self.state.as_deref().map(str::to_ascii_uppercase).as_deref() {
            Some("RUNNING" | "IDLE" | "SUSPENDED") | None => EndpointState::Active,
            Some(_) => EndpointState::Disabled,
        };
        let friendly = self.description.unwrap_or_else(|| self.name.clone());
        EndpointRecord {
            endpoint: DeviceEndpoint::new(self.name, friendly, direction),
            state,
        }
    }
}

/// Parse `pactl --format=json list sinks|sources` output
///
/// # Errors
///
/// Returns `DeviceEnumerationError` if the listing is not the expected JSON
pub fn parse_list(listing: &str, direction: Direction) -> ArtificerResult<Vec<EndpointRecord>> {
    if listing.trim().is_empty() {
        return Ok(Vec::new());
    }
    let devices: Vec<PactlDevice> = serde_json::from_str(listing).map_err(|e| {
        ArtificerError::device_enumeration(format!("Unexpected pactl {direction} listing: {e}"))
    })?;
    Ok(devices
        .into_iter()
        .filter(|device| !device.is_monitor())
        .map(|device| device.into_record(direction))
        .collect())
}
