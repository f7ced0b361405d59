//! Audio endpoints as reported by the OS and the backend seam that reports them.

use crate::error::ArtificerResult;
use serde::{Deserialize, Serialize};

/// Whether an endpoint records or plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Capture (microphones, cable outputs)
    Input,
    /// Playback (speakers, cable inputs)
    Output,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// An OS audio endpoint; only ever built from backend enumeration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceEndpoint {
    /// Opaque backend identifier
    pub id: String,
    /// Human-readable name
    pub friendly_name: String,
    /// Capture or playback
    pub direction: Direction,
}

impl DeviceEndpoint {
    /// Create an endpoint description
    #[must_use]
    pub fn new<I: Into<String>, N: Into<String>>(id: I, friendly_name: N, direction: Direction) -> Self {
        Self {
            id: id.into(),
            friendly_name: friendly_name.into(),
            direction,
        }
    }
}

impl std::fmt::Display for DeviceEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.friendly_name, self.id)
    }
}

/// Availability of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointState {
    /// Present and usable
    Active,
    /// Present but disabled by the user or system
    Disabled,
    /// Jack-detected device with nothing plugged in
    Unplugged,
}

/// An endpoint together with its availability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRecord {
    /// The endpoint
    pub endpoint: DeviceEndpoint,
    /// Its availability
    pub state: EndpointState,
}

impl EndpointRecord {
    /// An active endpoint
    #[must_use]
    pub const fn active(endpoint: DeviceEndpoint) -> Self {
        Self {
            endpoint,
            state: EndpointState::Active,
        }
    }

    /// Whether the endpoint is usable
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == EndpointState::Active
    }
}

/// OS-level access to audio endpoints and the default device
///
/// Calls may block on the OS; there is no timeout.
#[cfg_attr(test, mockall::automock)]
pub trait EndpointBackend: Send + Sync {
    /// Every endpoint in `direction`, whatever its state
    ///
    /// # Errors
    ///
    /// Returns `DeviceEnumerationError` if the OS cannot be queried
    fn list_endpoints(&self, direction: Direction) -> ArtificerResult<Vec<EndpointRecord>>;

    /// The current default endpoint in `direction`, if any
    ///
    /// # Errors
    ///
    /// Returns `DeviceEnumerationError` if the OS cannot be queried
    fn default_endpoint(&self, direction: Direction) -> ArtificerResult<Option<DeviceEndpoint>>;

    /// Make `endpoint` the default for its direction
    ///
    /// # Errors
    ///
    /// Returns an error if the OS rejects the change
    fn set_default_endpoint(&self, endpoint: &DeviceEndpoint) -> ArtificerResult<()>;
}
