//! In-memory endpoint backend.
//!
//! Holds a fixed device list and default devices, with switch failures that
//! can be injected per endpoint. Used in tests and where no OS backend exists.

use super::endpoint::{DeviceEndpoint, Direction, EndpointBackend, EndpointRecord, EndpointState};
use crate::error::{ArtificerError, ArtificerResult};
use parking_lot::Mutex;
use std::collections::HashSet;

#[derive(Debug, Default)]
struct SimulatedState {
    endpoints: Vec<EndpointRecord>,
    default_output: Option<String>,
    default_input: Option<String>,
    failing_ids: HashSet<String>,
    enumeration_fails: bool,
    set_calls: Vec<DeviceEndpoint>,
}

/// Endpoint backend backed by a mutable in-memory device table
#[derive(Debug, Default)]
pub struct SimulatedEndpoints {
    state: Mutex<SimulatedState>,
}

impl SimulatedEndpoints {
    /// Empty device table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Speakers, a headset microphone and a VB-Audio style cable, defaults on the real devices
    #[must_use]
    pub fn demo() -> Self {
        Self::new()
            .with_output("speakers", "Speakers")
            .with_output("cable-input", "CABLE Input (VB-Audio Virtual Cable)")
            .with_input("headset-mic", "Headset Mic")
            .with_input("cable-output", "CABLE Output (VB-Audio Virtual Cable)")
            .with_defaults("speakers", "headset-mic")
    }

    fn with_record(self, id: &str, name: &str, direction: Direction, state: EndpointState) -> Self {
        self.state.lock().endpoints.push(EndpointRecord {
            endpoint: DeviceEndpoint::new(id, name, direction),
            state,
        });
        self
    }

    /// Add an active playback endpoint
    #[must_use]
    pub fn with_output(self, id: &str, name: &str) -> Self {
        self.with_record(id, name, Direction::Output, EndpointState::Active)
    }

    /// Add an active capture endpoint
    #[must_use]
    pub fn with_input(self, id: &str, name: &str) -> Self {
        self.with_record(id, name, Direction::Input, EndpointState::Active)
    }

    /// Add a capture endpoint in a non-active state
    #[must_use]
    pub fn with_inactive_input(self, id: &str, name: &str, state: EndpointState) -> Self {
        self.with_record(id, name, Direction::Input, state)
    }

    /// Set the default output and input ids
    #[must_use]
    pub fn with_defaults(self, output_id: &str, input_id: &str) -> Self {
        {
            let mut state = self.state.lock();
            state.default_output = Some(output_id.to_string());
            state.default_input = Some(input_id.to_string());
        }
        self
    }

    /// Make every future switch to `id` fail
    pub fn fail_switching_to(&self, id: &str) {
        self.state.lock().failing_ids.insert(id.to_string());
    }

    /// Let switches to `id` succeed again
    pub fn allow_switching_to(&self, id: &str) {
        self.state.lock().failing_ids.remove(id);
    }

    /// Make enumeration fail or succeed
    pub fn set_enumeration_fails(&self, fails: bool) {
        self.state.lock().enumeration_fails = fails;
    }

    /// Current default id in `direction`
    #[must_use]
    pub fn default_id(&self, direction: Direction) -> Option<String> {
        let state = self.state.lock();
        match direction {
            Direction::Output => state.default_output.clone(),
            Direction::Input => state.default_input.clone(),
        }
    }

    /// Every successful `set_default_endpoint` call, in order
    #[must_use]
    pub fn set_calls(&self) -> Vec<DeviceEndpoint> {
        self.state.lock().set_calls.clone()
    }
}

impl EndpointBackend for SimulatedEndpoints {
    fn list_endpoints(&self, direction: Direction) -> ArtificerResult<Vec<EndpointRecord>> {
        let state = self.state.lock();
        if state.enumeration_fails {
            return Err(ArtificerError::device_enumeration("Simulated enumeration failure"));
        }
        Ok(state
            .endpoints
            .iter()
            .filter(|r| r.endpoint.direction == direction)
            .cloned()
            .collect())
    }

    fn default_endpoint(&self, direction: Direction) -> ArtificerResult<Option<DeviceEndpoint>> {
        let state = self.state.lock();
        if state.enumeration_fails {
            return Err(ArtificerError::device_enumeration("Simulated enumeration failure"));
        }
        let id = match direction {
            Direction::Output => state.default_output.as_deref(),
            Direction::Input => state.default_input.as_deref(),
        };
        Ok(id.and_then(|id| {
            state
                .endpoints
                .iter()
                .find(|r| r.endpoint.direction == direction && r.endpoint.id == id)
                .map(|r| r.endpoint.clone())
        }))
    }

    fn set_default_endpoint(&self, endpoint: &DeviceEndpoint) -> ArtificerResult<()> {
        let mut state = self.state.lock();
        if state.failing_ids.contains(&endpoint.id) {
            return Err(ArtificerError::device_switch(format!(
                "Simulated failure switching to {}",
                endpoint.id
            )));
        }
        let known = state
            .endpoints
            .iter()
            .any(|r| r.is_active() && r.endpoint.direction == endpoint.direction && r.endpoint.id == endpoint.id);
        if !known {
            return Err(ArtificerError::device_not_found(endpoint.id.clone()));
        }

        match endpoint.direction {
            Direction::Output => state.default_output = Some(endpoint.id.clone()),
            Direction::Input => state.default_input = Some(endpoint.id.clone()),
        }
        state.set_calls.push(endpoint.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_defaults() {
        let backend = SimulatedEndpoints::demo();
        assert_eq!(
            backend.default_endpoint(Direction::Output).unwrap().unwrap().id,
            "speakers"
        );
        assert_eq!(backend.list_endpoints(Direction::Input).unwrap().len(), 2);
    }

    #[test]
    fn test_set_default() {
        let backend = SimulatedEndpoints::demo();
        let cable = DeviceEndpoint::new("cable-output", "CABLE Output", Direction::Input);
        backend.set_default_endpoint(&cable).unwrap();
        assert_eq!(backend.default_id(Direction::Input).as_deref(), Some("cable-output"));
        assert_eq!(backend.set_calls(), vec![cable]);
    }

    #[test]
    fn test_unknown_endpoint_rejected() {
        let backend = SimulatedEndpoints::demo();
        let ghost = DeviceEndpoint::new("ghost", "Ghost", Direction::Input);
        assert!(matches!(
            backend.set_default_endpoint(&ghost).unwrap_err(),
            ArtificerError::DeviceNotFound { .. }
        ));
    }

    #[test]
    fn test_injected_failures() {
        let backend = SimulatedEndpoints::demo();
        backend.fail_switching_to("speakers");
        let speakers = DeviceEndpoint::new("speakers", "Speakers", Direction::Output);
        assert!(backend.set_default_endpoint(&speakers).is_err());
        backend.allow_switching_to("speakers");
        assert!(backend.set_default_endpoint(&speakers).is_ok());

        backend.set_enumeration_fails(true);
        assert!(backend.list_endpoints(Direction::Output).is_err());
    }
}
