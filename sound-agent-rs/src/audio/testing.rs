//! Scripted gateway double used by the unit tests.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use super::device::{AudioError, DeviceFlow};
use super::gateway::{EndpointDescriptor, EndpointFormFactor, EndpointGateway};

#[derive(Default)]
struct MockState {
    endpoints: Vec<EndpointDescriptor>,
    default_render_id: Option<String>,
    default_capture_id: Option<String>,
    fail_enumeration: bool,
    active_watches: BTreeSet<String>,
    unregister_log: Vec<String>,
}

/// In-memory [`EndpointGateway`] with a scriptable endpoint set, failure
/// injection, and a record of every watch (de)registration.
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_render(&self, device_id: &str, pnp_id: &str, name: &str, volume_scalar: f32) {
        self.push_endpoint(descriptor(
            device_id,
            pnp_id,
            name,
            DeviceFlow::Render,
            EndpointFormFactor::Speakers,
            volume_scalar,
        ));
    }

    pub fn push_capture(&self, device_id: &str, pnp_id: &str, name: &str, volume_scalar: f32) {
        self.push_endpoint(descriptor(
            device_id,
            pnp_id,
            name,
            DeviceFlow::Capture,
            EndpointFormFactor::Microphone,
            volume_scalar,
        ));
    }

    pub fn push_endpoint(&self, endpoint: EndpointDescriptor) {
        self.lock().endpoints.push(endpoint);
    }

    /// Drop an endpoint from the scripted set, as if it were unplugged.
    pub fn remove_endpoint(&self, device_id: &str) {
        self.lock()
            .endpoints
            .retain(|endpoint| endpoint.device_id != device_id);
    }

    pub fn set_form_factor(&self, device_id: &str, form_factor: EndpointFormFactor) {
        for endpoint in &mut self.lock().endpoints {
            if endpoint.device_id == device_id {
                endpoint.form_factor = form_factor;
            }
        }
    }

    pub fn set_volume_scalar(&self, device_id: &str, volume_scalar: f32) {
        for endpoint in &mut self.lock().endpoints {
            if endpoint.device_id == device_id {
                endpoint.volume_scalar = volume_scalar;
            }
        }
    }

    pub fn set_muted(&self, device_id: &str, is_muted: bool) {
        for endpoint in &mut self.lock().endpoints {
            if endpoint.device_id == device_id {
                endpoint.is_muted = is_muted;
            }
        }
    }

    pub fn set_default_render_id(&self, device_id: Option<&str>) {
        self.lock().default_render_id = device_id.map(str::to_owned);
    }

    pub fn set_default_capture_id(&self, device_id: Option<&str>) {
        self.lock().default_capture_id = device_id.map(str::to_owned);
    }

    pub fn set_fail_enumeration(&self, fail: bool) {
        self.lock().fail_enumeration = fail;
    }

    pub fn active_watch_count(&self) -> usize {
        self.lock().active_watches.len()
    }

    pub fn is_watched(&self, device_id: &str) -> bool {
        self.lock().active_watches.contains(device_id)
    }

    pub fn unregister_log(&self) -> Vec<String> {
        self.lock().unregister_log.clone()
    }
}

impl EndpointGateway for MockGateway {
    fn enumerate_endpoints(&self) -> Result<Vec<EndpointDescriptor>, AudioError> {
        let state = self.lock();
        if state.fail_enumeration {
            return Err(AudioError::EnumerationFailed {
                reason: "scripted failure".to_string(),
            });
        }
        Ok(state.endpoints.clone())
    }

    fn endpoint_by_id(&self, device_id: &str) -> Result<EndpointDescriptor, AudioError> {
        self.lock()
            .endpoints
            .iter()
            .find(|endpoint| endpoint.device_id == device_id)
            .cloned()
            .ok_or_else(|| AudioError::ResolutionFailed {
                device_id: device_id.to_string(),
                reason: "not in the scripted set".to_string(),
            })
    }

    fn default_endpoint_id(&self, flow: DeviceFlow) -> Option<String> {
        let state = self.lock();
        match flow {
            DeviceFlow::Render => state.default_render_id.clone(),
            DeviceFlow::Capture => state.default_capture_id.clone(),
            _ => None,
        }
    }

    fn register_volume_watch(&self, device_id: &str) -> Result<(), AudioError> {
        self.lock().active_watches.insert(device_id.to_string());
        Ok(())
    }

    fn unregister_volume_watch(&self, device_id: &str) {
        let mut state = self.lock();
        state.active_watches.remove(device_id);
        state.unregister_log.push(device_id.to_string());
    }
}

pub fn descriptor(
    device_id: &str,
    pnp_id: &str,
    name: &str,
    flow: DeviceFlow,
    form_factor: EndpointFormFactor,
    volume_scalar: f32,
) -> EndpointDescriptor {
    EndpointDescriptor {
        device_id: device_id.to_string(),
        flow,
        name: name.to_string(),
        form_factor,
        pnp_id: pnp_id.to_string(),
        is_muted: false,
        volume_scalar,
    }
}
