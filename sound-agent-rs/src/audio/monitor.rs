//! Monitoring session facade.
//!
//! One [`DeviceMonitor`] per monitoring session: an explicit handle object
//! owning the registry, the observer set, and the session lock. The
//! platform subsystem delivers notifications on threads it owns without
//! serialization between them, so every registry access goes through one
//! exclusive lock; observer fan-out happens after the lock is released so
//! observers may re-enter the read-only accessors.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use super::device::{AudioDevice, AudioError, DeviceEvent};
use super::gateway::EndpointGateway;
use super::observers::{DeviceObserver, ObserverHub};
use super::registry::DeviceRegistry;
use super::translator::EventTranslator;

struct MonitorState {
    registry: DeviceRegistry,
    observers: ObserverHub,
    shut_down: bool,
}

pub struct DeviceMonitor {
    gateway: Arc<dyn EndpointGateway>,
    state: Mutex<MonitorState>,
}

impl DeviceMonitor {
    pub fn new(gateway: Arc<dyn EndpointGateway>) -> Self {
        Self {
            gateway,
            state: Mutex::new(MonitorState {
                registry: DeviceRegistry::new(),
                observers: ObserverHub::new(),
                shut_down: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Full re-enumeration; see [`DeviceRegistry::reset_content`].
    ///
    /// Must not run concurrently with notification handling; the session
    /// lock serializes the two.
    pub fn reset_content(&self) -> Result<(), AudioError> {
        let mut state = self.lock();
        if state.shut_down {
            warn!("reset ignored, the monitoring session is shut down");
            return Ok(());
        }
        state.registry.reset_content(self.gateway.as_ref())
    }

    pub fn subscribe(&self, observer: Arc<dyn DeviceObserver>) {
        self.lock().observers.subscribe(observer);
    }

    pub fn unsubscribe(&self, observer: &Arc<dyn DeviceObserver>) {
        self.lock().observers.unsubscribe(observer);
    }

    pub fn device_count(&self) -> usize {
        self.lock().registry.len()
    }

    /// Device at a stable positional index.
    pub fn device_at(&self, index: usize) -> Result<AudioDevice, AudioError> {
        self.lock().registry.device_at(index)
    }

    /// Device by physical identity, if known.
    pub fn device_by_pnp_id(&self, pnp_id: &str) -> Option<AudioDevice> {
        self.lock().registry.device_by_pnp_id(pnp_id)
    }

    /// All devices in identity order.
    pub fn snapshot(&self) -> Vec<AudioDevice> {
        self.lock().registry.device_list()
    }

    pub fn default_render_pnp_id(&self) -> Option<String> {
        self.lock().registry.default_render_pnp_id().map(str::to_owned)
    }

    pub fn default_capture_pnp_id(&self) -> Option<String> {
        self.lock().registry.default_capture_pnp_id().map(str::to_owned)
    }

    /// Current default render device; absent when no default identity is
    /// set or the identity is no longer in the registry.
    pub fn default_render(&self) -> Option<AudioDevice> {
        let state = self.lock();
        let pnp_id = state.registry.default_render_pnp_id()?;
        state.registry.device_by_pnp_id(pnp_id)
    }

    /// Current default capture device; same absence rules as
    /// [`Self::default_render`].
    pub fn default_capture(&self) -> Option<AudioDevice> {
        let state = self.lock();
        let pnp_id = state.registry.default_capture_pnp_id()?;
        state.registry.device_by_pnp_id(pnp_id)
    }

    /// Apply one raw platform notification and fan the resulting semantic
    /// events out to the subscribers.
    ///
    /// Runs on the delivering thread. The registry mutation happens under
    /// the session lock; the observer callbacks run after it is released.
    pub fn handle_event(&self, event: DeviceEvent) {
        let (changes, observers) = {
            let mut state = self.lock();
            if state.shut_down {
                return;
            }
            let changes =
                EventTranslator::translate(&mut state.registry, self.gateway.as_ref(), event);
            if changes.is_empty() {
                return;
            }
            (changes, state.observers.snapshot())
        };

        for change in &changes {
            for observer in &observers {
                observer.on_device_change(change);
            }
        }
    }

    /// Tear the session down: release every volume watch and clear all
    /// registry and observer state. Idempotent and terminal; events
    /// arriving afterwards are ignored.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if state.shut_down {
            return;
        }
        for device_id in state.registry.watched_device_ids() {
            self.gateway.unregister_volume_watch(&device_id);
        }
        state.registry.clear_all();
        state.observers.clear();
        state.shut_down = true;
        info!("monitoring session shut down");
    }
}
