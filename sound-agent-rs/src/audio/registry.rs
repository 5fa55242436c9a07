//! Canonical device registry.
//!
//! Owns the pnp-id → device mapping, the merge/unmerge reconciliation
//! rules for logical endpoints sharing one physical identity, the current
//! default identities, and the volume-watch bookkeeping.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use super::device::{AudioDevice, AudioError, DeviceFlow};
use super::gateway::EndpointGateway;
use super::policy;

/// Separator joining the name fragments of a merged device.
pub const NAME_SEPARATOR: char = '/';

/// Ordered identity → device map; ordering keeps positional access and
/// re-enumeration deterministic.
pub type DeviceMap = BTreeMap<String, AudioDevice>;

/// Raw endpoint tracked for volume-watch pairing and best-effort removal
/// resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEndpoint {
    pub pnp_id: String,
    pub flow: DeviceFlow,
    pub name: String,
}

/// Result of unmerging a removed raw endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum UnmergeOutcome {
    /// The identity was deleted entirely; carries the dropped record.
    Removed(AudioDevice),

    /// A combined device was narrowed to its remaining flow.
    Narrowed(AudioDevice),

    /// No matching identity/flow was tracked; the registry is unchanged.
    NotTracked,
}

/// Canonical mapping from physical-device identity to merged device
/// records.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: DeviceMap,
    watches: BTreeMap<String, WatchedEndpoint>,
    default_render_pnp_id: Option<String>,
    default_capture_pnp_id: Option<String>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of merged devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Device at a stable positional index.
    pub fn device_at(&self, index: usize) -> Result<AudioDevice, AudioError> {
        self.devices
            .values()
            .nth(index)
            .cloned()
            .ok_or(AudioError::IndexOutOfRange {
                index,
                len: self.devices.len(),
            })
    }

    /// Device by physical identity, if known.
    pub fn device_by_pnp_id(&self, pnp_id: &str) -> Option<AudioDevice> {
        self.devices.get(pnp_id).cloned()
    }

    /// All devices in identity order.
    pub fn device_list(&self) -> Vec<AudioDevice> {
        self.devices.values().cloned().collect()
    }

    /// Full identity → device snapshot (used by the volume diff engine).
    pub fn snapshot(&self) -> DeviceMap {
        self.devices.clone()
    }

    pub fn default_render_pnp_id(&self) -> Option<&str> {
        self.default_render_pnp_id.as_deref()
    }

    pub fn default_capture_pnp_id(&self) -> Option<&str> {
        self.default_capture_pnp_id.as_deref()
    }

    /// True when one device currently serves both default roles.
    pub fn defaults_coincide(&self) -> bool {
        self.default_render_pnp_id.is_some()
            && self.default_render_pnp_id == self.default_capture_pnp_id
    }

    /// Full re-enumeration.
    ///
    /// Enumerates first: if the bulk call fails nothing is committed and
    /// the previous content stays intact. On success all state, including
    /// the default identities and every volume watch, is rebuilt from
    /// scratch; per-endpoint failures are skipped, never fatal.
    pub fn reset_content(&mut self, gateway: &dyn EndpointGateway) -> Result<(), AudioError> {
        info!("recreating active device list");
        let descriptors = gateway.enumerate_endpoints()?;

        for device_id in self.watches.keys() {
            gateway.unregister_volume_watch(device_id);
        }
        self.watches.clear();
        self.devices.clear();
        self.default_render_pnp_id = None;
        self.default_capture_pnp_id = None;

        let default_render_id = gateway.default_endpoint_id(DeviceFlow::Render);
        let default_capture_id = gateway.default_endpoint_id(DeviceFlow::Capture);

        for descriptor in &descriptors {
            let record = match policy::admit(descriptor) {
                Ok(record) => record,
                Err(refusal) => {
                    info!(
                        device_id = %descriptor.device_id,
                        name = %descriptor.name,
                        ?refusal,
                        "endpoint not admitted to the registry"
                    );
                    continue;
                }
            };

            match gateway.register_volume_watch(&descriptor.device_id) {
                Ok(()) => self.track_watch(&descriptor.device_id, &record),
                Err(err) => warn!(
                    device_id = %descriptor.device_id,
                    %err,
                    "volume watch registration failed"
                ),
            }

            self.merge_incoming(record);

            if descriptor.flow == DeviceFlow::Render
                && default_render_id.as_deref() == Some(descriptor.device_id.as_str())
            {
                self.mark_default(DeviceFlow::Render, &descriptor.pnp_id);
                info!(pnp_id = %descriptor.pnp_id, "detected as render default");
            }
            if descriptor.flow == DeviceFlow::Capture
                && default_capture_id.as_deref() == Some(descriptor.device_id.as_str())
            {
                self.mark_default(DeviceFlow::Capture, &descriptor.pnp_id);
                info!(pnp_id = %descriptor.pnp_id, "detected as capture default");
            }
        }

        info!(devices = self.devices.len(), "active device list rebuilt");
        Ok(())
    }

    /// Merge a newly admitted single-flow record into the registry and
    /// return a clone of the stored (possibly combined) record.
    ///
    /// An existing record with the *other* single flow combines into one
    /// `RenderAndCapture` device keeping each side's own volume and default
    /// flag; an existing record with the *same* flow is overwritten by the
    /// incoming one. Either way the display name becomes the sorted union
    /// of both names' `/`-separated fragments.
    pub fn merge_incoming(&mut self, incoming: AudioDevice) -> AudioDevice {
        let merged = match self.devices.get(&incoming.pnp_id) {
            Some(existing) => merge_records(existing, &incoming),
            None => incoming,
        };
        debug!(
            pnp_id = %merged.pnp_id,
            name = %merged.name,
            flow = ?merged.flow,
            "device merged into the registry"
        );
        self.devices.insert(merged.pnp_id.clone(), merged.clone());
        merged
    }

    /// Unmerge a removed raw endpoint.
    ///
    /// A tracked identity with exactly the removed flow is deleted; a
    /// `RenderAndCapture` device is narrowed to its remaining flow with the
    /// removed side's volume and default flag cleared. The registry's
    /// default identities are left alone; a dangling identity is re-derived
    /// by the next default change or reset.
    pub fn unmerge_outgoing(&mut self, outgoing: &AudioDevice) -> UnmergeOutcome {
        let Some(existing) = self.devices.get(&outgoing.pnp_id).cloned() else {
            return UnmergeOutcome::NotTracked;
        };

        if existing.flow == outgoing.flow {
            self.devices.remove(&outgoing.pnp_id);
            return UnmergeOutcome::Removed(existing);
        }

        if existing.flow == DeviceFlow::RenderAndCapture {
            let narrowed = narrow_record(&existing, outgoing);
            self.devices
                .insert(narrowed.pnp_id.clone(), narrowed.clone());
            return UnmergeOutcome::Narrowed(narrowed);
        }

        UnmergeOutcome::NotTracked
    }

    /// Apply a refreshed single-flow volume reading onto the stored record.
    pub fn update_volume(&mut self, record: &AudioDevice) {
        if let Some(found) = self.devices.get_mut(&record.pnp_id) {
            if record.flow == DeviceFlow::Render {
                found.render_volume = record.render_volume;
            } else {
                found.capture_volume = record.capture_volume;
            }
        }
    }

    /// Flag the device as default for the direction and remember its
    /// identity. Returns false (and changes nothing) for unknown
    /// identities.
    pub fn mark_default(&mut self, flow: DeviceFlow, pnp_id: &str) -> bool {
        let Some(device) = self.devices.get_mut(pnp_id) else {
            return false;
        };
        match flow {
            DeviceFlow::Render => {
                device.is_default_render = true;
                self.default_render_pnp_id = Some(pnp_id.to_owned());
                true
            }
            DeviceFlow::Capture => {
                device.is_default_capture = true;
                self.default_capture_pnp_id = Some(pnp_id.to_owned());
                true
            }
            DeviceFlow::None | DeviceFlow::RenderAndCapture => false,
        }
    }

    /// Clear the default flag on the current holder for the direction; the
    /// remembered identity itself is untouched.
    pub fn clear_previous_default(&mut self, flow: DeviceFlow) {
        let previous = match flow {
            DeviceFlow::Render => self.default_render_pnp_id.clone(),
            DeviceFlow::Capture => self.default_capture_pnp_id.clone(),
            DeviceFlow::None | DeviceFlow::RenderAndCapture => return,
        };
        if let Some(pnp_id) = previous {
            if let Some(device) = self.devices.get_mut(&pnp_id) {
                match flow {
                    DeviceFlow::Render => device.is_default_render = false,
                    DeviceFlow::Capture => device.is_default_capture = false,
                    _ => {}
                }
            }
        }
    }

    /// Forget the default identity for the direction.
    pub fn clear_default_identity(&mut self, flow: DeviceFlow) {
        match flow {
            DeviceFlow::Render => self.default_render_pnp_id = None,
            DeviceFlow::Capture => self.default_capture_pnp_id = None,
            DeviceFlow::None | DeviceFlow::RenderAndCapture => {}
        }
    }

    /// Remember a raw endpoint whose volume watch is registered.
    pub fn track_watch(&mut self, device_id: &str, record: &AudioDevice) {
        self.watches.insert(
            device_id.to_owned(),
            WatchedEndpoint {
                pnp_id: record.pnp_id.clone(),
                flow: record.flow,
                name: record.name.clone(),
            },
        );
    }

    /// Forget a watched raw endpoint; returns what was tracked.
    pub fn untrack_watch(&mut self, device_id: &str) -> Option<WatchedEndpoint> {
        self.watches.remove(device_id)
    }

    /// Look up a watched raw endpoint without removing it.
    pub fn watched_endpoint(&self, device_id: &str) -> Option<&WatchedEndpoint> {
        self.watches.get(device_id)
    }

    /// Raw ids of every registered volume watch.
    pub fn watched_device_ids(&self) -> Vec<String> {
        self.watches.keys().cloned().collect()
    }

    /// Drop every device, watch entry, and default identity.
    ///
    /// Watch *unregistration* against the gateway is the caller's job; this
    /// only clears the bookkeeping.
    pub fn clear_all(&mut self) {
        self.devices.clear();
        self.watches.clear();
        self.default_render_pnp_id = None;
        self.default_capture_pnp_id = None;
    }
}

fn split_name_union(name: &str) -> BTreeSet<String> {
    name.split(NAME_SEPARATOR).map(str::to_owned).collect()
}

fn join_name_union(names: &BTreeSet<String>) -> String {
    names
        .iter()
        .cloned()
        .collect::<Vec<_>>()
        .join(&NAME_SEPARATOR.to_string())
}

fn merge_records(existing: &AudioDevice, incoming: &AudioDevice) -> AudioDevice {
    let mut flow = incoming.flow;
    let mut render_volume = incoming.render_volume;
    let mut capture_volume = incoming.capture_volume;
    let mut is_default_render = incoming.is_default_render;
    let mut is_default_capture = incoming.is_default_capture;

    if existing.flow != incoming.flow {
        // Two directions of one physical device: keep the other side's
        // volume and default flag from the record already stored.
        match incoming.flow {
            DeviceFlow::Capture => {
                render_volume = existing.render_volume;
                is_default_render = existing.is_default_render;
            }
            DeviceFlow::Render => {
                capture_volume = existing.capture_volume;
                is_default_capture = existing.is_default_capture;
            }
            DeviceFlow::None | DeviceFlow::RenderAndCapture => {}
        }
        flow = DeviceFlow::RenderAndCapture;
    }

    let mut names = split_name_union(&existing.name);
    names.insert(incoming.name.clone());

    AudioDevice::new(
        incoming.pnp_id.clone(),
        join_name_union(&names),
        flow,
        render_volume,
        capture_volume,
        is_default_render,
        is_default_capture,
    )
}

fn narrow_record(existing: &AudioDevice, outgoing: &AudioDevice) -> AudioDevice {
    let mut flow = existing.flow;
    let mut render_volume = existing.render_volume;
    let mut capture_volume = existing.capture_volume;
    let mut is_default_render = existing.is_default_render;
    let mut is_default_capture = existing.is_default_capture;

    match outgoing.flow {
        DeviceFlow::Capture => {
            flow = DeviceFlow::Render;
            capture_volume = 0;
            is_default_capture = false;
        }
        DeviceFlow::Render => {
            flow = DeviceFlow::Capture;
            render_volume = 0;
            is_default_render = false;
        }
        DeviceFlow::None | DeviceFlow::RenderAndCapture => {}
    }

    // Revert to the first union fragment that is not the removed
    // endpoint's own name; if every fragment matches, the name stays.
    let mut name = outgoing.name.clone();
    for fragment in split_name_union(&existing.name) {
        if fragment != outgoing.name {
            name = fragment;
            break;
        }
    }

    AudioDevice::new(
        existing.pnp_id.clone(),
        name,
        flow,
        render_volume,
        capture_volume,
        is_default_render,
        is_default_capture,
    )
}
