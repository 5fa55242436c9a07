//! Notification state machine.
//!
//! Translates raw platform notifications into registry mutations and the
//! semantic change events handed to observers. Each call handles exactly
//! one notification; the caller serializes calls and owns fan-out.

use tracing::{debug, info, warn};

use super::device::{
    AudioDevice, DeviceChange, DeviceEvent, DeviceFlow, DeviceRole, DeviceState,
};
use super::diff;
use super::gateway::{normalize_device_id, EndpointGateway};
use super::policy;
use super::registry::{DeviceRegistry, UnmergeOutcome};

pub struct EventTranslator;

impl EventTranslator {
    /// Apply one raw notification. Returns the semantic events to emit, in
    /// order; an empty list means the notification had no observable
    /// effect.
    pub fn translate(
        registry: &mut DeviceRegistry,
        gateway: &dyn EndpointGateway,
        event: DeviceEvent,
    ) -> Vec<DeviceChange> {
        match event {
            DeviceEvent::DeviceAdded { device_id } => {
                Self::device_added(registry, gateway, &device_id)
            }
            DeviceEvent::DeviceRemoved { device_id } => {
                Self::device_removed(registry, gateway, &device_id)
            }
            DeviceEvent::DeviceStateChanged {
                device_id,
                new_state,
            } => Self::state_changed(registry, gateway, &device_id, new_state),
            DeviceEvent::DefaultDeviceChanged {
                flow,
                role,
                device_id,
            } => Self::default_changed(registry, gateway, flow, role, device_id),
            DeviceEvent::VolumeChanged { device_id } => {
                Self::volume_changed(registry, gateway, &device_id)
            }
        }
    }

    fn state_changed(
        registry: &mut DeviceRegistry,
        gateway: &dyn EndpointGateway,
        device_id: &str,
        new_state: DeviceState,
    ) -> Vec<DeviceChange> {
        match new_state {
            DeviceState::Active => Self::device_added(registry, gateway, device_id),
            DeviceState::Disabled | DeviceState::NotPresent | DeviceState::Unplugged => {
                Self::device_removed(registry, gateway, device_id)
            }
        }
    }

    fn device_added(
        registry: &mut DeviceRegistry,
        gateway: &dyn EndpointGateway,
        device_id: &str,
    ) -> Vec<DeviceChange> {
        let descriptor = match gateway.endpoint_by_id(device_id) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                warn!(device_id, %err, "added endpoint could not be resolved");
                return Vec::new();
            }
        };
        let record = match policy::admit(&descriptor) {
            Ok(record) => record,
            Err(refusal) => {
                info!(device_id, ?refusal, "added endpoint not admitted");
                return Vec::new();
            }
        };

        match gateway.register_volume_watch(device_id) {
            Ok(()) => registry.track_watch(device_id, &record),
            Err(err) => warn!(device_id, %err, "volume watch registration failed"),
        }

        let merged = registry.merge_incoming(record);
        info!(
            device_id,
            pnp_id = %merged.pnp_id,
            name = %merged.name,
            flow = ?merged.flow,
            "device added"
        );

        let mut changes = vec![DeviceChange::Discovered {
            pnp_id: merged.pnp_id.clone(),
        }];
        // A re-discovered endpoint may belong to a device that is already
        // the platform default; surface that alongside the discovery.
        if merged.is_default_render {
            changes.push(DeviceChange::DefaultRenderChanged {
                pnp_id: merged.pnp_id.clone(),
            });
        }
        if merged.is_default_capture {
            changes.push(DeviceChange::DefaultCaptureChanged {
                pnp_id: merged.pnp_id.clone(),
            });
        }
        changes
    }

    fn device_removed(
        registry: &mut DeviceRegistry,
        gateway: &dyn EndpointGateway,
        device_id: &str,
    ) -> Vec<DeviceChange> {
        // Best-effort resolution: live metadata first, then the watch
        // table, finally a synthetic record keyed on the normalized raw id.
        let record = match gateway
            .endpoint_by_id(device_id)
            .ok()
            .and_then(|descriptor| policy::admit(&descriptor).ok())
        {
            Some(record) => record,
            None => match registry.watched_endpoint(device_id) {
                Some(watched) => AudioDevice::new(
                    watched.pnp_id.clone(),
                    watched.name.clone(),
                    watched.flow,
                    0,
                    0,
                    false,
                    false,
                ),
                None => AudioDevice::new(
                    normalize_device_id(device_id),
                    String::new(),
                    DeviceFlow::None,
                    0,
                    0,
                    false,
                    false,
                ),
            },
        };

        match registry.unmerge_outgoing(&record) {
            UnmergeOutcome::Removed(removed) => {
                info!(device_id, pnp_id = %removed.pnp_id, "device removed");
            }
            UnmergeOutcome::Narrowed(narrowed) => {
                info!(
                    device_id,
                    pnp_id = %narrowed.pnp_id,
                    flow = ?narrowed.flow,
                    "removed endpoint unmerged"
                );
            }
            UnmergeOutcome::NotTracked => {
                debug!(device_id, "removed endpoint was not tracked");
            }
        }

        if registry.untrack_watch(device_id).is_some() {
            gateway.unregister_volume_watch(device_id);
        }

        vec![DeviceChange::Detached {
            pnp_id: record.pnp_id,
        }]
    }

    fn default_changed(
        registry: &mut DeviceRegistry,
        gateway: &dyn EndpointGateway,
        flow: DeviceFlow,
        role: DeviceRole,
        device_id: Option<String>,
    ) -> Vec<DeviceChange> {
        if role != DeviceRole::Console {
            return Vec::new();
        }
        if !matches!(flow, DeviceFlow::Render | DeviceFlow::Capture) {
            return Vec::new();
        }

        registry.clear_previous_default(flow);

        let Some(device_id) = device_id else {
            registry.clear_default_identity(flow);
            info!(?flow, "default device removed");
            return vec![default_change_event(flow, String::new())];
        };

        let resolved = gateway
            .endpoint_by_id(&device_id)
            .ok()
            .and_then(|descriptor| policy::admit(&descriptor).ok());

        match resolved {
            Some(record) => {
                if registry.mark_default(flow, &record.pnp_id) {
                    info!(
                        device_id,
                        pnp_id = %record.pnp_id,
                        ?flow,
                        "new default device"
                    );
                    let mut changes = vec![default_change_event(flow, record.pnp_id.clone())];
                    // One physical device serving both roles: the other
                    // direction changed too, even though only one platform
                    // notification fired.
                    if registry.defaults_coincide() {
                        changes.push(default_change_event(other_flow(flow), record.pnp_id));
                    }
                    changes
                } else {
                    debug!(
                        device_id,
                        pnp_id = %record.pnp_id,
                        "new default identity is not in the registry"
                    );
                    Vec::new()
                }
            }
            None => {
                warn!(device_id, ?flow, "new default endpoint could not be resolved");
                registry.clear_default_identity(flow);
                vec![default_change_event(flow, String::new())]
            }
        }
    }

    fn volume_changed(
        registry: &mut DeviceRegistry,
        gateway: &dyn EndpointGateway,
        device_id: &str,
    ) -> Vec<DeviceChange> {
        debug!(device_id, "volume notification");

        let before = registry.snapshot();
        Self::refresh_volumes(registry, gateway);
        let after = registry.snapshot();

        let (render_changed, capture_changed) = diff::changed_volume_pnp_ids(&before, &after);

        let mut changes = Vec::new();
        for pnp_id in render_changed {
            changes.push(DeviceChange::VolumeRenderChanged { pnp_id });
        }
        for pnp_id in capture_changed {
            changes.push(DeviceChange::VolumeCaptureChanged { pnp_id });
        }
        changes
    }

    /// Re-read live volumes for every active endpoint and fold them onto
    /// the matching registry records.
    fn refresh_volumes(registry: &mut DeviceRegistry, gateway: &dyn EndpointGateway) {
        let descriptors = match gateway.enumerate_endpoints() {
            Ok(descriptors) => descriptors,
            Err(err) => {
                warn!(%err, "volume refresh enumeration failed");
                return;
            }
        };
        for descriptor in &descriptors {
            if let Ok(record) = policy::admit(descriptor) {
                registry.update_volume(&record);
            }
        }
    }
}

fn default_change_event(flow: DeviceFlow, pnp_id: String) -> DeviceChange {
    match flow {
        DeviceFlow::Capture => DeviceChange::DefaultCaptureChanged { pnp_id },
        _ => DeviceChange::DefaultRenderChanged { pnp_id },
    }
}

fn other_flow(flow: DeviceFlow) -> DeviceFlow {
    match flow {
        DeviceFlow::Render => DeviceFlow::Capture,
        _ => DeviceFlow::Render,
    }
}

#[cfg(test)]
mod tests {
    use super::super::gateway::EndpointFormFactor;
    use super::super::testing::MockGateway;
    use super::*;

    fn added(device_id: &str) -> DeviceEvent {
        DeviceEvent::DeviceAdded {
            device_id: device_id.to_string(),
        }
    }

    fn removed(device_id: &str) -> DeviceEvent {
        DeviceEvent::DeviceRemoved {
            device_id: device_id.to_string(),
        }
    }

    fn default_changed(flow: DeviceFlow, device_id: Option<&str>) -> DeviceEvent {
        DeviceEvent::DefaultDeviceChanged {
            flow,
            role: DeviceRole::Console,
            device_id: device_id.map(str::to_owned),
        }
    }

    #[test]
    fn added_endpoint_is_discovered_and_watched() {
        let gateway = MockGateway::new();
        gateway.push_render("id-render-1", "D1", "Speakers", 0.3);
        let mut registry = DeviceRegistry::new();

        let changes = EventTranslator::translate(&mut registry, gateway.as_ref(), added("id-render-1"));

        assert_eq!(
            changes,
            vec![DeviceChange::Discovered {
                pnp_id: "D1".to_string()
            }]
        );
        assert_eq!(registry.len(), 1);
        assert!(gateway.is_watched("id-render-1"));
    }

    #[test]
    fn added_endpoint_that_is_already_default_reports_the_default_too() {
        let gateway = MockGateway::new();
        gateway.push_render("id-render-1", "D1", "Speakers", 0.3);
        gateway.push_capture("id-capture-1", "D1", "Mic Array", 0.45);
        gateway.set_default_render_id(Some("id-render-1"));

        let mut registry = DeviceRegistry::new();
        registry.reset_content(gateway.as_ref()).expect("reset");

        // The capture side goes away and comes back; the merged device is
        // still flagged as the render default.
        EventTranslator::translate(&mut registry, gateway.as_ref(), removed("id-capture-1"));
        let changes =
            EventTranslator::translate(&mut registry, gateway.as_ref(), added("id-capture-1"));

        assert_eq!(
            changes,
            vec![
                DeviceChange::Discovered {
                    pnp_id: "D1".to_string()
                },
                DeviceChange::DefaultRenderChanged {
                    pnp_id: "D1".to_string()
                },
            ]
        );
    }

    #[test]
    fn unresolvable_added_endpoint_changes_nothing() {
        let gateway = MockGateway::new();
        let mut registry = DeviceRegistry::new();

        let changes = EventTranslator::translate(&mut registry, gateway.as_ref(), added("ghost"));

        assert!(changes.is_empty());
        assert!(registry.is_empty());
        assert_eq!(gateway.active_watch_count(), 0);
    }

    #[test]
    fn headset_render_endpoint_is_never_admitted() {
        let gateway = MockGateway::new();
        gateway.push_render("id-render-1", "D1", "Gaming Headset", 0.8);
        gateway.set_form_factor("id-render-1", EndpointFormFactor::Headset);
        let mut registry = DeviceRegistry::new();

        let changes = EventTranslator::translate(&mut registry, gateway.as_ref(), added("id-render-1"));

        assert!(changes.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn state_change_to_active_adds_and_other_states_remove() {
        let gateway = MockGateway::new();
        gateway.push_render("id-render-1", "D1", "Speakers", 0.3);
        let mut registry = DeviceRegistry::new();

        let changes = EventTranslator::translate(
            &mut registry,
            gateway.as_ref(),
            DeviceEvent::DeviceStateChanged {
                device_id: "id-render-1".to_string(),
                new_state: DeviceState::Active,
            },
        );
        assert_eq!(changes.len(), 1);
        assert_eq!(registry.len(), 1);

        let changes = EventTranslator::translate(
            &mut registry,
            gateway.as_ref(),
            DeviceEvent::DeviceStateChanged {
                device_id: "id-render-1".to_string(),
                new_state: DeviceState::Unplugged,
            },
        );
        assert_eq!(
            changes,
            vec![DeviceChange::Detached {
                pnp_id: "D1".to_string()
            }]
        );
        // The endpoint is still in the scripted set, so live resolution
        // found it; the registry entry must be gone regardless.
        assert!(registry.is_empty());
    }

    #[test]
    fn removal_emits_detached_even_when_resolution_fails() {
        let gateway = MockGateway::new();
        gateway.push_capture("id-capture-1", "D1", "Mic Array", 0.45);
        let mut registry = DeviceRegistry::new();
        registry.reset_content(gateway.as_ref()).expect("reset");

        // The platform no longer exposes the endpoint at removal time.
        gateway.remove_endpoint("id-capture-1");
        let changes =
            EventTranslator::translate(&mut registry, gateway.as_ref(), removed("id-capture-1"));

        assert_eq!(
            changes,
            vec![DeviceChange::Detached {
                pnp_id: "D1".to_string()
            }]
        );
        assert!(registry.is_empty());
        assert_eq!(gateway.unregister_log(), vec!["id-capture-1".to_string()]);
    }

    #[test]
    fn removal_of_a_completely_unknown_endpoint_still_detaches() {
        let gateway = MockGateway::new();
        let mut registry = DeviceRegistry::new();

        let changes = EventTranslator::translate(
            &mut registry,
            gateway.as_ref(),
            removed("{0.0.1.00000000}.{feed-beef}"),
        );

        assert_eq!(
            changes,
            vec![DeviceChange::Detached {
                pnp_id: "0.0.1.00000000.FEED-BEEF".to_string()
            }]
        );
    }

    #[test]
    fn non_console_default_changes_are_ignored() {
        let gateway = MockGateway::new();
        gateway.push_render("id-render-1", "D1", "Speakers", 0.3);
        let mut registry = DeviceRegistry::new();
        registry.reset_content(gateway.as_ref()).expect("reset");

        let changes = EventTranslator::translate(
            &mut registry,
            gateway.as_ref(),
            DeviceEvent::DefaultDeviceChanged {
                flow: DeviceFlow::Render,
                role: DeviceRole::Communications,
                device_id: Some("id-render-1".to_string()),
            },
        );

        assert!(changes.is_empty());
        assert_eq!(registry.default_render_pnp_id(), None);
    }

    #[test]
    fn new_default_sets_flag_and_identity() {
        let gateway = MockGateway::new();
        gateway.push_render("id-render-1", "D1", "Speakers", 0.3);
        gateway.push_render("id-render-2", "D2", "Headphones", 0.6);
        gateway.set_default_render_id(Some("id-render-1"));
        let mut registry = DeviceRegistry::new();
        registry.reset_content(gateway.as_ref()).expect("reset");

        let changes = EventTranslator::translate(
            &mut registry,
            gateway.as_ref(),
            default_changed(DeviceFlow::Render, Some("id-render-2")),
        );

        assert_eq!(
            changes,
            vec![DeviceChange::DefaultRenderChanged {
                pnp_id: "D2".to_string()
            }]
        );
        assert_eq!(registry.default_render_pnp_id(), Some("D2"));
        let previous = registry.device_by_pnp_id("D1").expect("still present");
        assert!(!previous.is_default_render);
        let current = registry.device_by_pnp_id("D2").expect("present");
        assert!(current.is_default_render);
    }

    #[test]
    fn default_removed_clears_identity_and_emits_empty_id() {
        let gateway = MockGateway::new();
        gateway.push_capture("id-capture-1", "D1", "Mic Array", 0.45);
        gateway.set_default_capture_id(Some("id-capture-1"));
        let mut registry = DeviceRegistry::new();
        registry.reset_content(gateway.as_ref()).expect("reset");

        let changes = EventTranslator::translate(
            &mut registry,
            gateway.as_ref(),
            default_changed(DeviceFlow::Capture, None),
        );

        assert_eq!(
            changes,
            vec![DeviceChange::DefaultCaptureChanged {
                pnp_id: String::new()
            }]
        );
        assert_eq!(registry.default_capture_pnp_id(), None);
        let device = registry.device_by_pnp_id("D1").expect("present");
        assert!(!device.is_default_capture);
    }

    #[test]
    fn unresolvable_new_default_is_treated_as_removed() {
        let gateway = MockGateway::new();
        gateway.push_render("id-render-1", "D1", "Speakers", 0.3);
        gateway.set_default_render_id(Some("id-render-1"));
        let mut registry = DeviceRegistry::new();
        registry.reset_content(gateway.as_ref()).expect("reset");

        let changes = EventTranslator::translate(
            &mut registry,
            gateway.as_ref(),
            default_changed(DeviceFlow::Render, Some("ghost")),
        );

        assert_eq!(
            changes,
            vec![DeviceChange::DefaultRenderChanged {
                pnp_id: String::new()
            }]
        );
        assert_eq!(registry.default_render_pnp_id(), None);
    }

    #[test]
    fn default_change_for_a_shared_device_cross_notifies_both_directions() {
        let gateway = MockGateway::new();
        gateway.push_render("id-render-2", "D2", "USB Audio", 0.3);
        gateway.push_capture("id-capture-2", "D2", "USB Audio", 0.45);
        gateway.set_default_capture_id(Some("id-capture-2"));
        let mut registry = DeviceRegistry::new();
        registry.reset_content(gateway.as_ref()).expect("reset");

        let changes = EventTranslator::translate(
            &mut registry,
            gateway.as_ref(),
            default_changed(DeviceFlow::Render, Some("id-render-2")),
        );

        assert_eq!(
            changes,
            vec![
                DeviceChange::DefaultRenderChanged {
                    pnp_id: "D2".to_string()
                },
                DeviceChange::DefaultCaptureChanged {
                    pnp_id: "D2".to_string()
                },
            ]
        );
    }

    #[test]
    fn volume_notification_reports_each_changed_channel_once() {
        let gateway = MockGateway::new();
        gateway.push_render("id-render-1", "D1", "Speakers", 0.3);
        gateway.push_capture("id-capture-1", "D1", "Mic Array", 0.45);
        gateway.push_capture("id-capture-2", "D2", "Desk Mic", 0.5);
        let mut registry = DeviceRegistry::new();
        registry.reset_content(gateway.as_ref()).expect("reset");

        gateway.set_volume_scalar("id-render-1", 0.8);
        gateway.set_volume_scalar("id-capture-2", 0.2);

        let changes = EventTranslator::translate(
            &mut registry,
            gateway.as_ref(),
            DeviceEvent::VolumeChanged {
                device_id: "id-render-1".to_string(),
            },
        );

        assert_eq!(
            changes,
            vec![
                DeviceChange::VolumeRenderChanged {
                    pnp_id: "D1".to_string()
                },
                DeviceChange::VolumeCaptureChanged {
                    pnp_id: "D2".to_string()
                },
            ]
        );
        let device = registry.device_by_pnp_id("D1").expect("present");
        assert_eq!(device.render_volume, 800);
    }

    #[test]
    fn muting_reads_as_a_volume_change_to_zero() {
        let gateway = MockGateway::new();
        gateway.push_capture("id-capture-1", "D1", "Mic Array", 0.45);
        let mut registry = DeviceRegistry::new();
        registry.reset_content(gateway.as_ref()).expect("reset");

        gateway.set_muted("id-capture-1", true);
        let changes = EventTranslator::translate(
            &mut registry,
            gateway.as_ref(),
            DeviceEvent::VolumeChanged {
                device_id: "id-capture-1".to_string(),
            },
        );

        assert_eq!(
            changes,
            vec![DeviceChange::VolumeCaptureChanged {
                pnp_id: "D1".to_string()
            }]
        );
        let device = registry.device_by_pnp_id("D1").expect("present");
        assert_eq!(device.capture_volume, 0);
    }

    #[test]
    fn unchanged_volume_produces_no_events() {
        let gateway = MockGateway::new();
        gateway.push_render("id-render-1", "D1", "Speakers", 0.3);
        let mut registry = DeviceRegistry::new();
        registry.reset_content(gateway.as_ref()).expect("reset");

        let changes = EventTranslator::translate(
            &mut registry,
            gateway.as_ref(),
            DeviceEvent::VolumeChanged {
                device_id: "id-render-1".to_string(),
            },
        );
        assert!(changes.is_empty());
    }
}
