//! Snapshot comparison for volume changes.

use super::registry::DeviceMap;

/// Compare two registry snapshots and report, per direction, the
/// identities whose volume actually changed.
///
/// Only identities present in both snapshots are considered; the render
/// and capture sides are compared independently. Pure function, no
/// ordering guarantee beyond "no duplicates within each list".
pub fn changed_volume_pnp_ids(before: &DeviceMap, after: &DeviceMap) -> (Vec<String>, Vec<String>) {
    let mut render_changed = Vec::new();
    let mut capture_changed = Vec::new();

    for (pnp_id, device_before) in before {
        if let Some(device_after) = after.get(pnp_id) {
            if device_before.render_volume != device_after.render_volume {
                render_changed.push(pnp_id.clone());
            }
            if device_before.capture_volume != device_after.capture_volume {
                capture_changed.push(pnp_id.clone());
            }
        }
    }

    (render_changed, capture_changed)
}

#[cfg(test)]
mod tests {
    use super::super::device::{AudioDevice, DeviceFlow};
    use super::*;

    fn snapshot(entries: &[(&str, u16, u16)]) -> DeviceMap {
        entries
            .iter()
            .map(|(pnp_id, render, capture)| {
                (
                    pnp_id.to_string(),
                    AudioDevice::new(
                        pnp_id.to_string(),
                        format!("Device {pnp_id}"),
                        DeviceFlow::RenderAndCapture,
                        *render,
                        *capture,
                        false,
                        false,
                    ),
                )
            })
            .collect()
    }

    #[test]
    fn reports_exactly_the_changed_channel() {
        let before = snapshot(&[("D3", 300, 200), ("D4", 100, 100)]);
        let after = snapshot(&[("D3", 450, 200), ("D4", 100, 100)]);

        let (render, capture) = changed_volume_pnp_ids(&before, &after);
        assert_eq!(render, vec!["D3".to_string()]);
        assert!(capture.is_empty());
    }

    #[test]
    fn both_channels_of_one_identity_can_change() {
        let before = snapshot(&[("D1", 300, 200)]);
        let after = snapshot(&[("D1", 310, 210)]);

        let (render, capture) = changed_volume_pnp_ids(&before, &after);
        assert_eq!(render, vec!["D1".to_string()]);
        assert_eq!(capture, vec!["D1".to_string()]);
    }

    #[test]
    fn identities_missing_from_either_snapshot_are_ignored() {
        let before = snapshot(&[("D1", 300, 200), ("GONE", 500, 500)]);
        let after = snapshot(&[("D1", 300, 200), ("NEW", 100, 100)]);

        let (render, capture) = changed_volume_pnp_ids(&before, &after);
        assert!(render.is_empty());
        assert!(capture.is_empty());
    }
}
