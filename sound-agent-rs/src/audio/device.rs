//! Audio device data models.
//!
//! Defines the core data structures for representing merged endpoint
//! devices, their flow direction, and the raw/semantic events flowing
//! through the registry.

use thiserror::Error;

/// Flow direction of a device record.
///
/// A physical device exposing both a playback and a recording endpoint is
/// represented by a single `RenderAndCapture` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFlow {
    /// No remaining flow (transient, the record is about to be dropped)
    None,

    /// Playback endpoint
    Render,

    /// Recording endpoint
    Capture,

    /// Two raw endpoints sharing one physical identity
    RenderAndCapture,
}

impl DeviceFlow {
    /// True if the record carries a render side.
    pub fn has_render(self) -> bool {
        matches!(self, DeviceFlow::Render | DeviceFlow::RenderAndCapture)
    }

    /// True if the record carries a capture side.
    pub fn has_capture(self) -> bool {
        matches!(self, DeviceFlow::Capture | DeviceFlow::RenderAndCapture)
    }
}

/// A merged audio endpoint device, keyed by its PnP identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    /// Canonical physical-device identity, stable across direction splits
    pub pnp_id: String,

    /// Display name; merged devices carry the union of both endpoint names
    pub name: String,

    /// Which directions this record currently covers
    pub flow: DeviceFlow,

    /// Render volume in [0, 1000]; 0 when absent or muted
    pub render_volume: u16,

    /// Capture volume in [0, 1000]; 0 when absent or muted
    pub capture_volume: u16,

    /// Whether this device is the default render device (Console role)
    pub is_default_render: bool,

    /// Whether this device is the default capture device (Console role)
    pub is_default_capture: bool,
}

impl AudioDevice {
    pub fn new(
        pnp_id: String,
        name: String,
        flow: DeviceFlow,
        render_volume: u16,
        capture_volume: u16,
        is_default_render: bool,
        is_default_capture: bool,
    ) -> Self {
        Self {
            pnp_id,
            name,
            flow,
            render_volume,
            capture_volume,
            is_default_render,
            is_default_capture,
        }
    }
}

/// Device role (maps to the platform ERole enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DeviceRole {
    /// Used by games, system sounds, most general applications
    Console = 0,

    /// Used by music players, video players
    Multimedia = 1,

    /// Used by VoIP applications
    Communications = 2,
}

/// Platform device state flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Device is active and available for use
    Active,

    /// Device is disabled in the system sound settings
    Disabled,

    /// Device is not present (driver issue)
    NotPresent,

    /// Device is unplugged (for pluggable devices)
    Unplugged,
}

/// Raw notifications delivered by the platform audio subsystem.
///
/// These arrive asynchronously, on threads the platform owns, possibly
/// out of order and duplicated.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// A new endpoint became active
    DeviceAdded { device_id: String },

    /// An endpoint went away
    DeviceRemoved { device_id: String },

    /// Endpoint state changed (active, disabled, not present, unplugged)
    DeviceStateChanged {
        device_id: String,
        new_state: DeviceState,
    },

    /// Default device changed for a flow/role pair
    DefaultDeviceChanged {
        flow: DeviceFlow,
        role: DeviceRole,
        device_id: Option<String>, // None if no default device remains
    },

    /// Volume or mute state changed on a watched endpoint
    VolumeChanged { device_id: String },
}

/// Semantic change events fanned out to observers.
///
/// The default-change variants carry an empty `pnp_id` when no default
/// device exists for that direction anymore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceChange {
    /// A device entered the registry (or one side of it was re-discovered)
    Discovered { pnp_id: String },

    /// A raw endpoint of the device went away
    Detached { pnp_id: String },

    /// The default render device changed
    DefaultRenderChanged { pnp_id: String },

    /// The default capture device changed
    DefaultCaptureChanged { pnp_id: String },

    /// The render volume of a device changed
    VolumeRenderChanged { pnp_id: String },

    /// The capture volume of a device changed
    VolumeCaptureChanged { pnp_id: String },
}

impl DeviceChange {
    /// Identity of the affected device; empty for "no default exists".
    pub fn pnp_id(&self) -> &str {
        match self {
            DeviceChange::Discovered { pnp_id }
            | DeviceChange::Detached { pnp_id }
            | DeviceChange::DefaultRenderChanged { pnp_id }
            | DeviceChange::DefaultCaptureChanged { pnp_id }
            | DeviceChange::VolumeRenderChanged { pnp_id }
            | DeviceChange::VolumeCaptureChanged { pnp_id } => pnp_id,
        }
    }
}

/// Registry error types.
#[derive(Debug, Clone, Error)]
pub enum AudioError {
    #[error("Device not found: {pnp_id}")]
    DeviceNotFound { pnp_id: String },

    #[error("Device index {index} out of range ({len} devices)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Failed to enumerate endpoints: {reason}")]
    EnumerationFailed { reason: String },

    #[error("Failed to resolve endpoint {device_id}: {reason}")]
    ResolutionFailed { device_id: String, reason: String },

    #[error("COM initialization failed: {reason}")]
    ComInitFailed { reason: String },

    #[error("Volume control not available for device")]
    VolumeNotAvailable,

    #[error("Endpoint monitoring is not supported on this platform")]
    Unsupported,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_sides() {
        assert!(DeviceFlow::Render.has_render());
        assert!(!DeviceFlow::Render.has_capture());
        assert!(DeviceFlow::Capture.has_capture());
        assert!(!DeviceFlow::Capture.has_render());
        assert!(DeviceFlow::RenderAndCapture.has_render());
        assert!(DeviceFlow::RenderAndCapture.has_capture());
        assert!(!DeviceFlow::None.has_render());
        assert!(!DeviceFlow::None.has_capture());
    }

    #[test]
    fn change_event_exposes_identity() {
        let change = DeviceChange::DefaultRenderChanged {
            pnp_id: String::new(),
        };
        assert_eq!(change.pnp_id(), "");

        let change = DeviceChange::Discovered {
            pnp_id: "ABC".to_string(),
        };
        assert_eq!(change.pnp_id(), "ABC");
    }
}
