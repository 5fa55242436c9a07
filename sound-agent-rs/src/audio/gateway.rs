//! Boundary to the native enumeration/notification subsystem.
//!
//! The registry core never talks to the platform directly; everything goes
//! through [`EndpointGateway`], which the Windows MMDevice implementation
//! in `platform` provides and the tests replace with a scripted double.

use super::device::{AudioError, DeviceFlow};

/// Physical form factor reported for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointFormFactor {
    RemoteNetworkDevice,
    Speakers,
    LineLevel,
    Headphones,
    Microphone,
    Headset,
    Handset,
    UnknownDigitalPassthrough,
    Spdif,
    DigitalAudioDisplayDevice,
    UnknownFormFactor,
}

impl EndpointFormFactor {
    /// Map the platform's numeric form factor; unknown values fall back to
    /// `UnknownFormFactor`.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => EndpointFormFactor::RemoteNetworkDevice,
            1 => EndpointFormFactor::Speakers,
            2 => EndpointFormFactor::LineLevel,
            3 => EndpointFormFactor::Headphones,
            4 => EndpointFormFactor::Microphone,
            5 => EndpointFormFactor::Headset,
            6 => EndpointFormFactor::Handset,
            7 => EndpointFormFactor::UnknownDigitalPassthrough,
            8 => EndpointFormFactor::Spdif,
            9 => EndpointFormFactor::DigitalAudioDisplayDevice,
            _ => EndpointFormFactor::UnknownFormFactor,
        }
    }
}

/// A raw single-direction endpoint as reported by the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointDescriptor {
    /// Opaque raw endpoint id (unique per logical endpoint)
    pub device_id: String,

    /// Signal direction; always `Render` or `Capture` for a raw endpoint
    pub flow: DeviceFlow,

    /// Friendly display name
    pub name: String,

    /// Physical form factor
    pub form_factor: EndpointFormFactor,

    /// Physical-device identity shared by both directions of one device
    pub pnp_id: String,

    /// Current mute state
    pub is_muted: bool,

    /// Master volume as scalar (0.0 to 1.0)
    pub volume_scalar: f32,
}

/// Abstraction over the native enumeration/notification subsystem.
///
/// Implementations deliver push notifications separately (as
/// [`super::device::DeviceEvent`] values handed to the monitoring session);
/// this trait covers only the pull side and the volume-watch registration
/// pairing.
pub trait EndpointGateway: Send + Sync {
    /// List every currently active endpoint.
    ///
    /// A failure of the bulk call itself surfaces as
    /// [`AudioError::EnumerationFailed`]; callers must not commit partial
    /// results.
    fn enumerate_endpoints(&self) -> Result<Vec<EndpointDescriptor>, AudioError>;

    /// Resolve a single endpoint by its raw id.
    fn endpoint_by_id(&self, device_id: &str) -> Result<EndpointDescriptor, AudioError>;

    /// Raw id of the default endpoint for the given direction, if any.
    fn default_endpoint_id(&self, flow: DeviceFlow) -> Option<String>;

    /// Start delivering volume notifications for the endpoint.
    fn register_volume_watch(&self, device_id: &str) -> Result<(), AudioError>;

    /// Stop delivering volume notifications for the endpoint.
    ///
    /// Unregistering an unknown id is a no-op; every successful
    /// registration must be paired with exactly one call here.
    fn unregister_volume_watch(&self, device_id: &str);
}

/// Container GUID reported for devices without a plug-and-play identity.
pub const NO_PNP_CONTAINER_GUID: &str = "00000000-0000-0000-FFFF-FFFFFFFFFFFF";

/// Fallback identity for endpoints whose container GUID is unusable:
/// the raw endpoint id truncated to 79 chars, with braces removed,
/// uppercased.
pub fn normalize_device_id(device_id: &str) -> String {
    let mut pnp_id: String = device_id.chars().take(79).collect();
    pnp_id.retain(|c| c != '{' && c != '}');
    pnp_id.to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_factor_from_raw() {
        assert_eq!(EndpointFormFactor::from_raw(5), EndpointFormFactor::Headset);
        assert_eq!(
            EndpointFormFactor::from_raw(0),
            EndpointFormFactor::RemoteNetworkDevice
        );
        assert_eq!(
            EndpointFormFactor::from_raw(10),
            EndpointFormFactor::UnknownFormFactor
        );
        assert_eq!(
            EndpointFormFactor::from_raw(999),
            EndpointFormFactor::UnknownFormFactor
        );
    }

    #[test]
    fn normalize_strips_braces_and_uppercases() {
        assert_eq!(
            normalize_device_id("{0.0.0.00000000}.{abc-def}"),
            "0.0.0.00000000.ABC-DEF"
        );
    }

    #[test]
    fn normalize_truncates_before_removing_braces() {
        // 79-char cap applies to the raw id, so braces inside the first 79
        // chars still disappear afterwards.
        let long_id = format!("{{{}}}", "a".repeat(100));
        let normalized = normalize_device_id(&long_id);
        assert_eq!(normalized, "A".repeat(78));
    }
}
