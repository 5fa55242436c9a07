//! Endpoint admission policy.
//!
//! Decides whether a raw endpoint may enter the registry and converts its
//! platform volume scalar into the fixed-point range the registry stores.

use super::device::{AudioDevice, DeviceFlow};
use super::gateway::{EndpointDescriptor, EndpointFormFactor};

/// Why an endpoint was refused admission.
///
/// Refusals are logged by the caller and never surfaced as errors; a
/// refused endpoint simply stays out of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    /// Render endpoints with a headset form factor are never admitted.
    HeadsetRender,

    /// Raw endpoints must be single-direction.
    UnsupportedFlow,
}

/// Scale a platform volume scalar into [0, 1000]; muted endpoints read 0.
pub fn scaled_volume(is_muted: bool, volume_scalar: f32) -> u16 {
    if is_muted {
        0
    } else {
        (volume_scalar.clamp(0.0, 1.0) * 1000.0).round() as u16
    }
}

/// Convert a raw endpoint into a single-flow device record, or refuse it.
pub fn admit(descriptor: &EndpointDescriptor) -> Result<AudioDevice, Refusal> {
    if descriptor.form_factor == EndpointFormFactor::Headset
        && descriptor.flow == DeviceFlow::Render
    {
        return Err(Refusal::HeadsetRender);
    }

    let volume = scaled_volume(descriptor.is_muted, descriptor.volume_scalar);
    let (render_volume, capture_volume) = match descriptor.flow {
        DeviceFlow::Render => (volume, 0),
        DeviceFlow::Capture => (0, volume),
        DeviceFlow::None | DeviceFlow::RenderAndCapture => {
            return Err(Refusal::UnsupportedFlow)
        }
    };

    Ok(AudioDevice::new(
        descriptor.pnp_id.clone(),
        descriptor.name.clone(),
        descriptor.flow,
        render_volume,
        capture_volume,
        false,
        false,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(flow: DeviceFlow, form_factor: EndpointFormFactor) -> EndpointDescriptor {
        EndpointDescriptor {
            device_id: "{0.0.0.00000000}.{1111}".to_string(),
            flow,
            name: "Test Endpoint".to_string(),
            form_factor,
            pnp_id: "PNP-1".to_string(),
            is_muted: false,
            volume_scalar: 0.45,
        }
    }

    #[test]
    fn headset_render_is_refused() {
        let result = admit(&descriptor(DeviceFlow::Render, EndpointFormFactor::Headset));
        assert_eq!(result, Err(Refusal::HeadsetRender));
    }

    #[test]
    fn headset_capture_is_admitted() {
        let record = admit(&descriptor(DeviceFlow::Capture, EndpointFormFactor::Headset))
            .expect("capture headsets are fine");
        assert_eq!(record.flow, DeviceFlow::Capture);
        assert_eq!(record.capture_volume, 450);
        assert_eq!(record.render_volume, 0);
    }

    #[test]
    fn render_volume_lands_on_render_side() {
        let record = admit(&descriptor(DeviceFlow::Render, EndpointFormFactor::Speakers))
            .expect("admitted");
        assert_eq!(record.render_volume, 450);
        assert_eq!(record.capture_volume, 0);
        assert!(!record.is_default_render);
        assert!(!record.is_default_capture);
    }

    #[test]
    fn muted_endpoint_reads_zero() {
        let mut muted = descriptor(DeviceFlow::Capture, EndpointFormFactor::Microphone);
        muted.is_muted = true;
        let record = admit(&muted).expect("admitted");
        assert_eq!(record.capture_volume, 0);
    }

    #[test]
    fn volume_scalar_is_clamped_and_rounded() {
        assert_eq!(scaled_volume(false, 1.5), 1000);
        assert_eq!(scaled_volume(false, -0.5), 0);
        assert_eq!(scaled_volume(false, 0.3005), 301);
        assert_eq!(scaled_volume(true, 1.0), 0);
    }

    #[test]
    fn combined_flow_is_not_admissible() {
        let result = admit(&descriptor(
            DeviceFlow::RenderAndCapture,
            EndpointFormFactor::Speakers,
        ));
        assert_eq!(result, Err(Refusal::UnsupportedFlow));
    }
}
