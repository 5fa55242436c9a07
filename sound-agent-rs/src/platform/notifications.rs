//! COM notification adapters.
//!
//! Two narrow adapter types, one per callback contract, each forwarding
//! into the same event sink. The registry core never implements a COM
//! interface itself and never depends on COM refcount lifetimes.

use std::sync::Arc;

use windows::core::{implement, PCWSTR};
use windows::Win32::Media::Audio::Endpoints::{
    IAudioEndpointVolumeCallback, IAudioEndpointVolumeCallback_Impl,
};
use windows::Win32::Media::Audio::{
    eCapture, eCommunications, eConsole, eRender, EDataFlow, ERole, IMMNotificationClient,
    IMMNotificationClient_Impl, AUDIO_VOLUME_NOTIFICATION_DATA, DEVICE_STATE,
};
// Re-export windows_core so the implement macro can find it
#[allow(unused_imports)]
use windows_core;

use crate::audio::{DeviceEvent, DeviceFlow, DeviceRole, DeviceState};

/// Callback receiving translated raw notifications, on whichever thread
/// the platform delivers them.
pub type EventSink = Arc<dyn Fn(DeviceEvent) + Send + Sync>;

/// Adapter for the endpoint notification contract (device add/remove,
/// state changes, default changes).
#[implement(IMMNotificationClient)]
pub struct EndpointNotificationAdapter {
    sink: EventSink,
}

impl EndpointNotificationAdapter {
    pub fn new(sink: EventSink) -> Self {
        Self { sink }
    }

    fn convert_flow(flow: EDataFlow) -> Option<DeviceFlow> {
        if flow == eRender {
            Some(DeviceFlow::Render)
        } else if flow == eCapture {
            Some(DeviceFlow::Capture)
        } else {
            None
        }
    }

    fn convert_role(role: ERole) -> DeviceRole {
        if role == eConsole {
            DeviceRole::Console
        } else if role == eCommunications {
            DeviceRole::Communications
        } else {
            DeviceRole::Multimedia
        }
    }

    fn convert_state(state: DEVICE_STATE) -> Option<DeviceState> {
        match state.0 {
            1 => Some(DeviceState::Active),
            2 => Some(DeviceState::Disabled),
            4 => Some(DeviceState::NotPresent),
            8 => Some(DeviceState::Unplugged),
            _ => None, // unknown states carry no transition
        }
    }
}

impl IMMNotificationClient_Impl for EndpointNotificationAdapter_Impl {
    fn OnDeviceStateChanged(
        &self,
        pwstrdeviceid: &PCWSTR,
        dwnewstate: DEVICE_STATE,
    ) -> windows::core::Result<()> {
        unsafe {
            if let Ok(device_id) = pwstrdeviceid.to_string() {
                if let Some(new_state) = EndpointNotificationAdapter::convert_state(dwnewstate) {
                    (self.sink)(DeviceEvent::DeviceStateChanged {
                        device_id,
                        new_state,
                    });
                }
            }
        }
        Ok(())
    }

    fn OnDeviceAdded(&self, pwstrdeviceid: &PCWSTR) -> windows::core::Result<()> {
        unsafe {
            if let Ok(device_id) = pwstrdeviceid.to_string() {
                (self.sink)(DeviceEvent::DeviceAdded { device_id });
            }
        }
        Ok(())
    }

    fn OnDeviceRemoved(&self, pwstrdeviceid: &PCWSTR) -> windows::core::Result<()> {
        unsafe {
            if let Ok(device_id) = pwstrdeviceid.to_string() {
                (self.sink)(DeviceEvent::DeviceRemoved { device_id });
            }
        }
        Ok(())
    }

    fn OnDefaultDeviceChanged(
        &self,
        flow: EDataFlow,
        role: ERole,
        pwstrdefaultdeviceid: &PCWSTR,
    ) -> windows::core::Result<()> {
        let Some(flow) = EndpointNotificationAdapter::convert_flow(flow) else {
            return Ok(());
        };

        unsafe {
            let device_id = if pwstrdefaultdeviceid.is_null() {
                None
            } else {
                pwstrdefaultdeviceid.to_string().ok()
            };

            (self.sink)(DeviceEvent::DefaultDeviceChanged {
                flow,
                role: EndpointNotificationAdapter::convert_role(role),
                device_id,
            });
        }
        Ok(())
    }

    fn OnPropertyValueChanged(
        &self,
        _pwstrdeviceid: &PCWSTR,
        _key: &windows::Win32::UI::Shell::PropertiesSystem::PROPERTYKEY,
    ) -> windows::core::Result<()> {
        Ok(())
    }
}

/// Adapter for the per-endpoint volume callback contract.
///
/// One instance per watched endpoint, created and released by the
/// gateway's watch registration pairing.
#[implement(IAudioEndpointVolumeCallback)]
pub struct VolumeNotificationAdapter {
    device_id: String,
    sink: EventSink,
}

impl VolumeNotificationAdapter {
    pub fn new(device_id: String, sink: EventSink) -> Self {
        Self { device_id, sink }
    }
}

impl IAudioEndpointVolumeCallback_Impl for VolumeNotificationAdapter_Impl {
    fn OnNotify(
        &self,
        _pnotify: *mut AUDIO_VOLUME_NOTIFICATION_DATA,
    ) -> windows::core::Result<()> {
        (self.sink)(DeviceEvent::VolumeChanged {
            device_id: self.device_id.clone(),
        });
        Ok(())
    }
}
