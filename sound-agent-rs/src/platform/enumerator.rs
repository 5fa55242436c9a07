//! MMDevice-backed endpoint gateway.
//!
//! Provides COM initialization and the [`EndpointGateway`] implementation
//! over `IMMDeviceEnumerator`, including per-endpoint volume watch
//! registration.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};
use windows::core::{Interface, GUID, PCWSTR};
use windows::Win32::Media::Audio::Endpoints::{
    IAudioEndpointVolume, IAudioEndpointVolumeCallback,
};
use windows::Win32::Media::Audio::{
    eAll, eCapture, eConsole, eRender, IMMDevice, IMMDeviceEnumerator, IMMEndpoint,
    IMMNotificationClient, MMDeviceEnumerator, DEVICE_STATE_ACTIVE,
};
use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoUninitialize, CLSCTX_ALL, COINIT_APARTMENTTHREADED, STGM,
};
use windows::Win32::UI::Shell::PropertiesSystem::{IPropertyStore, PROPERTYKEY};
// Re-export windows_core so the implement macro can find it
#[allow(unused_imports)]
use windows_core;

use crate::audio::gateway::{normalize_device_id, NO_PNP_CONTAINER_GUID};
use crate::audio::{
    AudioError, DeviceFlow, EndpointDescriptor, EndpointFormFactor, EndpointGateway,
};

use super::notifications::{EndpointNotificationAdapter, EventSink, VolumeNotificationAdapter};

// Property key for device friendly name
const PKEY_DEVICE_FRIENDLY_NAME: PROPERTYKEY = PROPERTYKEY {
    fmtid: GUID::from_u128(0xa45c254e_df1c_4efd_8020_67d146a850e0),
    pid: 14,
};

// Property key for endpoint physical form factor
const PKEY_AUDIO_ENDPOINT_FORM_FACTOR: PROPERTYKEY = PROPERTYKEY {
    fmtid: GUID::from_u128(0x1da5d803_d492_4edd_8c23_e0c0ffee7f0e),
    pid: 0,
};

// Property key for the device container GUID
const PKEY_DEVICE_CONTAINER_ID: PROPERTYKEY = PROPERTYKEY {
    fmtid: GUID::from_u128(0x8c7ed206_3f8a_4827_b3ab_ae9e1faefc6c),
    pid: 2,
};

// PROPVARIANT type tags read through the raw ABI view
const VT_UI4: u16 = 19;
const VT_CLSID: u16 = 72;

/// COM initialization guard that uninitializes COM on drop.
pub struct ComGuard {
    initialized: bool,
}

impl ComGuard {
    /// Initialize COM for the current thread.
    pub fn new() -> Result<Self, AudioError> {
        unsafe {
            CoInitializeEx(None, COINIT_APARTMENTTHREADED)
                .ok()
                .map_err(|e| AudioError::ComInitFailed {
                    reason: e.to_string(),
                })?;
        }
        Ok(Self { initialized: true })
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.initialized {
            unsafe {
                CoUninitialize();
            }
        }
    }
}

struct VolumeWatch {
    endpoint_volume: IAudioEndpointVolume,
    callback: IAudioEndpointVolumeCallback,
}

/// Endpoint gateway over the Windows MMDevice API.
pub struct WindowsEndpointGateway {
    enumerator: IMMDeviceEnumerator,
    watches: Mutex<HashMap<String, VolumeWatch>>,
    notification_client: Mutex<Option<IMMNotificationClient>>,
    sink: Mutex<Option<EventSink>>,
}

impl WindowsEndpointGateway {
    /// Create a new gateway.
    ///
    /// Note: COM must be initialized before calling this function.
    pub fn new() -> Result<Self, AudioError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL).map_err(|e| {
                    AudioError::EnumerationFailed {
                        reason: e.to_string(),
                    }
                })?;

            Ok(Self {
                enumerator,
                watches: Mutex::new(HashMap::new()),
                notification_client: Mutex::new(None),
                sink: Mutex::new(None),
            })
        }
    }

    /// Register the endpoint notification adapter and start forwarding raw
    /// events into `sink`. Call once per session, before the first reset.
    pub fn attach(&self, sink: EventSink) -> Result<(), AudioError> {
        *self.lock_sink() = Some(sink.clone());

        let client: IMMNotificationClient = EndpointNotificationAdapter::new(sink).into();
        unsafe {
            self.enumerator
                .RegisterEndpointNotificationCallback(&client)
                .map_err(|e| AudioError::EnumerationFailed {
                    reason: format!("notification registration failed: {e}"),
                })?;
        }
        *self.lock_client() = Some(client);
        Ok(())
    }

    /// Unregister the notification adapter and stop event delivery.
    pub fn detach(&self) {
        if let Some(client) = self.lock_client().take() {
            unsafe {
                let _ = self
                    .enumerator
                    .UnregisterEndpointNotificationCallback(&client);
            }
        }
        self.lock_sink().take();
    }

    fn lock_watches(&self) -> MutexGuard<'_, HashMap<String, VolumeWatch>> {
        self.watches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_client(&self) -> MutexGuard<'_, Option<IMMNotificationClient>> {
        self.notification_client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_sink(&self) -> MutexGuard<'_, Option<EventSink>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn device_by_raw_id(&self, device_id: &str) -> Result<IMMDevice, AudioError> {
        let device_id_wide: Vec<u16> = device_id.encode_utf16().chain(std::iter::once(0)).collect();
        unsafe {
            self.enumerator
                .GetDevice(PCWSTR::from_raw(device_id_wide.as_ptr()))
                .map_err(|e| AudioError::ResolutionFailed {
                    device_id: device_id.to_string(),
                    reason: e.to_string(),
                })
        }
    }

    /// Read id, flow, name, form factor, container identity, and volume
    /// state of one endpoint. Any missing piece fails resolution of this
    /// endpoint only.
    fn describe_endpoint(&self, device: &IMMDevice) -> Result<EndpointDescriptor, AudioError> {
        unsafe {
            let device_id = device
                .GetId()
                .map_err(|e| AudioError::EnumerationFailed {
                    reason: e.to_string(),
                })?
                .to_string()
                .map_err(|e| AudioError::EnumerationFailed {
                    reason: e.to_string(),
                })?;

            let resolution_failure = |reason: String| AudioError::ResolutionFailed {
                device_id: device_id.clone(),
                reason,
            };

            // Flow direction via IMMEndpoint
            let endpoint: IMMEndpoint = device
                .cast()
                .map_err(|e| resolution_failure(e.to_string()))?;
            let raw_flow = endpoint
                .GetDataFlow()
                .map_err(|e| resolution_failure(e.to_string()))?;
            let flow = if raw_flow == eRender {
                DeviceFlow::Render
            } else if raw_flow == eCapture {
                DeviceFlow::Capture
            } else {
                return Err(resolution_failure("unsupported data flow".to_string()));
            };

            let props: IPropertyStore = device
                .OpenPropertyStore(STGM(0))
                .map_err(|e| resolution_failure(e.to_string()))?;

            let name = read_string_prop(&props, &PKEY_DEVICE_FRIENDLY_NAME).unwrap_or_else(|| {
                warn!(device_id, "endpoint has no usable friendly name");
                "UnknownDeviceName".to_string()
            });

            let form_factor = EndpointFormFactor::from_raw(
                read_u32_prop(&props, &PKEY_AUDIO_ENDPOINT_FORM_FACTOR).unwrap_or(u32::MAX),
            );

            let pnp_id = match read_guid_prop(&props, &PKEY_DEVICE_CONTAINER_ID) {
                Some(container) if container != NO_PNP_CONTAINER_GUID => container,
                _ => {
                    let fallback = normalize_device_id(&device_id);
                    debug!(device_id, pnp_id = %fallback, "no container identity, using simplified device id");
                    fallback
                }
            };

            // Volume state; an endpoint without volume control is skipped
            let endpoint_volume: IAudioEndpointVolume = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|_| AudioError::VolumeNotAvailable)?;
            let is_muted = endpoint_volume
                .GetMute()
                .map_err(|e| resolution_failure(e.to_string()))?
                .as_bool();
            let volume_scalar = if is_muted {
                0.0
            } else {
                endpoint_volume
                    .GetMasterVolumeLevelScalar()
                    .map_err(|e| resolution_failure(e.to_string()))?
            };

            Ok(EndpointDescriptor {
                device_id,
                flow,
                name,
                form_factor,
                pnp_id,
                is_muted,
                volume_scalar,
            })
        }
    }
}

impl EndpointGateway for WindowsEndpointGateway {
    fn enumerate_endpoints(&self) -> Result<Vec<EndpointDescriptor>, AudioError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(eAll, DEVICE_STATE_ACTIVE)
                .map_err(|e| AudioError::EnumerationFailed {
                    reason: e.to_string(),
                })?;

            let count = collection
                .GetCount()
                .map_err(|e| AudioError::EnumerationFailed {
                    reason: e.to_string(),
                })?;

            let mut descriptors = Vec::with_capacity(count as usize);
            for i in 0..count {
                let device = match collection.Item(i) {
                    Ok(device) => device,
                    Err(err) => {
                        warn!(index = i, %err, "collection item failed");
                        continue;
                    }
                };
                match self.describe_endpoint(&device) {
                    Ok(descriptor) => descriptors.push(descriptor),
                    Err(err) => warn!(index = i, %err, "endpoint skipped"),
                }
            }
            Ok(descriptors)
        }
    }

    fn endpoint_by_id(&self, device_id: &str) -> Result<EndpointDescriptor, AudioError> {
        let device = self.device_by_raw_id(device_id)?;
        self.describe_endpoint(&device)
    }

    fn default_endpoint_id(&self, flow: DeviceFlow) -> Option<String> {
        let data_flow = match flow {
            DeviceFlow::Render => eRender,
            DeviceFlow::Capture => eCapture,
            _ => return None,
        };
        unsafe {
            let device = self
                .enumerator
                .GetDefaultAudioEndpoint(data_flow, eConsole)
                .ok()?;
            device.GetId().ok()?.to_string().ok()
        }
    }

    fn register_volume_watch(&self, device_id: &str) -> Result<(), AudioError> {
        let Some(sink) = self.lock_sink().clone() else {
            warn!(device_id, "no event sink attached, volume watch skipped");
            return Ok(());
        };

        let device = self.device_by_raw_id(device_id)?;
        let endpoint_volume: IAudioEndpointVolume = unsafe {
            device
                .Activate(CLSCTX_ALL, None)
                .map_err(|_| AudioError::VolumeNotAvailable)?
        };

        let callback: IAudioEndpointVolumeCallback =
            VolumeNotificationAdapter::new(device_id.to_string(), sink).into();
        unsafe {
            endpoint_volume
                .RegisterControlChangeNotify(&callback)
                .map_err(|e| AudioError::ResolutionFailed {
                    device_id: device_id.to_string(),
                    reason: e.to_string(),
                })?;
        }
        debug!(device_id, "volume watch registered");

        let previous = self.lock_watches().insert(
            device_id.to_string(),
            VolumeWatch {
                endpoint_volume,
                callback,
            },
        );
        if let Some(previous) = previous {
            unsafe {
                let _ = previous
                    .endpoint_volume
                    .UnregisterControlChangeNotify(&previous.callback);
            }
        }
        Ok(())
    }

    fn unregister_volume_watch(&self, device_id: &str) {
        if let Some(watch) = self.lock_watches().remove(device_id) {
            unsafe {
                if let Err(err) = watch
                    .endpoint_volume
                    .UnregisterControlChangeNotify(&watch.callback)
                {
                    warn!(device_id, %err, "volume watch unregistration failed");
                }
            }
            debug!(device_id, "volume watch unregistered");
        }
    }
}

impl Drop for WindowsEndpointGateway {
    fn drop(&mut self) {
        self.detach();
        let watches: Vec<VolumeWatch> = self.lock_watches().drain().map(|(_, w)| w).collect();
        for watch in watches {
            unsafe {
                let _ = watch
                    .endpoint_volume
                    .UnregisterControlChangeNotify(&watch.callback);
            }
        }
    }
}

/// Read a string property; empty and mistyped values read as absent.
fn read_string_prop(props: &IPropertyStore, key: &PROPERTYKEY) -> Option<String> {
    let prop = unsafe { props.GetValue(key) }.ok()?;
    let value = prop.to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn read_u32_prop(props: &IPropertyStore, key: &PROPERTYKEY) -> Option<u32> {
    let prop = unsafe { props.GetValue(key) }.ok()?;
    unsafe {
        let raw = prop.as_raw();
        if raw.Anonymous.Anonymous.vt == VT_UI4 {
            Some(raw.Anonymous.Anonymous.Anonymous.ulVal)
        } else {
            None
        }
    }
}

/// Read a GUID property formatted the way container identities are
/// compared: uppercase hex, no braces.
fn read_guid_prop(props: &IPropertyStore, key: &PROPERTYKEY) -> Option<String> {
    let prop = unsafe { props.GetValue(key) }.ok()?;
    unsafe {
        let raw = prop.as_raw();
        if raw.Anonymous.Anonymous.vt != VT_CLSID {
            return None;
        }
        let guid_ptr = raw.Anonymous.Anonymous.Anonymous.puuid as *const GUID;
        if guid_ptr.is_null() {
            return None;
        }
        Some(format_guid(&*guid_ptr))
    }
}

fn format_guid(guid: &GUID) -> String {
    format!(
        "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
        guid.data1,
        guid.data2,
        guid.data3,
        guid.data4[0],
        guid.data4[1],
        guid.data4[2],
        guid.data4[3],
        guid.data4[4],
        guid.data4[5],
        guid.data4[6],
        guid.data4[7],
    )
}
