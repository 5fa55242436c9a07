//! FFI bindings for the sound agent device registry.
//!
//! This crate provides C ABI functions for host applications (e.g. .NET
//! via P/Invoke). All functions use panic::catch_unwind to prevent Rust
//! panics from unwinding across the FFI boundary.
//!
//! Lifecycle: `sound_agent_create` builds a monitoring session handle and
//! performs the initial enumeration; `sound_agent_register_observer`
//! installs a change callback; `sound_agent_shutdown` releases watches and
//! clears state (idempotent); `sound_agent_destroy` frees the handle.

use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr, CString};
use std::panic;
use std::ptr;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use sound_agent_rs::{AudioDevice, AudioError, DeviceChange, DeviceMonitor, DeviceObserver};

#[cfg(windows)]
use sound_agent_rs::platform::{ComGuard, EventSink, WindowsEndpointGateway};
#[cfg(windows)]
use sound_agent_rs::{DeviceEvent, EndpointGateway};

// ============================================================================
// Error Handling
// ============================================================================

/// Error codes returned by FFI functions.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    InvalidHandle = -1,
    InvalidArgument = -2,
    DeviceNotFound = -3,
    ComError = -4,
    JsonError = -5,
    VolumeNotAvailable = -6,
    EnumerationFailed = -7,
    Unsupported = -8,
    Panic = -99,
}

impl From<&AudioError> for ErrorCode {
    fn from(err: &AudioError) -> Self {
        match err {
            AudioError::DeviceNotFound { .. } => ErrorCode::DeviceNotFound,
            AudioError::IndexOutOfRange { .. } => ErrorCode::DeviceNotFound,
            AudioError::EnumerationFailed { .. } => ErrorCode::EnumerationFailed,
            AudioError::ResolutionFailed { .. } => ErrorCode::ComError,
            AudioError::ComInitFailed { .. } => ErrorCode::ComError,
            AudioError::VolumeNotAvailable => ErrorCode::VolumeNotAvailable,
            AudioError::Unsupported => ErrorCode::Unsupported,
        }
    }
}

/// Thread-local storage for the last error.
thread_local! {
    static LAST_ERROR: RefCell<Option<(ErrorCode, String)>> = const { RefCell::new(None) };
}

fn set_last_error(code: ErrorCode, message: impl Into<String>) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = Some((code, message.into()));
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

// ============================================================================
// Configuration and JSON Data Types
// ============================================================================

/// Configuration for agent creation.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// tracing env-filter directives, e.g. "info" or "sound_agent_rs=debug"
    #[serde(default)]
    pub log_level: Option<String>,
}

/// A merged device with its current state.
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioDeviceDto {
    pub pnp_id: String,
    pub name: String,
    pub is_render: bool,
    pub is_capture: bool,
    pub render_volume: u16,
    pub capture_volume: u16,
    pub is_default_render: bool,
    pub is_default_capture: bool,
}

impl From<AudioDevice> for AudioDeviceDto {
    fn from(device: AudioDevice) -> Self {
        Self {
            pnp_id: device.pnp_id,
            name: device.name,
            is_render: device.flow.has_render(),
            is_capture: device.flow.has_capture(),
            render_volume: device.render_volume,
            capture_volume: device.capture_volume,
            is_default_render: device.is_default_render,
            is_default_capture: device.is_default_capture,
        }
    }
}

/// Response containing the registry snapshot.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceListResponse {
    pub devices: Vec<AudioDeviceDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_render_pnp_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_capture_pnp_id: Option<String>,
}

// ============================================================================
// Fixed-Width Device Description
// ============================================================================

/// Capacity of the PnP identity buffer, terminator included.
pub const PNP_ID_CAPACITY: usize = 80;

/// Capacity of the device name buffer, terminator included.
pub const NAME_CAPACITY: usize = 128;

/// Device description with fixed-width, NUL-terminated string buffers.
///
/// Strings longer than the buffer are truncated, never overrun. Unused
/// fields of an absent device are zeroed.
#[repr(C)]
pub struct SoundDeviceDescription {
    pub pnp_id: [c_char; PNP_ID_CAPACITY],
    pub name: [c_char; NAME_CAPACITY],
    pub is_render: i32,
    pub is_capture: i32,
    pub is_default_render: i32,
    pub is_default_capture: i32,
    pub render_volume: u16,
    pub capture_volume: u16,
}

impl SoundDeviceDescription {
    fn clear(&mut self) {
        self.pnp_id = [0; PNP_ID_CAPACITY];
        self.name = [0; NAME_CAPACITY];
        self.is_render = 0;
        self.is_capture = 0;
        self.is_default_render = 0;
        self.is_default_capture = 0;
        self.render_volume = 0;
        self.capture_volume = 0;
    }

    fn fill(&mut self, device: &AudioDevice) {
        self.clear();
        write_truncated(&mut self.pnp_id, &device.pnp_id);
        write_truncated(&mut self.name, &device.name);
        self.is_render = device.flow.has_render() as i32;
        self.is_capture = device.flow.has_capture() as i32;
        self.is_default_render = device.is_default_render as i32;
        self.is_default_capture = device.is_default_capture as i32;
        self.render_volume = device.render_volume;
        self.capture_volume = device.capture_volume;
    }
}

/// Copy `src` into `dst`, truncating to capacity minus one; the last slot
/// always stays NUL.
fn write_truncated(dst: &mut [c_char], src: &str) {
    dst.fill(0);
    let capacity = dst.len().saturating_sub(1);
    for (slot, byte) in dst[..capacity].iter_mut().zip(src.bytes()) {
        *slot = byte as c_char;
    }
}

// ============================================================================
// Change Callback Observer
// ============================================================================

/// Change event kinds delivered to the registered callback.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Discovered = 0,
    Detached = 1,
    DefaultRenderChanged = 2,
    DefaultCaptureChanged = 3,
    VolumeRenderChanged = 4,
    VolumeCaptureChanged = 5,
}

fn event_kind(change: &DeviceChange) -> EventKind {
    match change {
        DeviceChange::Discovered { .. } => EventKind::Discovered,
        DeviceChange::Detached { .. } => EventKind::Detached,
        DeviceChange::DefaultRenderChanged { .. } => EventKind::DefaultRenderChanged,
        DeviceChange::DefaultCaptureChanged { .. } => EventKind::DefaultCaptureChanged,
        DeviceChange::VolumeRenderChanged { .. } => EventKind::VolumeRenderChanged,
        DeviceChange::VolumeCaptureChanged { .. } => EventKind::VolumeCaptureChanged,
    }
}

/// Device change callback. `pnp_id` is valid only for the duration of the
/// call; an empty string means "no default device exists".
pub type DeviceChangeCallback =
    extern "C" fn(event_kind: i32, pnp_id: *const c_char, user_data: *mut c_void);

struct CallbackObserver {
    callback: DeviceChangeCallback,
    user_data: *mut c_void,
}

// The caller guarantees user_data stays valid for the registration
// lifetime and that the callback is callable from any thread.
unsafe impl Send for CallbackObserver {}
unsafe impl Sync for CallbackObserver {}

impl DeviceObserver for CallbackObserver {
    fn on_device_change(&self, change: &DeviceChange) {
        let Ok(pnp_id) = CString::new(change.pnp_id()) else {
            return;
        };
        (self.callback)(event_kind(change) as i32, pnp_id.as_ptr(), self.user_data);
    }
}

// ============================================================================
// Agent Handle Type
// ============================================================================

/// Opaque handle to a monitoring session. Actually points to a SoundAgent
/// struct.
pub type SoundAgentHandle = *mut c_void;

/// Internal session state behind the handle.
struct SoundAgent {
    monitor: Arc<DeviceMonitor>,
    observer: Mutex<Option<Arc<CallbackObserver>>>,
    #[cfg(windows)]
    gateway: Arc<WindowsEndpointGateway>,
    #[cfg(windows)]
    _com: ComGuard,
}

#[cfg(windows)]
fn build_agent() -> Result<SoundAgent, AudioError> {
    let com = ComGuard::new()?;
    let gateway = Arc::new(WindowsEndpointGateway::new()?);
    let monitor = Arc::new(DeviceMonitor::new(
        gateway.clone() as Arc<dyn EndpointGateway>
    ));

    let sink: EventSink = {
        let monitor = monitor.clone();
        Arc::new(move |event: DeviceEvent| monitor.handle_event(event))
    };
    gateway.attach(sink)?;
    monitor.reset_content()?;

    Ok(SoundAgent {
        monitor,
        observer: Mutex::new(None),
        gateway,
        _com: com,
    })
}

#[cfg(not(windows))]
fn build_agent() -> Result<SoundAgent, AudioError> {
    Err(AudioError::Unsupported)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Allocate a C string from a Rust string. Caller must free with
/// sound_agent_free_string.
fn alloc_c_string(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        Err(_) => {
            // String contained a null byte, replace with empty
            CString::new("").unwrap().into_raw()
        }
    }
}

/// Parse a C string to a Rust string slice.
unsafe fn parse_c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

unsafe fn as_agent<'a>(handle: SoundAgentHandle) -> Option<&'a SoundAgent> {
    (handle as *const SoundAgent).as_ref()
}

fn init_tracing(config: &AgentConfig) {
    let directives = config.log_level.clone().unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

// ============================================================================
// FFI Functions - Lifecycle
// ============================================================================

/// Create a new monitoring session and perform the initial enumeration.
///
/// # Arguments
/// * `config_json` - JSON configuration string (can be null for defaults)
///
/// # Returns
/// Handle to the session, or null on failure. Check
/// sound_agent_last_error_code() on failure.
///
/// # Safety
/// The returned handle must be freed with sound_agent_destroy().
#[no_mangle]
pub extern "C" fn sound_agent_create(config_json: *const c_char) -> SoundAgentHandle {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let config = if config_json.is_null() {
            AgentConfig::default()
        } else {
            unsafe { parse_c_str(config_json) }
                .and_then(|json| serde_json::from_str(json).ok())
                .unwrap_or_default()
        };
        init_tracing(&config);
        tracing::debug!("creating monitoring session");

        build_agent()
    });

    match result {
        Ok(Ok(agent)) => Box::into_raw(Box::new(agent)) as SoundAgentHandle,
        Ok(Err(e)) => {
            set_last_error(ErrorCode::from(&e), e.to_string());
            ptr::null_mut()
        }
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during agent creation");
            ptr::null_mut()
        }
    }
}

/// Shut the session down: release all volume watches and clear the
/// registry and observer state. Idempotent; safe to invoke multiple times.
///
/// # Returns
/// 0 on success, negative error code on failure.
#[no_mangle]
pub extern "C" fn sound_agent_shutdown(handle: SoundAgentHandle) -> i32 {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let Some(agent) = (unsafe { as_agent(handle) }) else {
            set_last_error(ErrorCode::InvalidHandle, "Invalid handle");
            return ErrorCode::InvalidHandle as i32;
        };
        agent.monitor.shutdown();
        #[cfg(windows)]
        agent.gateway.detach();
        ErrorCode::Success as i32
    });

    match result {
        Ok(code) => code,
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during shutdown");
            ErrorCode::Panic as i32
        }
    }
}

/// Destroy a session handle.
///
/// Performs a shutdown first if one has not happened yet.
///
/// # Safety
/// The handle must have been created by sound_agent_create() and must not
/// be used after this call.
#[no_mangle]
pub extern "C" fn sound_agent_destroy(handle: SoundAgentHandle) {
    if handle.is_null() {
        return;
    }

    let _ = panic::catch_unwind(|| unsafe {
        let agent = Box::from_raw(handle as *mut SoundAgent);
        agent.monitor.shutdown();
        #[cfg(windows)]
        agent.gateway.detach();
        drop(agent);
    });
}

// ============================================================================
// FFI Functions - Observation
// ============================================================================

/// Register or replace the device change callback. Pass a null callback to
/// disable notifications.
///
/// The callback runs synchronously on whichever thread the platform
/// delivers a notification; keep it fast and thread-safe.
///
/// # Returns
/// 0 on success, negative error code on failure.
#[no_mangle]
pub extern "C" fn sound_agent_register_observer(
    handle: SoundAgentHandle,
    callback: Option<DeviceChangeCallback>,
    user_data: *mut c_void,
) -> i32 {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let Some(agent) = (unsafe { as_agent(handle) }) else {
            set_last_error(ErrorCode::InvalidHandle, "Invalid handle");
            return ErrorCode::InvalidHandle as i32;
        };

        let mut slot = agent
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.take() {
            let as_dyn: Arc<dyn DeviceObserver> = previous;
            agent.monitor.unsubscribe(&as_dyn);
        }
        if let Some(callback) = callback {
            let observer = Arc::new(CallbackObserver {
                callback,
                user_data,
            });
            agent.monitor.subscribe(observer.clone());
            *slot = Some(observer);
        }
        ErrorCode::Success as i32
    });

    match result {
        Ok(code) => code,
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during observer registration");
            ErrorCode::Panic as i32
        }
    }
}

/// Re-enumerate all endpoints, rebuilding the registry and the volume
/// watches.
///
/// # Returns
/// 0 on success, negative error code on failure. On failure the previous
/// registry content is left intact.
#[no_mangle]
pub extern "C" fn sound_agent_refresh(handle: SoundAgentHandle) -> i32 {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let Some(agent) = (unsafe { as_agent(handle) }) else {
            set_last_error(ErrorCode::InvalidHandle, "Invalid handle");
            return ErrorCode::InvalidHandle as i32;
        };
        match agent.monitor.reset_content() {
            Ok(()) => ErrorCode::Success as i32,
            Err(e) => {
                let code = ErrorCode::from(&e);
                set_last_error(code, e.to_string());
                code as i32
            }
        }
    });

    match result {
        Ok(code) => code,
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during refresh");
            ErrorCode::Panic as i32
        }
    }
}

// ============================================================================
// FFI Functions - Queries
// ============================================================================

/// Number of merged devices currently in the registry.
///
/// # Returns
/// The count, or a negative error code.
#[no_mangle]
pub extern "C" fn sound_agent_device_count(handle: SoundAgentHandle) -> i32 {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let Some(agent) = (unsafe { as_agent(handle) }) else {
            set_last_error(ErrorCode::InvalidHandle, "Invalid handle");
            return ErrorCode::InvalidHandle as i32;
        };
        agent.monitor.device_count() as i32
    });

    match result {
        Ok(count) => count,
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during device count");
            ErrorCode::Panic as i32
        }
    }
}

/// Get the device at a positional index.
///
/// # Arguments
/// * `handle` - Session handle
/// * `index` - Position in [0, sound_agent_device_count())
/// * `description` - Output struct; strings are truncated with a
///   guaranteed terminator
///
/// # Returns
/// 0 on success, negative error code on failure.
#[no_mangle]
pub extern "C" fn sound_agent_device_at(
    handle: SoundAgentHandle,
    index: u32,
    description: *mut SoundDeviceDescription,
) -> i32 {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let Some(agent) = (unsafe { as_agent(handle) }) else {
            set_last_error(ErrorCode::InvalidHandle, "Invalid handle");
            return ErrorCode::InvalidHandle as i32;
        };
        let Some(description) = (unsafe { description.as_mut() }) else {
            set_last_error(ErrorCode::InvalidArgument, "Null description");
            return ErrorCode::InvalidArgument as i32;
        };
        description.clear();

        match agent.monitor.device_at(index as usize) {
            Ok(device) => {
                description.fill(&device);
                ErrorCode::Success as i32
            }
            Err(e) => {
                let code = ErrorCode::from(&e);
                set_last_error(code, e.to_string());
                code as i32
            }
        }
    });

    match result {
        Ok(code) => code,
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during device lookup");
            ErrorCode::Panic as i32
        }
    }
}

fn get_default_device(
    handle: SoundAgentHandle,
    description: *mut SoundDeviceDescription,
    select: fn(&DeviceMonitor) -> Option<AudioDevice>,
) -> i32 {
    let Some(agent) = (unsafe { as_agent(handle) }) else {
        set_last_error(ErrorCode::InvalidHandle, "Invalid handle");
        return ErrorCode::InvalidHandle as i32;
    };
    let Some(description) = (unsafe { description.as_mut() }) else {
        set_last_error(ErrorCode::InvalidArgument, "Null description");
        return ErrorCode::InvalidArgument as i32;
    };

    description.clear();
    if let Some(device) = select(&agent.monitor) {
        description.fill(&device);
    }
    ErrorCode::Success as i32
}

/// Get the current default render device, or a zeroed struct if none.
///
/// # Returns
/// 0 on success, negative error code on failure.
#[no_mangle]
pub extern "C" fn sound_agent_get_default_render(
    handle: SoundAgentHandle,
    description: *mut SoundDeviceDescription,
) -> i32 {
    clear_last_error();

    match panic::catch_unwind(|| {
        get_default_device(handle, description, DeviceMonitor::default_render)
    }) {
        Ok(code) => code,
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during default render lookup");
            ErrorCode::Panic as i32
        }
    }
}

/// Get the current default capture device, or a zeroed struct if none.
///
/// # Returns
/// 0 on success, negative error code on failure.
#[no_mangle]
pub extern "C" fn sound_agent_get_default_capture(
    handle: SoundAgentHandle,
    description: *mut SoundDeviceDescription,
) -> i32 {
    clear_last_error();

    match panic::catch_unwind(|| {
        get_default_device(handle, description, DeviceMonitor::default_capture)
    }) {
        Ok(code) => code,
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during default capture lookup");
            ErrorCode::Panic as i32
        }
    }
}

/// Get the full registry snapshot as JSON.
///
/// # Returns
/// JSON string containing the device list and default identities. Caller
/// must free with sound_agent_free_string(). Returns null on failure.
#[no_mangle]
pub extern "C" fn sound_agent_snapshot_json(handle: SoundAgentHandle) -> *mut c_char {
    clear_last_error();

    let result = panic::catch_unwind(|| {
        let Some(agent) = (unsafe { as_agent(handle) }) else {
            set_last_error(ErrorCode::InvalidHandle, "Invalid handle");
            return ptr::null_mut();
        };

        let response = DeviceListResponse {
            devices: agent
                .monitor
                .snapshot()
                .into_iter()
                .map(Into::into)
                .collect(),
            default_render_pnp_id: agent.monitor.default_render_pnp_id(),
            default_capture_pnp_id: agent.monitor.default_capture_pnp_id(),
        };

        match serde_json::to_string(&response) {
            Ok(json) => alloc_c_string(&json),
            Err(e) => {
                set_last_error(ErrorCode::JsonError, e.to_string());
                ptr::null_mut()
            }
        }
    });

    match result {
        Ok(ptr) => ptr,
        Err(_) => {
            set_last_error(ErrorCode::Panic, "Panic during snapshot");
            ptr::null_mut()
        }
    }
}

// ============================================================================
// FFI Functions - Memory Management
// ============================================================================

/// Free a string allocated by this library.
///
/// # Safety
/// The pointer must have been returned by one of the sound_agent_*
/// functions. Do not call this on strings from other sources.
#[no_mangle]
pub extern "C" fn sound_agent_free_string(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }

    let _ = panic::catch_unwind(|| unsafe {
        let _ = CString::from_raw(ptr);
    });
}

// ============================================================================
// FFI Functions - Error Handling
// ============================================================================

/// Get the last error code.
///
/// # Returns
/// The error code from the last failed operation, or 0 if no error.
#[no_mangle]
pub extern "C" fn sound_agent_last_error_code() -> i32 {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|(code, _)| *code as i32)
            .unwrap_or(0)
    })
}

/// Get the last error message.
///
/// # Returns
/// Error message string. Caller must free with sound_agent_free_string().
/// Returns null if no error.
#[no_mangle]
pub extern "C" fn sound_agent_last_error_message() -> *mut c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|(_, msg)| alloc_c_string(msg))
            .unwrap_or(ptr::null_mut())
    })
}

// ============================================================================
// FFI Functions - Utility
// ============================================================================

/// Get the library version.
///
/// # Returns
/// Version string. Caller must free with sound_agent_free_string().
#[no_mangle]
pub extern "C" fn sound_agent_version() -> *mut c_char {
    alloc_c_string(env!("CARGO_PKG_VERSION"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sound_agent_rs::DeviceFlow;

    #[test]
    fn test_error_code_conversion() {
        assert_eq!(
            ErrorCode::from(&AudioError::DeviceNotFound {
                pnp_id: "test".to_string()
            }),
            ErrorCode::DeviceNotFound
        );
        assert_eq!(
            ErrorCode::from(&AudioError::EnumerationFailed {
                reason: "boom".to_string()
            }),
            ErrorCode::EnumerationFailed
        );
        assert_eq!(
            ErrorCode::from(&AudioError::Unsupported),
            ErrorCode::Unsupported
        );
    }

    #[test]
    fn test_write_truncated_always_terminates() {
        let mut buffer = [1 as c_char; 8];
        write_truncated(&mut buffer, "abcdefghij");
        assert_eq!(buffer[7], 0);
        let bytes: Vec<u8> = buffer[..7].iter().map(|&c| c as u8).collect();
        assert_eq!(&bytes, b"abcdefg");

        let mut buffer = [1 as c_char; 8];
        write_truncated(&mut buffer, "ab");
        assert_eq!(buffer[2], 0);
        assert_eq!(buffer[7], 0);
    }

    #[test]
    fn test_description_fill_and_clear() {
        let mut description = SoundDeviceDescription {
            pnp_id: [1; PNP_ID_CAPACITY],
            name: [1; NAME_CAPACITY],
            is_render: 7,
            is_capture: 7,
            is_default_render: 7,
            is_default_capture: 7,
            render_volume: 7,
            capture_volume: 7,
        };

        let device = AudioDevice::new(
            "D1".to_string(),
            "Mic Array/Speakers".to_string(),
            DeviceFlow::RenderAndCapture,
            300,
            450,
            true,
            false,
        );
        description.fill(&device);

        assert_eq!(description.is_render, 1);
        assert_eq!(description.is_capture, 1);
        assert_eq!(description.is_default_render, 1);
        assert_eq!(description.is_default_capture, 0);
        assert_eq!(description.render_volume, 300);
        assert_eq!(description.capture_volume, 450);
        assert_eq!(description.pnp_id[0], b'D' as c_char);
        assert_eq!(description.pnp_id[2], 0);
        assert_eq!(description.name[NAME_CAPACITY - 1], 0);
    }

    #[test]
    fn test_dto_mapping() {
        let device = AudioDevice::new(
            "D1".to_string(),
            "Speakers".to_string(),
            DeviceFlow::Render,
            300,
            0,
            true,
            false,
        );
        let dto = AudioDeviceDto::from(device);
        assert!(dto.is_render);
        assert!(!dto.is_capture);
        assert_eq!(dto.render_volume, 300);
        assert!(dto.is_default_render);
    }

    #[test]
    fn test_event_kind_mapping() {
        assert_eq!(
            event_kind(&DeviceChange::Discovered {
                pnp_id: "D1".to_string()
            }),
            EventKind::Discovered
        );
        assert_eq!(
            event_kind(&DeviceChange::VolumeCaptureChanged {
                pnp_id: "D1".to_string()
            }),
            EventKind::VolumeCaptureChanged
        );
    }

    #[test]
    fn test_version() {
        let version = sound_agent_version();
        assert!(!version.is_null());
        unsafe {
            let s = CStr::from_ptr(version).to_str().unwrap();
            assert!(!s.is_empty());
        }
        sound_agent_free_string(version);
    }

    #[test]
    fn test_invalid_handle_is_rejected() {
        assert_eq!(
            sound_agent_device_count(ptr::null_mut()),
            ErrorCode::InvalidHandle as i32
        );
        assert_eq!(
            sound_agent_refresh(ptr::null_mut()),
            ErrorCode::InvalidHandle as i32
        );
        assert_eq!(sound_agent_last_error_code(), ErrorCode::InvalidHandle as i32);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_create_reports_unsupported_off_windows() {
        let handle = sound_agent_create(ptr::null());
        assert!(handle.is_null());
        assert_eq!(sound_agent_last_error_code(), ErrorCode::Unsupported as i32);
    }
}
