//! Windows platform integration.
//!
//! MMDevice-backed [`crate::audio::EndpointGateway`] implementation plus
//! the COM notification adapters feeding raw events into a monitoring
//! session.

pub mod enumerator;
pub mod notifications;

pub use enumerator::{ComGuard, WindowsEndpointGateway};
pub use notifications::{EndpointNotificationAdapter, EventSink, VolumeNotificationAdapter};
