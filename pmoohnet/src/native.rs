//! Capability interface of the native ohNet engine.
//!
//! The bindings never talk to the network for eventing or action
//! marshalling themselves: everything goes through a [`NativeStack`]
//! implementation, usually a thin FFI wrapper around `libohNet`. Handles are
//! opaque tokens handed out by the stack.

use std::fmt;
use std::net::Ipv4Addr;
use std::ops::BitOr;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::Invocation;
use crate::errors::OhNetError;

macro_rules! native_handle {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u64);
        )*
    };
}

native_handle!(
    /// Reference-counted identity of a discovered device.
    DeviceHandle,
    /// Binding of one service on one device.
    ProxyHandle,
    /// Service handle derived from a [`ProxyHandle`].
    ServiceHandle,
    PropertyHandle,
    ActionHandle,
    AdapterListHandle,
    AdapterHandle,
    DeviceListHandle,
);

/// Error reported by the native engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("native error {code}: {description}")]
pub struct NativeError {
    pub code: u32,
    pub description: String,
}

impl NativeError {
    pub fn new(code: u32, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }
}

/// Trampoline invoked by the native event context on property events.
pub type EventCallback = Arc<dyn Fn() + Send + Sync>;

/// Trampoline invoked by a native device list when a device appears or leaves.
pub type DeviceListCallback = Arc<dyn Fn(DeviceHandle) + Send + Sync>;

/// Wire type of an action argument or property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterKind {
    Bool,
    Int,
    Uint,
    String,
    Binary,
}

impl ParameterKind {
    /// Maps a UPnP `dataType` to the native parameter kind.
    ///
    /// Unknown types (dates, uri, uuid, floats...) travel as strings.
    pub fn from_upnp_data_type(data_type: &str) -> Self {
        match data_type.trim() {
            "boolean" => ParameterKind::Bool,
            "i1" | "i2" | "i4" | "int" => ParameterKind::Int,
            "ui1" | "ui2" | "ui4" => ParameterKind::Uint,
            "bin.base64" | "bin.hex" => ParameterKind::Binary,
            _ => ParameterKind::String,
        }
    }

    /// Rust type used for this kind in generated proxies.
    pub fn rust_type(&self) -> &'static str {
        match self {
            ParameterKind::Bool => "bool",
            ParameterKind::Int => "i32",
            ParameterKind::Uint => "u32",
            ParameterKind::String => "String",
            ParameterKind::Binary => "Vec<u8>",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParameterKind::Bool => "Bool",
            ParameterKind::Int => "Int",
            ParameterKind::Uint => "Uint",
            ParameterKind::String => "String",
            ParameterKind::Binary => "Binary",
        }
    }
}

/// A typed value crossing the native boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentValue {
    Bool(bool),
    Int(i32),
    Uint(u32),
    String(String),
    Binary(Vec<u8>),
}

impl ArgumentValue {
    pub fn kind(&self) -> ParameterKind {
        match self {
            ArgumentValue::Bool(_) => ParameterKind::Bool,
            ArgumentValue::Int(_) => ParameterKind::Int,
            ArgumentValue::Uint(_) => ParameterKind::Uint,
            ArgumentValue::String(_) => ParameterKind::String,
            ArgumentValue::Binary(_) => ParameterKind::Binary,
        }
    }

    /// Zero value of a kind, as reported by a property that never evented.
    pub fn default_for(kind: ParameterKind) -> Self {
        match kind {
            ParameterKind::Bool => ArgumentValue::Bool(false),
            ParameterKind::Int => ArgumentValue::Int(0),
            ParameterKind::Uint => ArgumentValue::Uint(0),
            ParameterKind::String => ArgumentValue::String(String::new()),
            ParameterKind::Binary => ArgumentValue::Binary(Vec::new()),
        }
    }

    pub fn into_bool(self, name: &str) -> Result<bool, OhNetError> {
        match self {
            ArgumentValue::Bool(v) => Ok(v),
            _ => Err(value_type(name, "Bool")),
        }
    }

    pub fn into_int(self, name: &str) -> Result<i32, OhNetError> {
        match self {
            ArgumentValue::Int(v) => Ok(v),
            _ => Err(value_type(name, "Int")),
        }
    }

    pub fn into_uint(self, name: &str) -> Result<u32, OhNetError> {
        match self {
            ArgumentValue::Uint(v) => Ok(v),
            _ => Err(value_type(name, "Uint")),
        }
    }

    pub fn into_string(self, name: &str) -> Result<String, OhNetError> {
        match self {
            ArgumentValue::String(v) => Ok(v),
            _ => Err(value_type(name, "String")),
        }
    }

    pub fn into_binary(self, name: &str) -> Result<Vec<u8>, OhNetError> {
        match self {
            ArgumentValue::Binary(v) => Ok(v),
            _ => Err(value_type(name, "Binary")),
        }
    }
}

fn value_type(name: &str, expected: &'static str) -> OhNetError {
    OhNetError::ValueType {
        name: name.to_string(),
        expected,
    }
}

impl fmt::Display for ArgumentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentValue::Bool(v) => write!(f, "{}", v),
            ArgumentValue::Int(v) => write!(f, "{}", v),
            ArgumentValue::Uint(v) => write!(f, "{}", v),
            ArgumentValue::String(v) => write!(f, "{}", v),
            ArgumentValue::Binary(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Name and kind of one action parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParameterKind,
}

impl ParameterSpec {
    pub fn new(name: &str, kind: ParameterKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// One network interface as reported by the native adapter enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAdapterInfo {
    pub name: String,
    pub address: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

/// Library initialisation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitParams {
    pub msearch_time_secs: u32,
    pub subscription_duration_secs: u32,
    pub tcp_connect_timeout_ms: u32,
    pub user_agent: Option<String>,
}

impl Default for InitParams {
    fn default() -> Self {
        Self {
            msearch_time_secs: 1,
            subscription_duration_secs: 1800,
            tcp_connect_timeout_ms: 3000,
            user_agent: None,
        }
    }
}

/// Which devices a native device list tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceListKind {
    UpnpAll,
    UpnpRoot,
    UpnpUuid(String),
    UpnpDeviceType {
        domain: String,
        device_type: String,
        version: u32,
    },
    UpnpServiceType {
        domain: String,
        service_type: String,
        version: u32,
    },
}

/// Debug categories of the native engine, combinable with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DebugLevel(pub u32);

impl DebugLevel {
    pub const NONE: DebugLevel = DebugLevel(0);
    pub const TRACE: DebugLevel = DebugLevel(1 << 0);
    pub const THREAD: DebugLevel = DebugLevel(1 << 1);
    pub const NETWORK: DebugLevel = DebugLevel(1 << 2);
    pub const TIMER: DebugLevel = DebugLevel(1 << 3);
    pub const SSDP_MULTICAST: DebugLevel = DebugLevel(1 << 4);
    pub const SSDP_UNICAST: DebugLevel = DebugLevel(1 << 5);
    pub const HTTP: DebugLevel = DebugLevel(1 << 6);
    pub const DEVICE: DebugLevel = DebugLevel(1 << 7);
    pub const XML_FETCH: DebugLevel = DebugLevel(1 << 8);
    pub const SERVICE: DebugLevel = DebugLevel(1 << 9);
    pub const EVENT: DebugLevel = DebugLevel(1 << 10);
    pub const TOPOLOGY: DebugLevel = DebugLevel(1 << 11);
    pub const DV_INVOCATION: DebugLevel = DebugLevel(1 << 12);
    pub const DV_EVENT: DebugLevel = DebugLevel(1 << 13);
    pub const DV_WEB_SOCKET: DebugLevel = DebugLevel(1 << 14);
    pub const BONJOUR: DebugLevel = DebugLevel(1 << 16);
    pub const DV_DEVICE: DebugLevel = DebugLevel(1 << 17);
    pub const ERROR: DebugLevel = DebugLevel(1 << 18);
    pub const ALL: DebugLevel = DebugLevel(0x7FFF_FFFF);
    pub const VERBOSE: DebugLevel = DebugLevel(0x8000_0000);

    const NAMES: [(&'static str, DebugLevel); 21] = [
        ("None", Self::NONE),
        ("Trace", Self::TRACE),
        ("Thread", Self::THREAD),
        ("Network", Self::NETWORK),
        ("Timer", Self::TIMER),
        ("SsdpMulticast", Self::SSDP_MULTICAST),
        ("SsdpUnicast", Self::SSDP_UNICAST),
        ("Http", Self::HTTP),
        ("Device", Self::DEVICE),
        ("XmlFetch", Self::XML_FETCH),
        ("Service", Self::SERVICE),
        ("Event", Self::EVENT),
        ("Topology", Self::TOPOLOGY),
        ("DvInvocation", Self::DV_INVOCATION),
        ("DvEvent", Self::DV_EVENT),
        ("DvWebSocket", Self::DV_WEB_SOCKET),
        ("Bonjour", Self::BONJOUR),
        ("DvDevice", Self::DV_DEVICE),
        ("Error", Self::ERROR),
        ("All", Self::ALL),
        ("Verbose", Self::VERBOSE),
    ];

    pub fn contains(&self, other: DebugLevel) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DebugLevel {
    type Output = DebugLevel;

    fn bitor(self, rhs: Self) -> Self::Output {
        DebugLevel(self.0 | rhs.0)
    }
}

impl FromStr for DebugLevel {
    type Err = String;

    /// Parses `|`-separated category names, e.g. `"Network|Event"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut level = DebugLevel::NONE;
        for part in s.split('|').map(str::trim).filter(|p| !p.is_empty()) {
            let (_, value) = Self::NAMES
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(part))
                .ok_or_else(|| format!("unknown debug level '{}'", part))?;
            level = level | *value;
        }
        Ok(level)
    }
}

/// Operations the bindings require from the native engine.
///
/// Implementations must be callable from any thread. Property event
/// callbacks are delivered on the engine's own dispatch context and may
/// interleave with action invocations.
pub trait NativeStack: Send + Sync {
    fn initialise(&self, params: &InitParams) -> Result<(), NativeError>;
    fn close(&self);
    fn set_debug_level(&self, level: DebugLevel);
    fn start_control_point(&self, subnet: Ipv4Addr) -> Result<(), NativeError>;

    fn adapter_list_create(&self) -> (AdapterListHandle, Vec<(AdapterHandle, NetworkAdapterInfo)>);
    fn adapter_list_destroy(&self, list: AdapterListHandle);
    fn adapter_add_ref(&self, adapter: AdapterHandle);
    fn adapter_remove_ref(&self, adapter: AdapterHandle);

    fn device_add_ref(&self, device: DeviceHandle);
    fn device_remove_ref(&self, device: DeviceHandle);
    fn device_attribute(&self, device: DeviceHandle, key: &str) -> Option<String>;
    fn device_udn(&self, device: DeviceHandle) -> String;

    fn device_list_create(
        &self,
        kind: &DeviceListKind,
        added: DeviceListCallback,
        removed: DeviceListCallback,
    ) -> Result<DeviceListHandle, NativeError>;
    fn device_list_refresh(&self, list: DeviceListHandle);
    fn device_list_destroy(&self, list: DeviceListHandle);

    fn proxy_create(
        &self,
        domain: &str,
        name: &str,
        version: u32,
        device: DeviceHandle,
    ) -> Result<ProxyHandle, NativeError>;
    fn proxy_service(&self, proxy: ProxyHandle) -> ServiceHandle;
    fn proxy_destroy(&self, proxy: ProxyHandle);
    fn proxy_subscribe(&self, proxy: ProxyHandle);
    fn proxy_unsubscribe(&self, proxy: ProxyHandle);
    fn proxy_add_property(&self, proxy: ProxyHandle, property: PropertyHandle);
    fn proxy_property_read_lock(&self, proxy: ProxyHandle);
    fn proxy_property_read_unlock(&self, proxy: ProxyHandle);
    fn proxy_set_property_changed(&self, proxy: ProxyHandle, callback: EventCallback);
    fn proxy_set_property_initial_event(&self, proxy: ProxyHandle, callback: EventCallback);

    fn property_create(&self, name: &str, kind: ParameterKind) -> PropertyHandle;
    fn property_value(&self, property: PropertyHandle) -> Result<ArgumentValue, NativeError>;

    fn action_create(
        &self,
        name: &str,
        inputs: &[ParameterSpec],
        outputs: &[ParameterSpec],
    ) -> ActionHandle;
    fn action_destroy(&self, action: ActionHandle);

    /// Blocking invocation; fills the output arguments of `invocation`.
    fn service_invoke_action(
        &self,
        service: ServiceHandle,
        invocation: &mut Invocation,
    ) -> Result<(), NativeError>;
}
