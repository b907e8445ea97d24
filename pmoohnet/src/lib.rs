//! Control-point bindings for the ohNet UPnP stack.
//!
//! A [`Session`] wraps an initialised [`NativeStack`]. Devices handed out
//! by the stack are wrapped in [`Device`]; [`Device::start`] reads the
//! device description, fetches each service's SCPD, generates a proxy for
//! it and attaches the result under a derived attribute name:
//!
//! ```rust,ignore
//! use pmoohnet::{ServiceSelection, Session, StackMode};
//!
//! let session = Session::builder(stack).build()?;
//! session.start(StackMode::ControlPoint, None)?;
//! let device = session.device(handle)?;
//! let report = device.start(&ServiceSelection::All)?;
//! if let Some(volume) = device.proxy("volume") {
//!     let mut out = volume.invoke("Volume", &[])?;
//!     println!("volume: {}", out.uint("Value")?);
//! }
//! session.shutdown();
//! ```

pub mod action;
pub mod binder;
pub mod codegen;
pub mod config_ext;
pub mod descriptor;
pub mod device;
pub mod device_list;
pub mod errors;
pub mod factory;
pub mod fetch;
pub mod loader;
pub mod logging;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod naming;
pub mod native;
pub mod network;
pub mod platform;
pub mod proxy;
pub mod scpd;
pub mod session;

pub use action::{Action, ActionOutput, Invocation};
pub use binder::ProxyBinder;
pub use codegen::{GeneratedProxy, ProxyGenerator, ProxyMetadata, RustProxyGenerator};
pub use config_ext::OhNetConfigExt;
pub use descriptor::{ServiceDescriptor, ServiceType};
pub use device::{BindFailure, Device, ServiceSelection, StartReport};
pub use device_list::DeviceList;
pub use errors::{
    BindError, DescriptionError, FetchError, GenerationError, OhNetError, Result,
    ServiceBindError,
};
pub use factory::ProxyFactory;
pub use fetch::{HttpScpdFetcher, ScpdFetcher};
pub use loader::ProxyLoader;
pub use logging::init_logging;
pub use naming::{ProxyNames, derive_names};
pub use native::{
    ArgumentValue, DebugLevel, DeviceHandle, DeviceListKind, EventCallback, InitParams,
    NativeError, NativeStack, ParameterKind, ParameterSpec,
};
pub use network::{Adapter, AdapterList};
pub use proxy::{
    CpProxy, GenericProxy, Property, ProxyBuilder, ProxyEvent, ServiceProxy, SubscriptionState,
};
pub use session::{ObjectId, Session, SessionBuilder, SessionCounts, StackMode};
