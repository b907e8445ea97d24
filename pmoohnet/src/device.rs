//! Discovered UPnP devices and the proxies attached to them.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::binder::ProxyBinder;
use crate::descriptor::{ServiceDescriptor, parse_services};
use crate::errors::{DescriptionError, OhNetError, Result, ServiceBindError};
use crate::native::DeviceHandle;
use crate::proxy::ServiceProxy;
use crate::session::{ObjectId, Session};

pub const ATTRIBUTE_DEVICE_XML: &str = "Upnp.DeviceXml";
pub const ATTRIBUTE_LOCATION: &str = "Upnp.Location";
pub const ATTRIBUTE_FRIENDLY_NAME: &str = "Upnp.FriendlyName";

/// Services to bind in [`Device::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceSelection {
    All,
    Named(BTreeSet<String>),
}

impl ServiceSelection {
    /// Selection from service names; the name `all` selects everything.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        if names.contains("all") {
            ServiceSelection::All
        } else {
            ServiceSelection::Named(names)
        }
    }

    pub fn includes(&self, service_name: &str) -> bool {
        match self {
            ServiceSelection::All => true,
            ServiceSelection::Named(names) => names.contains(service_name),
        }
    }
}

/// A service that could not be bound during [`Device::start`].
#[derive(Debug)]
pub struct BindFailure {
    pub service_name: String,
    pub service_type: String,
    pub error: ServiceBindError,
}

/// Outcome of [`Device::start`].
#[derive(Debug, Default)]
pub struct StartReport {
    /// Attribute names of the proxies bound by this call, in document order.
    pub bound: Vec<String>,
    /// Attribute names bound more than once by this call, such as a
    /// service shared by the root and an embedded device. Only the last
    /// proxy stays attached.
    pub replaced: Vec<String>,
    pub failures: Vec<BindFailure>,
}

impl StartReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

struct AttachedProxy {
    attribute: String,
    proxy: Arc<dyn ServiceProxy>,
}

/// A device as seen from the control point.
pub struct Device {
    id: ObjectId,
    handle: DeviceHandle,
    session: Session,
    proxies: RwLock<Vec<AttachedProxy>>,
    released: AtomicBool,
}

impl Device {
    pub(crate) fn new(session: &Session, handle: DeviceHandle) -> Arc<Device> {
        session.stack().device_add_ref(handle);
        let device = Arc::new(Device {
            id: session.next_id(),
            handle,
            session: session.clone(),
            proxies: RwLock::new(Vec::new()),
            released: AtomicBool::new(false),
        });
        session.register_device(&device);
        device
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_shut_down(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub fn attribute(&self, key: &str) -> Option<String> {
        self.session.stack().device_attribute(self.handle, key)
    }

    /// Queried from the native stack on every call.
    pub fn friendly_name(&self) -> Option<String> {
        self.attribute(ATTRIBUTE_FRIENDLY_NAME)
    }

    pub fn udn(&self) -> String {
        self.session.stack().device_udn(self.handle)
    }

    /// Services listed in the device description.
    pub fn services(&self) -> Result<Vec<ServiceDescriptor>> {
        let xml = self
            .attribute(ATTRIBUTE_DEVICE_XML)
            .ok_or(DescriptionError::MissingAttribute(ATTRIBUTE_DEVICE_XML))?;
        let location = self
            .attribute(ATTRIBUTE_LOCATION)
            .ok_or(DescriptionError::MissingAttribute(ATTRIBUTE_LOCATION))?;
        Ok(parse_services(&xml, &location)?)
    }

    /// Binds a proxy for every selected service.
    ///
    /// A description that cannot be parsed fails the whole call. Failures
    /// of individual services are collected in the report and do not stop
    /// the others.
    pub fn start(&self, selection: &ServiceSelection) -> Result<StartReport> {
        self.ensure_live()?;
        self.session.ensure_open()?;

        let services = self.services()?;
        let binder = ProxyBinder::new(&self.session);
        let mut report = StartReport::default();

        for descriptor in services
            .iter()
            .filter(|d| selection.includes(&d.service_name))
        {
            match binder.bind(self, descriptor) {
                Ok(attribute) => {
                    if let Some(pos) = report.bound.iter().position(|a| *a == attribute) {
                        warn!(
                            "⚠️ {} bound twice on {:?}, earlier proxy replaced",
                            attribute, self.handle
                        );
                        report.bound.remove(pos);
                        report.replaced.push(attribute.clone());
                    }
                    report.bound.push(attribute);
                }
                Err(error) => {
                    warn!(
                        "⚠️ Failed to bind {} ({}): {}",
                        descriptor.service_name, descriptor.type_urn, error
                    );
                    report.failures.push(BindFailure {
                        service_name: descriptor.service_name.clone(),
                        service_type: descriptor.type_urn.clone(),
                        error,
                    });
                }
            }
        }

        info!(
            "Device {:?} started: {} proxies bound, {} failures",
            self.handle,
            report.bound.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Attaches `proxy` under `attribute`; a proxy already attached under
    /// that name is shut down and replaced.
    pub(crate) fn attach(&self, attribute: &str, proxy: Arc<dyn ServiceProxy>) {
        let replaced = {
            let mut proxies = self.proxies.write();
            match proxies.iter_mut().find(|p| p.attribute == attribute) {
                Some(existing) => Some(std::mem::replace(&mut existing.proxy, proxy)),
                None => {
                    proxies.push(AttachedProxy {
                        attribute: attribute.to_string(),
                        proxy,
                    });
                    None
                }
            }
        };
        if let Some(old) = replaced {
            old.shutdown();
        }
    }

    pub fn proxy(&self, attribute: &str) -> Option<Arc<dyn ServiceProxy>> {
        self.proxies
            .read()
            .iter()
            .find(|p| p.attribute == attribute)
            .map(|p| Arc::clone(&p.proxy))
    }

    /// Attached proxy downcast to its typed form.
    pub fn proxy_as<T: ServiceProxy>(&self, attribute: &str) -> Option<Arc<T>> {
        self.proxy(attribute)?.into_any().downcast::<T>().ok()
    }

    /// Attribute names of the attached proxies, in attachment order.
    pub fn attached_proxies(&self) -> Vec<String> {
        self.proxies
            .read()
            .iter()
            .map(|p| p.attribute.clone())
            .collect()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_shut_down() {
            Err(OhNetError::AlreadyShutdown(format!("device {:?}", self.handle)))
        } else {
            Ok(())
        }
    }

    /// Shuts down attached proxies, leaves the session registry and drops
    /// the native reference. A second call is rejected.
    pub fn shutdown(&self) -> Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Err(OhNetError::AlreadyShutdown(format!("device {:?}", self.handle)));
        }

        let proxies = std::mem::take(&mut *self.proxies.write());
        for attached in proxies {
            attached.proxy.shutdown();
        }
        self.session.deregister_device(self.id);
        self.session.stack().device_remove_ref(self.handle);
        info!("Device {:?} shut down", self.handle);
        Ok(())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device {} ({})",
            self.friendly_name().unwrap_or_default(),
            self.udn()
        )?;
        for attached in self.proxies.read().iter() {
            write!(f, "\n{}", attached.proxy.describe())?;
        }
        Ok(())
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("proxies", &self.attached_proxies())
            .field("released", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCall, MockStack};

    #[test]
    fn selection_from_names() {
        assert_eq!(ServiceSelection::from_names(["all"]), ServiceSelection::All);
        let named = ServiceSelection::from_names(["Volume", "Info"]);
        assert!(named.includes("Volume"));
        assert!(!named.includes("Product"));
    }

    #[test]
    fn identity_is_queried_every_time() {
        let stack = MockStack::new();
        let session = stack.session();
        let device = session.device(DeviceHandle(3)).unwrap();
        stack.set_udn(DeviceHandle(3), "uuid:4c494e4e");
        stack.set_attribute(DeviceHandle(3), ATTRIBUTE_FRIENDLY_NAME, "Kitchen");
        assert_eq!(device.friendly_name().as_deref(), Some("Kitchen"));

        stack.set_attribute(DeviceHandle(3), ATTRIBUTE_FRIENDLY_NAME, "Dining");
        assert_eq!(device.friendly_name().as_deref(), Some("Dining"));
        assert_eq!(device.to_string(), "Device Dining (uuid:4c494e4e)");
    }

    #[test]
    fn missing_description_aborts_start() {
        let stack = MockStack::new();
        let session = stack.session();
        let device = session.device(DeviceHandle(3)).unwrap();
        let err = device.start(&ServiceSelection::All).unwrap_err();
        assert!(matches!(
            err,
            OhNetError::Description(DescriptionError::MissingAttribute(ATTRIBUTE_DEVICE_XML))
        ));
    }

    #[test]
    fn shutdown_releases_reference_and_rejects_a_second_call() {
        let stack = MockStack::new();
        let session = stack.session();
        let device = session.device(DeviceHandle(3)).unwrap();
        assert_eq!(session.counts().devices, 1);

        device.shutdown().unwrap();
        assert!(matches!(device.shutdown(), Err(OhNetError::AlreadyShutdown(_))));
        assert_eq!(session.counts().devices, 0);

        let removes = stack
            .calls()
            .iter()
            .filter(|c| **c == MockCall::DeviceRemoveRef(DeviceHandle(3)))
            .count();
        assert_eq!(removes, 1);
        assert!(device.start(&ServiceSelection::All).is_err());
    }
}
