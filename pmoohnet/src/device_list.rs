//! Native discovery lists.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::device::Device;
use crate::errors::{OhNetError, Result};
use crate::native::{DeviceHandle, DeviceListHandle, DeviceListKind};
use crate::session::{ObjectId, Session};

/// Devices tracked by one native discovery list.
///
/// Each announced device is wrapped in a registered [`Device`] before the
/// user callback sees it. Removed devices leave the list but stay alive
/// until shut down.
pub struct DeviceList {
    id: ObjectId,
    handle: DeviceListHandle,
    kind: DeviceListKind,
    devices: Arc<Mutex<Vec<Arc<Device>>>>,
    session: Session,
    released: AtomicBool,
}

impl DeviceList {
    pub(crate) fn create<A, R>(
        session: &Session,
        kind: DeviceListKind,
        on_added: A,
        on_removed: R,
    ) -> Result<Arc<DeviceList>>
    where
        A: Fn(&Arc<Device>) + Send + Sync + 'static,
        R: Fn(&Arc<Device>) + Send + Sync + 'static,
    {
        let devices: Arc<Mutex<Vec<Arc<Device>>>> = Arc::new(Mutex::new(Vec::new()));

        let added = {
            let devices = Arc::clone(&devices);
            let session = session.clone();
            Arc::new(move |handle: DeviceHandle| {
                if session.is_closed() {
                    return;
                }
                if devices.lock().iter().any(|d| d.handle() == handle) {
                    return;
                }
                let device = Device::new(&session, handle);
                devices.lock().push(Arc::clone(&device));
                debug!("Device {:?} added to list", handle);
                on_added(&device);
            })
        };

        let removed = {
            let devices = Arc::clone(&devices);
            Arc::new(move |handle: DeviceHandle| {
                let device = {
                    let mut devices = devices.lock();
                    let index = devices.iter().position(|d| d.handle() == handle);
                    index.map(|i| devices.remove(i))
                };
                if let Some(device) = device {
                    debug!("Device {:?} removed from list", handle);
                    on_removed(&device);
                }
            })
        };

        let handle = session
            .stack()
            .device_list_create(&kind, added, removed)
            .map_err(|e| OhNetError::native("create device list", e))?;

        let list = Arc::new(DeviceList {
            id: session.next_id(),
            handle,
            kind,
            devices,
            session: session.clone(),
            released: AtomicBool::new(false),
        });
        session.register_device_list(&list);
        info!("Device list {:?} created ({:?})", handle, list.kind);
        Ok(list)
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn handle(&self) -> DeviceListHandle {
        self.handle
    }

    pub fn kind(&self) -> &DeviceListKind {
        &self.kind
    }

    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.lock().clone()
    }

    /// Asks the native list to search again.
    pub fn refresh(&self) {
        if !self.released.load(Ordering::Acquire) {
            self.session.stack().device_list_refresh(self.handle);
        }
    }

    pub fn shutdown(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.session.deregister_device_list(self.id);
        self.session.stack().device_list_destroy(self.handle);
        self.devices.lock().clear();
        debug!("Device list {:?} destroyed", self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockStack;

    #[test]
    fn announced_devices_are_wrapped_and_forwarded() {
        let stack = MockStack::new();
        let session = stack.session();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let gone = Arc::new(Mutex::new(Vec::new()));

        let (s, g) = (Arc::clone(&seen), Arc::clone(&gone));
        let list = session
            .device_list(
                DeviceListKind::UpnpServiceType {
                    domain: "av.openhome.org".into(),
                    service_type: "Volume".into(),
                    version: 2,
                },
                move |d| s.lock().push(d.handle()),
                move |d| g.lock().push(d.handle()),
            )
            .unwrap();

        stack.announce(list.handle(), DeviceHandle(10));
        stack.announce(list.handle(), DeviceHandle(11));
        stack.announce(list.handle(), DeviceHandle(10));
        assert_eq!(list.devices().len(), 2);
        assert_eq!(session.counts().devices, 2);

        stack.withdraw(list.handle(), DeviceHandle(10));
        assert_eq!(list.devices().len(), 1);
        assert_eq!(*seen.lock(), vec![DeviceHandle(10), DeviceHandle(11)]);
        assert_eq!(*gone.lock(), vec![DeviceHandle(10)]);

        list.shutdown();
        list.shutdown();
        assert_eq!(session.counts().device_lists, 0);
    }
}
