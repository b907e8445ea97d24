//! Network adapters reported by the native stack.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::errors::{OhNetError, Result};
use crate::native::{AdapterHandle, AdapterListHandle, NetworkAdapterInfo};
use crate::session::{ObjectId, Session};

pub struct Adapter {
    id: ObjectId,
    handle: AdapterHandle,
    info: NetworkAdapterInfo,
    session: Session,
    released: AtomicBool,
}

impl Adapter {
    pub(crate) fn new(
        session: &Session,
        handle: AdapterHandle,
        info: NetworkAdapterInfo,
    ) -> Arc<Adapter> {
        session.stack().adapter_add_ref(handle);
        let adapter = Arc::new(Adapter {
            id: session.next_id(),
            handle,
            info,
            session: session.clone(),
            released: AtomicBool::new(false),
        });
        session.register_adapter(&adapter);
        adapter
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn handle(&self) -> AdapterHandle {
        self.handle
    }

    pub fn info(&self) -> &NetworkAdapterInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn address(&self) -> Ipv4Addr {
        self.info.address
    }

    pub fn subnet(&self) -> Ipv4Addr {
        self.info.subnet
    }

    pub fn netmask(&self) -> Ipv4Addr {
        self.info.netmask
    }

    /// True when `interface` names this adapter, its address or its subnet.
    pub fn matches(&self, interface: &str) -> bool {
        interface == self.info.name
            || interface == self.info.address.to_string()
            || interface == self.info.subnet.to_string()
    }

    pub fn shutdown(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.session.deregister_adapter(self.id);
        self.session.stack().adapter_remove_ref(self.handle);
        debug!("Adapter {} released", self.info.name);
    }
}

/// Snapshot of the host's adapters.
pub struct AdapterList {
    id: ObjectId,
    handle: AdapterListHandle,
    adapters: Vec<Arc<Adapter>>,
    session: Session,
    released: AtomicBool,
}

impl AdapterList {
    pub(crate) fn create(session: &Session) -> Arc<AdapterList> {
        let (handle, infos) = session.stack().adapter_list_create();
        let adapters = infos
            .into_iter()
            .map(|(adapter, info)| Adapter::new(session, adapter, info))
            .collect();
        let list = Arc::new(AdapterList {
            id: session.next_id(),
            handle,
            adapters,
            session: session.clone(),
            released: AtomicBool::new(false),
        });
        session.register_adapter_list(&list);
        list
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn adapters(&self) -> &[Arc<Adapter>] {
        &self.adapters
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn select(&self, interface: Option<&str>) -> Result<Arc<Adapter>> {
        match (self.adapters.as_slice(), interface) {
            ([], _) => Err(OhNetError::NoAdapter),
            ([only], _) => Ok(Arc::clone(only)),
            ([first, ..], None) => Ok(Arc::clone(first)),
            (adapters, Some(wanted)) => adapters
                .iter()
                .find(|a| a.matches(wanted))
                .cloned()
                .ok_or_else(|| OhNetError::NoMatchingAdapter(wanted.to_string())),
        }
    }

    pub fn shutdown(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.session.deregister_adapter_list(self.id);
        self.session.stack().adapter_list_destroy(self.handle);
    }
}
