//! Registry of compiled typed proxies keyed by proxy type name.
//!
//! Generated proxy sources expose a `register(&ProxyFactory)` function.
//! Once registered, binding a service whose type name matches constructs
//! the typed proxy; any other service falls back to a [`GenericProxy`]
//! built from its loaded metadata.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::codegen::ProxyMetadata;
use crate::device::Device;
use crate::errors::{BindError, Result};
use crate::proxy::{GenericProxy, ServiceProxy};

pub type ProxyConstructor = Arc<dyn Fn(&Device) -> Result<Arc<dyn ServiceProxy>> + Send + Sync>;

#[derive(Default)]
pub struct ProxyFactory {
    constructors: RwLock<HashMap<String, ProxyConstructor>>,
}

impl ProxyFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the constructor for `type_name`, replacing any previous one.
    pub fn register<F>(&self, type_name: impl Into<String>, constructor: F)
    where
        F: Fn(&Device) -> Result<Arc<dyn ServiceProxy>> + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        debug!("Typed proxy registered: {}", type_name);
        self.constructors
            .write()
            .insert(type_name, Arc::new(constructor));
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.constructors.read().contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Builds the proxy described by `metadata` on `device`.
    pub fn instantiate(
        &self,
        metadata: &ProxyMetadata,
        device: &Device,
    ) -> Result<Arc<dyn ServiceProxy>, BindError> {
        // the constructor runs without the registry lock held
        let constructor = self.constructors.read().get(&metadata.type_name).cloned();

        let proxy = match constructor {
            Some(constructor) => constructor(device),
            None => GenericProxy::from_metadata(device, metadata)
                .map(|p| Arc::new(p) as Arc<dyn ServiceProxy>),
        };

        proxy.map_err(|e| BindError::Instantiate {
            type_name: metadata.type_name.clone(),
            source: Box::new(e),
        })
    }
}

impl std::fmt::Debug for ProxyFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyFactory")
            .field("registered", &self.registered())
            .finish()
    }
}
