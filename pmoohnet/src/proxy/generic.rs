use std::any::Any;
use std::sync::Arc;

use crate::codegen::ProxyMetadata;
use crate::device::Device;
use crate::errors::Result;
use crate::proxy::{CpProxy, ProxyBuilder, ServiceProxy};
use crate::scpd::ScpdDocument;

/// Proxy driven entirely by SCPD metadata.
///
/// Used for services without a compiled typed proxy: actions and
/// properties are addressed by name through [`ServiceProxy::invoke`] and
/// [`ServiceProxy::read`].
pub struct GenericProxy {
    base: CpProxy,
    type_name: String,
    service_type: String,
    document: ScpdDocument,
}

impl GenericProxy {
    pub fn from_metadata(device: &Device, metadata: &ProxyMetadata) -> Result<Self> {
        let service = &metadata.service_type;
        let mut builder = ProxyBuilder::new(device, &service.domain, &service.name, service.version);
        for action in &metadata.document.actions {
            builder = builder.action(&action.name, action.inputs(), action.outputs());
        }
        for property in metadata.document.properties() {
            builder = builder.property(&property.name, property.kind);
        }

        Ok(Self {
            base: builder.build()?,
            type_name: metadata.type_name.clone(),
            service_type: metadata.service_type_urn.clone(),
            document: metadata.document.clone(),
        })
    }

    pub fn document(&self) -> &ScpdDocument {
        &self.document
    }
}

impl ServiceProxy for GenericProxy {
    fn base(&self) -> &CpProxy {
        &self.base
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn service_type(&self) -> &str {
        &self.service_type
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
