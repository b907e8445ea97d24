//! Binding of one advertised service onto a device.

use tracing::debug;

use crate::descriptor::ServiceDescriptor;
use crate::device::Device;
use crate::errors::{BindError, GenerationError, ServiceBindError};
use crate::naming::derive_names;
use crate::session::Session;

/// Runs fetch, generate, persist, load, instantiate and attach for a
/// single service.
pub struct ProxyBinder<'a> {
    session: &'a Session,
}

impl<'a> ProxyBinder<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Attaches a proxy for `descriptor` to `device` and returns the
    /// attribute name it was attached under.
    ///
    /// Failures only concern this service; nothing is attached when one
    /// occurs.
    pub fn bind(
        &self,
        device: &Device,
        descriptor: &ServiceDescriptor,
    ) -> Result<String, ServiceBindError> {
        let names = derive_names(descriptor);
        let proxy_dir = self.session.proxy_dir();
        self.session.loader().add_search_path(proxy_dir);

        let scpd = self.session.fetcher().fetch(&descriptor.scpd_url)?;

        let generator = self.session.generator();
        let generated = generator.generate(&descriptor.type_urn, &scpd)?;
        if generated.type_name() != names.type_name {
            return Err(GenerationError::TypeNameMismatch {
                expected: names.type_name,
                generated: generated.type_name().to_string(),
            }
            .into());
        }
        let unit = self.session.loader().unit_lock(&names.type_name);
        let proxy = {
            let _unit = unit.lock();
            generator.persist(&generated, proxy_dir)?;

            let persisted = self.session.loader().load(&names.type_name)?;
            if persisted != generated.metadata {
                return Err(BindError::Mismatch(names.type_name).into());
            }
            self.session.factory().instantiate(&generated.metadata, device)?
        };
        device.attach(&names.attribute_name, proxy);

        debug!(
            "Bound {} as {} on {:?}",
            names.type_name,
            names.attribute_name,
            device.handle()
        );
        Ok(names.attribute_name)
    }
}
