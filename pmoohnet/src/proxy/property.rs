use crate::native::{NativeStack, ParameterKind, PropertyHandle, ProxyHandle};

/// An evented state variable of a proxied service.
#[derive(Debug, Clone)]
pub struct Property {
    name: String,
    kind: ParameterKind,
    handle: PropertyHandle,
}

impl Property {
    pub(crate) fn new(stack: &dyn NativeStack, name: &str, kind: ParameterKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            handle: stack.property_create(name, kind),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    pub fn handle(&self) -> PropertyHandle {
        self.handle
    }
}

/// Holds the proxy's native property read lock until dropped.
pub(crate) struct PropertyReadGuard<'a> {
    stack: &'a dyn NativeStack,
    proxy: ProxyHandle,
}

impl<'a> PropertyReadGuard<'a> {
    pub(crate) fn acquire(stack: &'a dyn NativeStack, proxy: ProxyHandle) -> Self {
        stack.proxy_property_read_lock(proxy);
        Self { stack, proxy }
    }
}

impl Drop for PropertyReadGuard<'_> {
    fn drop(&mut self) {
        self.stack.proxy_property_read_unlock(self.proxy);
    }
}
