//! Control point proxies.
//!
//! [`CpProxy`] is the runtime half shared by every service proxy: it owns
//! the native proxy handle, the declared actions and properties, the
//! subscription state and the two event callback slots. Typed proxies and
//! [`GenericProxy`] wrap one and expose it through [`ServiceProxy`].

mod generic;
mod property;

use std::any::Any;
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace};

pub use generic::GenericProxy;
pub use property::Property;
use property::PropertyReadGuard;

use crate::action::{Action, ActionOutput};
use crate::device::Device;
use crate::errors::{OhNetError, Result};
use crate::native::{
    ArgumentValue, EventCallback, ParameterKind, ParameterSpec, ProxyHandle, ServiceHandle,
};
use crate::session::{ObjectId, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribed,
}

/// Notification delivered by the native event context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyEvent {
    PropertyChanged,
    InitialEvent,
}

/// Single-slot callbacks plus channel listeners, shared with the native
/// trampolines. Holds no reference back to the proxy.
#[derive(Default)]
struct EventSlots {
    changed: RwLock<Option<EventCallback>>,
    initial: RwLock<Option<EventCallback>>,
    listeners: Mutex<Vec<Sender<ProxyEvent>>>,
}

impl EventSlots {
    fn dispatch(&self, event: ProxyEvent) {
        // the slot lock is released before the callback runs so that a
        // callback may replace itself
        let callback = match event {
            ProxyEvent::PropertyChanged => self.changed.read().clone(),
            ProxyEvent::InitialEvent => self.initial.read().clone(),
        };
        if let Some(callback) = callback {
            callback();
        }
        self.listeners.lock().retain(|tx| tx.send(event).is_ok());
    }

    fn clear(&self) {
        *self.changed.write() = None;
        *self.initial.write() = None;
        self.listeners.lock().clear();
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

struct ProxyCore {
    id: ObjectId,
    session: Session,
    domain: String,
    name: String,
    version: u32,
    handle: ProxyHandle,
    service: ServiceHandle,
    actions: Vec<Arc<Action>>,
    properties: Vec<Property>,
    subscription: Mutex<SubscriptionState>,
    slots: Arc<EventSlots>,
    released: AtomicBool,
    in_flight: AtomicUsize,
    // readers are native calls on the live handle; shutdown takes the write side
    native_gate: RwLock<()>,
}

/// Native binding of one service on one device.
///
/// Cheap to clone; clones share state. Actions may be invoked concurrently
/// from any thread: no proxy lock is held while the native call runs.
#[derive(Clone)]
pub struct CpProxy {
    core: Arc<ProxyCore>,
}

impl std::fmt::Debug for CpProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpProxy")
            .field("id", &self.core.id)
            .field("service", &self.service_label())
            .field("handle", &self.core.handle)
            .field("state", &self.subscription_state())
            .finish()
    }
}

impl CpProxy {
    pub fn id(&self) -> ObjectId {
        self.core.id
    }

    pub fn handle(&self) -> ProxyHandle {
        self.core.handle
    }

    pub fn service_handle(&self) -> ServiceHandle {
        self.core.service
    }

    pub fn domain(&self) -> &str {
        &self.core.domain
    }

    pub fn service_name(&self) -> &str {
        &self.core.name
    }

    pub fn version(&self) -> u32 {
        self.core.version
    }

    fn service_label(&self) -> String {
        format!("{}:{}:{}", self.core.domain, self.core.name, self.core.version)
    }

    pub fn actions(&self) -> &[Arc<Action>] {
        &self.core.actions
    }

    pub fn action(&self, name: &str) -> Option<&Arc<Action>> {
        self.core.actions.iter().find(|a| a.name() == name)
    }

    pub fn properties(&self) -> &[Property] {
        &self.core.properties
    }

    pub fn subscription_state(&self) -> SubscriptionState {
        *self.core.subscription.lock()
    }

    pub fn is_shut_down(&self) -> bool {
        self.core.released.load(Ordering::Acquire)
    }

    /// Invocations currently running against this proxy.
    pub fn in_flight(&self) -> usize {
        self.core.in_flight.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_shut_down() {
            Err(OhNetError::AlreadyShutdown(format!("proxy {}", self.service_label())))
        } else {
            Ok(())
        }
    }

    /// Runs `action` and waits for its outputs.
    pub fn invoke(&self, action: &str, args: &[(&str, ArgumentValue)]) -> Result<ActionOutput> {
        let _gate = self.core.native_gate.read();
        self.ensure_live()?;
        let declared = self.action(action).ok_or_else(|| OhNetError::UnknownAction {
            service: self.service_label(),
            action: action.to_string(),
        })?;

        let mut invocation = declared.invocation(args)?;
        let _in_flight = InFlight::enter(&self.core.in_flight);
        trace!("Invoking {} on {}", action, self.service_label());
        self.core
            .session
            .stack()
            .service_invoke_action(self.core.service, &mut invocation)
            .map_err(|e| OhNetError::native(action, e))?;

        invocation.into_output()
    }

    /// Reads the last evented value of `name` under the native read lock.
    pub fn read_property(&self, name: &str) -> Result<ArgumentValue> {
        let _gate = self.core.native_gate.read();
        self.ensure_live()?;
        let property = self
            .core
            .properties
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| OhNetError::UnknownProperty {
                service: self.service_label(),
                property: name.to_string(),
            })?;

        let stack = self.core.session.stack();
        let _lock = PropertyReadGuard::acquire(stack, self.core.handle);
        stack
            .property_value(property.handle())
            .map_err(|e| OhNetError::native(name, e))
    }

    pub fn subscribe(&self) -> Result<()> {
        self.ensure_live()?;
        let mut state = self.core.subscription.lock();
        if *state == SubscriptionState::Subscribed {
            return Ok(());
        }
        self.core.session.stack().proxy_subscribe(self.core.handle);
        *state = SubscriptionState::Subscribed;
        debug!("Subscribed to {}", self.service_label());
        Ok(())
    }

    pub fn unsubscribe(&self) -> Result<()> {
        if self.is_shut_down() {
            return Ok(());
        }
        let mut state = self.core.subscription.lock();
        if *state == SubscriptionState::Unsubscribed {
            return Ok(());
        }
        self.core.session.stack().proxy_unsubscribe(self.core.handle);
        *state = SubscriptionState::Unsubscribed;
        debug!("Unsubscribed from {}", self.service_label());
        Ok(())
    }

    /// Replaces the callback run on every property change. `None` clears it.
    pub fn set_property_changed(&self, callback: Option<EventCallback>) {
        *self.core.slots.changed.write() = callback;
    }

    /// Replaces the callback run once the initial event has arrived.
    pub fn set_property_initial_event(&self, callback: Option<EventCallback>) {
        *self.core.slots.initial.write() = callback;
    }

    /// Channel receiving every event of this proxy.
    pub fn events(&self) -> Receiver<ProxyEvent> {
        let (tx, rx) = unbounded::<ProxyEvent>();
        self.core.slots.listeners.lock().push(tx);
        rx
    }

    /// Multi-line listing of actions and properties under `title`.
    pub fn describe(&self, title: &str) -> String {
        let mut out = format!("  {}", title);
        out.push_str("\n    Actions:");
        for action in &self.core.actions {
            out.push('\n');
            out.push_str(&action.describe());
        }
        out.push_str("\n    Properties:");
        for property in &self.core.properties {
            let _ = write!(out, "\n      {}: {}", property.name(), property.kind().name());
        }
        out
    }

    /// Unsubscribes, releases actions and destroys the native proxy.
    ///
    /// Waits for running invocations and property reads to return first.
    /// Only the first call has any effect.
    pub fn shutdown(&self) {
        if self.core.released.swap(true, Ordering::AcqRel) {
            return;
        }
        let _gate = self.core.native_gate.write();
        let stack = self.core.session.stack();
        {
            let mut state = self.core.subscription.lock();
            stack.proxy_unsubscribe(self.core.handle);
            *state = SubscriptionState::Unsubscribed;
        }
        self.core.slots.clear();
        for action in &self.core.actions {
            action.shutdown();
        }
        stack.proxy_destroy(self.core.handle);
        self.core.session.deregister_proxy(self.core.id);
        info!("Proxy {} shut down", self.service_label());
    }
}

/// Declares the actions and properties of a proxy, then binds it.
pub struct ProxyBuilder<'a> {
    device: &'a Device,
    domain: String,
    name: String,
    version: u32,
    actions: Vec<(String, Vec<ParameterSpec>, Vec<ParameterSpec>)>,
    properties: Vec<(String, ParameterKind)>,
}

impl<'a> ProxyBuilder<'a> {
    pub fn new(device: &'a Device, domain: &str, name: &str, version: u32) -> Self {
        Self {
            device,
            domain: domain.to_string(),
            name: name.to_string(),
            version,
            actions: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn action(
        mut self,
        name: &str,
        inputs: Vec<ParameterSpec>,
        outputs: Vec<ParameterSpec>,
    ) -> Self {
        self.actions.push((name.to_string(), inputs, outputs));
        self
    }

    pub fn property(mut self, name: &str, kind: ParameterKind) -> Self {
        self.properties.push((name.to_string(), kind));
        self
    }

    pub fn build(self) -> Result<CpProxy> {
        let session = self.device.session();
        session.ensure_open()?;
        if self.device.is_shut_down() {
            return Err(OhNetError::AlreadyShutdown(format!(
                "device {:?}",
                self.device.handle()
            )));
        }

        let stack = session.stack();
        let handle = stack
            .proxy_create(&self.domain, &self.name, self.version, self.device.handle())
            .map_err(|e| OhNetError::native("create proxy", e))?;
        let service = stack.proxy_service(handle);

        let actions = self
            .actions
            .into_iter()
            .map(|(name, inputs, outputs)| Action::new(session, &name, inputs, outputs))
            .collect();

        let properties: Vec<Property> = self
            .properties
            .iter()
            .map(|(name, kind)| {
                let property = Property::new(stack, name, *kind);
                stack.proxy_add_property(handle, property.handle());
                property
            })
            .collect();

        let slots = Arc::new(EventSlots::default());
        let changed = Arc::clone(&slots);
        stack.proxy_set_property_changed(
            handle,
            Arc::new(move || changed.dispatch(ProxyEvent::PropertyChanged)),
        );
        let initial = Arc::clone(&slots);
        stack.proxy_set_property_initial_event(
            handle,
            Arc::new(move || initial.dispatch(ProxyEvent::InitialEvent)),
        );

        let proxy = CpProxy {
            core: Arc::new(ProxyCore {
                id: session.next_id(),
                session: session.clone(),
                domain: self.domain,
                name: self.name,
                version: self.version,
                handle,
                service,
                actions,
                properties,
                subscription: Mutex::new(SubscriptionState::Unsubscribed),
                slots,
                released: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                native_gate: RwLock::new(()),
            }),
        };
        session.register_proxy(&proxy);
        debug!(
            "Created proxy {} ({} actions, {} properties)",
            proxy.service_label(),
            proxy.actions().len(),
            proxy.properties().len()
        );
        Ok(proxy)
    }
}

/// Capability interface of a bound service proxy.
///
/// Implementors only provide identity and access to their [`CpProxy`];
/// every operation defaults to the base.
pub trait ServiceProxy: Send + Sync + 'static {
    fn base(&self) -> &CpProxy;

    /// e.g. `CpProxyAvOpenhomeOrgVolume2`
    fn type_name(&self) -> &str;

    /// e.g. `urn:av-openhome-org:service:Volume:2`
    fn service_type(&self) -> &str;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    fn invoke(&self, action: &str, args: &[(&str, ArgumentValue)]) -> Result<ActionOutput> {
        self.base().invoke(action, args)
    }

    fn read(&self, property: &str) -> Result<ArgumentValue> {
        self.base().read_property(property)
    }

    fn subscribe(&self) -> Result<()> {
        self.base().subscribe()
    }

    fn unsubscribe(&self) -> Result<()> {
        self.base().unsubscribe()
    }

    fn set_property_changed(&self, callback: Option<EventCallback>) {
        self.base().set_property_changed(callback)
    }

    fn set_property_initial_event(&self, callback: Option<EventCallback>) {
        self.base().set_property_initial_event(callback)
    }

    fn describe(&self) -> String {
        self.base().describe(self.type_name())
    }

    fn shutdown(&self) {
        self.base().shutdown()
    }
}
