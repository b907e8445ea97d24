//! In-memory [`NativeStack`] for tests and offline experiments.
//!
//! Every call is appended to a log that tests can inspect with
//! [`MockStack::calls`]. Device attributes, property values, action
//! results, adapters and failures are scripted through setters, and
//! native events are injected with the `fire_*`, `announce` and `withdraw`
//! methods.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::action::Invocation;
use crate::native::{
    ActionHandle, AdapterHandle, AdapterListHandle, ArgumentValue, DebugLevel, DeviceHandle,
    DeviceListCallback, DeviceListHandle, DeviceListKind, EventCallback, InitParams,
    NativeError, NativeStack, NetworkAdapterInfo, ParameterKind, ParameterSpec, PropertyHandle,
    ProxyHandle, ServiceHandle,
};
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Initialise(InitParams),
    Close,
    SetDebugLevel(DebugLevel),
    StartControlPoint(Ipv4Addr),
    AdapterListCreate(AdapterListHandle),
    AdapterListDestroy(AdapterListHandle),
    AdapterAddRef(AdapterHandle),
    AdapterRemoveRef(AdapterHandle),
    DeviceAddRef(DeviceHandle),
    DeviceRemoveRef(DeviceHandle),
    DeviceListCreate(DeviceListHandle, DeviceListKind),
    DeviceListRefresh(DeviceListHandle),
    DeviceListDestroy(DeviceListHandle),
    ProxyCreate {
        domain: String,
        name: String,
        version: u32,
        device: DeviceHandle,
        proxy: ProxyHandle,
    },
    ProxyDestroy(ProxyHandle),
    ProxySubscribe(ProxyHandle),
    ProxyUnsubscribe(ProxyHandle),
    ProxyAddProperty(ProxyHandle, PropertyHandle),
    PropertyReadLock(ProxyHandle),
    PropertyReadUnlock(ProxyHandle),
    SetPropertyChanged(ProxyHandle),
    SetPropertyInitialEvent(ProxyHandle),
    PropertyCreate(String),
    ActionCreate(String),
    ActionDestroy(ActionHandle),
    Invoke {
        service: ServiceHandle,
        action: String,
    },
}

#[derive(Default)]
struct MockState {
    calls: Vec<MockCall>,
    next_handle: u64,
    init_failure: Option<NativeError>,
    adapters: Vec<NetworkAdapterInfo>,
    udns: HashMap<DeviceHandle, String>,
    attributes: HashMap<(DeviceHandle, String), String>,
    properties: HashMap<PropertyHandle, (String, ParameterKind)>,
    property_values: HashMap<String, ArgumentValue>,
    property_failures: HashMap<String, NativeError>,
    responses: HashMap<String, Vec<(String, ArgumentValue)>>,
    action_failures: HashMap<String, NativeError>,
    proxy_failures: HashMap<String, NativeError>,
    changed: HashMap<ProxyHandle, EventCallback>,
    initial: HashMap<ProxyHandle, EventCallback>,
    device_lists: HashMap<DeviceListHandle, (DeviceListCallback, DeviceListCallback)>,
    destroyed_actions: Vec<ActionHandle>,
    invoke_delay: Duration,
}

impl MockState {
    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

#[derive(Default)]
pub struct MockStack {
    state: Mutex<MockState>,
    active_invocations: AtomicUsize,
    max_active_invocations: AtomicUsize,
}

impl MockStack {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Session over this stack with default collaborators.
    ///
    /// Panics if initialisation was scripted to fail; use
    /// [`Session::builder`] to observe that error.
    pub fn session(self: &Arc<Self>) -> Session {
        match Session::builder(self.clone()).build() {
            Ok(session) => session,
            Err(e) => panic!("mock session failed to initialise: {}", e),
        }
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn destroyed_actions(&self) -> Vec<ActionHandle> {
        self.state.lock().destroyed_actions.clone()
    }

    pub fn fail_initialise(&self, error: NativeError) {
        self.state.lock().init_failure = Some(error);
    }

    pub fn add_adapter(&self, name: &str, address: [u8; 4], subnet: [u8; 4]) {
        self.state.lock().adapters.push(NetworkAdapterInfo {
            name: name.to_string(),
            address: address.into(),
            subnet: subnet.into(),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
        });
    }

    pub fn set_udn(&self, device: DeviceHandle, udn: &str) {
        self.state.lock().udns.insert(device, udn.to_string());
    }

    pub fn set_attribute(&self, device: DeviceHandle, key: &str, value: &str) {
        self.state
            .lock()
            .attributes
            .insert((device, key.to_string()), value.to_string());
    }

    /// Scripts the description document and location of `device`.
    pub fn set_description(&self, device: DeviceHandle, xml: &str, location: &str) {
        self.set_attribute(device, "Upnp.DeviceXml", xml);
        self.set_attribute(device, "Upnp.Location", location);
    }

    /// Value reported for every property named `name`.
    pub fn set_property(&self, name: &str, value: ArgumentValue) {
        let mut state = self.state.lock();
        state.property_failures.remove(name);
        state.property_values.insert(name.to_string(), value);
    }

    pub fn fail_property(&self, name: &str, error: NativeError) {
        self.state
            .lock()
            .property_failures
            .insert(name.to_string(), error);
    }

    /// Output values returned by every invocation of `action`. Outputs not
    /// listed get the zero value of their kind.
    pub fn respond(&self, action: &str, outputs: Vec<(&str, ArgumentValue)>) {
        let outputs = outputs
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        self.state
            .lock()
            .responses
            .insert(action.to_string(), outputs);
    }

    pub fn fail_action(&self, action: &str, error: NativeError) {
        self.state
            .lock()
            .action_failures
            .insert(action.to_string(), error);
    }

    /// Makes proxy creation for service `name` fail.
    pub fn fail_proxy_create(&self, name: &str, error: NativeError) {
        self.state
            .lock()
            .proxy_failures
            .insert(name.to_string(), error);
    }

    /// Time each invocation spends inside the stack.
    pub fn set_invoke_delay(&self, delay: Duration) {
        self.state.lock().invoke_delay = delay;
    }

    /// Highest number of invocations observed running at once.
    pub fn max_concurrent_invocations(&self) -> usize {
        self.max_active_invocations.load(Ordering::SeqCst)
    }

    pub fn fire_property_changed(&self, proxy: ProxyHandle) {
        let callback = self.state.lock().changed.get(&proxy).cloned();
        if let Some(callback) = callback {
            callback();
        }
    }

    pub fn fire_initial_event(&self, proxy: ProxyHandle) {
        let callback = self.state.lock().initial.get(&proxy).cloned();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Reports `device` as discovered by `list`.
    pub fn announce(&self, list: DeviceListHandle, device: DeviceHandle) {
        let callback = self
            .state
            .lock()
            .device_lists
            .get(&list)
            .map(|(added, _)| Arc::clone(added));
        if let Some(callback) = callback {
            callback(device);
        }
    }

    /// Reports `device` as gone from `list`.
    pub fn withdraw(&self, list: DeviceListHandle, device: DeviceHandle) {
        let callback = self
            .state
            .lock()
            .device_lists
            .get(&list)
            .map(|(_, removed)| Arc::clone(removed));
        if let Some(callback) = callback {
            callback(device);
        }
    }

    fn record(&self, call: MockCall) {
        self.state.lock().calls.push(call);
    }
}

impl NativeStack for MockStack {
    fn initialise(&self, params: &InitParams) -> Result<(), NativeError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Initialise(params.clone()));
        match state.init_failure.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn close(&self) {
        self.record(MockCall::Close);
    }

    fn set_debug_level(&self, level: DebugLevel) {
        self.record(MockCall::SetDebugLevel(level));
    }

    fn start_control_point(&self, subnet: Ipv4Addr) -> Result<(), NativeError> {
        self.record(MockCall::StartControlPoint(subnet));
        Ok(())
    }

    fn adapter_list_create(
        &self,
    ) -> (AdapterListHandle, Vec<(AdapterHandle, NetworkAdapterInfo)>) {
        let mut state = self.state.lock();
        let list = AdapterListHandle(state.next());
        let infos = state.adapters.clone();
        let adapters = infos
            .into_iter()
            .map(|info| (AdapterHandle(state.next()), info))
            .collect();
        state.calls.push(MockCall::AdapterListCreate(list));
        (list, adapters)
    }

    fn adapter_list_destroy(&self, list: AdapterListHandle) {
        self.record(MockCall::AdapterListDestroy(list));
    }

    fn adapter_add_ref(&self, adapter: AdapterHandle) {
        self.record(MockCall::AdapterAddRef(adapter));
    }

    fn adapter_remove_ref(&self, adapter: AdapterHandle) {
        self.record(MockCall::AdapterRemoveRef(adapter));
    }

    fn device_add_ref(&self, device: DeviceHandle) {
        self.record(MockCall::DeviceAddRef(device));
    }

    fn device_remove_ref(&self, device: DeviceHandle) {
        self.record(MockCall::DeviceRemoveRef(device));
    }

    fn device_attribute(&self, device: DeviceHandle, key: &str) -> Option<String> {
        self.state
            .lock()
            .attributes
            .get(&(device, key.to_string()))
            .cloned()
    }

    fn device_udn(&self, device: DeviceHandle) -> String {
        self.state
            .lock()
            .udns
            .get(&device)
            .cloned()
            .unwrap_or_default()
    }

    fn device_list_create(
        &self,
        kind: &DeviceListKind,
        added: DeviceListCallback,
        removed: DeviceListCallback,
    ) -> Result<DeviceListHandle, NativeError> {
        let mut state = self.state.lock();
        let list = DeviceListHandle(state.next());
        state.device_lists.insert(list, (added, removed));
        state.calls.push(MockCall::DeviceListCreate(list, kind.clone()));
        Ok(list)
    }

    fn device_list_refresh(&self, list: DeviceListHandle) {
        self.record(MockCall::DeviceListRefresh(list));
    }

    fn device_list_destroy(&self, list: DeviceListHandle) {
        let mut state = self.state.lock();
        state.device_lists.remove(&list);
        state.calls.push(MockCall::DeviceListDestroy(list));
    }

    fn proxy_create(
        &self,
        domain: &str,
        name: &str,
        version: u32,
        device: DeviceHandle,
    ) -> Result<ProxyHandle, NativeError> {
        let mut state = self.state.lock();
        if let Some(error) = state.proxy_failures.get(name) {
            return Err(error.clone());
        }
        let proxy = ProxyHandle(state.next());
        state.calls.push(MockCall::ProxyCreate {
            domain: domain.to_string(),
            name: name.to_string(),
            version,
            device,
            proxy,
        });
        Ok(proxy)
    }

    fn proxy_service(&self, proxy: ProxyHandle) -> ServiceHandle {
        ServiceHandle(proxy.0)
    }

    fn proxy_destroy(&self, proxy: ProxyHandle) {
        let mut state = self.state.lock();
        state.changed.remove(&proxy);
        state.initial.remove(&proxy);
        state.calls.push(MockCall::ProxyDestroy(proxy));
    }

    fn proxy_subscribe(&self, proxy: ProxyHandle) {
        self.record(MockCall::ProxySubscribe(proxy));
    }

    fn proxy_unsubscribe(&self, proxy: ProxyHandle) {
        self.record(MockCall::ProxyUnsubscribe(proxy));
    }

    fn proxy_add_property(&self, proxy: ProxyHandle, property: PropertyHandle) {
        self.record(MockCall::ProxyAddProperty(proxy, property));
    }

    fn proxy_property_read_lock(&self, proxy: ProxyHandle) {
        self.record(MockCall::PropertyReadLock(proxy));
    }

    fn proxy_property_read_unlock(&self, proxy: ProxyHandle) {
        self.record(MockCall::PropertyReadUnlock(proxy));
    }

    fn proxy_set_property_changed(&self, proxy: ProxyHandle, callback: EventCallback) {
        let mut state = self.state.lock();
        state.changed.insert(proxy, callback);
        state.calls.push(MockCall::SetPropertyChanged(proxy));
    }

    fn proxy_set_property_initial_event(&self, proxy: ProxyHandle, callback: EventCallback) {
        let mut state = self.state.lock();
        state.initial.insert(proxy, callback);
        state.calls.push(MockCall::SetPropertyInitialEvent(proxy));
    }

    fn property_create(&self, name: &str, kind: ParameterKind) -> PropertyHandle {
        let mut state = self.state.lock();
        let property = PropertyHandle(state.next());
        state.properties.insert(property, (name.to_string(), kind));
        state.calls.push(MockCall::PropertyCreate(name.to_string()));
        property
    }

    fn property_value(&self, property: PropertyHandle) -> Result<ArgumentValue, NativeError> {
        let state = self.state.lock();
        let (name, kind) = state
            .properties
            .get(&property)
            .ok_or_else(|| NativeError::new(404, "unknown property handle"))?;
        if let Some(error) = state.property_failures.get(name) {
            return Err(error.clone());
        }
        Ok(state
            .property_values
            .get(name)
            .cloned()
            .unwrap_or_else(|| ArgumentValue::default_for(*kind)))
    }

    fn action_create(
        &self,
        name: &str,
        _inputs: &[ParameterSpec],
        _outputs: &[ParameterSpec],
    ) -> ActionHandle {
        let mut state = self.state.lock();
        let action = ActionHandle(state.next());
        state.calls.push(MockCall::ActionCreate(name.to_string()));
        action
    }

    fn action_destroy(&self, action: ActionHandle) {
        let mut state = self.state.lock();
        state.destroyed_actions.push(action);
        state.calls.push(MockCall::ActionDestroy(action));
    }

    fn service_invoke_action(
        &self,
        service: ServiceHandle,
        invocation: &mut Invocation,
    ) -> Result<(), NativeError> {
        let action = invocation.action_name().to_string();
        let (delay, failure, response) = {
            let mut state = self.state.lock();
            state.calls.push(MockCall::Invoke {
                service,
                action: action.clone(),
            });
            (
                state.invoke_delay,
                state.action_failures.get(&action).cloned(),
                state.responses.get(&action).cloned().unwrap_or_default(),
            )
        };

        let active = self.active_invocations.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_invocations.fetch_max(active, Ordering::SeqCst);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.active_invocations.fetch_sub(1, Ordering::SeqCst);

        if let Some(error) = failure {
            return Err(error);
        }

        let outputs: Vec<ParameterSpec> = invocation.output_specs().cloned().collect();
        for spec in outputs {
            let value = response
                .iter()
                .find(|(name, _)| *name == spec.name)
                .map(|(_, value)| value.clone())
                .unwrap_or_else(|| ArgumentValue::default_for(spec.kind));
            invocation.set_output(&spec.name, value)?;
        }
        Ok(())
    }
}
