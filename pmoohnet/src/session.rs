//! Explicit ohNet session.
//!
//! A [`Session`] owns the native stack and tracks every live native-backed
//! object (adapters, adapter lists, devices, device lists, actions, proxies)
//! so that [`Session::shutdown`] can release them in a fixed order before
//! closing the library. Objects register themselves on construction and
//! deregister from their own `shutdown`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use pmoconfig::Config;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::codegen::{ProxyGenerator, RustProxyGenerator};
use crate::config_ext::OhNetConfigExt;
use crate::device::Device;
use crate::device_list::DeviceList;
use crate::errors::{OhNetError, Result};
use crate::factory::ProxyFactory;
use crate::fetch::{HttpScpdFetcher, ScpdFetcher};
use crate::loader::ProxyLoader;
use crate::native::{DebugLevel, DeviceHandle, DeviceListKind, InitParams, NativeStack};
use crate::network::{Adapter, AdapterList};
use crate::platform::locate_library;
use crate::proxy::{CpProxy, ServiceProxy};

/// Identity of a registered object, unique within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Role in which the stack is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackMode {
    ControlPoint,
}

impl FromStr for StackMode {
    type Err = OhNetError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("cp") {
            Ok(StackMode::ControlPoint)
        } else {
            Err(OhNetError::UnsupportedMode(s.to_string()))
        }
    }
}

/// Number of live objects per registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounts {
    pub adapters: usize,
    pub adapter_lists: usize,
    pub devices: usize,
    pub device_lists: usize,
    pub actions: usize,
    pub proxies: usize,
}

impl SessionCounts {
    pub fn total(&self) -> usize {
        self.adapters
            + self.adapter_lists
            + self.devices
            + self.device_lists
            + self.actions
            + self.proxies
    }
}

struct Registry<T> {
    items: Mutex<BTreeMap<ObjectId, T>>,
}

impl<T: Clone> Registry<T> {
    fn new() -> Self {
        Self {
            items: Mutex::new(BTreeMap::new()),
        }
    }

    fn insert(&self, id: ObjectId, item: T) {
        self.items.lock().insert(id, item);
    }

    fn remove(&self, id: ObjectId) -> Option<T> {
        self.items.lock().remove(&id)
    }

    fn len(&self) -> usize {
        self.items.lock().len()
    }

    fn first(&self) -> Option<(ObjectId, T)> {
        self.items
            .lock()
            .iter()
            .next()
            .map(|(id, item)| (*id, item.clone()))
    }

    fn snapshot(&self) -> Vec<T> {
        self.items.lock().values().cloned().collect()
    }

    /// Shuts down the oldest entry until the registry is empty.
    ///
    /// The lock is never held across `shutdown`, which deregisters the
    /// object itself. An entry that fails to deregister is dropped so the
    /// sweep always terminates.
    fn drain(&self, kind: &str, shutdown: impl Fn(&T)) {
        while let Some((id, item)) = self.first() {
            shutdown(&item);
            if self.remove(id).is_some() {
                warn!("{} {} did not deregister on shutdown", kind, id);
            }
        }
    }
}

struct SessionInner {
    stack: Arc<dyn NativeStack>,
    fetcher: Arc<dyn ScpdFetcher>,
    generator: Arc<dyn ProxyGenerator>,
    loader: ProxyLoader,
    factory: ProxyFactory,
    proxy_dir: PathBuf,
    next_id: AtomicU64,
    closed: AtomicBool,

    adapters: Registry<Arc<Adapter>>,
    adapter_lists: Registry<Arc<AdapterList>>,
    devices: Registry<Arc<Device>>,
    device_lists: Registry<Arc<DeviceList>>,
    actions: Registry<Arc<Action>>,
    proxies: Registry<CpProxy>,
}

/// Shared handle on one initialised native stack.
///
/// Clones refer to the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("proxy_dir", &self.inner.proxy_dir)
            .field("closed", &self.is_closed())
            .field("counts", &self.counts())
            .finish()
    }
}

impl Session {
    pub fn builder(stack: Arc<dyn NativeStack>) -> SessionBuilder {
        SessionBuilder::new(stack)
    }

    pub fn stack(&self) -> &dyn NativeStack {
        self.inner.stack.as_ref()
    }

    pub fn fetcher(&self) -> &dyn ScpdFetcher {
        self.inner.fetcher.as_ref()
    }

    pub fn generator(&self) -> &dyn ProxyGenerator {
        self.inner.generator.as_ref()
    }

    pub fn loader(&self) -> &ProxyLoader {
        &self.inner.loader
    }

    pub fn factory(&self) -> &ProxyFactory {
        &self.inner.factory
    }

    /// Directory receiving generated proxies.
    pub fn proxy_dir(&self) -> &Path {
        &self.inner.proxy_dir
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(OhNetError::AlreadyShutdown("ohNet session".to_string()))
        } else {
            Ok(())
        }
    }

    pub(crate) fn next_id(&self) -> ObjectId {
        ObjectId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn set_debug_level(&self, level: DebugLevel) {
        debug!("Native debug level set to {:#x}", level.0);
        self.stack().set_debug_level(level);
    }

    /// Starts the stack on one network adapter.
    ///
    /// With a single adapter that adapter is used whatever `interface`
    /// says. Otherwise `interface` is matched against adapter names,
    /// addresses and subnets; without it the first adapter is used.
    pub fn start(&self, mode: StackMode, interface: Option<&str>) -> Result<Arc<Adapter>> {
        self.ensure_open()?;

        let adapters = AdapterList::create(self);
        let adapter = adapters.select(interface)?;

        match mode {
            StackMode::ControlPoint => self
                .stack()
                .start_control_point(adapter.subnet())
                .map_err(|e| OhNetError::native("start control point", e))?,
        }

        info!(
            "✅ Control point started on {} ({})",
            adapter.name(),
            adapter.address()
        );
        Ok(adapter)
    }

    /// Wraps a native device handle, taking a reference on it.
    pub fn device(&self, handle: DeviceHandle) -> Result<Arc<Device>> {
        self.ensure_open()?;
        Ok(Device::new(self, handle))
    }

    pub fn device_list<A, R>(
        &self,
        kind: DeviceListKind,
        on_added: A,
        on_removed: R,
    ) -> Result<Arc<DeviceList>>
    where
        A: Fn(&Arc<Device>) + Send + Sync + 'static,
        R: Fn(&Arc<Device>) + Send + Sync + 'static,
    {
        self.ensure_open()?;
        DeviceList::create(self, kind, on_added, on_removed)
    }

    /// Live devices in creation order.
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.inner.devices.snapshot()
    }

    pub fn counts(&self) -> SessionCounts {
        SessionCounts {
            adapters: self.inner.adapters.len(),
            adapter_lists: self.inner.adapter_lists.len(),
            devices: self.inner.devices.len(),
            device_lists: self.inner.device_lists.len(),
            actions: self.inner.actions.len(),
            proxies: self.inner.proxies.len(),
        }
    }

    /// Releases every live object, then closes the native library.
    ///
    /// Calling it again is a no-op.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down ohNet session ({} live objects)", self.counts().total());

        let inner = &self.inner;
        inner.adapters.drain("Adapter", |a| a.shutdown());
        inner.adapter_lists.drain("Adapter list", |l| l.shutdown());
        inner.devices.drain("Device", |d| {
            if let Err(e) = d.shutdown() {
                warn!("Device shutdown failed: {}", e);
            }
        });
        inner.device_lists.drain("Device list", |l| l.shutdown());
        inner.actions.drain("Action", |a| a.shutdown());
        inner.proxies.drain("Proxy", |p| p.shutdown());

        inner.stack.close();
        info!("✅ ohNet session closed");
    }

    pub(crate) fn register_adapter(&self, adapter: &Arc<Adapter>) {
        self.inner.adapters.insert(adapter.id(), Arc::clone(adapter));
    }

    pub(crate) fn deregister_adapter(&self, id: ObjectId) {
        self.inner.adapters.remove(id);
    }

    pub(crate) fn register_adapter_list(&self, list: &Arc<AdapterList>) {
        self.inner.adapter_lists.insert(list.id(), Arc::clone(list));
    }

    pub(crate) fn deregister_adapter_list(&self, id: ObjectId) {
        self.inner.adapter_lists.remove(id);
    }

    pub(crate) fn register_device(&self, device: &Arc<Device>) {
        self.inner.devices.insert(device.id(), Arc::clone(device));
    }

    pub(crate) fn deregister_device(&self, id: ObjectId) {
        self.inner.devices.remove(id);
    }

    pub(crate) fn register_device_list(&self, list: &Arc<DeviceList>) {
        self.inner.device_lists.insert(list.id(), Arc::clone(list));
    }

    pub(crate) fn deregister_device_list(&self, id: ObjectId) {
        self.inner.device_lists.remove(id);
    }

    pub(crate) fn register_action(&self, action: &Arc<Action>) {
        self.inner.actions.insert(action.id(), Arc::clone(action));
    }

    pub(crate) fn deregister_action(&self, id: ObjectId) {
        self.inner.actions.remove(id);
    }

    pub(crate) fn register_proxy(&self, proxy: &CpProxy) {
        self.inner.proxies.insert(proxy.id(), proxy.clone());
    }

    pub(crate) fn deregister_proxy(&self, id: ObjectId) {
        self.inner.proxies.remove(id);
    }
}

/// Assembles a [`Session`] and initialises the native stack.
pub struct SessionBuilder {
    stack: Arc<dyn NativeStack>,
    fetcher: Option<Arc<dyn ScpdFetcher>>,
    generator: Option<Arc<dyn ProxyGenerator>>,
    factory: ProxyFactory,
    proxy_dir: PathBuf,
    fetch_timeout: Duration,
    init_params: InitParams,
    debug_level: Option<DebugLevel>,
}

impl SessionBuilder {
    pub fn new(stack: Arc<dyn NativeStack>) -> Self {
        Self {
            stack,
            fetcher: None,
            generator: None,
            factory: ProxyFactory::new(),
            proxy_dir: std::env::temp_dir().join("pmoohnet-proxies"),
            fetch_timeout: crate::fetch::DEFAULT_FETCH_TIMEOUT,
            init_params: InitParams::default(),
            debug_level: None,
        }
    }

    /// Reads proxy directory, fetch timeout, init parameters and debug
    /// level from the `host.ohnet` section of `config`.
    ///
    /// When `host.ohnet.library_dir` is set the native library must be
    /// present there.
    pub fn from_config(stack: Arc<dyn NativeStack>, config: &Config) -> anyhow::Result<Self> {
        if let Some(dir) = config.get_library_dir()? {
            let library = locate_library(&dir)?;
            debug!("Native library found at {}", library.display());
        }
        let mut builder = Self::new(stack)
            .proxy_dir(config.get_proxy_dir()?)
            .fetch_timeout(Duration::from_secs(config.get_fetch_timeout_secs()?))
            .init_params(config.get_init_params()?);
        if let Some(level) = config.get_debug_level()? {
            builder = builder.debug_level(level);
        }
        Ok(builder)
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn ScpdFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn ProxyGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn proxy_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.proxy_dir = dir.into();
        self
    }

    /// Timeout of the default HTTP fetcher; ignored when a fetcher is set.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn init_params(mut self, params: InitParams) -> Self {
        self.init_params = params;
        self
    }

    pub fn debug_level(mut self, level: DebugLevel) -> Self {
        self.debug_level = Some(level);
        self
    }

    /// Registers a compiled typed proxy for `type_name`.
    pub fn register_proxy<F>(self, type_name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&Device) -> Result<Arc<dyn ServiceProxy>> + Send + Sync + 'static,
    {
        self.factory.register(type_name, constructor);
        self
    }

    pub fn build(self) -> Result<Session> {
        self.stack
            .initialise(&self.init_params)
            .map_err(|e| OhNetError::LibraryLoad {
                path: "ohNet".to_string(),
                reason: e.to_string(),
            })?;
        if let Some(level) = self.debug_level {
            self.stack.set_debug_level(level);
        }

        let fetcher = self
            .fetcher
            .unwrap_or_else(|| Arc::new(HttpScpdFetcher::new(self.fetch_timeout)));
        let generator = self
            .generator
            .unwrap_or_else(|| Arc::new(RustProxyGenerator));

        info!(
            "✅ ohNet initialised (generated proxies in {})",
            self.proxy_dir.display()
        );

        Ok(Session {
            inner: Arc::new(SessionInner {
                stack: self.stack,
                fetcher,
                generator,
                loader: ProxyLoader::new(),
                factory: self.factory,
                proxy_dir: self.proxy_dir,
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                adapters: Registry::new(),
                adapter_lists: Registry::new(),
                devices: Registry::new(),
                device_lists: Registry::new(),
                actions: Registry::new(),
                proxies: Registry::new(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCall, MockStack};
    use crate::native::{DeviceHandle, NativeError};

    #[test]
    fn stack_mode_accepts_cp_only() {
        assert_eq!("CP".parse::<StackMode>().unwrap(), StackMode::ControlPoint);
        assert!(matches!(
            "dv".parse::<StackMode>(),
            Err(OhNetError::UnsupportedMode(mode)) if mode == "dv"
        ));
    }

    #[test]
    fn initialisation_failure_is_a_library_error() {
        let stack = MockStack::new();
        stack.fail_initialise(NativeError::new(1, "no libohNet"));
        let err = Session::builder(stack.clone()).build().unwrap_err();
        assert!(matches!(err, OhNetError::LibraryLoad { .. }));
    }

    #[test]
    fn debug_level_is_applied_at_build() {
        let stack = MockStack::new();
        let _session = Session::builder(stack.clone())
            .debug_level(DebugLevel::NETWORK | DebugLevel::EVENT)
            .build()
            .unwrap();
        assert!(stack.calls().contains(&MockCall::SetDebugLevel(
            DebugLevel::NETWORK | DebugLevel::EVENT
        )));
    }

    #[test]
    fn start_fails_fast_without_adapters() {
        let stack = MockStack::new();
        let session = stack.session();
        assert!(matches!(
            session.start(StackMode::ControlPoint, None),
            Err(OhNetError::NoAdapter)
        ));
    }

    #[test]
    fn start_picks_the_requested_adapter() {
        let stack = MockStack::new();
        stack.add_adapter("eth0", [192, 168, 1, 10], [192, 168, 1, 0]);
        stack.add_adapter("wlan0", [10, 0, 0, 5], [10, 0, 0, 0]);
        let session = stack.session();

        let adapter = session.start(StackMode::ControlPoint, Some("10.0.0.0")).unwrap();
        assert_eq!(adapter.name(), "wlan0");
        assert!(stack
            .calls()
            .contains(&MockCall::StartControlPoint([10, 0, 0, 0].into())));

        assert!(matches!(
            session.start(StackMode::ControlPoint, Some("eth9")),
            Err(OhNetError::NoMatchingAdapter(name)) if name == "eth9"
        ));
        assert_eq!(
            session.start(StackMode::ControlPoint, None).unwrap().name(),
            "eth0"
        );
    }

    #[test]
    fn single_adapter_ignores_interface() {
        let stack = MockStack::new();
        stack.add_adapter("eth0", [192, 168, 1, 10], [192, 168, 1, 0]);
        let session = stack.session();
        let adapter = session.start(StackMode::ControlPoint, Some("nope")).unwrap();
        assert_eq!(adapter.name(), "eth0");
    }

    #[test]
    fn shutdown_sweeps_registries_in_order_then_closes() {
        let stack = MockStack::new();
        stack.add_adapter("eth0", [192, 168, 1, 10], [192, 168, 1, 0]);
        let session = stack.session();
        session.start(StackMode::ControlPoint, None).unwrap();
        let _device = session.device(DeviceHandle(7)).unwrap();
        assert_eq!(session.counts().adapters, 1);
        assert_eq!(session.counts().adapter_lists, 1);
        assert_eq!(session.counts().devices, 1);

        stack.clear_calls();
        session.shutdown();
        session.shutdown();

        assert_eq!(session.counts(), SessionCounts::default());
        let calls = stack.calls();
        let position = |wanted: &MockCall| calls.iter().position(|c| c == wanted).unwrap();
        let adapter = calls
            .iter()
            .position(|c| matches!(c, MockCall::AdapterRemoveRef(_)))
            .unwrap();
        let list = calls
            .iter()
            .position(|c| matches!(c, MockCall::AdapterListDestroy(_)))
            .unwrap();
        let device = position(&MockCall::DeviceRemoveRef(DeviceHandle(7)));
        let close = position(&MockCall::Close);
        assert!(adapter < list && list < device && device < close);
        assert_eq!(calls.iter().filter(|c| **c == MockCall::Close).count(), 1);
        assert!(session.device(DeviceHandle(8)).is_err());
    }

    #[test]
    fn builder_reads_the_ohnet_section() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "host:\n  ohnet:\n    debug_level: Event\n    init:\n      msearch_time_secs: 4\n",
        )
        .unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();

        let stack = MockStack::new();
        let session = SessionBuilder::from_config(stack.clone(), &config)
            .unwrap()
            .build()
            .unwrap();

        assert!(session.proxy_dir().starts_with(dir.path()));
        let calls = stack.calls();
        assert!(calls.contains(&MockCall::SetDebugLevel(DebugLevel::EVENT)));
        assert!(calls.iter().any(
            |c| matches!(c, MockCall::Initialise(params) if params.msearch_time_secs == 4)
        ));
    }

    #[test]
    fn missing_native_library_is_reported_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let lib_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            format!("host:\n  ohnet:\n    library_dir: {}\n", lib_dir.path().display()),
        )
        .unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();

        assert!(SessionBuilder::from_config(MockStack::new(), &config).is_err());
    }
}
