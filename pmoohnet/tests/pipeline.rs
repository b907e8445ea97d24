mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{DEVICE_XML, PRODUCT_SCPD, VOLUME_SCPD, VOLUME_URL, fixture, fixture_with};
use pmoohnet::mock::MockCall;
use pmoohnet::{
    ArgumentValue, Device, DeviceHandle, FetchError, GeneratedProxy, GenerationError,
    GenericProxy, OhNetError, ProxyGenerator, RustProxyGenerator, ServiceBindError,
    ServiceProxy, ServiceSelection, StackMode,
};

#[test]
fn start_all_binds_every_service_in_document_order() {
    let f = fixture();
    let device = f.session.device(DeviceHandle(1)).unwrap();

    let report = device.start(&ServiceSelection::All).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.bound, vec!["product", "volume"]);
    assert_eq!(device.attached_proxies(), vec!["product", "volume"]);

    let volume = device.proxy("volume").unwrap();
    assert_eq!(volume.type_name(), "CpProxyAvOpenhomeOrgVolume2");
    assert_eq!(volume.service_type(), "urn:av-openhome-org:service:Volume:2");
    assert!(
        f.proxy_dir
            .path()
            .join("cp_proxy_av_openhome_org_volume2.rs")
            .is_file()
    );
    assert!(
        f.proxy_dir
            .path()
            .join("cp_proxy_av_openhome_org_volume2.json")
            .is_file()
    );
    // without a registered typed proxy the generic one is used
    assert!(device.proxy_as::<GenericProxy>("volume").is_some());
}

#[test]
fn start_with_a_selection_only_fetches_selected_services() {
    let f = fixture();
    let device = f.session.device(DeviceHandle(1)).unwrap();

    let report = device
        .start(&ServiceSelection::from_names(["Volume"]))
        .unwrap();
    assert_eq!(report.bound, vec!["volume"]);
    assert_eq!(f.fetcher.requests(), vec![VOLUME_URL.to_string()]);
    assert!(device.proxy("product").is_none());
}

#[test]
fn a_failing_service_does_not_stop_its_siblings() {
    let f = fixture();
    f.fetcher.fail(common::PRODUCT_URL, 404);
    let device = f.session.device(DeviceHandle(1)).unwrap();

    let report = device.start(&ServiceSelection::All).unwrap();
    assert_eq!(report.bound, vec!["volume"]);
    assert_eq!(report.failures.len(), 1);

    let failure = &report.failures[0];
    assert_eq!(failure.service_name, "Product");
    assert_eq!(failure.service_type, "urn:av-openhome-org:service:Product:1");
    assert!(matches!(
        failure.error,
        ServiceBindError::Fetch(FetchError::HttpStatus { status: 404, .. })
    ));
}

#[test]
fn generic_proxy_invokes_and_reads_through_the_stack() {
    let f = fixture();
    let device = f.session.device(DeviceHandle(1)).unwrap();
    device.start(&ServiceSelection::from_names(["Volume"])).unwrap();
    let volume = device.proxy("volume").unwrap();

    f.stack.respond("Volume", vec![("Value", ArgumentValue::Uint(35))]);
    let mut out = volume.invoke("Volume", &[]).unwrap();
    assert_eq!(out.uint("Value").unwrap(), 35);

    volume
        .invoke("SetVolume", &[("Value", ArgumentValue::Uint(40))])
        .unwrap();
    assert!(matches!(
        volume.invoke("SetVolume", &[("Value", ArgumentValue::Bool(true))]),
        Err(OhNetError::ArgumentMismatch { .. })
    ));

    f.stack.set_property("Volume", ArgumentValue::Uint(40));
    assert_eq!(volume.read("Volume").unwrap(), ArgumentValue::Uint(40));
}

#[test]
fn restarting_replaces_the_attached_proxy() {
    let f = fixture();
    let device = f.session.device(DeviceHandle(1)).unwrap();
    device.start(&ServiceSelection::from_names(["Volume"])).unwrap();
    let first = device.proxy("volume").unwrap();

    device.start(&ServiceSelection::from_names(["Volume"])).unwrap();
    let second = device.proxy("volume").unwrap();

    assert_ne!(first.base().handle(), second.base().handle());
    assert!(first.base().is_shut_down());
    assert!(!second.base().is_shut_down());
    assert_eq!(device.attached_proxies(), vec!["volume"]);
    assert_eq!(f.session.counts().proxies, 1);
}

#[test]
fn concurrent_invocations_are_not_serialised() {
    let f = fixture();
    let device = f.session.device(DeviceHandle(1)).unwrap();
    device.start(&ServiceSelection::from_names(["Volume"])).unwrap();
    let volume = device.proxy("volume").unwrap();
    f.stack.set_invoke_delay(Duration::from_millis(200));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let volume = Arc::clone(&volume);
            thread::spawn(move || volume.invoke("Volume", &[]).map(|_| ()))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert!(f.stack.max_concurrent_invocations() > 1);
    assert_eq!(volume.base().in_flight(), 0);
}

#[test]
fn device_shutdown_then_session_shutdown_releases_each_object_once() {
    let f = fixture();
    f.stack.add_adapter("eth0", [192, 168, 1, 5], [192, 168, 1, 0]);
    f.session.start(StackMode::ControlPoint, None).unwrap();
    let device = f.session.device(DeviceHandle(1)).unwrap();
    device.start(&ServiceSelection::All).unwrap();
    device.proxy("volume").unwrap().subscribe().unwrap();
    let volume_handle = device.proxy("volume").unwrap().base().handle();

    device.shutdown().unwrap();
    assert!(device.attached_proxies().is_empty());
    assert_eq!(f.session.counts().devices, 0);
    assert_eq!(f.session.counts().proxies, 0);
    assert_eq!(f.session.counts().actions, 0);

    f.session.shutdown();
    assert_eq!(f.session.counts().total(), 0);

    let calls = f.stack.calls();
    let count = |wanted: &MockCall| calls.iter().filter(|c| *c == wanted).count();
    assert_eq!(count(&MockCall::DeviceRemoveRef(DeviceHandle(1))), 1);
    assert_eq!(count(&MockCall::ProxyDestroy(volume_handle)), 1);
    assert_eq!(count(&MockCall::Close), 1);

    let unsubscribe = calls
        .iter()
        .position(|c| *c == MockCall::ProxyUnsubscribe(volume_handle))
        .unwrap();
    let destroy = calls
        .iter()
        .position(|c| *c == MockCall::ProxyDestroy(volume_handle))
        .unwrap();
    assert!(unsubscribe < destroy);
}

#[test]
fn session_shutdown_releases_started_devices() {
    let f = fixture();
    let device = f.session.device(DeviceHandle(1)).unwrap();
    device.start(&ServiceSelection::All).unwrap();
    assert_eq!(f.session.counts().proxies, 2);

    f.session.shutdown();
    assert_eq!(f.session.counts().total(), 0);
    assert!(device.is_shut_down());
    assert!(matches!(
        device.shutdown(),
        Err(OhNetError::AlreadyShutdown(_))
    ));
}

#[test]
fn device_display_lists_attached_proxies() {
    let f = fixture();
    let device = f.session.device(DeviceHandle(1)).unwrap();
    device.start(&ServiceSelection::from_names(["Product"])).unwrap();

    let text = device.to_string();
    assert!(text.starts_with(
        "Device Kitchen (uuid:4c494e4e-0026-0f21-a3c6-01387403013f)\n  CpProxyAvOpenhomeOrgProduct1"
    ));
    assert!(text.contains("      Standby() -> (Value: Bool)"));
    assert!(text.contains("      Standby: Bool"));
}

/// Generator that lingers after persisting any proxy declaring `SetVolume`.
struct LingeringGenerator;

impl ProxyGenerator for LingeringGenerator {
    fn generate(
        &self,
        service_type: &str,
        scpd_xml: &str,
    ) -> Result<GeneratedProxy, GenerationError> {
        RustProxyGenerator.generate(service_type, scpd_xml)
    }

    fn persist(
        &self,
        proxy: &GeneratedProxy,
        target_dir: &Path,
    ) -> Result<PathBuf, GenerationError> {
        let path = RustProxyGenerator.persist(proxy, target_dir)?;
        if proxy
            .metadata
            .document
            .actions
            .iter()
            .any(|a| a.name == "SetVolume")
        {
            thread::sleep(Duration::from_millis(400));
        }
        Ok(path)
    }
}

fn action_names(device: &Device) -> Vec<String> {
    device
        .proxy("volume")
        .unwrap()
        .base()
        .actions()
        .iter()
        .map(|a| a.name().to_string())
        .collect()
}

#[test]
fn devices_sharing_a_service_type_keep_their_own_scpd() {
    let f = fixture_with(|builder| builder.generator(Arc::new(LingeringGenerator)));
    f.stack.set_description(
        DeviceHandle(2),
        DEVICE_XML,
        "http://192.168.1.21:55178/Ds/device.xml",
    );
    f.fetcher.serve(
        "http://192.168.1.21:55178/Ds/Volume/service.xml",
        &VOLUME_SCPD.replace("SetVolume", "SetBalance"),
    );
    let first = f.session.device(DeviceHandle(1)).unwrap();
    let second = f.session.device(DeviceHandle(2)).unwrap();

    let start = |device: &Arc<Device>| {
        let device = Arc::clone(device);
        thread::spawn(move || {
            device
                .start(&ServiceSelection::from_names(["Volume"]))
                .map(|report| report.bound)
                .map_err(|e| e.to_string())
        })
    };
    let first_start = start(&first);
    thread::sleep(Duration::from_millis(100));
    let second_start = start(&second);

    assert_eq!(first_start.join().unwrap().unwrap(), vec!["volume"]);
    assert_eq!(second_start.join().unwrap().unwrap(), vec!["volume"]);
    assert_eq!(action_names(&first), vec!["SetVolume", "Volume"]);
    assert_eq!(action_names(&second), vec!["SetBalance", "Volume"]);
}

const SHARED_SERVICE_XML: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <friendlyName>Bridge</friendlyName>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:ConnectionManager:1</serviceType>
        <SCPDURL>/root/cm.xml</SCPDURL>
      </service>
    </serviceList>
    <deviceList>
      <device>
        <serviceList>
          <service>
            <serviceType>urn:schemas-upnp-org:service:ConnectionManager:1</serviceType>
            <SCPDURL>/embedded/cm.xml</SCPDURL>
          </service>
        </serviceList>
      </device>
    </deviceList>
  </device>
</root>"#;

#[test]
fn a_service_name_shared_with_an_embedded_device_is_reported_once() {
    let f = fixture();
    f.stack.set_description(
        DeviceHandle(3),
        SHARED_SERVICE_XML,
        "http://192.168.1.30:49152/desc.xml",
    );
    f.fetcher.serve("http://192.168.1.30:49152/root/cm.xml", PRODUCT_SCPD);
    f.fetcher.serve("http://192.168.1.30:49152/embedded/cm.xml", PRODUCT_SCPD);
    let device = f.session.device(DeviceHandle(3)).unwrap();

    let report = device.start(&ServiceSelection::All).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.bound, vec!["connectionManager"]);
    assert_eq!(report.replaced, vec!["connectionManager"]);
    assert_eq!(device.attached_proxies(), vec!["connectionManager"]);
    assert_eq!(f.session.counts().proxies, 1);
}
