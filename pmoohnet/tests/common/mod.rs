#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use pmoohnet::mock::MockStack;
use pmoohnet::{DeviceHandle, FetchError, ScpdFetcher, Session};

pub const LOCATION: &str = "http://192.168.1.20:55178/Ds/device.xml";

pub const DEVICE_XML: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>1</minor></specVersion>
  <device>
    <deviceType>urn:linn-co-uk:device:Source:1</deviceType>
    <friendlyName>Kitchen</friendlyName>
    <UDN>uuid:4c494e4e-0026-0f21-a3c6-01387403013f</UDN>
    <serviceList>
      <service>
        <serviceType>urn:av-openhome-org:service:Product:1</serviceType>
        <serviceId>urn:av-openhome-org:serviceId:Product</serviceId>
        <SCPDURL>/Ds/Product/service.xml</SCPDURL>
      </service>
      <service>
        <serviceType>urn:av-openhome-org:service:Volume:2</serviceType>
        <serviceId>urn:av-openhome-org:serviceId:Volume</serviceId>
        <SCPDURL>/Ds/Volume/service.xml</SCPDURL>
      </service>
    </serviceList>
  </device>
</root>"#;

pub const PRODUCT_URL: &str = "http://192.168.1.20:55178/Ds/Product/service.xml";
pub const VOLUME_URL: &str = "http://192.168.1.20:55178/Ds/Volume/service.xml";

pub const PRODUCT_SCPD: &str = r#"<?xml version="1.0"?>
<scpd xmlns="urn:schemas-upnp-org:service-1-0">
  <actionList>
    <action>
      <name>Standby</name>
      <argumentList>
        <argument>
          <name>Value</name>
          <direction>out</direction>
          <relatedStateVariable>Standby</relatedStateVariable>
        </argument>
      </argumentList>
    </action>
  </actionList>
  <serviceStateTable>
    <stateVariable sendEvents="yes">
      <name>Standby</name>
      <dataType>boolean</dataType>
    </stateVariable>
  </serviceStateTable>
</scpd>"#;

pub const VOLUME_SCPD: &str = r#"<?xml version="1.0"?>
<scpd xmlns="urn:schemas-upnp-org:service-1-0">
  <actionList>
    <action>
      <name>SetVolume</name>
      <argumentList>
        <argument>
          <name>Value</name>
          <direction>in</direction>
          <relatedStateVariable>Volume</relatedStateVariable>
        </argument>
      </argumentList>
    </action>
    <action>
      <name>Volume</name>
      <argumentList>
        <argument>
          <name>Value</name>
          <direction>out</direction>
          <relatedStateVariable>Volume</relatedStateVariable>
        </argument>
      </argumentList>
    </action>
  </actionList>
  <serviceStateTable>
    <stateVariable sendEvents="yes">
      <name>Volume</name>
      <dataType>ui4</dataType>
    </stateVariable>
  </serviceStateTable>
</scpd>"#;

/// SCPD documents served from memory, keyed by URL.
#[derive(Default)]
pub struct StaticFetcher {
    documents: Mutex<HashMap<String, Result<String, u16>>>,
    requests: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn serve(&self, url: &str, xml: &str) {
        self.documents.lock().insert(url.to_string(), Ok(xml.to_string()));
    }

    pub fn fail(&self, url: &str, status: u16) {
        self.documents.lock().insert(url.to_string(), Err(status));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

impl ScpdFetcher for StaticFetcher {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.requests.lock().push(url.to_string());
        match self.documents.lock().get(url) {
            Some(Ok(xml)) => Ok(xml.clone()),
            Some(Err(status)) => Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: *status,
            }),
            None => Err(FetchError::ConnectionRefused {
                url: url.to_string(),
            }),
        }
    }
}

pub struct Fixture {
    pub stack: Arc<MockStack>,
    pub fetcher: Arc<StaticFetcher>,
    pub session: Session,
    pub proxy_dir: tempfile::TempDir,
}

/// Session over a mock stack whose device 1 advertises Product and Volume.
pub fn fixture() -> Fixture {
    fixture_with(|builder| builder)
}

pub fn fixture_with(
    configure: impl FnOnce(pmoohnet::SessionBuilder) -> pmoohnet::SessionBuilder,
) -> Fixture {
    let stack = MockStack::new();
    stack.set_description(DeviceHandle(1), DEVICE_XML, LOCATION);
    stack.set_udn(DeviceHandle(1), "uuid:4c494e4e-0026-0f21-a3c6-01387403013f");
    stack.set_attribute(DeviceHandle(1), "Upnp.FriendlyName", "Kitchen");

    let fetcher = Arc::new(StaticFetcher::default());
    fetcher.serve(PRODUCT_URL, PRODUCT_SCPD);
    fetcher.serve(VOLUME_URL, VOLUME_SCPD);

    let proxy_dir = tempfile::tempdir().unwrap();
    let builder = Session::builder(stack.clone())
        .fetcher(fetcher.clone())
        .proxy_dir(proxy_dir.path());
    let session = configure(builder).build().unwrap();

    Fixture {
        stack,
        fetcher,
        session,
        proxy_dir,
    }
}
