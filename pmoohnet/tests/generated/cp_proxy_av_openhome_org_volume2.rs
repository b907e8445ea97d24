// Proxy for urn:av-openhome-org:service:Volume:2, generated from its SCPD. Do not edit.
#![allow(unused_imports)]

use std::any::Any;
use std::sync::Arc;

use pmoohnet::{
    ArgumentValue, CpProxy, Device, ParameterKind, ParameterSpec, ProxyBuilder, ProxyFactory,
    Result, ServiceProxy,
};

pub struct CpProxyAvOpenhomeOrgVolume2 {
    base: CpProxy,
}

impl CpProxyAvOpenhomeOrgVolume2 {
    pub const TYPE_NAME: &'static str = "CpProxyAvOpenhomeOrgVolume2";
    pub const SERVICE_TYPE: &'static str = "urn:av-openhome-org:service:Volume:2";

    pub fn new(device: &Device) -> Result<Self> {
        let base = ProxyBuilder::new(device, "av-openhome-org", "Volume", 2)
            .action("SetVolume", vec![ParameterSpec::new("Value", ParameterKind::Uint)], vec![])
            .action("Volume", vec![], vec![ParameterSpec::new("Value", ParameterKind::Uint)])
            .property("Volume", ParameterKind::Uint)
            .build()?;
        Ok(Self { base })
    }

    pub fn sync_set_volume(&self, value: u32) -> Result<()> {
        self.base.invoke("SetVolume", &[("Value", ArgumentValue::Uint(value))])?;
        Ok(())
    }

    pub fn sync_volume(&self) -> Result<u32> {
        let mut out = self.base.invoke("Volume", &[])?;
        out.uint("Value")
    }

    pub fn property_volume(&self) -> Result<u32> {
        self.base.read_property("Volume")?.into_uint("Volume")
    }
}

impl ServiceProxy for CpProxyAvOpenhomeOrgVolume2 {
    fn base(&self) -> &CpProxy {
        &self.base
    }

    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn service_type(&self) -> &str {
        Self::SERVICE_TYPE
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

pub fn register(factory: &ProxyFactory) {
    factory.register(CpProxyAvOpenhomeOrgVolume2::TYPE_NAME, |device| {
        let proxy: Arc<dyn ServiceProxy> = Arc::new(CpProxyAvOpenhomeOrgVolume2::new(device)?);
        Ok(proxy)
    });
}
