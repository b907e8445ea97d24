//! Service enumeration from UPnP device description documents.

use std::io::Cursor;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use xmltree::{Element, XMLNode};

use crate::errors::DescriptionError;

static DEFAULT_NAMESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#" xmlns="[^"]+""#).expect("namespace pattern is valid"));

/// Parsed form of `urn:{domain}:service:{name}:{version}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceType {
    pub domain: String,
    pub name: String,
    pub version: u32,
}

impl ServiceType {
    pub fn parse(urn: &str) -> Result<Self, DescriptionError> {
        let invalid = || DescriptionError::InvalidServiceType(urn.to_string());

        let parts: Vec<&str> = urn.trim().split(':').collect();
        let [prefix, domain, kind, name, version] = parts.as_slice() else {
            return Err(invalid());
        };
        if *prefix != "urn" || *kind != "service" || !is_urn_field(domain) || !is_urn_field(name) {
            return Err(invalid());
        }
        if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let version: u32 = version.parse().map_err(|_| invalid())?;
        if version == 0 {
            return Err(invalid());
        }

        Ok(Self {
            domain: domain.to_string(),
            name: name.to_string(),
            version,
        })
    }

    pub fn to_urn(&self) -> String {
        format!("urn:{}:service:{}:{}", self.domain, self.name, self.version)
    }
}

fn is_urn_field(field: &str) -> bool {
    !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
}

/// One service advertised by a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub type_urn: String,
    pub scpd_url: String,
    /// Domain as written in the URN, e.g. `av-openhome-org`.
    pub domain: String,
    /// Domain folded to one identifier, e.g. `AvOpenhomeOrg`.
    pub domain_name: String,
    pub service_name: String,
    pub version: u32,
}

impl ServiceDescriptor {
    pub fn from_service_type(service_type: &ServiceType, scpd_url: impl Into<String>) -> Self {
        Self {
            type_urn: service_type.to_urn(),
            scpd_url: scpd_url.into(),
            domain: service_type.domain.clone(),
            domain_name: domain_name(&service_type.domain),
            service_name: service_type.name.clone(),
            version: service_type.version,
        }
    }
}

/// Uppercases the first character of every `.`/`-` separated field and
/// concatenates the fields.
pub fn domain_name(domain: &str) -> String {
    domain
        .split(['.', '-'])
        .filter(|field| !field.is_empty())
        .map(crate::naming::upper_first)
        .collect()
}

/// Removes default namespace declarations so that tags match by local name.
pub fn strip_default_namespace(xml: &str) -> String {
    DEFAULT_NAMESPACE.replace_all(xml, "").into_owned()
}

/// Returns `scheme://host[:port]` of a device location.
pub fn base_url(location: &str) -> Result<String, DescriptionError> {
    let invalid = || DescriptionError::InvalidLocation(location.to_string());

    let (scheme, rest) = location.trim().split_once("://").ok_or_else(invalid)?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if scheme.is_empty() || authority.is_empty() {
        return Err(invalid());
    }
    Ok(format!("{}://{}", scheme, authority))
}

/// Joins an `SCPDURL` with the device base URL.
pub fn resolve_scpd_url(base_url: &str, scpd_url: &str) -> String {
    if scpd_url.starts_with("http://") || scpd_url.starts_with("https://") {
        return scpd_url.to_string();
    }
    if scpd_url.starts_with('/') {
        format!("{}{}", base_url, scpd_url)
    } else {
        format!("{}/{}", base_url, scpd_url)
    }
}

/// Lists every service of a device description, root device first, then
/// embedded devices, each in document order.
pub fn parse_services(
    device_xml: &str,
    location: &str,
) -> Result<Vec<ServiceDescriptor>, DescriptionError> {
    let base = base_url(location)?;
    let xml = strip_default_namespace(device_xml);
    let root = Element::parse(&mut Cursor::new(xml.as_bytes()))
        .map_err(|e| DescriptionError::Xml(e.to_string()))?;

    let mut devices = Vec::new();
    if root.name == "device" {
        collect_devices(&root, &mut devices);
    } else {
        for device in child_elements(&root, "device") {
            collect_devices(device, &mut devices);
        }
    }

    let mut services = Vec::new();
    let mut index = 0;
    for device in devices {
        let Some(service_list) = device.get_child("serviceList") else {
            continue;
        };
        for service in child_elements(service_list, "service") {
            index += 1;
            services.push(parse_service(service, index, &base)?);
        }
    }

    debug!("Found {} services in description at {}", services.len(), location);
    Ok(services)
}

fn parse_service(
    service: &Element,
    index: usize,
    base: &str,
) -> Result<ServiceDescriptor, DescriptionError> {
    let service_type = child_text(service, "serviceType").ok_or(DescriptionError::MissingElement {
        element: "serviceType",
        index,
    })?;
    let scpd_url = child_text(service, "SCPDURL").ok_or(DescriptionError::MissingElement {
        element: "SCPDURL",
        index,
    })?;

    let parsed = ServiceType::parse(&service_type)?;
    let mut descriptor =
        ServiceDescriptor::from_service_type(&parsed, resolve_scpd_url(base, &scpd_url));
    descriptor.type_urn = service_type;
    Ok(descriptor)
}

fn collect_devices<'a>(device: &'a Element, out: &mut Vec<&'a Element>) {
    out.push(device);
    if let Some(list) = device.get_child("deviceList") {
        for embedded in child_elements(list, "device") {
            collect_devices(embedded, out);
        }
    }
}

fn child_elements<'a>(parent: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> {
    parent.children.iter().filter_map(move |node| match node {
        XMLNode::Element(e) if e.name == name => Some(e),
        _ => None,
    })
}

fn child_text(parent: &Element, name: &str) -> Option<String> {
    parent
        .get_child(name)
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}
