//! Canonical proxy identifiers derived from service descriptors.

use crate::descriptor::ServiceDescriptor;

/// Names under which a service proxy is generated and attached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyNames {
    /// e.g. `CpProxyAvOpenhomeOrgVolume2`
    pub type_name: String,
    /// e.g. `volume`
    pub attribute_name: String,
}

pub fn derive_names(descriptor: &ServiceDescriptor) -> ProxyNames {
    ProxyNames {
        type_name: proxy_type_name(
            &descriptor.domain_name,
            &descriptor.service_name,
            descriptor.version,
        ),
        attribute_name: lower_first(&descriptor.service_name),
    }
}

pub fn proxy_type_name(domain_name: &str, service_name: &str, version: u32) -> String {
    format!("CpProxy{}{}{}", domain_name, upper_first(service_name), version)
}

pub fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Converts a CamelCase identifier to snake_case, keeping acronyms together:
/// `CpProxyUpnpOrgAVTransport2` becomes `cp_proxy_upnp_org_av_transport2`.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 8);

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_is_lower);
            if boundary && !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }

    out.trim_end_matches('_').to_string()
}

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "box", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "gen", "if", "impl", "in", "let", "loop", "match", "mod",
    "move", "mut", "priv", "pub", "ref", "return", "self", "static", "struct", "super", "trait",
    "true", "try", "type", "unsafe", "use", "where", "while", "yield",
];

/// snake_case identifier safe to use as a Rust binding or method name.
pub fn rust_ident(name: &str) -> String {
    let mut ident = to_snake_case(name);
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    if RUST_KEYWORDS.contains(&ident.as_str()) {
        ident.push('_');
    }
    ident
}

/// Type name with every character that cannot appear in a Rust identifier
/// replaced by `_`.
pub fn rust_type_ident(type_name: &str) -> String {
    type_name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ServiceDescriptor, ServiceType};

    fn descriptor(urn: &str) -> ServiceDescriptor {
        ServiceDescriptor::from_service_type(&ServiceType::parse(urn).unwrap(), "http://h/s.xml")
    }

    #[test]
    fn volume_two_from_openhome() {
        let names = derive_names(&descriptor("urn:av-openhome-org:service:Volume:2"));
        assert_eq!(names.type_name, "CpProxyAvOpenhomeOrgVolume2");
        assert_eq!(names.attribute_name, "volume");
    }

    #[test]
    fn derivation_is_deterministic() {
        let d = descriptor("urn:schemas-upnp-org:service:AVTransport:1");
        assert_eq!(derive_names(&d), derive_names(&d.clone()));
        assert_eq!(derive_names(&d).type_name, "CpProxySchemasUpnpOrgAVTransport1");
        assert_eq!(derive_names(&d).attribute_name, "aVTransport");
    }

    #[test]
    fn lower_case_service_names_are_title_cased_in_type_name() {
        let names = derive_names(&descriptor("urn:linn.co.uk:service:ui:2"));
        assert_eq!(names.type_name, "CpProxyLinnCoUkUi2");
        assert_eq!(names.attribute_name, "ui");
    }

    #[test]
    fn snake_case_keeps_acronyms() {
        assert_eq!(
            to_snake_case("CpProxyUpnpOrgAVTransport2"),
            "cp_proxy_upnp_org_av_transport2"
        );
        assert_eq!(to_snake_case("GetVolumeDBRange"), "get_volume_db_range");
        assert_eq!(to_snake_case("InstanceID"), "instance_id");
        assert_eq!(to_snake_case("Value"), "value");
    }

    #[test]
    fn rust_idents_escape_keywords() {
        assert_eq!(rust_ident("Type"), "type_");
        assert_eq!(rust_ident("In"), "in_");
        assert_eq!(rust_ident("3D"), "_3_d");
        assert_eq!(rust_type_ident("CpProxyAcmeFoo-Bar1"), "CpProxyAcmeFoo_Bar1");
    }
}
