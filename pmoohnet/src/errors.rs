use std::path::PathBuf;

use thiserror::Error;

use crate::native::NativeError;

/// Failures while reading a device description document.
///
/// Any of these aborts the whole `Device::start` call: the service list
/// itself cannot be trusted.
#[derive(Error, Debug)]
pub enum DescriptionError {
    #[error("Device description is not valid XML: {0}")]
    Xml(String),

    #[error("Device location '{0}' has no scheme://host[:port] prefix")]
    InvalidLocation(String),

    #[error("Missing required element '{element}' in service entry #{index}")]
    MissingElement { element: &'static str, index: usize },

    #[error("Malformed service type '{0}' (expected urn:<domain>:service:<name>:<version>)")]
    InvalidServiceType(String),

    #[error("Device attribute {0} is not available")]
    MissingAttribute(&'static str),
}

/// Failures while retrieving an SCPD document.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Connection refused fetching {url}")]
    ConnectionRefused { url: String },

    #[error("Timed out fetching {url}")]
    Timeout { url: String },

    #[error("HTTP status {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Malformed SCPD XML at {url}: {reason}")]
    MalformedXml { url: String, reason: String },

    #[error("Failed to read HTTP body from {url}: {reason}")]
    Body { url: String, reason: String },

    #[error("HTTP request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
}

/// Failures while producing or persisting proxy source.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Invalid SCPD document: {0}")]
    Scpd(String),

    #[error("Malformed service type '{0}'")]
    ServiceType(String),

    #[error("Generator produced {generated}, expected {expected}")]
    TypeNameMismatch { expected: String, generated: String },

    #[error("{generated} and {existing} share the file stem {stem}")]
    FileStemCollision {
        stem: String,
        existing: String,
        generated: String,
    },

    #[error("Failed to persist generated proxy to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode proxy metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Failures while loading or instantiating a generated proxy.
#[derive(Error, Debug)]
pub enum BindError {
    #[error("Generated proxy {0} not found on any proxy search path")]
    NotFound(String),

    #[error("Failed to load proxy {type_name} from {path}: {reason}")]
    Load {
        type_name: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Persisted proxy {0} does not match the one just generated")]
    Mismatch(String),

    #[error("Failed to instantiate {type_name}: {source}")]
    Instantiate {
        type_name: String,
        #[source]
        source: Box<OhNetError>,
    },
}

/// Error scoped to the binding of a single service.
///
/// Sibling services of the same `Device::start` call are not affected.
#[derive(Error, Debug)]
pub enum ServiceBindError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Bind(#[from] BindError),
}

#[derive(Error, Debug)]
pub enum OhNetError {
    #[error(transparent)]
    Description(#[from] DescriptionError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error("Unsupported platform - {0}")]
    UnsupportedPlatform(String),

    #[error("Failed to load {path}: {reason}")]
    LibraryLoad { path: String, reason: String },

    #[error("NO network adapter detected")]
    NoAdapter,

    #[error("NO network adapter matching {0} found")]
    NoMatchingAdapter(String),

    #[error("Stack mode <{0}> not supported")]
    UnsupportedMode(String),

    #[error("{0} has already been shut down")]
    AlreadyShutdown(String),

    #[error("{operation} failed with native error {code}: {description}")]
    Native {
        operation: String,
        code: u32,
        description: String,
    },

    #[error("Unknown action {action} on {service}")]
    UnknownAction { service: String, action: String },

    #[error("Unknown property {property} on {service}")]
    UnknownProperty { service: String, property: String },

    #[error("Invalid arguments for {action}: {reason}")]
    ArgumentMismatch { action: String, reason: String },

    #[error("Value of {name} is not a {expected}")]
    ValueType { name: String, expected: &'static str },
}

impl OhNetError {
    pub fn native(operation: &str, err: NativeError) -> Self {
        OhNetError::Native {
            operation: operation.to_string(),
            code: err.code,
            description: err.description,
        }
    }

    pub fn argument_mismatch(action: &str, reason: impl Into<String>) -> Self {
        OhNetError::ArgumentMismatch {
            action: action.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<ServiceBindError> for OhNetError {
    fn from(err: ServiceBindError) -> Self {
        match err {
            ServiceBindError::Fetch(e) => OhNetError::Fetch(e),
            ServiceBindError::Generation(e) => OhNetError::Generation(e),
            ServiceBindError::Bind(e) => OhNetError::Bind(e),
        }
    }
}

pub type Result<T, E = OhNetError> = std::result::Result<T, E>;
