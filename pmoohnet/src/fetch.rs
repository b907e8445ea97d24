//! Retrieval of SCPD documents over HTTP.

use std::io::{Cursor, ErrorKind};
use std::time::Duration;

use tracing::debug;
use ureq::Agent;
use xmltree::Element;

use crate::errors::FetchError;

/// Default timeout applied to a whole SCPD request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of SCPD documents.
///
/// Failures are returned as-is; the binder does not retry.
pub trait ScpdFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Blocking HTTP fetcher backed by a `ureq` agent.
pub struct HttpScpdFetcher {
    agent: Agent,
    timeout: Duration,
}

impl HttpScpdFetcher {
    pub fn new(timeout: Duration) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for HttpScpdFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

impl ScpdFetcher for HttpScpdFetcher {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        debug!("Fetching SCPD at {}", url);

        let mut response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| transport_error(url, e))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| match transport_error(url, e) {
                FetchError::Transport { url, reason } => FetchError::Body { url, reason },
                other => other,
            })?;

        Element::parse(&mut Cursor::new(text.as_bytes())).map_err(|e| {
            FetchError::MalformedXml {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(text)
    }
}

fn transport_error(url: &str, err: ureq::Error) -> FetchError {
    let url = url.to_string();
    match err {
        ureq::Error::Timeout(_) => FetchError::Timeout { url },
        ureq::Error::ConnectionFailed => FetchError::ConnectionRefused { url },
        ureq::Error::Io(e) => match e.kind() {
            ErrorKind::ConnectionRefused => FetchError::ConnectionRefused { url },
            ErrorKind::TimedOut | ErrorKind::WouldBlock => FetchError::Timeout { url },
            _ => FetchError::Transport {
                url,
                reason: e.to_string(),
            },
        },
        other => FetchError::Transport {
            url,
            reason: other.to_string(),
        },
    }
}
