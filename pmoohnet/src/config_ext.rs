//! ohNet settings stored in the `host.ohnet` section of `pmoconfig`.
//!
//! The `OhNetConfigExt` trait adds typed accessors for the control-point
//! bindings to `pmoconfig::Config`, following the same pattern as the
//! other configuration extensions.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use pmoconfig::Config;
use serde_yaml::Value;

use crate::native::{DebugLevel, InitParams};

const DEFAULT_PROXY_DIR: &str = "generated_proxies";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Extension trait for the ohNet section of the configuration.
///
/// # Example
///
/// ```rust,ignore
/// use pmoconfig::get_config;
/// use pmoohnet::OhNetConfigExt;
///
/// let config = get_config()?;
/// let proxy_dir = config.get_proxy_dir()?;
/// let interface = config.get_interface()?;
/// ```
pub trait OhNetConfigExt {
    /// Directory receiving generated proxies, created if needed
    /// (default: `generated_proxies` under the config directory).
    fn get_proxy_dir(&self) -> Result<PathBuf>;

    fn set_proxy_dir(&self, directory: String) -> Result<()>;

    /// Timeout for SCPD downloads, in seconds (default: 10).
    fn get_fetch_timeout_secs(&self) -> Result<u64>;

    fn set_fetch_timeout_secs(&self, secs: u64) -> Result<()>;

    /// Preferred network interface: adapter name, address or subnet.
    fn get_interface(&self) -> Result<Option<String>>;

    fn set_interface(&self, interface: String) -> Result<()>;

    /// Directory holding the native library, if not on the loader path.
    fn get_library_dir(&self) -> Result<Option<PathBuf>>;

    /// Native debug categories; `None` when unset or set to `None`.
    fn get_debug_level(&self) -> Result<Option<DebugLevel>>;

    fn set_debug_level(&self, level: String) -> Result<()>;

    /// Native library initialisation parameters.
    fn get_init_params(&self) -> Result<InitParams>;
}

impl OhNetConfigExt for Config {
    fn get_proxy_dir(&self) -> Result<PathBuf> {
        self.get_managed_dir(&["host", "ohnet", "proxy_dir"], DEFAULT_PROXY_DIR)
            .map(PathBuf::from)
    }

    fn set_proxy_dir(&self, directory: String) -> Result<()> {
        self.set_managed_dir(&["host", "ohnet", "proxy_dir"], directory)
    }

    fn get_fetch_timeout_secs(&self) -> Result<u64> {
        let secs = self.get_u64_or(
            &["host", "ohnet", "fetch_timeout_secs"],
            DEFAULT_FETCH_TIMEOUT_SECS,
        );
        if secs == 0 {
            return Err(anyhow!("host.ohnet.fetch_timeout_secs must be positive"));
        }
        Ok(secs)
    }

    fn set_fetch_timeout_secs(&self, secs: u64) -> Result<()> {
        self.set_value(&["host", "ohnet", "fetch_timeout_secs"], Value::from(secs))
    }

    fn get_interface(&self) -> Result<Option<String>> {
        Ok(self.get_string(&["host", "ohnet", "interface"]))
    }

    fn set_interface(&self, interface: String) -> Result<()> {
        self.set_value(&["host", "ohnet", "interface"], Value::String(interface))
    }

    fn get_library_dir(&self) -> Result<Option<PathBuf>> {
        Ok(self
            .get_string(&["host", "ohnet", "library_dir"])
            .map(PathBuf::from))
    }

    fn get_debug_level(&self) -> Result<Option<DebugLevel>> {
        let Some(raw) = self.get_string(&["host", "ohnet", "debug_level"]) else {
            return Ok(None);
        };
        let level: DebugLevel = raw
            .parse()
            .map_err(|e| anyhow!("host.ohnet.debug_level: {}", e))?;
        if level == DebugLevel::NONE {
            Ok(None)
        } else {
            Ok(Some(level))
        }
    }

    fn set_debug_level(&self, level: String) -> Result<()> {
        self.set_value(&["host", "ohnet", "debug_level"], Value::String(level))
    }

    fn get_init_params(&self) -> Result<InitParams> {
        let defaults = InitParams::default();
        let u32_at = |key: &str, default: u32| -> Result<u32> {
            let value = self.get_u64_or(&["host", "ohnet", "init", key], default as u64);
            u32::try_from(value).map_err(|_| anyhow!("host.ohnet.init.{} out of range", key))
        };

        Ok(InitParams {
            msearch_time_secs: u32_at("msearch_time_secs", defaults.msearch_time_secs)?,
            subscription_duration_secs: u32_at(
                "subscription_duration_secs",
                defaults.subscription_duration_secs,
            )?,
            tcp_connect_timeout_ms: u32_at(
                "tcp_connect_timeout_ms",
                defaults.tcp_connect_timeout_ms,
            )?,
            user_agent: self.get_string(&["host", "ohnet", "init", "user_agent"]),
        })
    }
}
