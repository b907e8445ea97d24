//! Lookup of persisted proxy metadata on a list of search paths.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::codegen::ProxyMetadata;
use crate::errors::BindError;
use crate::naming::to_snake_case;

#[derive(Debug, Default)]
pub struct ProxyLoader {
    search_paths: RwLock<Vec<PathBuf>>,
    units: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ProxyLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `dir` unless it is already searched. Returns true if added.
    pub fn add_search_path(&self, dir: &Path) -> bool {
        let mut paths = self.search_paths.write();
        if paths.iter().any(|p| p == dir) {
            return false;
        }
        debug!("Proxy search path added: {}", dir.display());
        paths.push(dir.to_path_buf());
        true
    }

    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.search_paths.read().clone()
    }

    /// Lock serialising writers and readers of the files persisted for
    /// `type_name`. Type names sharing a file stem share the lock.
    ///
    /// Devices sharing a service type share the persisted files; holding
    /// this lock from persist to instantiate keeps one device from loading
    /// another device's unit.
    pub fn unit_lock(&self, type_name: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.units
                .lock()
                .entry(to_snake_case(type_name))
                .or_default(),
        )
    }

    /// Loads the metadata persisted for `type_name` from the first search
    /// path that holds it.
    pub fn load(&self, type_name: &str) -> Result<ProxyMetadata, BindError> {
        let file_name = format!("{}.json", to_snake_case(type_name));
        let candidate = self
            .search_paths
            .read()
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|path| path.is_file());
        let path = candidate.ok_or_else(|| BindError::NotFound(type_name.to_string()))?;

        let load_error = |reason: String| BindError::Load {
            type_name: type_name.to_string(),
            path: path.clone(),
            reason,
        };
        let bytes = fs::read(&path).map_err(|e| load_error(e.to_string()))?;
        let metadata: ProxyMetadata =
            serde_json::from_slice(&bytes).map_err(|e| load_error(e.to_string()))?;
        if metadata.type_name != type_name {
            return Err(load_error(format!(
                "file declares {} instead",
                metadata.type_name
            )));
        }

        debug!("Loaded {} from {}", type_name, path.display());
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{ProxyGenerator, RustProxyGenerator};
    use crate::scpd::tests::VOLUME_SCPD;

    #[test]
    fn search_paths_are_added_once() {
        let loader = ProxyLoader::new();
        assert!(loader.add_search_path(Path::new("/tmp/a")));
        assert!(!loader.add_search_path(Path::new("/tmp/a")));
        assert!(loader.add_search_path(Path::new("/tmp/b")));
        assert_eq!(loader.search_paths().len(), 2);
    }

    #[test]
    fn unit_locks_are_shared_per_file_stem() {
        let loader = ProxyLoader::new();
        let a = loader.unit_lock("CpProxyAvOpenhomeOrgVolume2");
        let b = loader.unit_lock("CpProxyAvOpenhomeOrgVolume2");
        let c = loader.unit_lock("CpProxyAvOpenhomeOrgProduct1");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));

        let _held = a.lock();
        assert!(b.try_lock().is_none());
        assert!(c.try_lock().is_some());
        assert!(Arc::ptr_eq(
            &loader.unit_lock("CpProxySchemasUpnpOrgAVTransport1"),
            &loader.unit_lock("CpProxySchemasUpnpOrgAvTransport1"),
        ));
    }

    #[test]
    fn loads_persisted_metadata() {
        let empty = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let proxy = RustProxyGenerator
            .generate("urn:av-openhome-org:service:Volume:2", VOLUME_SCPD)
            .unwrap();
        RustProxyGenerator.persist(&proxy, dir.path()).unwrap();

        let loader = ProxyLoader::new();
        loader.add_search_path(empty.path());
        loader.add_search_path(dir.path());

        let metadata = loader.load("CpProxyAvOpenhomeOrgVolume2").unwrap();
        assert_eq!(metadata, proxy.metadata);
    }

    #[test]
    fn missing_and_corrupt_units_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ProxyLoader::new();
        loader.add_search_path(dir.path());

        assert!(matches!(
            loader.load("CpProxyAcmeOrgNothing1"),
            Err(BindError::NotFound(_))
        ));

        fs::write(dir.path().join("cp_proxy_acme_org_broken1.json"), b"{ not json").unwrap();
        assert!(matches!(
            loader.load("CpProxyAcmeOrgBroken1"),
            Err(BindError::Load { .. })
        ));
    }
}
