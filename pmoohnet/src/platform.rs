//! Naming and locating the native ohNet library.

use std::env::consts::OS;
use std::path::{Path, PathBuf};

use crate::errors::{OhNetError, Result};

/// File name of the ohNet shared library on the running platform.
pub fn library_file_name() -> Result<&'static str> {
    library_file_name_for(OS)
}

pub fn library_file_name_for(os: &str) -> Result<&'static str> {
    match os {
        "windows" => Ok("ohNet.dll"),
        "linux" => Ok("libohNet.so"),
        "macos" => Ok("libohNet.dylib"),
        other => Err(OhNetError::UnsupportedPlatform(other.to_string())),
    }
}

/// Path of the ohNet library inside `dir`.
pub fn locate_library(dir: &Path) -> Result<PathBuf> {
    let path = dir.join(library_file_name()?);
    if path.is_file() {
        Ok(path)
    } else {
        Err(OhNetError::LibraryLoad {
            path: path.display().to_string(),
            reason: "file not found".to_string(),
        })
    }
}
