//! File helpers shared by the snapshot backends.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{QuillError, Result};

/// Write `bytes` to `path` via a temporary file and a rename
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp = temp_path(path);

    let written = File::create(&temp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&temp);
        return Err(snapshot_error("write", &temp, e));
    }

    fs::rename(&temp, path).map_err(|e| snapshot_error("rename", path, e))?;
    sync_parent(path);
    Ok(())
}

/// Read the whole file, or `None` if it does not exist
pub(crate) fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(snapshot_error("read", path, e)),
    }
}

/// Remove the file and any leftover temporary; missing files are fine
pub(crate) fn remove_if_exists(path: &Path) -> Result<()> {
    for target in [path.to_path_buf(), temp_path(path)] {
        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(snapshot_error("remove", &target, e)),
        }
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn snapshot_error(action: &str, path: &Path, error: std::io::Error) -> QuillError {
    QuillError::Snapshot(format!("{} {}: {}", action, path.display(), error))
}

#[cfg(unix)]
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
            tracing::debug!(dir = %parent.display(), error = %e, "Directory sync failed");
        }
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}
