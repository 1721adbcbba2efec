//! Fingerprint-keyed artifact cache.
//!
//! An artifact is current when the file exists and its `<file>.key` sidecar
//! holds the fingerprint of the stage that would produce it. Files are
//! written to `<file>.tmp` and renamed into place, and the key is written
//! last, so an interrupted write never looks complete.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::Serialize;

use super::artifacts::{ArtifactPaths, Stage};
use crate::error::{Error, Result};

/// Hex digest identifying one stage's inputs and parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint of the input files: path, size and modification time.
pub fn input_fingerprint(exposure: &str, inputs: &[&Path]) -> Result<Fingerprint> {
    let mut fields: Vec<Vec<u8>> = vec![b"inputs".to_vec(), exposure.as_bytes().to_vec()];
    for path in inputs {
        let meta = fs::metadata(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::ArtifactMissing {
                path: path.to_path_buf(),
            },
            _ => Error::io(*path, e),
        })?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos());
        fields.push(path.to_string_lossy().into_owned().into_bytes());
        fields.push(meta.len().to_le_bytes().to_vec());
        fields.push(modified.to_le_bytes().to_vec());
    }
    Ok(Fingerprint(common::fnv::fingerprint(
        fields.iter().map(Vec::as_slice),
    )))
}

/// Fingerprint of a stage: exposure, stage id, parameters and upstream.
pub fn stage_fingerprint<P: Serialize>(
    exposure: &str,
    stage: Stage,
    params: &P,
    upstream: &Fingerprint,
) -> Result<Fingerprint> {
    let params = serde_json::to_vec(params)?;
    Ok(Fingerprint(common::fnv::fingerprint([
        exposure.as_bytes(),
        stage.id().as_bytes(),
        params.as_slice(),
        upstream.as_str().as_bytes(),
    ])))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[inline]
pub fn key_path(path: &Path) -> PathBuf {
    with_suffix(path, ".key")
}

#[inline]
pub fn tmp_path(path: &Path) -> PathBuf {
    with_suffix(path, ".tmp")
}

/// `true` when `path` exists and its key matches `fingerprint`.
pub fn is_current(path: &Path, fingerprint: &Fingerprint) -> bool {
    if !path.is_file() {
        return false;
    }
    fs::read_to_string(key_path(path)).is_ok_and(|key| key.trim() == fingerprint.as_str())
}

/// `true` when every artifact of `stage` is current.
pub fn stage_is_current(paths: &ArtifactPaths, stage: Stage, fingerprint: &Fingerprint) -> bool {
    stage
        .artifacts()
        .iter()
        .all(|&artifact| is_current(&paths.path(artifact), fingerprint))
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Write an artifact through a temporary file, then record its key.
///
/// `write` receives the temporary path. Any previous key is removed first.
pub fn write_artifact(
    path: &Path,
    fingerprint: &Fingerprint,
    write: impl FnOnce(&Path) -> Result<()>,
) -> Result<()> {
    let key = key_path(path);
    remove_if_exists(&key)?;

    let tmp = tmp_path(path);
    remove_if_exists(&tmp)?;
    write(&tmp)?;
    fs::rename(&tmp, path).map_err(|e| Error::io(path, e))?;

    let key_tmp = tmp_path(&key);
    fs::write(&key_tmp, fingerprint.as_str()).map_err(|e| Error::io(&key_tmp, e))?;
    fs::rename(&key_tmp, &key).map_err(|e| Error::io(&key, e))?;

    tracing::debug!(path = %path.display(), key = %fingerprint, "Artifact written");
    Ok(())
}
