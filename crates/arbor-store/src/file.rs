//! Save and load framed canonical state.
//!
//! The strict entry points ([`save`], [`load`], [`merge_into`]) return
//! `anyhow` errors carrying the path. The `*_or_*` variants never fail:
//! they log and fall back so a damaged save cannot stop the host.

use std::path::Path;
use std::rc::Rc;

use anyhow::Context;
use arbor_codec::{from_bytes_with_ceiling, to_bytes, Canonical};
use arbor_graph::{Entity, Hierarchy, PartialReport, Root};
use tracing::{debug, error, info};

use crate::frame::{decode_frame, encode_frame};
use crate::{StoreConfig, StoreError};

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `bytes` next to `path` and rename over it, so readers never see a
/// half-written file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".partial");
    let staging = std::path::PathBuf::from(staging);
    std::fs::write(&staging, bytes).map_err(|e| io_error(&staging, e))?;
    std::fs::rename(&staging, path).map_err(|e| io_error(path, e))
}

fn read_payload(path: &Path, config: &StoreConfig) -> Result<Vec<u8>, StoreError> {
    let bytes = std::fs::read(path).map_err(|e| io_error(path, e))?;
    let (header, payload) = decode_frame(&bytes, config.verify_digest)?;
    debug!(
        path = %path.display(),
        bytes = header.payload_len,
        digest = %header.digest.to_hex(),
        "frame verified"
    );
    Ok(payload.to_vec())
}

/// Save `value`'s canonical bytes to `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save<T: Canonical + ?Sized>(path: impl AsRef<Path>, value: &T) -> anyhow::Result<()> {
    let path = path.as_ref();
    let payload = to_bytes(value);
    write_atomic(path, &encode_frame(&payload))
        .with_context(|| format!("failed to save state to {}", path.display()))?;
    info!(path = %path.display(), bytes = payload.len(), "state saved");
    Ok(())
}

/// Save the top entity of a hierarchy.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_hierarchy<T: Entity>(path: impl AsRef<Path>, hierarchy: &Hierarchy<T>) -> anyhow::Result<()> {
    save(path, &**hierarchy.top())
}

/// [`save`], logging instead of failing. Returns `true` on success.
pub fn save_or_log<T: Canonical + ?Sized>(path: impl AsRef<Path>, value: &T) -> bool {
    let path = path.as_ref();
    match save(path, value) {
        Ok(()) => true,
        Err(e) => {
            error!(path = %path.display(), error = %format!("{e:#}"), "save failed");
            false
        }
    }
}

/// Load a value saved with [`save`]. The result is detached: any entities
/// in it keep their saved ids but are not registered anywhere.
///
/// # Errors
///
/// Returns an error if the file cannot be read, the frame is damaged, or the
/// payload does not decode as `T`.
pub fn load<T: Canonical>(path: impl AsRef<Path>, config: &StoreConfig) -> anyhow::Result<T> {
    let path = path.as_ref();
    let payload = read_payload(path, config)
        .with_context(|| format!("failed to read state from {}", path.display()))?;
    let value = from_bytes_with_ceiling(&payload, config.sequence_ceiling)
        .map_err(StoreError::from)
        .with_context(|| format!("failed to decode state from {}", path.display()))?;
    Ok(value)
}

/// [`load`], or `default()` if the file is missing or unusable.
pub fn load_or_default<T: Canonical>(
    path: impl AsRef<Path>,
    config: &StoreConfig,
    default: impl FnOnce() -> T,
) -> T {
    let path = path.as_ref();
    if !path.exists() {
        debug!(path = %path.display(), "no saved state -- using default");
        return default();
    }
    match load(path, config) {
        Ok(value) => value,
        Err(e) => {
            error!(path = %path.display(), error = %format!("{e:#}"), "load failed -- using default");
            default()
        }
    }
}

/// Load a top entity and bring it up as a live hierarchy, keeping saved ids.
pub fn load_hierarchy_or_default<T: Entity>(
    path: impl AsRef<Path>,
    config: &StoreConfig,
    default: impl FnOnce() -> T,
) -> Hierarchy<T> {
    Hierarchy::new(load_or_default(path, config, default))
}

/// Load a saved subtree and reconcile it into `target`, which must be
/// attached to `root`. Saved ids are replaced with fresh ones first, so the
/// merge cannot collide with live entities.
///
/// # Errors
///
/// Returns an error if the subtree cannot be loaded; `target` is untouched
/// in that case.
pub fn merge_into<S: Entity>(
    root: &Root,
    target: &Rc<S>,
    path: impl AsRef<Path>,
    config: &StoreConfig,
) -> anyhow::Result<PartialReport> {
    let path = path.as_ref();
    let incoming: S = load(path, config)?;
    let report = root.reconcile_partial(target, &incoming);
    info!(
        path = %path.display(),
        remapped = report.remapped,
        unmapped = report.unmapped.len(),
        "subtree merged"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
