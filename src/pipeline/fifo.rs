//! Named streaming objects
//!
//! Each call's playback is streamed through a FIFO at
//! `<dir>/playback_<call id>.sln16`. The path is deterministic so a leftover
//! from an abnormally terminated session is found and replaced.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use nix::sys::stat::Mode;
use nix::unistd::mkfifo;

use crate::telephony::CallId;
use crate::{Error, Result};

/// File name prefix of every streaming object
pub const STREAM_PREFIX: &str = "playback_";

/// Extension naming the stream's format for the telephony layer
pub const STREAM_EXTENSION: &str = "sln16";

/// Streaming object path for a call
#[must_use]
pub fn stream_path(dir: &Path, call: &CallId) -> PathBuf {
    let name = call.as_str().replace(['/', '\\'], "_");
    dir.join(format!("{STREAM_PREFIX}{name}.{STREAM_EXTENSION}"))
}

/// Media reference the telephony layer resolves to the stream
///
/// Sound references omit the extension; the format is implied by it.
#[must_use]
pub fn media_ref(path: &Path) -> String {
    format!("sound:{}", path.with_extension("").display())
}

/// Create the FIFO at `path`, replacing anything already there
///
/// # Errors
///
/// Returns `Error::Pipeline` if a stale object cannot be removed or the
/// FIFO cannot be created
pub fn create(path: &Path) -> Result<()> {
    if remove(path)? {
        tracing::debug!(path = %path.display(), "removed stale streaming object");
    }

    mkfifo(path, Mode::from_bits_truncate(0o644)).map_err(|e| {
        Error::Pipeline(format!("mkfifo {} failed: {e}", path.display()))
    })
}

/// Remove the object at `path` if present
///
/// Returns whether something was removed.
///
/// # Errors
///
/// Returns `Error::Pipeline` for failures other than the object being absent
pub fn remove(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::Pipeline(format!(
            "failed to remove {}: {e}",
            path.display()
        ))),
    }
}

fn is_stream_name(name: &str) -> bool {
    name.strip_prefix(STREAM_PREFIX)
        .and_then(|rest| rest.strip_suffix(STREAM_EXTENSION))
        .is_some_and(|stem| stem.len() > 1 && stem.ends_with('.'))
}

/// Remove every streaming object left in `dir`
///
/// Returns the number removed.
///
/// # Errors
///
/// Returns error if the directory cannot be read
pub fn purge_stale(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !is_stream_name(name) {
            continue;
        }

        match remove(&entry.path()) {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "failed to purge streaming object"),
        }
    }
    Ok(removed)
}
