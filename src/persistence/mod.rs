pub mod pcap_writer;
pub mod stats_file;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use pcap_writer::save_packets;
pub use stats_file::{load_stats, save_stats};

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Failed to write '{path}': {source}")]
    WriteFailure {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to encode '{path}': {reason}")]
    Encode { path: String, reason: String },
}

impl WriteError {
    fn io(path: &Path, source: io::Error) -> Self {
        WriteError::WriteFailure {
            path: path.display().to_string(),
            source,
        }
    }

    fn encode(path: &Path, reason: impl ToString) -> Self {
        WriteError::Encode {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Sibling path the output is staged in before it replaces `target`.
fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    target.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
}

/// Runs `write` against a staging file and renames it over `target` only on success,
/// so an existing `target` is never left half-written.
fn write_atomically<F>(target: &Path, write: F) -> Result<(), WriteError>
where
    F: FnOnce(&Path) -> Result<(), WriteError>,
{
    let staging = staging_path(target);
    let result = write(&staging)
        .and_then(|()| fs::rename(&staging, target).map_err(|e| WriteError::io(target, e)));
    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}
