use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use tracing::{debug, warn};

use super::TransferError;

/// Buffer size for file I/O (128KB)
const BUFFER_SIZE: usize = 128 * 1024;

/// Copy `source` to a destination that must not exist yet.
///
/// The destination is opened create-exclusive, so a name picked by
/// `unique_path` that was claimed in the meantime is reported as
/// [`TransferError::DestinationExists`] instead of being overwritten. Any
/// failure after the destination was created removes the partial copy.
/// Permissions and timestamps are carried over on a best-effort basis.
pub fn copy_file_exclusive(source: &Path, dest: &Path, sync_file: bool) -> Result<u64, TransferError> {
    let source_metadata =
        fs::metadata(source).map_err(|e| TransferError::io("Failed to read source metadata", e))?;

    let source_file = File::open(source).map_err(|e| TransferError::io("Failed to open source file", e))?;

    let dest_file = match OpenOptions::new().write(true).create_new(true).open(dest) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(TransferError::DestinationExists(dest.to_path_buf()));
        }
        Err(e) => return Err(TransferError::io("Failed to create destination file", e)),
    };

    match write_contents(source_file, dest_file, sync_file) {
        Ok(bytes_written) => {
            if let Err(e) = fs::set_permissions(dest, source_metadata.permissions()) {
                debug!(dest = %dest.display(), error = %e, "Failed to set file permissions");
            }
            if let Err(e) = preserve_timestamps(&source_metadata, dest) {
                debug!(dest = %dest.display(), error = %e, "Failed to preserve file timestamps");
            }
            Ok(bytes_written)
        }
        Err(e) => {
            discard(dest);
            Err(e)
        }
    }
}

fn write_contents(source: File, dest: File, sync_file: bool) -> Result<u64, TransferError> {
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, source);
    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, dest);

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut bytes_written: u64 = 0;

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransferError::io("Failed to read from source", e)),
        };

        writer
            .write_all(&buffer[..bytes_read])
            .map_err(|e| TransferError::io("Failed to write to destination", e))?;

        bytes_written += bytes_read as u64;
    }

    writer
        .flush()
        .map_err(|e| TransferError::io("Failed to flush destination file", e))?;

    if sync_file {
        let inner = writer
            .into_inner()
            .map_err(|e| TransferError::io("Failed to get inner file handle", e.into_error()))?;
        inner
            .sync_all()
            .map_err(|e| TransferError::io("Failed to sync file", e))?;
    }

    Ok(bytes_written)
}

fn preserve_timestamps(source_metadata: &fs::Metadata, dest: &Path) -> io::Result<()> {
    let atime = filetime::FileTime::from_last_access_time(source_metadata);
    let mtime = filetime::FileTime::from_last_modification_time(source_metadata);
    filetime::set_file_times(dest, atime, mtime)
}

/// Remove a copy this engine created. Failure is logged, not returned.
pub fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove destination copy");
        }
    }
}
