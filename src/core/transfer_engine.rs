//! Single-file relocation.
//!
//! [`TransferEngine::move_file`] is the only entry point the orchestrator
//! uses. It never returns an error: every failure is folded into a
//! [`TransferRecord`] so a batch can always continue with the next item.
//!
//! Two strategies are available:
//!
//! - standard: one `rename(2)`, falling back to copy + delete across devices
//! - safe verify: copy, checksum both sides, then delete the source. A crash
//!   between the steps leaves at worst a duplicate, never zero copies.

mod copy;
mod space;

use std::ffi::OsStr;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::models::{TransferMode, TransferRecord, TransferStatus};
use super::verifier::{self, ChecksumAlgorithm};

pub use copy::discard;
pub use space::{FixedSpace, SpaceProbe, StatvfsProbe};

/// How many times a copy re-probes for a free name when it loses a race.
const MAX_NAME_ATTEMPTS: usize = 16;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Source not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Checksum mismatch")]
    ChecksumMismatch { source_hash: String, dest_hash: String },

    #[error("Insufficient disk space")]
    InsufficientSpace { required: u64, available: u64 },

    #[error("Disk full: {0}")]
    DiskFull(String),

    #[error("Destination already exists: {}", .0.display())]
    DestinationExists(PathBuf),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl TransferError {
    pub(crate) fn io(context: &str, source: io::Error) -> Self {
        if source.raw_os_error() == Some(libc::ENOSPC) {
            return TransferError::DiskFull(format!("{}: {}", context, source));
        }
        TransferError::Io {
            context: context.to_string(),
            source,
        }
    }
}

/// Per-call options for [`TransferEngine::move_file`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveOptions<'a> {
    pub dry_run: bool,
    pub safe_mode: bool,
    pub reason: &'a str,
}

/// Stateless file mover. Holds configuration only.
#[derive(Clone)]
pub struct TransferEngine {
    checksum: ChecksumAlgorithm,
    sync_files: bool,
    space: Arc<dyn SpaceProbe>,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new(ChecksumAlgorithm::default())
    }
}

impl TransferEngine {
    pub fn new(checksum: ChecksumAlgorithm) -> Self {
        Self {
            checksum,
            sync_files: true,
            space: Arc::new(StatvfsProbe),
        }
    }

    pub fn with_space_probe(mut self, probe: impl SpaceProbe + 'static) -> Self {
        self.space = Arc::new(probe);
        self
    }

    /// Whether each copied file is fsynced before it is verified.
    pub fn with_sync_files(mut self, sync_files: bool) -> Self {
        self.sync_files = sync_files;
        self
    }

    /// Best-effort free space check. A probe that cannot answer lets the
    /// operation proceed.
    pub fn check_disk_space(&self, volume: &Path, required_bytes: u64) -> bool {
        self.ensure_space(volume, required_bytes).is_ok()
    }

    fn ensure_space(&self, volume: &Path, required: u64) -> Result<(), TransferError> {
        match self.space.available_bytes(volume) {
            Ok(available) if available < required => Err(TransferError::InsufficientSpace { required, available }),
            Ok(_) => Ok(()),
            Err(e) => {
                debug!(volume = %volume.display(), error = %e, "Disk space check unavailable");
                Ok(())
            }
        }
    }

    /// Relocate `src` into `dest_dir`, returning what happened.
    pub fn move_file(&self, src: &Path, dest_dir: &Path, opts: &MoveOptions<'_>) -> TransferRecord {
        let mode = if opts.safe_mode {
            TransferMode::SafeVerify
        } else {
            TransferMode::Standard
        };

        match self.try_move(src, dest_dir, opts, mode) {
            Ok(record) => record,
            Err(TransferError::NotFound(_)) => {
                debug!(src = %src.display(), "Source vanished before transfer");
                TransferRecord::new(TransferStatus::Skipped, src.to_path_buf(), "Source not found", mode)
            }
            Err(e) => {
                warn!(
                    src = %src.display(),
                    dest_dir = %dest_dir.display(),
                    error = %e,
                    "Could not move file"
                );
                TransferRecord::new(TransferStatus::Error, src.to_path_buf(), opts.reason, mode)
                    .with_dest_dir(dest_dir.to_path_buf())
                    .with_error(e.to_string())
            }
        }
    }

    fn try_move(
        &self,
        src: &Path,
        dest_dir: &Path,
        opts: &MoveOptions<'_>,
        mode: TransferMode,
    ) -> Result<TransferRecord, TransferError> {
        let metadata = match fs::metadata(src) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TransferError::NotFound(src.to_path_buf()));
            }
            Err(e) => return Err(TransferError::io("Failed to read source metadata", e)),
        };

        let file_name = src.file_name().ok_or_else(|| {
            TransferError::io(
                "Invalid source path",
                io::Error::new(ErrorKind::InvalidInput, "path has no file name"),
            )
        })?;

        if opts.dry_run {
            let dest = unique_path(dest_dir, file_name);
            info!(
                src = %src.display(),
                dest = %dest.display(),
                reason = opts.reason,
                "[DRY RUN] Move"
            );
            return Ok(
                TransferRecord::new(TransferStatus::DryRun, src.to_path_buf(), opts.reason, mode)
                    .with_dest(dest)
                    .with_dest_dir(dest_dir.to_path_buf()),
            );
        }

        fs::create_dir_all(dest_dir)
            .map_err(|e| TransferError::io("Failed to create destination directory", e))?;

        self.ensure_space(dest_dir, metadata.len())?;

        let dest = match mode {
            TransferMode::SafeVerify => self.safe_move(src, dest_dir, file_name)?,
            TransferMode::Standard => self.standard_move(src, dest_dir, file_name)?,
        };

        info!(
            src = %src.display(),
            dest = %dest.display(),
            reason = opts.reason,
            safe = opts.safe_mode,
            "Moved file"
        );

        Ok(
            TransferRecord::new(TransferStatus::Moved, src.to_path_buf(), opts.reason, mode)
                .with_dest(dest)
                .with_dest_dir(dest_dir.to_path_buf()),
        )
    }

    fn safe_move(&self, src: &Path, dest_dir: &Path, file_name: &OsStr) -> Result<PathBuf, TransferError> {
        let dest = self.copy_to_free_name(src, dest_dir, file_name)?;
        self.verify_and_commit(src, &dest)?;
        Ok(dest)
    }

    /// Confirm `dest` is a faithful copy of `src`, then delete `src`.
    ///
    /// On any failure the destination copy is removed and the source is left
    /// in place, so exactly one intact copy survives either way.
    pub(crate) fn verify_and_commit(&self, src: &Path, dest: &Path) -> Result<(), TransferError> {
        let hashes = verifier::checksum(src, self.checksum)
            .map_err(|e| TransferError::io("Failed to hash source", e))
            .and_then(|source_hash| {
                verifier::checksum(dest, self.checksum)
                    .map(|dest_hash| (source_hash, dest_hash))
                    .map_err(|e| TransferError::io("Failed to hash destination", e))
            });

        let (source_hash, dest_hash) = match hashes {
            Ok(pair) => pair,
            Err(e) => {
                discard(dest);
                return Err(e);
            }
        };

        if source_hash != dest_hash {
            warn!(
                src = %src.display(),
                source_hash = %source_hash,
                dest_hash = %dest_hash,
                "Checksum mismatch, discarding copy"
            );
            discard(dest);
            return Err(TransferError::ChecksumMismatch { source_hash, dest_hash });
        }

        remove_source(src, dest, "Failed to remove source after verified copy")?;

        debug!(src = %src.display(), algorithm = %self.checksum, "Verified copy committed");
        Ok(())
    }

    fn standard_move(&self, src: &Path, dest_dir: &Path, file_name: &OsStr) -> Result<PathBuf, TransferError> {
        let dest = unique_path(dest_dir, file_name);
        match fs::rename(src, &dest) {
            Ok(()) => Ok(dest),
            Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
                debug!(src = %src.display(), "Cross-device move, copying instead");
                let dest = self.copy_to_free_name(src, dest_dir, file_name)?;
                remove_source(src, &dest, "Failed to remove source after copy")?;
                Ok(dest)
            }
            Err(e) => Err(TransferError::io("Failed to move file", e)),
        }
    }

    fn copy_to_free_name(&self, src: &Path, dest_dir: &Path, file_name: &OsStr) -> Result<PathBuf, TransferError> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let dest = unique_path(dest_dir, file_name);
            match copy::copy_file_exclusive(src, &dest, self.sync_files) {
                Ok(_) => return Ok(dest),
                Err(TransferError::DestinationExists(taken)) => {
                    debug!(dest = %taken.display(), "Destination claimed concurrently, probing again");
                }
                Err(e) => return Err(e),
            }
        }
        Err(TransferError::io(
            "Failed to reserve a destination name",
            io::Error::new(ErrorKind::AlreadyExists, "too many concurrent collisions"),
        ))
    }
}

/// `target_dir/filename` if free, otherwise the first free `stem_N.ext`.
///
/// The check is not atomic; callers that create the file must use
/// create-exclusive semantics to detect a lost race.
pub fn unique_path(target_dir: &Path, filename: &OsStr) -> PathBuf {
    let candidate = target_dir.join(filename);
    if !occupied(&candidate) {
        return candidate;
    }

    let name = Path::new(filename);
    let stem = name.file_stem().unwrap_or(filename);
    let extension = name.extension();

    let mut counter: u64 = 1;
    loop {
        let mut numbered = stem.to_os_string();
        numbered.push(format!("_{}", counter));
        if let Some(ext) = extension {
            numbered.push(".");
            numbered.push(ext);
        }
        let candidate = target_dir.join(numbered);
        if !occupied(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Delete `src` once `dest` holds a complete copy of it.
///
/// If `src` is already gone, `dest` is the only copy left and is kept. Any
/// other failure leaves `src` in place, so the copy is discarded.
fn remove_source(src: &Path, dest: &Path, context: &str) -> Result<(), TransferError> {
    match fs::remove_file(src) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(src = %src.display(), dest = %dest.display(), "Source vanished after copy, keeping destination");
            Ok(())
        }
        Err(e) => {
            discard(dest);
            Err(TransferError::io(context, e))
        }
    }
}

// Dangling symlinks count as occupied so a rename never replaces them.
fn occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}
