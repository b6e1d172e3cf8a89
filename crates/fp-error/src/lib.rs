#![forbid(unsafe_code)]
//! Error types for filepunch.
//!
//! One user-facing error enum covers the three failure families the
//! driver distinguishes:
//!
//! - *Validation errors*: the candidate source file is not eligible.
//!   Reported synchronously to the add caller; no device is created and
//!   no partial state persists.
//! - *Resource/control errors*: registry namespace exhausted, path bound
//!   exceeded, unknown device id, removal of a device still in use.
//! - *I/O mapping errors*: a request range no extent covers. Reported to
//!   the requester as a hard I/O failure; the device stays usable.
//!
//! Every variant maps to exactly one POSIX errno via
//! [`PunchError::to_errno`]. The mapping is exhaustive (no wildcard
//! arms) so adding a variant is a compile error until its errno is
//! assigned.
//!
//! `fp-error` depends on nothing else in the workspace; variant payloads
//! are plain integers and strings so the crate can sit below every other
//! member.

use thiserror::Error;

/// Unified error type for all filepunch operations.
#[derive(Debug, Error)]
pub enum PunchError {
    /// Operating system I/O error (wraps `std::io::Error`).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The source filesystem is mounted writable. Extents of a file on a
    /// writable mount may move underneath the exposed device.
    #[error("source filesystem is mounted read-write")]
    WritableMount,

    /// The file does not live on the supported source filesystem.
    #[error("file is not on an ntfs volume (found {found})")]
    ForeignFilesystem { found: String },

    /// The file's metadata attribute is not a plain data stream.
    #[error("source attribute is not a data stream")]
    NotDataStream,

    /// The source inode carries no volume metadata reference.
    #[error("source inode has no volume reference")]
    MissingVolume,

    /// Sparse regions have no physical backing to remap to.
    #[error("file is not fully allocated (allocated {allocated}, initialized {initialized})")]
    NotFullyAllocated { allocated: u64, initialized: u64 },

    /// The source metadata carries no run list at all.
    #[error("source inode has no extent map")]
    MissingExtentMap,

    /// A run starts before the previous run's coverage ends.
    #[error("extent map out of order at run {index}")]
    ExtentsOutOfOrder { index: usize },

    /// Total mapped bytes disagree with the file's allocated size.
    #[error("extent map covers {mapped} bytes but file allocates {allocated}")]
    ExtentSizeMismatch { mapped: u64, allocated: u64 },

    /// Cluster size is not a power-of-two multiple of the sector size.
    #[error("unsupported cluster size {cluster_size}")]
    UnalignedClusterSize { cluster_size: u32 },

    /// Path written to the add node exceeds the accepted bound.
    #[error("path length {len} exceeds maximum {max}")]
    PathTooLong { len: usize, max: usize },

    /// All single-letter device ids are taken.
    #[error("device namespace exhausted ({max} devices)")]
    NamespaceExhausted { max: usize },

    /// A request buffer is not a whole number of sectors.
    #[error("request length {bytes} is not sector-aligned")]
    UnalignedRequest { bytes: usize },

    /// No extent covers the requested sector range.
    #[error("sectors [{start}, {end}) map to no extent")]
    Unmapped { start: u64, end: u64 },

    /// The device still has open users.
    #[error("device busy ({users} open users)")]
    Busy { users: u32 },

    /// No live device with this id.
    #[error("no device with id {id}")]
    NotFound { id: usize },
}

impl PunchError {
    /// Convert this error into a POSIX errno.
    ///
    /// Policy notes:
    /// - every validation failure is `EINVAL`: the input file is
    ///   structurally ineligible, which is an argument problem, not an
    ///   I/O problem;
    /// - `Unmapped` is `EIO`: the request was well-formed but cannot be
    ///   served, and the requester sees a failed transfer;
    /// - `Busy` is `EBUSY`: removal refused while open users remain.
    #[must_use]
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            Self::WritableMount
            | Self::ForeignFilesystem { .. }
            | Self::NotDataStream
            | Self::MissingVolume
            | Self::NotFullyAllocated { .. }
            | Self::MissingExtentMap
            | Self::ExtentsOutOfOrder { .. }
            | Self::ExtentSizeMismatch { .. }
            | Self::UnalignedClusterSize { .. }
            | Self::UnalignedRequest { .. } => libc::EINVAL,
            Self::PathTooLong { .. } => libc::ENAMETOOLONG,
            Self::NamespaceExhausted { .. } => libc::ENOSPC,
            Self::Unmapped { .. } => libc::EIO,
            Self::Busy { .. } => libc::EBUSY,
            Self::NotFound { .. } => libc::ENOENT,
        }
    }

    /// Whether this error came from source-file validation.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::WritableMount
                | Self::ForeignFilesystem { .. }
                | Self::NotDataStream
                | Self::MissingVolume
                | Self::NotFullyAllocated { .. }
                | Self::MissingExtentMap
                | Self::ExtentsOutOfOrder { .. }
                | Self::ExtentSizeMismatch { .. }
                | Self::UnalignedClusterSize { .. }
        )
    }
}

/// Result alias using `PunchError`.
pub type Result<T> = std::result::Result<T, PunchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping_covers_all_variants() {
        let cases: Vec<(PunchError, libc::c_int)> = vec![
            (PunchError::Io(std::io::Error::other("test")), libc::EIO),
            (PunchError::WritableMount, libc::EINVAL),
            (
                PunchError::ForeignFilesystem {
                    found: "ext4".into(),
                },
                libc::EINVAL,
            ),
            (PunchError::NotDataStream, libc::EINVAL),
            (PunchError::MissingVolume, libc::EINVAL),
            (
                PunchError::NotFullyAllocated {
                    allocated: 8192,
                    initialized: 4096,
                },
                libc::EINVAL,
            ),
            (PunchError::MissingExtentMap, libc::EINVAL),
            (PunchError::ExtentsOutOfOrder { index: 2 }, libc::EINVAL),
            (
                PunchError::ExtentSizeMismatch {
                    mapped: 4096,
                    allocated: 8192,
                },
                libc::EINVAL,
            ),
            (
                PunchError::UnalignedClusterSize { cluster_size: 1000 },
                libc::EINVAL,
            ),
            (
                PunchError::PathTooLong {
                    len: 5000,
                    max: 4096,
                },
                libc::ENAMETOOLONG,
            ),
            (PunchError::NamespaceExhausted { max: 26 }, libc::ENOSPC),
            (PunchError::UnalignedRequest { bytes: 100 }, libc::EINVAL),
            (PunchError::Unmapped { start: 300, end: 310 }, libc::EIO),
            (PunchError::Busy { users: 1 }, libc::EBUSY),
            (PunchError::NotFound { id: 9 }, libc::ENOENT),
        ];

        for (error, expected) in &cases {
            assert_eq!(error.to_errno(), *expected, "wrong errno for {error:?}");
        }
    }

    #[test]
    fn io_error_preserves_raw_os_error() {
        let raw = std::io::Error::from_raw_os_error(libc::EPERM);
        assert_eq!(PunchError::Io(raw).to_errno(), libc::EPERM);
    }

    #[test]
    fn validation_family_is_marked() {
        assert!(PunchError::WritableMount.is_validation());
        assert!(PunchError::ExtentsOutOfOrder { index: 0 }.is_validation());
        assert!(!PunchError::Busy { users: 2 }.is_validation());
        assert!(!PunchError::Unmapped { start: 0, end: 8 }.is_validation());
    }

    #[test]
    fn display_formatting() {
        let err = PunchError::ExtentSizeMismatch {
            mapped: 4096,
            allocated: 8192,
        };
        assert_eq!(
            err.to_string(),
            "extent map covers 4096 bytes but file allocates 8192"
        );

        let busy = PunchError::Busy { users: 3 };
        assert_eq!(busy.to_string(), "device busy (3 open users)");

        let unmapped = PunchError::Unmapped { start: 300, end: 310 };
        assert_eq!(unmapped.to_string(), "sectors [300, 310) map to no extent");
    }
}
