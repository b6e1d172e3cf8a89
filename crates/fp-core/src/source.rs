//! Seam to the source filesystem's inode/extent layer.
//!
//! The punched file lives on a read-only NTFS volume whose driver owns
//! the real metadata. The core consumes that metadata through
//! [`SourceFile`] and never mutates it; the run list is assumed stable
//! for as long as the handle is open, which the read-only-mount check
//! in the validator is there to defend.

use fp_block::BioSink;
use fp_error::Result;
use fp_types::{AttrKind, RawRun};
use std::path::Path;
use std::sync::Arc;

/// Filesystem type name a candidate file must live on.
pub const SOURCE_FS_NAME: &str = "ntfs";

/// An open handle to a candidate source file plus the metadata the
/// validator and the device front-end need from it.
pub trait SourceFile: Send + Sync {
    /// Path the file was opened by.
    fn path(&self) -> &Path;

    /// Filesystem type name of the mount the file lives on.
    fn fs_name(&self) -> &str;

    /// Whether that mount is read-only.
    fn readonly_mount(&self) -> bool;

    /// Kind of the file's metadata attribute.
    fn attr_kind(&self) -> AttrKind;

    /// Whether the inode carries its volume metadata reference.
    fn has_volume(&self) -> bool;

    /// Allocated size in bytes.
    fn allocated_size(&self) -> u64;

    /// Initialized size in bytes; differs from the allocated size when
    /// the file is sparse.
    fn initialized_size(&self) -> u64;

    /// Volume cluster size in bytes.
    fn cluster_size_bytes(&self) -> u32;

    /// Sentinel-terminated run list from the file's metadata. Empty
    /// means the inode carries no run list at all.
    fn runs(&self) -> &[RawRun];

    /// The physical block device the volume resides on; remapped bios
    /// are forwarded here.
    fn backing(&self) -> Arc<dyn BioSink>;
}

/// Path-to-handle resolution, owned by the source filesystem layer.
pub trait SourceResolver: Send + Sync {
    fn open(&self, path: &Path) -> Result<Arc<dyn SourceFile>>;
}
