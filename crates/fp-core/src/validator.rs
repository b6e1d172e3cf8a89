//! Eligibility checks for a candidate source file.
//!
//! All checks must pass before a device is created; the first failure
//! is returned and nothing is mutated. The caller aborts device
//! creation without partial registration.

use crate::source::{SOURCE_FS_NAME, SourceFile};
use fp_error::{PunchError, Result};
use fp_extent::ExtentMap;
use fp_types::{AttrKind, ClusterSize};
use tracing::warn;

/// Validate a candidate source file.
///
/// Checks, in order:
/// 1. the mount is read-only (extents must not move under the device);
/// 2. the filesystem is the supported one;
/// 3. the attribute is a plain data stream;
/// 4. the volume metadata reference is present;
/// 5. the file is fully allocated (no sparse regions to remap to);
/// 6. the cluster size is a power-of-two multiple of the sector size;
/// 7. the run list exists, is ordered and gap-free, and covers exactly
///    the allocated size.
pub fn validate_source(source: &dyn SourceFile) -> Result<()> {
    let path = source.path().display().to_string();

    if !source.readonly_mount() {
        warn!(target: "punch::validator", path = %path, "source filesystem mounted read-write");
        return Err(PunchError::WritableMount);
    }

    let fs_name = source.fs_name();
    if fs_name != SOURCE_FS_NAME {
        warn!(target: "punch::validator", path = %path, fs_name, "file is not on an ntfs volume");
        return Err(PunchError::ForeignFilesystem {
            found: fs_name.to_owned(),
        });
    }

    if source.attr_kind() != AttrKind::Data {
        warn!(target: "punch::validator", path = %path, kind = ?source.attr_kind(), "attribute is not a data stream");
        return Err(PunchError::NotDataStream);
    }

    if !source.has_volume() {
        warn!(target: "punch::validator", path = %path, "inode has no volume reference");
        return Err(PunchError::MissingVolume);
    }

    let allocated = source.allocated_size();
    let initialized = source.initialized_size();
    if allocated != initialized {
        warn!(
            target: "punch::validator",
            path = %path, allocated, initialized, "file is not fully allocated"
        );
        return Err(PunchError::NotFullyAllocated {
            allocated,
            initialized,
        });
    }

    let raw_cluster_size = source.cluster_size_bytes();
    let cluster_size = ClusterSize::new(raw_cluster_size).map_err(|_| {
        warn!(target: "punch::validator", path = %path, cluster_size = raw_cluster_size, "unsupported cluster size");
        PunchError::UnalignedClusterSize {
            cluster_size: raw_cluster_size,
        }
    })?;

    let runs = source.runs();
    if runs.is_empty() {
        warn!(target: "punch::validator", path = %path, "inode has no run list");
        return Err(PunchError::MissingExtentMap);
    }

    ExtentMap::check_runs(runs, cluster_size, allocated).inspect_err(|err| {
        warn!(target: "punch::validator", path = %path, %err, "run list failed structural checks");
    })?;

    Ok(())
}
