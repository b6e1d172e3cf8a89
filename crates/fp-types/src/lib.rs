#![forbid(unsafe_code)]
//! Unit-carrying types shared across the filepunch workspace.
//!
//! Extent coordinates are in whole clusters; the exposed device speaks
//! 512-byte sectors. Keeping the units in distinct newtypes prevents
//! mixing the two address spaces in the translation path.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sector size of the exposed device, in bytes.
pub const SECTOR_SIZE: u64 = 512;

/// log2 of [`SECTOR_SIZE`].
pub const SECTOR_SHIFT: u32 = 9;

/// Upper bound on a path written to the add control node.
pub const PATH_MAX: usize = 4096;

/// Maximum live devices. Status nodes are named by a single letter
/// (`'a' + id`), so the id namespace ends at `'z'`.
pub const MAX_DEVICES: usize = 26;

/// Virtual cluster number: offset into the exposed device, in clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Vcn(pub u64);

/// Physical cluster number: offset on the backing volume, in clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lcn(pub u64);

/// Sector address on either the exposed or the backing device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Sector(pub u64);

impl Sector {
    pub const ZERO: Self = Self(0);

    /// Advance by a sector count, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, sectors: u64) -> Option<Self> {
        self.0.checked_add(sectors).map(Self)
    }

    /// Distance to a later sector, returning `None` when `other < self`.
    #[must_use]
    pub fn distance_to(self, other: Self) -> Option<u64> {
        other.0.checked_sub(self.0)
    }
}

/// Registry-assigned device identifier. Ids are dense, start at 0, and
/// are never recycled while the registry lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub usize);

/// Source-file attribute kind as reported by the source filesystem layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrKind {
    /// Plain data stream; the only kind eligible for punching.
    Data,
    Directory,
    Other,
}

/// One run as stored by the source filesystem: a contiguous mapping of
/// `length` clusters from virtual cluster `vcn` to volume cluster `lcn`.
/// A run with `length == 0` terminates the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRun {
    pub vcn: u64,
    pub lcn: u64,
    pub length: u64,
}

impl RawRun {
    #[must_use]
    pub fn sentinel() -> Self {
        Self {
            vcn: 0,
            lcn: 0,
            length: 0,
        }
    }

    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.length == 0
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ClusterSizeError {
    #[error("cluster size {0} is not a power of two in 512..=2097152")]
    OutOfRange(u32),
}

/// Validated cluster size (power of two, 512 bytes through 2 MiB).
///
/// The range guarantees the cluster size is a whole multiple of the
/// sector size, so the cluster-to-sector ratio is always an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterSize(u32);

impl ClusterSize {
    pub const MIN: u32 = 512;
    pub const MAX: u32 = 2 * 1024 * 1024;

    pub fn new(value: u32) -> Result<Self, ClusterSizeError> {
        if !value.is_power_of_two() || !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(ClusterSizeError::OutOfRange(value));
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }

    /// Integer cluster-to-sector ratio, computed once per device.
    #[must_use]
    pub fn sectors_per_cluster(self) -> u64 {
        u64::from(self.0) >> SECTOR_SHIFT
    }

    /// Convert a cluster count to bytes, `None` on overflow.
    #[must_use]
    pub fn clusters_to_bytes(self, clusters: u64) -> Option<u64> {
        clusters.checked_mul(u64::from(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_size_accepts_common_values() {
        for value in [512_u32, 1024, 4096, 65536, 2 * 1024 * 1024] {
            let cs = ClusterSize::new(value).expect("valid cluster size");
            assert_eq!(cs.get(), value);
            assert_eq!(cs.sectors_per_cluster(), u64::from(value) / SECTOR_SIZE);
        }
    }

    #[test]
    fn cluster_size_rejects_unaligned_and_out_of_range() {
        for value in [0_u32, 256, 513, 1000, 3 * 1024, 4 * 1024 * 1024] {
            assert_eq!(
                ClusterSize::new(value),
                Err(ClusterSizeError::OutOfRange(value)),
                "{value} should be rejected"
            );
        }
    }

    #[test]
    fn sector_arithmetic_is_checked() {
        assert_eq!(Sector(10).checked_add(5), Some(Sector(15)));
        assert_eq!(Sector(u64::MAX).checked_add(1), None);
        assert_eq!(Sector(10).distance_to(Sector(25)), Some(15));
        assert_eq!(Sector(25).distance_to(Sector(10)), None);
    }

    #[test]
    fn sentinel_run_terminates() {
        assert!(RawRun::sentinel().is_sentinel());
        assert!(
            !RawRun {
                vcn: 0,
                lcn: 7,
                length: 1
            }
            .is_sentinel()
        );
    }
}
