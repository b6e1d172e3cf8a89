#![forbid(unsafe_code)]
//! Extent map: the ordered run list of one punched device, and the
//! resolve step of the I/O translation path.
//!
//! The map is copied out of the source file's metadata once, at
//! registration time, and never mutated afterwards. That invariant is
//! what lets [`ExtentMap::resolve`] run lock-free on the hot path: every
//! reader sees the same runs, and there is no writer to serialize
//! against.
//!
//! Runs are kept as a length-prefixed vector. The source layer's
//! zero-length sentinel terminates the *input* run list and is not
//! stored.

use fp_error::{PunchError, Result};
use fp_types::{ClusterSize, Lcn, RawRun, Sector, Vcn};
use serde::{Deserialize, Serialize};

/// One contiguous mapping of `clusters` clusters from virtual cluster
/// `vcn` to volume cluster `lcn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    pub vcn: Vcn,
    pub lcn: Lcn,
    pub clusters: u64,
}

impl Extent {
    /// First virtual cluster past this run.
    #[must_use]
    pub fn end_vcn(&self) -> Vcn {
        Vcn(self.vcn.0.saturating_add(self.clusters))
    }
}

/// Outcome of resolving a sector range against the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The whole range lies inside one extent; this is the physical
    /// start sector on the backing device.
    Mapped(Sector),
    /// The range straddles an extent boundary `at` sectors past the
    /// request start. `at` is strictly inside the range.
    Split { at: u64 },
    /// No extent covers the range.
    Unmapped,
}

/// Immutable ordered run list for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtentMap {
    runs: Vec<Extent>,
    total_clusters: u64,
}

impl ExtentMap {
    /// Copy a sentinel-terminated run list into owned storage.
    ///
    /// Runs at and after the first zero-length entry are dropped. An
    /// input of only the sentinel yields an empty map, which backs a
    /// zero-length device.
    #[must_use]
    pub fn copy_runs(raw: &[RawRun]) -> Self {
        let mut runs = Vec::new();
        let mut total_clusters = 0_u64;
        for run in raw {
            if run.is_sentinel() {
                break;
            }
            runs.push(Extent {
                vcn: Vcn(run.vcn),
                lcn: Lcn(run.lcn),
                clusters: run.length,
            });
            total_clusters = total_clusters.saturating_add(run.length);
        }
        Self {
            runs,
            total_clusters,
        }
    }

    /// Structural validation of a candidate run list, without copying.
    ///
    /// Requires the runs (up to the sentinel) to start at virtual
    /// cluster 0, to be contiguous and gap-free, and to cover exactly
    /// `allocated_bytes` when scaled by `cluster_size`. Contiguity is
    /// strictly stronger than the monotone-coverage rule the original
    /// metadata guarantees, so every list accepted here satisfies both.
    pub fn check_runs(
        raw: &[RawRun],
        cluster_size: ClusterSize,
        allocated_bytes: u64,
    ) -> Result<()> {
        let mut expected_vcn = 0_u64;
        let mut total_clusters = 0_u64;
        for (index, run) in raw.iter().enumerate() {
            if run.is_sentinel() {
                break;
            }
            if run.vcn != expected_vcn {
                return Err(PunchError::ExtentsOutOfOrder { index });
            }
            expected_vcn = run
                .vcn
                .checked_add(run.length)
                .ok_or(PunchError::ExtentsOutOfOrder { index })?;
            total_clusters = total_clusters.saturating_add(run.length);
        }

        let mapped = cluster_size
            .clusters_to_bytes(total_clusters)
            .ok_or(PunchError::ExtentSizeMismatch {
                mapped: u64::MAX,
                allocated: allocated_bytes,
            })?;
        if mapped != allocated_bytes {
            return Err(PunchError::ExtentSizeMismatch {
                mapped,
                allocated: allocated_bytes,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn runs(&self) -> &[Extent] {
        &self.runs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Total mapped length in clusters.
    #[must_use]
    pub fn total_clusters(&self) -> u64 {
        self.total_clusters
    }

    /// Resolve the sector range `[start, end)` against the map.
    ///
    /// `sectors_per_cluster` is the device's cluster-to-sector ratio.
    /// Intervals are right-open throughout: a range starting exactly at
    /// a run's coverage end belongs to the next run.
    ///
    /// The scan mirrors the registration-time ordering of the runs, so
    /// the first run whose coverage admits the range decides the
    /// outcome. Overflow in the scaled coordinates means the range is
    /// beyond anything the map can cover and resolves to `Unmapped`.
    #[must_use]
    pub fn resolve(&self, start: Sector, end: Sector, sectors_per_cluster: u64) -> Resolution {
        for run in &self.runs {
            let Some(run_start) = run.vcn.0.checked_mul(sectors_per_cluster) else {
                return Resolution::Unmapped;
            };
            let Some(run_len) = run.clusters.checked_mul(sectors_per_cluster) else {
                return Resolution::Unmapped;
            };
            let Some(run_end) = run_start.checked_add(run_len) else {
                return Resolution::Unmapped;
            };

            if start.0 >= run_start && end.0 <= run_end {
                let Some(phys_base) = run.lcn.0.checked_mul(sectors_per_cluster) else {
                    return Resolution::Unmapped;
                };
                let Some(phys) = (start.0 - run_start).checked_add(phys_base) else {
                    return Resolution::Unmapped;
                };
                return Resolution::Mapped(Sector(phys));
            }

            if start.0 < run_start && end.0 <= run_end {
                return Resolution::Split {
                    at: run_start - start.0,
                };
            }
        }
        Resolution::Unmapped
    }
}
