//! Per-device front-end state.
//!
//! A `PunchDevice` is fully constructed before it becomes reachable
//! through the registry, and the disk is published to the host only
//! after that, so external consumers never observe a partial record.
//! The extent map is immutable from construction on and is read without
//! a lock; the device mutex guards only the open count and the disk
//! handle.

use crate::source::SourceFile;
use crate::translate;
use fp_block::{Bio, BioSink, DiskHandle, DiskSpec, QueueLimits};
use fp_error::{PunchError, Result};
use fp_extent::ExtentMap;
use fp_types::{ClusterSize, DeviceId, SECTOR_SIZE};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Prefix of exposed disk names; the full name is the prefix plus the
/// device's id letter, e.g. `puncha`.
pub const DISK_PREFIX: &str = "punch";

#[derive(Debug)]
struct DeviceState {
    users: u32,
    disk: Option<DiskHandle>,
}

/// One exposed virtual block device.
pub struct PunchDevice {
    id: DeviceId,
    name: String,
    path: PathBuf,
    source: Arc<dyn SourceFile>,
    backing: Arc<dyn BioSink>,
    cluster_size: ClusterSize,
    size: u64,
    map: ExtentMap,
    state: Mutex<DeviceState>,
}

impl std::fmt::Debug for PunchDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PunchDevice")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("path", &self.path)
            .field("cluster_size", &self.cluster_size)
            .field("size", &self.size)
            .field("runs", &self.map.len())
            .field("users", &self.users())
            .finish()
    }
}

/// Disk name for a device id (`'a' + id`; the registry caps ids below
/// [`fp_types::MAX_DEVICES`], so the letter never leaves `a..=z`).
#[must_use]
pub(crate) fn device_name(id: DeviceId) -> String {
    let letter = char::from(b'a' + (id.0 as u8 % 26));
    format!("{DISK_PREFIX}{letter}")
}

impl PunchDevice {
    pub(crate) fn new(
        id: DeviceId,
        source: Arc<dyn SourceFile>,
        cluster_size: ClusterSize,
        map: ExtentMap,
    ) -> Self {
        let name = device_name(id);
        let path = source.path().to_path_buf();
        let size = source.allocated_size();
        let backing = source.backing();
        Self {
            id,
            name,
            path,
            source,
            backing,
            cluster_size,
            size,
            map,
            state: Mutex::new(DeviceState {
                users: 0,
                disk: None,
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> DeviceId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn minor(&self) -> u32 {
        self.id.0 as u32
    }

    #[must_use]
    pub fn cluster_size(&self) -> ClusterSize {
        self.cluster_size
    }

    /// Device size in bytes (the file's allocated size).
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.size
    }

    /// Exposed capacity in whole sectors, rounded down.
    #[must_use]
    pub fn capacity_sectors(&self) -> u64 {
        self.size / SECTOR_SIZE
    }

    #[must_use]
    pub fn sectors_per_cluster(&self) -> u64 {
        self.cluster_size.sectors_per_cluster()
    }

    #[must_use]
    pub fn extents(&self) -> &ExtentMap {
        &self.map
    }

    #[must_use]
    pub fn source(&self) -> &Arc<dyn SourceFile> {
        &self.source
    }

    pub(crate) fn backing(&self) -> &Arc<dyn BioSink> {
        &self.backing
    }

    /// Transfer limits handed to the host: one cluster per transfer, so
    /// a request can straddle at most one extent boundary.
    #[must_use]
    pub fn limits(&self) -> QueueLimits {
        QueueLimits {
            max_sectors: self.sectors_per_cluster() as u32,
            logical_block_size: SECTOR_SIZE as u32,
        }
    }

    #[must_use]
    pub fn disk_spec(&self, major: u32) -> DiskSpec {
        DiskSpec {
            name: self.name.clone(),
            major,
            minor: self.minor(),
            capacity_sectors: self.capacity_sectors(),
            limits: self.limits(),
        }
    }

    /// Host open callback.
    pub fn open(&self) {
        let mut state = self.state.lock();
        state.users += 1;
        debug!(target: "punch::device", device = %self.name, users = state.users, "device_opened");
    }

    /// Host release callback.
    pub fn release(&self) {
        let mut state = self.state.lock();
        if state.users == 0 {
            warn!(target: "punch::device", device = %self.name, "release_without_open");
        } else {
            state.users -= 1;
        }
        debug!(target: "punch::device", device = %self.name, users = state.users, "device_released");
    }

    #[must_use]
    pub fn users(&self) -> u32 {
        self.state.lock().users
    }

    pub(crate) fn attach_disk(&self, handle: DiskHandle) {
        self.state.lock().disk = Some(handle);
    }

    /// Detach the disk handle for retirement, refusing while the device
    /// has open users.
    pub(crate) fn begin_retire(&self) -> Result<Option<DiskHandle>> {
        let mut state = self.state.lock();
        if state.users > 0 {
            return Err(PunchError::Busy { users: state.users });
        }
        Ok(state.disk.take())
    }

    /// Detach the disk handle unconditionally (process teardown).
    pub(crate) fn force_retire(&self) -> Option<DiskHandle> {
        self.state.lock().disk.take()
    }

    /// Translate and forward one request. Entry point for both
    /// top-level submissions and resubmitted split halves.
    pub fn submit(&self, bio: Bio<'_>) -> Result<()> {
        translate::submit_bio(self, bio)
    }
}
