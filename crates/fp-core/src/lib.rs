#![forbid(unsafe_code)]
//! filepunch core: expose a fully-allocated file on a read-only NTFS
//! volume as an independent block device.
//!
//! The driver copies the file's run list once at registration and then
//! remaps every incoming sector range onto the volume's physical
//! device, splitting requests that straddle an extent boundary. All
//! process-wide state lives in an owned [`PunchCtx`] threaded through
//! the entry points; there is no ambient singleton.
//!
//! # Adding a device
//!
//! ```ignore
//! let ctx = PunchCtx::new(host, resolver)?;
//! let id = ctx.add_device(Path::new("/mnt/ntfs/disk.img"))?;
//! let dev = ctx.device(id)?;
//! dev.submit(Bio::read(Sector(0), &mut buf))?;
//! ```

mod control;
mod device;
mod registry;
mod source;
#[cfg(test)]
mod testutil;
mod translate;
mod validator;

pub use control::{DeviceStatus, ExtentTriple, node_name, parse_node_name};
pub use device::{DISK_PREFIX, PunchDevice};
pub use source::{SOURCE_FS_NAME, SourceFile, SourceResolver};
pub use validator::validate_source;

use crate::registry::Registry;
use fp_error::{PunchError, Result};
use fp_extent::ExtentMap;
use fp_types::{ClusterSize, DeviceId};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Name under which the driver reserves its device major.
pub const DRIVER_NAME: &str = "filepunch";

/// Process-wide driver context: the host seams, the reserved major, and
/// the device registry.
pub struct PunchCtx {
    host: Arc<dyn fp_block::DiskHost>,
    resolver: Arc<dyn SourceResolver>,
    major: u32,
    registry: Registry,
}

impl PunchCtx {
    /// Initialize the driver: reserve a major and stand up an empty
    /// registry. The control surface is served off this context.
    pub fn new(
        host: Arc<dyn fp_block::DiskHost>,
        resolver: Arc<dyn SourceResolver>,
    ) -> Result<Self> {
        let major = host.register_major(DRIVER_NAME)?;
        debug!(target: "punch::ctx", major, "initialized");
        Ok(Self {
            host,
            resolver,
            major,
            registry: Registry::new(),
        })
    }

    #[must_use]
    pub fn major(&self) -> u32 {
        self.major
    }

    #[must_use]
    pub fn num_devices(&self) -> usize {
        self.registry.live()
    }

    /// Live device ids in creation order.
    #[must_use]
    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.registry.ids()
    }

    pub fn device(&self, id: DeviceId) -> Result<Arc<PunchDevice>> {
        self.registry.get(id)
    }

    /// Validate a source file and expose it as a new device.
    ///
    /// The run-list copy happens here, at registration time, so nothing
    /// long-latency remains on the I/O path. The disk is published to
    /// the host only once the record is complete; a publish failure
    /// unwinds the registry slot and reports the error to the caller.
    pub fn add_device(&self, path: &Path) -> Result<DeviceId> {
        let source = self.resolver.open(path)?;
        validator::validate_source(&*source)?;

        let raw_cluster_size = source.cluster_size_bytes();
        let cluster_size =
            ClusterSize::new(raw_cluster_size).map_err(|_| PunchError::UnalignedClusterSize {
                cluster_size: raw_cluster_size,
            })?;
        let map = ExtentMap::copy_runs(source.runs());

        let id = self
            .registry
            .insert_with(|id| Arc::new(PunchDevice::new(id, source, cluster_size, map)))?;
        let device = self.registry.get(id)?;

        match self.host.publish(&device.disk_spec(self.major)) {
            Ok(handle) => {
                device.attach_disk(handle);
                debug!(
                    target: "punch::ctx",
                    device = %device.name(),
                    path = %device.path().display(),
                    size = device.size_bytes(),
                    cluster_size = device.cluster_size().get(),
                    runs = device.extents().len(),
                    "device_added"
                );
                Ok(id)
            }
            Err(err) => {
                let _ = self.registry.remove(id);
                Err(err)
            }
        }
    }

    /// Remove one device. Refused with [`PunchError::Busy`] while the
    /// device has open users.
    pub fn remove_device(&self, id: DeviceId) -> Result<()> {
        let device = self.registry.get(id)?;
        let handle = device.begin_retire()?;
        if let Some(handle) = handle {
            self.host.retire(handle);
        }
        self.registry.remove(id)?;
        debug!(target: "punch::ctx", device = %device.name(), "device_removed");
        Ok(())
    }

    /// Tear down every device in reverse creation order and release the
    /// major. Devices still in use are retired anyway, with a warning;
    /// dropping the last reference releases the source handle and the
    /// extent map.
    pub fn shutdown(&self) {
        for id in self.registry.ids().into_iter().rev() {
            let Ok(device) = self.registry.get(id) else {
                continue;
            };
            let users = device.users();
            if users > 0 {
                warn!(
                    target: "punch::ctx",
                    device = %device.name(),
                    users,
                    "removing device still in use"
                );
            }
            if let Some(handle) = device.force_retire() {
                self.host.retire(handle);
            }
            let _ = self.registry.remove(id);
        }
        self.host.unregister_major(self.major, DRIVER_NAME);
        debug!(target: "punch::ctx", "shutdown complete");
    }
}
