//! Registration control surface.
//!
//! The host mounts these operations on a pseudo-directory: one `add`
//! node (write a path to create a device, read for a counter summary)
//! and one read-only status node per device, named by the device's id
//! letter. Name-to-id resolution of the node paths is host glue; the
//! helpers here work on ids.
//!
//! The status dump is observability only: it is assembled from a
//! point-in-time snapshot of the mutable fields and is not
//! authoritative under concurrent opens.

use crate::{PunchCtx, device::PunchDevice};
use fp_error::{PunchError, Result};
use fp_types::{DeviceId, PATH_MAX};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use tracing::warn;

/// One run of the status dump, all fields in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtentTriple {
    pub file_offset: u64,
    pub disk_offset: u64,
    pub length: u64,
}

/// Point-in-time status of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub filename: String,
    pub minor_number: u32,
    pub use_count: u32,
    pub size: u64,
    pub cluster_size: u32,
    pub extents: Vec<ExtentTriple>,
}

impl DeviceStatus {
    fn snapshot(device: &PunchDevice) -> Self {
        let cluster = u64::from(device.cluster_size().get());
        let extents = device
            .extents()
            .runs()
            .iter()
            .map(|run| ExtentTriple {
                file_offset: run.vcn.0.saturating_mul(cluster),
                disk_offset: run.lcn.0.saturating_mul(cluster),
                length: run.clusters.saturating_mul(cluster),
            })
            .collect();
        Self {
            filename: device.path().display().to_string(),
            minor_number: device.minor(),
            use_count: device.users(),
            size: device.size_bytes(),
            cluster_size: device.cluster_size().get(),
            extents,
        }
    }

    /// Render the textual dump served by the device's status node.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "filename: {}", self.filename);
        let _ = writeln!(out, "minor_number: {}", self.minor_number);
        let _ = writeln!(out, "use_count: {}", self.use_count);
        let _ = writeln!(out, "size: {}", self.size);
        let _ = writeln!(out, "cluster_size: {}", self.cluster_size);
        let _ = writeln!(out);
        let _ = writeln!(out, "file_offset:disk_offset:length");
        for triple in &self.extents {
            let _ = writeln!(
                out,
                "{}:{}:{}",
                triple.file_offset, triple.disk_offset, triple.length
            );
        }
        out
    }
}

/// Status-node name for a device id (`'a' + id`).
#[must_use]
pub fn node_name(id: DeviceId) -> String {
    char::from(b'a' + (id.0 as u8 % 26)).to_string()
}

/// Inverse of [`node_name`].
#[must_use]
pub fn parse_node_name(name: &str) -> Option<DeviceId> {
    let mut chars = name.chars();
    let letter = chars.next()?;
    if chars.next().is_some() || !letter.is_ascii_lowercase() {
        return None;
    }
    Some(DeviceId((letter as u8 - b'a') as usize))
}

impl PunchCtx {
    /// Handle a write to the add node: a path, at most [`PATH_MAX`]
    /// bytes, surrounding whitespace ignored. Returns the number of
    /// bytes consumed on success.
    pub fn write_add(&self, input: &str) -> Result<usize> {
        if input.len() > PATH_MAX {
            warn!(target: "punch::control", len = input.len(), "added path too long");
            return Err(PunchError::PathTooLong {
                len: input.len(),
                max: PATH_MAX,
            });
        }
        let path = input.trim();
        self.add_device(Path::new(path))?;
        Ok(input.len())
    }

    /// Contents of the add node on read.
    #[must_use]
    pub fn read_add(&self) -> String {
        format!(
            "major_num: {}\nnum_devices: {}\n",
            self.major(),
            self.num_devices()
        )
    }

    /// Snapshot one device's status.
    pub fn device_status(&self, id: DeviceId) -> Result<DeviceStatus> {
        let device = self.device(id)?;
        Ok(DeviceStatus::snapshot(&device))
    }

    /// Contents of a device's status node on read.
    pub fn read_node(&self, id: DeviceId) -> Result<String> {
        Ok(self.device_status(id)?.render())
    }
}
