#![forbid(unsafe_code)]
//! Test and demo infrastructure for filepunch.
//!
//! Provides in-memory stand-ins for the three external seams: the
//! backing physical device ([`MemDisk`]), the source filesystem layer
//! ([`SimSource`], [`SimResolver`]), and the host disk surface
//! ([`RecordingHost`]). End-to-end suites and the demo binary use them
//! to drive the whole add/translate/remove pipeline without a kernel.

use fp_block::{Bio, BioBuf, BioOp, BioSink, DiskHandle, DiskHost, DiskSpec};
use fp_core::{SourceFile, SourceResolver};
use fp_error::{PunchError, Result};
use fp_types::{AttrKind, RawRun, SECTOR_SIZE};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

// ── In-memory backing device ────────────────────────────────────────────

/// Byte-addressable in-memory volume implementing [`BioSink`].
#[derive(Debug)]
pub struct MemDisk {
    bytes: Mutex<Vec<u8>>,
    flushes: AtomicUsize,
    fua_writes: AtomicUsize,
}

impl MemDisk {
    #[must_use]
    pub fn new(len_bytes: usize) -> Self {
        Self {
            bytes: Mutex::new(vec![0_u8; len_bytes]),
            flushes: AtomicUsize::new(0),
            fua_writes: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn len_bytes(&self) -> usize {
        self.bytes.lock().len()
    }

    #[must_use]
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn fua_writes(&self) -> usize {
        self.fua_writes.load(Ordering::SeqCst)
    }

    /// Seed raw volume content, as a filesystem would have laid it out.
    pub fn seed(&self, offset: usize, data: &[u8]) {
        let mut bytes = self.bytes.lock();
        bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Copy out a raw byte range of the volume.
    #[must_use]
    pub fn snapshot(&self, offset: usize, len: usize) -> Vec<u8> {
        self.bytes.lock()[offset..offset + len].to_vec()
    }

    fn range(&self, bio: &Bio<'_>) -> Result<(usize, usize)> {
        let offset = bio
            .start
            .0
            .checked_mul(SECTOR_SIZE)
            .and_then(|o| usize::try_from(o).ok())
            .ok_or_else(|| oob_error("offset overflow"))?;
        let end = offset
            .checked_add(bio.len_bytes())
            .ok_or_else(|| oob_error("range overflow"))?;
        if end > self.bytes.lock().len() {
            return Err(oob_error("bio past end of volume"));
        }
        Ok((offset, end))
    }
}

fn oob_error(detail: &str) -> PunchError {
    PunchError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        detail.to_owned(),
    ))
}

impl BioSink for MemDisk {
    fn submit(&self, bio: Bio<'_>) -> Result<()> {
        if matches!(bio.op, BioOp::Flush) {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }
        let (offset, end) = self.range(&bio)?;
        let fua = bio.fua;
        match bio.buf {
            BioBuf::Read(buf) => {
                buf.copy_from_slice(&self.bytes.lock()[offset..end]);
            }
            BioBuf::Write(data) => {
                self.bytes.lock()[offset..end].copy_from_slice(data);
                if fua {
                    self.fua_writes.fetch_add(1, Ordering::SeqCst);
                }
            }
            BioBuf::None => {}
        }
        Ok(())
    }
}

// ── Simulated source filesystem layer ───────────────────────────────────

/// A simulated source file: NTFS-shaped metadata over a [`BioSink`].
pub struct SimSource {
    path: PathBuf,
    fs_name: String,
    readonly_mount: bool,
    attr_kind: AttrKind,
    has_volume: bool,
    allocated_size: u64,
    initialized_size: u64,
    cluster_size: u32,
    runs: Vec<RawRun>,
    backing: Arc<dyn BioSink>,
}

impl SourceFile for SimSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn fs_name(&self) -> &str {
        &self.fs_name
    }

    fn readonly_mount(&self) -> bool {
        self.readonly_mount
    }

    fn attr_kind(&self) -> AttrKind {
        self.attr_kind
    }

    fn has_volume(&self) -> bool {
        self.has_volume
    }

    fn allocated_size(&self) -> u64 {
        self.allocated_size
    }

    fn initialized_size(&self) -> u64 {
        self.initialized_size
    }

    fn cluster_size_bytes(&self) -> u32 {
        self.cluster_size
    }

    fn runs(&self) -> &[RawRun] {
        &self.runs
    }

    fn backing(&self) -> Arc<dyn BioSink> {
        Arc::clone(&self.backing)
    }
}

/// Builder for [`SimSource`], eligible by default.
///
/// Unless overridden, the allocated and initialized sizes are derived
/// from the accumulated runs, and the run list is terminated with the
/// sentinel on `build()`.
pub struct SimSourceBuilder {
    path: PathBuf,
    fs_name: String,
    readonly_mount: bool,
    attr_kind: AttrKind,
    has_volume: bool,
    cluster_size: u32,
    runs: Vec<RawRun>,
    allocated_size: Option<u64>,
    initialized_size: Option<u64>,
    backing: Arc<dyn BioSink>,
}

impl SimSourceBuilder {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, backing: Arc<dyn BioSink>) -> Self {
        Self {
            path: path.into(),
            fs_name: "ntfs".to_owned(),
            readonly_mount: true,
            attr_kind: AttrKind::Data,
            has_volume: true,
            cluster_size: 4096,
            runs: Vec::new(),
            allocated_size: None,
            initialized_size: None,
            backing,
        }
    }

    #[must_use]
    pub fn fs_name(mut self, name: &str) -> Self {
        self.fs_name = name.to_owned();
        self
    }

    #[must_use]
    pub fn readonly_mount(mut self, readonly: bool) -> Self {
        self.readonly_mount = readonly;
        self
    }

    #[must_use]
    pub fn attr_kind(mut self, kind: AttrKind) -> Self {
        self.attr_kind = kind;
        self
    }

    #[must_use]
    pub fn has_volume(mut self, present: bool) -> Self {
        self.has_volume = present;
        self
    }

    #[must_use]
    pub fn cluster_size(mut self, bytes: u32) -> Self {
        self.cluster_size = bytes;
        self
    }

    /// Append one run, in cluster units.
    #[must_use]
    pub fn run(mut self, vcn: u64, lcn: u64, length: u64) -> Self {
        self.runs.push(RawRun { vcn, lcn, length });
        self
    }

    #[must_use]
    pub fn allocated_size(mut self, bytes: u64) -> Self {
        self.allocated_size = Some(bytes);
        self
    }

    #[must_use]
    pub fn initialized_size(mut self, bytes: u64) -> Self {
        self.initialized_size = Some(bytes);
        self
    }

    #[must_use]
    pub fn build(mut self) -> SimSource {
        let total_clusters: u64 = self.runs.iter().map(|run| run.length).sum();
        let derived = total_clusters * u64::from(self.cluster_size);
        let allocated = self.allocated_size.unwrap_or(derived);
        let initialized = self.initialized_size.unwrap_or(allocated);
        self.runs.push(RawRun::sentinel());
        SimSource {
            path: self.path,
            fs_name: self.fs_name,
            readonly_mount: self.readonly_mount,
            attr_kind: self.attr_kind,
            has_volume: self.has_volume,
            allocated_size: allocated,
            initialized_size: initialized,
            cluster_size: self.cluster_size,
            runs: self.runs,
            backing: self.backing,
        }
    }
}

/// Resolver serving pre-registered [`SimSource`]s by path.
#[derive(Default)]
pub struct SimResolver {
    files: Mutex<HashMap<PathBuf, Arc<SimSource>>>,
}

impl SimResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, source: SimSource) -> PathBuf {
        let path = source.path.clone();
        self.files.lock().insert(path.clone(), Arc::new(source));
        path
    }
}

impl SourceResolver for SimResolver {
    fn open(&self, path: &Path) -> Result<Arc<dyn SourceFile>> {
        self.files
            .lock()
            .get(path)
            .cloned()
            .map(|source| source as Arc<dyn SourceFile>)
            .ok_or_else(|| PunchError::Io(std::io::Error::from(std::io::ErrorKind::NotFound)))
    }
}

// ── Host double ─────────────────────────────────────────────────────────

/// Disk host recording published specs and retired handles.
#[derive(Debug, Default)]
pub struct RecordingHost {
    next_handle: AtomicU64,
    published: Mutex<Vec<DiskSpec>>,
    retired: Mutex<Vec<DiskHandle>>,
}

impl RecordingHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn published(&self) -> Vec<DiskSpec> {
        self.published.lock().clone()
    }

    #[must_use]
    pub fn retired(&self) -> Vec<DiskHandle> {
        self.retired.lock().clone()
    }
}

impl DiskHost for RecordingHost {
    fn register_major(&self, _name: &str) -> Result<u32> {
        Ok(259)
    }

    fn unregister_major(&self, _major: u32, _name: &str) {}

    fn publish(&self, spec: &DiskSpec) -> Result<DiskHandle> {
        self.published.lock().push(spec.clone());
        Ok(DiskHandle(self.next_handle.fetch_add(1, Ordering::SeqCst)))
    }

    fn retire(&self, handle: DiskHandle) {
        self.retired.lock().push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fp_types::Sector;

    #[test]
    fn mem_disk_round_trips_and_counts_barriers() {
        let disk = MemDisk::new(64 * 1024);
        let payload = vec![0xAB_u8; 1024];
        disk.submit(Bio::write(Sector(4), &payload).with_fua(true))
            .expect("write");

        let mut back = vec![0_u8; 1024];
        disk.submit(Bio::read(Sector(4), &mut back)).expect("read");
        assert_eq!(back, payload);

        disk.submit(Bio::flush()).expect("flush");
        assert_eq!(disk.flushes(), 1);
        assert_eq!(disk.fua_writes(), 1);
    }

    #[test]
    fn mem_disk_rejects_out_of_bounds() {
        let disk = MemDisk::new(1024);
        let mut buf = vec![0_u8; 1024];
        assert!(disk.submit(Bio::read(Sector(2), &mut buf)).is_err());
    }

    #[test]
    fn builder_derives_sizes_from_runs() {
        let backing: Arc<dyn BioSink> = Arc::new(MemDisk::new(1024));
        let source = SimSourceBuilder::new("/mnt/ntfs/x.img", backing)
            .run(0, 10, 4)
            .run(4, 90, 2)
            .build();
        assert_eq!(source.allocated_size(), 6 * 4096);
        assert_eq!(source.initialized_size(), 6 * 4096);
        assert_eq!(source.runs().len(), 3, "two runs plus sentinel");
        assert!(source.runs()[2].is_sentinel());
    }
}
