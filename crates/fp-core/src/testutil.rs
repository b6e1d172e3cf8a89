//! In-crate test doubles for the external seams.

use crate::source::{SourceFile, SourceResolver};
use fp_block::{Bio, BioOp, BioSink, DiskHandle, DiskHost, DiskSpec};
use fp_error::{PunchError, Result};
use fp_extent::ExtentMap;
use fp_types::{AttrKind, ClusterSize, DeviceId, RawRun};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// One forwarded bio, as observed by a [`RecordingSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IssuedIo {
    pub op: BioOp,
    pub start: u64,
    pub sectors: u64,
    pub fua: bool,
}

/// Backing-device double that records what reaches it.
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    issued: Mutex<Vec<IssuedIo>>,
    flushes: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issued(&self) -> Vec<IssuedIo> {
        self.issued.lock().clone()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl BioSink for RecordingSink {
    fn submit(&self, bio: Bio<'_>) -> Result<()> {
        if matches!(bio.op, BioOp::Flush) {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }
        self.issued.lock().push(IssuedIo {
            op: bio.op,
            start: bio.start.0,
            sectors: bio.sectors(),
            fua: bio.fua,
        });
        Ok(())
    }
}

/// Configurable [`SourceFile`] double, eligible by default.
pub(crate) struct MockSource {
    pub path: PathBuf,
    pub fs_name: String,
    pub readonly_mount: bool,
    pub attr_kind: AttrKind,
    pub has_volume: bool,
    pub allocated_size: u64,
    pub initialized_size: u64,
    pub cluster_size: u32,
    pub runs: Vec<RawRun>,
    pub backing: Arc<RecordingSink>,
}

impl MockSource {
    /// Two 8-cluster runs over a 64 KiB file on 4 KiB clusters.
    pub fn eligible() -> Self {
        Self {
            path: PathBuf::from("/mnt/ntfs/image.bin"),
            fs_name: "ntfs".to_owned(),
            readonly_mount: true,
            attr_kind: AttrKind::Data,
            has_volume: true,
            allocated_size: 16 * 4096,
            initialized_size: 16 * 4096,
            cluster_size: 4096,
            runs: vec![
                RawRun {
                    vcn: 0,
                    lcn: 100,
                    length: 8,
                },
                RawRun {
                    vcn: 8,
                    lcn: 500,
                    length: 8,
                },
                RawRun::sentinel(),
            ],
            backing: Arc::new(RecordingSink::new()),
        }
    }
}

impl SourceFile for MockSource {
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
        Arc::clone(&self.backing) as Arc<dyn BioSink>
    }
}

/// Resolver double serving pre-registered mock files.
#[derive(Default)]
pub(crate) struct MockResolver {
    files: Mutex<HashMap<PathBuf, Arc<MockSource>>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, source: MockSource) -> PathBuf {
        let path = source.path.clone();
        self.files.lock().insert(path.clone(), Arc::new(source));
        path
    }
}

impl SourceResolver for MockResolver {
    fn open(&self, path: &Path) -> Result<Arc<dyn SourceFile>> {
        self.files
            .lock()
            .get(path)
            .cloned()
            .map(|source| source as Arc<dyn SourceFile>)
            .ok_or_else(|| {
                PunchError::Io(std::io::Error::from(std::io::ErrorKind::NotFound))
            })
    }
}

/// Host double recording published and retired disks.
#[derive(Debug, Default)]
pub(crate) struct RecordingHost {
    next_handle: AtomicU64,
    pub published: Mutex<Vec<DiskSpec>>,
    pub retired: Mutex<Vec<DiskHandle>>,
    pub fail_publish: AtomicBool,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiskHost for RecordingHost {
    fn register_major(&self, _name: &str) -> Result<u32> {
        Ok(259)
    }

    fn unregister_major(&self, _major: u32, _name: &str) {}

    fn publish(&self, spec: &DiskSpec) -> Result<DiskHandle> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(PunchError::Io(std::io::Error::from(
                std::io::ErrorKind::OutOfMemory,
            )));
        }
        self.published.lock().push(spec.clone());
        Ok(DiskHandle(self.next_handle.fetch_add(1, Ordering::SeqCst)))
    }

    fn retire(&self, handle: DiskHandle) {
        self.retired.lock().push(handle);
    }
}

/// Build a device directly from a mock source, bypassing the registry.
pub(crate) fn make_device(id: DeviceId, source: MockSource) -> Arc<crate::PunchDevice> {
    let cluster_size = ClusterSize::new(source.cluster_size).expect("test cluster size");
    let map = ExtentMap::copy_runs(&source.runs);
    Arc::new(crate::PunchDevice::new(
        id,
        Arc::new(source),
        cluster_size,
        map,
    ))
}
