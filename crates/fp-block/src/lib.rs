#![forbid(unsafe_code)]
//! Host block-layer seam: the request descriptor the translator works
//! on, the trait for the backing physical device, and the trait through
//! which finished devices are published to the host.
//!
//! The host block subsystem itself (queue registration, completion
//! callbacks, disk registration) is external; these types are only the
//! interfaces the core needs from it.

use fp_error::{PunchError, Result};
use fp_types::{SECTOR_SIZE, Sector};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;

/// Direction of a block request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BioOp {
    Read,
    Write,
    /// Barrier request; carries no data and is passed through untranslated.
    Flush,
}

/// Data carried by a request: a caller-owned buffer to fill on reads, a
/// borrowed payload on writes, nothing on flushes.
#[derive(Debug)]
pub enum BioBuf<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
    None,
}

impl BioBuf<'_> {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Read(buf) => buf.len(),
            Self::Write(buf) => buf.len(),
            Self::None => 0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One block I/O request in flight.
///
/// `start` is in sector units on whichever device the bio is currently
/// addressed to; the translator rewrites it when forwarding to the
/// backing device. The buffer length must be a whole number of sectors
/// for data requests (checked at submission).
#[derive(Debug)]
pub struct Bio<'a> {
    pub op: BioOp,
    pub start: Sector,
    pub buf: BioBuf<'a>,
    /// Force-unit-access: the write must reach stable storage before
    /// completion. Passed through to the backing device unchanged.
    pub fua: bool,
}

impl<'a> Bio<'a> {
    #[must_use]
    pub fn read(start: Sector, buf: &'a mut [u8]) -> Self {
        Self {
            op: BioOp::Read,
            start,
            buf: BioBuf::Read(buf),
            fua: false,
        }
    }

    #[must_use]
    pub fn write(start: Sector, data: &'a [u8]) -> Self {
        Self {
            op: BioOp::Write,
            start,
            buf: BioBuf::Write(data),
            fua: false,
        }
    }

    #[must_use]
    pub fn flush() -> Self {
        Self {
            op: BioOp::Flush,
            start: Sector::ZERO,
            buf: BioBuf::None,
            fua: false,
        }
    }

    #[must_use]
    pub fn with_fua(mut self, fua: bool) -> Self {
        self.fua = fua;
        self
    }

    #[must_use]
    pub fn len_bytes(&self) -> usize {
        self.buf.len()
    }

    /// Request length in whole sectors (trailing partial sectors are a
    /// submission error and never reach here).
    #[must_use]
    pub fn sectors(&self) -> u64 {
        self.len_bytes() as u64 / SECTOR_SIZE
    }

    /// One past the last requested sector, `None` on address overflow.
    #[must_use]
    pub fn end(&self) -> Option<Sector> {
        self.start.checked_add(self.sectors())
    }

    /// Cut this bio in two at `at_sectors` past its start, splitting the
    /// data buffer at the matching byte offset. Both halves inherit the
    /// op and FUA flag. Returns `None` unless the cut is strictly inside
    /// the request, or for flushes (nothing to cut).
    #[must_use]
    pub fn split_at(self, at_sectors: u64) -> Option<(Self, Self)> {
        if at_sectors == 0 || at_sectors >= self.sectors() {
            return None;
        }
        let at_bytes = usize::try_from(at_sectors.checked_mul(SECTOR_SIZE)?).ok()?;
        let second_start = self.start.checked_add(at_sectors)?;

        match self.buf {
            BioBuf::Read(buf) => {
                let (first, second) = buf.split_at_mut(at_bytes);
                Some((
                    Self {
                        op: self.op,
                        start: self.start,
                        buf: BioBuf::Read(first),
                        fua: self.fua,
                    },
                    Self {
                        op: self.op,
                        start: second_start,
                        buf: BioBuf::Read(second),
                        fua: self.fua,
                    },
                ))
            }
            BioBuf::Write(buf) => {
                let (first, second) = buf.split_at(at_bytes);
                Some((
                    Self {
                        op: self.op,
                        start: self.start,
                        buf: BioBuf::Write(first),
                        fua: self.fua,
                    },
                    Self {
                        op: self.op,
                        start: second_start,
                        buf: BioBuf::Write(second),
                        fua: self.fua,
                    },
                ))
            }
            BioBuf::None => None,
        }
    }
}

/// Backing physical device: accepts remapped bios for execution.
///
/// Completion is synchronous from the submitter's point of view; the
/// host dispatcher reports it to the original requester, not to the
/// translator.
pub trait BioSink: Send + Sync {
    fn submit(&self, bio: Bio<'_>) -> Result<()>;
}

/// Transfer-size hints handed to the host when a disk is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueLimits {
    /// Largest single transfer, in sectors. Set to one cluster so a
    /// transfer never spans more than two extents.
    pub max_sectors: u32,
    pub logical_block_size: u32,
}

/// Everything the host needs to expose one disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpec {
    pub name: String,
    pub major: u32,
    pub minor: u32,
    /// Whole sectors; bytes past the last full sector are not exposed.
    pub capacity_sectors: u64,
    pub limits: QueueLimits,
}

/// Host-side token for a published disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiskHandle(pub u64);

/// Disk registration surface of the host block subsystem.
pub trait DiskHost: Send + Sync {
    /// Reserve a device-major identifier for this driver.
    fn register_major(&self, name: &str) -> Result<u32>;

    fn unregister_major(&self, major: u32, name: &str);

    /// Make a fully-constructed disk visible to external consumers.
    /// Irrevocable except through [`DiskHost::retire`].
    fn publish(&self, spec: &DiskSpec) -> Result<DiskHandle>;

    fn retire(&self, handle: DiskHandle);
}

/// File-backed [`BioSink`] using positional I/O.
///
/// Opens read-write when permitted, falling back to read-only. Uses
/// `std::os::unix::fs::FileExt`, which is thread-safe and needs no
/// shared seek position.
#[derive(Debug, Clone)]
pub struct FileDisk {
    file: Arc<File>,
    len: u64,
    writable: bool,
}

impl FileDisk {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let (file, writable) = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())
            .map(|file| (file, true))
            .or_else(|_| {
                OpenOptions::new()
                    .read(true)
                    .open(path.as_ref())
                    .map(|file| (file, false))
            })?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(file),
            len,
            writable,
        })
    }

    #[must_use]
    pub fn len_bytes(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub fn writable(&self) -> bool {
        self.writable
    }

    fn byte_range(&self, bio: &Bio<'_>) -> Result<u64> {
        let offset = bio
            .start
            .0
            .checked_mul(SECTOR_SIZE)
            .ok_or_else(|| io_invalid("bio offset overflows u64"))?;
        let end = offset
            .checked_add(bio.len_bytes() as u64)
            .ok_or_else(|| io_invalid("bio range overflows u64"))?;
        if end > self.len {
            return Err(io_invalid(&format!(
                "bio out of bounds: offset={offset} len={} device_len={}",
                bio.len_bytes(),
                self.len
            )));
        }
        Ok(offset)
    }
}

fn io_invalid(detail: &str) -> PunchError {
    PunchError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        detail.to_owned(),
    ))
}

impl BioSink for FileDisk {
    fn submit(&self, bio: Bio<'_>) -> Result<()> {
        if matches!(bio.op, BioOp::Flush) {
            self.file.sync_all()?;
            return Ok(());
        }

        let offset = self.byte_range(&bio)?;
        let fua = bio.fua;
        match bio.buf {
            BioBuf::Read(buf) => {
                self.file.read_exact_at(buf, offset)?;
            }
            BioBuf::Write(data) => {
                if !self.writable {
                    return Err(PunchError::Io(std::io::Error::from(
                        std::io::ErrorKind::PermissionDenied,
                    )));
                }
                self.file.write_all_at(data, offset)?;
                if fua {
                    self.file.sync_data()?;
                }
            }
            BioBuf::None => {}
        }
        Ok(())
    }
}
