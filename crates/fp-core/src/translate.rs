//! The translation hot path: resolve a request's sector range against
//! the device's extent map, forward it remapped, or cut it at the
//! extent boundary and feed both halves back through the same path.
//!
//! No lock is held anywhere here. The extent map never changes after
//! construction, and the backing sink serializes itself; holding a
//! device lock across a resubmission would only invite self-deadlock.
//!
//! Splitting is driven by an explicit work list rather than recursion,
//! so a request spanning many extents costs stack-free iterations. With
//! the published transfer limit of one cluster a request can straddle
//! at most one boundary; the loop still handles deeper chains for
//! callers that bypass the limit.

use crate::device::PunchDevice;
use fp_block::{Bio, BioOp};
use fp_error::{PunchError, Result};
use fp_extent::Resolution;
use fp_types::SECTOR_SIZE;
use tracing::warn;

pub(crate) fn submit_bio(dev: &PunchDevice, bio: Bio<'_>) -> Result<()> {
    // Barrier semantics belong to the backing device; pass through.
    if matches!(bio.op, BioOp::Flush) {
        return dev.backing().submit(bio);
    }
    if bio.len_bytes() == 0 {
        return Ok(());
    }
    if bio.len_bytes() % SECTOR_SIZE as usize != 0 {
        return Err(PunchError::UnalignedRequest {
            bytes: bio.len_bytes(),
        });
    }

    let spc = dev.sectors_per_cluster();
    let mut pending = Vec::with_capacity(2);
    pending.push(bio);

    while let Some(piece) = pending.pop() {
        let start = piece.start;
        let Some(end) = piece.end() else {
            return Err(PunchError::Unmapped {
                start: start.0,
                end: u64::MAX,
            });
        };

        match dev.extents().resolve(start, end, spc) {
            Resolution::Mapped(phys) => {
                let mut out = piece;
                out.start = phys;
                dev.backing().submit(out)?;
            }
            Resolution::Split { at } => {
                warn!(
                    target: "punch::translate",
                    device = %dev.name(),
                    start = start.0,
                    end = end.0,
                    at,
                    "split_io"
                );
                // resolve only reports a cut strictly inside the range.
                let Some((first, second)) = piece.split_at(at) else {
                    return Err(PunchError::Unmapped {
                        start: start.0,
                        end: end.0,
                    });
                };
                // LIFO: the [start, boundary) half is issued first.
                pending.push(second);
                pending.push(first);
            }
            Resolution::Unmapped => {
                warn!(
                    target: "punch::translate",
                    device = %dev.name(),
                    start = start.0,
                    end = end.0,
                    start_bytes = start.0.saturating_mul(SECTOR_SIZE),
                    "unmapped_io"
                );
                return Err(PunchError::Unmapped {
                    start: start.0,
                    end: end.0,
                });
            }
        }
    }

    Ok(())
}
