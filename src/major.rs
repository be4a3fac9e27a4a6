use log::{debug, info, trace};

use crate::{block::payload_for_header, error::Result, heap::Heap};

/// What a major collection did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MajorStats {
    /// Used blocks slid towards the start of the region.
    pub moved: usize,
    /// Free blocks absorbed into the trailing free block.
    pub merged: usize,
    /// Payload bytes of the trailing free block once compaction is done.
    pub free_tail: usize,
}

impl Heap {
    /// Compacts the old region in place.
    ///
    /// The walk starts at the first free block with a write cursor on it.
    /// Free blocks are swallowed, used blocks are slid down to the cursor and
    /// the cursor moves past them:
    ///
    /// ```text
    /// before  +------+----+------+----+--------------+
    ///         | free | A  | free | B  |     free     |
    ///         +------+----+------+----+--------------+
    /// after   +----+----+----------------------------+
    ///         | A  | B  |            free            |
    ///         +----+----+----------------------------+
    /// ```
    ///
    /// Whatever lies past the cursor at the end becomes the only free block of
    /// the region. Managed objects get their slot repointed; raw allocations
    /// in the old region are moved too, so their addresses go stale.
    ///
    /// With an empty free list there is nothing to compact and the region is
    /// left alone.
    pub fn major_collect(&mut self) -> Result<MajorStats> {
        let mut stats = MajorStats::default();

        let Some(first_free) = self.old.first_free() else {
            debug!("major collection: old region has no free block, nothing to do");
            return Ok(stats);
        };

        info!("major collection: compacting old region from offset {first_free}");

        let old = &mut self.old;
        let mut write = first_free;
        let mut scan = first_free;

        while scan < old.size() {
            let header = old.header(scan)?;
            let span = header.span();

            if header.is_free {
                stats.merged += 1;
                scan += span;
                continue;
            }

            if scan != write {
                old.memory_mut().copy_within(scan..scan + span, write);

                let mut moved = header;
                moved.next_free = None;
                old.set_header(write, &moved)?;

                let address = old.address_of(payload_for_header(write));
                if let Some(index) = header.managed_index {
                    self.table.set(index, address);
                }
                stats.moved += 1;

                trace!("slid block from offset {scan} to {write}");
            }

            write += span;
            scan += span;
        }

        old.truncate(write)?;
        stats.free_tail = old.free_bytes();

        info!(
            "major collection done: {} moved, {} free blocks merged, {} bytes free at the end",
            stats.moved, stats.merged, stats.free_tail
        );

        Ok(stats)
    }
}
