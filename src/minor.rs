use log::{info, trace, warn};

use crate::{
    block::{header_for_payload, payload_for_header, BLOCK_HEADER_SIZE},
    error::{Error, Result},
    heap::Heap,
    region::Region,
    table::Handle,
};

/// What a minor collection did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MinorStats {
    /// Objects copied into the other young region.
    pub copied: usize,
    /// Objects moved to the old region.
    pub promoted: usize,
    /// Bytes (headers included) written into the other young region.
    pub bytes_copied: usize,
}

/// Splits the young regions into (active, target).
fn young_pair(young: &mut [Region; 2], active: usize) -> (&mut Region, &mut Region) {
    let [first, second] = young;
    if active == 0 { (first, second) } else { (second, first) }
}

impl Heap {
    /// Runs a copying collection over the young generation.
    ///
    /// Every bound slot of the indirection table is a root and nothing else
    /// is. For each managed object living in the active young region, in
    /// slot order:
    ///
    /// 1. Its survival count goes up by one.
    /// 2. Once the count reaches the promotion threshold the object is moved
    ///    to the old region, allocated there with the current strategy.
    /// 3. Otherwise it is copied, header and payload, to the next free spot
    ///    of the other young region.
    ///
    /// ```text
    ///      active                         target
    /// +---+---+---+---+---+        +---+---+-----------------+
    /// | A | x | B | x | x |  --->  | A | B |   free (tail)   |
    /// +---+---+---+---+---+        +---+---+-----------------+
    /// ```
    ///
    /// Freed objects and raw young allocations are never copied, which is
    /// all it takes to reclaim them. The rest of the target becomes a single
    /// free block and the target becomes the active region.
    ///
    /// When the old region has no room for a promoted object, the object is
    /// kept in the young generation instead and the cycle runs to completion.
    /// The caller then gets [`Error::PromotionFailed`] with the affected
    /// handles; the heap is consistent either way.
    pub fn minor_collect(&mut self) -> Result<MinorStats> {
        let from_id = self.active_young();
        let to_id = from_id.sibling();
        let threshold = self.config.promotion_threshold;
        let strategy = self.strategy;

        info!("minor collection: moving live objects from {from_id} to {to_id}");

        let (from, to) = young_pair(&mut self.young, self.active);
        let mut stats = MinorStats::default();
        let mut failed = Vec::new();
        let mut cursor = 0;

        for index in 0..self.table.len() {
            let Some(address) = self.table.get(index) else {
                continue;
            };
            // Tenured objects are left alone.
            let Some(payload) = from.offset_of(address) else {
                continue;
            };

            let offset = header_for_payload(payload).ok_or_else(|| from.corrupted(payload))?;
            let mut header = from.header(offset)?;
            header.survival_count += 1;
            from.set_header(offset, &header)?;

            if header.survival_count >= threshold {
                match self.old.allocate(header.size, strategy) {
                    Some(promoted) => {
                        // The block taken may be larger than the object; its
                        // leftover bytes are cleared.
                        let source = from.payload(offset)?;
                        let target = self.old.payload_mut(promoted)?;
                        let (copied, rest) = target.split_at_mut(source.len());
                        copied.copy_from_slice(source);
                        rest.fill(0);

                        let mut tenured = self.old.header(promoted)?;
                        tenured.managed_index = Some(index);
                        tenured.survival_count = header.survival_count;
                        tenured.next_free = None;
                        self.old.set_header(promoted, &tenured)?;

                        let address = self.old.address_of(payload_for_header(promoted));
                        self.table.set(index, address);
                        stats.promoted += 1;

                        trace!("promoted #{index} to {address}");
                        continue;
                    }
                    None => {
                        warn!("could not promote #{index}: no room for {} bytes in the old region", header.size);
                        failed.push(Handle::new(index));
                    }
                }
            }

            let span = BLOCK_HEADER_SIZE + header.size;
            let source = &from.memory()[offset..offset + span];
            to.memory_mut()
                .get_mut(cursor..cursor + span)
                .ok_or(Error::Corrupted { region: to_id, offset: cursor })?
                .copy_from_slice(source);

            header.next_free = None;
            to.set_header(cursor, &header)?;

            let address = to.address_of(payload_for_header(cursor));
            self.table.set(index, address);
            stats.copied += 1;
            stats.bytes_copied += span;
            cursor += span;

            trace!("copied #{index} to {address}");
        }

        to.truncate(cursor)?;
        self.active = 1 - self.active;

        info!(
            "minor collection done: {} copied ({} bytes), {} promoted, {} kept back",
            stats.copied,
            stats.bytes_copied,
            stats.promoted,
            failed.len()
        );

        if failed.is_empty() {
            Ok(stats)
        } else {
            Err(Error::PromotionFailed { handles: failed })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, heap::Generation, region::RegionId};

    fn heap() -> Heap {
        Heap::new(Config::default()).unwrap()
    }

    #[test]
    fn survivors_move_to_the_other_young_region() {
        let mut heap = heap();

        let a = heap.managed_allocate(16).unwrap();
        let b = heap.managed_allocate(16).unwrap();
        let c = heap.managed_allocate(16).unwrap();
        heap.get_mut(a).unwrap().fill(0xAA);
        heap.get_mut(c).unwrap().fill(0xCC);
        heap.managed_deallocate(b);

        let stats = heap.minor_collect().unwrap();

        assert_eq!(RegionId::Young1, heap.active_young());
        assert_eq!(2, stats.copied);
        assert_eq!(0, stats.promoted);
        assert_eq!(2 * (BLOCK_HEADER_SIZE + 16), stats.bytes_copied);

        // Compacted: `c` now sits right after `a`.
        let young = heap.region(RegionId::Young1);
        assert_eq!(Some(young.address_of(BLOCK_HEADER_SIZE)), heap.resolve(a));
        assert_eq!(
            Some(young.address_of(2 * BLOCK_HEADER_SIZE + 16)),
            heap.resolve(c)
        );
        assert!(heap.get(a).unwrap().iter().all(|byte| *byte == 0xAA));
        assert!(heap.get(c).unwrap().iter().all(|byte| *byte == 0xCC));
        assert_eq!(1, heap.header(c).unwrap().survival_count);
        heap.validate().unwrap();
    }

    #[test]
    fn target_tail_becomes_one_free_block() {
        let mut heap = heap();

        heap.managed_allocate(16).unwrap();
        heap.minor_collect().unwrap();

        let young = heap.region(RegionId::Young1);
        let free: Vec<_> = young.free_blocks().collect();
        assert_eq!(1, free.len());
        assert_eq!(BLOCK_HEADER_SIZE + 16, free[0].0);
        assert_eq!(1024 - 2 * BLOCK_HEADER_SIZE - 16, free[0].1.size);
    }

    #[test]
    fn raw_young_allocations_are_reclaimed() {
        let mut heap = heap();

        heap.allocate(64, Generation::Young).unwrap();
        let stats = heap.minor_collect().unwrap();

        assert_eq!(MinorStats::default(), stats);
        assert_eq!(1, heap.region(heap.active_young()).blocks().count());
    }

    #[test]
    fn objects_are_promoted_on_the_third_cycle() {
        let mut heap = heap();

        let a = heap.managed_allocate(24).unwrap();
        heap.get_mut(a).unwrap().copy_from_slice(b"twenty-four bytes long!!");

        heap.minor_collect().unwrap();
        heap.minor_collect().unwrap();
        assert_eq!(Some(heap.active_young()), heap.region_of(a));
        assert_eq!(2, heap.header(a).unwrap().survival_count);

        let stats = heap.minor_collect().unwrap();
        assert_eq!(1, stats.promoted);
        assert_eq!(Some(RegionId::Old), heap.region_of(a));
        assert_eq!(Some(0), heap.header(a).unwrap().managed_index);
        assert_eq!(b"twenty-four bytes long!!", heap.get(a).unwrap());
        heap.validate().unwrap();
    }

    #[test]
    fn tenured_objects_are_not_copied_again() {
        let mut heap = heap();

        let a = heap.managed_allocate(8).unwrap();
        for _ in 0..3 {
            heap.minor_collect().unwrap();
        }
        let tenured = heap.resolve(a);

        let stats = heap.minor_collect().unwrap();

        assert_eq!(MinorStats::default(), stats);
        assert_eq!(tenured, heap.resolve(a));
    }

    #[test]
    fn failed_promotion_keeps_the_object_young() {
        let mut heap = heap();

        // Leave no room in the old region.
        let filler = heap.allocate(1024 - BLOCK_HEADER_SIZE, Generation::Old).unwrap();

        let a = heap.managed_allocate(16).unwrap();
        heap.get_mut(a).unwrap().fill(7);
        heap.minor_collect().unwrap();
        heap.minor_collect().unwrap();

        assert_eq!(
            Err(Error::PromotionFailed { handles: vec![a] }),
            heap.minor_collect()
        );
        assert_eq!(Some(heap.active_young()), heap.region_of(a));
        assert!(heap.get(a).unwrap().iter().all(|byte| *byte == 7));
        heap.validate().unwrap();

        // Once there is room the next cycle promotes it.
        heap.deallocate(filler).unwrap();
        assert_eq!(1, heap.minor_collect().unwrap().promoted);
        assert_eq!(Some(RegionId::Old), heap.region_of(a));
    }

    #[test]
    fn promotion_into_a_larger_hole_clears_the_leftover() {
        let mut heap = heap();

        // A 16 byte hole full of stale bytes at the start of the old region.
        let stale = heap.allocate(16, Generation::Old).unwrap();
        heap.payload_mut(stale).unwrap().fill(0xEE);
        heap.allocate(8, Generation::Old).unwrap();
        heap.deallocate(stale).unwrap();

        let a = heap.managed_allocate(8).unwrap();
        heap.get_mut(a).unwrap().fill(0xAA);
        for _ in 0..3 {
            heap.minor_collect().unwrap();
        }

        // Too small to split, so the whole hole is handed out.
        assert_eq!(Some(stale), heap.resolve(a));
        assert_eq!(&[0xAAu8; 8], &heap.get(a).unwrap()[..8]);
        assert_eq!(&[0u8; 8], &heap.get(a).unwrap()[8..]);
        assert_eq!(16, heap.header(a).unwrap().size);
        heap.validate().unwrap();
    }

    #[test]
    fn back_to_back_collections_keep_the_same_objects() {
        let mut heap = heap();

        let handles: Vec<_> = (0..4).map(|_| heap.managed_allocate(8).unwrap()).collect();
        heap.managed_deallocate(handles[1]);

        let first = heap.minor_collect().unwrap();
        let second = heap.minor_collect().unwrap();

        assert_eq!(first, second);
        assert_eq!(None, heap.resolve(handles[1]));
        assert_eq!(3, heap.handles().count());
        heap.validate().unwrap();
    }
}
