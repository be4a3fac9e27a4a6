use crate::block::{payload_for_header, BlockHeader, BLOCK_HEADER_SIZE};

/// Block placement policy used by every allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Take the first block, in address order, that can hold the request.
    #[default]
    FirstFit,
    /// Take the smallest block that can hold the request. Ties go to the
    /// lowest address.
    BestFit,
}

/// Singly linked list of the free blocks of one region.
///
/// The list does not own any storage: its links are the `next_free` fields
/// of the free block headers themselves, so the only state kept here is the
/// offset of the first free header. Every method therefore receives the
/// region's bytes.
///
/// ```text
///                 head
///                  |        next_free                 next_free
///                  |   +------------------+   +----------------------+
///                  v   |                  v   |                      v
/// +-------+-------+----|-+-------+-------+----|-+-------+-------+---------+
/// | Block | Block | Free | Block | Block | Free | Block | Block |  Free   |
/// +-------+-------+------+-------+-------+------+-------+-------+---------+
/// ```
///
/// The list is always sorted by offset. Deallocation inserts at the matching
/// position but never merges neighbours, so adjacent free blocks stay
/// separate until the region is compacted.
#[derive(Debug)]
pub(crate) struct FreeList {
    head: Option<usize>,
}

/// Block chosen by [`FreeList::find_free_block`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fit {
    /// Free block preceding the chosen one, `None` if it is the head.
    pub prev: Option<usize>,
    /// Header offset of the chosen block.
    pub offset: usize,
    pub header: BlockHeader,
}

/// Iterator over `(header offset, header)` of the free blocks.
pub struct FreeBlocks<'a> {
    memory: &'a [u8],
    current: Option<usize>,
    // A region can not hold more blocks than this, which bounds the walk
    // even if a link was overwritten.
    remaining: usize,
}

impl FreeList {
    /// Creates a new empty list.
    pub const fn new() -> Self {
        Self { head: None }
    }

    /// Offset of the first free block.
    #[inline]
    pub fn head(&self) -> Option<usize> {
        self.head
    }

    /// Forgets the current chain and starts a new one at `head`. The header at
    /// `head` must already be written with an empty `next_free`.
    pub fn reset(&mut self, head: Option<usize>) {
        self.head = head;
    }

    pub fn iter<'a>(&self, memory: &'a [u8]) -> FreeBlocks<'a> {
        FreeBlocks {
            memory,
            current: self.head,
            remaining: memory.len() / BLOCK_HEADER_SIZE,
        }
    }

    /// Returns the block where `size` bytes (already aligned) can be placed
    /// according to `strategy`, or `None` if no free block is large enough.
    pub fn find_free_block(&self, memory: &[u8], size: usize, strategy: Strategy) -> Option<Fit> {
        let mut best: Option<Fit> = None;
        let mut prev = None;

        for (offset, header) in self.iter(memory) {
            if header.size >= size {
                let candidate = Fit { prev, offset, header };

                match strategy {
                    Strategy::FirstFit => return Some(candidate),
                    Strategy::BestFit => {
                        if best.is_none_or(|best| header.size < best.header.size) {
                            best = Some(candidate);
                        }
                    }
                }
            }
            prev = Some(offset);
        }

        best
    }

    /// Carves `size` bytes out of `fit` and takes the block off the list.
    ///
    /// When the block is large enough to leave a header plus a non-empty
    /// payload behind, that tail becomes a new free block which takes the
    /// chosen block's place on the list. Otherwise the whole block is handed
    /// out. Returns the header of the now used block.
    pub fn take(&mut self, memory: &mut [u8], fit: Fit, size: usize) -> Option<BlockHeader> {
        let Fit { prev, offset, mut header } = fit;
        let slack = header.size.checked_sub(size)?;

        if slack > BLOCK_HEADER_SIZE {
            let tail_offset = payload_for_header(offset) + size;

            let mut tail = BlockHeader::free(slack - BLOCK_HEADER_SIZE);
            tail.next_free = header.next_free;
            tail.write(memory, tail_offset)?;

            header.size = size;
            header.next_free = Some(tail_offset);
        }

        match prev {
            Some(prev) => {
                let mut prev_header = BlockHeader::read(memory, prev)?;
                prev_header.next_free = header.next_free;
                prev_header.write(memory, prev)?;
            }
            None => self.head = header.next_free,
        }

        // A recycled block may still carry the bookkeeping of its last owner.
        header.is_free = false;
        header.managed_index = None;
        header.survival_count = 0;
        header.next_free = None;
        header.write(memory, offset)?;

        Some(header)
    }

    /// Marks the block at `offset` as free and links it into the list,
    /// keeping the list sorted by address.
    pub fn insert_free_block(&mut self, memory: &mut [u8], offset: usize) -> Option<()> {
        let mut prev = None;
        let mut current = self.head;
        let mut remaining = memory.len() / BLOCK_HEADER_SIZE;

        while let Some(free) = current {
            if free >= offset || remaining == 0 {
                break;
            }

            prev = Some(free);
            current = BlockHeader::read(memory, free)?.next_free;
            remaining -= 1;
        }

        // The block is already on the list.
        if current == Some(offset) {
            return None;
        }

        let mut header = BlockHeader::read(memory, offset)?;
        header.is_free = true;
        header.next_free = current;
        header.write(memory, offset)?;

        match prev {
            Some(prev) => {
                let mut prev_header = BlockHeader::read(memory, prev)?;
                prev_header.next_free = Some(offset);
                prev_header.write(memory, prev)?;
            }
            None => self.head = Some(offset),
        }

        Some(())
    }
}

impl<'a> Iterator for FreeBlocks<'a> {
    type Item = (usize, BlockHeader);

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.current?;

        if self.remaining == 0 {
            self.current = None;
            return None;
        }
        self.remaining -= 1;

        let header = BlockHeader::read(self.memory, offset)?;
        self.current = header.next_free;

        Some((offset, header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lays out blocks of the given payload sizes back to back, links the
    /// free ones in address order and returns the list and header offsets.
    fn layout(memory: &mut [u8], blocks: &[(usize, bool)]) -> (FreeList, Vec<usize>) {
        let mut offsets = Vec::new();
        let mut offset = 0;

        for (size, _) in blocks {
            offsets.push(offset);
            offset += BLOCK_HEADER_SIZE + size;
        }
        assert_eq!(memory.len(), offset);

        let free: Vec<usize> = blocks
            .iter()
            .zip(&offsets)
            .filter(|((_, is_free), _)| *is_free)
            .map(|(_, offset)| *offset)
            .collect();

        for ((size, is_free), offset) in blocks.iter().zip(&offsets) {
            let mut header = BlockHeader::free(*size);
            header.is_free = *is_free;
            if *is_free {
                header.next_free = free.iter().copied().find(|next| next > offset);
            }
            header.write(memory, *offset).unwrap();
        }

        let mut list = FreeList::new();
        list.reset(free.first().copied());

        (list, offsets)
    }

    #[test]
    fn new_list_is_empty() {
        let list = FreeList::new();

        assert_eq!(None, list.head());
        assert!(list.iter(&[0u8; 64]).next().is_none());
    }

    #[test]
    fn first_fit_takes_lowest_address() {
        let mut memory = vec![0u8; 4 * BLOCK_HEADER_SIZE + 64 + 8 + 16 + 40];
        let (list, offsets) = layout(&mut memory, &[(64, true), (8, false), (16, true), (40, true)]);

        let fit = list.find_free_block(&memory, 16, Strategy::FirstFit).unwrap();

        assert_eq!(offsets[0], fit.offset);
        assert_eq!(None, fit.prev);
    }

    #[test]
    fn best_fit_takes_smallest_block() {
        let mut memory = vec![0u8; 4 * BLOCK_HEADER_SIZE + 64 + 8 + 16 + 40];
        let (list, offsets) = layout(&mut memory, &[(64, true), (8, false), (16, true), (40, true)]);

        let fit = list.find_free_block(&memory, 16, Strategy::BestFit).unwrap();

        assert_eq!(offsets[2], fit.offset);
        assert_eq!(Some(offsets[0]), fit.prev);
    }

    #[test]
    fn best_fit_ties_go_to_lowest_address() {
        let mut memory = vec![0u8; 3 * BLOCK_HEADER_SIZE + 32 + 8 + 32];
        let (list, offsets) = layout(&mut memory, &[(32, true), (8, false), (32, true)]);

        let fit = list.find_free_block(&memory, 8, Strategy::BestFit).unwrap();

        assert_eq!(offsets[0], fit.offset);
    }

    #[test]
    fn no_fit_when_every_block_is_too_small() {
        let mut memory = vec![0u8; 2 * BLOCK_HEADER_SIZE + 16 + 8];
        let (list, _) = layout(&mut memory, &[(16, true), (8, false)]);

        assert!(list.find_free_block(&memory, 24, Strategy::FirstFit).is_none());
        assert!(list.find_free_block(&memory, 24, Strategy::BestFit).is_none());
    }

    #[test]
    fn take_splits_large_blocks() {
        let mut memory = vec![0u8; BLOCK_HEADER_SIZE + 128];
        let (mut list, _) = layout(&mut memory, &[(128, true)]);

        let fit = list.find_free_block(&memory, 16, Strategy::FirstFit).unwrap();
        let used = list.take(&mut memory, fit, 16).unwrap();

        assert!(!used.is_free);
        assert_eq!(16, used.size);

        let tail = BLOCK_HEADER_SIZE + 16;
        assert_eq!(Some(tail), list.head());

        let free: Vec<_> = list.iter(&memory).collect();
        assert_eq!(1, free.len());
        assert_eq!(128 - 16 - BLOCK_HEADER_SIZE, free[0].1.size);
    }

    #[test]
    fn take_consumes_tight_blocks_whole() {
        // 16 bytes left over is not enough for a header plus a payload.
        let mut memory = vec![0u8; 2 * BLOCK_HEADER_SIZE + 40 + 64];
        let (mut list, offsets) = layout(&mut memory, &[(40, true), (64, true)]);

        let fit = list.find_free_block(&memory, 24, Strategy::FirstFit).unwrap();
        let used = list.take(&mut memory, fit, 24).unwrap();

        assert_eq!(40, used.size);
        assert_eq!(Some(offsets[1]), list.head());
    }

    #[test]
    fn take_unlinks_from_the_middle() {
        let mut memory = vec![0u8; 3 * BLOCK_HEADER_SIZE + 16 + 16 + 16];
        let (mut list, offsets) = layout(&mut memory, &[(16, true), (16, true), (16, true)]);

        let fit = Fit {
            prev: Some(offsets[0]),
            offset: offsets[1],
            header: BlockHeader::read(&memory, offsets[1]).unwrap(),
        };
        list.take(&mut memory, fit, 16).unwrap();

        let free: Vec<usize> = list.iter(&memory).map(|(offset, _)| offset).collect();
        assert_eq!(vec![offsets[0], offsets[2]], free);
    }

    #[test]
    fn insert_keeps_address_order() {
        let mut memory = vec![0u8; 4 * BLOCK_HEADER_SIZE + 4 * 16];
        let (mut list, offsets) =
            layout(&mut memory, &[(16, false), (16, true), (16, false), (16, false)]);

        list.insert_free_block(&mut memory, offsets[3]).unwrap();
        list.insert_free_block(&mut memory, offsets[0]).unwrap();
        list.insert_free_block(&mut memory, offsets[2]).unwrap();

        let free: Vec<usize> = list.iter(&memory).map(|(offset, _)| offset).collect();
        assert_eq!(offsets, free);
        assert!(list.iter(&memory).all(|(_, header)| header.is_free));
    }

    #[test]
    fn insert_twice_is_refused() {
        let mut memory = vec![0u8; 2 * BLOCK_HEADER_SIZE + 32];
        let (mut list, offsets) = layout(&mut memory, &[(16, true), (16, false)]);

        assert_eq!(None, list.insert_free_block(&mut memory, offsets[0]));
        assert_eq!(1, list.iter(&memory).count());
    }
}
