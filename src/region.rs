use std::fmt;

use crate::{
    block::{header_for_payload, payload_for_header, BlockHeader, BLOCK_HEADER_SIZE},
    error::{Error, Result},
    freelist::{FreeBlocks, FreeList, Strategy},
    kernel::Mapping,
};

/// Identifies one of the three regions of the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionId {
    Young0,
    Young1,
    Old,
}

impl RegionId {
    /// The other young region. The old region has no partner.
    pub(crate) fn sibling(self) -> Self {
        match self {
            RegionId::Young0 => RegionId::Young1,
            RegionId::Young1 => RegionId::Young0,
            RegionId::Old => RegionId::Old,
        }
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionId::Young0 => write!(f, "young[0]"),
            RegionId::Young1 => write!(f, "young[1]"),
            RegionId::Old => write!(f, "old"),
        }
    }
}

/// Opaque address of the first payload byte of a block.
///
/// It can only be turned back into bytes through the heap that handed it
/// out, which checks it against the live regions first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(usize);

impl Address {
    #[inline]
    pub(crate) const fn new(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// One of the fixed size buffers the heap is made of.
///
/// A region is a run of blocks laid out back to back, each one a
/// [`BlockHeader`] followed by its payload. Walking the headers from offset
/// zero must land exactly on the end of the region:
///
/// ```text
/// 0                                                               size
/// +--------+---------+--------+------+--------+---------------------+
/// | Header | Payload | Header | Pay. | Header |       Payload       |
/// +--------+---------+--------+------+--------+---------------------+
///      used               free              free (tail)
/// ```
///
/// Free blocks are additionally chained through their headers, see
/// [`FreeList`]. The region never grows: when it is full, allocation fails
/// until a collection or a deallocation makes room.
pub struct Region {
    id: RegionId,
    memory: Mapping,
    free_list: FreeList,
}

/// Iterator over `(header offset, header)` of every block of a region.
pub struct Blocks<'a> {
    region: &'a Region,
    offset: usize,
}

impl Region {
    /// Maps a region of `size` bytes holding a single free block.
    pub(crate) fn new(id: RegionId, size: usize) -> Result<Self> {
        let mut region = Self {
            id,
            memory: Mapping::new(size)?,
            free_list: FreeList::new(),
        };
        region.reset()?;

        Ok(region)
    }

    #[inline]
    pub fn id(&self) -> RegionId {
        self.id
    }

    /// Capacity in bytes, headers included.
    #[inline]
    pub fn size(&self) -> usize {
        self.memory.len()
    }

    #[inline]
    pub(crate) fn memory(&self) -> &[u8] {
        self.memory.as_slice()
    }

    #[inline]
    pub(crate) fn memory_mut(&mut self) -> &mut [u8] {
        self.memory.as_mut_slice()
    }

    /// Zeroes the region and leaves one free block spanning all of it.
    pub(crate) fn reset(&mut self) -> Result<()> {
        self.memory_mut().fill(0);
        self.truncate(0)
    }

    /// Turns everything from `offset` to the end into one free block which
    /// becomes the only entry of the free list. When `offset` is exactly the
    /// end of the region, the free list is left empty.
    pub(crate) fn truncate(&mut self, offset: usize) -> Result<()> {
        if offset == self.size() {
            self.free_list.reset(None);
            return Ok(());
        }

        let size = self
            .size()
            .checked_sub(offset)
            .and_then(|rest| rest.checked_sub(BLOCK_HEADER_SIZE))
            .ok_or(self.corrupted(offset))?;

        self.set_header(offset, &BlockHeader::free(size))?;
        self.free_list.reset(Some(offset));

        Ok(())
    }

    /// Address of the payload at `offset`.
    #[inline]
    pub fn address_of(&self, payload: usize) -> Address {
        Address::new(self.memory.base() + payload)
    }

    /// Payload offset of `address` if it falls inside this region.
    ///
    /// The end of the region is accepted too: a zero sized block at the tail
    /// has its payload right there.
    pub fn offset_of(&self, address: Address) -> Option<usize> {
        address
            .0
            .checked_sub(self.memory.base())
            .filter(|offset| *offset <= self.size())
    }

    /// Whether `address` points to a byte of this region.
    pub fn contains(&self, address: Address) -> bool {
        self.offset_of(address).is_some_and(|offset| offset < self.size())
    }

    pub(crate) fn corrupted(&self, offset: usize) -> Error {
        Error::Corrupted { region: self.id, offset }
    }

    /// Reads the header at `offset`, checking that the block ends inside the
    /// region.
    pub fn header(&self, offset: usize) -> Result<BlockHeader> {
        BlockHeader::read(self.memory(), offset)
            .filter(|header| {
                offset
                    .checked_add(header.span())
                    .is_some_and(|end| end <= self.size())
            })
            .ok_or(self.corrupted(offset))
    }

    pub(crate) fn set_header(&mut self, offset: usize, header: &BlockHeader) -> Result<()> {
        let error = self.corrupted(offset);
        header.write(self.memory_mut(), offset).ok_or(error)
    }

    /// Header offset of the block whose payload starts exactly at `payload`.
    ///
    /// Unlike [`header_for_payload`] this walks the region, so it only
    /// succeeds for real block boundaries.
    pub fn block_at(&self, payload: usize) -> Option<(usize, BlockHeader)> {
        let header = header_for_payload(payload)?;

        self.blocks()
            .take_while(|(offset, _)| *offset <= header)
            .find(|(offset, _)| *offset == header)
    }

    /// Payload bytes of the block whose header is at `header`.
    pub(crate) fn payload(&self, header: usize) -> Result<&[u8]> {
        let size = self.header(header)?.size;
        let start = payload_for_header(header);

        Ok(&self.memory()[start..start + size])
    }

    pub(crate) fn payload_mut(&mut self, header: usize) -> Result<&mut [u8]> {
        let size = self.header(header)?.size;
        let start = payload_for_header(header);

        Ok(&mut self.memory_mut()[start..start + size])
    }

    /// Takes `size` bytes (already aligned) from the free list and returns
    /// the header offset of the block handed out, or `None` if no free block
    /// is large enough.
    pub(crate) fn allocate(&mut self, size: usize, strategy: Strategy) -> Option<usize> {
        let memory = self.memory.as_mut_slice();
        let fit = self.free_list.find_free_block(memory, size, strategy)?;

        self.free_list.take(memory, fit, size).map(|_| fit.offset)
    }

    /// Gives the block at `header` back to the free list.
    pub(crate) fn release(&mut self, header: usize) -> Result<()> {
        let memory = self.memory.as_mut_slice();

        self.free_list
            .insert_free_block(memory, header)
            .ok_or(Error::Corrupted { region: self.id, offset: header })
    }

    /// Offset of the first free block.
    pub fn first_free(&self) -> Option<usize> {
        self.free_list.head()
    }

    /// Walks the region block by block.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks { region: self, offset: 0 }
    }

    /// Walks the free list.
    pub fn free_blocks(&self) -> FreeBlocks<'_> {
        self.free_list.iter(self.memory())
    }

    /// Payload bytes currently on the free list.
    pub fn free_bytes(&self) -> usize {
        self.free_blocks().map(|(_, header)| header.size).sum()
    }

    /// Checks the layout invariants: the block walk covers the region exactly
    /// and the free list is strictly ascending and holds exactly the free
    /// blocks.
    pub fn validate(&self) -> Result<()> {
        let mut end = 0;
        let mut free = Vec::new();

        for (offset, header) in self.blocks() {
            if header.is_free {
                free.push(offset);
            }
            end = offset + header.span();
        }

        if end != self.size() {
            return Err(self.corrupted(end));
        }

        let mut listed = Vec::with_capacity(free.len());
        for (offset, header) in self.free_blocks() {
            let ascending = listed.last().is_none_or(|last| *last < offset);
            if !header.is_free || !ascending {
                return Err(self.corrupted(offset));
            }
            listed.push(offset);
        }

        if listed != free {
            let offset = listed
                .iter()
                .zip(&free)
                .find(|(listed, free)| listed != free)
                .map_or(0, |(listed, _)| *listed);
            return Err(self.corrupted(offset));
        }

        Ok(())
    }
}

impl<'a> Iterator for Blocks<'a> {
    type Item = (usize, BlockHeader);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.region.size() {
            return None;
        }

        // A broken header stops the walk; `validate` reports it.
        match self.region.header(self.offset) {
            Ok(header) => {
                let offset = self.offset;
                self.offset += header.span();
                Some((offset, header))
            }
            Err(_) => {
                self.offset = self.region.size();
                None
            }
        }
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("id", &self.id)
            .field("size", &self.size())
            .field("first_free", &self.first_free())
            .finish()
    }
}
