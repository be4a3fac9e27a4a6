use crate::utils::is_aligned;

/// Size in bytes of the header that precedes every block. It is a multiple
/// of [`crate::utils::ALIGNMENT`] so payloads stay aligned.
pub const BLOCK_HEADER_SIZE: usize = 24;

/// Marker stored in the `managed_index` field of unmanaged blocks.
const UNMANAGED: u32 = u32::MAX;

/// Marker stored in the `next_free` field of the last free block.
const NO_LINK: u64 = u64::MAX;

/// This is the structure of a block. The fields below are its metadata,
/// the payload is placed right after them.
///
/// ```text
/// +---------------------+ <------+
/// |   is_free    (4b)   |        |
/// +---------------------+        |
/// |   size       (4b)   |        |
/// +---------------------+        |
/// | managed_index (4b)  |        | -> Header (24 bytes)
/// +---------------------+        |
/// | survival_count (4b) |        |
/// +---------------------+        |
/// |   next_free  (8b)   |        |
/// +---------------------+ <------+
/// |       Payload       |        |
/// |         ...         |        | -> `size` bytes, multiple of 8
/// |         ...         |        |
/// +---------------------+ <------+
/// ```
///
/// Headers live inside the region's byte buffer, so this struct is only a
/// decoded copy: changes must be written back with [`BlockHeader::write`].
/// Every field is stored little-endian. `next_free` is the offset of the next
/// free header inside the same region, never a machine pointer, which keeps a
/// header meaningful after the region's bytes are copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Flag to tell whether the block is free or not.
    pub is_free: bool,
    /// Payload bytes following the header.
    pub size: usize,
    /// Slot of the indirection table that owns this block, if managed.
    pub managed_index: Option<usize>,
    /// Number of minor collections the block has survived.
    pub survival_count: u32,
    /// Next block on the free list. Meaningless while the block is used.
    pub next_free: Option<usize>,
}

impl BlockHeader {
    /// A fresh free block of `size` payload bytes, not linked to anything.
    pub(crate) fn free(size: usize) -> Self {
        Self {
            is_free: true,
            size,
            managed_index: None,
            survival_count: 0,
            next_free: None,
        }
    }

    /// Bytes covered by the block, header included.
    #[inline]
    pub fn span(&self) -> usize {
        BLOCK_HEADER_SIZE + self.size
    }

    /// Decodes the header stored at `offset`. Returns `None` if the header
    /// does not fit inside `memory` or `offset` is misaligned.
    pub(crate) fn read(memory: &[u8], offset: usize) -> Option<Self> {
        if !is_aligned(offset) {
            return None;
        }

        let raw = memory.get(offset..offset.checked_add(BLOCK_HEADER_SIZE)?)?;
        let word = |at: usize| u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);

        let mut link = [0u8; 8];
        link.copy_from_slice(&raw[16..24]);

        let managed = word(8);
        let next = u64::from_le_bytes(link);

        Some(Self {
            is_free: word(0) != 0,
            size: word(4) as usize,
            managed_index: (managed != UNMANAGED).then_some(managed as usize),
            survival_count: word(12),
            next_free: if next == NO_LINK { None } else { usize::try_from(next).ok() },
        })
    }

    /// Encodes the header at `offset`. Returns `None` without touching
    /// `memory` if the header would not fit or a field overflows its width.
    pub(crate) fn write(&self, memory: &mut [u8], offset: usize) -> Option<()> {
        if !is_aligned(offset) {
            return None;
        }

        let size = u32::try_from(self.size).ok()?;
        let managed = match self.managed_index {
            Some(index) => u32::try_from(index).ok().filter(|index| *index != UNMANAGED)?,
            None => UNMANAGED,
        };
        let next = match self.next_free {
            Some(link) => u64::try_from(link).ok().filter(|link| *link != NO_LINK)?,
            None => NO_LINK,
        };

        let raw = memory.get_mut(offset..offset.checked_add(BLOCK_HEADER_SIZE)?)?;
        raw[0..4].copy_from_slice(&u32::from(self.is_free).to_le_bytes());
        raw[4..8].copy_from_slice(&size.to_le_bytes());
        raw[8..12].copy_from_slice(&managed.to_le_bytes());
        raw[12..16].copy_from_slice(&self.survival_count.to_le_bytes());
        raw[16..24].copy_from_slice(&next.to_le_bytes());

        Some(())
    }
}

/// Offset of the payload that belongs to the header at `header`.
#[inline]
pub(crate) fn payload_for_header(header: usize) -> usize {
    header + BLOCK_HEADER_SIZE
}

/// Offset of the header that precedes the payload at `payload`, or `None` if
/// no header could be there.
#[inline]
pub(crate) fn header_for_payload(payload: usize) -> Option<usize> {
    payload.checked_sub(BLOCK_HEADER_SIZE).filter(|header| is_aligned(*header))
}
