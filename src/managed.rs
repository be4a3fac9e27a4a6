use log::{debug, warn};

use crate::{
    block::{payload_for_header, BlockHeader},
    error::{Error, Result},
    heap::Heap,
    region::{Address, RegionId},
    table::Handle,
};

impl Heap {
    /// Allocates `size` bytes in the active young region and binds them to a
    /// fresh indirection table slot.
    ///
    /// The returned handle stays valid across collections: whenever the
    /// object moves, the collector rewrites its slot. The table is checked
    /// before any memory is taken, so a full table never leaks a block.
    pub fn managed_allocate(&mut self, size: usize) -> Result<Handle> {
        if self.table.is_full() {
            warn!("managed_allocate: indirection table full ({} slots)", self.table.capacity());
            return Err(Error::TableExhausted { capacity: self.table.capacity() });
        }

        // Bound last, once the block carries the index of the next slot.
        let index = self.table.len();
        let id = self.active_young();
        let offset = self.allocate_block(id, size)?;
        let region = self.region_mut(id);

        let mut header = region.header(offset)?;
        header.managed_index = Some(index);
        region.set_header(offset, &header)?;

        let address = region.address_of(payload_for_header(offset));
        let handle = self.table.bind(address)?;

        debug!("managed object {handle} bound to {address}");

        Ok(handle)
    }

    /// Frees the object behind `handle` and empties its slot.
    ///
    /// Freeing a handle twice, or a handle that was never bound, does
    /// nothing. The slot index is not handed out again.
    pub fn managed_deallocate(&mut self, handle: Handle) {
        let Some(address) = self.table.take(handle.index()) else {
            return;
        };

        if let Err(error) = self.deallocate(address) {
            warn!("managed_deallocate: {handle} pointed to an unusable block: {error}");
        }
    }

    /// Current address of the object behind `handle`.
    #[inline]
    pub fn resolve(&self, handle: Handle) -> Option<Address> {
        self.table.get(handle.index())
    }

    /// Region the object behind `handle` currently lives in.
    pub fn region_of(&self, handle: Handle) -> Option<RegionId> {
        self.locate(self.resolve(handle)?).map(|(id, _)| id)
    }

    /// Header of the object behind `handle`.
    pub fn header(&self, handle: Handle) -> Option<BlockHeader> {
        let (id, header) = self.locate(self.resolve(handle)?)?;
        self.region(id).header(header).ok()
    }

    /// Payload of the object behind `handle`.
    pub fn get(&self, handle: Handle) -> Option<&[u8]> {
        let (id, header) = self.locate(self.resolve(handle)?)?;
        self.region(id).payload(header).ok()
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut [u8]> {
        let (id, header) = self.locate(self.resolve(handle)?)?;
        self.region_mut(id).payload_mut(header).ok()
    }

    /// Handles of every object that has not been freed, in slot order.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.table.iter().map(|(handle, _)| handle)
    }
}
