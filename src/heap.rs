use log::{debug, warn};

use crate::{
    block::{header_for_payload, payload_for_header},
    config::Config,
    error::{Error, Result},
    freelist::Strategy,
    region::{Address, Region, RegionId},
    table::IndirectionTable,
    utils::{align, ALIGNMENT},
};

/// Where a raw allocation should be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// The currently active young region.
    Young,
    /// The tenured region.
    Old,
}

/// The allocator state: three regions, the placement strategy and the
/// indirection table.
///
/// ```text
/// +-----------+   +-----------+   +-----------------------+
/// | young[0]  |   | young[1]  |   |          old          |
/// | (active)  |   | (target)  |   |                       |
/// +-----------+   +-----------+   +-----------------------+
///       \______________/                     |
///     minor collection copies          major collection
///     live objects across and          compacts in place
///     promotes old survivors --------------> ^
/// ```
///
/// Raw allocations are plain blocks: the caller frees them explicitly and
/// their address is only valid until the next collection touches the region
/// they live in. Managed allocations go through the indirection table and
/// survive collections, see [`Heap::managed_allocate`].
///
/// Nothing here is thread safe, a `Heap` is neither `Send` nor `Sync`.
pub struct Heap {
    pub(crate) config: Config,
    pub(crate) young: [Region; 2],
    pub(crate) old: Region,
    /// Index into `young` of the region new objects are allocated in.
    pub(crate) active: usize,
    pub(crate) strategy: Strategy,
    pub(crate) table: IndirectionTable,
}

impl Heap {
    /// Maps the three regions and initializes the heap in managed mode with
    /// `config.strategy`.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let mut heap = Self {
            config,
            young: [
                Region::new(RegionId::Young0, config.region_size)?,
                Region::new(RegionId::Young1, config.region_size)?,
            ],
            old: Region::new(RegionId::Old, config.region_size)?,
            active: 0,
            strategy: config.strategy,
            table: IndirectionTable::new(config.table_capacity()),
        };
        heap.managed_init(config.strategy)?;

        Ok(heap)
    }

    /// Zeroes every region, leaves each one holding a single free block and
    /// switches to `strategy`. The indirection table is left untouched, so
    /// handles bound before this call now point into wiped memory; use
    /// [`Heap::managed_init`] to reset them too.
    pub fn init(&mut self, strategy: Strategy) -> Result<()> {
        for region in self.young.iter_mut() {
            region.reset()?;
        }
        self.old.reset()?;

        self.active = 0;
        self.strategy = strategy;

        debug!("heap initialized: {} bytes per region, {:?}", self.config.region_size, strategy);

        Ok(())
    }

    /// [`Heap::init`] plus emptying the indirection table.
    pub fn managed_init(&mut self, strategy: Strategy) -> Result<()> {
        self.init(strategy)?;
        self.table.clear();

        Ok(())
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// The young region allocations currently go to.
    #[inline]
    pub fn active_young(&self) -> RegionId {
        self.young[self.active].id()
    }

    pub fn region(&self, id: RegionId) -> &Region {
        match id {
            RegionId::Young0 => &self.young[0],
            RegionId::Young1 => &self.young[1],
            RegionId::Old => &self.old,
        }
    }

    pub(crate) fn region_mut(&mut self, id: RegionId) -> &mut Region {
        match id {
            RegionId::Young0 => &mut self.young[0],
            RegionId::Young1 => &mut self.young[1],
            RegionId::Old => &mut self.old,
        }
    }

    pub(crate) fn target(&self, generation: Generation) -> RegionId {
        match generation {
            Generation::Young => self.active_young(),
            Generation::Old => RegionId::Old,
        }
    }

    /// Allocates `size` bytes, rounded up to a multiple of 8, in the region
    /// `generation` refers to.
    ///
    /// Running out of space is not fatal: the caller gets
    /// [`Error::OutOfMemory`] and may collect and retry.
    pub fn allocate(&mut self, size: usize, generation: Generation) -> Result<Address> {
        let id = self.target(generation);
        let header = self.allocate_block(id, size)?;

        Ok(self.region(id).address_of(payload_for_header(header)))
    }

    /// Takes a block of at least `size` bytes from region `id` and returns
    /// its header offset.
    pub(crate) fn allocate_block(&mut self, id: RegionId, size: usize) -> Result<usize> {
        let strategy = self.strategy;
        let region = self.region_mut(id);

        let aligned = align(size, ALIGNMENT)
            .filter(|aligned| *aligned <= region.size())
            .ok_or(Error::OutOfMemory { size, region: id })?;

        match region.allocate(aligned, strategy) {
            Some(header) => {
                debug!("allocated {size} bytes in the {id} region at offset {header}");
                Ok(header)
            }
            None => {
                debug!("no suitable block for {size} bytes in the {id} region");
                Err(Error::OutOfMemory { size, region: id })
            }
        }
    }

    /// Finds the region and header offset behind a raw `address`: the old
    /// region is checked first, then the active young region. The address
    /// must be exactly the start of a block's payload.
    pub(crate) fn owner(&self, address: Address) -> Option<(RegionId, usize)> {
        [RegionId::Old, self.active_young()]
            .into_iter()
            .find_map(|id| {
                let region = self.region(id);
                let payload = region.offset_of(address)?;
                let (header, _) = region.block_at(payload)?;
                Some((id, header))
            })
    }

    /// Gives a raw allocation back to its region's free list.
    ///
    /// The block is put back in address order but never merged with free
    /// neighbours; fragmentation builds up until the next compaction.
    /// Addresses that do not belong to a live block are logged and refused
    /// without touching the heap.
    pub fn deallocate(&mut self, address: Address) -> Result<()> {
        let Some((id, header)) = self.owner(address) else {
            warn!("deallocate: {address} does not belong to any heap region");
            return Err(Error::InvalidPointer(address));
        };

        let region = self.region_mut(id);
        if region.header(header)?.is_free {
            warn!("deallocate: block at {address} in the {id} region is already free");
            return Err(Error::DoubleFree(address));
        }
        region.release(header)?;

        debug!("freed block at {address} in the {id} region");

        Ok(())
    }

    /// Payload of the raw allocation at `address`.
    pub fn payload(&self, address: Address) -> Option<&[u8]> {
        let (id, header) = self.owner(address)?;
        self.region(id).payload(header).ok()
    }

    pub fn payload_mut(&mut self, address: Address) -> Option<&mut [u8]> {
        let (id, header) = self.owner(address)?;
        self.region_mut(id).payload_mut(header).ok()
    }

    /// Header offset and region of the object a table slot points to. Table
    /// entries are trusted to name block starts, so this does not walk the
    /// region.
    pub(crate) fn locate(&self, address: Address) -> Option<(RegionId, usize)> {
        [RegionId::Old, self.active_young()]
            .into_iter()
            .find_map(|id| {
                let payload = self.region(id).offset_of(address)?;
                Some((id, header_for_payload(payload)?))
            })
    }

    /// Checks the layout and free list invariants of all three regions.
    pub fn validate(&self) -> Result<()> {
        for region in self.young.iter().chain([&self.old]) {
            region.validate()?;
        }

        Ok(())
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("config", &self.config)
            .field("active", &self.active_young())
            .field("strategy", &self.strategy)
            .field("managed", &self.table.len())
            .finish()
    }
}
