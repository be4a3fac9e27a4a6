use thiserror::Error;

use crate::{region::RegionId, table::Handle, Address};

/// Everything that can go wrong while allocating, freeing or collecting.
///
/// None of these conditions is fatal. Every operation that returns one of
/// them leaves the regions, their free lists and the indirection table in a
/// consistent state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// No free block in the target region can hold the request. The caller
    /// may collect and retry.
    #[error("no free block for {size} bytes in the {region} region")]
    OutOfMemory { size: usize, region: RegionId },

    /// Every slot of the indirection table has been handed out.
    #[error("indirection table exhausted ({capacity} slots)")]
    TableExhausted { capacity: usize },

    /// The address is not the payload of a block in the old or the active
    /// young region.
    #[error("address {0} does not belong to any live region")]
    InvalidPointer(Address),

    /// The block behind the address is already free.
    #[error("block at {0} is already free")]
    DoubleFree(Address),

    /// A minor collection completed but these objects could not be moved to
    /// the old region. They stay in the young generation.
    #[error("{} object(s) could not be promoted, old region exhausted", handles.len())]
    PromotionFailed { handles: Vec<Handle> },

    /// A block header points outside its region.
    #[error("corrupted block header at offset {offset} of the {region} region")]
    Corrupted { region: RegionId, offset: usize },

    /// The operating system refused to map a region.
    #[error("could not map {len} bytes for a heap region")]
    MapFailed { len: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
