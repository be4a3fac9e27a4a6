//! A fixed capacity heap with a generational garbage collector on top.
//!
//! The heap is made of three equally sized regions: two young regions that
//! take turns as the allocation and the copy target, and an old region for
//! objects that survived a few collections.
//!
//! Memory can be used in two ways:
//!
//! - **Raw**: [`Heap::allocate`] and [`Heap::deallocate`] behave like a
//!   classic free-list allocator with first-fit or best-fit placement.
//! - **Managed**: [`Heap::managed_allocate`] returns a [`Handle`] that goes
//!   through an indirection table. The collectors may move the object and
//!   only ever update the table, so the handle stays valid.
//!
//! Collections only happen when asked for. [`Heap::minor_collect`] copies
//! the live managed objects out of the active young region and promotes the
//! ones that survived long enough; [`Heap::major_collect`] compacts the old
//! region in place.
//!
//! ```
//! use genalloc::{Config, Heap};
//!
//! let mut heap = Heap::new(Config::default()).unwrap();
//!
//! let handle = heap.managed_allocate(16).unwrap();
//! heap.get_mut(handle).unwrap().copy_from_slice(b"survives moving!");
//!
//! heap.minor_collect().unwrap();
//!
//! assert_eq!(b"survives moving!", heap.get(handle).unwrap());
//! ```

mod block;
mod config;
mod dump;
mod error;
mod freelist;
mod heap;
mod kernel;
mod major;
mod managed;
mod minor;
mod region;
mod table;
mod utils;

pub use block::{BlockHeader, BLOCK_HEADER_SIZE};
pub use config::{Config, HEAP_SIZE, PROMOTION_THRESHOLD};
pub use dump::MemoryDump;
pub use error::{Error, Result};
pub use freelist::{FreeBlocks, Strategy};
pub use heap::{Generation, Heap};
pub use major::MajorStats;
pub use minor::MinorStats;
pub use region::{Address, Blocks, Region, RegionId};
pub use table::Handle;
