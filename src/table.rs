use std::fmt;

use crate::{
    error::{Error, Result},
    region::Address,
};

/// Names a managed object.
///
/// A handle is the index of a slot in the [`IndirectionTable`]; the slot in
/// turn holds wherever the object currently lives. Collectors move objects
/// and rewrite the slot, the handle stays the same. Slots are never reissued,
/// so a handle to a freed object resolves to nothing forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(usize);

impl Handle {
    #[inline]
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Fixed capacity table of managed slots.
///
/// ```text
///  Handle(1)
///     |
///     v
/// +------+------+------+------+-----
/// | addr | addr | None | addr | ...      <- slots, handed out left to right
/// +------+--|---+------+------+-----
///           |
///           v
///    +--------+---------+
///    | Header | Payload |                <- header.managed_index == 1
///    +--------+---------+
/// ```
///
/// The number of slots handed out only ever grows: freeing an object empties
/// its slot but the slot is not recycled. Long running programs will
/// therefore run out of slots even if they free everything they allocate.
#[derive(Debug)]
pub(crate) struct IndirectionTable {
    slots: Vec<Option<Address>>,
    capacity: usize,
}

impl IndirectionTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots handed out so far, bound or not.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    /// Empties every slot and starts handing out indices from zero again.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Binds the next slot to `address`.
    pub fn bind(&mut self, address: Address) -> Result<Handle> {
        if self.is_full() {
            return Err(Error::TableExhausted { capacity: self.capacity });
        }

        self.slots.push(Some(address));

        Ok(Handle(self.slots.len() - 1))
    }

    /// Current address of the object in slot `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<Address> {
        self.slots.get(index).copied().flatten()
    }

    /// Repoints a bound slot. Returns `false`, leaving the table untouched,
    /// if the slot was never handed out or has been emptied.
    pub fn set(&mut self, index: usize, address: Address) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) if slot.is_some() => {
                *slot = Some(address);
                true
            }
            _ => false,
        }
    }

    /// Empties slot `index` and returns what it held.
    pub fn take(&mut self, index: usize) -> Option<Address> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    /// Bound slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, Address)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.map(|address| (Handle(index), address)))
    }
}
