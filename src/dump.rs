//! Human readable snapshot of the heap, for debugging.

use std::fmt;

use crate::{heap::Heap, region::Region, utils::ALIGNMENT};

/// Borrowed view of a [`Heap`] that renders the active young region, the old
/// region, their free lists and the bound indirection table slots.
///
/// Each region is also drawn as a map with one character per 8 bytes:
/// consecutive used blocks are lettered `A`, `B`, `C`... and free blocks `a`,
/// `b`, `c`..., so neighbouring free blocks that were never merged show up as
/// different letters.
pub struct MemoryDump<'a> {
    heap: &'a Heap,
}

impl Heap {
    pub fn dump(&self) -> MemoryDump<'_> {
        MemoryDump { heap: self }
    }
}

/// Letter `n` of the alphabet starting at `first`, wrapping after `z`.
fn marker(first: u8, n: usize) -> char {
    char::from(first + (n % 26) as u8)
}

fn write_region(f: &mut fmt::Formatter<'_>, region: &Region) -> fmt::Result {
    writeln!(f, "Memory blocks")?;
    for (offset, header) in region.blocks() {
        writeln!(
            f,
            "{} at {:>5}, size {:>5}, surv: {}",
            if header.is_free { "Free" } else { "Used" },
            offset,
            header.size,
            header.survival_count,
        )?;
    }

    let mut map = String::with_capacity(region.size() / ALIGNMENT);
    let (mut free, mut used) = (0, 0);
    for (_, header) in region.blocks() {
        let letter = if header.is_free {
            free += 1;
            marker(b'a', free - 1)
        } else {
            used += 1;
            marker(b'A', used - 1)
        };
        map.extend(std::iter::repeat_n(letter, header.span() / ALIGNMENT));
    }
    writeln!(f, "{map}")?;

    writeln!(f, "Free list")?;
    for (offset, header) in region.free_blocks() {
        writeln!(f, "Block at {:>5}, size {:>5}", offset, header.size)?;
    }

    Ok(())
}

impl fmt::Display for MemoryDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let heap = self.heap;

        writeln!(f, "MEMORY DUMP")?;
        writeln!(f, "Current young region: {}", heap.active_young())?;

        writeln!(f, "\nYoung region")?;
        write_region(f, heap.region(heap.active_young()))?;

        writeln!(f, "\nOld region")?;
        write_region(f, &heap.old)?;

        writeln!(f, "\nManaged list")?;
        for (handle, address) in heap.table.iter() {
            writeln!(f, "{handle} = {address}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{config::Config, heap::Generation, Heap};

    #[test]
    fn map_letters_every_block() {
        let mut heap = Heap::new(Config::default().with_region_size(128)).unwrap();

        let a = heap.allocate(8, Generation::Young).unwrap();
        heap.allocate(8, Generation::Young).unwrap();
        heap.deallocate(a).unwrap();

        let dump = heap.dump().to_string();

        // 32 + 32 bytes of blocks, then the 64 byte tail.
        assert!(dump.contains("aaaaAAAAbbbbbbbb"), "{dump}");
        assert!(dump.contains("Free at     0, size     8, surv: 0"), "{dump}");
    }

    #[test]
    fn managed_slots_are_listed() {
        let mut heap = Heap::new(Config::default()).unwrap();

        let a = heap.managed_allocate(8).unwrap();
        let b = heap.managed_allocate(8).unwrap();
        heap.managed_deallocate(a);

        let dump = heap.dump().to_string();

        assert!(!dump.contains("#0 ="), "{dump}");
        assert!(dump.contains(&format!("{b} = {}", heap.resolve(b).unwrap())), "{dump}");
    }
}
