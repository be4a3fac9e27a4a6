//! Allocates a few managed objects, lets some of them die and runs both
//! collectors, printing the heap after every step.
//!
//! Run with `RUST_LOG=debug` to see what the allocator and the collectors do.

use genalloc::{Config, Generation, Heap, Strategy};

fn main() -> Result<(), genalloc::Error> {
    env_logger::init();

    let mut heap = Heap::new(Config::default().with_strategy(Strategy::BestFit))?;

    let a = heap.managed_allocate(24)?;
    let b = heap.managed_allocate(40)?;
    let c = heap.managed_allocate(8)?;
    heap.get_mut(a).expect("a is live").fill(b'a');
    println!("{}", heap.dump());

    heap.managed_deallocate(b);
    heap.minor_collect()?;
    println!("{}", heap.dump());

    // Two more cycles and `a` and `c` are old enough to be promoted.
    heap.minor_collect()?;
    heap.minor_collect()?;
    println!("{}", heap.dump());

    // A raw block behind the promoted objects, then a hole in front of it.
    let raw = heap.allocate(64, Generation::Old)?;
    heap.payload_mut(raw).expect("raw block is live").fill(b'r');
    heap.managed_deallocate(c);
    let stats = heap.major_collect()?;
    println!("{stats:?}");
    println!("{}", heap.dump());

    Ok(())
}
