//! Helper arithmetic shared by the regions, the allocator and the collectors.

/// Every payload size and every block header offset is a multiple of this.
pub const ALIGNMENT: usize = 8;

/// Rounds `to_be_aligned` up to the next multiple of `alignment`, which must be
/// a power of two.
///
/// Region mappings are rounded to the page size with it, and requested payload
/// sizes to [`ALIGNMENT`]. Returns `None` when the rounded value does not fit
/// in a `usize`.
pub fn align(to_be_aligned: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());

    to_be_aligned
        .checked_add(alignment - 1)
        .map(|value| value & !(alignment - 1))
}

/// Whether `value` is a multiple of [`ALIGNMENT`].
#[inline]
pub fn is_aligned(value: usize) -> bool {
    value % ALIGNMENT == 0
}
