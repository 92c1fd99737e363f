/// Round `size` up to a multiple of `align`, returning `None` on overflow.
///
/// `align` must be a power of two.
#[inline]
pub const fn checked_align_up(size: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    match size.checked_add(align - 1) {
        Some(x) => Some(x & !(align - 1)),
        None => None,
    }
}
