//! Sub-transfer sizing.

/// Size of the next sub-transfer starting at `addr` with `remaining` bytes
/// left: the largest power of two in `min..=max` that `addr` is aligned to
/// and that does not overrun `remaining`. Falls back to `min`.
///
/// `min` and `max` must be powers of two with `min <= max`.
pub fn next_chunk(addr: u64, remaining: usize, min: usize, max: usize) -> usize {
    debug_assert!(min.is_power_of_two() && max.is_power_of_two() && min <= max);
    let mut size = max;
    while size > min {
        if addr % size as u64 == 0 && size <= remaining {
            return size;
        }
        size >>= 1;
    }
    min
}
