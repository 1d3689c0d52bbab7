use std::time::{SystemTime, UNIX_EPOCH};

/// Mulberry32: the state walks by a fixed odd step (so it visits every `u32`)
/// and each step is mixed into one output word. One state word per context.
pub(crate) fn next_random_u32(state: &mut u32) -> u32 {
    let mut next = state.wrapping_add(0x6d2b79f5);
    *state = next;
    next = (next ^ (next >> 15)).wrapping_mul(next | 1);
    next ^= next.wrapping_add((next ^ (next >> 7)).wrapping_mul(next | 61));
    next ^ (next >> 14)
}

pub(crate) fn next_random_bounded(state: &mut u32, bound: u32) -> u32 {
    next_random_bounded_with(state, bound, next_random_u32)
}

fn next_random_bounded_with<F>(state: &mut u32, bound: u32, mut next: F) -> u32
where
    F: FnMut(&mut u32) -> u32,
{
    if bound <= 1 {
        return 0;
    }
    let threshold = (u64::from(u32::MAX) + 1) / u64::from(bound) * u64::from(bound);
    let mut candidate = next(state);
    while u64::from(candidate) >= threshold {
        candidate = next(state);
    }
    candidate % bound
}

/// Fisher-Yates over `items` in place.
pub(crate) fn shuffle_in_place<T>(state: &mut u32, items: &mut [T]) {
    for index in (1..items.len()).rev() {
        let bound = u32::try_from(index + 1).unwrap_or(u32::MAX);
        let swap_with = next_random_bounded(state, bound) as usize;
        items.swap(index, swap_with);
    }
}

pub(crate) fn seed_from_clock() -> u32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or(1);
    (nanos as u32) ^ ((nanos >> 32) as u32)
}
