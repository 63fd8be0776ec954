//! Collision-avoiding pseudo-random generators for block ids and buffer
//! offsets.
//!
//! Both are Galois LFSRs. The generator state is owned by the caller; each
//! draw returns the advanced state together with the first candidate that
//! the caller's predicate accepts.

use log::trace;
use tiler_info::container::PAGE_SHIFT;
use tiler_info::defaults::{BLOCK_ID_TAPS, BUFFER_OFFSET_PERIOD, BUFFER_OFFSET_TAPS};

/// One step of a Galois LFSR.
#[inline]
#[must_use]
pub const fn lfsr_next(state: u32, taps: u32) -> u32 {
    (state >> 1) ^ (0u32.wrapping_sub(state & 1) & taps)
}

/// Advance from `state` until `accept` takes a candidate, trying at most
/// `limit` candidates. Returns `(new_state, candidate)`.
pub fn draw(mut state: u32, taps: u32, limit: u32, mut accept: impl FnMut(u32) -> bool) -> Option<(u32, u32)> {
    for _ in 0..limit {
        state = lfsr_next(state, taps);
        if accept(state) {
            return Some((state, state));
        }
    }
    None
}

/// Next block id not rejected by `in_use`.
pub fn next_block_id(state: u32, mut in_use: impl FnMut(u32) -> bool) -> Option<(u32, u32)> {
    let drawn = draw(state, BLOCK_ID_TAPS, u32::MAX, |id| !in_use(id));
    if let Some((_, id)) = drawn {
        trace!("block id {id:#x}");
    }
    drawn
}

/// Next page-aligned buffer offset for `size` bytes that does not wrap and is
/// not rejected by `overlaps(offset, size)`.
pub fn next_buffer_offset(state: u32, size: u32, mut overlaps: impl FnMut(u32, u32) -> bool) -> Option<(u32, u32)> {
    let (state, page) = draw(state, BUFFER_OFFSET_TAPS, BUFFER_OFFSET_PERIOD, |page| {
        let offset = page << PAGE_SHIFT;
        offset.checked_add(size).is_some() && !overlaps(offset, size)
    })?;
    let offset = page << PAGE_SHIFT;
    trace!("buffer offset {offset:#x}+{size:#x}");
    Some((state, offset))
}
