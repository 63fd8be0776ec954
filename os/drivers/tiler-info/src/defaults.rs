//! # Allocator Defaults

use crate::container::PAGE_SIZE;

/// Alignment in bytes used when a caller asks for alignment `0`.
pub const DEFAULT_ALIGNMENT: u32 = PAGE_SIZE;

/// Smallest horizontal allocation unit in bytes for 2D blocks.
///
/// Widths are rounded up to it, and offsets below it are carried as an
/// intra-slot byte offset rather than a slot offset.
pub const DEFAULT_GRANULARITY: u32 = 128;

/// Maximum number of blocks aggregated into one buffer.
pub const MAX_BUFFER_BLOCKS: usize = 4;

/// Seed of the block id generator.
pub const BLOCK_ID_SEED: u32 = 0x0002_d7ae;

/// Taps of the 32-bit Galois LFSR producing block ids (32, 22, 2, 1).
pub const BLOCK_ID_TAPS: u32 = 0x8020_0003;

/// Seed of the buffer offset generator, in pages.
pub const BUFFER_OFFSET_SEED: u32 = 0xda7a;

/// Taps of the 20-bit Galois LFSR producing buffer offsets (20, 17).
pub const BUFFER_OFFSET_TAPS: u32 = 0x0009_0000;

/// Period of the buffer offset generator.
pub const BUFFER_OFFSET_PERIOD: u32 = (1 << 20) - 1;

const _: () = {
    assert!(DEFAULT_ALIGNMENT.is_power_of_two());
    assert!(DEFAULT_GRANULARITY.is_power_of_two() && DEFAULT_GRANULARITY <= PAGE_SIZE);
    assert!(BUFFER_OFFSET_SEED != 0 && BUFFER_OFFSET_SEED <= BUFFER_OFFSET_PERIOD);
    assert!(BLOCK_ID_SEED != 0);
};
