//! # Container Layout

/// Bits of the virtualized address used for the horizontal byte coordinate
/// of an 8-bit view.
pub const CONT_WIDTH_BITS: u32 = 14;

/// Bits of the virtualized address used for the vertical coordinate of an
/// 8-bit view.
pub const CONT_HEIGHT_BITS: u32 = 13;

/// Horizontal address bits covered by one slot (one physical page).
pub const SLOT_WIDTH_BITS: u32 = 6;

/// Vertical address bits covered by one slot (one physical page).
pub const SLOT_HEIGHT_BITS: u32 = 6;

/// Size of one physical page in bytes.
pub const PAGE_SIZE: u32 = 1 << PAGE_SHIFT;

/// log2 of [`PAGE_SIZE`].
pub const PAGE_SHIFT: u32 = 12;

/// Number of slot columns in the container.
pub const CONTAINER_WIDTH: u16 = 1 << (CONT_WIDTH_BITS - SLOT_WIDTH_BITS);

/// Number of slot rows in the container.
pub const CONTAINER_HEIGHT: u16 = 1 << (CONT_HEIGHT_BITS - SLOT_HEIGHT_BITS);

/// Bits of the tile index inside one format window.
pub const VIEW_BITS: u32 = CONT_WIDTH_BITS + CONT_HEIGHT_BITS;

/// Size of one format window of the virtualized address space.
pub const VIEW_SIZE: u32 = 1 << VIEW_BITS;

/// Physical alias at which the natural views of all formats start.
pub const ALIAS_BASE: u32 = 0x6000_0000;

/// End (exclusive) of the physical alias of the four format windows.
pub const ALIAS_END: u64 = ALIAS_BASE as u64 + 4 * VIEW_SIZE as u64;

const _: () = {
    assert!(VIEW_BITS == 27, "two format bits and three view bits must fit above the index");
    assert!(SLOT_WIDTH_BITS + SLOT_HEIGHT_BITS == PAGE_SHIFT);
    assert!(CONT_WIDTH_BITS > SLOT_WIDTH_BITS && CONT_HEIGHT_BITS > SLOT_HEIGHT_BITS);
    assert!(ALIAS_END <= 1 << 32);
};
