use crate::{Orientation, TilerFormat};
use bitfield_struct::bitfield;
use tiler_info::container::{ALIAS_BASE, ALIAS_END, PAGE_SIZE, VIEW_BITS};

/// A 32-bit virtualized address of the tiled container.
///
/// ### Bit layout
///
/// | Bits  | Name        | Meaning |
/// |-------|-------------|---------|
/// | 0–26  | `index`     | Format-scaled tile index (`(row << colBits | col) << (xShift + yShift)`) |
/// | 27–28 | `mode`      | Format selector, see [`TilerFormat`] |
/// | 29    | `x_invert`  | View mirrors the natural x axis |
/// | 30    | `y_invert`  | View mirrors the natural y axis |
/// | 31    | `xy_flip`   | View swaps the natural axes (rotation) |
///
/// ### Example
/// ```rust
/// # use tiler_geom::{TilerAddress, TilerFormat};
/// let a = TilerAddress::new().with_mode(TilerFormat::Bit16.mode()).with_index(0x40);
/// assert_eq!(a.into_bits(), 0x0800_0040);
/// assert_eq!(a.format(), TilerFormat::Bit16);
/// ```
#[bitfield(u32)]
#[derive(PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TilerAddress {
    /// Bits 0–26: tile index within the format window.
    #[bits(27)]
    pub index: u32,

    /// Bits 27–28: format selector.
    #[bits(2)]
    pub mode: u8,

    /// Bit 29: X-invert.
    pub x_invert: bool,

    /// Bit 30: Y-invert.
    pub y_invert: bool,

    /// Bit 31: XY-flip (rotate).
    pub xy_flip: bool,
}

const VIEW_MASK: u32 = 0b111 << 29;
const WINDOW_MASK: u32 = !VIEW_MASK;

impl TilerAddress {
    #[inline]
    #[must_use]
    pub const fn format(self) -> TilerFormat {
        TilerFormat::from_mode(self.mode())
    }

    #[inline]
    #[must_use]
    pub const fn orientation(self) -> Orientation {
        Orientation::new()
            .with_x_invert(self.x_invert())
            .with_y_invert(self.y_invert())
            .with_xy_flip(self.xy_flip())
    }

    /// Same location, natural (unrotated, unmirrored) view bits.
    #[inline]
    #[must_use]
    pub const fn natural(self) -> Self {
        Self::from_bits(self.into_bits() & WINDOW_MASK)
    }

    /// Advance by `bytes` within the format window.
    #[inline]
    #[must_use]
    pub const fn byte_offset(self, bytes: u32) -> Self {
        Self::from_bits(self.into_bits().wrapping_add(bytes))
    }

    /// Offset of the address inside its page.
    #[inline]
    #[must_use]
    pub const fn page_offset(self) -> u32 {
        self.into_bits() & (PAGE_SIZE - 1)
    }

    /// Physical alias of the natural view of this address.
    #[inline]
    #[must_use]
    pub const fn to_alias(self) -> u32 {
        ALIAS_BASE | (self.into_bits() & WINDOW_MASK)
    }

    /// Whether `phys` lies inside the physical alias of the container.
    #[inline]
    #[must_use]
    pub const fn is_alias(phys: u64) -> bool {
        phys >= ALIAS_BASE as u64 && phys < ALIAS_END
    }

    /// Natural-view address for a physical alias.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_alias(phys: u64) -> Option<Self> {
        if !Self::is_alias(phys) {
            return None;
        }
        let window = (phys - ALIAS_BASE as u64) as u32;
        Some(Self::new().with_index(window & ((1 << VIEW_BITS) - 1)).with_mode((window >> VIEW_BITS) as u8))
    }
}

impl core::fmt::Display for TilerAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#010x}", self.into_bits())
    }
}
