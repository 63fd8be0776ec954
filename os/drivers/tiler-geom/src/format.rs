use core::fmt;
use tiler_info::container::{PAGE_SIZE, SLOT_HEIGHT_BITS, SLOT_WIDTH_BITS};

/// Address formats of the container.
///
/// The discriminant is the 2-bit format selector of a [`TilerAddress`](crate::TilerAddress).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(u8)]
pub enum TilerFormat {
    /// 8 bits per pixel, 2D.
    Bit8 = 0,
    /// 16 bits per pixel, 2D.
    Bit16 = 1,
    /// 32 bits per pixel, 2D.
    Bit32 = 2,
    /// Linear (1D) page mode; one slot is one page.
    Page = 3,
}

impl TilerFormat {
    pub const ALL: [Self; 4] = [Self::Bit8, Self::Bit16, Self::Bit32, Self::Page];

    /// Decode the 2-bit format selector. All four values are valid.
    #[inline]
    #[must_use]
    pub const fn from_mode(mode: u8) -> Self {
        match mode & 0b11 {
            0 => Self::Bit8,
            1 => Self::Bit16,
            2 => Self::Bit32,
            _ => Self::Page,
        }
    }

    #[inline]
    #[must_use]
    pub const fn mode(self) -> u8 {
        self as u8
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Address bits consumed by one step in x.
    #[must_use]
    pub const fn x_shift(self) -> u32 {
        match self {
            Self::Bit8 | Self::Bit16 => 0,
            Self::Bit32 => 1,
            Self::Page => SLOT_WIDTH_BITS,
        }
    }

    /// Address bits consumed by one step in y.
    #[must_use]
    pub const fn y_shift(self) -> u32 {
        match self {
            Self::Bit8 => 0,
            Self::Bit16 | Self::Bit32 => 1,
            Self::Page => SLOT_HEIGHT_BITS,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_2d(self) -> bool {
        !matches!(self, Self::Page)
    }
}

impl fmt::Display for TilerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bit8 => "8bit",
            Self::Bit16 => "16bit",
            Self::Bit32 => "32bit",
            Self::Page => "page",
        })
    }
}

/// Numeric format id outside of `0..=3`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("invalid tiler format {0}")]
pub struct InvalidFormat(pub u32);

impl TryFrom<u32> for TilerFormat {
    type Error = InvalidFormat;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match u8::try_from(value) {
            Ok(mode @ 0..=3) => Ok(Self::from_mode(mode)),
            _ => Err(InvalidFormat(value)),
        }
    }
}

/// Derived per-format geometry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FormatGeometry {
    pub format: TilerFormat,
    /// Address bytes per pixel, `1 << (x_shift + y_shift)`.
    pub bpp: u32,
    /// Bytes per pixel as seen through a CPU mapping (1 for page mode).
    pub bpp_mmap: u32,
    /// Pixels per slot horizontally.
    pub slot_width: u32,
    /// Pixels per slot vertically.
    pub slot_height: u32,
}

impl FormatGeometry {
    #[must_use]
    pub const fn of(format: TilerFormat) -> Self {
        let bpp = 1 << (format.x_shift() + format.y_shift());
        Self {
            format,
            bpp,
            bpp_mmap: if format.is_2d() { bpp } else { 1 },
            slot_width: 1 << (SLOT_WIDTH_BITS - format.x_shift()),
            slot_height: 1 << (SLOT_HEIGHT_BITS - format.y_shift()),
        }
    }

    /// Bytes in one row of one slot.
    #[inline]
    #[must_use]
    pub const fn slot_row_bytes(&self) -> u32 {
        self.slot_width * self.bpp
    }

    /// Number of horizontally adjacent slots reachable through one physical page.
    #[inline]
    #[must_use]
    pub const fn band(&self) -> u32 {
        PAGE_SIZE / self.slot_row_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_geometry() {
        let g8 = FormatGeometry::of(TilerFormat::Bit8);
        assert_eq!((g8.bpp, g8.slot_width, g8.slot_height, g8.band()), (1, 64, 64, 64));

        let g16 = FormatGeometry::of(TilerFormat::Bit16);
        assert_eq!((g16.bpp, g16.slot_width, g16.slot_height, g16.band()), (2, 64, 32, 32));

        let g32 = FormatGeometry::of(TilerFormat::Bit32);
        assert_eq!((g32.bpp, g32.slot_width, g32.slot_height, g32.band()), (4, 32, 32, 32));

        let page = FormatGeometry::of(TilerFormat::Page);
        assert_eq!((page.bpp, page.bpp_mmap, page.slot_width, page.slot_height), (4096, 1, 1, 1));
        assert_eq!(page.band(), 1);
    }

    #[test]
    fn numeric_ids() {
        assert_eq!(TilerFormat::try_from(2), Ok(TilerFormat::Bit32));
        assert_eq!(TilerFormat::try_from(4), Err(InvalidFormat(4)));
        assert_eq!(TilerFormat::try_from(0x103), Err(InvalidFormat(0x103)));
        for f in TilerFormat::ALL {
            assert_eq!(TilerFormat::from_mode(f.mode()), f);
        }
    }
}
