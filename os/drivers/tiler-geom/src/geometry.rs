use crate::{FormatGeometry, Orientation, TilerAddress, TilerFormat};
use tiler_info::container::{CONT_HEIGHT_BITS, CONT_WIDTH_BITS, PAGE_SIZE};

/// The Geometry Engine.
///
/// Holds the per-format geometry derived once from the container layout; all
/// methods are pure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Geometry {
    formats: [FormatGeometry; 4],
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new()
    }
}

impl Geometry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            formats: [
                FormatGeometry::of(TilerFormat::Bit8),
                FormatGeometry::of(TilerFormat::Bit16),
                FormatGeometry::of(TilerFormat::Bit32),
                FormatGeometry::of(TilerFormat::Page),
            ],
        }
    }

    #[inline]
    #[must_use]
    pub const fn format(&self, format: TilerFormat) -> &FormatGeometry {
        &self.formats[format.index()]
    }

    /// Width of the x coordinate field of `format`, in bits.
    #[inline]
    #[must_use]
    pub const fn x_bits(format: TilerFormat) -> u32 {
        CONT_WIDTH_BITS - format.x_shift()
    }

    /// Width of the y coordinate field of `format`, in bits.
    #[inline]
    #[must_use]
    pub const fn y_bits(format: TilerFormat) -> u32 {
        CONT_HEIGHT_BITS - format.y_shift()
    }

    /// Encode the natural pixel coordinate `(x, y)` as seen through `orientation`.
    ///
    /// Returns `None` if the coordinate lies outside the container.
    #[must_use]
    pub fn address_of(&self, orientation: Orientation, format: TilerFormat, x: u32, y: u32) -> Option<TilerAddress> {
        let x_bits = Self::x_bits(format);
        let y_bits = Self::y_bits(format);
        let x_mask = mask(x_bits);
        let y_mask = mask(y_bits);
        if x > x_mask || y > y_mask {
            return None;
        }

        let x = if orientation.x_invert() { x ^ x_mask } else { x };
        let y = if orientation.y_invert() { y ^ y_mask } else { y };

        let tile = if orientation.xy_flip() {
            (x << y_bits) + y
        } else {
            (y << x_bits) + x
        };

        Some(
            TilerAddress::new()
                .with_index(tile << (format.x_shift() + format.y_shift()))
                .with_mode(format.mode())
                .with_x_invert(orientation.x_invert())
                .with_y_invert(orientation.y_invert())
                .with_xy_flip(orientation.xy_flip()),
        )
    }

    /// Natural pixel coordinate of `address`, whatever its orientation.
    ///
    /// Bytes below one pixel are dropped. For the page format the result is a
    /// slot coordinate.
    #[must_use]
    pub fn coordinates_of(&self, address: TilerAddress) -> (u32, u32) {
        let format = address.format();
        let x_bits = Self::x_bits(format);
        let y_bits = Self::y_bits(format);
        let tile = address.index() >> (format.x_shift() + format.y_shift());

        let (mut x, mut y) = if address.xy_flip() {
            (tile >> y_bits, tile & mask(y_bits))
        } else {
            (tile & mask(x_bits), tile >> x_bits)
        };

        if address.x_invert() {
            x ^= mask(x_bits);
        }
        if address.y_invert() {
            y ^= mask(y_bits);
        }
        (x, y)
    }

    /// The same pixel seen through another orientation.
    ///
    /// Bytes below one pixel (below one page for the page format) are kept.
    #[must_use]
    pub fn reorient(&self, address: TilerAddress, orientation: Orientation) -> Option<TilerAddress> {
        let (x, y) = self.coordinates_of(address);
        self.address_of(orientation, address.format(), x, y)
            .map(|a| a.byte_offset(in_pixel(address)))
    }

    /// The top-left pixel of a `width × height` block (natural dimensions) whose
    /// top-left pixel under its current orientation is `address`, seen through
    /// `orientation`.
    #[must_use]
    pub fn reorient_topleft(
        &self,
        address: TilerAddress,
        orientation: Orientation,
        width: u32,
        height: u32,
    ) -> Option<TilerAddress> {
        let (x, y) = self.coordinates_of(address);
        let x = shift_corner(x, width, address.x_invert(), orientation.x_invert())?;
        let y = shift_corner(y, height, address.y_invert(), orientation.y_invert())?;
        self.address_of(orientation, address.format(), x, y)
            .map(|a| a.byte_offset(in_pixel(address)))
    }

    /// Bytes between two consecutive rows of the view `address` belongs to.
    ///
    /// Zero for the page format, which has no rows.
    #[must_use]
    pub const fn stride(&self, address: TilerAddress) -> u32 {
        let format = address.format();
        match format {
            TilerFormat::Page => 0,
            _ if address.xy_flip() => 1 << (CONT_HEIGHT_BITS + format.x_shift()),
            _ => 1 << (CONT_WIDTH_BITS + format.y_shift()),
        }
    }

    /// Page-aligned bytes needed to map one row of a `width × height` block
    /// (natural dimensions) starting at `address`.
    #[must_use]
    pub fn virtual_stride(&self, address: TilerAddress, width: u32, height: u32) -> u32 {
        let geom = self.format(address.format());
        let row = if address.xy_flip() { height } else { width };
        page_align(address.page_offset() + geom.bpp_mmap * row)
    }

    /// Stride of the physical view backing a mapping of `address`.
    #[must_use]
    pub fn physical_stride(&self, address: TilerAddress, width: u32, height: u32) -> u32 {
        match address.format() {
            TilerFormat::Page => self.virtual_stride(address, width, height),
            _ => self.stride(address.natural()),
        }
    }

    /// Bytes needed to map a `width × height` block (natural dimensions) at `address`.
    #[must_use]
    pub fn size(&self, address: TilerAddress, width: u32, height: u32) -> u32 {
        let rows = if address.xy_flip() { width } else { height };
        rows * self.virtual_stride(address, width, height)
    }

    /// Slot containing the natural pixel `(x, y)`.
    #[inline]
    #[must_use]
    pub const fn slot_of(&self, format: TilerFormat, x: u32, y: u32) -> (u32, u32) {
        let geom = self.format(format);
        (x / geom.slot_width, y / geom.slot_height)
    }
}

#[inline]
const fn mask(bits: u32) -> u32 {
    (1 << bits) - 1
}

/// Bytes of `address` below its pixel.
const fn in_pixel(address: TilerAddress) -> u32 {
    let format = address.format();
    address.index() & mask(format.x_shift() + format.y_shift())
}

#[inline]
const fn page_align(bytes: u32) -> u32 {
    (bytes + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

fn shift_corner(at: u32, extent: u32, was_inverted: bool, inverted: bool) -> Option<u32> {
    let span = extent.checked_sub(1)?;
    match (was_inverted, inverted) {
        (false, true) => at.checked_add(span),
        (true, false) => at.checked_sub(span),
        _ => Some(at),
    }
}
