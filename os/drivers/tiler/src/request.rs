//! Normalization of caller requests into slot units.

use crate::config::TilerConfig;
use crate::error::{Result, TilerError};
use tiler_geom::{Geometry, TilerFormat};
use tiler_info::container::{CONTAINER_HEIGHT, CONTAINER_WIDTH, PAGE_SIZE};

/// A request in slots of its format.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Request {
    pub format: TilerFormat,
    /// Width in slots; the run length for the page format.
    pub width: u32,
    /// Height in slots; always 1 for the page format.
    pub height: u32,
    /// Alignment of the left edge, in slots.
    pub align: u32,
    /// Offset of the left edge modulo `align`, in slots.
    pub offset: u32,
    /// Slots reachable through one page.
    pub band: u32,
    /// Bytes from the left slot edge to the first pixel.
    pub in_offset: u32,
    /// Requested pixel width (bytes for the page format).
    pub pixel_width: u32,
    pub pixel_height: u32,
}

impl Request {
    /// Width as laid out in the grid.
    pub fn width_slots(&self) -> Result<u16> {
        u16::try_from(self.width).map_err(|_| TilerError::InvalidArgument("request wider than the container"))
    }

    pub fn height_slots(&self) -> Result<u16> {
        u16::try_from(self.height).map_err(|_| TilerError::InvalidArgument("request taller than the container"))
    }
}

/// Convert a pixel request into slots, validating alignment and offset.
///
/// `align` and `offset` are in bytes; an `align` of 0 selects the configured
/// default.
///
/// # Errors
/// [`TilerError::InvalidArgument`] for empty or oversized requests, an
/// alignment that is not a power of two or exceeds a page, or an offset that
/// is not a whole number of pixels below the alignment.
pub fn analyze(
    geom: &Geometry,
    config: &TilerConfig,
    format: TilerFormat,
    width: u32,
    height: u32,
    align: u32,
    offset: u32,
) -> Result<Request> {
    if width == 0 || height == 0 {
        return Err(TilerError::InvalidArgument("empty request"));
    }

    if format == TilerFormat::Page {
        let in_offset = offset & (PAGE_SIZE - 1);
        let slots = width
            .checked_add(in_offset)
            .map(|bytes| bytes.div_ceil(PAGE_SIZE))
            .ok_or(TilerError::InvalidArgument("linear request too large"))?;
        if slots > u32::from(CONTAINER_WIDTH) * u32::from(CONTAINER_HEIGHT) {
            return Err(TilerError::InvalidArgument("linear request too large"));
        }
        return Ok(Request {
            format,
            width: slots,
            height: 1,
            align: 1,
            offset: 0,
            band: 1,
            in_offset,
            pixel_width: width,
            pixel_height: 1,
        });
    }

    let g = geom.format(format);
    let slot_row = g.slot_row_bytes();
    let band = PAGE_SIZE / slot_row;
    let min_align = slot_row.max(config.granularity);

    let align = if align == 0 {
        config.default_alignment
    } else if !align.is_power_of_two() || align > PAGE_SIZE {
        return Err(TilerError::InvalidArgument("alignment must be a power of two up to a page"));
    } else {
        align
    };
    let align = align.next_multiple_of(min_align);

    if offset % g.bpp != 0 {
        return Err(TilerError::InvalidArgument("offset is not a whole number of pixels"));
    }
    if offset >= align {
        return Err(TilerError::InvalidArgument("offset exceeds the alignment"));
    }

    let in_offset = offset & (min_align - 1);
    let offset = offset & !(min_align - 1);
    let padded = width
        .checked_add(in_offset / g.bpp)
        .map(|w| w.next_multiple_of(min_align / g.bpp))
        .ok_or(TilerError::InvalidArgument("request wider than the container"))?;

    let request = Request {
        format,
        width: padded.div_ceil(g.slot_width),
        height: height.div_ceil(g.slot_height),
        align: align / slot_row,
        offset: offset / slot_row,
        band,
        in_offset,
        pixel_width: width,
        pixel_height: height,
    };

    if request.width + request.offset > u32::from(CONTAINER_WIDTH) || request.height > u32::from(CONTAINER_HEIGHT) {
        return Err(TilerError::InvalidArgument("request exceeds the container"));
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze8(width: u32, height: u32, align: u32, offset: u32) -> Result<Request> {
        analyze(&Geometry::new(), &TilerConfig::default(), TilerFormat::Bit8, width, height, align, offset)
    }

    #[test]
    fn small_alignments_round_up_to_the_granularity() {
        let r = analyze8(64, 64, 64, 0).unwrap();
        assert_eq!((r.width, r.height, r.align, r.offset, r.band), (2, 1, 2, 0, 64));
        assert_eq!(r.in_offset, 0);
    }

    #[test]
    fn default_alignment_is_a_page() {
        let r = analyze8(1920, 1080, 0, 0).unwrap();
        assert_eq!((r.width, r.height, r.align), (30, 17, 64));
    }

    #[test]
    fn offsets_split_into_slots_and_bytes() {
        let r = analyze8(100, 10, 1024, 200).unwrap();
        assert_eq!(r.offset, 2);
        assert_eq!(r.in_offset, 72);
        assert_eq!(r.width, 4);

        let g = analyze(&Geometry::new(), &TilerConfig::default(), TilerFormat::Bit32, 10, 10, 512, 256).unwrap();
        assert_eq!((g.align, g.offset, g.in_offset), (4, 2, 0));
    }

    #[test]
    fn invalid_inputs() {
        assert!(matches!(analyze8(0, 1, 0, 0), Err(TilerError::InvalidArgument(_))));
        assert!(matches!(analyze8(1, 1, 96, 0), Err(TilerError::InvalidArgument(_))));
        assert!(matches!(analyze8(1, 1, 8192, 0), Err(TilerError::InvalidArgument(_))));
        assert!(matches!(analyze8(1, 1, 128, 128), Err(TilerError::InvalidArgument(_))));
        assert!(matches!(analyze8(16385, 1, 0, 0), Err(TilerError::InvalidArgument(_))));
        assert!(matches!(analyze8(1, 8193, 0, 0), Err(TilerError::InvalidArgument(_))));
        assert!(matches!(analyze8(16000, 1, 4096, 2048), Err(TilerError::InvalidArgument(_))));
        assert_eq!(analyze8(14336, 1, 4096, 2048).map(|r| (r.width, r.offset)), Ok((224, 32)));

        let odd = analyze(&Geometry::new(), &TilerConfig::default(), TilerFormat::Bit16, 8, 8, 256, 3);
        assert!(matches!(odd, Err(TilerError::InvalidArgument(_))));
    }

    #[test]
    fn page_format_counts_pages() {
        let geom = Geometry::new();
        let config = TilerConfig::default();
        let r = analyze(&geom, &config, TilerFormat::Page, 8192, 7, 0, 0x10).unwrap();
        assert_eq!((r.width, r.height, r.in_offset), (3, 1, 0x10));
        let r = analyze(&geom, &config, TilerFormat::Page, 4096, 1, 0, 0x2000).unwrap();
        assert_eq!((r.width, r.in_offset), (1, 0));
    }
}
