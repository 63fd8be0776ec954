//! Runtime configuration of the allocator.

use tiler_info::defaults::{DEFAULT_ALIGNMENT, DEFAULT_GRANULARITY};

/// A hand-tuned packing of `count` luma/chroma pairs into one area.
///
/// All values are in 8-bit slots. `coords[i]` is the left edge of the i-th
/// luma block and of its chroma block within the area.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Nv12Template {
    pub count: u16,
    /// Luma offset within the alignment the template was tuned for.
    pub offset: u16,
    /// Luma width.
    pub width: u16,
    pub align: u16,
    /// Width of the area.
    pub area: u16,
    pub coords: &'static [(u16, u16)],
}

/// Known-good packings for the 64-slot band of the default container.
///
/// Ordered by descending `count`; the lookup stops at the first template
/// with fewer pairs than the best closed-form plan.
pub const DEFAULT_NV12_TEMPLATES: &[Nv12Template] = &[
    Nv12Template {
        count: 9,
        offset: 2,
        width: 4,
        align: 4,
        area: 64,
        coords: &[(2, 33), (6, 35), (10, 37), (14, 39), (18, 41), (46, 23), (50, 25), (54, 27), (58, 29)],
    },
    Nv12Template {
        count: 3,
        offset: 0,
        width: 12,
        align: 4,
        area: 64,
        coords: &[(0, 32), (12, 38), (48, 24)],
    },
];

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TilerConfig {
    /// Keep a separate process context per client identity. When disabled,
    /// every client shares identity `0`.
    pub isolation: bool,
    /// Use the virtualized address as block id instead of a generated one.
    pub block_id_is_address: bool,
    /// Smallest horizontal allocation unit of 2D blocks, in bytes.
    pub granularity: u32,
    /// Alignment in bytes used for requests with alignment `0`.
    pub default_alignment: u32,
    /// Allow luma and chroma blocks to share one area.
    pub nv12_packing: bool,
    pub nv12_templates: &'static [Nv12Template],
}

impl Default for TilerConfig {
    fn default() -> Self {
        Self {
            isolation: true,
            block_id_is_address: false,
            granularity: DEFAULT_GRANULARITY,
            default_alignment: DEFAULT_ALIGNMENT,
            nv12_packing: true,
            nv12_templates: DEFAULT_NV12_TEMPLATES,
        }
    }
}
