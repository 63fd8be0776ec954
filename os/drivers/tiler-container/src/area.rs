use core::fmt;
use tiler_info::container::CONTAINER_WIDTH;

/// A physical page address.
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct PhysAddr(u64);

impl PhysAddr {
    #[inline]
    #[must_use]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr({:#x})", self.0)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A slot coordinate in the container grid.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct SlotPoint {
    pub x: u16,
    pub y: u16,
}

impl SlotPoint {
    #[inline]
    #[must_use]
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// Raster index of this slot in a grid `width` slots wide.
    #[inline]
    #[must_use]
    pub const fn linear(self, width: u16) -> u32 {
        self.y as u32 * width as u32 + self.x as u32
    }

    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_linear(index: u32, width: u16) -> Self {
        Self {
            x: (index % width as u32) as u16,
            y: (index / width as u32) as u16,
        }
    }
}

/// An inclusive slot rectangle `[p0, p1]`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct SlotRect {
    pub p0: SlotPoint,
    pub p1: SlotPoint,
}

impl SlotRect {
    /// Rectangle of `width × height` slots with its top-left corner at `(x, y)`.
    ///
    /// Both extents must be at least one slot.
    #[must_use]
    pub const fn with_size(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            p0: SlotPoint::new(x, y),
            p1: SlotPoint::new(x + width - 1, y + height - 1),
        }
    }

    #[inline]
    #[must_use]
    pub const fn width(&self) -> u16 {
        self.p1.x - self.p0.x + 1
    }

    #[inline]
    #[must_use]
    pub const fn height(&self) -> u16 {
        self.p1.y - self.p0.y + 1
    }

    #[inline]
    #[must_use]
    pub const fn slots(&self) -> u32 {
        self.width() as u32 * self.height() as u32
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, p: SlotPoint) -> bool {
        p.x >= self.p0.x && p.x <= self.p1.x && p.y >= self.p0.y && p.y <= self.p1.y
    }
}

impl fmt::Display for SlotRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})-({},{})", self.p0.x, self.p0.y, self.p1.x, self.p1.y)
    }
}

/// A run of slots in raster order, from `first` to `last` inclusive.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct SlotRun {
    pub first: SlotPoint,
    pub last: SlotPoint,
    pub slots: u32,
}

impl SlotRun {
    /// Run of `slots` slots starting at raster index `start` of the container.
    #[must_use]
    pub const fn starting_at(start: u32, slots: u32) -> Self {
        Self {
            first: SlotPoint::from_linear(start, CONTAINER_WIDTH),
            last: SlotPoint::from_linear(start + slots - 1, CONTAINER_WIDTH),
            slots,
        }
    }

    /// Raster index of the first slot.
    #[inline]
    #[must_use]
    pub const fn start(&self) -> u32 {
        self.first.linear(CONTAINER_WIDTH)
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, p: SlotPoint) -> bool {
        let at = p.linear(CONTAINER_WIDTH);
        at >= self.start() && at < self.start() + self.slots
    }
}

/// What a [`ContainerStore`](crate::ContainerStore) hands out.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ContainerArea {
    Rect(SlotRect),
    Run(SlotRun),
}

impl ContainerArea {
    #[inline]
    #[must_use]
    pub const fn is_2d(&self) -> bool {
        matches!(self, Self::Rect(_))
    }

    /// Number of slots covered.
    #[must_use]
    pub const fn slots(&self) -> u32 {
        match self {
            Self::Rect(rect) => rect.slots(),
            Self::Run(run) => run.slots,
        }
    }

    /// Top-left (or first) slot.
    #[must_use]
    pub const fn origin(&self) -> SlotPoint {
        match self {
            Self::Rect(rect) => rect.p0,
            Self::Run(run) => run.first,
        }
    }

    #[must_use]
    pub const fn contains(&self, p: SlotPoint) -> bool {
        match self {
            Self::Rect(rect) => rect.contains(p),
            Self::Run(run) => run.contains(p),
        }
    }

    /// Every covered slot, in raster order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter_slots(&self) -> impl Iterator<Item = SlotPoint> + '_ {
        let (start, rect_width, count) = match self {
            Self::Rect(rect) => (0, u32::from(rect.width()), rect.slots()),
            Self::Run(run) => (run.start(), 0, run.slots),
        };
        (0..count).map(move |i| match self {
            Self::Rect(rect) => SlotPoint::new(
                rect.p0.x + (i % rect_width) as u16,
                rect.p0.y + (i / rect_width) as u16,
            ),
            Self::Run(_) => SlotPoint::from_linear(start + i, CONTAINER_WIDTH),
        })
    }
}

impl fmt::Display for ContainerArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rect(rect) => write!(f, "rect {rect}"),
            Self::Run(run) => write!(f, "run {}+{}", run.start(), run.slots),
        }
    }
}
