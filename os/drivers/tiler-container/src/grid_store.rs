use crate::{ContainerArea, ContainerError, ContainerStore, SlotRect, SlotRun};
use alloc::vec;
use alloc::vec::Vec;
use log::trace;
use tiler_info::container::{CONTAINER_HEIGHT, CONTAINER_WIDTH};

/// First-fit occupancy grid over the whole container.
///
/// Rectangles are searched row by row from the top-left corner; a run is
/// searched backwards from the last slot. Runs use raster indices of the full
/// container, so a `GridStore` is always [`CONTAINER_WIDTH`] slots wide.
pub struct GridStore {
    height: u16,
    used: Vec<bool>,
}

impl Default for GridStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GridStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_height(CONTAINER_HEIGHT)
    }

    /// A store covering only the top `height` rows of the container.
    #[must_use]
    pub fn with_height(height: u16) -> Self {
        Self {
            height,
            used: vec![false; usize::from(CONTAINER_WIDTH) * usize::from(height)],
        }
    }

    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.used.iter().filter(|u| !**u).count()
    }

    #[inline]
    fn index(x: u16, y: u16) -> usize {
        usize::from(y) * usize::from(CONTAINER_WIDTH) + usize::from(x)
    }

    /// Rightmost occupied column of the candidate rectangle, if any.
    fn rightmost_used(&self, rect: &SlotRect) -> Option<u16> {
        (rect.p0.x..=rect.p1.x)
            .rev()
            .find(|&x| (rect.p0.y..=rect.p1.y).any(|y| self.used[Self::index(x, y)]))
    }

    fn mark(&mut self, area: &ContainerArea, used: bool) {
        for p in area.iter_slots() {
            self.used[Self::index(p.x, p.y)] = used;
        }
    }
}

impl ContainerStore for GridStore {
    fn reserve_2d(&mut self, width: u16, height: u16, align: u16) -> Result<SlotRect, ContainerError> {
        if width == 0 || height == 0 || width > CONTAINER_WIDTH || height > self.height {
            return Err(ContainerError::NoSpace);
        }
        let align = align.max(1);

        for y in 0..=(self.height - height) {
            let mut x = 0u16;
            while x <= CONTAINER_WIDTH - width {
                let rect = SlotRect::with_size(x, y, width, height);
                match self.rightmost_used(&rect) {
                    None => {
                        self.mark(&ContainerArea::Rect(rect), true);
                        trace!("grid: reserved {rect}");
                        return Ok(rect);
                    }
                    Some(used) => {
                        let next = (u32::from(used) + 1).next_multiple_of(u32::from(align));
                        let Ok(next) = u16::try_from(next) else { break };
                        x = next;
                    }
                }
            }
        }
        Err(ContainerError::NoSpace)
    }

    fn reserve_1d(&mut self, slots: u32) -> Result<SlotRun, ContainerError> {
        let total = self.used.len();
        let wanted = usize::try_from(slots).map_err(|_| ContainerError::NoSpace)?;
        if wanted == 0 || wanted > total {
            return Err(ContainerError::NoSpace);
        }

        let mut free = 0usize;
        for at in (0..total).rev() {
            if self.used[at] {
                free = 0;
                continue;
            }
            free += 1;
            if free == wanted {
                let start = u32::try_from(at).map_err(|_| ContainerError::NoSpace)?;
                let run = SlotRun::starting_at(start, slots);
                self.mark(&ContainerArea::Run(run), true);
                trace!("grid: reserved run {start}+{slots}");
                return Ok(run);
            }
        }
        Err(ContainerError::NoSpace)
    }

    fn release(&mut self, area: &ContainerArea) -> Result<(), ContainerError> {
        let in_bounds = match area {
            ContainerArea::Rect(rect) => rect.p1.x < CONTAINER_WIDTH && rect.p1.y < self.height,
            ContainerArea::Run(run) => (run.start() + run.slots) as usize <= self.used.len(),
        };
        if !in_bounds || area.iter_slots().any(|p| !self.used[Self::index(p.x, p.y)]) {
            return Err(ContainerError::InvalidArea);
        }
        self.mark(area, false);
        trace!("grid: released {area}");
        Ok(())
    }
}
