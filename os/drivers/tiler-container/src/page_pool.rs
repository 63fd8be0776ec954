use crate::{ContainerArea, PageTableError, PageTableProgrammer, PhysAddr, SlotPoint};
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use log::{debug, warn};
use spin::Mutex;
use tiler_geom::TilerFormat;
use tiler_info::container::PAGE_SIZE;

/// Software page-table programmer over a fixed pool of physical pages.
///
/// The translation table is a map from slot to page, which lets hosted tests
/// check exactly what was committed.
pub struct PagePool {
    formats: [bool; 4],
    fail_commits: AtomicBool,
    inner: Mutex<Inner>,
}

struct Inner {
    free: Vec<PhysAddr>,
    table: BTreeMap<(u16, u16), PhysAddr>,
}

impl PagePool {
    /// A pool of `pages` pages starting at `base`, mapping every format.
    #[must_use]
    pub fn new(base: PhysAddr, pages: usize) -> Self {
        let free = (0..pages as u64)
            .rev()
            .map(|i| PhysAddr::new(base.as_u64() + i * u64::from(PAGE_SIZE)))
            .collect();
        Self {
            formats: [true; 4],
            fail_commits: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                free,
                table: BTreeMap::new(),
            }),
        }
    }

    /// Restrict [`can_map`](PageTableProgrammer::can_map) to `formats`.
    #[must_use]
    pub fn with_formats(mut self, formats: &[TilerFormat]) -> Self {
        self.formats = [false; 4];
        for format in formats {
            self.formats[format.index()] = true;
        }
        self
    }

    /// Make every following [`commit`](PageTableProgrammer::commit) fail.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::Relaxed);
    }

    #[must_use]
    pub fn free_pages_count(&self) -> usize {
        self.inner.lock().free.len()
    }

    #[must_use]
    pub fn mapped_slots(&self) -> usize {
        self.inner.lock().table.len()
    }

    /// Page committed behind `slot`, if any.
    #[must_use]
    pub fn translate(&self, slot: SlotPoint) -> Option<PhysAddr> {
        self.inner.lock().table.get(&(slot.x, slot.y)).copied()
    }
}

impl PageTableProgrammer for PagePool {
    fn can_map(&self, format: TilerFormat) -> bool {
        self.formats[format.index()]
    }

    fn allocate_pages(&self, count: usize) -> Result<Vec<PhysAddr>, PageTableError> {
        let mut inner = self.inner.lock();
        if inner.free.len() < count {
            warn!("page pool: {count} pages requested, {} free", inner.free.len());
            return Err(PageTableError::OutOfPages);
        }
        let at = inner.free.len() - count;
        Ok(inner.free.split_off(at))
    }

    fn free_pages(&self, pages: Vec<PhysAddr>) {
        self.inner.lock().free.extend(pages);
    }

    fn commit(&self, area: &ContainerArea, pages: &[PhysAddr]) -> Result<(), PageTableError> {
        if self.fail_commits.load(Ordering::Relaxed) || pages.len() != area.slots() as usize {
            return Err(PageTableError::CommitFailed);
        }
        let mut inner = self.inner.lock();
        for (slot, page) in area.iter_slots().zip(pages) {
            inner.table.insert((slot.x, slot.y), *page);
        }
        debug!("page pool: committed {area}");
        Ok(())
    }

    fn clear(&self, area: &ContainerArea) -> Result<(), PageTableError> {
        let mut inner = self.inner.lock();
        for slot in area.iter_slots() {
            inner.table.remove(&(slot.x, slot.y));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SlotRect;

    #[test]
    fn allocate_commit_clear() {
        let pool = PagePool::new(PhysAddr::new(0x8000_0000), 8);
        let area = ContainerArea::Rect(SlotRect::with_size(1, 1, 2, 2));
        let pages = pool.allocate_pages(4).unwrap();
        assert_eq!(pool.free_pages_count(), 4);

        pool.commit(&area, &pages).unwrap();
        assert_eq!(pool.mapped_slots(), 4);
        assert_eq!(pool.translate(SlotPoint::new(2, 2)), Some(pages[3]));

        pool.clear(&area).unwrap();
        assert_eq!(pool.mapped_slots(), 0);
        pool.free_pages(pages);
        assert_eq!(pool.free_pages_count(), 8);
    }

    #[test]
    fn exhaustion_and_injected_failures() {
        let pool = PagePool::new(PhysAddr::new(0), 2).with_formats(&[TilerFormat::Page]);
        assert!(pool.can_map(TilerFormat::Page));
        assert!(!pool.can_map(TilerFormat::Bit8));
        assert_eq!(pool.allocate_pages(3), Err(PageTableError::OutOfPages));

        let pages = pool.allocate_pages(1).unwrap();
        let area = ContainerArea::Rect(SlotRect::with_size(0, 0, 1, 1));
        pool.fail_commits(true);
        assert_eq!(pool.commit(&area, &pages), Err(PageTableError::CommitFailed));
        pool.fail_commits(false);
        assert_eq!(pool.commit(&area, &[]), Err(PageTableError::CommitFailed));
        assert!(pool.commit(&area, &pages).is_ok());
    }
}
