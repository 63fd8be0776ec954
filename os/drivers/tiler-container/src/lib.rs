//! # TILER Container Collaborators
//!
//! The allocator core does not own the slot grid, the page tables behind it, or
//! the pinning of user memory. This crate defines those three seams as traits,
//! together with the value types that cross them:
//!
//! | Trait | Role |
//! |-------|------|
//! | [`ContainerStore`] | Raw 2D/1D slot reservation in one container grid. |
//! | [`PageTableProgrammer`] | Backs slot ranges with physical pages. |
//! | [`PagePinner`] | Pins user pages and reports their physical addresses. |
//!
//! ```text
//!   allocator core ──reserve_2d / reserve_1d / release──► ContainerStore
//!        │
//!        ├──allocate_pages / commit / clear / free_pages──► PageTableProgrammer
//!        │
//!        └──pin / unpin──► PagePinner
//! ```
//!
//! [`ContainerStore`] is only ever called with the core's lock held and takes
//! `&mut self`. The other two are called with the lock dropped, so they take
//! `&self` and must be [`Sync`].
//!
//! ## Reference implementations
//!
//! - [`GridStore`]: first-fit occupancy grid. 2D rectangles are placed from
//!   the top-left, 1D runs from the bottom-right, so the two rarely meet.
//! - [`PagePool`]: a fixed pool of physical pages plus a software page table
//!   keyed by slot.
//!
//! Both are small enough for hosted tests and for bring-up on hardware whose
//! real packer is not available yet.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod area;
mod error;
mod grid_store;
mod page_pool;

pub use crate::area::{ContainerArea, PhysAddr, SlotPoint, SlotRect, SlotRun};
pub use crate::error::{ContainerError, PageTableError, PinError};
pub use crate::grid_store::GridStore;
pub use crate::page_pool::PagePool;

use alloc::vec::Vec;
use tiler_geom::TilerFormat;

/// Raw slot reservation in one container grid.
pub trait ContainerStore {
    /// Reserve a `width × height` slot rectangle whose left edge is a multiple
    /// of `align` slots.
    ///
    /// # Errors
    /// [`ContainerError::NoSpace`] if no such rectangle is free.
    fn reserve_2d(&mut self, width: u16, height: u16, align: u16) -> Result<SlotRect, ContainerError>;

    /// Reserve `slots` consecutive slots in raster order.
    ///
    /// # Errors
    /// [`ContainerError::NoSpace`] if no such run is free.
    fn reserve_1d(&mut self, slots: u32) -> Result<SlotRun, ContainerError>;

    /// Return a previously reserved rectangle or run.
    ///
    /// # Errors
    /// [`ContainerError::InvalidArea`] if `area` was not reserved from this store.
    fn release(&mut self, area: &ContainerArea) -> Result<(), ContainerError>;
}

/// Programs the translation from container slots to physical pages.
pub trait PageTableProgrammer: Send + Sync {
    /// Whether blocks of `format` get physical backing from this programmer.
    fn can_map(&self, format: TilerFormat) -> bool;

    /// Allocate `count` physical pages.
    ///
    /// # Errors
    /// [`PageTableError::OutOfPages`] if the pool cannot satisfy the request.
    fn allocate_pages(&self, count: usize) -> Result<Vec<PhysAddr>, PageTableError>;

    /// Return pages obtained from [`allocate_pages`](Self::allocate_pages).
    fn free_pages(&self, pages: Vec<PhysAddr>);

    /// Point every slot of `area` at the matching page of `pages`, in raster order.
    ///
    /// # Errors
    /// Any [`PageTableError`]; nothing is committed in that case.
    fn commit(&self, area: &ContainerArea, pages: &[PhysAddr]) -> Result<(), PageTableError>;

    /// Remove the translation of every slot of `area`.
    ///
    /// # Errors
    /// [`PageTableError::Unsupported`] if the programmer cannot clear this area.
    fn clear(&self, area: &ContainerArea) -> Result<(), PageTableError>;
}

/// User pages held in memory for the lifetime of a mapping.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PinnedPages {
    /// Page-aligned user address of the first page.
    pub user_address: u64,
    /// Physical address of every pinned page.
    pub pages: Vec<PhysAddr>,
}

/// Page-pinning subsystem.
pub trait PagePinner: Send + Sync {
    /// Pin `count` user pages starting at the page containing `user_address`.
    ///
    /// # Errors
    /// Any [`PinError`]; nothing stays pinned in that case.
    fn pin(&self, user_address: u64, count: usize) -> Result<PinnedPages, PinError>;

    /// Release pages obtained from [`pin`](Self::pin).
    fn unpin(&self, pages: PinnedPages);
}
