//! Records of the ownership graph.
//!
//! ```text
//! Process ──► Group ──► Area ──► Block (2D)
//!    │          └─────────────► Block (1D, linear)
//!    └──► Buffer ····► Block (counted, non-owning)
//! ```
//!
//! Solid arrows own, the dotted one only holds a reference count. Every live
//! block is additionally on either the global list or its group's reserved
//! list.

use crate::arena::Handle;
use alloc::vec::Vec;
use tiler_container::{ContainerArea, PhysAddr, PinnedPages, SlotRect};
use tiler_geom::{TilerAddress, TilerFormat};

pub struct Process {
    pub pid: u32,
    /// Privileged in-driver context; has no open-handle count.
    pub kernel: bool,
    /// Open handles.
    pub refs: u32,
    pub groups: Vec<Handle<Group>>,
    pub buffers: Vec<Buffer>,
}

pub struct Group {
    pub gid: u32,
    pub process: Handle<Process>,
    /// Operations currently placing into this group.
    pub refs: u32,
    pub areas: Vec<Handle<Area>>,
    pub linear: Vec<Handle<Block>>,
    pub reserved: Vec<Handle<Block>>,
}

impl Group {
    pub fn is_unused(&self) -> bool {
        self.refs == 0 && self.areas.is_empty() && self.linear.is_empty() && self.reserved.is_empty()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Owner {
    Owned(Handle<Group>),
    /// The owning process was torn down while the entry was still referenced.
    Orphaned,
}

pub struct Area {
    pub owner: Owner,
    pub rect: SlotRect,
    /// Index of the container store the rectangle came from.
    pub container: usize,
    /// Sorted by left edge.
    pub blocks: Vec<Handle<Block>>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BlockOwner {
    Area(Handle<Area>),
    Group(Handle<Group>),
    Orphaned,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Listing {
    Global,
    Reserved,
    /// Being placed or claimed; on neither list yet.
    Unlisted,
}

#[derive(Debug, Default)]
pub enum Backing {
    #[default]
    None,
    Pages(Vec<PhysAddr>),
    Pinned(PinnedPages),
}

pub struct Block {
    pub key: u32,
    pub id: u32,
    pub gid: u32,
    pub format: TilerFormat,
    /// Pixels (bytes for the page format) as requested.
    pub width: u32,
    pub height: u32,
    /// Slots covered by the block itself.
    pub area: ContainerArea,
    pub container: usize,
    pub address: TilerAddress,
    pub refs: u32,
    pub allocated: bool,
    pub owner: BlockOwner,
    pub listing: Listing,
    pub backing: Backing,
}

impl Block {
    /// Left edge in slots.
    pub const fn left(&self) -> u16 {
        self.area.origin().x
    }

    /// Slot rectangle of a 2D block.
    pub const fn rect(&self) -> Option<SlotRect> {
        match self.area {
            ContainerArea::Rect(rect) => Some(rect),
            ContainerArea::Run(_) => None,
        }
    }
}

pub struct Buffer {
    /// Page-aligned start of the buffer's range.
    pub base: u32,
    /// Bytes covered from `base`.
    pub span: u32,
    pub offset: u32,
    pub length: u32,
    pub blocks: Vec<Handle<Block>>,
}

impl Buffer {
    pub const fn overlaps(&self, base: u32, span: u32) -> bool {
        base < self.base + self.span && self.base < base + span
    }
}
