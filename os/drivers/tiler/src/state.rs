//! Everything guarded by the allocator lock.

use crate::arena::{Arena, Handle};
use crate::config::TilerConfig;
use crate::error::Result;
use crate::model::{Area, Block, BlockOwner, Group, Owner, Process};
use crate::request::{Request, analyze};
use crate::{BlockInfo, Stats};
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use tiler_container::{ContainerStore, PagePinner, PageTableProgrammer};
use tiler_geom::{Geometry, TilerAddress, TilerFormat};
use tiler_info::defaults::{BLOCK_ID_SEED, BUFFER_OFFSET_SEED};

/// Collaborators, resolved per format once at build time.
pub struct Backends {
    pub stores: Vec<Box<dyn ContainerStore + Send>>,
    pub store_of: [usize; 4],
    pub programmers: Vec<Arc<dyn PageTableProgrammer>>,
    pub programmer_of: [Option<usize>; 4],
    pub pinner: Option<Arc<dyn PagePinner>>,
}

impl Backends {
    #[inline]
    pub fn container_of(&self, format: TilerFormat) -> usize {
        self.store_of[format.index()]
    }

    pub fn programmer(&self, format: TilerFormat) -> Option<&Arc<dyn PageTableProgrammer>> {
        self.programmer_of[format.index()].map(|i| &self.programmers[i])
    }

    /// Programmer that backs blocks of `format` with pages, if any.
    pub fn mapper(&self, format: TilerFormat) -> Option<Arc<dyn PageTableProgrammer>> {
        self.programmer(format).filter(|p| p.can_map(format)).cloned()
    }
}

/// # Invariants
/// - Every live block is on exactly one of `global` or its group's reserved
///   list, except transiently inside one locked operation.
/// - `area.blocks` is sorted by left edge and its blocks never overlap.
/// - An orphaned area is on `orphan_areas`; an orphaned linear block is on
///   `orphan_linear`.
pub struct State {
    pub config: TilerConfig,
    pub geom: Geometry,
    pub processes: Arena<Process>,
    pub groups: Arena<Group>,
    pub areas: Arena<Area>,
    pub blocks: Arena<Block>,
    pub global: Vec<Handle<Block>>,
    pub orphan_areas: Vec<Handle<Area>>,
    pub orphan_linear: Vec<Handle<Block>>,
    pub id_state: u32,
    pub offset_state: u32,
    pub backends: Backends,
}

impl State {
    pub fn new(config: TilerConfig, backends: Backends) -> Self {
        Self {
            config,
            geom: Geometry::new(),
            processes: Arena::new(),
            groups: Arena::new(),
            areas: Arena::new(),
            blocks: Arena::new(),
            global: Vec::new(),
            orphan_areas: Vec::new(),
            orphan_linear: Vec::new(),
            id_state: BLOCK_ID_SEED,
            offset_state: BUFFER_OFFSET_SEED,
            backends,
        }
    }

    pub fn analyze(&self, format: TilerFormat, width: u32, height: u32, align: u32, offset: u32) -> Result<Request> {
        analyze(&self.geom, &self.config, format, width, height, align, offset)
    }

    /// Live, claimed block with the given key and id.
    pub fn find_block(&self, key: u32, id: u32) -> Option<Handle<Block>> {
        self.global
            .iter()
            .copied()
            .find(|&b| self.blocks[b].key == key && self.blocks[b].id == id)
    }

    /// Live, claimed block containing `address`, in any orientation.
    pub fn find_by_address(&self, address: TilerAddress) -> Option<Handle<Block>> {
        let format = address.format();
        let (x, y) = self.geom.coordinates_of(address);
        let (sx, sy) = self.geom.slot_of(format, x, y);
        let slot = tiler_container::SlotPoint::new(u16::try_from(sx).ok()?, u16::try_from(sy).ok()?);
        self.global.iter().copied().find(|&b| {
            let block = &self.blocks[b];
            block.format == format && block.area.contains(slot)
        })
    }

    pub fn group_of(&self, b: Handle<Block>) -> Option<Handle<Group>> {
        match self.blocks[b].owner {
            BlockOwner::Area(a) => match self.areas[a].owner {
                Owner::Owned(g) => Some(g),
                Owner::Orphaned => None,
            },
            BlockOwner::Group(g) => Some(g),
            BlockOwner::Orphaned => None,
        }
    }

    /// Process owning `b`, or `None` once it has been orphaned.
    pub fn process_of(&self, b: Handle<Block>) -> Option<Handle<Process>> {
        self.group_of(b).map(|g| self.groups[g].process)
    }

    /// Snapshot of block `b`, or `None` once it has been released.
    pub fn info(&self, b: Handle<Block>) -> Option<BlockInfo> {
        let block = self.blocks.get(b)?;
        let address = block.address;
        Some(BlockInfo {
            format: block.format,
            key: block.key,
            id: block.id,
            group: block.gid,
            width: block.width,
            height: block.height,
            address,
            stride: self.geom.stride(address),
            physical_stride: self.geom.physical_stride(address, block.width, block.height),
            virtual_stride: self.geom.virtual_stride(address, block.width, block.height),
            size: self.geom.size(address, block.width, block.height),
            area: block.area,
            refs: block.refs,
            allocated: block.allocated,
        })
    }

    pub fn stats(&self) -> Stats {
        let mut reserved = 0;
        for (_, group) in self.groups.iter() {
            reserved += group.reserved.len();
        }
        Stats {
            processes: self.processes.len(),
            groups: self.groups.len(),
            areas: self.areas.len(),
            blocks: self.global.len(),
            reserved_blocks: reserved,
            buffers: self.processes.iter().map(|(_, p)| p.buffers.len()).sum(),
            orphaned_areas: self.orphan_areas.len(),
            orphaned_blocks: self.orphan_linear.len(),
        }
    }
}
