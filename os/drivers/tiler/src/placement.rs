//! Placement of blocks into areas and linear runs.

use crate::arena::Handle;
use crate::error::{Result, TilerError};
use crate::ids;
use crate::model::{Area, Backing, Block, BlockOwner, Group, Listing, Owner, Process};
use crate::request::Request;
use crate::state::State;
use alloc::vec::Vec;
use log::{debug, error, warn};
use tiler_container::{ContainerArea, SlotRect};
use tiler_geom::{Orientation, TilerAddress, TilerFormat};
use tiler_info::container::CONTAINER_WIDTH;

#[inline]
const fn align_up(x: i32, a: i32) -> i32 {
    (x + a - 1) & !(a - 1)
}

impl State {
    /// Natural-view address of the first pixel of a block covering `area`.
    ///
    /// # Errors
    /// [`TilerError::OutOfMemory`] if the store handed out a slot outside the
    /// container.
    pub fn block_address(&self, format: TilerFormat, area: &ContainerArea, in_offset: u32) -> Result<TilerAddress> {
        let origin = area.origin();
        let g = self.geom.format(format);
        let (x, y) = (u32::from(origin.x) * g.slot_width, u32::from(origin.y) * g.slot_height);
        let address = self.geom.address_of(Orientation::NATURAL, format, x, y).ok_or_else(|| {
            error!("container store returned {area}, outside the container");
            TilerError::OutOfMemory
        })?;
        Ok(address.byte_offset(in_offset))
    }

    /// Left edge for a `width`-slot block in `area`, leftmost gap first.
    ///
    /// Candidate edges are `offset` modulo `align`; `area.blocks` is sorted.
    pub fn find_fit(&self, area: &Area, width: u32, align: u32, offset: u32) -> Option<u16> {
        let (w, a, o) = (i32::try_from(width).ok()?, i32::try_from(align.max(1)).ok()?, i32::try_from(offset).ok()?);
        let mut end = align_up(i32::from(area.rect.p0.x) - o, a) + w + o;
        for &b in &area.blocks {
            let Some(rect) = self.blocks[b].rect() else { continue };
            if end <= i32::from(rect.p0.x) {
                return u16::try_from(end - w).ok();
            }
            end = align_up(i32::from(rect.p1.x) + 1 - o, a) + w + o;
        }
        if end <= i32::from(area.rect.p1.x) + 1 {
            u16::try_from(end - w).ok()
        } else {
            None
        }
    }

    /// Reserve a fresh area for group `g`.
    pub fn new_area(&mut self, g: Handle<Group>, container: usize, width: u16, height: u16, align: u16) -> Result<Handle<Area>> {
        let rect = self.backends.stores[container].reserve_2d(width, height, align).map_err(|e| {
            debug!("no room for a {width}x{height} area aligned to {align}: {e}");
            TilerError::from(e)
        })?;
        let a = self.areas.insert(Area {
            owner: Owner::Owned(g),
            rect,
            container,
            blocks: Vec::new(),
        });
        self.groups[g].areas.push(a);
        debug!("group {}: new area {rect}", self.groups[g].gid);
        Ok(a)
    }

    /// Create an unlisted block of `width` slots at `left` inside area `a`.
    pub fn add_to_area(&mut self, a: Handle<Area>, left: u16, width: u16, request: &Request, gid: u32) -> Result<Handle<Block>> {
        let area = &self.areas[a];
        let rect = SlotRect::with_size(left, area.rect.p0.y, width, area.rect.height());
        debug_assert!(rect.p1.x <= area.rect.p1.x, "block overflows its area");
        let container = area.container;
        let slots = ContainerArea::Rect(rect);
        let address = self.block_address(request.format, &slots, request.in_offset)?;

        let b = self.blocks.insert(Block {
            key: 0,
            id: 0,
            gid,
            format: request.format,
            width: request.pixel_width,
            height: request.pixel_height,
            area: slots,
            container,
            address,
            refs: 0,
            allocated: false,
            owner: BlockOwner::Area(a),
            listing: Listing::Unlisted,
            backing: Backing::None,
        });

        let blocks = &self.blocks;
        let list = &mut self.areas[a].blocks;
        let at = list.partition_point(|&other| blocks[other].left() < left);
        list.insert(at, b);
        Ok(b)
    }

    /// Take a reserved block of `g` matching `request`, if there is one.
    fn claim_reserved(&mut self, g: Handle<Group>, request: &Request) -> Option<Handle<Block>> {
        let container = self.backends.container_of(request.format);
        let align = request.align.max(1);
        let at = self.groups[g].reserved.iter().position(|&b| {
            let block = &self.blocks[b];
            block.rect().is_some_and(|rect| {
                block.format == request.format
                    && block.container == container
                    && u32::from(rect.height()) == request.height
                    && u32::from(rect.width()) == request.width
                    && u32::from(rect.p0.x) & (align - 1) == request.offset
            })
        })?;
        let candidate = self.groups[g].reserved[at];
        let address = self
            .block_address(request.format, &self.blocks[candidate].area, request.in_offset)
            .ok()?;

        let b = self.groups[g].reserved.remove(at);
        let block = &mut self.blocks[b];
        block.listing = Listing::Unlisted;
        block.width = request.pixel_width;
        block.height = request.pixel_height;
        block.address = address;
        debug!("group {}: claimed reserved block at {}", block.gid, block.area);
        Some(b)
    }

    /// Place a 2D block into group `g`: a matching reserved block, a gap in
    /// an existing area, or a new area, in that order.
    pub fn place_2d(&mut self, g: Handle<Group>, request: &Request) -> Result<Handle<Block>> {
        if let Some(b) = self.claim_reserved(g, request) {
            return Ok(b);
        }

        let gid = self.groups[g].gid;
        let container = self.backends.container_of(request.format);
        let width = request.width_slots()?;
        let height = request.height_slots()?;

        let fit = self.groups[g].areas.iter().copied().find_map(|a| {
            let area = &self.areas[a];
            (area.container == container && area.rect.height() == height)
                .then(|| self.find_fit(area, request.width, request.align, request.offset))
                .flatten()
                .map(|left| (a, left))
        });
        if let Some((a, left)) = fit {
            return self.add_to_area(a, left, width, request, gid);
        }

        let area_align = request.band.max(request.align);
        let area_width = (request.width.next_multiple_of(request.align.max(1)) + request.offset)
            .next_multiple_of(area_align)
            .min(u32::from(CONTAINER_WIDTH));
        let area_width = u16::try_from(area_width).map_err(|_| TilerError::OutOfMemory)?;
        let area_align = u16::try_from(area_align).map_err(|_| TilerError::OutOfMemory)?;
        let offset = u16::try_from(request.offset).map_err(|_| TilerError::OutOfMemory)?;

        let a = self.new_area(g, container, area_width, height, area_align)?;
        let left = self.areas[a].rect.p0.x + offset;
        self.add_to_area(a, left, width, request, gid).inspect_err(|_| self.release_area(a))
    }

    /// Place a linear block into group `g`.
    pub fn place_1d(&mut self, g: Handle<Group>, request: &Request) -> Result<Handle<Block>> {
        let container = self.backends.container_of(request.format);
        let run = self.backends.stores[container].reserve_1d(request.width).map_err(|e| {
            debug!("no room for a {}-slot run: {e}", request.width);
            TilerError::from(e)
        })?;
        let area = ContainerArea::Run(run);
        let address = match self.block_address(request.format, &area, request.in_offset) {
            Ok(address) => address,
            Err(e) => {
                if let Err(err) = self.backends.stores[container].release(&area) {
                    error!("could not return {area}: {err}");
                }
                return Err(e);
            }
        };
        let gid = self.groups[g].gid;

        let b = self.blocks.insert(Block {
            key: 0,
            id: 0,
            gid,
            format: request.format,
            width: request.pixel_width,
            height: request.pixel_height,
            area,
            container,
            address,
            refs: 0,
            allocated: false,
            owner: BlockOwner::Group(g),
            listing: Listing::Unlisted,
            backing: Backing::None,
        });
        self.groups[g].linear.push(b);
        debug!("group {gid}: linear block at {area}");
        Ok(b)
    }

    /// Mark a placed block allocated under `key` and publish it on the global list.
    pub fn publish(&mut self, b: Handle<Block>, key: u32) -> Result<()> {
        let id = if self.config.block_id_is_address {
            self.blocks[b].address.into_bits()
        } else {
            let global = &self.global;
            let blocks = &self.blocks;
            let (state, id) = ids::next_block_id(self.id_state, |id| global.iter().any(|&o| blocks[o].id == id))
                .ok_or(TilerError::OutOfMemory)?;
            self.id_state = state;
            id
        };

        let block = &mut self.blocks[b];
        block.key = key;
        block.id = id;
        block.allocated = true;
        block.refs = 1;
        block.listing = Listing::Global;
        self.global.push(b);
        Ok(())
    }

    /// Allocate a block for `request` in group `gid` of process `p`.
    ///
    /// The returned block is allocated with one reference. On failure nothing
    /// the call created survives.
    pub fn alloc_block(&mut self, p: Handle<Process>, request: &Request, key: u32, gid: u32) -> Result<Handle<Block>> {
        let g = self.get_group(p, gid);
        let placed = if request.format.is_2d() {
            self.place_2d(g, request)
        } else {
            self.place_1d(g, request)
        };

        let result = placed.and_then(|b| match self.publish(b, key) {
            Ok(()) => Ok(b),
            Err(e) => {
                warn!("could not publish block: {e}");
                self.release_block(b);
                Err(e)
            }
        });
        self.put_group(g);
        result
    }
}
