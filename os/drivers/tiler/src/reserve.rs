//! Pre-reservation: laying out blocks ahead of the requests that claim them.

use crate::arena::Handle;
use crate::error::{Result, TilerError};
use crate::model::{Block, Group, Listing, Process};
use crate::nv12::{self, BAND_8, BAND_16, Nv12Plan};
use crate::request::Request;
use crate::state::State;
use alloc::vec::Vec;
use log::{debug, info};
use tiler_geom::TilerFormat;
use tiler_info::container::{CONTAINER_HEIGHT, CONTAINER_WIDTH, PAGE_SIZE};

fn slots(value: u32) -> Result<u16> {
    u16::try_from(value).map_err(|_| TilerError::InvalidArgument("request exceeds the container"))
}

impl State {
    /// Reserved-block geometry for `request`: its pixel size is the whole of
    /// the slots it covers until a request claims it.
    fn slot_sized(&self, request: &Request) -> Request {
        let g = self.geom.format(request.format);
        Request {
            in_offset: 0,
            pixel_width: request.width * g.slot_width,
            pixel_height: request.height * g.slot_height,
            ..*request
        }
    }

    fn park(&mut self, g: Handle<Group>, b: Handle<Block>) {
        self.blocks[b].listing = Listing::Reserved;
        self.groups[g].reserved.push(b);
    }

    fn unlay(&mut self, laid: &[Handle<Block>]) {
        for &b in laid {
            self.release_block(b);
        }
    }

    /// Lay `n` blocks of `request` side by side into one new area of `g`,
    /// each at `offset` modulo `align`, and park them on the reserved list.
    ///
    /// All or nothing.
    pub fn lay_2d(&mut self, g: Handle<Group>, request: &Request, n: u16) -> Result<Vec<Handle<Block>>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let layout = self.slot_sized(request);
        let (w, a, o) = (request.width, request.align.max(1), request.offset);
        let step = w.next_multiple_of(a);
        let used = (u32::from(n) - 1) * step + w;
        let area_align = request.band.max(a);
        let area_width = (o + used).next_multiple_of(area_align);
        if area_width > u32::from(CONTAINER_WIDTH) {
            return Err(TilerError::OutOfMemory);
        }

        let container = self.backends.container_of(request.format);
        let area = self.new_area(g, container, slots(area_width)?, request.height_slots()?, slots(area_align)?)?;
        let left = u32::from(self.areas[area].rect.p0.x) + o;
        let (width, gid) = (request.width_slots()?, self.groups[g].gid);

        let mut laid = Vec::with_capacity(usize::from(n));
        for k in 0..u32::from(n) {
            match self.add_to_area(area, slots(left + k * step)?, width, &layout, gid) {
                Ok(b) => {
                    self.park(g, b);
                    laid.push(b);
                }
                Err(e) => {
                    self.unlay(&laid);
                    self.release_area(area);
                    return Err(e);
                }
            }
        }
        Ok(laid)
    }

    /// Lay the pairs of `plan` into one new area of `g`.
    fn lay_nv12(&mut self, g: Handle<Group>, plan: &Nv12Plan, luma: &Request, chroma: &Request) -> Result<usize> {
        let container = self.backends.container_of(TilerFormat::Bit8);
        let area = self.new_area(g, container, plan.area, luma.height_slots()?, BAND_8)?;
        let x0 = self.areas[area].rect.p0.x;
        let (luma_layout, chroma_layout) = (self.slot_sized(luma), self.slot_sized(chroma));
        let (luma_width, chroma_width) = (luma.width_slots()?, chroma.width_slots()?);
        let gid = self.groups[g].gid;

        let mut laid = Vec::with_capacity(plan.coords.len() * 2);
        for &(l, c) in &plan.coords {
            let pair = self
                .add_to_area(area, x0 + l, luma_width, &luma_layout, gid)
                .and_then(|y| {
                    laid.push(y);
                    self.add_to_area(area, x0 + c, chroma_width, &chroma_layout, gid)
                });
            match pair {
                Ok(uv) => laid.push(uv),
                Err(e) => {
                    self.unlay(&laid);
                    self.release_area(area);
                    return Err(e);
                }
            }
        }
        for &b in &laid {
            self.park(g, b);
        }
        Ok(plan.coords.len())
    }

    /// Reserve up to `n` blocks of `request` in group `gid` of `p`.
    ///
    /// Returns how many were reserved; those stay reserved even when fewer
    /// than `n` fit.
    ///
    /// # Errors
    /// [`TilerError::InvalidArgument`] for the page format.
    pub fn reserve(&mut self, p: Handle<Process>, n: usize, request: &Request, gid: u32) -> Result<usize> {
        if !request.format.is_2d() {
            return Err(TilerError::InvalidArgument("only 2D blocks can be reserved"));
        }
        let (o, a, band, w) = (slots(request.offset)?, slots(request.align)?, slots(request.band)?, request.width_slots()?);
        let bpp = self.geom.format(request.format).bpp;

        let g = self.get_group(p, gid);
        if request.pixel_width.saturating_mul(bpp).saturating_mul(2) <= PAGE_SIZE {
            debug!("{}px wide blocks are not worth reserving", request.pixel_width);
            self.put_group(g);
            return Ok(0);
        }
        let mut done = 0;
        while done < n {
            let wanted = u16::try_from((n - done).min(usize::from(CONTAINER_WIDTH))).unwrap_or(CONTAINER_WIDTH);
            let mut count = nv12::best_pack(o, a, band, w, wanted).count;
            let mut laid = 0;
            while count > 1 {
                if let Ok(blocks) = self.lay_2d(g, request, count) {
                    laid = blocks.len();
                    break;
                }
                count -= 1;
            }
            if laid == 0 {
                break;
            }
            done += laid;
        }
        self.put_group(g);
        info!("reserved {done} of {n} {:?} blocks in group {gid}", request.format);
        Ok(done)
    }

    /// Reserve up to `n` luma/chroma pairs for `luma` in group `gid` of `p`.
    ///
    /// `luma` is the analyzed 8-bit request and `chroma` the matching 16-bit
    /// one. Each round picks the better of two separate areas and one shared
    /// area.
    pub fn reserve_nv12(&mut self, p: Handle<Process>, n: usize, luma: &Request, chroma: &Request, gid: u32) -> Result<usize> {
        if n == 0 || n > usize::from(CONTAINER_WIDTH) * usize::from(CONTAINER_HEIGHT) / 2 {
            return Err(TilerError::InvalidArgument("pair count out of range"));
        }
        let (o, a, w) = (slots(luma.offset)?, slots(luma.align)?, luma.width_slots()?);
        let packing = self.config.nv12_packing
            && self.backends.container_of(TilerFormat::Bit8) == self.backends.container_of(TilerFormat::Bit16);

        let separate_luma = Request { band: u32::from(BAND_8), ..*luma };
        let separate_chroma = Request {
            width: u32::from(w.div_ceil(2)),
            align: u32::from((a >> 1).max(1)),
            offset: u32::from(o >> 1),
            band: u32::from(BAND_16),
            ..*chroma
        };
        let paired_chroma = Request { width: u32::from(w.div_ceil(2)), ..*chroma };

        let g = self.get_group(p, gid);
        let mut done = 0;
        while done < n {
            let wanted = u16::try_from(n - done).unwrap_or(u16::MAX);
            let split = nv12::separate(o, a, w, wanted);
            let shared = if packing {
                nv12::together(o, a, w, wanted, self.config.nv12_templates)
            } else {
                Nv12Plan::default()
            };
            let split_score = nv12::score(split.count, w, split.area, wanted);
            let shared_score = nv12::score(shared.count(), w, shared.area, wanted);

            let mut laid = 0;
            if split.count > 0 && (!packing || split_score > shared_score) {
                laid = self.lay_separate(g, &separate_luma, &separate_chroma, split.count);
            }
            if laid == 0 && !shared.coords.is_empty() {
                laid = self.lay_nv12(g, &shared, luma, &paired_chroma).unwrap_or(0);
            }
            if laid == 0 {
                break;
            }
            done += laid;
        }
        self.put_group(g);
        info!("reserved {done} of {n} NV12 pairs in group {gid}");
        Ok(done)
    }

    /// Lay `count` luma blocks and `count` chroma blocks into two areas.
    /// Both halves or neither.
    fn lay_separate(&mut self, g: Handle<Group>, luma: &Request, chroma: &Request, count: u16) -> usize {
        let Ok(y) = self.lay_2d(g, luma, count) else { return 0 };
        match self.lay_2d(g, chroma, count) {
            Ok(_) => y.len(),
            Err(e) => {
                debug!("no room for {count} chroma blocks: {e}");
                self.unlay(&y);
                0
            }
        }
    }

    /// Free every block still reserved in group `gid` of `p`.
    pub fn unreserve(&mut self, p: Handle<Process>, gid: u32) {
        let groups = &self.groups;
        let Some(g) = self.processes[p].groups.iter().copied().find(|&g| groups[g].gid == gid) else {
            return;
        };
        let reserved = self.groups[g].reserved.clone();
        debug!("group {gid}: dropping {} reserved blocks", reserved.len());
        // Pinned so the group survives until every block is gone.
        self.groups[g].refs += 1;
        self.unlay(&reserved);
        self.put_group(g);
    }
}
