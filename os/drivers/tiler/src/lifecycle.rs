//! Reference counting and teardown of processes, groups, areas and blocks.

use crate::arena::Handle;
use crate::model::{Area, Backing, Block, BlockOwner, Group, Listing, Owner, Process};
use crate::state::State;
use alloc::vec::Vec;
use core::mem;
use log::{debug, error, info, trace, warn};
use tiler_container::ContainerArea;

impl State {
    /// Find or create the context of client `pid` and take an open handle on it.
    ///
    /// With isolation disabled every client maps to identity `0`. The kernel
    /// context is never counted.
    pub fn acquire_process(&mut self, pid: u32, kernel: bool) -> Handle<Process> {
        let pid = if self.config.isolation { pid } else { 0 };
        let found = self
            .processes
            .iter()
            .find(|(_, p)| p.pid == pid && p.kernel == kernel)
            .map(|(h, _)| h);
        let p = found.unwrap_or_else(|| {
            debug!("new {} context {pid}", if kernel { "kernel" } else { "client" });
            self.processes.insert(Process {
                pid,
                kernel,
                refs: 0,
                groups: Vec::new(),
                buffers: Vec::new(),
            })
        });
        if !kernel {
            self.processes[p].refs += 1;
        }
        p
    }

    /// Find or create group `gid` of `p` and pin it for the current operation.
    pub fn get_group(&mut self, p: Handle<Process>, gid: u32) -> Handle<Group> {
        let groups = &self.groups;
        let found = self.processes[p].groups.iter().copied().find(|&g| groups[g].gid == gid);
        let g = found.unwrap_or_else(|| {
            let g = self.groups.insert(Group {
                gid,
                process: p,
                refs: 0,
                areas: Vec::new(),
                linear: Vec::new(),
                reserved: Vec::new(),
            });
            self.processes[p].groups.push(g);
            g
        });
        self.groups[g].refs += 1;
        g
    }

    pub fn put_group(&mut self, g: Handle<Group>) {
        let group = &mut self.groups[g];
        group.refs = group.refs.saturating_sub(1);
        self.try_free_group(g);
    }

    /// Drop `g` if nothing uses it anymore. A kernel context goes with its
    /// last group.
    pub fn try_free_group(&mut self, g: Handle<Group>) {
        if !self.groups.get(g).is_some_and(Group::is_unused) {
            return;
        }
        let Some(group) = self.groups.remove(g) else { return };
        trace!("group {} released", group.gid);

        let p = group.process;
        if let Some(process) = self.processes.get_mut(p) {
            process.groups.retain(|&other| other != g);
            if process.kernel && process.groups.is_empty() && process.buffers.is_empty() {
                self.processes.remove(p);
            }
        }
    }

    /// Return an empty area to its store and unlink it from its owner.
    pub fn release_area(&mut self, a: Handle<Area>) {
        let Some(area) = self.areas.remove(a) else { return };
        debug_assert!(area.blocks.is_empty(), "released an area with live blocks");

        if let Err(e) = self.backends.stores[area.container].release(&ContainerArea::Rect(area.rect)) {
            error!("could not return area {}: {e}", area.rect);
        }
        match area.owner {
            Owner::Owned(g) => {
                self.groups[g].areas.retain(|&other| other != a);
                self.try_free_group(g);
            }
            Owner::Orphaned => self.orphan_areas.retain(|&other| other != a),
        }
    }

    /// Free a block and everything that only it kept alive.
    ///
    /// Clears its translation, gives back its pages, and returns its slots to
    /// the store once its area is empty.
    pub fn release_block(&mut self, b: Handle<Block>) {
        let group = self.group_of(b);
        let Some(mut block) = self.blocks.remove(b) else { return };
        trace!("releasing block {:#x}:{:#x} at {}", block.key, block.id, block.area);

        self.release_backing(&mut block);

        match block.listing {
            Listing::Global => self.global.retain(|&other| other != b),
            Listing::Reserved => {
                if let Some(g) = group {
                    self.groups[g].reserved.retain(|&other| other != b);
                }
            }
            Listing::Unlisted => {}
        }

        match block.owner {
            BlockOwner::Area(a) => {
                let area = &mut self.areas[a];
                area.blocks.retain(|&other| other != b);
                if area.blocks.is_empty() {
                    self.release_area(a);
                }
            }
            BlockOwner::Group(g) => {
                self.return_run(&block);
                self.groups[g].linear.retain(|&other| other != b);
                self.try_free_group(g);
            }
            BlockOwner::Orphaned => {
                self.return_run(&block);
                self.orphan_linear.retain(|&other| other != b);
            }
        }
    }

    fn return_run(&mut self, block: &Block) {
        if let Err(e) = self.backends.stores[block.container].release(&block.area) {
            error!("could not return {}: {e}", block.area);
        }
    }

    /// Clear the translation of a released block and give its pages back
    /// to whoever provided them.
    fn release_backing(&self, block: &mut Block) {
        let backing = mem::take(&mut block.backing);
        if matches!(backing, Backing::None) {
            return;
        }
        if let Some(programmer) = self.backends.programmer(block.format)
            && let Err(e) = programmer.clear(&block.area)
        {
            warn!("could not clear translation of {}: {e}", block.area);
        }
        match backing {
            Backing::None => {}
            Backing::Pages(pages) => {
                if let Some(programmer) = self.backends.programmer(block.format) {
                    programmer.free_pages(pages);
                }
            }
            Backing::Pinned(pinned) => {
                if let Some(pinner) = &self.backends.pinner {
                    pinner.unpin(pinned);
                }
            }
        }
    }

    /// Drop the allocation of `b` and release it once unreferenced.
    pub fn try_free(&mut self, b: Handle<Block>) {
        let Some(block) = self.blocks.get_mut(b) else { return };
        if block.allocated {
            block.allocated = false;
            block.refs = block.refs.saturating_sub(1);
        }
        if block.refs == 0 {
            self.release_block(b);
        }
    }

    /// Drop one non-owning reference to `b`.
    pub fn drop_ref(&mut self, b: Handle<Block>) {
        let Some(block) = self.blocks.get_mut(b) else { return };
        block.refs = block.refs.saturating_sub(1);
        if block.refs == 0 && !block.allocated {
            self.release_block(b);
        }
    }

    /// Release one open handle on `p`; the last one tears the context down.
    pub fn close(&mut self, p: Handle<Process>) {
        let Some(process) = self.processes.get_mut(p) else { return };
        process.refs = process.refs.saturating_sub(1);
        if process.refs == 0 {
            self.tear_down_process(p);
        }
    }

    /// Free everything `p` owns. Blocks other contexts still reference
    /// survive as orphans.
    pub fn tear_down_process(&mut self, p: Handle<Process>) {
        let Some(process) = self.processes.get_mut(p) else { return };
        info!("tearing down context {}", process.pid);
        let buffers = mem::take(&mut process.buffers);
        for buffer in buffers {
            for b in buffer.blocks {
                self.drop_ref(b);
            }
        }

        let groups = self.processes.get(p).map(|p| p.groups.clone()).unwrap_or_default();
        for g in groups {
            self.destroy_group(g);
        }
        self.processes.remove(p);
    }

    fn destroy_group(&mut self, g: Handle<Group>) {
        // Keeps the group alive while its last blocks go.
        self.groups[g].refs += 1;

        for a in self.groups[g].areas.clone() {
            for b in self.areas[a].blocks.clone() {
                self.try_free(b);
            }
            if let Some(area) = self.areas.get_mut(a) {
                debug!("orphaning area {}", area.rect);
                area.owner = Owner::Orphaned;
                self.groups[g].areas.retain(|&other| other != a);
                self.orphan_areas.push(a);
            }
        }

        for b in self.groups[g].linear.clone() {
            self.try_free(b);
            if let Some(block) = self.blocks.get_mut(b) {
                debug!("orphaning linear block at {}", block.area);
                block.owner = BlockOwner::Orphaned;
                self.orphan_linear.push(b);
            }
        }

        if let Some(group) = self.groups.remove(g) {
            debug_assert!(group.reserved.is_empty(), "reserved blocks outlived their group");
            if let Some(process) = self.processes.get_mut(group.process) {
                process.groups.retain(|&other| other != g);
            }
        }
    }

    /// Tear down every context.
    pub fn shutdown(&mut self) {
        for p in self.processes.handles() {
            self.tear_down_process(p);
        }
        if !self.orphan_areas.is_empty() || !self.orphan_linear.is_empty() {
            warn!(
                "{} areas and {} linear blocks outlived every context",
                self.orphan_areas.len(),
                self.orphan_linear.len()
            );
        }
    }
}
