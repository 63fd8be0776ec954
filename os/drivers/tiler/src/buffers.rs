//! Buffers: up to four blocks published under one mappable offset.

use crate::BufferInfo;
use crate::arena::Handle;
use crate::error::{Result, TilerError};
use crate::ids;
use crate::model::{Block, Buffer, Process};
use crate::state::State;
use alloc::vec::Vec;
use log::debug;
use tiler_info::defaults::MAX_BUFFER_BLOCKS;

impl State {
    /// Group the blocks named by `(key, id)` into a buffer of `p`.
    ///
    /// Each block gains one reference for as long as the buffer exists.
    ///
    /// # Errors
    /// - [`TilerError::InvalidArgument`] for zero or more than four blocks.
    /// - [`TilerError::NotFound`] if a block does not exist or is not allocated.
    /// - [`TilerError::OutOfMemory`] if no free offset range is left.
    pub fn register_buffer(&mut self, p: Handle<Process>, blocks: &[(u32, u32)]) -> Result<BufferInfo> {
        if blocks.is_empty() || blocks.len() > MAX_BUFFER_BLOCKS {
            return Err(TilerError::InvalidArgument("a buffer holds one to four blocks"));
        }

        let mut taken: Vec<Handle<Block>> = Vec::with_capacity(blocks.len());
        for &(key, id) in blocks {
            match self.find_block(key, id).filter(|&b| self.blocks[b].allocated) {
                Some(b) => {
                    self.blocks[b].refs += 1;
                    taken.push(b);
                }
                None => {
                    debug!("buffer names unknown block {key:#x}:{id:#x}");
                    self.drop_refs(&taken);
                    return Err(TilerError::NotFound);
                }
            }
        }

        let total = taken.iter().try_fold(0u32, |sum, &b| {
            let block = &self.blocks[b];
            sum.checked_add(self.geom.size(block.address, block.width, block.height))
        });
        let Some(total) = total else {
            self.drop_refs(&taken);
            return Err(TilerError::OutOfMemory);
        };

        let buffers = &self.processes[p].buffers;
        let Some((state, base)) =
            ids::next_buffer_offset(self.offset_state, total, |base, span| buffers.iter().any(|b| b.overlaps(base, span)))
        else {
            self.drop_refs(&taken);
            return Err(TilerError::OutOfMemory);
        };
        self.offset_state = state;

        let page_offset = self.blocks[taken[0]].address.page_offset();
        let buffer = Buffer {
            base,
            span: total,
            offset: base + page_offset,
            length: total.saturating_sub(page_offset),
            blocks: taken,
        };
        debug!("buffer at {:#x}+{:#x} over {} blocks", buffer.offset, buffer.length, buffer.blocks.len());
        let info = self.buffer_info(&buffer);
        self.processes[p].buffers.push(buffer);
        Ok(info)
    }

    /// Remove the buffer of `p` registered at `offset`.
    ///
    /// # Errors
    /// [`TilerError::NotFound`] if `p` has no buffer at `offset`.
    pub fn unregister_buffer(&mut self, p: Handle<Process>, offset: u32) -> Result<()> {
        let buffers = &mut self.processes[p].buffers;
        let at = buffers.iter().position(|b| b.offset == offset).ok_or(TilerError::NotFound)?;
        let buffer = buffers.remove(at);
        self.drop_refs(&buffer.blocks);
        Ok(())
    }

    /// Buffer of `p` whose range covers `offset..offset + length`.
    pub fn find_buffer(&self, p: Handle<Process>, offset: u32, length: u32) -> Option<BufferInfo> {
        let end = offset.checked_add(length)?;
        self.processes[p]
            .buffers
            .iter()
            .find(|b| b.offset <= offset && end <= b.offset + b.length)
            .map(|b| self.buffer_info(b))
    }

    pub fn buffers(&self, p: Handle<Process>) -> Vec<BufferInfo> {
        self.processes[p].buffers.iter().map(|b| self.buffer_info(b)).collect()
    }

    fn buffer_info(&self, buffer: &Buffer) -> BufferInfo {
        BufferInfo {
            offset: buffer.offset,
            length: buffer.length,
            blocks: buffer.blocks.iter().filter_map(|&b| self.info(b)).collect(),
        }
    }

    fn drop_refs(&mut self, blocks: &[Handle<Block>]) {
        for &b in blocks {
            self.drop_ref(b);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::state_with_grid;
    use tiler_geom::TilerFormat;

    #[test]
    fn listings_skip_released_blocks() {
        let mut state = state_with_grid();
        let p = state.acquire_process(1, false);
        let r = state.analyze(TilerFormat::Bit8, 64, 64, 64, 0).unwrap();
        let b = state.alloc_block(p, &r, 0, 0).unwrap();
        let (key, id) = (state.blocks[b].key, state.blocks[b].id);
        let buffer = state.register_buffer(p, &[(key, id)]).unwrap();

        state.release_block(b);
        let listed = state.buffers(p);
        assert_eq!(listed.len(), 1);
        assert!(listed[0].blocks.is_empty());
        assert!(state.find_buffer(p, buffer.offset, 1).is_some_and(|found| found.blocks.is_empty()));
    }
}
