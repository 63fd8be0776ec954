use crate::arena::Handle;
use crate::config::TilerConfig;
use crate::error::{Result, TilerError};
use crate::model::{Backing, Block, Process};
use crate::state::{Backends, State};
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use log::{debug, info, warn};
use spin::Mutex;
use tiler_container::{ContainerArea, ContainerStore, PagePinner, PageTableProgrammer};
use tiler_geom::{Orientation, TilerAddress, TilerFormat};
use tiler_info::container::{CONTAINER_HEIGHT, CONTAINER_WIDTH, PAGE_SIZE};

/// An open client context.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ProcessHandle(Handle<Process>);

/// On whose behalf an operation runs.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Caller {
    /// In-driver users. Share one untracked context and pass every ownership check.
    Kernel,
    Process(ProcessHandle),
}

impl From<ProcessHandle> for Caller {
    fn from(handle: ProcessHandle) -> Self {
        Self::Process(handle)
    }
}

/// A block held by [`Tiler::lock_block`].
///
/// Unlocking consumes the handle, so each lock is dropped once:
///
/// ```compile_fail
/// # use tiler::{AllocRequest, Caller, Tiler};
/// # use tiler_container::GridStore;
/// # use tiler_geom::TilerFormat;
/// let tiler = Tiler::builder().store(GridStore::new(), &TilerFormat::ALL).build().unwrap();
/// let a = tiler.alloc(Caller::Kernel, &AllocRequest::new(TilerFormat::Bit8, 64, 64)).unwrap();
/// let lock = tiler.lock_block(a.key, a.id).unwrap();
/// tiler.unlock_block(lock, false);
/// tiler.unlock_block(lock, false);
/// ```
#[derive(Debug, Eq, PartialEq)]
pub struct BlockHandle(Handle<Block>);

/// `(key, id)` pair naming a block.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BlockRef {
    pub key: u32,
    pub id: u32,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AllocRequest {
    pub format: TilerFormat,
    /// Pixels; bytes for [`TilerFormat::Page`].
    pub width: u32,
    pub height: u32,
    /// Bytes. `0` selects the configured default.
    pub align: u32,
    /// Bytes from the alignment boundary to the first pixel.
    pub offset: u32,
    pub key: u32,
    pub group: u32,
}

impl AllocRequest {
    #[must_use]
    pub const fn new(format: TilerFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            align: 0,
            offset: 0,
            key: 0,
            group: 0,
        }
    }

    #[must_use]
    pub const fn aligned(mut self, align: u32, offset: u32) -> Self {
        self.align = align;
        self.offset = offset;
        self
    }

    #[must_use]
    pub const fn keyed(mut self, key: u32, group: u32) -> Self {
        self.key = key;
        self.group = group;
        self
    }
}

/// A luma/chroma pair: `width × height` 8-bit pixels plus half-size 16-bit ones.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Nv12Request {
    pub width: u32,
    pub height: u32,
    pub align: u32,
    pub offset: u32,
    pub key: u32,
    pub group: u32,
}

impl Nv12Request {
    const fn luma(&self) -> AllocRequest {
        AllocRequest {
            format: TilerFormat::Bit8,
            width: self.width,
            height: self.height,
            align: self.align,
            offset: self.offset,
            key: self.key,
            group: self.group,
        }
    }

    const fn chroma(&self) -> AllocRequest {
        AllocRequest {
            format: TilerFormat::Bit16,
            width: self.width.div_ceil(2),
            height: self.height.div_ceil(2),
            ..self.luma()
        }
    }
}

/// Snapshot of a block.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BlockInfo {
    pub format: TilerFormat,
    pub key: u32,
    pub id: u32,
    pub group: u32,
    pub width: u32,
    pub height: u32,
    /// Natural-view address of the first pixel.
    pub address: TilerAddress,
    pub stride: u32,
    pub physical_stride: u32,
    pub virtual_stride: u32,
    /// Bytes needed to map the block.
    pub size: u32,
    pub area: ContainerArea,
    pub refs: u32,
    pub allocated: bool,
}

impl BlockInfo {
    #[must_use]
    pub const fn block_ref(&self) -> BlockRef {
        BlockRef { key: self.key, id: self.id }
    }
}

/// Snapshot of a registered buffer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BufferInfo {
    /// Mapping offset of the first block's first pixel.
    pub offset: u32,
    pub length: u32,
    pub blocks: Vec<BlockInfo>,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Stats {
    pub processes: usize,
    pub groups: usize,
    pub areas: usize,
    /// Blocks on the global list.
    pub blocks: usize,
    pub reserved_blocks: usize,
    pub buffers: usize,
    pub orphaned_areas: usize,
    pub orphaned_blocks: usize,
}

/// Assembles a [`Tiler`] from its collaborators.
pub struct TilerBuilder {
    config: TilerConfig,
    stores: Vec<Box<dyn ContainerStore + Send>>,
    store_of: [Option<usize>; 4],
    programmers: Vec<Arc<dyn PageTableProgrammer>>,
    programmer_of: [Option<usize>; 4],
    pinner: Option<Arc<dyn PagePinner>>,
}

impl Default for TilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TilerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: TilerConfig::default(),
            stores: Vec::new(),
            store_of: [None; 4],
            programmers: Vec::new(),
            programmer_of: [None; 4],
            pinner: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: TilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Serve `formats` from `store`. Formats sharing a store share its grid.
    #[must_use]
    pub fn store(mut self, store: impl ContainerStore + Send + 'static, formats: &[TilerFormat]) -> Self {
        let index = self.stores.len();
        self.stores.push(Box::new(store));
        for format in formats {
            self.store_of[format.index()] = Some(index);
        }
        self
    }

    #[must_use]
    pub fn programmer(mut self, programmer: Arc<dyn PageTableProgrammer>, formats: &[TilerFormat]) -> Self {
        let index = self.programmers.len();
        self.programmers.push(programmer);
        for format in formats {
            self.programmer_of[format.index()] = Some(index);
        }
        self
    }

    #[must_use]
    pub fn pinner(mut self, pinner: Arc<dyn PagePinner>) -> Self {
        self.pinner = Some(pinner);
        self
    }

    /// # Errors
    /// [`TilerError::InvalidArgument`] if a format has no store, or the
    /// granularity or default alignment is not a power of two up to a page.
    pub fn build(self) -> Result<Tiler> {
        let valid = |bytes: u32| bytes.is_power_of_two() && bytes <= PAGE_SIZE;
        if !valid(self.config.granularity) || !valid(self.config.default_alignment) {
            return Err(TilerError::InvalidArgument("granularity and alignment must be powers of two up to a page"));
        }

        let mut store_of = [0; 4];
        for format in TilerFormat::ALL {
            store_of[format.index()] = self.store_of[format.index()]
                .ok_or(TilerError::InvalidArgument("every format needs a container store"))?;
        }

        info!(
            "tiler ready: {} stores, {} page table programmers, pinning {}",
            self.stores.len(),
            self.programmers.len(),
            if self.pinner.is_some() { "enabled" } else { "disabled" }
        );
        let backends = Backends {
            stores: self.stores,
            store_of,
            programmers: self.programmers,
            programmer_of: self.programmer_of,
            pinner: self.pinner,
        };
        Ok(Tiler {
            state: Mutex::new(State::new(self.config, backends)),
        })
    }
}

/// The container allocator.
///
/// All bookkeeping sits behind one lock. Page allocation, page table commits
/// and user page pinning run with the lock released; the block being backed
/// holds an extra reference meanwhile.
pub struct Tiler {
    state: Mutex<State>,
}

fn resolve(state: &mut State, caller: Caller) -> Result<Handle<Process>> {
    match caller {
        Caller::Kernel => Ok(state.acquire_process(0, true)),
        Caller::Process(ProcessHandle(p)) if state.processes.contains(p) => Ok(p),
        Caller::Process(_) => Err(TilerError::NotFound),
    }
}

fn existing(state: &State, p: ProcessHandle) -> Result<Handle<Process>> {
    if state.processes.contains(p.0) {
        Ok(p.0)
    } else {
        Err(TilerError::NotFound)
    }
}

fn back_with_pages(mapper: &dyn PageTableProgrammer, area: &ContainerArea) -> Result<Backing> {
    let pages = mapper.allocate_pages(area.slots() as usize)?;
    if let Err(e) = mapper.commit(area, &pages) {
        warn!("could not commit {area}: {e}");
        mapper.free_pages(pages);
        return Err(e.into());
    }
    Ok(Backing::Pages(pages))
}

fn back_with_user_pages(
    pinner: &dyn PagePinner,
    mapper: &dyn PageTableProgrammer,
    user_address: u64,
    area: &ContainerArea,
) -> Result<Backing> {
    let pinned = pinner.pin(user_address, area.slots() as usize)?;
    if let Err(e) = mapper.commit(area, &pinned.pages) {
        warn!("could not commit pinned pages to {area}: {e}");
        pinner.unpin(pinned);
        return Err(e.into());
    }
    Ok(Backing::Pinned(pinned))
}

impl Tiler {
    #[must_use]
    pub fn builder() -> TilerBuilder {
        TilerBuilder::new()
    }

    /// Open a handle on the context of client `pid`.
    pub fn open(&self, pid: u32) -> ProcessHandle {
        ProcessHandle(self.state.lock().acquire_process(pid, false))
    }

    /// Close a handle from [`open`](Self::open). Closing the last one frees
    /// everything the client still owns.
    ///
    /// # Errors
    /// [`TilerError::NotFound`] if the context is already gone.
    pub fn close(&self, process: ProcessHandle) -> Result<()> {
        let mut state = self.state.lock();
        let p = existing(&state, process)?;
        state.close(p);
        Ok(())
    }

    /// Allocate a block. Formats with a page table programmer that can map
    /// them come back with physical pages committed.
    ///
    /// # Errors
    /// - [`TilerError::InvalidArgument`] for malformed requests.
    /// - [`TilerError::OutOfMemory`] if no slots or pages are left.
    /// - [`TilerError::NotFound`] if the caller's context is gone.
    pub fn alloc(&self, caller: Caller, request: &AllocRequest) -> Result<BlockInfo> {
        let (b, mapper, area) = {
            let mut state = self.state.lock();
            let analyzed = state.analyze(request.format, request.width, request.height, request.align, request.offset)?;
            let p = resolve(&mut state, caller)?;
            let b = state.alloc_block(p, &analyzed, request.key, request.group)?;
            let Some(mapper) = state.backends.mapper(request.format) else {
                return state.info(b).ok_or(TilerError::NotFound);
            };
            state.blocks[b].refs += 1;
            (b, mapper, state.blocks[b].area)
        };

        let backing = back_with_pages(mapper.as_ref(), &area);
        self.state.lock().finish_backing(b, backing)
    }

    /// Allocate an NV12 pair: an 8-bit luma block and a half-size 16-bit
    /// chroma block under the same key and group.
    ///
    /// # Errors
    /// As [`alloc`](Self::alloc); the luma block is released if the chroma
    /// block cannot be allocated.
    pub fn alloc_nv12(&self, caller: Caller, request: &Nv12Request) -> Result<(BlockInfo, BlockInfo)> {
        let luma = self.alloc(caller, &request.luma())?;
        match self.alloc(caller, &request.chroma()) {
            Ok(chroma) => Ok((luma, chroma)),
            Err(e) => {
                debug!("chroma allocation failed, dropping luma {:#x}:{:#x}", luma.key, luma.id);
                let mut state = self.state.lock();
                if let Some(b) = state.find_block(luma.key, luma.id) {
                    state.try_free(b);
                }
                Err(e)
            }
        }
    }

    /// Map `length` bytes of user memory at `user_address` through a linear block.
    ///
    /// # Errors
    /// - [`TilerError::AccessDenied`] without a pinner and a page-format
    ///   programmer, or if the pages cannot be pinned.
    /// - Otherwise as [`alloc`](Self::alloc).
    pub fn map_user(&self, caller: Caller, user_address: u64, length: u32, key: u32, group: u32) -> Result<BlockInfo> {
        let page_mask = u64::from(PAGE_SIZE - 1);
        let (b, pinner, mapper, area) = {
            let mut state = self.state.lock();
            let (Some(pinner), Some(mapper)) = (state.backends.pinner.clone(), state.backends.mapper(TilerFormat::Page))
            else {
                return Err(TilerError::AccessDenied);
            };
            let in_page = u32::try_from(user_address & page_mask).unwrap_or_default();
            let analyzed = state.analyze(TilerFormat::Page, length, 1, 0, in_page)?;
            let p = resolve(&mut state, caller)?;
            let b = state.alloc_block(p, &analyzed, key, group)?;
            state.blocks[b].refs += 1;
            (b, pinner, mapper, state.blocks[b].area)
        };

        let backing = back_with_user_pages(pinner.as_ref(), mapper.as_ref(), user_address & !page_mask, &area);
        self.state.lock().finish_backing(b, backing)
    }

    /// Release the allocation of block `(key, id)`. The block lives on while
    /// buffers or locks still reference it.
    ///
    /// # Errors
    /// - [`TilerError::NotFound`] if there is no such allocated block.
    /// - [`TilerError::AccessDenied`] if another client owns it and isolation is on.
    pub fn free(&self, caller: Caller, key: u32, id: u32) -> Result<()> {
        let mut state = self.state.lock();
        let b = state.find_block(key, id).ok_or(TilerError::NotFound)?;
        if !state.blocks[b].allocated {
            return Err(TilerError::NotFound);
        }
        if let Caller::Process(process) = caller {
            let p = existing(&state, process)?;
            if state.config.isolation && state.process_of(b) != Some(p) {
                return Err(TilerError::AccessDenied);
            }
        }
        state.try_free(b);
        Ok(())
    }

    /// Take a reference on block `(key, id)`.
    ///
    /// # Errors
    /// [`TilerError::NotFound`] if there is no such block.
    pub fn lock_block(&self, key: u32, id: u32) -> Result<BlockHandle> {
        let mut state = self.state.lock();
        let b = state.find_block(key, id).ok_or(TilerError::NotFound)?;
        state.blocks[b].refs += 1;
        Ok(BlockHandle(b))
    }

    /// Drop the reference from [`lock_block`](Self::lock_block), and with
    /// `free` also the block's allocation.
    pub fn unlock_block(&self, handle: BlockHandle, free: bool) {
        let mut state = self.state.lock();
        let Some(block) = state.blocks.get_mut(handle.0) else { return };
        if free && block.allocated {
            block.allocated = false;
            block.refs = block.refs.saturating_sub(1);
        }
        state.drop_ref(handle.0);
    }

    /// # Errors
    /// [`TilerError::NotFound`] if there is no such block.
    pub fn describe(&self, key: u32, id: u32) -> Result<BlockInfo> {
        let state = self.state.lock();
        let b = state.find_block(key, id).ok_or(TilerError::NotFound)?;
        state.info(b).ok_or(TilerError::NotFound)
    }

    /// Block containing `address`, in any orientation.
    ///
    /// # Errors
    /// [`TilerError::NotFound`] if no block covers the address.
    pub fn query(&self, address: TilerAddress) -> Result<BlockInfo> {
        let state = self.state.lock();
        let b = state.find_by_address(address).ok_or(TilerError::NotFound)?;
        state.info(b).ok_or(TilerError::NotFound)
    }

    /// Block behind physical alias address `phys`.
    ///
    /// # Errors
    /// [`TilerError::NotFound`] if `phys` is outside the alias window or no
    /// block covers it.
    pub fn query_alias(&self, phys: u64) -> Result<BlockInfo> {
        let address = TilerAddress::from_alias(phys).ok_or(TilerError::NotFound)?;
        self.query(address)
    }

    /// Address of the top-left pixel of block `(key, id)` seen through `orientation`.
    ///
    /// # Errors
    /// [`TilerError::NotFound`] if there is no such block, or
    /// [`TilerError::InvalidArgument`] for a rotated view of a linear block.
    pub fn view(&self, key: u32, id: u32, orientation: Orientation) -> Result<TilerAddress> {
        let state = self.state.lock();
        let b = state.find_block(key, id).ok_or(TilerError::NotFound)?;
        let block = &state.blocks[b];
        if !block.format.is_2d() && !orientation.is_natural() {
            return Err(TilerError::InvalidArgument("linear blocks have no rotated views"));
        }
        state
            .geom
            .reorient_topleft(block.address, orientation, block.width, block.height)
            .ok_or(TilerError::InvalidArgument("view leaves the container"))
    }

    /// Publish up to four blocks as one mappable buffer of `process`.
    ///
    /// Every block gains a reference for as long as the buffer exists.
    ///
    /// # Errors
    /// - [`TilerError::InvalidArgument`] for zero or more than four blocks.
    /// - [`TilerError::NotFound`] if a block is missing or no longer allocated.
    /// - [`TilerError::OutOfMemory`] if the context has no offset range left.
    pub fn register_buffer(&self, process: ProcessHandle, blocks: &[BlockRef]) -> Result<BufferInfo> {
        let mut state = self.state.lock();
        let p = existing(&state, process)?;
        let refs: Vec<(u32, u32)> = blocks.iter().map(|r| (r.key, r.id)).collect();
        state.register_buffer(p, &refs)
    }

    /// # Errors
    /// [`TilerError::NotFound`] if `process` has no buffer at `offset`.
    pub fn unregister_buffer(&self, process: ProcessHandle, offset: u32) -> Result<()> {
        let mut state = self.state.lock();
        let p = existing(&state, process)?;
        state.unregister_buffer(p, offset)
    }

    /// Buffer of `process` covering `offset..offset + length`.
    ///
    /// # Errors
    /// [`TilerError::NotFound`] if no buffer covers the range.
    pub fn find_buffer(&self, process: ProcessHandle, offset: u32, length: u32) -> Result<BufferInfo> {
        let state = self.state.lock();
        let p = existing(&state, process)?;
        state.find_buffer(p, offset, length).ok_or(TilerError::NotFound)
    }

    /// # Errors
    /// [`TilerError::NotFound`] if the context is gone.
    pub fn buffers(&self, process: ProcessHandle) -> Result<Vec<BufferInfo>> {
        let state = self.state.lock();
        let p = existing(&state, process)?;
        Ok(state.buffers(p))
    }

    /// Lay out up to `n` blocks shaped like `request` ahead of time. Later
    /// allocations of the same shape in the same group claim them.
    ///
    /// # Errors
    /// [`TilerError::InvalidArgument`] for malformed or linear requests.
    pub fn reserve(&self, caller: Caller, n: usize, request: &AllocRequest) -> Result<usize> {
        let mut state = self.state.lock();
        if !request.format.is_2d() {
            return Err(TilerError::InvalidArgument("only 2D blocks can be reserved"));
        }
        let analyzed = state.analyze(request.format, request.width, request.height, request.align, request.offset)?;
        let p = resolve(&mut state, caller)?;
        state.reserve(p, n, &analyzed, request.group)
    }

    /// Lay out up to `n` NV12 pairs ahead of time.
    ///
    /// # Errors
    /// [`TilerError::InvalidArgument`] for an empty request, an odd offset,
    /// an offset at or past the alignment, an alignment of a page or more,
    /// or too many pairs.
    pub fn reserve_nv12(&self, caller: Caller, n: usize, request: &Nv12Request) -> Result<usize> {
        if request.width == 0 || request.height == 0 {
            return Err(TilerError::InvalidArgument("empty request"));
        }
        if n == 0 || n > usize::from(CONTAINER_WIDTH) * usize::from(CONTAINER_HEIGHT) / 2 {
            return Err(TilerError::InvalidArgument("pair count out of range"));
        }
        if request.offset & 1 != 0 || request.offset >= request.align || request.align >= PAGE_SIZE {
            return Err(TilerError::InvalidArgument("bad NV12 alignment or offset"));
        }

        let mut state = self.state.lock();
        let (luma, chroma) = (request.luma(), request.chroma());
        let luma = state.analyze(luma.format, luma.width, luma.height, luma.align, luma.offset)?;
        let chroma = state.analyze(chroma.format, chroma.width, chroma.height, chroma.align, chroma.offset)?;
        let p = resolve(&mut state, caller)?;
        state.reserve_nv12(p, n, &luma, &chroma, request.group)
    }

    /// Free every block still reserved in `group`.
    pub fn unreserve(&self, caller: Caller, group: u32) {
        let mut state = self.state.lock();
        let p = match caller {
            Caller::Kernel => state.processes.iter().find(|(_, p)| p.kernel).map(|(h, _)| h),
            Caller::Process(process) => existing(&state, process).ok(),
        };
        if let Some(p) = p {
            state.unreserve(p, group);
        }
    }

    /// Tear down every context, the kernel one included.
    pub fn shutdown(&self) {
        self.state.lock().shutdown();
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        self.state.lock().stats()
    }
}

impl State {
    /// Install `backing` on an in-flight block and drop its in-flight reference.
    fn finish_backing(&mut self, b: Handle<Block>, backing: Result<Backing>) -> Result<BlockInfo> {
        match backing {
            Ok(backing) => {
                self.blocks[b].backing = backing;
                self.drop_ref(b);
                self.info(b).filter(|info| info.allocated).ok_or(TilerError::NotFound)
            }
            Err(e) => {
                debug!("backing failed, releasing block at {}", self.blocks[b].area);
                self.try_free(b);
                self.drop_ref(b);
                Err(e)
            }
        }
    }
}
