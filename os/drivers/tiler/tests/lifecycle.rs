use std::sync::{Arc, Mutex};
use tiler::{AllocRequest, BlockRef, Caller, Stats, Tiler, TilerError};
use tiler_container::{GridStore, PagePinner, PagePool, PageTableProgrammer, PhysAddr, PinError, PinnedPages, SlotPoint};
use tiler_geom::{Orientation, TilerFormat};

fn tiler() -> Tiler {
    Tiler::builder().store(GridStore::new(), &TilerFormat::ALL).build().unwrap()
}

fn frame() -> AllocRequest {
    AllocRequest::new(TilerFormat::Bit8, 64, 64).aligned(64, 0)
}

#[test]
fn teardown_orphans_blocks_shared_through_buffers() {
    let tiler = tiler();
    let owner = tiler.open(1);
    let viewer = tiler.open(2);
    let a = tiler.alloc(Caller::Process(owner), &frame()).unwrap();
    let b = tiler.alloc(Caller::Process(owner), &frame()).unwrap();

    let buffer = tiler.register_buffer(viewer, &[a.block_ref()]).unwrap();
    tiler.close(owner).unwrap();

    let stats = tiler.stats();
    assert_eq!((stats.processes, stats.groups), (1, 0));
    assert_eq!((stats.areas, stats.orphaned_areas, stats.blocks), (1, 1, 1));
    assert_eq!(tiler.describe(b.key, b.id), Err(TilerError::NotFound));

    let survivor = tiler.describe(a.key, a.id).unwrap();
    assert_eq!((survivor.refs, survivor.allocated), (1, false));
    assert_eq!(tiler.free(Caller::Kernel, a.key, a.id), Err(TilerError::NotFound));

    tiler.unregister_buffer(viewer, buffer.offset).unwrap();
    let stats = tiler.stats();
    assert_eq!((stats.areas, stats.orphaned_areas, stats.blocks), (0, 0, 0));
}

#[test]
fn linear_blocks_are_orphaned_too() {
    let tiler = tiler();
    let owner = tiler.open(1);
    let viewer = tiler.open(2);
    let a = tiler
        .alloc(Caller::Process(owner), &AllocRequest::new(TilerFormat::Page, 4096, 1))
        .unwrap();
    tiler.register_buffer(viewer, &[a.block_ref()]).unwrap();

    tiler.close(owner).unwrap();
    assert_eq!(tiler.stats().orphaned_blocks, 1);

    tiler.close(viewer).unwrap();
    assert_eq!(tiler.stats(), Stats::default());
}

#[test]
fn buffers_span_their_blocks() {
    let tiler = tiler();
    let client = tiler.open(1);
    let a = tiler.alloc(Caller::Process(client), &frame()).unwrap();
    let b = tiler.alloc(Caller::Process(client), &frame()).unwrap();

    let buffer = tiler.register_buffer(client, &[a.block_ref(), b.block_ref()]).unwrap();
    assert_eq!(buffer.offset & 0xFFF, 0);
    assert_eq!(buffer.length, a.size + b.size);
    assert_eq!(buffer.blocks.len(), 2);
    assert_eq!(buffer.blocks[0].refs, 2);

    let found = tiler.find_buffer(client, buffer.offset + 0x1000, 0x1000).unwrap();
    assert_eq!(found.offset, buffer.offset);
    assert_eq!(
        tiler.find_buffer(client, buffer.offset, buffer.length + 1),
        Err(TilerError::NotFound)
    );

    let second = tiler.register_buffer(client, &[b.block_ref()]).unwrap();
    assert!(second.offset >= buffer.offset + buffer.length || second.offset + second.length <= buffer.offset);
    assert_eq!(tiler.buffers(client).unwrap().len(), 2);
    assert_eq!(tiler.describe(b.key, b.id).unwrap().refs, 3);

    tiler.unregister_buffer(client, buffer.offset).unwrap();
    assert_eq!(tiler.unregister_buffer(client, buffer.offset), Err(TilerError::NotFound));
    assert_eq!(tiler.describe(a.key, a.id).unwrap().refs, 1);
}

#[test]
fn buffer_registration_is_all_or_nothing() {
    let tiler = tiler();
    let client = tiler.open(1);
    let a = tiler.alloc(Caller::Process(client), &frame()).unwrap();

    let too_many = [a.block_ref(); 5];
    assert!(matches!(tiler.register_buffer(client, &too_many), Err(TilerError::InvalidArgument(_))));
    assert!(matches!(tiler.register_buffer(client, &[]), Err(TilerError::InvalidArgument(_))));

    let missing = BlockRef { key: 1, id: 2 };
    assert_eq!(tiler.register_buffer(client, &[a.block_ref(), missing]), Err(TilerError::NotFound));
    assert_eq!(tiler.describe(a.key, a.id).unwrap().refs, 1);
    assert_eq!(tiler.stats().buffers, 0);
}

#[test]
fn locked_blocks_outlive_their_free() {
    let tiler = tiler();
    let a = tiler.alloc(Caller::Kernel, &frame()).unwrap();
    let lock = tiler.lock_block(a.key, a.id).unwrap();

    tiler.free(Caller::Kernel, a.key, a.id).unwrap();
    let held = tiler.describe(a.key, a.id).unwrap();
    assert_eq!((held.refs, held.allocated), (1, false));

    tiler.unlock_block(lock, false);
    assert_eq!(tiler.describe(a.key, a.id), Err(TilerError::NotFound));
    assert_eq!(tiler.stats().areas, 0);

    let b = tiler.alloc(Caller::Kernel, &frame()).unwrap();
    let lock = tiler.lock_block(b.key, b.id).unwrap();
    tiler.unlock_block(lock, true);
    assert_eq!(tiler.stats().blocks, 0);
}

#[test]
fn buffers_keep_their_reference_through_a_lock() {
    let tiler = tiler();
    let client = tiler.open(1);
    let a = tiler.alloc(Caller::Process(client), &frame()).unwrap();
    let buffer = tiler.register_buffer(client, &[a.block_ref()]).unwrap();

    let lock = tiler.lock_block(a.key, a.id).unwrap();
    tiler.free(Caller::Process(client), a.key, a.id).unwrap();
    tiler.unlock_block(lock, false);

    let listed = tiler.buffers(client).unwrap();
    assert_eq!(listed.len(), 1);
    let held = &listed[0].blocks;
    assert_eq!(held.len(), 1);
    assert_eq!((held[0].refs, held[0].allocated), (1, false));
    assert_eq!(tiler.find_buffer(client, buffer.offset, 1).unwrap().blocks.len(), 1);

    tiler.unregister_buffer(client, buffer.offset).unwrap();
    assert_eq!(tiler.describe(a.key, a.id), Err(TilerError::NotFound));
    assert_eq!(tiler.stats().areas, 0);
}

#[test]
fn shutdown_releases_everything() {
    let tiler = tiler();
    let one = tiler.open(1);
    let two = tiler.open(2);
    let a = tiler.alloc(Caller::Process(one), &frame()).unwrap();
    tiler.alloc(Caller::Process(two), &frame()).unwrap();
    tiler.alloc(Caller::Kernel, &frame()).unwrap();
    tiler.register_buffer(two, &[a.block_ref()]).unwrap();

    tiler.shutdown();
    assert_eq!(tiler.stats(), Stats::default());
}

fn paged(pool: &Arc<PagePool>) -> Tiler {
    Tiler::builder()
        .store(GridStore::new(), &TilerFormat::ALL)
        .programmer(pool.clone(), &TilerFormat::ALL)
        .build()
        .unwrap()
}

#[test]
fn blocks_are_backed_by_pages() {
    let pool = Arc::new(PagePool::new(PhysAddr::new(0x8000_0000), 16).with_formats(&[TilerFormat::Bit8]));
    let tiler = paged(&pool);

    let a = tiler.alloc(Caller::Kernel, &frame()).unwrap();
    assert_eq!(pool.mapped_slots(), 2);
    assert_eq!(pool.free_pages_count(), 14);
    assert!(pool.translate(SlotPoint::new(1, 0)).is_some());

    // 16-bit blocks are placed but not backed.
    tiler
        .alloc(Caller::Kernel, &AllocRequest::new(TilerFormat::Bit16, 64, 32))
        .unwrap();
    assert_eq!(pool.free_pages_count(), 14);

    tiler.free(Caller::Kernel, a.key, a.id).unwrap();
    assert_eq!(pool.mapped_slots(), 0);
    assert_eq!(pool.free_pages_count(), 16);
}

#[test]
fn failed_commits_roll_back() {
    let pool = Arc::new(PagePool::new(PhysAddr::new(0x8000_0000), 16));
    let tiler = paged(&pool);

    pool.fail_commits(true);
    assert_eq!(tiler.alloc(Caller::Kernel, &frame()), Err(TilerError::OutOfMemory));
    assert_eq!(pool.free_pages_count(), 16);
    assert_eq!(tiler.stats(), Stats::default());

    pool.fail_commits(false);
    let too_big = AllocRequest::new(TilerFormat::Bit8, 64 * 17, 64).aligned(64, 0);
    assert_eq!(tiler.alloc(Caller::Kernel, &too_big), Err(TilerError::OutOfMemory));
    assert_eq!(tiler.stats().areas, 0);
}

/// Pins pages at a fixed physical base and records what is still pinned.
#[derive(Default)]
struct FakePinner {
    pinned: Mutex<Vec<u64>>,
    deny: bool,
}

impl PagePinner for FakePinner {
    fn pin(&self, user_address: u64, count: usize) -> Result<PinnedPages, PinError> {
        if self.deny {
            return Err(PinError::Permission);
        }
        self.pinned.lock().unwrap().push(user_address);
        Ok(PinnedPages {
            user_address,
            pages: (0..count as u64).map(|i| PhysAddr::new(0x9000_0000 + i * 0x1000)).collect(),
        })
    }

    fn unpin(&self, pages: PinnedPages) {
        self.pinned.lock().unwrap().retain(|&a| a != pages.user_address);
    }
}

#[test]
fn user_memory_maps_through_linear_blocks() {
    let pool = Arc::new(PagePool::new(PhysAddr::new(0x8000_0000), 4).with_formats(&[TilerFormat::Page]));
    let pinner = Arc::new(FakePinner::default());
    let tiler = Tiler::builder()
        .store(GridStore::new(), &TilerFormat::ALL)
        .programmer(pool.clone(), &TilerFormat::ALL)
        .pinner(pinner.clone())
        .build()
        .unwrap();

    let a = tiler.map_user(Caller::Kernel, 0x1234_5010, 8192, 5, 0).unwrap();
    assert_eq!(a.address.page_offset(), 0x10);
    assert_eq!(a.area.slots(), 3);
    assert_eq!(*pinner.pinned.lock().unwrap(), [0x1234_5000]);
    assert_eq!(pool.mapped_slots(), 3);
    assert_eq!(pool.free_pages_count(), 4);

    tiler.free(Caller::Kernel, a.key, a.id).unwrap();
    assert!(pinner.pinned.lock().unwrap().is_empty());
    assert_eq!(pool.mapped_slots(), 0);
}

#[test]
fn natural_views_keep_the_in_page_offset() {
    let pool = Arc::new(PagePool::new(PhysAddr::new(0x8000_0000), 4).with_formats(&[TilerFormat::Page]));
    let tiler = Tiler::builder()
        .store(GridStore::new(), &TilerFormat::ALL)
        .programmer(pool, &TilerFormat::ALL)
        .pinner(Arc::new(FakePinner::default()))
        .build()
        .unwrap();

    let a = tiler.map_user(Caller::Kernel, 0x1234_5010, 100, 1, 0).unwrap();
    assert_eq!(a.address.page_offset(), 0x10);
    assert_eq!(tiler.view(a.key, a.id, Orientation::NATURAL), Ok(a.address));
    assert_eq!(tiler.query(a.address).unwrap().id, a.id);
}

#[test]
fn user_mapping_needs_a_pinner_that_agrees() {
    let pool = Arc::new(PagePool::new(PhysAddr::new(0x8000_0000), 4));
    let tiler = paged(&pool);
    assert_eq!(tiler.map_user(Caller::Kernel, 0x1000, 4096, 0, 0), Err(TilerError::AccessDenied));

    let deny = Arc::new(FakePinner {
        deny: true,
        ..FakePinner::default()
    });
    let tiler = Tiler::builder()
        .store(GridStore::new(), &TilerFormat::ALL)
        .programmer(pool.clone(), &TilerFormat::ALL)
        .pinner(deny)
        .build()
        .unwrap();
    assert_eq!(tiler.map_user(Caller::Kernel, 0x1000, 4096, 0, 0), Err(TilerError::AccessDenied));
    assert_eq!(tiler.stats(), Stats::default());
    assert_eq!(pool.mapped_slots(), 0);
}

#[test]
fn programmers_can_be_asked_directly() {
    let pool = PagePool::new(PhysAddr::new(0), 1).with_formats(&[TilerFormat::Page]);
    assert!(pool.can_map(TilerFormat::Page));
    assert!(!pool.can_map(TilerFormat::Bit8));
}
