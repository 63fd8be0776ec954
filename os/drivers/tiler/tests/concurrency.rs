use std::sync::{Arc, Barrier};
use std::thread;
use tiler::{AllocRequest, Caller, Stats, Tiler, TilerError};
use tiler_container::{ContainerArea, GridStore, PagePool, PageTableError, PageTableProgrammer, PhysAddr};
use tiler_geom::TilerFormat;

#[test]
fn clients_allocate_in_parallel() {
    const CLIENTS: u32 = 4;
    let tiler = Arc::new(Tiler::builder().store(GridStore::new(), &TilerFormat::ALL).build().unwrap());
    let barrier = Arc::new(Barrier::new(CLIENTS as usize));

    let workers: Vec<_> = (0..CLIENTS)
        .map(|pid| {
            let tiler = Arc::clone(&tiler);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let handle = tiler.open(pid + 1);
                let client = Caller::Process(handle);
                let request = AllocRequest::new(TilerFormat::Bit8, 64, 64).aligned(64, 0);
                barrier.wait();

                let blocks: Vec<_> = (0..20).map(|_| tiler.alloc(client, &request).unwrap()).collect();
                for (i, block) in blocks.iter().enumerate() {
                    if i % 2 == 0 {
                        tiler.free(client, block.key, block.id).unwrap();
                    }
                }
                tiler.close(handle).unwrap();
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(tiler.stats(), Stats::default());
}

#[test]
fn queries_race_with_frees() {
    let tiler = Arc::new(Tiler::builder().store(GridStore::new(), &TilerFormat::ALL).build().unwrap());
    let request = AllocRequest::new(TilerFormat::Bit8, 64, 64).aligned(64, 0);
    let blocks: Vec<_> = (0..32).map(|_| tiler.alloc(Caller::Kernel, &request).unwrap()).collect();

    let reader = {
        let tiler = Arc::clone(&tiler);
        let addresses: Vec<_> = blocks.iter().map(|b| b.address).collect();
        thread::spawn(move || {
            for address in addresses {
                // Either still there or already gone; never a different block.
                if let Ok(info) = tiler.query(address) {
                    assert_eq!(info.address, address);
                }
            }
        })
    };
    for block in &blocks {
        tiler.free(Caller::Kernel, block.key, block.id).unwrap();
    }
    reader.join().unwrap();
    assert_eq!(tiler.stats(), Stats::default());
}

/// Holds every commit between two barrier rendezvous with the test thread.
struct GatedProgrammer {
    pool: Arc<PagePool>,
    gate: Barrier,
}

impl PageTableProgrammer for GatedProgrammer {
    fn can_map(&self, format: TilerFormat) -> bool {
        self.pool.can_map(format)
    }

    fn allocate_pages(&self, count: usize) -> Result<Vec<PhysAddr>, PageTableError> {
        self.pool.allocate_pages(count)
    }

    fn free_pages(&self, pages: Vec<PhysAddr>) {
        self.pool.free_pages(pages);
    }

    fn commit(&self, area: &ContainerArea, pages: &[PhysAddr]) -> Result<(), PageTableError> {
        self.gate.wait();
        self.gate.wait();
        self.pool.commit(area, pages)
    }

    fn clear(&self, area: &ContainerArea) -> Result<(), PageTableError> {
        self.pool.clear(area)
    }
}

#[test]
fn close_during_commit_takes_the_block_with_it() {
    let pool = Arc::new(PagePool::new(PhysAddr::new(0x8000_0000), 16).with_formats(&[TilerFormat::Bit8]));
    let gated = Arc::new(GatedProgrammer {
        pool: Arc::clone(&pool),
        gate: Barrier::new(2),
    });
    let tiler = Arc::new(
        Tiler::builder()
            .store(GridStore::new(), &TilerFormat::ALL)
            .programmer(gated.clone(), &TilerFormat::ALL)
            .build()
            .unwrap(),
    );
    let handle = tiler.open(1);

    let client = {
        let tiler = Arc::clone(&tiler);
        thread::spawn(move || {
            let request = AllocRequest::new(TilerFormat::Bit8, 64, 64).aligned(64, 0);
            tiler.alloc(Caller::Process(handle), &request)
        })
    };

    // The block is placed and its pages taken; the state lock is free.
    gated.gate.wait();
    assert_eq!(tiler.stats().blocks, 1);
    tiler.close(handle).unwrap();
    gated.gate.wait();

    assert_eq!(client.join().unwrap(), Err(TilerError::NotFound));
    assert_eq!(tiler.stats(), Stats::default());
    assert_eq!(pool.free_pages_count(), 16);
    assert_eq!(pool.mapped_slots(), 0);
}
