use tiler::{AllocRequest, Caller, Nv12Request, Tiler, TilerConfig, TilerError};
use tiler_container::{ContainerArea, GridStore};
use tiler_geom::TilerFormat;

fn tiler_with(config: TilerConfig) -> Tiler {
    Tiler::builder().config(config).store(GridStore::new(), &TilerFormat::ALL).build().unwrap()
}

fn pair() -> Nv12Request {
    Nv12Request {
        width: 256,
        height: 64,
        align: 128,
        offset: 0,
        key: 3,
        group: 1,
    }
}

fn left(area: &ContainerArea) -> u16 {
    area.origin().x
}

#[test]
fn nine_pairs_share_one_area() {
    let config = TilerConfig {
        nv12_templates: &[],
        ..TilerConfig::default()
    };
    let tiler = tiler_with(config);
    let client = Caller::Process(tiler.open(1));

    assert_eq!(tiler.reserve_nv12(client, 9, &pair()).unwrap(), 9);
    let stats = tiler.stats();
    assert_eq!((stats.areas, stats.reserved_blocks, stats.blocks), (1, 18, 0));

    let mut lumas = Vec::new();
    for _ in 0..9 {
        let (luma, chroma) = tiler.alloc_nv12(client, &pair()).unwrap();
        assert_eq!((luma.format, chroma.format), (TilerFormat::Bit8, TilerFormat::Bit16));
        assert_eq!((chroma.width, chroma.height), (128, 32));
        assert_eq!(luma.key, chroma.key);
        lumas.push(left(&luma.area));
    }
    lumas.sort_unstable();
    assert_eq!(lumas, [0, 4, 8, 12, 16, 20, 24, 28, 48]);

    let stats = tiler.stats();
    assert_eq!((stats.areas, stats.reserved_blocks, stats.blocks), (1, 0, 18));
}

#[test]
fn tuned_templates_win_when_they_match() {
    let tiler = tiler_with(TilerConfig::default());
    let client = Caller::Process(tiler.open(1));

    assert_eq!(tiler.reserve_nv12(client, 9, &pair()).unwrap(), 9);
    assert_eq!(tiler.stats().areas, 1);

    let (luma, chroma) = tiler.alloc_nv12(client, &pair()).unwrap();
    assert_eq!(left(&luma.area), 2);
    assert!([33, 35, 37, 39, 41, 23, 25, 27, 29].contains(&left(&chroma.area)));
}

#[test]
fn separate_areas_without_packing() {
    let config = TilerConfig {
        nv12_packing: false,
        ..TilerConfig::default()
    };
    let tiler = tiler_with(config);

    assert_eq!(tiler.reserve_nv12(Caller::Kernel, 9, &pair()).unwrap(), 9);
    let stats = tiler.stats();
    assert_eq!((stats.areas, stats.reserved_blocks), (2, 18));

    tiler.unreserve(Caller::Kernel, 1);
    assert_eq!(tiler.stats(), tiler::Stats::default());
}

#[test]
fn unreserve_keeps_claimed_pairs() {
    let tiler = tiler_with(TilerConfig::default());
    let client = tiler.open(1);

    tiler.reserve_nv12(Caller::Process(client), 9, &pair()).unwrap();
    let (luma, chroma) = tiler.alloc_nv12(Caller::Process(client), &pair()).unwrap();
    tiler.unreserve(Caller::Process(client), 1);

    let stats = tiler.stats();
    assert_eq!((stats.areas, stats.reserved_blocks, stats.blocks), (1, 0, 2));

    tiler.free(Caller::Process(client), luma.key, luma.id).unwrap();
    tiler.free(Caller::Process(client), chroma.key, chroma.id).unwrap();
    assert_eq!(tiler.stats().areas, 0);
}

#[test]
fn bad_pair_requests_are_rejected() {
    let tiler = tiler_with(TilerConfig::default());
    let reject = |request: Nv12Request, n: usize| {
        assert!(matches!(
            tiler.reserve_nv12(Caller::Kernel, n, &request),
            Err(TilerError::InvalidArgument(_))
        ));
    };

    reject(pair(), 0);
    reject(pair(), 16385);
    reject(Nv12Request { width: 0, ..pair() }, 1);
    reject(Nv12Request { offset: 3, ..pair() }, 1);
    reject(Nv12Request { offset: 128, ..pair() }, 1);
    reject(Nv12Request { align: 4096, ..pair() }, 1);
    assert_eq!(tiler.stats(), tiler::Stats::default());
}

#[test]
fn chroma_failure_releases_luma() {
    let tiler = tiler_with(TilerConfig::default());
    let odd = Nv12Request { offset: 1, ..pair() };
    assert!(matches!(tiler.alloc_nv12(Caller::Kernel, &odd), Err(TilerError::InvalidArgument(_))));
    assert_eq!(tiler.stats(), tiler::Stats::default());
}

#[test]
fn reserved_blocks_are_claimed_by_matching_requests() {
    let tiler = tiler_with(TilerConfig::default());
    let client = Caller::Process(tiler.open(1));
    let request = AllocRequest::new(TilerFormat::Bit8, 2560, 64).aligned(4096, 2048);

    assert_eq!(tiler.reserve(client, 5, &request).unwrap(), 5);
    let stats = tiler.stats();
    assert_eq!((stats.areas, stats.reserved_blocks), (2, 5));

    let a = tiler.alloc(client, &request).unwrap();
    assert_eq!(left(&a.area) % 64, 32);
    let stats = tiler.stats();
    assert_eq!((stats.areas, stats.reserved_blocks, stats.blocks), (2, 4, 1));

    // Another group sees none of them.
    tiler.alloc(client, &request.keyed(0, 9)).unwrap();
    assert_eq!(tiler.stats().areas, 3);
}

#[test]
fn narrow_or_linear_requests_are_not_reserved() {
    let tiler = tiler_with(TilerConfig::default());
    let narrow = AllocRequest::new(TilerFormat::Bit8, 1024, 64);
    assert_eq!(tiler.reserve(Caller::Kernel, 4, &narrow).unwrap(), 0);

    let linear = AllocRequest::new(TilerFormat::Page, 8192, 1);
    assert!(matches!(tiler.reserve(Caller::Kernel, 4, &linear), Err(TilerError::InvalidArgument(_))));
    assert_eq!(tiler.stats(), tiler::Stats::default());
}
