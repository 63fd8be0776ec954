//! # TILER Container Allocator
//!
//! Hands out rectangular blocks of a tiled 2D memory container and linear
//! page-granular runs of it, each reachable through a virtualized
//! [`TilerAddress`](tiler_geom::TilerAddress) in any of eight orientations.
//!
//! ```text
//!             ┌──────────── Tiler (one lock) ────────────┐
//!  open/close │  Process ─► Group ─► Area ─► Block (2D)   │
//!  alloc/free │               └────────────► Block (1D)   │
//!  buffers    │  Process ─► Buffer ····► Block            │
//!  reserve    │                                           │
//!             └───┬───────────────┬─────────────────┬─────┘
//!                 │ slots         │ pages           │ user pages
//!          ContainerStore  PageTableProgrammer   PagePinner
//! ```
//!
//! | Part | Role |
//! |------|------|
//! | [`Tiler`] | Public entry point. Resolves callers, locks, backs blocks. |
//! | `placement` | Fits blocks into areas, claims reserved blocks, assigns ids. |
//! | `lifecycle` | Reference counting, teardown, orphaning. |
//! | `buffers` | Groups of up to four blocks behind one mapping offset. |
//! | `reserve` | Lays out blocks ahead of requests. |
//! | `nv12` | Co-packing planner for luma/chroma pairs. |
//!
//! Blocks of one group share areas: a 2D request first tries a matching
//! reserved block, then a gap in an existing area of the same height, and
//! only then reserves a new area from the [`ContainerStore`]. Areas are sized
//! so that one physical page covers whole slot rows, which keeps the mapping
//! stride of neighbouring blocks identical.
//!
//! ## Ownership
//!
//! Every block belongs to an area (2D) or directly to a group (1D). Tearing
//! down a process frees what only it references; blocks still referenced by
//! another process's buffer survive as orphans and are released with their
//! last reference.
//!
//! ## Example
//! ```
//! use tiler::{AllocRequest, Caller, Tiler};
//! use tiler_container::GridStore;
//! use tiler_geom::TilerFormat;
//!
//! let tiler = Tiler::builder()
//!     .store(GridStore::new(), &TilerFormat::ALL)
//!     .build()
//!     .unwrap();
//! let client = tiler.open(42);
//! let frame = tiler
//!     .alloc(Caller::Process(client), &AllocRequest::new(TilerFormat::Bit8, 1920, 1080))
//!     .unwrap();
//! assert_eq!(frame.stride, 16 * 1024);
//! tiler.close(client).unwrap();
//! assert_eq!(tiler.stats().areas, 0);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod allocator;
mod arena;
mod buffers;
mod config;
mod error;
mod ids;
mod lifecycle;
mod model;
pub mod nv12;
mod placement;
mod request;
mod reserve;
mod state;

pub use crate::allocator::{
    AllocRequest, BlockHandle, BlockInfo, BlockRef, BufferInfo, Caller, Nv12Request, ProcessHandle, Stats, Tiler,
    TilerBuilder,
};
pub use crate::config::{DEFAULT_NV12_TEMPLATES, Nv12Template, TilerConfig};
pub use crate::error::{Result, TilerError};
pub use tiler_container::{ContainerStore, PagePinner, PageTableProgrammer};
