//! # TILER Configuration
//!
//! This crate is the single source of the compile-time constants that describe
//! the tiled memory container and the tunables of the allocator built on top
//! of it. Everything that needs to agree on container geometry (the address
//! math in `tiler-geom`, the software backing store in `tiler-container` and
//! the allocator in `tiler`) reads it from here.
//!
//! ## Container
//!
//! The container is a fixed 2D grid of *slots*. Each slot is backed by exactly
//! one physical page, and each pixel format addresses that grid through its
//! own window of a 32-bit virtualized address space:
//!
//! ```text
//!  31   30   29   28 27   26                              0
//! ┌────┬────┬────┬───────┬─────────────────────────────────┐
//! │ XY │ Y  │ X  │ mode  │     format-scaled tile index     │
//! │flip│inv │inv │ (fmt) │  (y << xBits | x) << (xs + ys)   │
//! └────┴────┴────┴───────┴─────────────────────────────────┘
//! ```
//!
//! ### Modules
//! * [`container`]: grid and address-space bit widths.
//! * [`defaults`]: allocator tunables and generator constants.

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod container;
pub mod defaults;
