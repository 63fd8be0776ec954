//! # TILER Geometry
//!
//! Stateless translation between tile coordinates, pixel formats and view
//! orientations on one side, and 32-bit virtualized addresses on the other.
//!
//! ## What you get
//! - A [`TilerFormat`] enum for the four address formats, together with the
//!   per-format [`FormatGeometry`] (address shifts, bytes per pixel, slot size).
//! - A bit-exact [`TilerAddress`] (see [`tiler_info`] for the layout) and the
//!   matching [`Orientation`] flags.
//! - The [`Geometry`] engine: [`address_of`](Geometry::address_of),
//!   [`coordinates_of`](Geometry::coordinates_of),
//!   [`reorient`](Geometry::reorient) and the stride/size helpers.
//!
//! ## Views
//!
//! Every pixel of the container has a *natural* coordinate. A view applies up
//! to three transforms before the coordinate is folded into the tile index:
//!
//! ```text
//! natural (x, y) ──► X-invert: x ^= xMask ──► Y-invert: y ^= yMask
//!                ──► XY-flip:  index = x << yBits | y   (else y << xBits | x)
//!                ──► address = index << (xShift + yShift) | fmt << 27 | view bits
//! ```
//!
//! Rotations by multiples of 90° and mirroring are combinations of these three
//! flags ([`Orientation::from_rotation`]).
//!
//! ## Example
//! ```rust
//! use tiler_geom::{Geometry, Orientation, TilerFormat};
//!
//! let geom = Geometry::new();
//! let addr = geom
//!     .address_of(Orientation::ROTATE_90, TilerFormat::Bit16, 100, 20)
//!     .expect("in range");
//! assert_eq!(geom.coordinates_of(addr), (100, 20));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod address;
mod format;
mod geometry;
mod orientation;

pub use crate::address::TilerAddress;
pub use crate::format::{FormatGeometry, InvalidFormat, TilerFormat};
pub use crate::geometry::Geometry;
pub use crate::orientation::Orientation;
