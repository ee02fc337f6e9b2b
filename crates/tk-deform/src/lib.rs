//! Deformation fields that map tile pixels to source coordinates.
//!
//! A [`DeformationField`] holds one row and one column coordinate per output
//! pixel, centered on the origin:
//!
//! - row `i` starts at `linspace(-(H*s)/2, (H*s)/2 - 1, H)[i]`,
//! - col `j` starts at `linspace(-(W*s)/2, (W*s)/2 - 1, W)[j]`,
//!
//! where `s` is the active scale. [`DeformationField::rotate`] and
//! [`DeformationField::mirror`] transform these coordinates in place, so
//! transforms compose in call order.
//!
//! [`DeformationField::apply`] translates the grid to an absolute center,
//! reads only the source window the interpolation touches and resamples it
//! with reflective borders (edge pixel repeated).

mod field;

pub use field::{CoordGrid, DeformationField, Interpolation};
