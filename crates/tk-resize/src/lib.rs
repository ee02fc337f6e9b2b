//! Resampling of single-channel `f32` surfaces.
//!
//! [`resize_f32`] is separable: each axis gets its own tap table and the
//! horizontal pass runs before the vertical one.
//!
//! - [`ResizeFilter::Area`] averages the source pixels covered by each
//!   destination pixel when an axis shrinks and falls back to bilinear when it
//!   grows. Constant surfaces stay constant.
//! - [`ResizeFilter::Bilinear`] samples at half-pixel-aligned centers,
//!   `src = (dst + 0.5) * scale - 0.5`, clamped to the source extent.
//!
//! Exact halving on both axes is routed to [`downsample2x2_mean_f32`], a 2x2
//! box mean that drops odd trailing rows and columns.

mod downsample;
mod resize;

pub use downsample::downsample2x2_mean_f32;
pub use resize::{ResizeFilter, resize_f32};
