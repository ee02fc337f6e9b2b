//! Foundational array primitives for tilekit.
//!
//! ## Layout
//! Images are row-major with interleaved channels. `stride` is the distance,
//! in elements, between adjacent row starts and may exceed
//! `width * channels`, which allows borrowed views over padded buffers and
//! subviews. Shapes are reported as `[rows, cols]`.
//!
//! ## Borders
//! Sampling outside an image reflects with the edge element repeated
//! (`cba|abcd|dcb`), see [`reflect_index`].
//!
//! ## Sampling Coordinates
//! Integer coordinates refer to pixel centers. Nearest-neighbor uses
//! round-to-nearest indices; bilinear uses the floor-based 2x2 neighborhood.
//!
//! ## Array Sources
//! [`ArraySource`] is the capability shared by in-memory images and
//! disk-backed arrays: shape, channel count and bounded region reads.

mod border;
mod error;
mod image;
mod pixel;
mod sample;
mod source;

pub use border::reflect_index;
pub use error::Error;
pub use image::{Image, ImageView, to_f32};
pub use pixel::Pixel;
pub use sample::{sample_bilinear, sample_nearest};
pub use source::{ArraySource, check_region};
