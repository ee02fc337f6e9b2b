//! Dataset-level tiling: preprocessing cache, weighted random tiles and
//! deterministic tile grids.
//!
//! ## Pipeline
//! 1. A [`Preprocessor`] reads each [`SourceFile`] through a [`SourceReader`],
//!    converts masks to class labels ([`read_label`]), builds a
//!    [`CdfSurface`] per label and writes everything to a [`CacheStore`].
//!    Channel [`Stats`] are accumulated on the way.
//! 2. The resulting [`Corpus`] is read-only. Wrap it in an `Arc` and hand it
//!    to any number of samplers.
//! 3. [`RandomTileSampler`] draws training tiles centered by the sampling
//!    surface, with random scale, flip and rotation.
//!    [`DeterministicTiler`] walks a regular grid of overlapping tiles and
//!    reports, through [`TileInfo`], where each tile's output belongs.
//!
//! ## Stores
//! [`MemoryStore`] keeps arrays in process. [`DirStore`] writes
//! [`RawArrayFile`]s, which samplers read row by row so only the resampled
//! window is loaded.
//!
//! ## Tile Slices
//! For an output tile of size `O` centered at `c`, the tile spans
//! `[c - floor(O/2), c + ceil(O/2))`. `out_slice` is that span clipped to the
//! image and `in_slice` is the same region in tile-local coordinates. The
//! union of `out_slice` over one image's tiles covers the image.

mod augment;
mod cdf;
mod error;
mod mosaic;
mod preprocess;
mod random;
mod raw;
mod reader;
mod stats;
mod store;
mod tiler;

pub use augment::{Augment, NoAugment, Normalizer};
pub use cdf::{CdfParams, CdfSurface};
pub use error::Error;
pub use mosaic::Mosaic;
pub use preprocess::{Corpus, CorpusEntry, PreprocessConfig, Preprocessor, SourceFile};
pub use random::{RandomTileConfig, RandomTileSampler};
pub use raw::{RawArrayFile, RawElement, raw_element_tag};
pub use reader::{ImageFileReader, LabelOptions, SourceReader, read_label};
pub use stats::{Stats, StatsAccumulator, tiles_in_rectangles};
pub use store::{CacheStore, DirStore, MemoryStore, Namespace};
pub use tiler::{
    DeterministicTiler, Tile, TileInfo, TileItem, TilerConfig, axis_centers, layout_tiles,
    tile_slices,
};
