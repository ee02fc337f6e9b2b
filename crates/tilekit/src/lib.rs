//! Umbrella crate for the `tilekit` workspace.
//!
//! Re-exports the array primitives, mask morphology, resampling and the
//! dataset-level samplers under one path.

pub use tk_core::*;
pub use tk_deform::*;
pub use tk_morph::*;
pub use tk_resize::*;
pub use tk_tile::*;

pub use tk_core::Error as CoreError;
pub use tk_tile::Error;
