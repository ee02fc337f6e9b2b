//! Label-mask morphology.
//!
//! - [`dilate3x3`], [`erode3x3`], [`close3x3`]: square 3x3
//!   max/min filters over any `Ord` element (`bool` masks, instance ids).
//!   Neighbors outside the image are ignored rather than padded.
//! - [`label_components`]: 4- or 8-connected component labeling.
//! - [`separate_instances`]: turns class/instance masks into class labels
//!   with a background ridge between touching instances of the same class.

mod components;
mod ops;
mod separate;

pub use components::{Connectivity, label_components};
pub use ops::{close3x3, dilate3x3, erode3x3};
pub use separate::{MaskLabels, separate_instances};
