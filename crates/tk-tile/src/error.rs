use std::ops::Range;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] tk_core::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode {path}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid raw array file {path}: {reason}")]
    RawFormat { path: PathBuf, reason: String },
    #[error("expected mask with at most {expected} classes but found {found}; are these instance labels?")]
    TooManyClasses { expected: usize, found: usize },
    #[error("label value {value} is outside [0, {num_classes})")]
    LabelOutOfRange { value: u32, num_classes: usize },
    #[error("mask has {channels} differing channels; only single-channel masks are supported")]
    MaskChannels { channels: usize },
    #[error("axis {axis}: input slice {input:?} and output slice {output:?} differ in size")]
    SliceMismatch {
        axis: usize,
        input: Range<usize>,
        output: Range<usize>,
    },
    #[error("invalid tile layout: {0}")]
    InvalidTileLayout(String),
    #[error("missing {namespace} entry `{key}`")]
    MissingEntry { namespace: &'static str, key: String },
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
