use std::collections::BTreeSet;
use std::path::Path;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tk_core::{ArraySource, Image};
use tk_morph::{MaskLabels, separate_instances};

use crate::Error;
use crate::raw::{RawArrayFile, RawElement, raw_element_tag};

/// Reads source images and raw masks from paths.
pub trait SourceReader {
    /// Pixel values are kept at their stored magnitude.
    fn read_image(&self, path: &Path) -> Result<Image<f32>, Error>;

    fn read_mask(&self, path: &Path) -> Result<Image<u32>, Error>;
}

impl<R: SourceReader + ?Sized> SourceReader for &R {
    fn read_image(&self, path: &Path) -> Result<Image<f32>, Error> {
        (**self).read_image(path)
    }

    fn read_mask(&self, path: &Path) -> Result<Image<u32>, Error> {
        (**self).read_mask(path)
    }
}

/// Decodes PNG/TIFF through `image`, and `.raw` files as [`RawArrayFile`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileReader;

fn is_raw(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("raw"))
}

fn decode(path: &Path) -> Result<DynamicImage, Error> {
    image::open(path).map_err(|source| Error::Decode {
        path: path.to_path_buf(),
        source,
    })
}

fn interleaved<T: Copy, U>(
    width: u32,
    height: u32,
    channels: usize,
    raw: Vec<T>,
    f: impl Fn(T) -> U,
) -> Result<Image<U>, Error> {
    Ok(Image::from_vec_channels(
        width as usize,
        height as usize,
        channels,
        raw.into_iter().map(f).collect(),
    )?)
}

impl SourceReader for ImageFileReader {
    fn read_image(&self, path: &Path) -> Result<Image<f32>, Error> {
        if is_raw(path) {
            return Ok(RawArrayFile::<f32>::open(path)?.read_all()?);
        }

        let img = decode(path)?;
        let (w, h) = (img.width(), img.height());
        match img {
            DynamicImage::ImageLuma8(b) => interleaved(w, h, 1, b.into_raw(), f32::from),
            DynamicImage::ImageLumaA8(b) => interleaved(w, h, 2, b.into_raw(), f32::from),
            DynamicImage::ImageRgb8(b) => interleaved(w, h, 3, b.into_raw(), f32::from),
            DynamicImage::ImageRgba8(b) => interleaved(w, h, 4, b.into_raw(), f32::from),
            DynamicImage::ImageLuma16(b) => interleaved(w, h, 1, b.into_raw(), f32::from),
            DynamicImage::ImageLumaA16(b) => interleaved(w, h, 2, b.into_raw(), f32::from),
            DynamicImage::ImageRgb16(b) => interleaved(w, h, 3, b.into_raw(), f32::from),
            DynamicImage::ImageRgba16(b) => interleaved(w, h, 4, b.into_raw(), f32::from),
            DynamicImage::ImageRgb32F(b) => interleaved(w, h, 3, b.into_raw(), |v| v),
            other => interleaved(w, h, 4, other.into_rgba32f().into_raw(), |v| v),
        }
    }

    fn read_mask(&self, path: &Path) -> Result<Image<u32>, Error> {
        if is_raw(path) {
            let tag = raw_element_tag(path)?;
            return if tag == u8::TAG {
                Ok(RawArrayFile::<u8>::open(path)?.read_all()?.map(|&v| u32::from(v)))
            } else {
                Ok(RawArrayFile::<u32>::open(path)?.read_all()?)
            };
        }

        let img = decode(path)?;
        let (w, h) = (img.width(), img.height());
        match img {
            DynamicImage::ImageLuma8(b) => interleaved(w, h, 1, b.into_raw(), u32::from),
            DynamicImage::ImageLumaA8(b) => interleaved(w, h, 2, b.into_raw(), u32::from),
            DynamicImage::ImageRgb8(b) => interleaved(w, h, 3, b.into_raw(), u32::from),
            DynamicImage::ImageRgba8(b) => interleaved(w, h, 4, b.into_raw(), u32::from),
            DynamicImage::ImageLuma16(b) => interleaved(w, h, 1, b.into_raw(), u32::from),
            DynamicImage::ImageLumaA16(b) => interleaved(w, h, 2, b.into_raw(), u32::from),
            DynamicImage::ImageRgb16(b) => interleaved(w, h, 3, b.into_raw(), u32::from),
            DynamicImage::ImageRgba16(b) => interleaved(w, h, 4, b.into_raw(), u32::from),
            other => interleaved(w, h, 1, other.into_luma16().into_raw(), u32::from),
        }
    }
}

/// How raw masks become class labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelOptions {
    pub num_classes: usize,
    /// Masks hold instance ids rather than class ids.
    pub instance_labels: bool,
    pub remove_connectivity: bool,
}

impl Default for LabelOptions {
    fn default() -> Self {
        Self {
            num_classes: 2,
            instance_labels: false,
            remove_connectivity: true,
        }
    }
}

impl LabelOptions {
    /// Class ids are stored as `u8`.
    pub const MAX_CLASSES: usize = u8::MAX as usize + 1;

    pub fn validate(&self) -> Result<(), Error> {
        if self.num_classes > Self::MAX_CLASSES {
            return Err(Error::InvalidConfig(format!(
                "num_classes {} exceeds the {} classes a u8 label holds",
                self.num_classes,
                Self::MAX_CLASSES
            )));
        }
        Ok(())
    }
}

/// Converts a raw mask into a validated `u8` class label.
///
/// Multi-channel masks collapse to one channel when all channels agree. For
/// binary problems, class masks with exactly two values stored as `{a, max}`
/// are divided by `max`. Instances are then separated and the result must
/// hold at most `num_classes` distinct values, each below `num_classes`.
pub fn read_label(raw: &Image<u32>, opts: &LabelOptions) -> Result<Image<u8>, Error> {
    opts.validate()?;
    let mut mask = collapse_channels(raw)?;

    if !opts.instance_labels && opts.num_classes == 2 {
        let unique: BTreeSet<u32> = mask.data().iter().copied().collect();
        if let Some(&max) = unique.last()
            && unique.len() == 2
            && max > 1
        {
            mask.data_mut().iter_mut().for_each(|v| *v /= max);
        }
    }

    let labels = if opts.instance_labels {
        MaskLabels::Instances(mask.as_view())
    } else {
        MaskLabels::Classes(mask.as_view())
    };
    let classes = separate_instances(labels, opts.remove_connectivity)?;

    let unique: BTreeSet<u32> = classes.data().iter().copied().collect();
    if unique.len() > opts.num_classes {
        return Err(Error::TooManyClasses {
            expected: opts.num_classes,
            found: unique.len(),
        });
    }
    if let Some(&value) = unique.last()
        && value as usize >= opts.num_classes
    {
        return Err(Error::LabelOutOfRange {
            value,
            num_classes: opts.num_classes,
        });
    }

    // Values are below `num_classes`, which `validate` bounds by `MAX_CLASSES`.
    Ok(classes.map(|&v| v as u8))
}

fn collapse_channels(raw: &Image<u32>) -> Result<Image<u32>, Error> {
    let ch = raw.channels();
    if ch == 1 {
        return Ok(raw.clone());
    }
    let identical = raw
        .data()
        .chunks_exact(ch)
        .all(|px| px.iter().all(|&v| v == px[0]));
    if !identical {
        return Err(Error::MaskChannels { channels: ch });
    }
    Ok(Image::from_vec(
        raw.width(),
        raw.height(),
        raw.data().chunks_exact(ch).map(|px| px[0]).collect(),
    )?)
}
