use tk_core::{Image, ImageView};

use crate::Error;
use crate::store::CacheStore;
use crate::tiler::{DeterministicTiler, TileInfo};

/// Reassembles per-tile model outputs into full images through
/// [`TileInfo`] slices.
#[derive(Debug, Clone)]
pub struct Mosaic {
    images: Vec<Image<f32>>,
    hits: Vec<Image<u32>>,
}

impl Mosaic {
    /// One zeroed canvas per `[rows, cols]` shape.
    pub fn new(shapes: &[[usize; 2]], channels: usize) -> Self {
        Self {
            images: shapes
                .iter()
                .map(|&[h, w]| Image::new_fill_channels(w, h, channels, 0.0))
                .collect(),
            hits: shapes.iter().map(|&[h, w]| Image::new_fill(w, h, 0)).collect(),
        }
    }

    pub fn for_tiler<S: CacheStore>(tiler: &DeterministicTiler<S>, channels: usize) -> Self {
        Self::new(tiler.data_shapes(), channels)
    }

    /// Copies `output[in_slice]` into `image[out_slice]`.
    ///
    /// `output` is the model prediction for the tile, of shape
    /// `tile_shape - padding`.
    pub fn insert(&mut self, info: &TileInfo, output: &ImageView<'_, f32>) -> Result<(), Error> {
        let len = self.images.len();
        let (image, hits) = match (
            self.images.get_mut(info.image_index),
            self.hits.get_mut(info.image_index),
        ) {
            (Some(image), Some(hits)) => (image, hits),
            _ => {
                return Err(Error::IndexOutOfRange {
                    index: info.image_index,
                    len,
                });
            }
        };
        if output.channels() != image.channels() {
            return Err(tk_core::Error::ChannelMismatch {
                expected: image.channels(),
                actual: output.channels(),
            }
            .into());
        }

        let [in_r, in_c] = &info.in_slice;
        let [out_r, out_c] = &info.out_slice;
        for (axis, (input, out)) in [(in_r, out_r), (in_c, out_c)].into_iter().enumerate() {
            if input.len() != out.len() {
                return Err(Error::SliceMismatch {
                    axis,
                    input: input.clone(),
                    output: out.clone(),
                });
            }
        }
        let src = output.subview(in_c.start, in_r.start, in_c.len(), in_r.len())?;
        if out_r.end > image.height() || out_c.end > image.width() {
            return Err(tk_core::Error::OutOfBounds.into());
        }

        let ch = image.channels();
        let (w, x0) = (image.width(), out_c.start);
        let data = image.data_mut();
        for (dy, y) in out_r.clone().enumerate() {
            let start = (y * w + x0) * ch;
            data[start..start + src.width() * ch].copy_from_slice(src.row(dy));
        }
        for y in out_r.clone() {
            for x in out_c.clone() {
                if let Some(h) = hits.get_mut(x, y) {
                    *h += 1;
                }
            }
        }
        Ok(())
    }

    /// Whether every pixel of `image` received a tile.
    pub fn is_covered(&self, image: usize) -> bool {
        self.hits
            .get(image)
            .is_some_and(|h| h.data().iter().all(|&n| n > 0))
    }

    pub fn images(&self) -> &[Image<f32>] {
        &self.images
    }

    pub fn into_images(self) -> Vec<Image<f32>> {
        self.images
    }
}
