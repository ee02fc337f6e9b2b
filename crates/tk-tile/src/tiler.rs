use std::ops::Range;
use std::sync::Arc;

use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tk_core::Image;
use tk_deform::{DeformationField, Interpolation};

use crate::Error;
use crate::augment::Normalizer;
use crate::preprocess::Corpus;
use crate::store::CacheStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilerConfig {
    /// `[rows, cols]` of every returned tile.
    pub tile_shape: [usize; 2],
    /// Model border lost per tile; outputs are `tile_shape - padding`.
    pub padding: [usize; 2],
    pub scale: f32,
    /// Tile spacing as a fraction of the output tile.
    pub max_tile_shift: f32,
    /// How far, in output tiles, the first and last centers move past the
    /// image border.
    pub border_padding_factor: f32,
    /// Size of a reproducible tile subset; `None` or 0 keeps every tile.
    pub val_length: Option<usize>,
    pub val_seed: u64,
    pub return_index: bool,
    pub normalize: bool,
}

impl Default for TilerConfig {
    fn default() -> Self {
        Self {
            tile_shape: [512, 512],
            padding: [0, 0],
            scale: 1.0,
            max_tile_shift: 1.0,
            border_padding_factor: 0.25,
            val_length: None,
            val_seed: 42,
            return_index: false,
            normalize: true,
        }
    }
}

/// One grid tile; `center` is in downscaled image coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub image_index: usize,
    pub center: [i64; 2],
    /// Region of the model output to keep, per axis.
    pub in_slice: [Range<usize>; 2],
    /// Where that region lands in the downscaled image, per axis.
    pub out_slice: [Range<usize>; 2],
}

/// Everything a stitcher needs to place one tile's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileInfo {
    pub image_index: usize,
    pub file_name: String,
    /// `[rows, cols]` after downscaling.
    pub image_shape: [usize; 2],
    pub out_slice: [Range<usize>; 2],
    pub in_slice: [Range<usize>; 2],
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileItem {
    pub image: Image<f32>,
    pub label: Option<Image<u8>>,
    pub index: Option<usize>,
}

/// Tile centers along one axis of length `extent`.
///
/// Centers run from `floor(output / 2) - output * factor` to the mirrored
/// position at the far border, evenly spaced at no more than
/// `output * shift`, and are floored to integers.
pub fn axis_centers(extent: usize, output: usize, factor: f32, shift: f32) -> Result<Vec<i64>, Error> {
    if output == 0 || shift.is_nan() || shift <= 0.0 || factor.is_nan() || factor < 0.0 {
        return Err(Error::InvalidTileLayout(format!(
            "output {output}, shift {shift} and factor {factor} give no tile grid"
        )));
    }
    let (o, f, s) = (output as f64, f64::from(factor), f64::from(shift));
    let start = (output / 2) as f64 - o * f;
    let end = extent as f64 - start;
    let n = ((extent as f64 + 2.0 * o * f) / (o * s)).floor() as usize + 1;

    if n == 1 {
        return Ok(vec![start.floor() as i64]);
    }
    let step = (end - start) / (n - 1) as f64;
    Ok((0..n)
        .map(|i| {
            let v = if i == n - 1 { end } else { start + step * i as f64 };
            v.floor() as i64
        })
        .collect())
}

/// Input and output slices of the tile at `center` along `axis`.
///
/// The output tile spans `[center - floor(output / 2), center + ceil(output / 2))`
/// in image coordinates; both slices are that span clipped to the image.
pub fn tile_slices(
    center: i64,
    output: usize,
    extent: usize,
    axis: usize,
) -> Result<(Range<usize>, Range<usize>), Error> {
    let half_lo = (output / 2) as i64;
    let half_hi = output as i64 - half_lo;
    let (lo, hi) = (center - half_lo, center + half_hi);

    let clamp = |v: i64| v.clamp(0, extent as i64);
    let (out_start, out_end) = (clamp(lo), clamp(hi));
    let (in_start, in_end) = (out_start - lo, out_end - lo);

    if in_start < 0 || in_end > output as i64 || in_end < in_start {
        return Err(Error::InvalidTileLayout(format!(
            "axis {axis}: tile at {center} leaves input slice {in_start}..{in_end} outside 0..{output}"
        )));
    }
    let input = in_start as usize..in_end as usize;
    let out = out_start as usize..out_end as usize;
    if input.len() != out.len() {
        return Err(Error::SliceMismatch {
            axis,
            input,
            output: out,
        });
    }
    Ok((input, out))
}

/// Tiles covering an image of `shape` (`[rows, cols]`), column-major: the row
/// center varies fastest.
pub fn layout_tiles(
    image_index: usize,
    shape: [usize; 2],
    output: [usize; 2],
    factor: f32,
    shift: f32,
) -> Result<Vec<Tile>, Error> {
    let rows = axis_centers(shape[0], output[0], factor, shift)?;
    let cols = axis_centers(shape[1], output[1], factor, shift)?;

    let mut tiles = Vec::with_capacity(rows.len() * cols.len());
    for &c in &cols {
        let (in_c, out_c) = tile_slices(c, output[1], shape[1], 1)?;
        for &r in &rows {
            let (in_r, out_r) = tile_slices(r, output[0], shape[0], 0)?;
            tiles.push(Tile {
                image_index,
                center: [r, c],
                in_slice: [in_r, in_c.clone()],
                out_slice: [out_r, out_c.clone()],
            });
        }
    }
    Ok(tiles)
}

/// Regular grid of overlapping tiles over every corpus image, for inference
/// and validation.
pub struct DeterministicTiler<S> {
    corpus: Arc<Corpus<S>>,
    config: TilerConfig,
    field: DeformationField,
    tiles: Vec<Tile>,
    data_shapes: Vec<[usize; 2]>,
    subset: Option<Vec<usize>>,
    normalizer: Option<Normalizer>,
}

impl<S: CacheStore> DeterministicTiler<S> {
    pub fn new(corpus: Arc<Corpus<S>>, config: TilerConfig) -> Result<Self, Error> {
        if config.scale.is_nan() || config.scale <= 0.0 {
            return Err(Error::InvalidConfig(format!("scale {} must be positive", config.scale)));
        }
        let output = [
            config.tile_shape[0].checked_sub(config.padding[0]),
            config.tile_shape[1].checked_sub(config.padding[1]),
        ];
        let output = match output {
            [Some(r), Some(c)] if r > 0 && c > 0 => [r, c],
            _ => {
                return Err(Error::InvalidConfig(format!(
                    "padding {:?} leaves no output inside tile {:?}",
                    config.padding, config.tile_shape
                )));
            }
        };

        let mut tiles = Vec::new();
        let mut data_shapes = Vec::with_capacity(corpus.len());
        for (i, entry) in corpus.entries().iter().enumerate() {
            let shape = entry
                .shape
                .map(|v| (v as f32 / config.scale).floor() as usize);
            let image_tiles = layout_tiles(
                i,
                shape,
                output,
                config.border_padding_factor,
                config.max_tile_shift,
            )?;
            debug!("{}: {} tiles over {shape:?}", entry.name, image_tiles.len());
            tiles.extend(image_tiles);
            data_shapes.push(shape);
        }

        let subset = match config.val_length {
            Some(v) if v > 0 => {
                let v = if v > tiles.len() {
                    warn!(
                        "val_length {v} exceeds the {} available tiles; using all of them",
                        tiles.len()
                    );
                    tiles.len()
                } else {
                    v
                };
                let mut rng = StdRng::seed_from_u64(config.val_seed);
                Some(rand::seq::index::sample(&mut rng, tiles.len(), v).into_vec())
            }
            _ => None,
        };

        let normalizer = if config.normalize {
            Some(Normalizer::from_stats(corpus.stats())?)
        } else {
            None
        };
        info!(
            "Tiled {} images into {} tiles, serving {}",
            corpus.len(),
            tiles.len(),
            subset.as_ref().map_or(tiles.len(), Vec::len)
        );

        Ok(Self {
            field: DeformationField::new(config.tile_shape, config.scale),
            corpus,
            config,
            tiles,
            data_shapes,
            subset,
            normalizer,
        })
    }

    pub fn len(&self) -> usize {
        self.subset.as_ref().map_or(self.tiles.len(), Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn config(&self) -> &TilerConfig {
        &self.config
    }

    /// Every tile of the grid, ignoring the validation subset.
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Downscaled `[rows, cols]` per corpus image.
    pub fn data_shapes(&self) -> &[[usize; 2]] {
        &self.data_shapes
    }

    fn tile(&self, idx: usize) -> Result<&Tile, Error> {
        let out_of_range = Error::IndexOutOfRange {
            index: idx,
            len: self.len(),
        };
        let resolved = match &self.subset {
            Some(subset) => *subset.get(idx).ok_or(out_of_range)?,
            None => idx,
        };
        self.tiles.get(resolved).ok_or(Error::IndexOutOfRange {
            index: resolved,
            len: self.tiles.len(),
        })
    }

    pub fn get(&self, idx: usize) -> Result<TileItem, Error> {
        let tile = self.tile(idx)?;
        let i = tile.image_index;
        let offset = tile.center.map(|c| c as f32 * self.config.scale);

        let mut image = self.field.apply(
            &self.corpus.image(i)?,
            offset,
            [0, 0],
            Interpolation::Bilinear,
        )?;
        if let Some(norm) = &self.normalizer {
            norm.apply(&mut image)?;
        }
        let label = match self.corpus.label(i)? {
            Some(src) => Some(self.field.apply(&src, offset, [0, 0], Interpolation::Nearest)?),
            None => None,
        };

        Ok(TileItem {
            image,
            label,
            index: self.config.return_index.then_some(idx),
        })
    }

    pub fn tile_info(&self, idx: usize) -> Result<TileInfo, Error> {
        let tile = self.tile(idx)?;
        let i = tile.image_index;
        Ok(TileInfo {
            image_index: i,
            file_name: self.corpus.entry(i)?.name.clone(),
            image_shape: self.data_shapes[i],
            out_slice: tile.out_slice.clone(),
            in_slice: tile.in_slice.clone(),
        })
    }
}
