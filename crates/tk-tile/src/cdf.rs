use std::collections::BTreeMap;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tk_core::{Image, ImageView};
use tk_resize::{ResizeFilter, resize_f32};

use crate::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CdfParams {
    /// Rows of the reshaped surface; columns follow the label aspect ratio.
    pub reshape: usize,
    /// Tile height, used to size the zeroed border band.
    pub tile_rows: usize,
    /// Border band width as a fraction of `tile_rows`, split over both sides.
    pub ignore_edges_pct: f32,
    /// Explicit class weights. Classes missing from the table get weight 0.
    pub weights: Option<BTreeMap<u8, f32>>,
}

impl Default for CdfParams {
    fn default() -> Self {
        Self {
            reshape: 512,
            tile_rows: 512,
            ignore_edges_pct: 0.0,
            weights: None,
        }
    }
}

/// Flattened cumulative sampling density over a reshaped `rows x cols` grid.
#[derive(Debug, Clone, PartialEq)]
pub struct CdfSurface {
    rows: usize,
    cols: usize,
    cumulative: Vec<f32>,
}

impl CdfSurface {
    /// Builds the surface from a single-channel label.
    ///
    /// Without explicit weights each present class `k` weighs
    /// `1 - count(k) / N`, favoring rare classes. Ignored pixels and the
    /// optional border band get weight 0. A surface that sums to zero falls
    /// back to a uniform density.
    pub fn build(
        label: &ImageView<'_, u8>,
        ignore: Option<&ImageView<'_, bool>>,
        params: &CdfParams,
    ) -> Result<Self, Error> {
        if label.channels() != 1 {
            return Err(tk_core::Error::ChannelMismatch {
                expected: 1,
                actual: label.channels(),
            }
            .into());
        }
        let [h, w] = label.shape();
        if h == 0 || w == 0 {
            return Err(Error::InvalidConfig(
                "cannot build a sampling surface for an empty label".into(),
            ));
        }
        if params.reshape == 0 {
            return Err(Error::InvalidConfig("pdf reshape must be positive".into()));
        }
        if let Some(ignore) = ignore
            && ignore.shape() != label.shape()
        {
            return Err(tk_core::Error::ShapeMismatch {
                expected: label.shape(),
                actual: ignore.shape(),
            }
            .into());
        }

        let table = class_weights(label, params.weights.as_ref());

        let mut pdf = Image::new_fill(w, h, 0.0f32);
        for y in 0..h {
            let out = &mut pdf.data_mut()[y * w..(y + 1) * w];
            for (o, &k) in out.iter_mut().zip(label.row(y)) {
                *o = table[usize::from(k)];
            }
            if let Some(ignore) = ignore {
                for (o, &skip) in out.iter_mut().zip(ignore.row(y)) {
                    if skip {
                        *o = 0.0;
                    }
                }
            }
        }

        let band = (params.tile_rows as f32 * params.ignore_edges_pct / 2.0) as usize;
        if band > 0 {
            zero_border(&mut pdf, band);
        }

        let rows = params.reshape;
        let cols = ((w as f64 / h as f64) * rows as f64).floor().max(1.0) as usize;
        let resized = resize_f32(&pdf.as_view(), cols, rows, ResizeFilter::Area);

        let total: f64 = resized.data().iter().map(|&v| f64::from(v)).sum();
        let uniform = !(total.is_finite() && total > 0.0);
        if uniform {
            warn!("sampling surface of {h}x{w} label sums to {total}; using a uniform density");
        }

        let n = resized.data().len();
        let mut running = 0.0f64;
        let cumulative = resized
            .data()
            .iter()
            .map(|&v| {
                running += if uniform {
                    1.0 / n as f64
                } else {
                    f64::from(v) / total
                };
                running as f32
            })
            .collect();

        debug!("built {rows}x{cols} sampling surface for {h}x{w} label");
        Ok(Self {
            rows,
            cols,
            cumulative,
        })
    }

    /// Rebuilds a surface from stored parts, checking length and ordering.
    pub fn from_parts(rows: usize, cols: usize, cumulative: Vec<f32>) -> Result<Self, Error> {
        if rows * cols != cumulative.len() || cumulative.is_empty() {
            return Err(tk_core::Error::SizeMismatch {
                expected: rows * cols,
                actual: cumulative.len(),
            }
            .into());
        }
        if cumulative.windows(2).any(|p| p[1] < p[0]) {
            return Err(Error::InvalidConfig(
                "cumulative surface must be non-decreasing".into(),
            ));
        }
        Ok(Self {
            rows,
            cols,
            cumulative,
        })
    }

    /// `[rows, cols]` of the reshaped grid.
    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    pub fn cumulative(&self) -> &[f32] {
        &self.cumulative
    }

    /// Maps a uniform draw `u` in `[0, 1)` to a pixel of an image of shape
    /// `orig_shape` (`[rows, cols]`, before reshaping).
    ///
    /// Picks the first cell whose cumulative value exceeds `u`, or the last
    /// cell when rounding leaves none.
    pub fn random_center(&self, u: f32, orig_shape: [usize; 2]) -> [usize; 2] {
        let last = self.cumulative.len() - 1;
        let idx = self.cumulative.partition_point(|&v| v <= u).min(last);
        let (r, c) = (idx / self.cols, idx % self.cols);
        [r * orig_shape[0] / self.rows, c * orig_shape[1] / self.cols]
    }
}

fn class_weights(label: &ImageView<'_, u8>, explicit: Option<&BTreeMap<u8, f32>>) -> [f32; 256] {
    let mut table = [0.0f32; 256];
    match explicit {
        Some(weights) => {
            for (&k, &v) in weights {
                table[usize::from(k)] = v;
            }
        }
        None => {
            let mut counts = [0usize; 256];
            for y in 0..label.height() {
                for &k in label.row(y) {
                    counts[usize::from(k)] += 1;
                }
            }
            let n = (label.width() * label.height()) as f64;
            for (t, &count) in table.iter_mut().zip(&counts) {
                if count > 0 {
                    *t = (1.0 - count as f64 / n) as f32;
                }
            }
        }
    }
    table
}

fn zero_border(pdf: &mut Image<f32>, band: usize) {
    let (w, h) = (pdf.width(), pdf.height());
    let bw = band.min(w);
    let bh = band.min(h);
    let data = pdf.data_mut();
    for y in 0..h {
        let row = &mut data[y * w..(y + 1) * w];
        if y < bh || y >= h - bh {
            row.fill(0.0);
        } else {
            row[..bw].fill(0.0);
            row[w - bw..].fill(0.0);
        }
    }
}
