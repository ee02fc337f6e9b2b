use std::ops::Range;

use log::trace;
use rand::Rng;
use tk_core::{
    ArraySource, Error, Image, Pixel, reflect_index, sample_bilinear, sample_nearest,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Order 0, used for label masks.
    Nearest,
    /// Order 1.
    #[default]
    Bilinear,
}

/// Absolute source coordinates for one tile, row-major over `shape`.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordGrid {
    pub shape: [usize; 2],
    pub row: Vec<f32>,
    pub col: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeformationField {
    shape: [usize; 2],
    scale: f32,
    row: Vec<f32>,
    col: Vec<f32>,
}

impl DeformationField {
    pub fn new(shape: [usize; 2], scale: f32) -> Self {
        let [h, w] = shape;
        let rows = centered_linspace(h, scale);
        let cols = centered_linspace(w, scale);

        let mut row = Vec::with_capacity(h * w);
        let mut col = Vec::with_capacity(h * w);
        for &r in &rows {
            row.extend(std::iter::repeat_n(r, w));
            col.extend_from_slice(&cols);
        }

        Self {
            shape,
            scale,
            row,
            col,
        }
    }

    /// With probability `p_scale`, redraws the scale uniformly from
    /// `[scale_range.0 * scale, scale_range.1 * scale]`. A `(0, 0)` range
    /// keeps `scale`.
    pub fn with_random_scale<R: Rng + ?Sized>(
        shape: [usize; 2],
        scale: f32,
        scale_range: (f32, f32),
        p_scale: f64,
        rng: &mut R,
    ) -> Self {
        let mut active = scale;
        if rng.random::<f64>() < p_scale && scale_range != (0.0, 0.0) {
            let (lo, hi) = (scale_range.0 * scale, scale_range.1 * scale);
            active = lo + (hi - lo) * rng.random::<f32>();
        }
        Self::new(shape, active)
    }

    /// `[rows, cols]` of the full grid.
    pub fn shape(&self) -> [usize; 2] {
        self.shape
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Rotates the current coordinates by `theta` radians.
    pub fn rotate(&mut self, theta: f32) {
        let (sin, cos) = theta.sin_cos();
        for (r, c) in self.row.iter_mut().zip(self.col.iter_mut()) {
            let (r0, c0) = (*r, *c);
            *r = r0 * cos + c0 * sin;
            *c = -r0 * sin + c0 * cos;
        }
    }

    /// With probability `p`, rotates by an angle drawn uniformly from
    /// `range_deg` (degrees).
    pub fn add_random_rotation<R: Rng + ?Sized>(
        &mut self,
        range_deg: (f32, f32),
        p: f64,
        rng: &mut R,
    ) {
        if rng.random::<f64>() < p {
            let deg = range_deg.0 + (range_deg.1 - range_deg.0) * rng.random::<f32>();
            self.rotate(deg.to_radians());
        }
    }

    /// Negates the row (`dims[0]`) and/or column (`dims[1]`) coordinates.
    pub fn mirror(&mut self, dims: [bool; 2]) {
        if dims[0] {
            self.row.iter_mut().for_each(|r| *r = -*r);
        }
        if dims[1] {
            self.col.iter_mut().for_each(|c| *c = -*c);
        }
    }

    /// With probability `p`, mirrors on two independently drawn axis flags.
    pub fn add_random_flip<R: Rng + ?Sized>(&mut self, p: f64, rng: &mut R) {
        if rng.random::<f64>() < p {
            let dims = [rng.random::<bool>(), rng.random::<bool>()];
            self.mirror(dims);
        }
    }

    /// Crops `pad / 2` at the start and `pad - pad / 2` at the end of each
    /// axis, then translates by `offset` (`[row, col]`).
    pub fn get(&self, offset: [f32; 2], pad: [usize; 2]) -> CoordGrid {
        let [h, w] = self.shape;
        let rows = crop(h, pad[0]);
        let cols = crop(w, pad[1]);
        let shape = [rows.len(), cols.len()];

        let mut row = Vec::with_capacity(shape[0] * shape[1]);
        let mut col = Vec::with_capacity(shape[0] * shape[1]);
        for y in rows {
            let start = y * w + cols.start;
            let end = y * w + cols.end;
            row.extend(self.row[start..end].iter().map(|r| r + offset[0]));
            col.extend(self.col[start..end].iter().map(|c| c + offset[1]));
        }

        CoordGrid { shape, row, col }
    }

    /// Resamples `source` on the grid centered at `offset`.
    ///
    /// Only the window of `source` covering every index the interpolation
    /// touches, after reflection into the source, is read. Samples outside the
    /// source mirror back in with the edge pixel repeated.
    pub fn apply<T, S>(
        &self,
        source: &S,
        offset: [f32; 2],
        pad: [usize; 2],
        interpolation: Interpolation,
    ) -> Result<Image<T>, Error>
    where
        T: Pixel,
        S: ArraySource<T> + ?Sized,
    {
        let grid = self.get(offset, pad);
        let [oh, ow] = grid.shape;
        let channels = source.channels();
        let mut out = Image::new_fill_channels(ow, oh, channels, T::default());
        if oh == 0 || ow == 0 {
            return Ok(out);
        }

        let [sh, sw] = source.shape();
        if sh == 0 || sw == 0 {
            return Err(Error::OutOfBounds);
        }

        let rows = source_window(&grid.row, sh, interpolation);
        let cols = source_window(&grid.col, sw, interpolation);
        trace!(
            "deformation window rows {rows:?} cols {cols:?} of {sh}x{sw} for {oh}x{ow} tile"
        );

        let (r0, c0) = (rows.start as f32, cols.start as f32);
        let window = source.read_region(rows, cols)?;
        let view = window.as_view();

        match interpolation {
            Interpolation::Nearest => {
                for (p, px) in out.data_mut().chunks_exact_mut(channels).enumerate() {
                    sample_nearest(&view, grid.col[p] - c0, grid.row[p] - r0, px);
                }
            }
            Interpolation::Bilinear => {
                let mut buf = vec![0.0f32; channels];
                for (p, px) in out.data_mut().chunks_exact_mut(channels).enumerate() {
                    sample_bilinear(&view, grid.col[p] - c0, grid.row[p] - r0, &mut buf);
                    for (dst, &v) in px.iter_mut().zip(&buf) {
                        *dst = T::from_f32(v);
                    }
                }
            }
        }

        Ok(out)
    }
}

fn centered_linspace(n: usize, scale: f32) -> Vec<f32> {
    let half = f64::from(scale) * n as f64 / 2.0;
    let (start, end) = (-half, half - 1.0);
    if n == 1 {
        return vec![start as f32];
    }
    let step = (end - start) / (n - 1) as f64;
    (0..n).map(|i| (start + step * i as f64) as f32).collect()
}

fn crop(len: usize, pad: usize) -> Range<usize> {
    let start = (pad / 2).min(len);
    let end = len.saturating_sub(pad - pad / 2).max(start);
    start..end
}

/// Smallest source range holding every index sampled along one axis.
///
/// When a sample reflects off an edge the window is extended to that edge,
/// so reflecting window-local coordinates matches reflecting source ones.
fn source_window(coords: &[f32], extent: usize, interpolation: Interpolation) -> Range<usize> {
    let (lo, hi) = coords
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() || !hi.is_finite() {
        return 0..extent;
    }

    let (lo, hi) = match interpolation {
        Interpolation::Nearest => (lo.round() as isize, hi.round() as isize),
        Interpolation::Bilinear => (lo.floor() as isize, hi.floor() as isize + 1),
    };

    let n = extent as isize;
    if hi - lo + 1 >= n || lo < -n || hi >= 2 * n {
        return 0..extent;
    }

    let (mut start, mut end) = (extent, 0);
    for m in (lo..=hi).filter_map(|i| reflect_index(i, extent)) {
        start = start.min(m);
        end = end.max(m);
    }
    if lo < 0 {
        start = 0;
    }
    if hi >= n {
        end = extent - 1;
    }

    start..end + 1
}
