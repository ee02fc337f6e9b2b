use tk_core::{Image, ImageView};

use crate::downsample::downsample2x2_mean_f32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeFilter {
    /// Pixel-area averaging when shrinking an axis, bilinear when growing it.
    #[default]
    Area,
    /// Half-pixel-centered bilinear on both axes.
    Bilinear,
}

/// Source taps contributing to one destination index.
#[derive(Debug, Clone)]
struct Taps {
    start: usize,
    weights: Vec<f32>,
}

/// Resizes a single-channel surface to `dst_w x dst_h`.
///
/// Area weights of each destination pixel sum to one, so constant inputs stay
/// constant and total mass scales with the pixel count.
pub fn resize_f32(
    src: &ImageView<'_, f32>,
    dst_w: usize,
    dst_h: usize,
    filter: ResizeFilter,
) -> Image<f32> {
    assert_eq!(src.channels(), 1, "resize expects single-channel input");
    if dst_w == 0 || dst_h == 0 || src.width() == 0 || src.height() == 0 {
        return Image::new_fill(dst_w, dst_h, 0.0);
    }

    if filter == ResizeFilter::Area && src.width() == 2 * dst_w && src.height() == 2 * dst_h {
        return downsample2x2_mean_f32(src);
    }

    let col_taps = axis_taps(src.width(), dst_w, filter);
    let row_taps = axis_taps(src.height(), dst_h, filter);

    let mut horiz = vec![0.0f32; src.height() * dst_w];
    for y in 0..src.height() {
        let row = src.row(y);
        let out = &mut horiz[y * dst_w..(y + 1) * dst_w];
        for (o, taps) in out.iter_mut().zip(&col_taps) {
            *o = taps
                .weights
                .iter()
                .zip(&row[taps.start..])
                .map(|(w, v)| w * v)
                .sum();
        }
    }

    let mut dst = Image::new_fill(dst_w, dst_h, 0.0f32);
    for (y, taps) in row_taps.iter().enumerate() {
        let out = &mut dst.data_mut()[y * dst_w..(y + 1) * dst_w];
        for (k, &w) in taps.weights.iter().enumerate() {
            let src_row = &horiz[(taps.start + k) * dst_w..(taps.start + k + 1) * dst_w];
            for (o, &v) in out.iter_mut().zip(src_row) {
                *o += w * v;
            }
        }
    }

    dst
}

fn axis_taps(src_len: usize, dst_len: usize, filter: ResizeFilter) -> Vec<Taps> {
    match filter {
        ResizeFilter::Area if src_len >= dst_len => area_taps(src_len, dst_len),
        _ => linear_taps(src_len, dst_len),
    }
}

fn area_taps(src_len: usize, dst_len: usize) -> Vec<Taps> {
    let scale = src_len as f64 / dst_len as f64;
    (0..dst_len)
        .map(|i| {
            let lo = i as f64 * scale;
            let hi = ((i + 1) as f64 * scale).min(src_len as f64);
            let start = lo.floor() as usize;
            let end = (hi.ceil() as usize).min(src_len).max(start + 1);
            let weights = (start..end)
                .map(|j| {
                    let overlap = (hi.min((j + 1) as f64) - lo.max(j as f64)).max(0.0);
                    (overlap / scale) as f32
                })
                .collect();
            Taps { start, weights }
        })
        .collect()
}

fn linear_taps(src_len: usize, dst_len: usize) -> Vec<Taps> {
    let scale = src_len as f64 / dst_len as f64;
    let last = src_len - 1;
    (0..dst_len)
        .map(|i| {
            let pos = ((i as f64 + 0.5) * scale - 0.5).clamp(0.0, last as f64);
            let j0 = pos.floor() as usize;
            let frac = (pos - j0 as f64) as f32;
            if j0 >= last || frac == 0.0 {
                Taps {
                    start: j0,
                    weights: vec![1.0],
                }
            } else {
                Taps {
                    start: j0,
                    weights: vec![1.0 - frac, frac],
                }
            }
        })
        .collect()
}
