use serde::{Deserialize, Serialize};
use tk_core::ImageView;

use crate::Error;

/// Corpus-wide channel statistics, frozen after preprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub channel_means: Vec<f32>,
    pub channel_stds: Vec<f32>,
    pub max_tiles_per_image: usize,
}

/// Number of `h x w` rectangles needed to cover an `rows x cols` rectangle.
pub fn tiles_in_rectangles(rows: usize, cols: usize, h: usize, w: usize) -> usize {
    rows.div_ceil(h.max(1)) * cols.div_ceil(w.max(1))
}

/// Per-file accumulation of channel mean/variance and tile counts.
///
/// Every image contributes one mean and one population variance per
/// channel, regardless of its size.
#[derive(Debug, Clone)]
pub struct StatsAccumulator {
    output_tile: [usize; 2],
    mean_sum: Vec<f64>,
    var_sum: Vec<f64>,
    max_tiles: usize,
    count: usize,
}

impl StatsAccumulator {
    /// `output_tile` is the tile shape minus padding.
    pub fn new(output_tile: [usize; 2]) -> Self {
        Self {
            output_tile,
            mean_sum: Vec::new(),
            var_sum: Vec::new(),
            max_tiles: 0,
            count: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn push(&mut self, img: &ImageView<'_, f32>) -> Result<(), Error> {
        let ch = img.channels();
        if self.count == 0 {
            self.mean_sum = vec![0.0; ch];
            self.var_sum = vec![0.0; ch];
        } else if ch != self.mean_sum.len() {
            return Err(tk_core::Error::ChannelMismatch {
                expected: self.mean_sum.len(),
                actual: ch,
            }
            .into());
        }

        let n = (img.width() * img.height()) as f64;
        if n > 0.0 {
            let mut sum = vec![0.0f64; ch];
            for y in 0..img.height() {
                for px in img.row(y).chunks_exact(ch) {
                    for (s, &v) in sum.iter_mut().zip(px) {
                        *s += f64::from(v);
                    }
                }
            }
            let mean: Vec<f64> = sum.iter().map(|s| s / n).collect();

            let mut sq = vec![0.0f64; ch];
            for y in 0..img.height() {
                for px in img.row(y).chunks_exact(ch) {
                    for ((s, &m), &v) in sq.iter_mut().zip(&mean).zip(px) {
                        let d = f64::from(v) - m;
                        *s += d * d;
                    }
                }
            }

            for c in 0..ch {
                self.mean_sum[c] += mean[c];
                self.var_sum[c] += sq[c] / n;
            }
        }

        let [h, w] = self.output_tile;
        self.max_tiles = self
            .max_tiles
            .max(tiles_in_rectangles(img.height(), img.width(), h, w));
        self.count += 1;
        Ok(())
    }

    /// `None` when nothing was pushed.
    pub fn finish(self) -> Option<Stats> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(Stats {
            channel_means: self.mean_sum.iter().map(|m| (m / n) as f32).collect(),
            channel_stds: self.var_sum.iter().map(|v| (v / n).sqrt() as f32).collect(),
            max_tiles_per_image: self.max_tiles,
        })
    }
}

#[cfg(test)]
mod tests {
    use tk_core::Image;

    use super::{StatsAccumulator, tiles_in_rectangles};

    #[test]
    fn rectangle_count_rounds_up() {
        assert_eq!(tiles_in_rectangles(100, 100, 32, 32), 16);
        assert_eq!(tiles_in_rectangles(64, 65, 32, 32), 6);
        assert_eq!(tiles_in_rectangles(0, 10, 4, 4), 0);
    }

    #[test]
    fn per_file_mean_and_variance() {
        let a = Image::from_vec(2, 1, vec![0.0f32, 2.0]).expect("valid image");
        let b = Image::from_vec(1, 4, vec![4.0f32; 4]).expect("valid image");

        let mut acc = StatsAccumulator::new([2, 2]);
        acc.push(&a.as_view()).expect("single channel");
        acc.push(&b.as_view()).expect("single channel");
        assert_eq!(acc.count(), 2);

        let stats = acc.finish().expect("two files");
        // Means 1 and 4, variances 1 and 0.
        assert!((stats.channel_means[0] - 2.5).abs() < 1e-6);
        assert!((stats.channel_stds[0] - 0.5f32.sqrt()).abs() < 1e-6);
        assert_eq!(stats.max_tiles_per_image, 2);
    }

    #[test]
    fn channels_are_tracked_separately() {
        let img = Image::from_vec_channels(2, 1, 2, vec![1.0f32, 10.0, 3.0, 30.0])
            .expect("valid image");
        let mut acc = StatsAccumulator::new([1, 1]);
        acc.push(&img.as_view()).expect("first image");
        let stats = acc.finish().expect("one file");
        assert_eq!(stats.channel_means, vec![2.0, 20.0]);
        assert_eq!(stats.channel_stds, vec![1.0, 10.0]);
    }

    #[test]
    fn channel_count_must_stay_fixed() {
        let gray = Image::new_fill(2, 2, 0.0f32);
        let rgb = Image::new_fill_channels(2, 2, 3, 0.0f32);
        let mut acc = StatsAccumulator::new([1, 1]);
        acc.push(&gray.as_view()).expect("first image");
        assert!(acc.push(&rgb.as_view()).is_err());
    }

    #[test]
    fn empty_accumulator_has_no_stats() {
        assert!(StatsAccumulator::new([4, 4]).finish().is_none());
    }
}
