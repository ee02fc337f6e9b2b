use rand::RngCore;
use tk_core::Image;

use crate::Error;
use crate::stats::Stats;

/// Photometric step run after geometric resampling.
///
/// Implementations must keep image and label shapes unchanged. Closures with
/// the matching signature implement this trait.
pub trait Augment {
    fn augment(
        &self,
        image: Image<f32>,
        label: Image<u8>,
        rng: &mut dyn RngCore,
    ) -> (Image<f32>, Image<u8>);
}

impl<F> Augment for F
where
    F: Fn(Image<f32>, Image<u8>, &mut dyn RngCore) -> (Image<f32>, Image<u8>),
{
    fn augment(
        &self,
        image: Image<f32>,
        label: Image<u8>,
        rng: &mut dyn RngCore,
    ) -> (Image<f32>, Image<u8>) {
        self(image, label, rng)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoAugment;

impl Augment for NoAugment {
    fn augment(
        &self,
        image: Image<f32>,
        label: Image<u8>,
        _rng: &mut dyn RngCore,
    ) -> (Image<f32>, Image<u8>) {
        (image, label)
    }
}

/// Per-channel `(x - mean) / std`.
///
/// A zero standard deviation is treated as 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalizer {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl Normalizer {
    pub fn new(mean: Vec<f32>, std: Vec<f32>) -> Result<Self, Error> {
        if mean.len() != std.len() {
            return Err(tk_core::Error::ChannelMismatch {
                expected: mean.len(),
                actual: std.len(),
            }
            .into());
        }
        Ok(Self { mean, std })
    }

    pub fn from_stats(stats: &Stats) -> Result<Self, Error> {
        Self::new(stats.channel_means.clone(), stats.channel_stds.clone())
    }

    pub fn apply(&self, image: &mut Image<f32>) -> Result<(), Error> {
        let ch = image.channels();
        if ch != self.mean.len() {
            return Err(tk_core::Error::ChannelMismatch {
                expected: self.mean.len(),
                actual: ch,
            }
            .into());
        }

        let scale: Vec<(f32, f32)> = self
            .mean
            .iter()
            .zip(&self.std)
            .map(|(&m, &s)| {
                let s = if s == 0.0 { 1.0 } else { s };
                (m, 1.0 / s)
            })
            .collect();

        for px in image.data_mut().chunks_exact_mut(ch) {
            for (v, &(m, inv)) in px.iter_mut().zip(&scale) {
                *v = (*v - m) * inv;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};
    use tk_core::Image;

    use super::{Augment, NoAugment, Normalizer};

    #[test]
    fn normalizes_each_channel() {
        let mut img = Image::from_vec_channels(1, 2, 2, vec![3.0f32, 10.0, 5.0, 30.0])
            .expect("valid image");
        let norm = Normalizer::new(vec![4.0, 20.0], vec![1.0, 10.0]).expect("matching lengths");
        norm.apply(&mut img).expect("two channels");
        assert_eq!(img.data(), &[-1.0, -1.0, 1.0, 1.0]);

        let mut gray = Image::new_fill(2, 2, 0.0f32);
        assert!(norm.apply(&mut gray).is_err());
    }

    #[test]
    fn zero_std_only_subtracts_the_mean() {
        let mut img = Image::new_fill(2, 1, 5.0f32);
        let norm = Normalizer::new(vec![2.0], vec![0.0]).expect("matching lengths");
        norm.apply(&mut img).expect("one channel");
        assert_eq!(img.data(), &[3.0, 3.0]);
    }

    #[test]
    fn closures_are_augmentations() {
        let invert = |img: Image<f32>, lbl: Image<u8>, _rng: &mut dyn RngCore| {
            (img.map(|v| 1.0 - v), lbl)
        };
        let mut rng = StdRng::seed_from_u64(3);
        let img = Image::new_fill(2, 1, 0.25f32);
        let lbl = Image::new_fill(2, 1, 1u8);

        let (out, same) = invert.augment(img.clone(), lbl.clone(), &mut rng);
        assert_eq!(out.data(), &[0.75, 0.75]);
        assert_eq!(same, lbl);

        let (out, _) = NoAugment.augment(img.clone(), lbl, &mut rng);
        assert_eq!(out, img);
    }
}
