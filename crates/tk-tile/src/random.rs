use std::sync::Arc;

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tk_core::Image;
use tk_deform::{DeformationField, Interpolation};

use crate::Error;
use crate::augment::{Augment, NoAugment, Normalizer};
use crate::preprocess::Corpus;
use crate::store::CacheStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomTileConfig {
    /// `[rows, cols]` of every returned tile.
    pub tile_shape: [usize; 2],
    pub scale: f32,
    /// Relative scale range; `(0, 0)` disables scale jitter.
    pub scale_range: (f32, f32),
    pub p_scale: f64,
    pub flip: bool,
    /// Degrees; an empty range disables rotation.
    pub rotation_range_deg: (f32, f32),
    /// Samples per file per epoch. Derived from the corpus stats when unset.
    pub sample_mult: Option<usize>,
    pub min_length: usize,
    pub normalize: bool,
}

impl Default for RandomTileConfig {
    fn default() -> Self {
        Self {
            tile_shape: [512, 512],
            scale: 1.0,
            scale_range: (0.0, 0.0),
            p_scale: 1.0,
            flip: true,
            rotation_range_deg: (0.0, 360.0),
            sample_mult: None,
            min_length: 400,
            normalize: true,
        }
    }
}

/// Draws augmented training tiles centered by each file's sampling surface.
///
/// `get` takes `&self`; callers bring their own RNG, so one sampler can be
/// shared between workers.
pub struct RandomTileSampler<S, A = NoAugment> {
    corpus: Arc<Corpus<S>>,
    config: RandomTileConfig,
    sample_mult: usize,
    augment: A,
    normalizer: Option<Normalizer>,
}

impl<S: CacheStore> RandomTileSampler<S, NoAugment> {
    /// Every corpus entry needs a label.
    pub fn new(corpus: Arc<Corpus<S>>, config: RandomTileConfig) -> Result<Self, Error> {
        if let Some(entry) = corpus.entries().iter().find(|e| !e.has_label) {
            return Err(Error::MissingEntry {
                namespace: "labels",
                key: entry.name.clone(),
            });
        }
        if config.tile_shape.contains(&0) || config.scale <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "tile shape {:?} at scale {} samples nothing",
                config.tile_shape, config.scale
            )));
        }

        let sample_mult = config.sample_mult.unwrap_or_else(|| {
            let per_image =
                (corpus.stats().max_tiles_per_image as f32 / (config.scale * config.scale)).floor();
            (per_image as usize).max(config.min_length / corpus.len().max(1))
        });
        let normalizer = if config.normalize {
            Some(Normalizer::from_stats(corpus.stats())?)
        } else {
            None
        };
        debug!(
            "random sampler: {} files x {sample_mult} samples",
            corpus.len()
        );

        Ok(Self {
            corpus,
            config,
            sample_mult,
            augment: NoAugment,
            normalizer,
        })
    }
}

impl<S: CacheStore, A: Augment> RandomTileSampler<S, A> {
    /// Replaces the photometric step run after resampling.
    pub fn with_augment<B: Augment>(self, augment: B) -> RandomTileSampler<S, B> {
        RandomTileSampler {
            corpus: self.corpus,
            config: self.config,
            sample_mult: self.sample_mult,
            augment,
            normalizer: self.normalizer,
        }
    }

    pub fn len(&self) -> usize {
        self.corpus.len() * self.sample_mult
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sample_mult(&self) -> usize {
        self.sample_mult
    }

    pub fn config(&self) -> &RandomTileConfig {
        &self.config
    }

    pub fn corpus(&self) -> &Corpus<S> {
        &self.corpus
    }

    /// Returns the image and label tile for sample `idx` of file
    /// `idx % files`.
    pub fn get<R: Rng>(&self, idx: usize, rng: &mut R) -> Result<(Image<f32>, Image<u8>), Error> {
        if idx >= self.len() {
            return Err(Error::IndexOutOfRange {
                index: idx,
                len: self.len(),
            });
        }
        let file = idx % self.corpus.len();
        let entry = self.corpus.entry(file)?;

        let cdf = self.corpus.cdf(file)?.ok_or_else(|| Error::MissingEntry {
            namespace: "pdfs",
            key: entry.name.clone(),
        })?;
        let center = cdf.random_center(rng.random::<f32>(), entry.shape);

        let cfg = &self.config;
        let mut field = DeformationField::with_random_scale(
            cfg.tile_shape,
            cfg.scale,
            cfg.scale_range,
            cfg.p_scale,
            rng,
        );
        if cfg.flip {
            field.add_random_flip(1.0, rng);
        }
        if cfg.rotation_range_deg.0 < cfg.rotation_range_deg.1 {
            field.add_random_rotation(cfg.rotation_range_deg, 0.5, rng);
        }

        let offset = [center[0] as f32, center[1] as f32];
        let image = field.apply(
            &self.corpus.image(file)?,
            offset,
            [0, 0],
            Interpolation::Bilinear,
        )?;
        let source_label = self.corpus.label(file)?.ok_or_else(|| Error::MissingEntry {
            namespace: "labels",
            key: entry.name.clone(),
        })?;
        let label = field.apply(&source_label, offset, [0, 0], Interpolation::Nearest)?;

        let (mut image, label) = self.augment.augment(image, label, rng);
        if let Some(norm) = &self.normalizer {
            norm.apply(&mut image)?;
        }
        Ok((image, label))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};
    use tk_core::Image;

    use super::{RandomTileConfig, RandomTileSampler};
    use crate::Error;
    use crate::preprocess::{Corpus, PreprocessConfig, Preprocessor, SourceFile};
    use crate::reader::SourceReader;
    use crate::stats::Stats;
    use crate::store::MemoryStore;

    struct MapReader {
        images: HashMap<PathBuf, Image<f32>>,
        masks: HashMap<PathBuf, Image<u32>>,
    }

    impl SourceReader for MapReader {
        fn read_image(&self, path: &Path) -> Result<Image<f32>, Error> {
            self.images
                .get(path)
                .cloned()
                .ok_or_else(|| Error::InvalidConfig(path.display().to_string()))
        }

        fn read_mask(&self, path: &Path) -> Result<Image<u32>, Error> {
            self.masks
                .get(path)
                .cloned()
                .ok_or_else(|| Error::InvalidConfig(path.display().to_string()))
        }
    }

    /// One 32x32 image: value 10 inside a centered 8x8 square of class 1.
    fn corpus() -> Arc<Corpus<MemoryStore>> {
        corpus_with_stats(0.0, 1.0)
    }

    fn corpus_with_stats(mean: f32, std: f32) -> Arc<Corpus<MemoryStore>> {
        let mut img = Image::new_fill(32, 32, 0.0f32);
        let mut mask = Image::new_fill(32, 32, 0u32);
        for y in 12..20 {
            for x in 12..20 {
                *img.get_mut(x, y).expect("in bounds") = 10.0;
                *mask.get_mut(x, y).expect("in bounds") = 1;
            }
        }
        let reader = MapReader {
            images: HashMap::from([("sq.tif".into(), img)]),
            masks: HashMap::from([("sq_mask.png".into(), mask)]),
        };
        let config = PreprocessConfig {
            tile_shape: [8, 8],
            pdf_reshape: 32,
            stats: Some(Stats {
                channel_means: vec![mean],
                channel_stds: vec![std],
                max_tiles_per_image: 16,
            }),
            ..PreprocessConfig::default()
        };
        let corpus = Preprocessor::new(reader, MemoryStore::new(), config)
            .run(&[SourceFile::new("sq.tif").with_label("sq_mask.png")])
            .expect("preprocess");
        Arc::new(corpus)
    }

    fn plain() -> RandomTileConfig {
        RandomTileConfig {
            tile_shape: [8, 8],
            flip: false,
            rotation_range_deg: (0.0, 0.0),
            min_length: 4,
            ..RandomTileConfig::default()
        }
    }

    #[test]
    fn length_follows_sample_mult() {
        let sampler = RandomTileSampler::new(corpus(), plain()).expect("labelled corpus");
        assert_eq!(sampler.sample_mult(), 16);
        assert_eq!(sampler.len(), 16);

        let halved = RandomTileConfig {
            scale: 2.0,
            ..plain()
        };
        let sampler = RandomTileSampler::new(corpus(), halved).expect("labelled corpus");
        assert_eq!(sampler.sample_mult(), 4);

        let fixed = RandomTileConfig {
            sample_mult: Some(3),
            ..plain()
        };
        assert_eq!(RandomTileSampler::new(corpus(), fixed).expect("labelled corpus").len(), 3);
    }

    #[test]
    fn tiles_keep_image_and_label_aligned() {
        let sampler = RandomTileSampler::new(
            corpus(),
            RandomTileConfig {
                rotation_range_deg: (0.0, 360.0),
                flip: true,
                ..plain()
            },
        )
        .expect("labelled corpus");
        let mut rng = StdRng::seed_from_u64(11);
        for idx in 0..sampler.len() {
            let (img, lbl) = sampler.get(idx, &mut rng).expect("sample");
            assert_eq!(img.shape(), [8, 8]);
            assert_eq!(lbl.shape(), [8, 8]);
            assert!(lbl.data().iter().all(|&v| v <= 1));
        }
    }

    #[test]
    fn unrotated_tiles_match_labels_exactly() {
        let sampler = RandomTileSampler::new(corpus(), plain()).expect("labelled corpus");
        let mut rng = StdRng::seed_from_u64(5);
        let (img, lbl) = sampler.get(0, &mut rng).expect("sample");
        for (&v, &k) in img.data().iter().zip(lbl.data()) {
            assert_eq!(v, if k == 1 { 10.0 } else { 0.0 });
        }
    }

    #[test]
    fn augmentation_runs_before_normalization() {
        let config = RandomTileConfig {
            normalize: true,
            ..plain()
        };
        let sampler = RandomTileSampler::new(corpus_with_stats(2.0, 4.0), config)
            .expect("labelled corpus")
            .with_augment(|img: Image<f32>, lbl: Image<u8>, _rng: &mut dyn RngCore| {
                (img.map(|_| 3.0), lbl)
            });
        let mut rng = StdRng::seed_from_u64(1);
        let (img, _) = sampler.get(1, &mut rng).expect("sample");
        // (3 - 2) / 4; the reverse order would leave 3
        assert!(img.data().iter().all(|&v| v == 0.25), "{:?}", img.data());
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let sampler = RandomTileSampler::new(corpus(), plain()).expect("labelled corpus");
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            sampler.get(sampler.len(), &mut rng),
            Err(Error::IndexOutOfRange { .. })
        ));
    }
}
