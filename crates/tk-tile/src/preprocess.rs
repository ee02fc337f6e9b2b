use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tk_core::{ArraySource, Image};

use crate::Error;
use crate::cdf::{CdfParams, CdfSurface};
use crate::reader::{LabelOptions, SourceReader, read_label};
use crate::stats::{Stats, StatsAccumulator};
use crate::store::{CacheStore, Namespace};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub labels: LabelOptions,
    /// `[rows, cols]`.
    pub tile_shape: [usize; 2],
    pub padding: [usize; 2],
    pub pdf_reshape: usize,
    pub ignore_edges_pct: f32,
    pub sampling_weights: Option<BTreeMap<u8, f32>>,
    /// Reuse complete cache entries instead of clearing the store.
    pub use_cached: bool,
    /// Skip statistics accumulation and use these instead.
    pub stats: Option<Stats>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            labels: LabelOptions::default(),
            tile_shape: [512, 512],
            padding: [0, 0],
            pdf_reshape: 512,
            ignore_edges_pct: 0.0,
            sampling_weights: None,
            use_cached: false,
            stats: None,
        }
    }
}

impl PreprocessConfig {
    /// Tile shape minus padding.
    pub fn output_shape(&self) -> Result<[usize; 2], Error> {
        let rows = self.tile_shape[0].checked_sub(self.padding[0]);
        let cols = self.tile_shape[1].checked_sub(self.padding[1]);
        match (rows, cols) {
            (Some(r), Some(c)) if r > 0 && c > 0 => Ok([r, c]),
            _ => Err(Error::InvalidConfig(format!(
                "padding {:?} leaves no output inside tile {:?}",
                self.padding, self.tile_shape
            ))),
        }
    }

    fn cdf_params(&self) -> CdfParams {
        CdfParams {
            reshape: self.pdf_reshape,
            tile_rows: self.tile_shape[0],
            ignore_edges_pct: self.ignore_edges_pct,
            weights: self.sampling_weights.clone(),
        }
    }
}

/// One image and its optional mask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub image: PathBuf,
    pub label: Option<PathBuf>,
}

impl SourceFile {
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<PathBuf>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Cache key: the image file name.
    pub fn name(&self) -> String {
        self.image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.image.to_string_lossy().into_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub name: String,
    /// `[rows, cols]` of the cached image.
    pub shape: [usize; 2],
    pub channels: usize,
    pub has_label: bool,
}

/// Converts source files into cached image, label and sampling-surface
/// entries, accumulating corpus statistics on the way.
pub struct Preprocessor<R, S> {
    reader: R,
    store: S,
    config: PreprocessConfig,
    ignore: HashMap<String, Image<bool>>,
}

impl<R: SourceReader, S: CacheStore> Preprocessor<R, S> {
    pub fn new(reader: R, store: S, config: PreprocessConfig) -> Self {
        Self {
            reader,
            store,
            config,
            ignore: HashMap::new(),
        }
    }

    /// Excludes pixels of the file named `name` from center sampling.
    pub fn with_ignore(mut self, name: impl Into<String>, mask: Image<bool>) -> Self {
        self.ignore.insert(name.into(), mask);
        self
    }

    pub fn run(self, files: &[SourceFile]) -> Result<Corpus<S>, Error> {
        self.run_with_progress(files, |_, _| {})
    }

    /// Like [`Preprocessor::run`], calling `progress(i, file)` before each file.
    pub fn run_with_progress(
        mut self,
        files: &[SourceFile],
        mut progress: impl FnMut(usize, &SourceFile),
    ) -> Result<Corpus<S>, Error> {
        if files.is_empty() {
            return Err(Error::InvalidConfig("no source files".into()));
        }
        self.config.labels.validate()?;
        let mut seen = HashSet::new();
        for f in files {
            if !seen.insert(f.name()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate file name `{}`",
                    f.name()
                )));
            }
        }

        let output = self.config.output_shape()?;
        if !self.config.use_cached {
            self.store.clear()?;
        }

        info!("Preprocessing {} files", files.len());
        let mut acc = self
            .config
            .stats
            .is_none()
            .then(|| StatsAccumulator::new(output));
        let mut entries = Vec::with_capacity(files.len());
        let mut reused = 0usize;

        for (i, file) in files.iter().enumerate() {
            progress(i, file);
            let name = file.name();

            let cached = if self.config.use_cached && self.is_cached(file, &name) {
                match self.load_cached(file, &name, acc.as_mut()) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!("cache entry `{name}` unreadable ({e}); recomputing");
                        None
                    }
                }
            } else {
                None
            };

            let entry = match cached {
                Some(entry) => {
                    reused += 1;
                    entry
                }
                None => self.process_file(file, &name, acc.as_mut())?,
            };
            entries.push(entry);
        }

        if reused > 0 {
            info!("Reused {reused} of {} cached entries", files.len());
        }

        let stats = match self.config.stats.take() {
            Some(stats) => stats,
            None => {
                let stats = acc
                    .and_then(StatsAccumulator::finish)
                    .ok_or_else(|| Error::InvalidConfig("no files contributed statistics".into()))?;
                info!("Calculated stats {stats:?}");
                stats
            }
        };

        Ok(Corpus {
            store: self.store,
            entries,
            stats,
            num_classes: self.config.labels.num_classes,
        })
    }

    fn is_cached(&self, file: &SourceFile, name: &str) -> bool {
        self.store.contains(Namespace::Images, name)
            && (file.label.is_none()
                || (self.store.contains(Namespace::Labels, name)
                    && self.store.contains(Namespace::Pdfs, name)))
    }

    fn load_cached(
        &self,
        file: &SourceFile,
        name: &str,
        acc: Option<&mut StatsAccumulator>,
    ) -> Result<CorpusEntry, Error> {
        let image = self.store.image(name)?;
        let shape = image.shape();
        let channels = image.channels();
        if file.label.is_some() {
            let label = self.store.label(name)?;
            if label.shape() != shape {
                return Err(tk_core::Error::ShapeMismatch {
                    expected: shape,
                    actual: label.shape(),
                }
                .into());
            }
            self.store.cdf(name)?;
        }
        if let Some(acc) = acc {
            acc.push(&image.read_all()?.as_view())?;
        }
        debug!("{name}: using cached entry");
        Ok(CorpusEntry {
            name: name.to_string(),
            shape,
            channels,
            has_label: file.label.is_some(),
        })
    }

    fn process_file(
        &mut self,
        file: &SourceFile,
        name: &str,
        acc: Option<&mut StatsAccumulator>,
    ) -> Result<CorpusEntry, Error> {
        let image = self.reader.read_image(&file.image)?;
        if let Some(acc) = acc {
            acc.push(&image.as_view())?;
        }
        let shape = image.shape();
        let channels = image.channels();
        self.store.put_image(name, image)?;

        if let Some(label_path) = &file.label {
            let raw = self.reader.read_mask(label_path)?;
            let label = read_label(&raw, &self.config.labels)?;
            if label.shape() != shape {
                return Err(tk_core::Error::ShapeMismatch {
                    expected: shape,
                    actual: label.shape(),
                }
                .into());
            }

            let ignore = self.ignore.get(name).map(Image::as_view);
            let cdf = CdfSurface::build(&label.as_view(), ignore.as_ref(), &self.config.cdf_params())?;
            self.store.put_label(name, label)?;
            self.store.put_cdf(name, cdf)?;
        }

        debug!("{name}: preprocessed {}x{}x{channels}", shape[0], shape[1]);
        Ok(CorpusEntry {
            name: name.to_string(),
            shape,
            channels,
            has_label: file.label.is_some(),
        })
    }
}

/// Preprocessed dataset: a filled store plus per-file metadata and stats.
///
/// Read-only after construction; share it through `Arc` between samplers.
#[derive(Debug)]
pub struct Corpus<S> {
    store: S,
    entries: Vec<CorpusEntry>,
    stats: Stats,
    num_classes: usize,
}

impl<S: CacheStore> Corpus<S> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Result<&CorpusEntry, Error> {
        self.entries.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.entries.len(),
        })
    }

    /// File names in corpus order.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn image(&self, index: usize) -> Result<S::Images<'_>, Error> {
        self.store.image(&self.entry(index)?.name)
    }

    /// `None` for files preprocessed without a mask.
    pub fn label(&self, index: usize) -> Result<Option<S::Labels<'_>>, Error> {
        let entry = self.entry(index)?;
        if !entry.has_label {
            return Ok(None);
        }
        self.store.label(&entry.name).map(Some)
    }

    pub fn cdf(&self, index: usize) -> Result<Option<Cow<'_, CdfSurface>>, Error> {
        let entry = self.entry(index)?;
        if !entry.has_label {
            return Ok(None);
        }
        self.store.cdf(&entry.name).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    use tk_core::Image;

    use super::{PreprocessConfig, Preprocessor, SourceFile};
    use crate::Error;
    use crate::reader::SourceReader;
    use crate::store::{CacheStore, MemoryStore, Namespace};

    #[derive(Default)]
    struct FakeReader {
        images: HashMap<PathBuf, Image<f32>>,
        masks: HashMap<PathBuf, Image<u32>>,
        reads: Cell<usize>,
    }

    impl SourceReader for FakeReader {
        fn read_image(&self, path: &Path) -> Result<Image<f32>, Error> {
            self.reads.set(self.reads.get() + 1);
            self.images
                .get(path)
                .cloned()
                .ok_or_else(|| Error::InvalidConfig(format!("no image {}", path.display())))
        }

        fn read_mask(&self, path: &Path) -> Result<Image<u32>, Error> {
            self.masks
                .get(path)
                .cloned()
                .ok_or_else(|| Error::InvalidConfig(format!("no mask {}", path.display())))
        }
    }

    fn reader() -> FakeReader {
        let mut r = FakeReader::default();
        r.images.insert("a.tif".into(), Image::new_fill(8, 4, 2.0f32));
        r.images.insert("b.tif".into(), Image::new_fill(4, 4, 4.0f32));
        let mut mask = Image::new_fill(8, 4, 0u32);
        *mask.get_mut(1, 1).expect("in bounds") = 255;
        r.masks.insert("a_mask.png".into(), mask);
        r
    }

    fn small_config() -> PreprocessConfig {
        PreprocessConfig {
            tile_shape: [4, 4],
            pdf_reshape: 4,
            ..PreprocessConfig::default()
        }
    }

    #[test]
    fn caches_images_labels_and_stats() {
        let files = [
            SourceFile::new("a.tif").with_label("a_mask.png"),
            SourceFile::new("b.tif"),
        ];
        let corpus = Preprocessor::new(reader(), MemoryStore::new(), small_config())
            .run(&files)
            .expect("preprocess");

        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.files().collect::<Vec<_>>(), ["a.tif", "b.tif"]);
        assert_eq!(corpus.entry(0).expect("entry").shape, [4, 8]);
        assert!(corpus.store().contains(Namespace::Labels, "a.tif"));
        assert!(!corpus.store().contains(Namespace::Labels, "b.tif"));
        assert!(corpus.store().contains(Namespace::Images, "b.tif"));

        let label = corpus.label(0).expect("read").expect("has label");
        assert_eq!(label.get(1, 1), Some(&1));
        assert!(corpus.label(1).expect("read").is_none());
        assert!(corpus.cdf(0).expect("read").is_some());

        let stats = corpus.stats();
        assert_eq!(stats.channel_means, vec![3.0]);
        assert_eq!(stats.channel_stds, vec![0.0]);
        assert_eq!(stats.max_tiles_per_image, 2);
    }

    #[test]
    fn cached_entries_skip_reading_sources() {
        let files = [SourceFile::new("a.tif").with_label("a_mask.png")];
        let first = Preprocessor::new(reader(), MemoryStore::new(), small_config())
            .run(&files)
            .expect("preprocess");
        let store = first.into_store();

        let cached_reader = reader();
        let config = PreprocessConfig {
            use_cached: true,
            ..small_config()
        };
        let corpus = Preprocessor::new(&cached_reader, store, config)
            .run(&files)
            .expect("preprocess from cache");
        assert_eq!(corpus.stats().channel_means, vec![2.0]);
        assert_eq!(cached_reader.reads.get(), 0);
        assert_eq!(corpus.image(0).expect("image").shape(), [4, 8]);
    }

    #[test]
    fn partial_cache_entries_are_recomputed() {
        let files = [SourceFile::new("a.tif").with_label("a_mask.png")];
        let mut store = MemoryStore::new();
        store
            .put_image("a.tif", Image::new_fill(8, 4, 2.0f32))
            .expect("put image");

        let config = PreprocessConfig {
            use_cached: true,
            ..small_config()
        };
        let corpus = Preprocessor::new(reader(), store, config)
            .run(&files)
            .expect("preprocess");
        assert!(corpus.store().contains(Namespace::Pdfs, "a.tif"));
    }

    #[test]
    fn without_cache_reuse_the_store_is_cleared() {
        let mut store = MemoryStore::new();
        store
            .put_image("stale.tif", Image::new_fill(1, 1, 0.0f32))
            .expect("put image");
        let corpus = Preprocessor::new(reader(), store, small_config())
            .run(&[SourceFile::new("b.tif")])
            .expect("preprocess");
        assert!(!corpus.store().contains(Namespace::Images, "stale.tif"));
    }

    #[test]
    fn ignore_mask_rejects_mismatched_shape() {
        let files = [SourceFile::new("a.tif").with_label("a_mask.png")];
        let res = Preprocessor::new(reader(), MemoryStore::new(), small_config())
            .with_ignore("a.tif", Image::new_fill(2, 2, true))
            .run(&files);
        assert!(res.is_err());
    }

    #[test]
    fn invalid_inputs_fail_early() {
        let pre = Preprocessor::new(reader(), MemoryStore::new(), small_config());
        assert!(matches!(pre.run(&[]), Err(Error::InvalidConfig(_))));

        let dup = [SourceFile::new("x/a.tif"), SourceFile::new("y/a.tif")];
        let pre = Preprocessor::new(reader(), MemoryStore::new(), small_config());
        assert!(matches!(pre.run(&dup), Err(Error::InvalidConfig(_))));

        let config = PreprocessConfig {
            padding: [4, 0],
            ..small_config()
        };
        let pre = Preprocessor::new(reader(), MemoryStore::new(), config);
        assert!(pre.run(&[SourceFile::new("b.tif")]).is_err());
    }
}
