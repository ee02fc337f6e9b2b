use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use tk_core::{ArraySource, Image, ImageView};

use crate::Error;
use crate::cdf::CdfSurface;
use crate::raw::RawArrayFile;

/// Independent key spaces of a cache store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Images,
    Labels,
    Pdfs,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [Namespace::Images, Namespace::Labels, Namespace::Pdfs];

    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Images => "data",
            Namespace::Labels => "labels",
            Namespace::Pdfs => "pdfs",
        }
    }
}

/// Key-value storage for preprocessed images, labels and sampling surfaces.
///
/// Writes need exclusive access; reads hand out [`ArraySource`] handles so
/// samplers only load the regions they resample.
pub trait CacheStore {
    type Images<'a>: ArraySource<f32>
    where
        Self: 'a;
    type Labels<'a>: ArraySource<u8>
    where
        Self: 'a;

    fn contains(&self, namespace: Namespace, key: &str) -> bool;

    /// Removes every entry of every namespace.
    fn clear(&mut self) -> Result<(), Error>;

    fn put_image(&mut self, key: &str, image: Image<f32>) -> Result<(), Error>;

    fn put_label(&mut self, key: &str, label: Image<u8>) -> Result<(), Error>;

    fn put_cdf(&mut self, key: &str, cdf: CdfSurface) -> Result<(), Error>;

    fn image(&self, key: &str) -> Result<Self::Images<'_>, Error>;

    fn label(&self, key: &str) -> Result<Self::Labels<'_>, Error>;

    fn cdf(&self, key: &str) -> Result<Cow<'_, CdfSurface>, Error>;
}

fn missing(namespace: Namespace, key: &str) -> Error {
    Error::MissingEntry {
        namespace: namespace.as_str(),
        key: key.to_string(),
    }
}

/// In-process store; reads borrow the stored arrays.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    images: HashMap<String, Image<f32>>,
    labels: HashMap<String, Image<u8>>,
    pdfs: HashMap<String, CdfSurface>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    type Images<'a> = ImageView<'a, f32>;
    type Labels<'a> = ImageView<'a, u8>;

    fn contains(&self, namespace: Namespace, key: &str) -> bool {
        match namespace {
            Namespace::Images => self.images.contains_key(key),
            Namespace::Labels => self.labels.contains_key(key),
            Namespace::Pdfs => self.pdfs.contains_key(key),
        }
    }

    fn clear(&mut self) -> Result<(), Error> {
        self.images.clear();
        self.labels.clear();
        self.pdfs.clear();
        Ok(())
    }

    fn put_image(&mut self, key: &str, image: Image<f32>) -> Result<(), Error> {
        self.images.insert(key.to_string(), image);
        Ok(())
    }

    fn put_label(&mut self, key: &str, label: Image<u8>) -> Result<(), Error> {
        self.labels.insert(key.to_string(), label);
        Ok(())
    }

    fn put_cdf(&mut self, key: &str, cdf: CdfSurface) -> Result<(), Error> {
        self.pdfs.insert(key.to_string(), cdf);
        Ok(())
    }

    fn image(&self, key: &str) -> Result<ImageView<'_, f32>, Error> {
        self.images
            .get(key)
            .map(Image::as_view)
            .ok_or_else(|| missing(Namespace::Images, key))
    }

    fn label(&self, key: &str) -> Result<ImageView<'_, u8>, Error> {
        self.labels
            .get(key)
            .map(Image::as_view)
            .ok_or_else(|| missing(Namespace::Labels, key))
    }

    fn cdf(&self, key: &str) -> Result<Cow<'_, CdfSurface>, Error> {
        self.pdfs
            .get(key)
            .map(Cow::Borrowed)
            .ok_or_else(|| missing(Namespace::Pdfs, key))
    }
}

/// Directory store: one raw array file per entry under
/// `<root>/<namespace>/<key>.raw`.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Opens `root`, creating the namespace directories when missing.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        for ns in Namespace::ALL {
            fs::create_dir_all(root.join(ns.as_str()))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, namespace: Namespace, key: &str) -> PathBuf {
        self.root
            .join(namespace.as_str())
            .join(format!("{key}.raw"))
    }
}

impl CacheStore for DirStore {
    type Images<'a> = RawArrayFile<f32>;
    type Labels<'a> = RawArrayFile<u8>;

    fn contains(&self, namespace: Namespace, key: &str) -> bool {
        self.entry_path(namespace, key).is_file()
    }

    fn clear(&mut self) -> Result<(), Error> {
        for ns in Namespace::ALL {
            let dir = self.root.join(ns.as_str());
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
            fs::create_dir_all(&dir)?;
        }
        debug!("cleared cache store at {}", self.root.display());
        Ok(())
    }

    fn put_image(&mut self, key: &str, image: Image<f32>) -> Result<(), Error> {
        RawArrayFile::create(self.entry_path(Namespace::Images, key), &image.as_view())?;
        Ok(())
    }

    fn put_label(&mut self, key: &str, label: Image<u8>) -> Result<(), Error> {
        RawArrayFile::create(self.entry_path(Namespace::Labels, key), &label.as_view())?;
        Ok(())
    }

    fn put_cdf(&mut self, key: &str, cdf: CdfSurface) -> Result<(), Error> {
        let [rows, cols] = cdf.shape();
        let surface = Image::from_vec(cols, rows, cdf.cumulative().to_vec())?;
        RawArrayFile::create(self.entry_path(Namespace::Pdfs, key), &surface.as_view())?;
        Ok(())
    }

    fn image(&self, key: &str) -> Result<RawArrayFile<f32>, Error> {
        if !self.contains(Namespace::Images, key) {
            return Err(missing(Namespace::Images, key));
        }
        RawArrayFile::open(self.entry_path(Namespace::Images, key))
    }

    fn label(&self, key: &str) -> Result<RawArrayFile<u8>, Error> {
        if !self.contains(Namespace::Labels, key) {
            return Err(missing(Namespace::Labels, key));
        }
        RawArrayFile::open(self.entry_path(Namespace::Labels, key))
    }

    fn cdf(&self, key: &str) -> Result<Cow<'_, CdfSurface>, Error> {
        if !self.contains(Namespace::Pdfs, key) {
            return Err(missing(Namespace::Pdfs, key));
        }
        let file = RawArrayFile::<f32>::open(self.entry_path(Namespace::Pdfs, key))?;
        let [rows, cols] = file.shape();
        let surface = file.read_all()?;
        Ok(Cow::Owned(CdfSurface::from_parts(
            rows,
            cols,
            surface.into_vec(),
        )?))
    }
}
