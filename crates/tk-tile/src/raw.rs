//! Disk-backed arrays with row-granular partial reads.
//!
//! Layout: a 32-byte header followed by row-major interleaved elements in
//! native byte order.
//!
//! | bytes  | field                        |
//! |--------|------------------------------|
//! | 0..4   | magic `TKRA`                 |
//! | 4      | format version (1)           |
//! | 5      | element tag                  |
//! | 6..8   | reserved, zero               |
//! | 8..16  | rows, little-endian `u64`    |
//! | 16..24 | cols, little-endian `u64`    |
//! | 24..32 | channels, little-endian `u64`|

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::ops::Range;
use std::path::{Path, PathBuf};

use bytemuck::Pod;
use tk_core::{ArraySource, Image, ImageView, check_region};

use crate::Error;

const MAGIC: &[u8; 4] = b"TKRA";
const VERSION: u8 = 1;
const HEADER_LEN: u64 = 32;

/// Element types storable in a [`RawArrayFile`].
pub trait RawElement: Pod + Default {
    const TAG: u8;
}

impl RawElement for u8 {
    const TAG: u8 = 1;
}

impl RawElement for u32 {
    const TAG: u8 = 2;
}

impl RawElement for f32 {
    const TAG: u8 = 3;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    tag: u8,
    rows: usize,
    cols: usize,
    channels: usize,
}

impl Header {
    fn encode(&self) -> [u8; HEADER_LEN as usize] {
        let mut buf = [0u8; HEADER_LEN as usize];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = VERSION;
        buf[5] = self.tag;
        buf[8..16].copy_from_slice(&(self.rows as u64).to_le_bytes());
        buf[16..24].copy_from_slice(&(self.cols as u64).to_le_bytes());
        buf[24..32].copy_from_slice(&(self.channels as u64).to_le_bytes());
        buf
    }

    fn read(path: &Path, file: &mut File) -> Result<Self, Error> {
        let mut buf = [0u8; HEADER_LEN as usize];
        file.read_exact(&mut buf)?;
        if &buf[0..4] != MAGIC {
            return Err(format_error(path, "bad magic"));
        }
        if buf[4] != VERSION {
            return Err(format_error(path, format!("unsupported version {}", buf[4])));
        }

        let field = |range: Range<usize>| -> Result<usize, Error> {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[range]);
            usize::try_from(u64::from_le_bytes(bytes))
                .map_err(|_| format_error(path, "dimension exceeds address space"))
        };

        Ok(Self {
            tag: buf[5],
            rows: field(8..16)?,
            cols: field(16..24)?,
            channels: field(24..32)?,
        })
    }
}

fn format_error(path: &Path, reason: impl Into<String>) -> Error {
    Error::RawFormat {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Reads the element tag of a raw array file without validating the payload.
pub fn raw_element_tag(path: &Path) -> Result<u8, Error> {
    let mut file = File::open(path)?;
    Ok(Header::read(path, &mut file)?.tag)
}

/// Handle to a raw array file. Each region read opens the file anew, so a
/// handle is `Send + Sync` and holds no descriptor.
#[derive(Debug, Clone)]
pub struct RawArrayFile<T> {
    path: PathBuf,
    rows: usize,
    cols: usize,
    channels: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: RawElement> RawArrayFile<T> {
    /// Writes `data` to `path`, replacing any existing file.
    pub fn create(path: impl AsRef<Path>, data: &ImageView<'_, T>) -> Result<Self, Error> {
        let path = path.as_ref();
        let header = Header {
            tag: T::TAG,
            rows: data.height(),
            cols: data.width(),
            channels: data.channels(),
        };

        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(&header.encode())?;
        for y in 0..data.height() {
            out.write_all(bytemuck::cast_slice(data.row(y)))?;
        }
        out.flush()?;

        Ok(Self {
            path: path.to_path_buf(),
            rows: header.rows,
            cols: header.cols,
            channels: header.channels,
            _marker: PhantomData,
        })
    }

    /// Opens an existing file, checking header and payload length.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let header = Header::read(path, &mut file)?;
        if header.tag != T::TAG {
            return Err(format_error(
                path,
                format!("element tag {} does not match expected {}", header.tag, T::TAG),
            ));
        }

        let expected = (header.rows as u64)
            .checked_mul(header.cols as u64)
            .and_then(|v| v.checked_mul(header.channels as u64))
            .and_then(|v| v.checked_mul(size_of::<T>() as u64))
            .and_then(|v| v.checked_add(HEADER_LEN))
            .ok_or_else(|| format_error(path, "dimensions overflow"))?;
        let actual = file.metadata()?.len();
        if actual != expected {
            return Err(format_error(
                path,
                format!("file is {actual} bytes, header implies {expected}"),
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            rows: header.rows,
            cols: header.cols,
            channels: header.channels,
            _marker: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_rows(&self, rows: Range<usize>, cols: Range<usize>) -> std::io::Result<Image<T>> {
        let row_elems = cols.len() * self.channels;
        let mut data = vec![T::default(); rows.len() * row_elems];
        if !data.is_empty() {
            let elem = size_of::<T>() as u64;
            let mut file = File::open(&self.path)?;
            for (dst, y) in data.chunks_exact_mut(row_elems).zip(rows.clone()) {
                let offset = ((y * self.cols + cols.start) * self.channels) as u64 * elem;
                file.seek(SeekFrom::Start(HEADER_LEN + offset))?;
                file.read_exact(bytemuck::cast_slice_mut(dst))?;
            }
        }

        Image::from_vec_channels(cols.len(), rows.len(), self.channels, data)
            .map_err(|e| std::io::Error::other(e.to_string()))
    }
}

impl<T: RawElement> ArraySource<T> for RawArrayFile<T> {
    fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn read_region(
        &self,
        rows: Range<usize>,
        cols: Range<usize>,
    ) -> Result<Image<T>, tk_core::Error> {
        check_region([self.rows, self.cols], &rows, &cols)?;
        self.read_rows(rows, cols)
            .map_err(|e| tk_core::Error::Read(format!("{}: {e}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tk_core::{ArraySource, Image};

    use super::{RawArrayFile, raw_element_tag};
    use crate::Error;

    #[test]
    fn region_reads_match_in_memory_source() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("img.raw");
        let img = Image::from_vec_channels(5, 4, 2, (0..40).map(|v| v as f32).collect())
            .expect("valid image");

        let file = RawArrayFile::create(&path, &img.as_view()).expect("write raw file");
        assert_eq!(file.shape(), [4, 5]);
        assert_eq!(file.channels(), 2);

        let reopened = RawArrayFile::<f32>::open(&path).expect("open raw file");
        let region = reopened.read_region(1..3, 2..5).expect("in-bounds region");
        assert_eq!(region, img.read_region(1..3, 2..5).expect("in-bounds region"));
        assert_eq!(reopened.read_all().expect("full read"), img);
        assert_eq!(raw_element_tag(&path).expect("header"), 3);
    }

    #[test]
    fn out_of_range_region_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("lbl.raw");
        let img = Image::new_fill(3, 3, 1u8);
        let file = RawArrayFile::create(&path, &img.as_view()).expect("write raw file");
        assert!(file.read_region(0..4, 0..1).is_err());
        assert_eq!(
            file.read_region(1..1, 0..3).expect("empty region").shape(),
            [0, 3]
        );
    }

    #[test]
    fn wrong_element_type_or_truncation_fails() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("lbl.raw");
        let img = Image::new_fill(3, 2, 7u8);
        RawArrayFile::create(&path, &img.as_view()).expect("write raw file");

        assert!(matches!(
            RawArrayFile::<f32>::open(&path),
            Err(Error::RawFormat { .. })
        ));

        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .expect("reopen for append");
        f.write_all(&[0u8]).expect("append");
        assert!(matches!(
            RawArrayFile::<u8>::open(&path),
            Err(Error::RawFormat { .. })
        ));
    }

    #[test]
    fn garbage_file_is_not_a_raw_array() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("junk.raw");
        std::fs::write(&path, [0u8; 40]).expect("write junk");
        assert!(RawArrayFile::<u8>::open(&path).is_err());
    }
}
