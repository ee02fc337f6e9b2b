use std::ops::Range;

use crate::Error;
use crate::image::{Image, ImageView};

/// Random-access 2-D array with interleaved channels.
///
/// Implementations backed by disk must honor `read_region` without
/// materializing the whole array.
pub trait ArraySource<T> {
    /// `[rows, cols]`.
    fn shape(&self) -> [usize; 2];

    fn channels(&self) -> usize;

    /// Reads `rows x cols` into an owned image. Ranges must lie inside
    /// [`ArraySource::shape`].
    fn read_region(&self, rows: Range<usize>, cols: Range<usize>) -> Result<Image<T>, Error>;

    fn read_all(&self) -> Result<Image<T>, Error> {
        let [rows, cols] = self.shape();
        self.read_region(0..rows, 0..cols)
    }
}

pub fn check_region(
    shape: [usize; 2],
    rows: &Range<usize>,
    cols: &Range<usize>,
) -> Result<(), Error> {
    if rows.start > rows.end || cols.start > cols.end || rows.end > shape[0] || cols.end > shape[1]
    {
        return Err(Error::OutOfBounds);
    }
    Ok(())
}

impl<T: Clone> ArraySource<T> for ImageView<'_, T> {
    fn shape(&self) -> [usize; 2] {
        ImageView::shape(self)
    }

    fn channels(&self) -> usize {
        ImageView::channels(self)
    }

    fn read_region(&self, rows: Range<usize>, cols: Range<usize>) -> Result<Image<T>, Error> {
        check_region(ImageView::shape(self), &rows, &cols)?;
        let sub = self.subview(cols.start, rows.start, cols.len(), rows.len())?;
        Ok(sub.to_image())
    }
}

impl<T: Clone> ArraySource<T> for Image<T> {
    fn shape(&self) -> [usize; 2] {
        Image::shape(self)
    }

    fn channels(&self) -> usize {
        Image::channels(self)
    }

    fn read_region(&self, rows: Range<usize>, cols: Range<usize>) -> Result<Image<T>, Error> {
        self.as_view().read_region(rows, cols)
    }
}

impl<T, S: ArraySource<T> + ?Sized> ArraySource<T> for &S {
    fn shape(&self) -> [usize; 2] {
        (**self).shape()
    }

    fn channels(&self) -> usize {
        (**self).channels()
    }

    fn read_region(&self, rows: Range<usize>, cols: Range<usize>) -> Result<Image<T>, Error> {
        (**self).read_region(rows, cols)
    }
}

#[cfg(test)]
mod tests {
    use super::ArraySource;
    use crate::image::Image;

    #[test]
    fn image_region_read_matches_subview() {
        let img = Image::from_vec(4, 3, (0u8..12).collect()).expect("valid image");
        let region = img.read_region(1..3, 2..4).expect("in-bounds region");
        assert_eq!(region.shape(), [2, 2]);
        assert_eq!(region.data(), &[6, 7, 10, 11]);
    }

    #[test]
    fn region_outside_shape_is_rejected() {
        let img = Image::new_fill(4, 3, 0u8);
        assert!(img.read_region(0..4, 0..1).is_err());
        assert!(img.read_region(0..1, 0..5).is_err());
        assert_eq!(img.read_all().expect("full read").shape(), [3, 4]);
    }
}
