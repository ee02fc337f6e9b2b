use crate::Error;
use crate::pixel::Pixel;

/// Owned row-major image with interleaved channels.
///
/// Element `(x, y, c)` lives at `(y * width + x) * channels + c`.
#[derive(Debug, Clone, PartialEq)]
pub struct Image<T> {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<T>,
}

impl<T> Image<T> {
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Result<Self, Error> {
        Self::from_vec_channels(width, height, 1, data)
    }

    pub fn from_vec_channels(
        width: usize,
        height: usize,
        channels: usize,
        data: Vec<T>,
    ) -> Result<Self, Error> {
        let expected = width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(channels))
            .ok_or(Error::SizeMismatch {
                expected: usize::MAX,
                actual: data.len(),
            })?;

        if data.len() != expected {
            return Err(Error::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// `[rows, cols]`.
    pub fn shape(&self) -> [usize; 2] {
        [self.height, self.width]
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn get(&self, x: usize, y: usize) -> Option<&T> {
        self.pixel(x, y).and_then(|px| px.first())
    }

    pub fn get_mut(&mut self, x: usize, y: usize) -> Option<&mut T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y * self.width + x) * self.channels;
        self.data.get_mut(idx)
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<&[T]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y * self.width + x) * self.channels;
        self.data.get(idx..idx + self.channels)
    }

    pub fn as_view(&self) -> ImageView<'_, T> {
        ImageView {
            width: self.width,
            height: self.height,
            channels: self.channels,
            stride: self.width * self.channels,
            data: &self.data,
        }
    }

    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Image<U> {
        Image {
            width: self.width,
            height: self.height,
            channels: self.channels,
            data: self.data.iter().map(f).collect(),
        }
    }
}

impl<T: Clone> Image<T> {
    pub fn new_fill(width: usize, height: usize, value: T) -> Self {
        Self::new_fill_channels(width, height, 1, value)
    }

    pub fn new_fill_channels(width: usize, height: usize, channels: usize, value: T) -> Self {
        let len = width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(channels))
            .expect("image size overflow");
        Self {
            width,
            height,
            channels,
            data: vec![value; len],
        }
    }
}

/// Borrowed view with an element stride between row starts.
///
/// `stride >= width * channels`; rows may be padded.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a, T> {
    width: usize,
    height: usize,
    channels: usize,
    stride: usize,
    data: &'a [T],
}

impl<'a, T> ImageView<'a, T> {
    pub fn from_slice(
        width: usize,
        height: usize,
        stride: usize,
        data: &'a [T],
    ) -> Result<Self, Error> {
        Self::from_slice_channels(width, height, 1, stride, data)
    }

    pub fn from_slice_channels(
        width: usize,
        height: usize,
        channels: usize,
        stride: usize,
        data: &'a [T],
    ) -> Result<Self, Error> {
        let row_len = width.checked_mul(channels).ok_or(Error::InvalidStride)?;
        if stride < row_len {
            return Err(Error::InvalidStride);
        }

        let min_len = min_required_len(row_len, height, stride).ok_or(Error::SizeMismatch {
            expected: usize::MAX,
            actual: data.len(),
        })?;

        if data.len() < min_len {
            return Err(Error::SizeMismatch {
                expected: min_len,
                actual: data.len(),
            });
        }

        Ok(Self {
            width,
            height,
            channels,
            stride,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// `[rows, cols]`.
    pub fn shape(&self) -> [usize; 2] {
        [self.height, self.width]
    }

    /// Row `y` as `width * channels` interleaved elements.
    pub fn row(&self, y: usize) -> &'a [T] {
        assert!(y < self.height, "row index out of bounds");
        let len = self.width * self.channels;
        if len == 0 {
            return &[];
        }
        let start = y * self.stride;
        &self.data[start..start + len]
    }

    pub fn get(&self, x: usize, y: usize) -> Option<&'a T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y * self.stride + x * self.channels;
        self.data.get(idx)
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<&'a [T]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y * self.stride + x * self.channels;
        self.data.get(idx..idx + self.channels)
    }

    /// Returns the channels of pixel `(x, y)` without bounds checks.
    ///
    /// # Safety
    /// Caller must guarantee `x < self.width()` and `y < self.height()`.
    pub unsafe fn pixel_unchecked(&self, x: usize, y: usize) -> &'a [T] {
        let idx = y * self.stride + x * self.channels;
        // SAFETY: Caller guarantees `x < width` and `y < height`. With view
        // invariants this implies `idx..idx + channels` is in bounds of `data`.
        unsafe { self.data.get_unchecked(idx..idx + self.channels) }
    }

    pub fn subview(
        &self,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    ) -> Result<ImageView<'a, T>, Error> {
        if x > self.width
            || y > self.height
            || width > (self.width - x)
            || height > (self.height - y)
        {
            return Err(Error::OutOfBounds);
        }
        if width == 0 || height == 0 {
            return Ok(ImageView {
                width,
                height,
                channels: self.channels,
                stride: self.stride,
                data: &[],
            });
        }

        let start = y
            .checked_mul(self.stride)
            .and_then(|v| v.checked_add(x * self.channels))
            .ok_or(Error::OutOfBounds)?;
        let min_len = min_required_len(width * self.channels, height, self.stride)
            .ok_or(Error::OutOfBounds)?;
        let tail = self.data.get(start..).ok_or(Error::OutOfBounds)?;

        if tail.len() < min_len {
            return Err(Error::OutOfBounds);
        }

        Ok(ImageView {
            width,
            height,
            channels: self.channels,
            stride: self.stride,
            data: tail,
        })
    }

    pub fn is_contiguous(&self) -> bool {
        self.stride == self.width * self.channels
    }

    pub fn as_contiguous_slice(&self) -> Option<&'a [T]> {
        if !self.is_contiguous() {
            return None;
        }
        let len = self.width * self.height * self.channels;
        self.data.get(0..len)
    }
}

impl<T: Clone> ImageView<'_, T> {
    pub fn to_image(&self) -> Image<T> {
        let mut data = Vec::with_capacity(self.width * self.height * self.channels);
        if let Some(contig) = self.as_contiguous_slice() {
            data.extend_from_slice(contig);
        } else {
            for y in 0..self.height {
                data.extend_from_slice(self.row(y));
            }
        }

        Image {
            width: self.width,
            height: self.height,
            channels: self.channels,
            data,
        }
    }
}

fn min_required_len(row_len: usize, height: usize, stride: usize) -> Option<usize> {
    if row_len == 0 || height == 0 {
        return Some(0);
    }

    let rows_before_last = height.checked_sub(1)?;
    let base = rows_before_last.checked_mul(stride)?;
    base.checked_add(row_len)
}

pub fn to_f32<T: Pixel>(img: &ImageView<'_, T>) -> Image<f32> {
    let mut out = Vec::with_capacity(img.width() * img.height() * img.channels());
    for y in 0..img.height() {
        for &px in img.row(y) {
            out.push(px.to_f32());
        }
    }

    Image {
        width: img.width(),
        height: img.height(),
        channels: img.channels(),
        data: out,
    }
}

#[cfg(test)]
mod tests {
    use super::{Image, ImageView, to_f32};

    #[test]
    fn view_indexing_with_stride() {
        let data = vec![1u8, 2, 3, 99, 4, 5, 6, 88];
        let view = ImageView::from_slice(3, 2, 4, &data).expect("valid view");

        assert_eq!(view.row(0), &[1, 2, 3]);
        assert_eq!(view.row(1), &[4, 5, 6]);
        assert_eq!(view.get(0, 1), Some(&4));
        assert_eq!(view.get(2, 1), Some(&6));
        assert_eq!(view.get(3, 1), None);
        assert!(!view.is_contiguous());
        assert!(view.as_contiguous_slice().is_none());
    }

    #[test]
    fn multichannel_pixel_access() {
        let img = Image::from_vec_channels(2, 2, 3, (0u8..12).collect()).expect("valid image");
        assert_eq!(img.shape(), [2, 2]);
        assert_eq!(img.pixel(1, 0), Some(&[3u8, 4, 5][..]));
        assert_eq!(img.pixel(0, 1), Some(&[6u8, 7, 8][..]));
        assert_eq!(img.as_view().row(1), &[6, 7, 8, 9, 10, 11]);
        assert_eq!(img.get(1, 1), Some(&9));
        assert!(img.pixel(2, 0).is_none());
    }

    #[test]
    fn subview_of_multichannel_keeps_parent_stride() {
        let img = Image::from_vec_channels(4, 3, 2, (0u16..24).collect()).expect("valid image");
        let sub = img.as_view().subview(1, 1, 2, 2).expect("valid subview");

        assert_eq!(sub.stride(), 8);
        assert_eq!(sub.row(0), &[10, 11, 12, 13]);
        assert_eq!(sub.row(1), &[18, 19, 20, 21]);

        let owned = sub.to_image();
        assert_eq!(owned.data(), &[10, 11, 12, 13, 18, 19, 20, 21]);
        assert_eq!(owned.channels(), 2);
    }

    #[test]
    fn subview_rejects_out_of_range() {
        let img = Image::new_fill(4, 4, 0u8);
        assert!(img.as_view().subview(3, 0, 2, 1).is_err());
        assert!(img.as_view().subview(0, 4, 1, 1).is_err());
        let empty = img.as_view().subview(4, 4, 0, 0).expect("empty corner view");
        assert_eq!(empty.shape(), [0, 0]);
        assert!(empty.to_image().data().is_empty());
        let strip = img.as_view().subview(4, 1, 0, 3).expect("empty column");
        assert_eq!(strip.height(), 3);
        assert!(strip.to_image().data().is_empty());
    }

    #[test]
    fn from_vec_checks_length() {
        assert!(Image::from_vec_channels(2, 2, 3, vec![0u8; 11]).is_err());
        assert!(Image::from_vec(2, 2, vec![0u8; 4]).is_ok());
    }

    #[test]
    fn convert_to_f32_keeps_channels() {
        let img8 = Image::from_vec_channels(1, 2, 2, vec![1u8, 2, 3, 4]).expect("valid image");
        let out8 = to_f32(&img8.as_view());
        assert_eq!(out8.data(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(out8.channels(), 2);
    }
}
