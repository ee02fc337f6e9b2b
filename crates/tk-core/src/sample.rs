use crate::border::reflect_index;
use crate::image::ImageView;
use crate::pixel::Pixel;

/// Writes the channels of the nearest pixel to `(x, y)` into `out`.
///
/// Coordinates outside the image reflect back inside. Empty images leave
/// `out` untouched.
pub fn sample_nearest<T: Copy>(img: &ImageView<'_, T>, x: f32, y: f32, out: &mut [T]) {
    debug_assert_eq!(out.len(), img.channels());
    let xi = x.round() as isize;
    let yi = y.round() as isize;

    if let (Some(mx), Some(my)) = (
        reflect_index(xi, img.width()),
        reflect_index(yi, img.height()),
    ) {
        // SAFETY: `reflect_index` returns indices in `[0, len)`.
        out.copy_from_slice(unsafe { img.pixel_unchecked(mx, my) });
    }
}

/// Floor-based 2x2 bilinear interpolation of every channel at `(x, y)`, with
/// reflective borders.
pub fn sample_bilinear<T: Pixel>(img: &ImageView<'_, T>, x: f32, y: f32, out: &mut [f32]) {
    debug_assert_eq!(out.len(), img.channels());
    out.fill(0.0);
    if img.width() == 0 || img.height() == 0 {
        return;
    }

    let x0 = x.floor() as isize;
    let y0 = y.floor() as isize;
    let x1 = x0 + 1;
    let y1 = y0 + 1;

    let dx = x - x0 as f32;
    let dy = y - y0 as f32;

    let w00 = (1.0 - dx) * (1.0 - dy);
    let w10 = dx * (1.0 - dy);
    let w01 = (1.0 - dx) * dy;
    let w11 = dx * dy;

    accumulate(img, x0, y0, w00, out);
    accumulate(img, x1, y0, w10, out);
    accumulate(img, x0, y1, w01, out);
    accumulate(img, x1, y1, w11, out);
}

#[inline]
fn accumulate<T: Pixel>(img: &ImageView<'_, T>, x: isize, y: isize, weight: f32, out: &mut [f32]) {
    if weight == 0.0 {
        return;
    }

    if let (Some(xi), Some(yi)) = (
        reflect_index(x, img.width()),
        reflect_index(y, img.height()),
    ) {
        // SAFETY: `reflect_index` returns indices in `[0, len)`.
        let px = unsafe { img.pixel_unchecked(xi, yi) };
        for (o, &v) in out.iter_mut().zip(px) {
            *o += weight * v.to_f32();
        }
    }
}
