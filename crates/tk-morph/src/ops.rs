use tk_core::{Image, ImageView};

/// 3x3 maximum filter. Neighbors outside the image are ignored.
pub fn dilate3x3<T: Copy + Ord>(src: &ImageView<'_, T>) -> Image<T> {
    filter3x3(src, Ord::max)
}

/// 3x3 minimum filter. Neighbors outside the image are ignored.
pub fn erode3x3<T: Copy + Ord>(src: &ImageView<'_, T>) -> Image<T> {
    filter3x3(src, Ord::min)
}

pub fn close3x3<T: Copy + Ord>(src: &ImageView<'_, T>) -> Image<T> {
    let dilated = dilate3x3(src);
    erode3x3(&dilated.as_view())
}

fn filter3x3<T: Copy + Ord>(src: &ImageView<'_, T>, pick: fn(T, T) -> T) -> Image<T> {
    assert_eq!(src.channels(), 1, "3x3 filters expect single-channel input");
    let (w, h) = (src.width(), src.height());
    if w == 0 || h == 0 {
        return src.to_image();
    }

    // The rectangular window is separable: horizontal pass, then vertical.
    let mut horiz = Vec::with_capacity(w * h);
    for y in 0..h {
        let row = src.row(y);
        for x in 0..w {
            let mut v = row[x];
            if x > 0 {
                v = pick(v, row[x - 1]);
            }
            if x + 1 < w {
                v = pick(v, row[x + 1]);
            }
            horiz.push(v);
        }
    }

    let mut out = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            let mut v = horiz[y * w + x];
            if y > 0 {
                v = pick(v, horiz[(y - 1) * w + x]);
            }
            if y + 1 < h {
                v = pick(v, horiz[(y + 1) * w + x]);
            }
            out.push(v);
        }
    }

    Image::from_vec(w, h, out).expect("filter output matches input dimensions")
}
