use tk_core::{Image, ImageView};

/// 2x2 box mean. Odd trailing rows/columns are dropped.
pub fn downsample2x2_mean_f32(src: &ImageView<'_, f32>) -> Image<f32> {
    assert_eq!(src.channels(), 1, "downsample expects single-channel input");
    let (dst_w, dst_h) = (src.width() / 2, src.height() / 2);
    let mut dst = Image::new_fill(dst_w, dst_h, 0.0f32);
    if dst_w == 0 || dst_h == 0 {
        return dst;
    }

    if src.is_contiguous()
        && src.width().is_multiple_of(2)
        && src.height().is_multiple_of(2)
        && let Some(src_contig) = src.as_contiguous_slice()
    {
        downsample_f32_contiguous_even(src_contig, src.width(), dst.data_mut(), dst_w, dst_h);
        return dst;
    }

    downsample_f32_fallback(src, dst.data_mut(), dst_w, dst_h);
    dst
}

fn downsample_f32_contiguous_even(
    src: &[f32],
    src_w: usize,
    dst: &mut [f32],
    dst_w: usize,
    dst_h: usize,
) {
    let src_ptr = src.as_ptr();
    let dst_ptr = dst.as_mut_ptr();
    // SAFETY:
    // - `src` is contiguous with `src.len() == src_w * (dst_h * 2)`.
    // - `dst` has exactly `dst_w * dst_h` elements.
    // - Loops only access in-range addresses derived from these lengths.
    unsafe {
        for y in 0..dst_h {
            let src_row0 = src_ptr.add((2 * y) * src_w);
            let src_row1 = src_ptr.add((2 * y + 1) * src_w);
            let dst_row = dst_ptr.add(y * dst_w);
            for x in 0..dst_w {
                let sx = 2 * x;
                let sum = *src_row0.add(sx)
                    + *src_row0.add(sx + 1)
                    + *src_row1.add(sx)
                    + *src_row1.add(sx + 1);
                *dst_row.add(x) = sum * 0.25;
            }
        }
    }
}

fn downsample_f32_fallback(src: &ImageView<'_, f32>, dst: &mut [f32], dst_w: usize, dst_h: usize) {
    for y in 0..dst_h {
        let src_row0 = src.row(2 * y);
        let src_row1 = src.row(2 * y + 1);
        let dst_row = &mut dst[y * dst_w..(y + 1) * dst_w];
        for (x, out) in dst_row.iter_mut().enumerate() {
            let sx = 2 * x;
            *out = (src_row0[sx] + src_row0[sx + 1] + src_row1[sx] + src_row1[sx + 1]) * 0.25;
        }
    }
}
