use tk_core::{Image, ImageView};

const DX: [isize; 8] = [1, 0, -1, 0, 1, -1, -1, 1];
const DY: [isize; 8] = [0, -1, 0, 1, -1, -1, 1, 1];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    C4,
    C8,
}

impl Connectivity {
    fn neighbor_count(self) -> usize {
        match self {
            Self::C4 => 4,
            Self::C8 => 8,
        }
    }
}

/// Connected components of the `true` pixels.
///
/// Labels start at 1 and are assigned in raster-scan order of each
/// component's first pixel; background is 0. Returns the label image and the
/// number of components.
pub fn label_components(
    mask: &ImageView<'_, bool>,
    connectivity: Connectivity,
) -> (Image<u32>, u32) {
    let (w, h) = (mask.width(), mask.height());
    let mut labels = Image::new_fill(w, h, 0u32);
    let mut next = 0u32;
    let mut stack = Vec::new();

    for y in 0..h {
        for x in 0..w {
            if !mask.row(y)[x] || labels.data()[y * w + x] != 0 {
                continue;
            }

            next += 1;
            labels.data_mut()[y * w + x] = next;
            stack.push((x, y));

            while let Some((cx, cy)) = stack.pop() {
                for k in 0..connectivity.neighbor_count() {
                    let nx = cx as isize + DX[k];
                    let ny = cy as isize + DY[k];
                    if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                        continue;
                    }

                    let (nx, ny) = (nx as usize, ny as usize);
                    let p = ny * w + nx;
                    if mask.row(ny)[nx] && labels.data()[p] == 0 {
                        labels.data_mut()[p] = next;
                        stack.push((nx, ny));
                    }
                }
            }
        }
    }

    (labels, next)
}

#[cfg(test)]
mod tests {
    use tk_core::Image;

    use super::{Connectivity, label_components};

    fn diagonal_pair() -> Image<bool> {
        Image::from_vec(
            3,
            3,
            vec![
                true, false, false, // row 0
                false, true, false, // row 1
                false, false, false, // row 2
            ],
        )
        .expect("valid mask")
    }

    #[test]
    fn diagonal_pixels_split_under_c4() {
        let (labels, n) = label_components(&diagonal_pair().as_view(), Connectivity::C4);
        assert_eq!(n, 2);
        assert_eq!(labels.data()[0], 1);
        assert_eq!(labels.data()[4], 2);
    }

    #[test]
    fn diagonal_pixels_join_under_c8() {
        let (labels, n) = label_components(&diagonal_pair().as_view(), Connectivity::C8);
        assert_eq!(n, 1);
        assert_eq!(labels.data()[4], 1);
    }

    #[test]
    fn raster_order_numbering() {
        let mask = Image::from_vec(
            4,
            2,
            vec![
                false, false, false, true, // row 0
                true, true, false, true, // row 1
            ],
        )
        .expect("valid mask");

        let (labels, n) = label_components(&mask.as_view(), Connectivity::C4);
        assert_eq!(n, 2);
        assert_eq!(labels.data(), &[0, 0, 0, 1, 2, 2, 0, 1]);
    }
}
