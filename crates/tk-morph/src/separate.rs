use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use tk_core::{Error, Image, ImageView};

use crate::components::{Connectivity, label_components};
use crate::ops::close3x3;

/// Raw mask input for [`separate_instances`].
#[derive(Debug, Clone, Copy)]
pub enum MaskLabels<'a> {
    /// Class ids per pixel, 0 is background.
    Classes(ImageView<'a, u32>),
    /// Instance ids per pixel, 0 is background; classes become `id > 0 -> 1`.
    Instances(ImageView<'a, u32>),
    ClassesWithInstances {
        classes: ImageView<'a, u32>,
        instances: ImageView<'a, u32>,
    },
}

/// Produces class labels where touching instances of one class are split by
/// background.
///
/// Without `remove_connectivity` the class labels pass through. Otherwise,
/// missing instance ids are derived per class from 4-connected components.
/// Per class, instances whose 3x3 closing spills onto other pixels, or that
/// touch another instance 8-connectedly, are contact candidates. All other
/// instances are written first; candidates follow in ascending id order and
/// only keep pixels outside the 3x3 dilation of what is already written, so
/// lower ids claim contested pixels.
pub fn separate_instances(
    labels: MaskLabels<'_>,
    remove_connectivity: bool,
) -> Result<Image<u32>, Error> {
    let (classes, instances) = match labels {
        MaskLabels::Classes(classes) => (classes.to_image(), None),
        MaskLabels::Instances(instances) => {
            let classes = instances.to_image().map(|&id| u32::from(id > 0));
            (classes, Some(instances.to_image()))
        }
        MaskLabels::ClassesWithInstances { classes, instances } => {
            if classes.shape() != instances.shape() {
                return Err(Error::ShapeMismatch {
                    expected: classes.shape(),
                    actual: instances.shape(),
                });
            }
            (classes.to_image(), Some(instances.to_image()))
        }
    };

    if classes.channels() != 1 {
        return Err(Error::ChannelMismatch {
            expected: 1,
            actual: classes.channels(),
        });
    }

    if !remove_connectivity {
        return Ok(classes);
    }

    let class_ids: BTreeSet<u32> = classes.data().iter().copied().filter(|&c| c != 0).collect();
    let instances = match instances {
        Some(instances) => instances,
        None => derive_instances(&classes, &class_ids),
    };

    let (w, h) = (classes.width(), classes.height());
    let mut out = Image::new_fill(w, h, 0u32);

    for &c in &class_ids {
        let il = Image::from_vec(
            w,
            h,
            classes
                .data()
                .iter()
                .zip(instances.data())
                .map(|(&cls, &id)| if cls == c { id } else { 0 })
                .collect(),
        )?;

        let candidates = contact_candidates(&il);

        let mut pending: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (p, &id) in il.data().iter().enumerate() {
            if id == 0 {
                continue;
            }
            if candidates.contains(&id) {
                pending.entry(id).or_default().push(p);
            } else {
                out.data_mut()[p] = c;
            }
        }

        debug!(
            "class {c}: {} contact candidates out of {} instances",
            pending.len(),
            il.data().iter().filter(|&&id| id != 0).collect::<BTreeSet<_>>().len()
        );

        let mut keep = Vec::new();
        for pixels in pending.values() {
            keep.clear();
            keep.extend(
                pixels
                    .iter()
                    .copied()
                    .filter(|&p| !near_class(&out, p % w, p / w, c)),
            );
            for &p in &keep {
                out.data_mut()[p] = c;
            }
        }
    }

    Ok(out)
}

fn derive_instances(classes: &Image<u32>, class_ids: &BTreeSet<u32>) -> Image<u32> {
    let mut instances = Image::new_fill(classes.width(), classes.height(), 0u32);
    let mut next = 0u32;
    for &c in class_ids {
        let mask = classes.map(|&v| v == c);
        let (comps, n) = label_components(&mask.as_view(), Connectivity::C4);
        for (dst, &comp) in instances.data_mut().iter_mut().zip(comps.data()) {
            if comp > 0 {
                *dst = comp + next;
            }
        }
        next += n;
    }
    instances
}

fn contact_candidates(il: &Image<u32>) -> BTreeSet<u32> {
    let closed = close3x3(&il.as_view());
    let mut candidates: BTreeSet<u32> = closed
        .data()
        .iter()
        .zip(il.data())
        .filter(|&(&cl, &id)| cl != id && cl != 0)
        .map(|(&cl, _)| cl)
        .collect();

    let (w, h) = (il.width(), il.height());
    for y in 0..h {
        for x in 0..w {
            let id = il.data()[y * w + x];
            if id == 0 {
                continue;
            }
            for (nx, ny) in neighbors8(x, y, w, h) {
                let other = il.data()[ny * w + nx];
                if other != 0 && other != id {
                    candidates.insert(id);
                    candidates.insert(other);
                }
            }
        }
    }

    candidates
}

fn near_class(labels: &Image<u32>, x: usize, y: usize, c: u32) -> bool {
    let w = labels.width();
    labels.data()[y * w + x] == c
        || neighbors8(x, y, w, labels.height()).any(|(nx, ny)| labels.data()[ny * w + nx] == c)
}

fn neighbors8(x: usize, y: usize, w: usize, h: usize) -> impl Iterator<Item = (usize, usize)> {
    (-1isize..=1)
        .flat_map(|dy| (-1isize..=1).map(move |dx| (dx, dy)))
        .filter(|&(dx, dy)| dx != 0 || dy != 0)
        .filter_map(move |(dx, dy)| {
            let nx = x as isize + dx;
            let ny = y as isize + dy;
            (nx >= 0 && ny >= 0 && nx < w as isize && ny < h as isize)
                .then_some((nx as usize, ny as usize))
        })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use tk_core::Image;

    use super::{MaskLabels, separate_instances};

    fn paint(img: &mut Image<u32>, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>, v: u32) {
        for y in rows {
            for x in cols.clone() {
                *img.get_mut(x, y).expect("in bounds") = v;
            }
        }
    }

    fn touches_8(img: &Image<u32>, a: &Image<u32>, b: &Image<u32>) -> bool {
        let (w, h) = (img.width(), img.height());
        for y in 0..h {
            for x in 0..w {
                if img.data()[y * w + x] == 0 || a.data()[y * w + x] == 0 {
                    continue;
                }
                for dy in -1isize..=1 {
                    for dx in -1isize..=1 {
                        let nx = x as isize + dx;
                        let ny = y as isize + dy;
                        if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                            continue;
                        }
                        let q = ny as usize * w + nx as usize;
                        if img.data()[q] != 0 && b.data()[q] != 0 {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    #[test]
    fn one_pixel_gap_is_left_untouched() {
        let mut mask = Image::new_fill(10, 10, 0u32);
        paint(&mut mask, 2..5, 1..4, 1);
        paint(&mut mask, 2..5, 5..8, 1);

        let out = separate_instances(MaskLabels::Classes(mask.as_view()), true)
            .expect("valid mask");
        assert_eq!(out, mask);

        let unique: BTreeSet<u32> = out.data().iter().copied().collect();
        assert!(unique.len() <= 2);
    }

    #[test]
    fn diagonal_contact_gets_background_ridge() {
        let mut mask = Image::new_fill(10, 10, 0u32);
        let mut a = Image::new_fill(10, 10, 0u32);
        let mut b = Image::new_fill(10, 10, 0u32);
        paint(&mut mask, 2..5, 1..4, 1);
        paint(&mut mask, 5..8, 4..7, 1);
        paint(&mut a, 2..5, 1..4, 1);
        paint(&mut b, 5..8, 4..7, 1);
        assert!(touches_8(&mask, &a, &b));

        let out = separate_instances(MaskLabels::Classes(mask.as_view()), true)
            .expect("valid mask");
        assert!(!touches_8(&out, &a, &b));
        // Lower id keeps its corner; the higher id yields the contested pixel.
        assert_eq!(out.get(3, 4), Some(&1));
        assert_eq!(out.get(4, 5), Some(&0));
    }

    #[test]
    fn edge_sharing_instances_are_split() {
        let mut inst = Image::new_fill(8, 6, 0u32);
        paint(&mut inst, 1..5, 1..4, 4);
        paint(&mut inst, 1..5, 4..7, 9);

        let out = separate_instances(MaskLabels::Instances(inst.as_view()), true)
            .expect("valid mask");

        for y in 1..5 {
            for x in 1..4 {
                assert_eq!(out.get(x, y), Some(&1), "first instance kept at ({x}, {y})");
            }
            assert_eq!(out.get(4, y), Some(&0), "ridge at ({}, {y})", 4);
            assert_eq!(out.get(5, y), Some(&1));
        }
    }

    #[test]
    fn instances_only_become_binary_classes() {
        let mut inst = Image::new_fill(6, 6, 0u32);
        paint(&mut inst, 0..2, 0..2, 5);
        paint(&mut inst, 4..6, 4..6, 11);

        let out = separate_instances(MaskLabels::Instances(inst.as_view()), false)
            .expect("valid mask");
        assert_eq!(out.get(0, 0), Some(&1));
        assert_eq!(out.get(5, 5), Some(&1));
        assert_eq!(out.get(3, 3), Some(&0));
    }

    #[test]
    fn pass_through_without_connectivity_removal() {
        let mut mask = Image::new_fill(6, 4, 0u32);
        paint(&mut mask, 0..4, 0..3, 2);
        paint(&mut mask, 0..4, 3..6, 1);

        let out = separate_instances(MaskLabels::Classes(mask.as_view()), false)
            .expect("valid mask");
        assert_eq!(out, mask);
    }

    #[test]
    fn different_classes_do_not_separate_each_other() {
        let mut mask = Image::new_fill(8, 4, 0u32);
        paint(&mut mask, 0..4, 0..4, 1);
        paint(&mut mask, 0..4, 4..8, 2);

        let out = separate_instances(MaskLabels::Classes(mask.as_view()), true)
            .expect("valid mask");
        assert_eq!(out, mask);
    }

    #[test]
    fn mismatched_class_and_instance_shapes_fail() {
        let classes = Image::new_fill(4, 4, 0u32);
        let instances = Image::new_fill(4, 5, 0u32);
        let res = separate_instances(
            MaskLabels::ClassesWithInstances {
                classes: classes.as_view(),
                instances: instances.as_view(),
            },
            true,
        );
        assert!(res.is_err());
    }
}
