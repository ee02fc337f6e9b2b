/// Maps `i` into `[0, len)` by mirroring with the edge element repeated:
/// `cba|abcd|dcb`. Returns `None` for an empty axis.
pub fn reflect_index(i: isize, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }

    let period = (2 * len) as isize;
    let r = i.rem_euclid(period) as usize;
    if r < len {
        Some(r)
    } else {
        Some(2 * len - 1 - r)
    }
}

#[cfg(test)]
mod tests {
    use super::reflect_index;

    #[test]
    fn empty_axis_has_no_index() {
        assert_eq!(reflect_index(0, 0), None);
        assert_eq!(reflect_index(-3, 0), None);
    }

    #[test]
    fn reflect_repeats_edge_element() {
        for i in -4..=4 {
            assert_eq!(reflect_index(i, 1), Some(0));
        }

        let cases_len4 = [
            (-5, 3),
            (-4, 3),
            (-3, 2),
            (-2, 1),
            (-1, 0),
            (0, 0),
            (3, 3),
            (4, 3),
            (5, 2),
            (7, 0),
            (8, 0),
        ];
        for (i, expected) in cases_len4 {
            assert_eq!(reflect_index(i, 4), Some(expected), "index {i}");
        }
    }

    #[test]
    fn reflection_is_periodic() {
        for i in -20..20 {
            assert_eq!(reflect_index(i, 5), reflect_index(i + 10, 5), "index {i}");
        }
    }
}
