use proptest::prelude::*;
use tk_core::Image;
use tk_tile::{CdfParams, CdfSurface, axis_centers, layout_tiles, tile_slices};

/// Asserts that the non-empty ranges jointly cover `0..extent`.
fn assert_covers(mut ranges: Vec<std::ops::Range<usize>>, extent: usize) {
    ranges.retain(|r| !r.is_empty());
    ranges.sort_by_key(|r| r.start);
    let mut reach = 0;
    for r in ranges {
        assert!(r.start <= reach, "gap before {r:?} (covered up to {reach})");
        reach = reach.max(r.end);
    }
    assert!(reach >= extent, "covered up to {reach} of {extent}");
}

#[test]
fn hundred_pixel_image_gets_sixteen_tiles() {
    let tiles = layout_tiles(0, [100, 100], [32, 32], 0.0, 1.0).expect("layout");
    assert_eq!(tiles.len(), 16);
    for axis in 0..2 {
        let max_end = tiles.iter().map(|t| t.out_slice[axis].end).max();
        assert_eq!(max_end, Some(100));
    }
    assert_covers(tiles.iter().map(|t| t.out_slice[0].clone()).collect(), 100);
}

proptest! {
    #[test]
    fn slices_match_and_cover_the_axis(
        extent in 1usize..400,
        output in (1usize..=16).prop_map(|k| k * 4),
        factor in prop::sample::select(vec![0.0f32, 0.125, 0.25, 0.5]),
        shift in prop::sample::select(vec![0.5f32, 0.75, 1.0]),
    ) {
        let centers = axis_centers(extent, output, factor, shift).expect("grid");
        let mut outs = Vec::with_capacity(centers.len());
        for c in centers {
            let (input, out) = tile_slices(c, output, extent, 0).expect("valid slices");
            prop_assert_eq!(input.len(), out.len());
            prop_assert!(input.end <= output);
            prop_assert!(out.end <= extent);
            outs.push(out);
        }
        assert_covers(outs, extent);
    }

    #[test]
    fn two_dimensional_layout_covers_every_pixel(
        rows in 1usize..120,
        cols in 1usize..120,
        output in (1usize..=8).prop_map(|k| k * 4),
    ) {
        let tiles = layout_tiles(0, [rows, cols], [output, output], 0.25, 1.0).expect("layout");
        let mut hits = vec![0u32; rows * cols];
        for t in &tiles {
            for y in t.out_slice[0].clone() {
                for x in t.out_slice[1].clone() {
                    hits[y * cols + x] += 1;
                }
            }
        }
        prop_assert!(hits.iter().all(|&h| h > 0));
    }

    #[test]
    fn cdf_is_monotone_and_centers_stay_inside(
        (w, h, labels) in (1usize..24, 1usize..24).prop_flat_map(|(w, h)| {
            (Just(w), Just(h), prop::collection::vec(0u8..3, w * h))
        }),
        reshape in 1usize..16,
        u in 0.0f32..1.0,
    ) {
        let label = Image::from_vec(w, h, labels).expect("valid label");
        let params = CdfParams { reshape, ..CdfParams::default() };
        let cdf = CdfSurface::build(&label.as_view(), None, &params).expect("surface");

        let values = cdf.cumulative();
        prop_assert!(values.windows(2).all(|p| p[0] <= p[1]));
        let last = values[values.len() - 1];
        prop_assert!((last - 1.0).abs() < 1e-3, "last = {}", last);

        let [r, c] = cdf.random_center(u, [h, w]);
        prop_assert!(r < h && c < w);
    }
}
