use criterion::{Criterion, black_box, criterion_group, criterion_main};
use tk_core::Image;
use tk_tile::{CdfParams, CdfSurface};

fn stripes(width: usize, height: usize) -> Image<u8> {
    let data = (0..width * height)
        .map(|i| u8::from((i % width) / 64 % 3 == 0))
        .collect();
    Image::from_vec(width, height, data).expect("valid label")
}

fn bench_build(c: &mut Criterion) {
    let label = stripes(4096, 3072);
    let view = label.as_view();
    let params = CdfParams {
        ignore_edges_pct: 0.1,
        ..CdfParams::default()
    };

    c.bench_function("cdf_build_4096x3072_to_512", |b| {
        b.iter(|| {
            let cdf = CdfSurface::build(black_box(&view), None, &params).expect("valid label");
            black_box(cdf);
        });
    });
}

fn bench_random_center(c: &mut Criterion) {
    let label = stripes(2048, 2048);
    let cdf = CdfSurface::build(&label.as_view(), None, &CdfParams::default()).expect("valid label");

    c.bench_function("cdf_random_center_512x512", |b| {
        let mut u = 0.0f32;
        b.iter(|| {
            u = (u + 0.618_034) % 1.0;
            black_box(cdf.random_center(black_box(u), [2048, 2048]));
        });
    });
}

criterion_group!(benches, bench_build, bench_random_center);
criterion_main!(benches);
