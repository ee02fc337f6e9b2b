//! Example: tile an image, run a stand-in "model" per tile, stitch it back.
//!
//! The stand-in model averages channels, so the stitched result must equal
//! the channel mean of the source. The example reports the largest deviation,
//! per-tile timing and the tile layout as JSON next to the input.
//!
//! Run from the workspace root:
//!   cargo run -p tilekit --example stitch -- --help
//!   cargo run -p tilekit --example stitch -- --input data/scan.png

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Serialize;
use tilekit::{
    DeterministicTiler, Image, ImageFileReader, MemoryStore, Mosaic, PreprocessConfig,
    Preprocessor, SourceFile, SourceReader, TileInfo, TilerConfig,
};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(about = "Tile an image, average channels per tile and stitch the result")]
struct Args {
    #[arg(long, default_value = "data/scan.png")]
    input: PathBuf,

    /// Tile side in pixels
    #[arg(long, default_value_t = 256)]
    tile: usize,

    /// Border discarded from every tile output
    #[arg(long, default_value_t = 32)]
    padding: usize,

    /// Tile spacing as a fraction of the output tile
    #[arg(long, default_value_t = 0.75)]
    shift: f32,

    /// Output JSON path (default: <input stem>_tiles.json next to input)
    #[arg(long)]
    out: Option<PathBuf>,
}

// ── JSON DTOs ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct Report {
    width: usize,
    height: usize,
    tiles: usize,
    total_ms: f64,
    max_abs_error: f32,
    layout: Vec<TileInfo>,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn channel_mean(img: &Image<f32>) -> Result<Image<f32>> {
    let ch = img.channels().max(1);
    let data = img
        .data()
        .chunks_exact(ch)
        .map(|px| px.iter().sum::<f32>() / ch as f32)
        .collect();
    Image::from_vec(img.width(), img.height(), data).context("building mean image")
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args = Args::parse();
    if args.padding >= args.tile {
        bail!("padding {} must be smaller than tile {}", args.padding, args.tile);
    }
    let out_path = args.out.clone().unwrap_or_else(|| {
        let stem = args.input.file_stem().unwrap_or_default().to_string_lossy();
        args.input.with_file_name(format!("{stem}_tiles.json"))
    });

    let source = ImageFileReader
        .read_image(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let expected = channel_mean(&source)?;
    let [height, width] = source.shape();
    println!("loaded {}: {width}x{height}x{}", args.input.display(), source.channels());

    let corpus = Preprocessor::new(
        ImageFileReader,
        MemoryStore::new(),
        PreprocessConfig {
            tile_shape: [args.tile, args.tile],
            padding: [args.padding, args.padding],
            ..PreprocessConfig::default()
        },
    )
    .run(&[SourceFile::new(&args.input)])
    .context("preprocessing")?;

    let tiler = DeterministicTiler::new(
        Arc::new(corpus),
        TilerConfig {
            tile_shape: [args.tile, args.tile],
            padding: [args.padding, args.padding],
            max_tile_shift: args.shift,
            normalize: false,
            ..TilerConfig::default()
        },
    )
    .context("laying out tiles")?;
    println!("{} tiles of {}x{}", tiler.len(), args.tile, args.tile);

    let output = args.tile - args.padding;
    let half = args.padding / 2;
    let mut mosaic = Mosaic::for_tiler(&tiler, 1);
    let mut layout = Vec::with_capacity(tiler.len());
    let total_start = Instant::now();

    for idx in 0..tiler.len() {
        let item = tiler.get(idx)?;
        let pred = channel_mean(&item.image)?;
        let cropped = pred.as_view().subview(half, half, output, output)?;
        let info = tiler.tile_info(idx)?;
        mosaic.insert(&info, &cropped)?;
        layout.push(info);
    }
    let total_ms = total_start.elapsed().as_secs_f64() * 1e3;

    if !mosaic.is_covered(0) {
        bail!("tile layout left pixels uncovered");
    }
    let stitched = &mosaic.images()[0];
    let max_abs_error = stitched
        .data()
        .iter()
        .zip(expected.data())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f32, f32::max);
    println!("stitched in {total_ms:.2} ms, max |error| = {max_abs_error}");

    let report = Report {
        width,
        height,
        tiles: layout.len(),
        total_ms,
        max_abs_error,
        layout,
    };
    let out_file = std::fs::File::create(&out_path)
        .with_context(|| format!("creating {}", out_path.display()))?;
    serde_json::to_writer_pretty(out_file, &report)
        .with_context(|| format!("writing JSON to {}", out_path.display()))?;

    println!("report written to {}", out_path.display());
    Ok(())
}
