use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use image::{GrayImage, RgbImage};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tk_core::Image;
use tk_tile::{
    Corpus, DeterministicTiler, DirStore, ImageFileReader, PreprocessConfig, Preprocessor,
    RandomTileConfig, RandomTileSampler, SourceFile, Stats, TileInfo, TilerConfig,
};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "tif", "tiff", "raw"];

#[derive(Parser, Debug)]
#[command(name = "tk_gallery")]
#[command(about = "Preprocess image/mask folders and export tiles")]
struct Cli {
    /// Log specification, e.g. `info` or `debug,tk_tile=trace`.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fill the cache and write corpus statistics.
    #[command(name = "preprocess")]
    Preprocess(CommonArgs),
    /// Lay out the deterministic grid and write per-tile info.
    #[command(name = "tiles")]
    Tiles(TilesArgs),
    /// Draw random training tiles.
    #[command(name = "sample")]
    Sample(SampleArgs),
}

#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Folder of source images.
    #[arg(long, required = true)]
    images: PathBuf,
    /// Folder of masks named like their images.
    #[arg(long)]
    masks: Option<PathBuf>,
    #[arg(long, default_value = "cache")]
    cache: PathBuf,
    /// JSON file with `preprocess`, `random` and `tiler` sections.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Reuse complete cache entries.
    #[arg(long)]
    use_cached: bool,
    #[arg(long)]
    num_classes: Option<usize>,
    #[arg(long, default_value = "out")]
    out: PathBuf,
}

#[derive(Args, Debug, Clone)]
struct TilesArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// Also save this many tiles as PNG.
    #[arg(long, default_value_t = 0)]
    save: usize,
}

#[derive(Args, Debug, Clone)]
struct SampleArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long, default_value_t = 16)]
    count: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct GalleryConfig {
    preprocess: PreprocessConfig,
    random: RandomTileConfig,
    tiler: TilerConfig,
}

#[derive(Debug, Clone, Serialize)]
struct CorpusSummary<'a> {
    files: Vec<&'a str>,
    num_classes: usize,
    stats: &'a Stats,
}

#[derive(Debug, Clone, Serialize)]
struct TileListing {
    total: usize,
    tiles: Vec<TileInfo>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _logger = flexi_logger::Logger::try_with_str(&cli.log_level)
        .with_context(|| format!("parsing log specification '{}'", cli.log_level))?
        .start()
        .context("starting logger")?;

    match cli.cmd {
        Command::Preprocess(args) => run_preprocess(args),
        Command::Tiles(args) => run_tiles(args),
        Command::Sample(args) => run_sample(args),
    }
}

fn run_preprocess(args: CommonArgs) -> Result<()> {
    let (_, corpus) = prepare(&args)?;
    fs::create_dir_all(&args.out)
        .with_context(|| format!("creating output dir {}", args.out.display()))?;
    write_json(
        args.out.join("corpus.json"),
        &CorpusSummary {
            files: corpus.files().collect(),
            num_classes: corpus.num_classes(),
            stats: corpus.stats(),
        },
    )?;
    info!("Wrote corpus summary to {}", args.out.display());
    Ok(())
}

fn run_tiles(args: TilesArgs) -> Result<()> {
    let (config, corpus) = prepare(&args.common)?;
    let out = &args.common.out;
    fs::create_dir_all(out).with_context(|| format!("creating output dir {}", out.display()))?;

    let tiler = DeterministicTiler::new(Arc::new(corpus), config.tiler)
        .context("laying out tile grid")?;
    let tiles = (0..tiler.len())
        .map(|i| tiler.tile_info(i))
        .collect::<Result<Vec<_>, _>>()
        .context("collecting tile info")?;
    write_json(
        out.join("tiles.json"),
        &TileListing {
            total: tiler.tiles().len(),
            tiles,
        },
    )?;

    for idx in 0..args.save.min(tiler.len()) {
        let item = tiler.get(idx).with_context(|| format!("reading tile {idx}"))?;
        save_f32_image(out.join(format!("tile_{idx:05}.png")), &item.image)?;
        if let Some(label) = &item.label {
            save_label(out.join(format!("tile_{idx:05}_label.png")), label)?;
        }
    }
    info!("Wrote {} tile entries to {}", tiler.len(), out.display());
    Ok(())
}

fn run_sample(args: SampleArgs) -> Result<()> {
    let (config, corpus) = prepare(&args.common)?;
    let out = &args.common.out;
    fs::create_dir_all(out).with_context(|| format!("creating output dir {}", out.display()))?;

    let sampler = RandomTileSampler::new(Arc::new(corpus), config.random)
        .context("building random sampler (every image needs a mask)")?;
    if sampler.is_empty() {
        bail!("random sampler is empty; raise sample_mult or min_length");
    }

    let mut rng = StdRng::seed_from_u64(args.seed);
    for i in 0..args.count {
        let idx = i % sampler.len();
        let (img, lbl) = sampler
            .get(idx, &mut rng)
            .with_context(|| format!("sampling tile {idx}"))?;
        save_f32_image(out.join(format!("sample_{i:05}.png")), &img)?;
        save_label(out.join(format!("sample_{i:05}_label.png")), &lbl)?;
    }
    info!("Wrote {} samples to {}", args.count, out.display());
    Ok(())
}

fn prepare(args: &CommonArgs) -> Result<(GalleryConfig, Corpus<DirStore>)> {
    let mut config: GalleryConfig = match &args.config {
        Some(path) => read_json(path)?,
        None => GalleryConfig::default(),
    };
    if args.use_cached {
        config.preprocess.use_cached = true;
    }
    if let Some(n) = args.num_classes {
        config.preprocess.labels.num_classes = n;
    }

    let files = collect_sources(&args.images, args.masks.as_deref())?;
    let store = DirStore::open(&args.cache)
        .with_context(|| format!("opening cache {}", args.cache.display()))?;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("progress template")?
            .progress_chars("#>-"),
    );
    let corpus = Preprocessor::new(ImageFileReader, store, config.preprocess.clone())
        .run_with_progress(&files, |i, file| {
            pb.set_position(i as u64);
            pb.set_message(file.name());
        })
        .context("preprocessing sources")?;
    pb.finish_and_clear();

    Ok((config, corpus))
}

fn collect_sources(images: &Path, masks: Option<&Path>) -> Result<Vec<SourceFile>> {
    ensure_dir_exists(images, "images")?;
    if let Some(dir) = masks {
        ensure_dir_exists(dir, "masks")?;
    }

    let mut paths = Vec::new();
    for entry in
        fs::read_dir(images).with_context(|| format!("listing {}", images.display()))?
    {
        let path = entry?.path();
        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if path.is_file() && supported {
            paths.push(path);
        }
    }
    if paths.is_empty() {
        bail!("no images found in {}", images.display());
    }
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|path| {
            let mask = masks.zip(path.file_name()).map(|(dir, name)| dir.join(name));
            let file = SourceFile::new(path);
            match mask {
                Some(mask) if mask.is_file() => file.with_label(mask),
                _ => file,
            }
        })
        .collect())
}

fn save_f32_image(path: PathBuf, img: &Image<f32>) -> Result<()> {
    let (w, h) = (img.width() as u32, img.height() as u32);
    let ch = img.channels();
    let vis = f32_to_u8_vis(img.data());
    let result = if ch == 3 {
        RgbImage::from_raw(w, h, vis)
            .context("constructing RgbImage from tile")?
            .save(&path)
    } else {
        let first: Vec<u8> = vis.iter().step_by(ch.max(1)).copied().collect();
        GrayImage::from_raw(w, h, first)
            .context("constructing GrayImage from tile")?
            .save(&path)
    };
    result.with_context(|| format!("saving image {}", path.display()))
}

fn save_label(path: PathBuf, label: &Image<u8>) -> Result<()> {
    let max = label.data().iter().copied().max().unwrap_or(0).max(1);
    let data = label.data().iter().map(|&v| (u32::from(v) * 255 / u32::from(max)) as u8).collect();
    GrayImage::from_raw(label.width() as u32, label.height() as u32, data)
        .context("constructing GrayImage from label")?
        .save(&path)
        .with_context(|| format!("saving label {}", path.display()))
}

fn f32_to_u8_vis(data: &[f32]) -> Vec<u8> {
    let (min_v, max_v) = data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if data.is_empty() || (max_v - min_v).abs() < 1e-12 {
        return vec![0u8; data.len()];
    }

    let scale = 255.0 / (max_v - min_v);
    data.iter()
        .map(|&v| ((v - min_v) * scale).round().clamp(0.0, 255.0) as u8)
        .collect()
}

fn write_json(path: PathBuf, value: &impl Serialize) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).context("serializing json")?;
    fs::write(&path, bytes).with_context(|| format!("writing json {}", path.display()))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("parsing json {}", path.display()))
}

fn ensure_dir_exists(path: &Path, what: &str) -> Result<()> {
    if !path.is_dir() {
        bail!("{} directory does not exist: {}", what, path.display());
    }
    Ok(())
}
