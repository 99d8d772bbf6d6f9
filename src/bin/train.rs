//! Trains a forest from one or more labeled image/label raster pairs.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::info;

use texture_forest::colormap::Colormap;
use texture_forest::config::TrainConfig;
use texture_forest::dataset::{build_random_dataset, SamplingMode};
use texture_forest::filter::FilterFamily;
use texture_forest::forest::Forest;
use texture_forest::grow::{assign_evenly, grow_pass, tally_classes};
use texture_forest::raster::RasterImage;
use texture_forest::Result;

#[derive(Parser, Debug)]
#[command(name = "tc-train", about = "Train a texture classification forest")]
struct Args {
    /// Output forest file.
    #[arg(short = 'o', long, default_value = "out.forest")]
    output: PathBuf,

    /// Local window half-width used by all filters.
    #[arg(short = 'w', long, default_value_t = 61)]
    winsize: i32,

    /// Number of training samples to draw.
    #[arg(short = 'n', long, default_value_t = 100_000)]
    ndata: usize,

    /// Number of trees in the forest.
    #[arg(short = 't', long, default_value_t = 64)]
    ntrees: usize,

    /// Number of grow passes (one node expansion attempt per tree each pass).
    #[arg(short = 'l', long, default_value_t = 64)]
    niter: usize,

    /// Random candidate filters tried per trainer thread per node.
    #[arg(short = 'f', long, default_value_t = 64)]
    nfeatures: usize,

    /// Trainer threads per grow pass.
    #[arg(short = 'c', long, default_value_t = 1)]
    nthreads: usize,

    /// PRNG seed.
    #[arg(short = 's', long, default_value_t = 0)]
    seed: u64,

    /// Filter family: points, ratios, or rectangles.
    #[arg(long, default_value = "points")]
    family: String,

    /// Allow filters to compare across channels.
    #[arg(long, default_value_t = false)]
    cross_channel: bool,

    /// Use balanced (round-robin per class) sampling instead of uniform.
    #[arg(long, default_value_t = false)]
    balance: bool,

    /// Treat labels as the built-in binary (red/blue) colormap.
    #[arg(short = 'b', long, default_value_t = false)]
    binary: bool,

    /// Alternating image, label, image, label, ... raster paths.
    #[arg(required = true, num_args = 2..)]
    images_and_labels: Vec<PathBuf>,
}

fn config_from_args(args: &Args) -> Result<TrainConfig> {
    let family = FilterFamily::from_name(&args.family).ok_or_else(|| texture_forest::Error::Format {
        path: None,
        context: format!("unknown filter family '{}'", args.family),
    })?;
    Ok(TrainConfig {
        winsize: args.winsize,
        ntrees: args.ntrees,
        nfeatures: args.nfeatures,
        niter: args.niter,
        nthreads: args.nthreads,
        filter_family: family,
        cross_channel: args.cross_channel,
        seed: args.seed,
        ndata: args.ndata,
        sampling_mode: if args.balance { SamplingMode::Balanced } else { SamplingMode::Random },
        binary_colormap: args.binary,
        output: args.output.clone(),
    })
}

fn run(args: Args) -> Result<()> {
    let config = config_from_args(&args)?;

    if args.images_and_labels.len() % 2 != 0 {
        return Err(texture_forest::Error::Format {
            path: None,
            context: "expected alternating image/label path pairs".to_string(),
        });
    }

    let mut images = Vec::new();
    let mut label_rasters = Vec::new();
    for pair in args.images_and_labels.chunks(2) {
        info!("loading {} / {}", pair[0].display(), pair[1].display());
        images.push(RasterImage::read(&pair[0])?);
        label_rasters.push(RasterImage::read(&pair[1])?);
    }

    let mut colormap = if config.binary_colormap { Some(Colormap::binary()) } else { None };
    if let Some(map) = colormap.as_mut() {
        for raster in &label_rasters {
            map.find_classes(raster)?;
        }
    }

    info!("building dataset: {} samples, {:?} sampling", config.ndata, config.sampling_mode);
    let mut dataset = build_random_dataset(
        images,
        label_rasters,
        colormap.as_ref(),
        config.ndata,
        config.sampling_mode,
        config.seed,
    )?;

    let mut forest = Forest::new(config.ntrees, config.filter_family, dataset.nclasses, config.winsize);
    assign_evenly(&mut dataset, &mut forest);

    for pass in 0..config.niter {
        grow_pass(
            &mut dataset,
            &mut forest,
            config.nthreads,
            config.nfeatures,
            config.cross_channel,
            config.seed,
            pass,
        );
        if pass % 8 == 0 {
            info!("grow pass {}/{}", pass + 1, config.niter);
        }
    }

    info!("tallying leaf class distributions");
    tally_classes(&dataset, &mut forest);

    info!("writing forest to {}", config.output.display());
    let file = std::fs::File::create(&config.output)?;
    let mut writer = std::io::BufWriter::new(file);
    forest.write(&mut writer, colormap.as_ref())?;

    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tc-train: {}", e);
            ExitCode::FAILURE
        }
    }
}
