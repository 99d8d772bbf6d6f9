//! Classifies every pixel of a raster image using a trained forest.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::info;

use texture_forest::config::ClassifyConfig;
use texture_forest::forest::Forest;
use texture_forest::raster::{LabelImage, RasterImage};
use texture_forest::Result;

#[derive(Parser, Debug)]
#[command(name = "tc-classify", about = "Classify a raster image with a trained forest")]
struct Args {
    /// Forest file produced by tc-train.
    forest: PathBuf,

    /// Input raster to classify.
    input: PathBuf,

    /// Output label raster.
    output: PathBuf,

    /// Classify every Nth pixel only, leaving the rest unclassified.
    #[arg(long, default_value_t = 1)]
    skip: usize,

    /// Optional path to write the per-class probability stack to.
    #[arg(long)]
    probs: Option<PathBuf>,
}

fn config_from_args(args: &Args) -> ClassifyConfig {
    ClassifyConfig {
        forest: args.forest.clone(),
        input: args.input.clone(),
        output: args.output.clone(),
        skip: args.skip.max(1),
        probs: args.probs.clone(),
    }
}

fn run(args: Args) -> Result<()> {
    let config = config_from_args(&args);

    info!("loading forest from {}", config.forest.display());
    let file = std::fs::File::open(&config.forest)?;
    let reader = std::io::BufReader::new(file);
    let (forest, _colormap) = Forest::read(reader)?;

    info!("loading image from {}", config.input.display());
    let image = RasterImage::read(&config.input)?;

    let mut labels = LabelImage::new(image.rows, image.cols);
    let mut probs_stack = config.probs.as_ref().map(|_| vec![0f32; image.rows * image.cols * forest.nclasses]);

    for r in (0..image.rows).step_by(config.skip) {
        for c in (0..image.cols).step_by(config.skip) {
            let mut probs = vec![0f32; forest.nclasses];
            let class = forest.classify(&image, r, c, Some(&mut probs));
            labels.set(r, c, class);
            if let Some(stack) = probs_stack.as_mut() {
                let base = (r * image.cols + c) * forest.nclasses;
                stack[base..base + forest.nclasses].copy_from_slice(&probs);
            }
        }
    }

    info!("writing labels to {}", config.output.display());
    let mut out_raster = RasterImage::new(image.rows, image.cols, 1);
    out_raster.data.copy_from_slice(&labels.label);
    out_raster.write(&config.output)?;

    if let (Some(path), Some(stack)) = (config.probs.as_ref(), probs_stack.as_ref()) {
        info!("writing probability stack to {}", path.display());
        let mut probs_raster = RasterImage::new(image.rows, image.cols, forest.nclasses);
        for (i, v) in stack.iter().enumerate() {
            probs_raster.data[i] = (v.clamp(0.0, 1.0) * 255.0) as u8;
        }
        probs_raster.write(path)?;
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tc-classify: {}", e);
            ExitCode::FAILURE
        }
    }
}
