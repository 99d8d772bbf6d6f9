//! Applies one preprocessing method to a raster image.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::info;

use texture_forest::config::{PrepConfig, PrepMethod};
use texture_forest::preprocess;
use texture_forest::raster::RasterImage;
use texture_forest::{Error, Result};

#[derive(Parser, Debug)]
#[command(name = "tc-prep", about = "Preprocess a raster image into a forest-ready feature stack")]
struct Args {
    /// intensity, hsv, greyworld, normalize, bandpass, bars, flatfield, greyrgb
    #[arg(long)]
    method: String,

    input: PathBuf,
    output: PathBuf,

    /// Target mean, used by greyworld/normalize/bandpass.
    #[arg(long, default_value_t = 128.0)]
    target_mu: f64,

    /// Target standard deviation, used by normalize.
    #[arg(long, default_value_t = 32.0)]
    target_stdev: f64,

    /// Outlier clip, in standard deviations, used by normalize (0 = off).
    #[arg(long, default_value_t = 0.0)]
    robust: f64,

    /// Wide box-blur width, used by bandpass.
    #[arg(long, default_value_t = 21)]
    wbig: usize,

    /// Narrow box-blur width, used by bandpass.
    #[arg(long, default_value_t = 3)]
    wsmall: usize,

    /// Bar filter orientation count, used by bars.
    #[arg(long, default_value_t = 4)]
    norients: usize,

    /// Bar filter scale count, used by bars.
    #[arg(long, default_value_t = 2)]
    nscales: usize,

    /// Bar filter kernel support, used by bars.
    #[arg(long, default_value_t = 9)]
    support: usize,

    /// Flat field raster path, used by flatfield.
    #[arg(long)]
    flatfield: Option<PathBuf>,
}

fn config_from_args(args: &Args) -> Result<PrepConfig> {
    let method = match args.method.as_str() {
        "intensity" => PrepMethod::Intensity,
        "hsv" => PrepMethod::Hsv,
        "greyworld" => PrepMethod::Greyworld,
        "normalize" => PrepMethod::Normalize,
        "bandpass" => PrepMethod::Bandpass,
        "bars" => PrepMethod::Bars,
        "flatfield" => PrepMethod::Flatfield,
        "greyrgb" => PrepMethod::GreyRgb,
        other => {
            return Err(Error::Format { path: None, context: format!("unknown preprocessing method '{}'", other) })
        }
    };
    Ok(PrepConfig {
        method,
        input: args.input.clone(),
        output: args.output.clone(),
        maxval: 255,
        target_mu: args.target_mu,
        target_stdev: args.target_stdev,
        robust: args.robust,
        wbig: args.wbig,
        wsmall: args.wsmall,
        norients: args.norients,
        nscales: args.nscales,
        support: args.support,
        flatfield: args.flatfield.clone(),
    })
}

fn run(args: Args) -> Result<()> {
    let config = config_from_args(&args)?;

    info!("loading {}", config.input.display());
    let src = RasterImage::read(&config.input)?;

    let out = match config.method {
        PrepMethod::Intensity => preprocess::intensity(&src),
        PrepMethod::Hsv => preprocess::rgb_to_hsv(&src, config.maxval)?,
        PrepMethod::Greyworld => preprocess::greyworld(&src, config.target_mu),
        PrepMethod::Normalize => preprocess::normalize(&src, config.target_mu, config.target_stdev, config.robust),
        PrepMethod::Bandpass => preprocess::bandpass(&src, config.wbig, config.wsmall, config.target_mu),
        PrepMethod::Bars => {
            let bank = preprocess::build_bar_bank(config.norients, config.nscales, config.support);
            preprocess::oriented_bars(&src, &bank)
        }
        PrepMethod::Flatfield => {
            let field_path = config.flatfield.ok_or_else(|| Error::Format {
                path: None,
                context: "flatfield method requires --flatfield <path>".to_string(),
            })?;
            let field = RasterImage::read(&field_path)?;
            preprocess::flatfield(&src, &field)?
        }
        PrepMethod::GreyRgb => preprocess::grey_to_rgb(&src)?,
    };

    info!("writing {}", config.output.display());
    out.write(&config.output)?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tc-prep: {}", e);
            ExitCode::FAILURE
        }
    }
}
