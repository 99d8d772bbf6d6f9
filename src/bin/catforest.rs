//! Concatenates the trees of several forest files into one, checking that
//! filter family and class count agree first.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::info;

use texture_forest::colormap::Colormap;
use texture_forest::error::Error;
use texture_forest::forest::Forest;
use texture_forest::Result;

#[derive(Parser, Debug)]
#[command(name = "tc-catforest", about = "Concatenate the trees of several forests into one")]
struct Args {
    #[arg(short = 'o', long, default_value = "out.forest")]
    output: PathBuf,

    /// Skip the colormap-equality check and drop the colormap from the output.
    #[arg(long, default_value_t = false)]
    ignore_colors: bool,

    #[arg(required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,
}

fn colormaps_equal(a: &Colormap, b: &Colormap) -> bool {
    a.nclasses == b.nclasses && a.colordepth == b.colordepth && a.colors[..a.nclasses] == b.colors[..b.nclasses]
}

fn run(args: Args) -> Result<()> {
    let mut loaded = Vec::with_capacity(args.inputs.len());
    for path in &args.inputs {
        info!("loading {}", path.display());
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        loaded.push(Forest::read(reader)?);
    }

    let (first, first_map) = loaded.first().ok_or_else(|| Error::Format {
        path: None,
        context: "no input forests given".to_string(),
    })?;
    let family = first.family;
    let nclasses = first.nclasses;
    let winsize = first.winsize;

    for (forest, map) in &loaded[1..] {
        if forest.family != family {
            return Err(Error::FilterFamilyMismatch { a: family.name().to_string(), b: forest.family.name().to_string() });
        }
        if forest.nclasses != nclasses {
            return Err(Error::ClassCountMismatch { a: nclasses, b: forest.nclasses });
        }
        if forest.winsize != winsize {
            return Err(Error::Geometry { context: "window sizes do not match across input forests".to_string() });
        }
        if !args.ignore_colors {
            match (first_map.as_ref(), map.as_ref()) {
                (Some(a), Some(b)) if colormaps_equal(a, b) => {}
                (None, None) => {}
                _ => return Err(Error::ColormapMismatch),
            }
        }
    }

    let mut trees = Vec::new();
    for (forest, _) in loaded.iter() {
        trees.extend(forest.trees.iter().cloned());
    }
    let merged = Forest { trees, family, nclasses, winsize };
    let merged_map = if args.ignore_colors { None } else { first_map.clone() };

    info!("writing {} trees to {}", merged.ntrees(), args.output.display());
    let file = std::fs::File::create(&args.output)?;
    let mut writer = std::io::BufWriter::new(file);
    merged.write(&mut writer, merged_map.as_ref())?;

    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tc-catforest: {}", e);
            ExitCode::FAILURE
        }
    }
}
