use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use dewarp_core::DisparityGrid;
use dewarp_pipeline::{
    dewarp_image, CameraParamsFile, DewarpConfig, DewarpReport, PhotoRotation,
    PiecewiseAffineWarper,
};
use log::info;

/// Flatten a photographed page using a disparity map of its surface.
#[derive(Debug, Parser)]
#[command(author, version, about = "Page dewarping from disparity data")]
struct Args {
    /// Whitespace-separated disparity grid, one text line per image row.
    #[arg(long)]
    disparity: PathBuf,

    /// Photo of the page.
    #[arg(long)]
    photo: PathBuf,

    /// Optional JSON DewarpConfig. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Optional renderer parameter file (`f Tx Ty Tz theta phi psi k`); its
    /// focal length replaces the configured depth focal length.
    #[arg(long)]
    params: Option<PathBuf>,

    /// Clockwise photo rotation in degrees (0, 90, 180 or 270).
    #[arg(long)]
    rotate: Option<u32>,

    /// Where to write the dewarped image.
    #[arg(long, default_value = "dewarped.png")]
    out: PathBuf,

    /// Also write the JSON report to this file.
    #[arg(long)]
    report: Option<PathBuf>,
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

fn load_config(args: &Args) -> Result<DewarpConfig> {
    let mut config = match &args.config {
        Some(path) => load_json_file::<DewarpConfig>(path)?,
        None => DewarpConfig::default(),
    };
    if let Some(path) = &args.params {
        let text =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        CameraParamsFile::parse(&text)
            .with_context(|| format!("parsing {}", path.display()))?
            .apply_to(&mut config);
    }
    if let Some(degrees) = args.rotate {
        config.photo_rotation = PhotoRotation::from_degrees(degrees)
            .ok_or_else(|| anyhow!("rotation must be a multiple of 90 degrees, got {degrees}"))?;
    }
    Ok(config)
}

fn run_from_files(args: &Args) -> Result<String> {
    let config = load_config(args)?;

    let text = fs::read_to_string(&args.disparity)
        .with_context(|| format!("reading {}", args.disparity.display()))?;
    let disparity = DisparityGrid::from_text(&text)
        .with_context(|| format!("parsing {}", args.disparity.display()))?;
    let photo = image::open(&args.photo)
        .with_context(|| format!("loading {}", args.photo.display()))?
        .to_rgba8();

    let (image, output) =
        dewarp_image(disparity, &photo, &config, &PiecewiseAffineWarper::default())?;
    image
        .save(&args.out)
        .with_context(|| format!("saving {}", args.out.display()))?;
    info!("wrote {}", args.out.display());

    let report: DewarpReport = output.report();
    let json = serde_json::to_string_pretty(&report)?;
    if let Some(path) = &args.report {
        fs::write(path, &json).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(json)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let json = run_from_files(&args)?;
    println!("{json}");
    Ok(())
}
