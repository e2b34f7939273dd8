// main.rs — quadfilter CLI.
//
// Usage: quadfilter <image path>
//
// Decodes the input, runs the fixed four-filter GPU chain, and writes
// one PNG per filter next to the working directory. Image decode/encode
// is the `image` crate's job; this binary only converts between the
// pipeline's RGBA layout and the 3-channel files it reads and writes.
//
// Exit codes: clap reports wrong argument counts as usage errors; every
// other failure (unreadable input, no GPU, payload errors, backend
// errors) propagates through anyhow and exits non-zero with a
// human-readable message.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use image::RgbaImage;

use quadfilter::coeffs::gaussian_coefficients;
use quadfilter::device::GpuDevice;
use quadfilter::filters::{FilterChain, SMOOTHING_KERNEL_SIZE, SMOOTHING_SIGMA};
use quadfilter::image::SourceImage;
use quadfilter::program::{load_kernel_source, FilterProgram};

/// Kernel payload location, relative to the working directory.
const KERNEL_PATH: &str = "kernels/filters.wgsl";

/// GPU still-image filter pipeline: gaussian, bilateral, sharpen, median.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Path to the input image.
    image: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let input = image::open(&args.image)
        .with_context(|| format!("could not open or decode image `{}`", args.image.display()))?
        .to_rgba8();
    let (width, height) = input.dimensions();
    log::info!("loaded {} ({width}×{height})", args.image.display());

    let kernel_source = load_kernel_source(Path::new(KERNEL_PATH))?;

    let gpu = GpuDevice::new()?;
    let program = FilterProgram::build(&gpu, &kernel_source)?;

    let source = SourceImage::upload(&gpu, input.as_raw(), width, height);
    let coeffs = gaussian_coefficients(SMOOTHING_KERNEL_SIZE, SMOOTHING_SIGMA)?;
    let chain = FilterChain::new(&gpu, &program, &source, &coeffs, SMOOTHING_KERNEL_SIZE);

    chain.run_all(|filter, pixels| {
        let rgba = RgbaImage::from_raw(width, height, pixels)
            .context("read-back buffer has the wrong size")?;
        // Outputs are 3-channel files; drop the pipeline's alpha.
        let rgb = image::DynamicImage::ImageRgba8(rgba).into_rgb8();
        rgb.save(filter.output_name())
            .with_context(|| format!("could not write `{}`", filter.output_name()))?;
        log::info!("{filter}: wrote {}", filter.output_name());
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}
