use anyhow::{bail, Context, Result};
use clap::{App, Arg, ArgMatches};
use image::{ColorType, DynamicImage, GenericImageView, ImageFormat};
use log::info;

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use pixelsort::interval::{Chunking, Detector};
use pixelsort::{Config, Direction};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = App::new("pixelsort")
        .version(clap::crate_version!())
        .author(clap::crate_authors!())
        .arg(
            Arg::with_name("input")
                .help("The png image to sort.")
                .required(true)
                .takes_value(true),
        )
        .args(&[
            arg_direction(),
            arg_chunking(),
            arg_threshold(),
            arg_min_chunk(),
            arg_size(),
            arg_suffix(),
            arg_out_dir(),
            arg_output(),
        ])
        .get_matches();

    let input = Path::new(matches.value_of_os("input").context("no input image given")?);
    let config = config(&matches)?;
    let output = match matches.value_of_os("output") {
        Some(output) => PathBuf::from(output),
        None => output_path(
            input,
            matches.value_of_os("out_dir").map(Path::new),
            matches.value_of("suffix").unwrap_or("sorted"),
        )?,
    };

    check_png(input)?;
    let image = image::open(input)
        .with_context(|| format!("failed to read input image {}", input.display()))?;
    let color = image.color();
    info!(
        "sorting {} ({}x{}, {:?}) with {:?}",
        input.display(),
        image.width(),
        image.height(),
        color,
        config
    );

    let sorted = pixelsort::sort_image(&image.into_rgba16(), &config);
    let sorted = if is_16_bit(color) {
        DynamicImage::ImageRgba16(sorted)
    } else {
        DynamicImage::ImageRgba8(DynamicImage::ImageRgba16(sorted).into_rgba8())
    };

    save_atomic(&sorted, &output)?;
    info!("wrote {}", output.display());
    Ok(())
}

fn config(matches: &ArgMatches) -> Result<Config> {
    let direction = Direction::from_str(matches.value_of("direction").unwrap_or("both"))
        .map_err(|s| anyhow::anyhow!("unknown sort direction `{}`", s))?;
    let chunking = Chunking::from_str(matches.value_of("chunking").unwrap_or("threshold"))
        .map_err(|s| anyhow::anyhow!("unknown chunking `{}`", s))?;
    let detector = match chunking {
        Chunking::Threshold => {
            if matches.is_present("size") {
                bail!("--size only applies to `fixed` chunking");
            }
            let delta: Option<f64> = parse_opt(matches, "threshold")?;
            if let Some(delta) = delta.filter(|delta| delta.is_nan() || *delta < 0.0) {
                bail!("threshold must be a non-negative percentage, got {}", delta);
            }
            Detector::Threshold {
                min_chunk: parse_opt(matches, "min_chunk")?,
                delta,
            }
        }
        Chunking::Fixed => {
            for name in &["threshold", "min_chunk"] {
                if matches.is_present(name) {
                    bail!("--{} only applies to `threshold` chunking", name.replace('_', "-"));
                }
            }
            Detector::Fixed {
                size: parse_opt(matches, "size")?,
            }
        }
    };
    Ok(Config {
        direction,
        detector,
    })
}

fn parse_opt<T>(matches: &ArgMatches, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    matches
        .value_of(name)
        .map(|value| {
            value
                .parse()
                .with_context(|| format!("{} was not a valid number: `{}`", name, value))
        })
        .transpose()
}

fn check_png(input: &Path) -> Result<()> {
    match input.extension().and_then(OsStr::to_str) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => Ok(()),
        Some(ext) => bail!("use a .png image, not a .{}", ext),
        None => bail!("use a .png image, {} has no extension", input.display()),
    }
}

/// `dir/name.ext` becomes `out_dir/name.<suffix>.ext`, `out_dir` defaulting
/// to the working directory.
fn output_path(input: &Path, out_dir: Option<&Path>, suffix: &str) -> Result<PathBuf> {
    let name = input
        .file_name()
        .with_context(|| format!("{} is not a file", input.display()))?;
    let extension = input.extension().and_then(OsStr::to_str).unwrap_or("png");
    let file = Path::new(name).with_extension([suffix, ".", extension].concat());
    Ok(match out_dir {
        Some(dir) => dir.join(file),
        None => file,
    })
}

fn is_16_bit(color: ColorType) -> bool {
    matches!(
        color,
        ColorType::L16 | ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16
    )
}

/// Encodes next to the destination first so a failed write never leaves a
/// truncated image behind.
fn save_atomic(image: &DynamicImage, output: &Path) -> Result<()> {
    let mut tmp = output.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    if let Err(e) = image.save_with_format(&tmp, ImageFormat::Png) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("failed to encode {}", output.display()));
    }
    if let Err(e) = fs::rename(&tmp, output) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("failed to write {}", output.display()));
    }
    Ok(())
}

fn arg_direction() -> Arg<'static, 'static> {
    Arg::with_name("direction")
        .short("d")
        .long("direction")
        .help("The axes to sort along.")
        .long_help(
            "The axes to sort along.\n\
             \n\
             `x` sorts rows, `y` sorts columns, `both` sorts columns first and then the rows of the result.",
        )
        .possible_values(&["x", "y", "both"])
        .default_value("both")
        .takes_value(true)
}

fn arg_chunking() -> Arg<'static, 'static> {
    Arg::with_name("chunking")
        .short("c")
        .long("chunking")
        .help("How scan lines are split into chunks.")
        .long_help(
            "How scan lines are split into chunks.\n\
             \n\
             `threshold` starts a new chunk after mid-bright pixels, `fixed` after every `--size` pixels.",
        )
        .possible_values(&["threshold", "fixed"])
        .default_value("threshold")
        .takes_value(true)
}

fn arg_threshold() -> Arg<'static, 'static> {
    Arg::with_name("threshold")
        .short("t")
        .long("threshold")
        .help("Also start a new chunk if the lightness changes by more than this percentage.")
        .allow_hyphen_values(true)
        .takes_value(true)
}

fn arg_min_chunk() -> Arg<'static, 'static> {
    Arg::with_name("min_chunk")
        .short("m")
        .long("min-chunk")
        .help("Do not start a new chunk unless the current one has at least this many pixels.")
        .takes_value(true)
}

fn arg_size() -> Arg<'static, 'static> {
    Arg::with_name("size")
        .short("n")
        .long("size")
        .help("Chunk length used by `fixed` chunking, whole lines if omitted.")
        .takes_value(true)
}

fn arg_suffix() -> Arg<'static, 'static> {
    Arg::with_name("suffix")
        .short("s")
        .long("suffix")
        .help("Suffix inserted before the extension of the output file name.")
        .default_value("sorted")
        .takes_value(true)
}

fn arg_out_dir() -> Arg<'static, 'static> {
    Arg::with_name("out_dir")
        .short("D")
        .long("out-dir")
        .help("Directory to save the output image to.")
        .takes_value(true)
}

fn arg_output() -> Arg<'static, 'static> {
    Arg::with_name("output")
        .short("o")
        .long("output")
        .help("A file path to save the output image to, overrides `--suffix` and `--out-dir`.")
        .takes_value(true)
}
