use clap::Parser;
use std::fs;
use std::path::PathBuf;
use pixel_palette::{PixelateOptions, parse_block_size, parse_target_color_count, pixelate_bytes};
use anyhow::Context;
use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Block-pixelate images and report their palettes.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// One or more input image paths
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Block edge length in pixels. Negative and decimal input is coerced
    /// the same way the interactive field does it.
    #[arg(short, long, default_value = "10", allow_hyphen_values = true)]
    block_size: String,

    /// Reduce the palette to this many colors
    #[arg(short = 'k', long, allow_hyphen_values = true)]
    colors: Option<String>,

    /// Canonical color name (e.g. 255_0_0) to hide; may be repeated
    #[arg(long = "hide")]
    hidden: Vec<String>,

    /// Print the displayed palette of every image as JSON
    #[arg(long)]
    palette_json: bool,

    /// Output directory
    #[arg(short = 'd', long)]
    out_dir: Option<PathBuf>,

    /// Output filename prefix (ignored when --out-dir supplied)
    #[arg(short = 'p', long, default_value = "pixelated_")]
    prefix: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let options = PixelateOptions {
        block_size: parse_block_size(&args.block_size).context("invalid --block-size")?,
        target_color_count: match &args.colors {
            Some(text) => parse_target_color_count(text).context("invalid --colors")?,
            None => None,
        },
    };

    for input in &args.inputs {
        let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
        let (png, palette) = pixelate_bytes(&bytes, options, &args.hidden)
            .with_context(|| format!("pixelating {}", input.display()))?;

        let out_path = if let Some(dir) = &args.out_dir {
            let stem = input.file_stem().unwrap_or_default().to_string_lossy();
            dir.join(format!("{stem}.png"))
        } else {
            let stem = input.file_name().unwrap_or_default().to_string_lossy();
            PathBuf::from(format!("{}{}", args.prefix, stem))
        };

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&out_path, png)?;
        tracing::info!(output = %out_path.display(), colors = palette.len(), "saved");

        if args.palette_json {
            println!("{}", serde_json::to_string_pretty(&palette)?);
        }
    }

    Ok(())
}
