//! Defines command-line interface options using `clap` for the ndimage binary.

use clap::Parser;
use nd_image_io::{Axes, AxisKind};
use std::path::PathBuf;

/// Inspect, assemble and re-partition n-dimensional images
#[derive(Parser, Debug)]
#[command(
    version,
    name = "ndimage",
    about = "Inspect, assemble and re-partition n-dimensional images"
)]
pub struct Args {
    /// Image file, directory, or root directory of a file series
    #[arg(short, long)]
    pub input: PathBuf,

    /// Outer axis tag of a file series, formatted as <axis>=<tag> (e.g. t=_t). Repeatable.
    #[arg(long = "tag", value_parser = parse_tag_arg)]
    pub tags: Vec<(AxisKind, String)>,

    /// File extension of series members (e.g. .tif). Repeatable.
    #[arg(long = "ext")]
    pub extensions: Vec<String>,

    /// Only use series files whose path contains this text. Repeatable.
    #[arg(long)]
    pub include: Vec<String>,

    /// Skip series files whose path contains this text. Repeatable.
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Split an inconsistent series into one image per shape group instead of failing
    #[arg(long, default_value_t = false)]
    pub split_groups: bool,

    /// Save the image here; the extension picks the format (.npy, .tif)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Axes kept inside each output file, e.g. zyx. Defaults to all the format supports.
    #[arg(long, value_parser = parse_axes_arg)]
    pub inner_axes: Option<Axes>,

    /// Axis order of the loaded image. Defaults to itczyx.
    #[arg(long, value_parser = parse_axes_arg)]
    pub output_axes: Option<Axes>,

    /// Keep the axis order found on disk
    #[arg(long, default_value_t = false, conflicts_with = "output_axes")]
    pub native_order: bool,

    /// Enable verbose output.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Number of threads used to read file series. Defaults to number of CPU cores.
    #[arg(short = 't', long)]
    pub threads: Option<usize>,
}

fn parse_tag_arg(s: &str) -> Result<(AxisKind, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    match parts.as_slice() {
        [axis, tag] if !tag.is_empty() => {
            let mut chars = axis.chars();
            match (chars.next().and_then(AxisKind::from_char), chars.next()) {
                (Some(kind), None) => Ok((kind, tag.to_string())),
                _ => Err(format!("Invalid axis '{}': expected one of 'itczyx'.", axis)),
            }
        }
        _ => Err("Invalid format: Expected '<axis>=<tag>'.".to_string()),
    }
}

fn parse_axes_arg(s: &str) -> Result<Axes, String> {
    s.parse::<Axes>().map_err(|e| e.to_string())
}
