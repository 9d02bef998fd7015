//! Entry point for the ndimage binary.
//! Handles CLI parsing, opens the requested image or file series, prints its
//! metadata and optionally saves it, partitioned as the output format requires.

use clap::Parser;
use env_logger::Env;
use log::info;
use nd_image_io::prelude::*;
use nd_image_io::{get_parallel_info, split_extension};

mod cli;

use cli::Args;

fn open_sources(args: &Args, options: SourceOptions, parallel: &ParallelConfig) -> Result<Vec<Box<dyn ImageSource>>> {
    if !args.tags.is_empty() {
        let mut config = FilePatternConfig::new(&args.input);
        for (axis, tag) in &args.tags {
            config = config.tag(*axis, tag.as_str());
        }
        for extension in &args.extensions {
            config = config.extension(extension);
        }
        for filter in &args.include {
            config = config.include(filter.as_str());
        }
        for filter in &args.exclude {
            config = config.exclude(filter.as_str());
        }
        let pattern = FilePattern::new(config)?.with_parallel(parallel.clone());
        let sources = if args.split_groups {
            FilePatternSource::split(&pattern, options)?
        } else {
            vec![FilePatternSource::new(pattern, options)]
        };
        return Ok(sources
            .into_iter()
            .map(|s| Box::new(s) as Box<dyn ImageSource>)
            .collect());
    }

    let uri = args.input.to_string_lossy();
    if args.input.is_dir() {
        let mut source = DirSource::new(&args.input, options).with_parallel(parallel.clone());
        if let Some(extension) = args.extensions.first() {
            source = source.with_extension(extension);
        }
        return Ok(vec![Box::new(source)]);
    }
    Ok(vec![autodetect(&uri, options)?])
}

fn group_uri(output: &str, group: usize, groups: usize) -> String {
    if groups < 2 {
        return output.to_string();
    }
    let (base, extension) = split_extension(output);
    format!("{}.group_{}{}", base, group, extension)
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    let parallel = ParallelConfig::new(args.threads);
    if args.verbose {
        get_parallel_info().log_info();
    }

    let output_order = if args.native_order {
        None
    } else {
        Some(args.output_axes.clone().unwrap_or_else(Axes::canonical))
    };
    let options = SourceOptions::default().with_output_order(output_order);

    let mut sources = open_sources(&args, options, &parallel)?;
    info!("Opened {} image source(s) from {}", sources.len(), args.input.display());

    let groups = sources.len();
    for (group, source) in sources.iter_mut().enumerate() {
        let discovery = source.discover()?;
        println!("{}", serde_json::to_string_pretty(&discovery)?);

        if let Some(output) = &args.output {
            let image = load_image(source.as_mut(), None)?;
            let save_options = SaveOptions {
                inner_axes: args.inner_axes.clone(),
            };
            for path in imsave(&image, &group_uri(output, group, groups), &save_options)? {
                println!("{}", path.display());
            }
        }
        source.close();
    }

    Ok(())
}
