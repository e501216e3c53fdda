use std::path::Path;

use anyhow::anyhow;
use clap::{App, Arg};

use stapol::build::{self, Error as BuildError};
use stapol::config::{BuildMode, Config};

fn main() -> anyhow::Result<()> {
    let matches = App::new("stapol")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A static site generator for building my personal blog")
        .arg(
            Arg::with_name("DIRECTORY")
                .help("The project directory (searched upward for site.yaml)")
                .index(1),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .help("The output directory (defaults to `build`)"),
        )
        .arg(
            Arg::with_name("production")
                .long("production")
                .help("Build in production mode (minify output)"),
        )
        .arg(
            Arg::with_name("threads")
                .long("threads")
                .takes_value(true)
                .help("Worker threads for content loading (defaults to the CPU count)"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Log at debug level"),
        )
        .get_matches();

    simple_logger::SimpleLogger::new()
        .with_level(if matches.is_present("verbose") {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init()?;

    let directory = Path::new(matches.value_of("DIRECTORY").unwrap_or("."));
    let output = Path::new(matches.value_of("output").unwrap_or("build"));
    let mode = if matches.is_present("production") {
        BuildMode::Production
    } else {
        BuildMode::Development
    };
    let threads = match matches.value_of("threads") {
        None => None,
        Some(threads) => Some(threads.parse()?),
    };

    let config = Config::from_directory(directory, output, mode, threads)?;
    match build::build_site(&config) {
        Ok(result) => {
            for failure in &result.failures {
                eprintln!("warning: {}", failure);
            }
            println!(
                "built {} documents to `{}` ({} failures)",
                result.success_count,
                output.display(),
                result.failures.len(),
            );
            Ok(())
        }
        Err(BuildError::NothingBuilt {
            attempted,
            failures,
        }) => {
            for failure in &failures {
                eprintln!("error: {}", failure);
            }
            Err(anyhow!("all {} documents failed to build", attempted))
        }
        Err(err) => Err(err.into()),
    }
}
