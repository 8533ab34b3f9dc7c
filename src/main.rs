use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use log::{debug, LevelFilter};

use fcheck::check_image;
use fcheck::storage::FileBackedImage;

#[derive(Parser)]
#[command(version, about = "Checks an xv6 file system image for consistency")]
struct Args {
    /// File system image
    image: PathBuf,
    /// Log progress to stderr; repeat for more detail
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // nowhere left to report a failed write
            err.print().ok();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    init_logging(args.verbose);

    let image = match open_image(&args.image) {
        Ok(image) => image,
        Err(err) => {
            debug!("{err:#}");
            eprintln!("image not found");
            return ExitCode::FAILURE;
        }
    };

    match check_image(&image) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR: {err}.");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn open_image(path: &Path) -> Result<FileBackedImage> {
    let file = File::options()
        .read(true)
        .open(path)
        .with_context(|| format!("unable to open {}", path.display()))?;

    FileBackedImage::new(file)
}
