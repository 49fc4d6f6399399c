use std::{
    error::Error,
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use tracing::Level;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Assembly source files, assembled in order
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Output file for the boot image (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output file for the listing (`-` for stdout)
    #[arg(long)]
    listing: Option<PathBuf>,

    /// Output file for `SYM` debug symbol file
    #[arg(short = 'g', long)]
    debug: Option<PathBuf>,

    /// One of `TRACE`, `DEBUG`, `INFO`, `WARN`, or `ERROR`
    #[arg(short, long, default_value_t = Level::INFO)]
    log_level: Level,
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = main_real(args) {
        tracing::error!("{e}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn create(path: &Path) -> Result<Box<dyn Write>, Box<dyn Error>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(io::stdout()));
    }
    let file = File::options()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| format!("cant open file: {}: {e}", path.display()))?;
    Ok(Box::new(BufWriter::new(file)))
}

fn main_real(args: Args) -> Result<(), Box<dyn Error>> {
    let mut sources = Vec::with_capacity(args.sources.len());
    for path in &args.sources {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("cant open file: {}: {e}", path.display()))?;
        sources.push((path.display().to_string(), text));
    }

    let module = owl::assemble(&sources)?;

    if let Some(path) = &args.listing {
        tracing::trace!("writing listing");
        let mut listing = create(path)?;
        module.write_listing(&mut listing)?;
        listing.flush()?;
    }

    if let Some(path) = &args.debug {
        tracing::trace!("writing symbols");
        let mut symbols = create(path)?;
        module.write_symbols(&mut symbols)?;
        symbols.flush()?;
    }

    let mut output: Box<dyn Write> = match &args.output {
        Some(path) => create(path)?,
        None => Box::new(io::stdout()),
    };
    tracing::trace!("writing boot image");
    output.write_all(&module.boot_image())?;
    output.flush()?;

    Ok(())
}
