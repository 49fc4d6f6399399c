use std::{error::Error, fs, io, path::PathBuf, process::ExitCode};

use clap::Parser;
use owl::{MachineConfig, Vm, VmError};
use tracing::Level;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Boot image to load
    ipl: PathBuf,

    /// Max number of steps after the load; zero or less runs until halted
    #[arg(short, long, allow_negative_numbers = true)]
    max: Option<i64>,

    /// Machine config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// One of `TRACE`, `DEBUG`, `INFO`, `WARN`, or `ERROR`
    #[arg(short, long, default_value_t = Level::INFO)]
    log_level: Level,

    /// Arguments readable by the program through the `args` port
    #[arg(last = true)]
    program_args: Vec<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(io::stderr)
        .init();

    match main_real(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<VmError>() {
            Some(VmError::Exit(status)) => ExitCode::from(*status),
            _ => {
                tracing::error!("{e}");
                ExitCode::FAILURE
            }
        },
    }
}

fn main_real(args: Args) -> Result<(), Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|e| format!("cant open file: {}: {e}", path.display()))?;
            MachineConfig::from_toml(&text)?
        }
        None => MachineConfig::default(),
    };
    let image = fs::read(&args.ipl)
        .map_err(|e| format!("cant open file: {}: {e}", args.ipl.display()))?;

    let mut vm = Vm::new();
    config.attach(&mut vm, &args.program_args);
    vm.ipl(&image)?;

    let max = args.max.or(config.max).unwrap_or(0);
    let steps = if max > 0 { max as u64 } else { u64::MAX };
    if vm.steps(steps)? {
        tracing::info!("stopped after the max {max} steps");
    } else {
        tracing::info!("stopped before reaching the max steps");
    }
    Ok(())
}
