use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use msp430_core::{
    exec, load_snapshot, save_snapshot, CoreError, Machine, SnapshotMetadata, Uart,
};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "msp430-cli")]
#[command(about = "Run an MSP430 ELF image with the UART wired to stdio", long_about = None)]
struct Args {
    /// ELF image to execute
    image: Option<PathBuf>,

    /// Stop after this many instructions (0 = run until the guest stops)
    #[arg(long, default_value_t = 0)]
    steps: u64,

    /// Print the machine state on every termination, not only on faults
    #[arg(long, action = ArgAction::SetTrue)]
    dump: bool,

    /// Load a machine snapshot after (or instead of) the ELF image
    #[arg(long)]
    load_snapshot: Option<PathBuf>,

    /// Save a machine snapshot when execution stops
    #[arg(long)]
    save_snapshot: Option<PathBuf>,
}

/// UART wired to the process's standard streams. Reads block on stdin and
/// hand the guest 0xFF once it is exhausted.
struct StdioUart;

impl Uart for StdioUart {
    fn print(&mut self, byte: u8) {
        let mut stdout = io::stdout();
        let _ = stdout.write_all(&[byte]);
        let _ = stdout.flush();
    }

    fn read(&mut self) -> u8 {
        let mut buf = [0u8; 1];
        match io::stdin().read(&mut buf) {
            Ok(1) => buf[0],
            _ => 0xFF,
        }
    }
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    if args.image.is_none() && args.load_snapshot.is_none() {
        bail!("nothing to run: pass an ELF image or --load-snapshot");
    }

    let mut machine = Machine::new(Box::new(StdioUart));
    let mut instruction_count: u64 = 0;

    if let Some(path) = args.image.as_ref() {
        machine
            .load_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?;
    }
    if let Some(path) = args.load_snapshot.as_ref() {
        let metadata = load_snapshot(path, &mut machine)
            .with_context(|| format!("failed to load snapshot {}", path.display()))?;
        instruction_count = metadata.instruction_count;
    }

    let mut fault = None;
    let mut executed: u64 = 0;
    while args.steps == 0 || executed < args.steps {
        if let Err(err) = exec::step(&mut machine) {
            fault = Some(err);
            break;
        }
        executed += 1;
        instruction_count += 1;
    }

    if let Some(path) = args.save_snapshot.as_ref() {
        let metadata = SnapshotMetadata::new("msp430-cli", instruction_count, machine.regs.pc());
        save_snapshot(path, &metadata, &machine)
            .with_context(|| format!("failed to save snapshot {}", path.display()))?;
    }

    let failed = !matches!(fault, None | Some(CoreError::Halt));
    match fault {
        Some(CoreError::Halt) => {
            eprintln!("Terminated after {executed} steps");
            eprintln!("Reason: {}", CoreError::Halt);
        }
        Some(err) => {
            eprintln!("Terminated after {executed} steps");
            eprintln!("Reason: {err}");
            eprintln!("State:\n{}", machine.regs.dump_string());
        }
        None => eprintln!("Step limit reached after {executed} steps"),
    }
    if args.dump && !failed {
        eprintln!("State:\n{}", machine.regs.dump_string());
    }
    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}
