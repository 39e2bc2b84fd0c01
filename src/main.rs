use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::Level;

use gmachine::{assemble_file, create_binary, read_file, Error, Machine, MachineConfig, Word};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
  #[command(subcommand)]
  command: Command,

  /// One of `TRACE`, `DEBUG`, `INFO`, `WARN`, or `ERROR`
  #[arg(short, long, global = true, default_value_t = Level::WARN)]
  log_level: Level,
}

#[derive(Subcommand)]
enum Command {
  /// Assemble a source file into a binary program
  Assemble {
    /// Assembly source file
    source: PathBuf,

    /// Output file (default: the source path with a `.g` extension)
    #[arg(short, long)]
    output: Option<PathBuf>,
  },

  /// Run a binary program
  Run {
    /// Binary program file
    binary: PathBuf,

    /// Print the machine state before every instruction
    #[arg(short, long)]
    debug: bool,
  },

  /// Assemble a source file and run it
  Exec {
    /// Assembly source file
    source: PathBuf,

    /// Print the machine state before every instruction
    #[arg(short, long)]
    debug: bool,
  },
}

fn main() -> ExitCode {
  let args = Args::parse();
  tracing_subscriber::fmt()
    .with_max_level(args.log_level)
    .with_writer(io::stderr)
    .init();

  match main_real(args.command) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      tracing::error!("{}", e);
      ExitCode::FAILURE
    }
  }
}

fn main_real(command: Command) -> Result<(), Error> {
  match command {

    Command::Assemble { source, output } => {
      let target = output.unwrap_or_else(|| source.with_extension("g"));
      let count  = create_binary(&source, &target)?;
      tracing::info!("assembled {} words into {}", count, target.display());
      Ok(())
    }

    Command::Run { binary, debug } => {
      let words = read_file(&binary)?;
      execute(&words, debug)
    }

    Command::Exec { source, debug } => {
      let words = assemble_file(&source)?;
      execute(&words, debug)
    }

  }
}

fn execute(words: &[Word], debug: bool) -> Result<(), Error> {
  let debug       = debug || MachineConfig::default().debug;
  let mut machine = Machine::builder().debug(debug).build();
  machine.run_program(words)?;
  Ok(())
}
