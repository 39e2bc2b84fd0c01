/*!
  A small register machine, the G-machine, together with its two-pass assembler and the binary
  format used to persist assembled programs.

  ```
  use gmachine::{assemble, Machine};

  let words = assemble("SETA #J BIOS IOWrite SendToStdOut HALT").unwrap();
  let mut machine = Machine::with_output(Vec::new());
  machine.run_program(&words).unwrap();
  assert_eq!(machine.output(), b"J");
  ```
*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

pub mod bytecode;
pub mod machine;
pub mod memory;
pub mod stack;
pub mod symboltable;

use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

pub use bytecode::{
  assemble, assemble_file, decode, encode, read_file, write_file,
  AssemblyError, CodecError, Opcode, Word
};
pub use machine::{ErrorPolicy, Machine, MachineBuilder, MachineConfig, RuntimeError};

/// Any error the crate can produce, for callers that drive the whole pipeline.
#[derive(Error, Debug)]
pub enum Error {
  #[error("assembly failed: {0}")]
  Assembly(#[from] AssemblyError),

  #[error("invalid binary: {0}")]
  Codec(#[from] CodecError),

  #[error("execution failed: {0}")]
  Runtime(#[from] RuntimeError),

  #[error("I/O error: {0}")]
  Io(#[from] io::Error),
}

/// Assembles the source file at `source` and writes the binary to `target`. Returns the number
/// of words written.
pub fn create_binary<S: AsRef<Path>, T: AsRef<Path>>(source: S, target: T) -> Result<usize, Error> {
  let words = assemble_file(source)?;
  write_file(target.as_ref(), &words)?;
  debug!("wrote {} words to {}", words.len(), target.as_ref().display());
  Ok(words.len())
}
