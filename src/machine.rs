//! The G-machine: a register machine with an accumulator, an index register, a zero flag, and
//! a call stack for subroutine return addresses.

use std::fmt::{Display, Formatter};
use std::io::{self, Stdout, Write};

use prettytable::{format as TableFormat, Table};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::bytecode::{IoCode, Opcode, Word};
use crate::memory::{Memory, MemoryError, DEFAULT_MEMORY_LIMIT};
use crate::stack::Stack;

/// Words of memory shown on either side of `P` in a state snapshot.
const SNAPSHOT_WINDOW: usize = 8;

#[derive(Error, Debug)]
pub enum RuntimeError {
  #[error("stack underflow: RTS at address {address} with an empty call stack")]
  StackUnderflow { address: Word },

  #[error("unknown opcode {opcode} at address {address}")]
  UnknownOpcode { opcode: Word, address: Word },

  #[error("unsupported device request ({direction}, {target}) at address {address}")]
  UnsupportedDevice { direction: Word, target: Word, address: Word },

  #[error(transparent)]
  Memory(#[from] MemoryError),

  #[error("failed to write output: {0}")]
  Output(#[from] io::Error),
}

/// How the machine reacts to a recoverable runtime condition.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ErrorPolicy {
  /// Stop execution and return the error from `run`.
  Abort,
  /// Log the condition and continue.
  Report,
  /// Continue silently.
  Ignore,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct MachineConfig {
  /// Write a state snapshot before every fetch.
  pub debug                 : bool,
  pub memory_limit          : usize,
  /// `RTS` with an empty stack. Under `Report` the message is also written to the output
  /// sink. Execution continues with `P` unchanged.
  pub on_stack_underflow    : ErrorPolicy,
  /// A fetched word that is not an opcode. Execution continues as if it were `NOOP`.
  pub on_unknown_opcode     : ErrorPolicy,
  /// `BIOS` with a direction and target other than write-to-stdout.
  pub on_unsupported_device : ErrorPolicy,
}

impl Default for MachineConfig {
  fn default() -> Self {
    MachineConfig {
      debug                 : cfg!(feature = "trace_computation"),
      memory_limit          : DEFAULT_MEMORY_LIMIT,
      on_stack_underflow    : ErrorPolicy::Abort,
      on_unknown_opcode     : ErrorPolicy::Abort,
      on_unsupported_device : ErrorPolicy::Report,
    }
  }
}

pub struct MachineBuilder<W: Write = Stdout> {
  output       : W,
  trace_output : Option<Box<dyn Write>>,
  config       : MachineConfig,
}

impl Default for MachineBuilder<Stdout> {
  fn default() -> Self {
    MachineBuilder::new()
  }
}

impl MachineBuilder<Stdout> {
  pub fn new() -> MachineBuilder<Stdout> {
    MachineBuilder {
      output       : io::stdout(),
      trace_output : None,
      config       : MachineConfig::default(),
    }
  }
}

impl<W: Write> MachineBuilder<W> {

  /// The sink `BIOS IOWrite SendToStdOut` writes to.
  pub fn output<V: Write>(self, output: V) -> MachineBuilder<V> {
    MachineBuilder {
      output,
      trace_output : self.trace_output,
      config       : self.config,
    }
  }

  pub fn debug(mut self, debug: bool) -> Self {
    self.config.debug = debug;
    self
  }

  /// Where debug snapshots go. Defaults to stderr.
  pub fn trace_output<T: Write + 'static>(mut self, trace_output: T) -> Self {
    self.trace_output = Some(Box::new(trace_output));
    self
  }

  pub fn memory_limit(mut self, words: usize) -> Self {
    self.config.memory_limit = words;
    self
  }

  pub fn on_stack_underflow(mut self, policy: ErrorPolicy) -> Self {
    self.config.on_stack_underflow = policy;
    self
  }

  pub fn on_unknown_opcode(mut self, policy: ErrorPolicy) -> Self {
    self.config.on_unknown_opcode = policy;
    self
  }

  pub fn on_unsupported_device(mut self, policy: ErrorPolicy) -> Self {
    self.config.on_unsupported_device = policy;
    self
  }

  pub fn config(mut self, config: MachineConfig) -> Self {
    self.config = config;
    self
  }

  pub fn build(self) -> Machine<W> {
    Machine {
      p            : 0,
      a            : 0,
      i            : 0,
      flag_zero    : false,
      memory       : Memory::with_limit(self.config.memory_limit),
      stack        : Stack::new(),
      output       : self.output,
      trace_output : self.trace_output.unwrap_or_else(|| Box::new(io::stderr())),
      config       : self.config,
    }
  }
}

pub struct Machine<W: Write = Stdout> {

  // Registers //
  p         : Word, // Program counter, the address of the next word to fetch
  a         : Word, // Accumulator
  i         : Word, // Index register
  flag_zero : bool, // Result of the last CMPI

  // Memory Stores
  memory : Memory,
  stack  : Stack,  // Return addresses

  // Sinks
  output       : W,
  trace_output : Box<dyn Write>,

  config : MachineConfig,
}

impl Default for Machine<Stdout> {
  fn default() -> Self {
    Machine::new()
  }
}

impl Machine<Stdout> {
  /// A machine writing to stdout with the default configuration.
  pub fn new() -> Machine<Stdout> {
    MachineBuilder::new().build()
  }

  pub fn builder() -> MachineBuilder<Stdout> {
    MachineBuilder::new()
  }
}

impl<W: Write> Machine<W> {

  // region Construction and accessors

  pub fn with_output(output: W) -> Machine<W> {
    MachineBuilder::<Stdout>::new().output(output).build()
  }

  pub fn p(&self) -> Word {
    self.p
  }

  pub fn a(&self) -> Word {
    self.a
  }

  pub fn i(&self) -> Word {
    self.i
  }

  pub fn flag_zero(&self) -> bool {
    self.flag_zero
  }

  pub fn memory(&self) -> &Memory {
    &self.memory
  }

  pub fn stack(&self) -> &Stack {
    &self.stack
  }

  pub fn config(&self) -> &MachineConfig {
    &self.config
  }

  pub fn output(&self) -> &W {
    &self.output
  }

  pub fn into_output(self) -> W {
    self.output
  }

  /// Zeroes the registers and empties memory and the stack. Sinks and configuration are kept.
  pub fn reset(&mut self) {
    self.p         = 0;
    self.a         = 0;
    self.i         = 0;
    self.flag_zero = false;
    self.memory.clear();
    self.stack.clear();
  }

  // endregion

  // region Execution

  /// Copies `words` into memory starting at address 0. Registers are left alone.
  pub fn load(&mut self, words: &[Word]) -> Result<(), RuntimeError> {
    self.memory.write_words(0, words)?;
    debug!("loaded {} words", words.len());
    Ok(())
  }

  /// Resets the machine, loads `words`, and runs them.
  pub fn run_program(&mut self, words: &[Word]) -> Result<(), RuntimeError> {
    self.reset();
    self.load(words)?;
    self.run()
  }

  /// Runs until `HALT`. There is no step limit.
  pub fn run(&mut self) -> Result<(), RuntimeError> {
    trace!(p = self.p, "run");
    while !self.step()? {}
    self.output.flush()?;
    trace!(p = self.p, a = self.a, i = self.i, "halted");
    Ok(())
  }

  /// Executes one fetch-execute cycle. Returns `true` if the instruction was `HALT`.
  pub fn step(&mut self) -> Result<bool, RuntimeError> {
    if self.config.debug {
      let snapshot = self.to_string();
      writeln!(self.trace_output, "{}", snapshot)?;
    }

    let address = self.p;
    let word    = self.fetch_operand();
    let opcode  = match Opcode::decode(word) {
      Some(opcode) => opcode,
      None => {
        self.recover(
          self.config.on_unknown_opcode,
          RuntimeError::UnknownOpcode { opcode: word, address }
        )?;
        return Ok(false);
      }
    };
    trace!(address, %opcode, "execute");

    match opcode {

      Opcode::Halt => return Ok(true),

      Opcode::Noop => {}

      Opcode::Inca => self.a = self.a.wrapping_add(1),

      Opcode::Deca => self.a = self.a.wrapping_sub(1),

      Opcode::Seta => self.a = self.fetch_operand(),

      Opcode::SetAtom => self.a = self.memory.read(self.i),

      Opcode::Seti => self.i = self.fetch_operand(),

      Opcode::Inci => self.i = self.i.wrapping_add(1),

      Opcode::Cmpi => {
        let operand    = self.fetch_operand();
        self.flag_zero = operand == self.i;
      }

      Opcode::Jump => self.p = self.fetch_operand(),

      Opcode::Jmpz => {
        // Branches when the last comparison did *not* match.
        let target = self.fetch_operand();
        if !self.flag_zero {
          self.p = target;
        }
      }

      Opcode::Jsr => {
        let target = self.fetch_operand();
        self.stack.push(self.p);
        self.p = target;
      }

      Opcode::Rts => {
        match self.stack.pop() {
          Ok(return_address) => self.p = return_address,
          Err(_) => {
            self.recover(
              self.config.on_stack_underflow,
              RuntimeError::StackUnderflow { address }
            )?;
          }
        }
      }

      Opcode::Bios => {
        let direction = self.fetch_operand();
        let target    = self.fetch_operand();
        self.bios(direction, target, address)?;
      }

    } // end match on opcode

    Ok(false)
  }

  /// Reads the word at `P` and advances `P`. Every fetch, opcode or operand, goes through here.
  fn fetch_operand(&mut self) -> Word {
    let word = self.memory.read(self.p);
    self.p   = self.p.wrapping_add(1);
    word
  }

  fn bios(&mut self, direction: Word, target: Word, address: Word) -> Result<(), RuntimeError> {
    match (IoCode::decode(direction), IoCode::decode(target)) {

      (Some(IoCode::Write), Some(IoCode::StdOut)) => {
        self.output.write_all(&[self.a as u8])?;
        Ok(())
      }

      _ => {
        self.recover(
          self.config.on_unsupported_device,
          RuntimeError::UnsupportedDevice { direction, target, address }
        )
      }

    }
  }

  /// Applies `policy` to `error`. Returns the error only under `ErrorPolicy::Abort`.
  fn recover(&mut self, policy: ErrorPolicy, error: RuntimeError) -> Result<(), RuntimeError> {
    match policy {

      ErrorPolicy::Abort  => Err(error),

      ErrorPolicy::Report => {
        warn!("{}", error);
        if let RuntimeError::StackUnderflow { .. } = error {
          writeln!(self.output, "{}", error)?;
        }
        Ok(())
      }

      ErrorPolicy::Ignore => Ok(()),

    }
  }

  // endregion

  // region Display methods

  fn make_table<T> (
      name      : &str,
      cells     : T,
      highlight : Option<usize>
    ) -> Table
    where T: Iterator<Item = (usize, Word)>
  {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Address", ubl->"Contents"]);

    for (idx, word) in cells {
      match Some(idx) == highlight {

        true  => {
          table.add_row(row![r->format!("* --> {}[{}] =", name, idx), word]);
        }

        false => {
          table.add_row(row![r->format!("{}[{}] =", name, idx), word]);
        }

      } // end match on highlight
    } // end for
    table
  }

  fn make_register_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Value"]);
    table.add_row(row![r->"P =", self.p]);
    table.add_row(row![r->"A =", self.a]);
    table.add_row(row![r->"I =", self.i]);
    table.add_row(row![r->"FlagZero =", self.flag_zero]);
    table
  }

  // endregion

}


lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl<W: Write> Display for Machine<W> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let pc    = self.p as usize;
    let start = pc.saturating_sub(SNAPSHOT_WINDOW);
    let end   = pc.saturating_add(SNAPSHOT_WINDOW + 1).min(self.memory.len().max(pc.saturating_add(1)));
    let memory_cells = (start..end).map(|idx| (idx, self.memory.read(idx as Word)));
    let stack_cells  = self.stack.iter().copied().enumerate();

    let r_table = self.make_register_table();
    let m_table = Machine::<W>::make_table("M", memory_cells, Some(pc));
    let s_table = Machine::<W>::make_table("S", stack_cells, None);

    let mut combined_table = table!([r_table, m_table, s_table]);

    combined_table.set_titles(row![ub->"Registers", ub->"Memory", ub->"Stack"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    write!(f, "{}", combined_table)
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::RefCell;
  use std::rc::Rc;

  use crate::bytecode::assemble;

  const HALT    : Word = 0;
  const NOOP    : Word = 1;
  const INCA    : Word = 2;
  const DECA    : Word = 3;
  const SETA    : Word = 4;
  const BIOS    : Word = 5;
  const SETI    : Word = 6;
  const INCI    : Word = 7;
  const CMPI    : Word = 8;
  const JUMP    : Word = 9;
  const JMPZ    : Word = 10;
  const SETATOM : Word = 11;
  const RTS     : Word = 13;

  const IO_WRITE  : Word = 1;
  const TO_STDOUT : Word = 3;

  fn machine() -> Machine<Vec<u8>> {
    Machine::with_output(Vec::new())
  }

  fn run(words: &[Word]) -> Machine<Vec<u8>> {
    let mut m = machine();
    m.run_program(words).unwrap();
    m
  }

  fn run_source(source: &str) -> Machine<Vec<u8>> {
    run(&assemble(source).unwrap())
  }

  #[derive(Clone, Default)]
  struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

  impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
      self.0.borrow_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
      Ok(())
    }
  }

  #[test]
  fn new_machine_is_zeroed(){
    let m = machine();
    assert_eq!((m.p(), m.a(), m.i(), m.flag_zero()), (0, 0, 0, false));
    assert!(m.memory().is_empty());
    assert!(m.stack().is_empty());
  }

  #[test]
  fn halt(){
    let mut m = machine();
    m.run().unwrap();
    assert_eq!(m.p(), 1);
    assert_eq!(run(&[HALT]).p(), 1);
  }

  #[test]
  fn noop(){
    // Falls through to unset memory, which reads as HALT.
    assert_eq!(run(&[NOOP]).p(), 2);
  }

  #[test]
  fn inca_deca(){
    let m = run(&[INCA]);
    assert_eq!((m.a(), m.p()), (1, 2));
    let m = run(&[SETA, 5, DECA, DECA]);
    assert_eq!(m.a(), 3);
    assert_eq!(run(&[SETA, 2, DECA, DECA]).a(), 0);
    assert_eq!(run(&[DECA]).a(), Word::MAX);
  }

  #[test]
  fn seta_advances_by_two(){
    let mut m = machine();
    m.load(&[SETA, 12]).unwrap();
    assert!(!m.step().unwrap());
    assert_eq!((m.a(), m.p()), (12, 2));
  }

  #[test]
  fn seti_inci(){
    assert_eq!(run(&[SETI, 3]).i(), 3);
    assert_eq!(run(&[SETI, 3, INCI]).i(), 4);
  }

  #[test]
  fn setatom_reads_memory_at_i(){
    assert_eq!(run(&[SETI, 2, 72, SETATOM]).a(), 72);
  }

  #[test]
  fn cmpi(){
    assert!(run(&[SETI, 2, CMPI, 2]).flag_zero());
    assert!(!run(&[SETI, 2, CMPI, 3]).flag_zero());
    assert!(run(&[SETI, 2, CMPI, 3, SETI, 3, CMPI, 3]).flag_zero());
  }

  #[test]
  fn jump_skips_data(){
    let m = run(&[JUMP, 3, 'A' as Word, SETI, 2]);
    assert_eq!(m.i(), 2);
  }

  #[test]
  fn jmpz_jumps_on_mismatch(){
    // I != 5, so the jump to `skip` is taken and INCA never runs.
    let m = run_source("SETI 4 CMPI 5 JMPZ skip INCA skip: HALT");
    assert!(!m.flag_zero());
    assert_eq!(m.a(), 0);
  }

  #[test]
  fn jmpz_falls_through_on_match(){
    let m = run_source("SETI 5 CMPI 5 JMPZ skip INCA skip: HALT");
    assert!(m.flag_zero());
    assert_eq!(m.a(), 1);
  }

  #[test]
  fn counting_loop(){
    assert_eq!(run(&[INCI, CMPI, 10, JMPZ, 0]).i(), 10);
  }

  #[test]
  fn jsr_rts(){
    let m = run_source("JSR sub HALT sub: INCA RTS");
    assert_eq!(m.a(), 1);
    // HALT sits at address 2, right after JSR and its operand.
    assert_eq!(m.p(), 3);
    assert!(m.stack().is_empty());

    assert_eq!(run_source("JSR LABEL NOOP LABEL: INCA").a(), 1);
    assert_eq!(run_source("JSR LABEL INCA HALT LABEL: INCA RTS").a(), 2);
  }

  #[test]
  fn nested_calls(){
    let source = "
      JSR outer
      HALT
      outer: INCA JSR inner INCA RTS
      inner: INCA RTS
    ";
    let m = run_source(source);
    assert_eq!(m.a(), 3);
    assert!(m.stack().is_empty());
  }

  #[test]
  fn bios_write(){
    let m = run(&[SETA, 'J' as Word, BIOS, IO_WRITE, TO_STDOUT]);
    assert_eq!(m.output(), b"J");
  }

  #[test]
  fn bios_writes_low_byte(){
    let m = run(&[SETA, 0x141, BIOS, IO_WRITE, TO_STDOUT]);
    assert_eq!(m.into_output(), b"A".to_vec());
  }

  #[test]
  fn hello_world(){
    let words = vec![
      JUMP, 12,
      72, 101, 108, 108, 111, 87, 111, 114, 108, 100,
      SETI, 2,
      SETATOM,
      BIOS, IO_WRITE, TO_STDOUT,
      INCI,
      CMPI, 12,
      JMPZ, 14,
    ];
    let m = run(&words);
    assert_eq!(String::from_utf8(m.into_output()).unwrap(), "HelloWorld");
  }

  #[test]
  fn stack_underflow_aborts_by_default(){
    let mut m = machine();
    match m.run_program(&[NOOP, RTS]) {
      Err(RuntimeError::StackUnderflow { address }) => assert_eq!(address, 1),
      other => panic!("expected a stack underflow, got {:?}", other),
    }
  }

  #[test]
  fn stack_underflow_reported(){
    let mut m =
      Machine::builder()
        .output(Vec::new())
        .on_stack_underflow(ErrorPolicy::Report)
        .build();
    m.run_program(&[RTS, INCA]).unwrap();
    // Execution continued from the word after RTS.
    assert_eq!(m.a(), 1);
    let output = String::from_utf8(m.into_output()).unwrap();
    assert!(output.contains("stack underflow"));
  }

  #[test]
  fn stack_underflow_ignored(){
    let mut m =
      Machine::builder()
        .output(Vec::new())
        .on_stack_underflow(ErrorPolicy::Ignore)
        .build();
    m.run_program(&[RTS, INCA]).unwrap();
    assert_eq!((m.a(), m.p()), (1, 3));
    assert!(m.stack().is_empty());
    assert!(m.output().is_empty());
  }

  #[test]
  fn unknown_opcode_reported(){
    // Reported like a NOOP; nothing reaches the output sink.
    let mut m =
      Machine::builder()
        .output(Vec::new())
        .on_unknown_opcode(ErrorPolicy::Report)
        .build();
    m.run_program(&[INCA, 99, INCA]).unwrap();
    assert_eq!((m.a(), m.p()), (2, 4));
    assert!(m.output().is_empty());
  }

  #[test]
  fn unsupported_device_ignored(){
    let mut m =
      Machine::builder()
        .output(Vec::new())
        .on_unsupported_device(ErrorPolicy::Ignore)
        .build();
    m.run_program(&[SETA, 65, BIOS, IO_WRITE, IO_WRITE, INCA]).unwrap();
    assert_eq!((m.a(), m.p()), (66, 7));
    assert!(m.output().is_empty());
  }

  #[test]
  fn unknown_opcode(){
    let mut m = machine();
    assert!(matches!(
      m.run_program(&[INCA, 99]),
      Err(RuntimeError::UnknownOpcode { opcode: 99, address: 1 })
    ));

    let mut m = Machine::builder().output(Vec::new()).on_unknown_opcode(ErrorPolicy::Ignore).build();
    m.run_program(&[99, INCA]).unwrap();
    assert_eq!((m.a(), m.p()), (1, 3));
  }

  #[test]
  fn unsupported_device(){
    // IORead is not implemented; the default policy skips it.
    let m = run(&[SETA, 65, BIOS, 2, TO_STDOUT, INCA]);
    assert_eq!(m.a(), 66);
    assert!(m.output().is_empty());

    let mut m =
      Machine::builder()
        .output(Vec::new())
        .on_unsupported_device(ErrorPolicy::Abort)
        .build();
    assert!(matches!(
      m.run_program(&[BIOS, IO_WRITE, IO_WRITE]),
      Err(RuntimeError::UnsupportedDevice { direction: 1, target: 1, address: 0 })
    ));
  }

  #[test]
  fn memory_limit(){
    let mut m = Machine::builder().output(Vec::new()).memory_limit(2).build();
    assert!(matches!(m.load(&[NOOP, NOOP, NOOP]), Err(RuntimeError::Memory(_))));
    assert!(m.load(&[INCA, HALT]).is_ok());
  }

  #[test]
  fn reset(){
    let mut m = run(&[SETA, 3, SETI, 4, CMPI, 4]);
    m.reset();
    assert_eq!((m.p(), m.a(), m.i(), m.flag_zero()), (0, 0, 0, false));
    assert!(m.memory().is_empty());
  }

  #[test]
  fn debug_snapshot_per_fetch(){
    let trace = SharedBuffer::default();
    let mut m =
      Machine::builder()
        .output(Vec::new())
        .debug(true)
        .trace_output(trace.clone())
        .build();
    m.run_program(&[INCA, INCA]).unwrap();

    let text = String::from_utf8(trace.0.borrow().clone()).unwrap();
    // INCA, INCA, HALT
    assert_eq!(text.matches("Registers").count(), 3);
    assert!(text.contains("FlagZero"));
  }

  #[test]
  fn snapshot_shows_stack(){
    let mut m = machine();
    m.load(&assemble("JSR sub HALT sub: HALT").unwrap()).unwrap();
    m.step().unwrap();
    let snapshot = m.to_string();
    assert!(snapshot.contains("S[0]"));
    assert!(snapshot.contains("* --> M[3]"));
  }
}
