use std::collections::HashMap;
use std::convert::TryFrom;
use std::fmt::{Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::IntoEnumIterator;
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};

use crate::bytecode::Word;

/**
  Opcodes of the virtual machine.

  The discriminants are the opcode words that appear in memory and in binary files, so the
  numbering is part of the binary format. Mnemonics are the upper-cased variant names.
*/
#[derive(
StrumDisplay, IntoStaticStr, EnumIter, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq,       PartialEq,        Debug,         Hash
)]
#[strum(serialize_all = "UPPERCASE")]
#[repr(u64)]
pub enum Opcode {
  Halt = 0,  // halt
  Noop,      // noop
  Inca,      // inca
  Deca,      // deca
  Seta,      // seta( value )
  Bios,      // bios( direction, target )
  Seti,      // seti( value )
  Inci,      // inci
  Cmpi,      // cmpi( value )
  Jump,      // jump( address )
  Jmpz,      // jmpz( address ), taken when the last CMPI did not match
  SetAtom,   // setatom
  Jsr,       // jsr( address )
  Rts,       // rts
}

impl Opcode {
  pub fn code(&self) -> Word {
    Into::<Word>::into(*self)
  }

  /// Decodes an opcode word. Returns `None` for words that are not opcodes.
  pub fn decode(word: Word) -> Option<Opcode> {
    Opcode::try_from(word).ok()
  }

  pub fn mnemonic(&self) -> &'static str {
    (*self).into()
  }

  /// The number of operand words that follow the opcode word in memory.
  pub fn arity(&self) -> usize {
    match self {
      | Opcode::Halt
      | Opcode::Noop
      | Opcode::Inca
      | Opcode::Deca
      | Opcode::Inci
      | Opcode::SetAtom
      | Opcode::Rts  => 0,

      | Opcode::Seta
      | Opcode::Seti
      | Opcode::Cmpi
      | Opcode::Jump
      | Opcode::Jmpz
      | Opcode::Jsr  => 1,

      Opcode::Bios   => 2,
    }
  }
}

/**
  Symbolic names for the operands of `BIOS`. These are assembler-level aliases for plain
  words, not instructions. The direction codes and the target code share one numbering.
*/
#[derive(
StrumDisplay, EnumString, IntoStaticStr, EnumIter, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,       Eq,            PartialEq, Debug,            Hash
)]
#[repr(u64)]
pub enum IoCode {
  #[strum(serialize = "IONone")]
  None = 0,
  #[strum(serialize = "IOWrite")]
  Write,
  #[strum(serialize = "IORead")]
  Read,
  #[strum(serialize = "SendToStdOut")]
  StdOut,
}

impl IoCode {
  pub fn code(&self) -> Word {
    Into::<Word>::into(*self)
  }

  pub fn decode(word: Word) -> Option<IoCode> {
    IoCode::try_from(word).ok()
  }
}

/// An entry of the instruction table: the opcode a mnemonic assembles to and how many
/// operand tokens must follow it.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct Instruction {
  pub opcode   : Opcode,
  pub operands : usize
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}/{}", self.opcode, self.operands)
  }
}

lazy_static! {
  static ref INSTRUCTION_TABLE: HashMap<&'static str, Instruction> =
    Opcode::iter()
      .map(|opcode| {
        (opcode.mnemonic(), Instruction{ opcode, operands: opcode.arity() })
      })
      .collect();
}

/// Looks up a mnemonic in the instruction table. Mnemonics are case sensitive.
pub fn lookup(mnemonic: &str) -> Option<Instruction> {
  INSTRUCTION_TABLE.get(mnemonic).copied()
}

pub fn instruction_table() -> &'static HashMap<&'static str, Instruction> {
  &*INSTRUCTION_TABLE
}
