/*!

  The machine uses a 64 bit word for everything: opcodes, operands, addresses, register values,
  and data, including character codes. Words carry no tag. What a word means is decided by its
  position, i.e. by the instruction decoder reading it either as an opcode or as the operand of
  the preceding opcode.

  An instruction is one opcode word followed by zero, one, or two operand words. The opcode's
  arity is fixed and listed in the instruction table, which the assembler consults to validate
  operand counts and the machine consults (by way of `Opcode`) to decode.

  Programs exist in three forms:

    assembly text -> [`assemble`] -> `Vec<Word>` -> [`encode`] -> bytes

  and back again with [`decode`]. The word stream is exactly what is loaded into memory at
  address 0, so the assembler and the codec must agree word for word.

*/

mod assembly;
mod binary;
mod instruction;

pub type Word = u64;

pub use assembly::{
  assemble, assemble_data, assemble_file, assemble_strs, tokenize,
  Assembler, Assembly, AssemblyError, Token
};
pub use binary::{
  decode, encode, read_file, read_words, write_file, write_words,
  CodecError, WORD_SIZE
};
pub use instruction::{instruction_table, lookup, Instruction, IoCode, Opcode};
