/*!
  This module is responsible for the encoding and decoding of binary programs.

  A binary program is the flat word stream produced by the assembler. Each word is written as
  eight bytes, most significant byte first, concatenated in order. There is no header, length
  prefix, or checksum, so the only malformed input is one whose length is not a multiple of
  eight bytes.
*/

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use thiserror::Error;

use crate::bytecode::Word;

/// Bytes per encoded word.
pub const WORD_SIZE: usize = 8;

#[derive(Error, Debug)]
pub enum CodecError {
  #[error("binary input of {length} bytes ends with a partial word")]
  TruncatedInput { length: usize },

  #[error("I/O error: {0}")]
  Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, CodecError>;

pub fn encode(words: &[Word]) -> Vec<u8> {
  let mut bytes = vec![0u8; words.len() * WORD_SIZE];
  BigEndian::write_u64_into(words, &mut bytes);
  bytes
}

pub fn decode(bytes: &[u8]) -> Result<Vec<Word>> {
  if bytes.len() % WORD_SIZE != 0 {
    return Err(CodecError::TruncatedInput { length: bytes.len() });
  }
  let mut words = vec![0 as Word; bytes.len() / WORD_SIZE];
  BigEndian::read_u64_into(bytes, &mut words);
  Ok(words)
}

/// Writes `words` to `writer` in the binary format. The writer is not flushed.
pub fn write_words<W: Write>(writer: &mut W, words: &[Word]) -> io::Result<()> {
  for word in words {
    writer.write_u64::<BigEndian>(*word)?;
  }
  Ok(())
}

/// Reads `reader` to its end and decodes the bytes as words.
pub fn read_words<R: Read>(reader: &mut R) -> Result<Vec<Word>> {
  let mut bytes = Vec::new();
  reader.read_to_end(&mut bytes)?;
  decode(&bytes)
}

pub fn write_file<P: AsRef<Path>>(path: P, words: &[Word]) -> io::Result<()> {
  let mut writer = BufWriter::new(File::create(path)?);
  write_words(&mut writer, words)?;
  writer.flush()
}

pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Vec<Word>> {
  let mut reader = BufReader::new(File::open(path)?);
  read_words(&mut reader)
}
