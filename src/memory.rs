//! Word addressed machine memory. Memory is a contiguous vector that grows on write. Reading
//! an address that has never been written, including any address past the end of the vector,
//! yields 0.

use std::convert::TryFrom;

use thiserror::Error;

use crate::bytecode::Word;

/// The default maximum number of words a machine's memory may grow to.
pub const DEFAULT_MEMORY_LIMIT: usize = 1 << 24;

#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum MemoryError {
  #[error("address {address} is outside the memory limit of {limit} words")]
  OutOfBounds { address: Word, limit: usize },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Memory {
  cells : Vec<Word>,
  limit : usize,
}

impl Default for Memory {
  fn default() -> Self {
    Memory::new()
  }
}

impl Memory {

  pub fn new() -> Memory {
    Memory::with_limit(DEFAULT_MEMORY_LIMIT)
  }

  /// Memory that refuses writes at or above `limit`. Reads are never refused.
  pub fn with_limit(limit: usize) -> Memory {
    Memory {
      cells: Vec::new(),
      limit
    }
  }

  pub fn limit(&self) -> usize {
    self.limit
  }

  /// The number of words currently allocated, i.e. one past the highest address written.
  pub fn len(&self) -> usize {
    self.cells.len()
  }

  pub fn is_empty(&self) -> bool {
    self.cells.is_empty()
  }

  pub fn as_slice(&self) -> &[Word] {
    &self.cells
  }

  pub fn read(&self, address: Word) -> Word {
    usize::try_from(address)
      .ok()
      .and_then(|idx| self.cells.get(idx))
      .copied()
      .unwrap_or(0)
  }

  /// Writes `word` at `address`, growing memory as needed.
  pub fn write(&mut self, address: Word, word: Word) -> Result<(), MemoryError> {
    let idx = self.index(address)?;
    if idx >= self.cells.len() {
      self.cells.resize(idx + 1, 0);
    }
    self.cells[idx] = word;
    Ok(())
  }

  /// Writes `words` to consecutive addresses starting at `origin`. Either all words are
  /// written or, if the last one would fall outside the limit, none are.
  pub fn write_words(&mut self, origin: Word, words: &[Word]) -> Result<(), MemoryError> {
    if words.is_empty() {
      return Ok(());
    }
    let start = self.index(origin)?;
    let last =
      origin
        .checked_add((words.len() - 1) as Word)
        .ok_or(MemoryError::OutOfBounds { address: Word::MAX, limit: self.limit })?;
    let end = self.index(last)? + 1;

    if end > self.cells.len() {
      self.cells.resize(end, 0);
    }
    self.cells[start..end].copy_from_slice(words);
    Ok(())
  }

  pub fn clear(&mut self) {
    self.cells.clear();
  }

  fn index(&self, address: Word) -> Result<usize, MemoryError> {
    usize::try_from(address)
      .ok()
      .filter(|idx| *idx < self.limit)
      .ok_or(MemoryError::OutOfBounds { address, limit: self.limit })
  }
}
