//! The call stack holds return addresses pushed by `JSR` and popped by `RTS`. Nothing else
//! is ever stored on it.

use thiserror::Error;

use crate::bytecode::Word;

#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
#[error("pop from an empty stack")]
pub struct StackUnderflow;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Stack {
  words: Vec<Word>
}

impl Stack {

  pub fn new() -> Stack {
    Stack::default()
  }

  pub fn push(&mut self, word: Word) {
    self.words.push(word);
  }

  pub fn pop(&mut self) -> Result<Word, StackUnderflow> {
    self.words.pop().ok_or(StackUnderflow)
  }

  pub fn peek(&self) -> Option<Word> {
    self.words.last().copied()
  }

  pub fn len(&self) -> usize {
    self.words.len()
  }

  pub fn is_empty(&self) -> bool {
    self.words.is_empty()
  }

  /// Iterates from the most recently pushed word down to the oldest.
  pub fn iter(&self) -> impl Iterator<Item = &Word> {
    self.words.iter().rev()
  }

  pub fn clear(&mut self) {
    self.words.clear();
  }
}
