/*!
  The human readable textual form of bytecode is called assembly. Assembly is a stream of
  whitespace separated tokens:

    * `name:` defines a label bound to the address of the next emitted word;
    * a mnemonic from the instruction table, followed by exactly as many operand tokens as the
      instruction requires;
    * an IO symbol (`IONone`, `IOWrite`, `IORead`, `SendToStdOut`), emitted as its code;
    * a bare letter-led `name`, a reference to a label, patched in the second pass;
    * data: an optional `#` marker followed by either a decimal number (one word) or a
      letter-led string (one word per character).

  A `;` starts a comment that runs to the end of the line.

  The assembler makes two passes. The first emits words, records label definitions, and
  records the output position of every label reference with a placeholder word of 0. The
  second patches each recorded position with the address of its label. Addresses are
  positions in the output word stream, not token indices.
*/

use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use nom::{
  branch::alt,
  bytes::complete::{take_till, take_till1, take_while1},
  character::complete::char as one_char,
  combinator::{all_consuming, value},
  multi::many0,
  sequence::{pair, preceded, terminated},
  IResult,
  Offset
};
use thiserror::Error;
use tracing::{debug, trace};

use crate::bytecode::{lookup, Instruction, IoCode, Opcode, Word};
use crate::symboltable::SymbolTable;

pub const LABEL_TERMINATOR: char = ':';
pub const DATA_MARKER     : char = '#';
pub const COMMENT_MARKER  : char = ';';

#[derive(Error, Debug)]
pub enum AssemblyError {
  #[error("line {line}: label `{label}` is already defined at address {address}")]
  DuplicateLabel { label: String, address: Word, line: usize },

  #[error("line {line}: `{token}` is not a valid label definition")]
  InvalidLabel { token: String, line: usize },

  #[error("line {line}: {mnemonic} requires {expected} operands but was given {found}")]
  MissingOperand { mnemonic: Opcode, expected: usize, found: usize, line: usize },

  #[error("line {line}: `{token}` is not a valid operand for {mnemonic}")]
  InvalidOperand { mnemonic: Opcode, token: String, line: usize },

  #[error("label `{label}` is referenced at position {position} but never defined")]
  UndefinedLabel { label: String, position: usize },

  #[error("line {line}: cannot parse `{token}` as data")]
  UnparsableData { token: String, line: usize },

  #[error("I/O error: {0}")]
  Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, AssemblyError>;

/// A source token and its 1-based source line.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct Token<'a> {
  pub text : &'a str,
  pub line : usize,
}

/// What a token denotes, independent of where it appears.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
enum Lexeme<'a> {
  Label(&'a str),
  Mnemonic(Instruction),
  Io(IoCode),
  Reference(&'a str),
  Data(&'a str),
}

impl<'a> Lexeme<'a> {
  fn classify(text: &'a str) -> Lexeme<'a> {
    if let Some(name) = text.strip_suffix(LABEL_TERMINATOR) {
      return Lexeme::Label(name);
    }
    if let Some(instruction) = lookup(text) {
      return Lexeme::Mnemonic(instruction);
    }
    if let Ok(code) = IoCode::from_str(text) {
      return Lexeme::Io(code);
    }
    match text.chars().next() {
      Some(c) if c.is_alphabetic() => Lexeme::Reference(text),
      _ => Lexeme::Data(text)
    }
  }
}

/// What the assembler expects the next token to be.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
enum State {
  /// Any top level token: a label definition, an instruction, or data.
  ExpectingOpcode,
  /// The remaining operands of `opcode`.
  ExpectingOperand {
    opcode    : Opcode,
    remaining : usize,
    line      : usize
  },
}

/// The output of an assembly: the word stream and the labels it defines.
#[derive(Clone, Debug)]
pub struct Assembly {
  pub words   : Vec<Word>,
  pub symbols : SymbolTable,
}

pub struct Assembler {
  words   : Vec<Word>,
  symbols : SymbolTable,
  state   : State,
}

impl Default for Assembler {
  fn default() -> Self {
    Assembler::new()
  }
}

impl Assembler {

  pub fn new() -> Assembler {
    Assembler {
      words   : Vec::new(),
      symbols : SymbolTable::new(),
      state   : State::ExpectingOpcode,
    }
  }

  /// Assembles source text, returning the word stream together with its label table.
  pub fn assemble_with_symbols(self, source: &str) -> Result<Assembly> {
    let tokens = tokenize(source)?;
    self.assemble_tokens(tokens)
  }

  pub fn assemble_tokens<'a, I>(mut self, tokens: I) -> Result<Assembly>
    where I: IntoIterator<Item = Token<'a>>
  {
    trace!("starting pass 1");
    for token in tokens {
      self.step(token)?;
    }
    if let State::ExpectingOperand { opcode, remaining, line } = self.state {
      return Err(AssemblyError::MissingOperand {
        mnemonic : opcode,
        expected : opcode.arity(),
        found    : opcode.arity() - remaining,
        line
      });
    }

    trace!("starting pass 2");
    self.resolve()?;

    debug!(
      "assembled {} words, {} labels",
      self.words.len(),
      self.symbols.label_count()
    );
    for (name, address) in self.symbols.labels() {
      trace!(label = %name, address, "label");
    }
    Ok(Assembly { words: self.words, symbols: self.symbols })
  }

  // region Pass 1

  fn step(&mut self, token: Token<'_>) -> Result<()> {
    let lexeme = Lexeme::classify(token.text);

    self.state = match self.state {

      State::ExpectingOpcode => {
        match lexeme {
          Lexeme::Label(name) => {
            self.define_label(name, &token)?;
            State::ExpectingOpcode
          }
          Lexeme::Mnemonic(instruction) => {
            self.words.push(instruction.opcode.code());
            match instruction.operands {
              0         => State::ExpectingOpcode,
              remaining => State::ExpectingOperand {
                opcode : instruction.opcode,
                remaining,
                line   : token.line
              }
            }
          }
          Lexeme::Io(code) => {
            self.words.push(code.code());
            State::ExpectingOpcode
          }
          Lexeme::Reference(name) => {
            self.add_reference(name);
            State::ExpectingOpcode
          }
          Lexeme::Data(text) => {
            let data = encode_data(text).ok_or_else(|| unparsable(&token))?;
            self.words.extend(data);
            State::ExpectingOpcode
          }
        }
      }

      State::ExpectingOperand { opcode, remaining, line } => {
        match lexeme {
          Lexeme::Label(_) | Lexeme::Mnemonic(_) => {
            // Label definitions and mnemonics cannot fill an operand slot.
            return Err(AssemblyError::InvalidOperand {
              mnemonic : opcode,
              token    : token.text.to_string(),
              line     : token.line
            });
          }
          Lexeme::Io(code) => self.words.push(code.code()),
          Lexeme::Reference(name) => self.add_reference(name),
          Lexeme::Data(text) => {
            let data = encode_data(text).ok_or_else(|| unparsable(&token))?;
            if data.len() != 1 {
              return Err(AssemblyError::InvalidOperand {
                mnemonic : opcode,
                token    : token.text.to_string(),
                line     : token.line
              });
            }
            self.words.extend(data);
          }
        }
        match remaining > 1 {
          true  => State::ExpectingOperand { opcode, remaining: remaining - 1, line },
          false => State::ExpectingOpcode
        }
      }

    };
    Ok(())
  }

  fn define_label(&mut self, name: &str, token: &Token<'_>) -> Result<()> {
    let valid =
      name.chars().next().map_or(false, char::is_alphabetic)
        && lookup(name).is_none()
        && IoCode::from_str(name).is_err();
    if !valid {
      return Err(AssemblyError::InvalidLabel {
        token : token.text.to_string(),
        line  : token.line
      });
    }

    let address = self.words.len() as Word;
    self.symbols
        .insert_label(name, address)
        .map_err(|existing| AssemblyError::DuplicateLabel {
          label   : name.to_string(),
          address : existing,
          line    : token.line
        })
  }

  fn add_reference(&mut self, name: &str) {
    self.symbols.add_reference(name, self.words.len());
    self.words.push(0);
  }

  // endregion

  // region Pass 2

  fn resolve(&mut self) -> Result<()> {
    for (label, positions) in self.symbols.take_references() {
      let address = match self.symbols.get_address(&label) {
        Some(address) => address,
        None => {
          return Err(AssemblyError::UndefinedLabel {
            label    : label.to_string(),
            position : positions.first().copied().unwrap_or_default()
          });
        }
      };
      for position in positions {
        self.words[position] = address;
      }
    }
    Ok(())
  }

  // endregion

}

fn unparsable(token: &Token<'_>) -> AssemblyError {
  AssemblyError::UnparsableData {
    token : token.text.to_string(),
    line  : token.line
  }
}

/**
  Encodes a data token. The leading `#` marker is optional. A digit-led token is one decimal
  word; a letter-led token becomes one word per character. Returns `None` for anything else.
*/
fn encode_data(text: &str) -> Option<Vec<Word>> {
  let body = text.strip_prefix(DATA_MARKER).unwrap_or(text);
  match body.chars().next() {
    Some(c) if c.is_ascii_digit() => body.parse::<Word>().ok().map(|word| vec![word]),
    Some(c) if c.is_alphabetic()  => Some(body.chars().map(|c| c as Word).collect()),
    _ => None
  }
}

// region Tokenizer

fn separator(input: &str) -> IResult<&str, ()> {
  alt((
    value((), take_while1(char::is_whitespace)),
    value((), pair(one_char(COMMENT_MARKER), take_till(|c| c == '\n')))
  ))(input)
}

fn word(input: &str) -> IResult<&str, &str> {
  take_till1(|c: char| c.is_whitespace() || c == COMMENT_MARKER)(input)
}

/// Splits source text into tokens, dropping whitespace and comments.
pub fn tokenize(source: &str) -> Result<Vec<Token<'_>>> {
  let mut parser =
    all_consuming(
      preceded(
        many0(separator),
        many0(terminated(word, many0(separator)))
      )
    );

  let words = match parser(source) {
    Ok((_rest, words)) => words,
    Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
      return Err(unparsable_at(source, e.input));
    }
    Err(nom::Err::Incomplete(_)) => {
      return Err(unparsable_at(source, &source[source.len()..]));
    }
  };

  // Lines are counted incrementally since tokens arrive in source order.
  let mut line = 1;
  let mut scanned = 0;
  let tokens =
    words.into_iter()
         .map(|text| {
           let offset = source.offset(text);
           line += source[scanned..offset].matches('\n').count();
           scanned = offset;
           Token { text, line }
         })
         .collect();
  Ok(tokens)
}

/// An `UnparsableData` error for the first word of `rest`, a suffix of `source`.
fn unparsable_at(source: &str, rest: &str) -> AssemblyError {
  let offset = source.offset(rest);
  AssemblyError::UnparsableData {
    token : rest.split_whitespace().next().unwrap_or_default().to_string(),
    line  : source[..offset].matches('\n').count() + 1
  }
}

// endregion

/// Assembles source text into a word stream.
pub fn assemble(source: &str) -> Result<Vec<Word>> {
  Assembler::new().assemble_with_symbols(source).map(|assembly| assembly.words)
}

/// Assembles already split tokens. Every token is reported as being on line 1.
pub fn assemble_strs(tokens: &[&str]) -> Result<Vec<Word>> {
  let tokens = tokens.iter().map(|text| Token { text: *text, line: 1 });
  Assembler::new().assemble_tokens(tokens).map(|assembly| assembly.words)
}

/// Encodes a single data token, e.g. `#HelloWorld` or `#72`.
pub fn assemble_data(token: &str) -> Result<Vec<Word>> {
  encode_data(token).ok_or_else(|| AssemblyError::UnparsableData {
    token : token.to_string(),
    line  : 1
  })
}

pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Vec<Word>> {
  let source = fs::read_to_string(path)?;
  assemble(&source)
}
