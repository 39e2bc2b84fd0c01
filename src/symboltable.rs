/*!
  The assembler's symbol table. It maps label names to their address in the output word stream
  and records every place a label is referenced so the references can be patched once all
  labels are known. Label names are interned.
*/

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use string_cache::DefaultAtom;

use crate::bytecode::Word;

#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
  labels     : HashMap<DefaultAtom, Word>,
  references : HashMap<DefaultAtom, Vec<usize>>,
}

impl SymbolTable {

  pub fn new() -> SymbolTable {
    SymbolTable::default()
  }

  /// Binds `name` to `address`. If `name` is already bound, the table is unchanged and the
  /// existing address is returned as the error.
  pub fn insert_label(&mut self, name: &str, address: Word) -> Result<(), Word> {
    match self.labels.entry(DefaultAtom::from(name)) {
      Entry::Occupied(entry) => Err(*entry.get()),
      Entry::Vacant(entry) => {
        entry.insert(address);
        Ok(())
      }
    }
  }

  pub fn get_address(&self, name: &str) -> Option<Word> {
    self.labels.get(&DefaultAtom::from(name)).copied()
  }

  /// Label definitions ordered by address, then name.
  pub fn labels(&self) -> Vec<(&DefaultAtom, Word)> {
    let mut labels: Vec<(&DefaultAtom, Word)> =
      self.labels.iter().map(|(name, address)| (name, *address)).collect();
    labels.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| as_str(a.0).cmp(as_str(b.0))));
    labels
  }

  pub fn label_count(&self) -> usize {
    self.labels.len()
  }

  /// Records that the word at `position` of the output is a reference to `name`.
  pub fn add_reference(&mut self, name: &str, position: usize) {
    self.references
        .entry(DefaultAtom::from(name))
        .or_insert_with(Vec::new)
        .push(position);
  }

  /**
    Removes and returns all recorded references, grouped by label. Groups are ordered by the
    position of their first reference, and positions within a group are ascending, so a
    caller walking the result meets references in output order.
  */
  pub fn take_references(&mut self) -> Vec<(DefaultAtom, Vec<usize>)> {
    let mut references: Vec<(DefaultAtom, Vec<usize>)> = self.references.drain().collect();
    references.sort_by_key(|(_, positions)| positions.first().copied().unwrap_or(usize::MAX));
    references
  }
}

fn as_str(atom: &DefaultAtom) -> &str {
  atom
}
