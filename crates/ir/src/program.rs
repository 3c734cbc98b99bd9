//! Whole programs: the label-indexed control flow graph, the entry
//! points, and the per-state typing table handed down by the automaton.
use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::block::TypedBlock;
use crate::cell::Cell;
use crate::value::{Label, Nonterminal, RegisterSet, Tag};

/// What the automaton knows about one state: the symbol its reductions
/// produce (if unique) and the stack cells guaranteed beneath it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateInfo {
    pub final_type: Option<Nonterminal>,
    /// Newest at the end.
    pub known_cells: Vec<Cell>,
}

/// A complete StackLang program.
///
/// Blocks refer to each other through labels, never directly, so the
/// cyclic control flow graph is just a map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub cfg: IndexMap<Label, TypedBlock>,
    pub entry: IndexMap<Nonterminal, Label>,
    pub states: FxHashMap<Tag, StateInfo>,
}

impl Program {
    pub fn new() -> Self {
        Self {
            cfg: IndexMap::new(),
            entry: IndexMap::new(),
            states: FxHashMap::default(),
        }
    }

    pub fn block(&self, label: &Label) -> Option<&TypedBlock> {
        self.cfg.get(label)
    }

    /// The registers that must be live on entry to `label`.
    pub fn needed(&self, label: &Label) -> Option<&RegisterSet> {
        self.cfg.get(label).map(|t| &t.needed_registers)
    }

    pub fn state(&self, tag: Tag) -> Option<&StateInfo> {
        self.states.get(&tag)
    }

    /// Total `Push` count over every block. The commutation pass must
    /// never increase this.
    pub fn push_count(&self) -> usize {
        self.cfg.values().map(|t| t.block.push_count()).sum()
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}
