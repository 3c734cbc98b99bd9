//! Symbolic descriptors of on-stack slots.
use std::fmt;

use smol_str::SmolStr;

/// What one stack cell holds: the grammar symbol it was pushed for and
/// which components (state tag, semantic value) are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub symbol: Option<SmolStr>,
    pub holds_state: bool,
    pub holds_semv: bool,
}

impl Cell {
    /// A cell carrying only a state tag.
    pub fn state() -> Self {
        Self {
            symbol: None,
            holds_state: true,
            holds_semv: false,
        }
    }

    /// A cell carrying the semantic value of `symbol`.
    pub fn semv(symbol: impl Into<SmolStr>) -> Self {
        Self {
            symbol: Some(symbol.into()),
            holds_state: false,
            holds_semv: true,
        }
    }

    /// A cell carrying both a state tag and the semantic value of `symbol`.
    pub fn full(symbol: impl Into<SmolStr>) -> Self {
        Self {
            symbol: Some(symbol.into()),
            holds_state: true,
            holds_semv: true,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.symbol {
            Some(sym) => write!(f, "[{}", sym)?,
            None => write!(f, "[")?,
        }
        if self.holds_state {
            write!(f, " st")?;
        }
        if self.holds_semv {
            write!(f, " sv")?;
        }
        write!(f, "]")
    }
}

/// The longest shared top-of-stack segment of two known-cell sequences
/// (newest at the end of each slice).
pub fn shared_top(a: &[Cell], b: &[Cell]) -> Vec<Cell> {
    let n = a
        .iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    a[a.len() - n..].to_vec()
}
