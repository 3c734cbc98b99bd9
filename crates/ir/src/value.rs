//! Registers, values, and binding patterns.
use std::{collections::BTreeSet, fmt};

use smol_str::SmolStr;

/// An LR state equivalence class.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(pub u32);
cranelift_entity::entity_impl!(Tag, "s");

/// A terminal symbol of the grammar.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Terminal(pub u32);
cranelift_entity::entity_impl!(Terminal, "t");

/// A start nonterminal of the grammar.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nonterminal(pub u32);
cranelift_entity::entity_impl!(Nonterminal, "nt");

/// An opaque reference to a host-language semantic action.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionId(pub u32);
cranelift_entity::entity_impl!(ActionId, "act");

/// A named local storage cell.
///
/// Registers arrive from upstream as symbolic names and are printed back
/// verbatim, so they are interned strings rather than dense indices.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Register(SmolStr);

impl Register {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Register {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A symbolic handle naming a block in the control flow graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(SmolStr);

impl Label {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Label {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type RegisterSet = BTreeSet<Register>;

/// A runtime value expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A known state tag.
    Tag(Tag),
    /// The current contents of a register.
    Reg(Register),
    /// A finite sequence of values.
    Tuple(Vec<Value>),
    /// The zero-information value.
    Unit,
}

impl Value {
    /// The set of registers this value reads.
    pub fn registers(&self) -> RegisterSet {
        let mut out = RegisterSet::new();
        self.collect_registers(&mut out);
        out
    }

    pub fn collect_registers(&self, out: &mut RegisterSet) {
        match self {
            Value::Tag(_) | Value::Unit => {}
            Value::Reg(r) => {
                out.insert(r.clone());
            }
            Value::Tuple(vs) => {
                for v in vs {
                    v.collect_registers(out);
                }
            }
        }
    }

    pub fn reads(&self, r: &Register) -> bool {
        match self {
            Value::Tag(_) | Value::Unit => false,
            Value::Reg(r2) => r == r2,
            Value::Tuple(vs) => vs.iter().any(|v| v.reads(r)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Tag(t) => write!(f, "{t}"),
            Value::Reg(r) => write!(f, "{r}"),
            Value::Tuple(vs) => {
                write!(f, "(")?;
                for (i, v) in vs.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
            Value::Unit => write!(f, "()"),
        }
    }
}

/// The left-hand side of a binding.
///
/// A pattern is linear: no register appears twice. [`Pattern::tuple`]
/// asserts this on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// Matches any value, binds nothing.
    Wildcard,
    /// Binds the register to the matched value.
    Reg(Register),
    /// Structurally matches a tuple of the same arity.
    Tuple(Vec<Pattern>),
}

impl Pattern {
    /// Builds a tuple pattern, asserting linearity.
    pub fn tuple(pats: Vec<Pattern>) -> Pattern {
        let pat = Pattern::Tuple(pats);
        if let Some(r) = pat.duplicate_register() {
            panic!("register {r} bound twice in one pattern");
        }
        pat
    }

    /// The set of registers this pattern binds.
    pub fn registers(&self) -> RegisterSet {
        let mut out = RegisterSet::new();
        self.collect_registers(&mut out);
        out
    }

    fn collect_registers(&self, out: &mut RegisterSet) {
        match self {
            Pattern::Wildcard => {}
            Pattern::Reg(r) => {
                out.insert(r.clone());
            }
            Pattern::Tuple(ps) => {
                for p in ps {
                    p.collect_registers(out);
                }
            }
        }
    }

    /// The first register bound more than once, if any.
    pub fn duplicate_register(&self) -> Option<Register> {
        fn walk(p: &Pattern, seen: &mut RegisterSet) -> Option<Register> {
            match p {
                Pattern::Wildcard => None,
                Pattern::Reg(r) => (!seen.insert(r.clone())).then(|| r.clone()),
                Pattern::Tuple(ps) => ps.iter().find_map(|p| walk(p, seen)),
            }
        }
        walk(self, &mut RegisterSet::new())
    }

    pub fn binds(&self, r: &Register) -> bool {
        match self {
            Pattern::Wildcard => false,
            Pattern::Reg(r2) => r == r2,
            Pattern::Tuple(ps) => ps.iter().any(|p| p.binds(r)),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Wildcard => write!(f, "_"),
            Pattern::Reg(r) => write!(f, "{r}"),
            Pattern::Tuple(ps) => {
                write!(f, "(")?;
                for (i, p) in ps.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// The registers that `v` reads among those bound by `p`.
///
/// A non-empty result at a write site means the write would clobber a
/// register some delayed value still depends on.
pub fn intersection(p: &Pattern, v: &Value) -> RegisterSet {
    let bound = p.registers();
    let read = v.registers();
    bound.intersection(&read).cloned().collect()
}
