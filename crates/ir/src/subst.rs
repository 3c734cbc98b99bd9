//! Register-to-value substitutions.
//!
//! A substitution is a finite map from registers to values. Passes carry
//! one while walking a block, apply it lazily to the values they emit,
//! and restore the pending rules as explicit definitions at control-flow
//! boundaries. Application is single-step: a rewritten register is never
//! rewritten again through another rule.
use std::collections::BTreeMap;

use crate::value::{Pattern, Register, RegisterSet, Value};
use crate::Block;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subst {
    rules: BTreeMap<Register, Value>,
}

impl Subst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(r: Register, v: Value) -> Self {
        let mut s = Self::new();
        s.add(r, v);
        s
    }

    /// Adds a rule, overwriting any existing rule for `r`.
    pub fn add(&mut self, r: Register, v: Value) {
        self.rules.insert(r, v);
    }

    pub fn get(&self, r: &Register) -> Option<&Value> {
        self.rules.get(r)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Register, &Value)> {
        self.rules.iter()
    }

    pub fn domain(&self) -> impl Iterator<Item = &Register> {
        self.rules.keys()
    }

    pub fn contains(&self, r: &Register) -> bool {
        self.rules.contains_key(r)
    }

    /// The registers read by any right-hand side.
    pub fn codomain_registers(&self) -> RegisterSet {
        let mut out = RegisterSet::new();
        for v in self.rules.values() {
            v.collect_registers(&mut out);
        }
        out
    }

    /// Removes every rule whose left-hand side is bound by `p`.
    pub fn remove(&mut self, p: &Pattern) {
        match p {
            Pattern::Wildcard => {}
            Pattern::Reg(r) => {
                self.rules.remove(r);
            }
            Pattern::Tuple(ps) => {
                for p in ps {
                    self.remove(p);
                }
            }
        }
    }

    pub fn remove_register(&mut self, r: &Register) {
        self.rules.remove(r);
    }

    /// Removes every rule whose left-hand side is referenced by `v`.
    pub fn remove_value(&mut self, v: &Value) {
        for r in v.registers() {
            self.rules.remove(&r);
        }
    }

    /// Keeps only rules whose left-hand side is in `rs`.
    pub fn restrict(&mut self, rs: &RegisterSet) {
        self.rules.retain(|r, _| rs.contains(r));
    }

    /// Splits off the rules whose left-hand side is in `rs`.
    pub fn split_off(&mut self, rs: &RegisterSet) -> Subst {
        let mut taken = Subst::new();
        for r in rs {
            if let Some(v) = self.rules.remove(r) {
                taken.add(r.clone(), v);
            }
        }
        taken
    }

    /// Substitutes into a value. Structural recursion over tuples; each
    /// register is rewritten by at most one rule.
    pub fn apply(&self, v: &Value) -> Value {
        match v {
            Value::Tag(_) | Value::Unit => v.clone(),
            Value::Reg(r) => self.rules.get(r).cloned().unwrap_or_else(|| v.clone()),
            Value::Tuple(vs) => Value::Tuple(vs.iter().map(|v| self.apply(v)).collect()),
        }
    }

    pub fn apply_register(&self, r: &Register) -> Value {
        self.rules
            .get(r)
            .cloned()
            .unwrap_or_else(|| Value::Reg(r.clone()))
    }

    /// Substitutes into a pattern. Any rule crossing a bound register must
    /// map it to another register; anything else is an invariant breach.
    pub fn apply_pattern(&self, p: &Pattern) -> Pattern {
        match p {
            Pattern::Wildcard => Pattern::Wildcard,
            Pattern::Reg(r) => match self.rules.get(r) {
                None => p.clone(),
                Some(Value::Reg(r2)) => Pattern::Reg(r2.clone()),
                Some(v) => panic!("cannot substitute {v} for bound register {r}"),
            },
            Pattern::Tuple(ps) => Pattern::Tuple(ps.iter().map(|p| self.apply_pattern(p)).collect()),
        }
    }

    /// Applies `self` to the right-hand sides of `other`, then unions the
    /// two rule sets; `other` wins on clashes.
    pub fn compose(&self, other: &Subst) -> Subst {
        let mut out = self.clone();
        for (r, v) in other.iter() {
            out.rules.insert(r.clone(), self.apply(v));
        }
        out
    }

    /// Adds the rules decomposing `p` structurally against `v`.
    pub fn extend_pattern(&mut self, p: &Pattern, v: &Value) {
        match (p, v) {
            (Pattern::Wildcard, _) => {}
            (Pattern::Reg(r), v) => self.add(r.clone(), v.clone()),
            (Pattern::Tuple(ps), Value::Tuple(vs)) => {
                assert_eq!(ps.len(), vs.len(), "tuple arity mismatch in binding");
                for (p, v) in ps.iter().zip(vs) {
                    self.extend_pattern(p, v);
                }
            }
            (Pattern::Tuple(_), v) => {
                panic!("cannot decompose non-tuple value {v} against a tuple pattern")
            }
        }
    }

    /// Prepends a definition for every rule.
    pub fn restore_defs(self, block: Block) -> Block {
        if self.is_empty() {
            block
        } else {
            Block::Def(self, Box::new(block))
        }
    }

    /// As [`Subst::restore_defs`], but only for rules whose left-hand
    /// side is in `rs`.
    pub fn tight_restore_defs(&self, rs: &RegisterSet, block: Block) -> Block {
        let mut kept = Subst::new();
        for (r, v) in self.iter() {
            if rs.contains(r) {
                kept.add(r.clone(), v.clone());
            }
        }
        kept.restore_defs(block)
    }
}

impl FromIterator<(Register, Value)> for Subst {
    fn from_iter<I: IntoIterator<Item = (Register, Value)>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}
