//! The StackLang instruction set.
//!
//! A block is a cons-list of instructions ended by a terminal (`Die`,
//! `Return`, `Jump`, or a case dispatch). Non-terminal instruction forms
//! own their continuation, so a block is a tree whose spine is the
//! straight-line code and whose branching points are the case forms.
//!
//! [`Block::map_children`] and [`Block::for_each_child`] are the only
//! code that matches every instruction form; a pass overrides the cases
//! it cares about and hands everything else to the combinator.
use std::collections::BTreeSet;

use smol_str::SmolStr;

use crate::cell::Cell;
use crate::subst::Subst;
use crate::value::{ActionId, Label, Nonterminal, Pattern, Register, RegisterSet, Tag, Terminal, Value};

/// An opaque host-language call. Primitives are never inlined; the
/// passes only track which registers they read and write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Primitive {
    /// A host function call.
    HostCall(SmolStr, Vec<Value>),
    /// A host record field access.
    FieldAccess(Value, SmolStr),
    /// A synthetic position.
    DummyPos,
    /// A semantic-action invocation with its attached bindings.
    Action(ActionId, Subst),
}

impl Primitive {
    /// The registers this primitive reads.
    pub fn registers(&self) -> RegisterSet {
        match self {
            Primitive::HostCall(_, args) => {
                let mut out = RegisterSet::new();
                for arg in args {
                    arg.collect_registers(&mut out);
                }
                out
            }
            Primitive::FieldAccess(v, _) => v.registers(),
            Primitive::DummyPos => RegisterSet::new(),
            Primitive::Action(_, bindings) => bindings.codomain_registers(),
        }
    }

    /// Substitutes into the argument values (or attached bindings).
    pub fn apply(&self, s: &Subst) -> Primitive {
        match self {
            Primitive::HostCall(f, args) => {
                Primitive::HostCall(f.clone(), args.iter().map(|v| s.apply(v)).collect())
            }
            Primitive::FieldAccess(v, field) => Primitive::FieldAccess(s.apply(v), field.clone()),
            Primitive::DummyPos => Primitive::DummyPos,
            Primitive::Action(id, bindings) => {
                let rewritten = bindings
                    .iter()
                    .map(|(r, v)| (r.clone(), s.apply(v)))
                    .collect();
                Primitive::Action(*id, rewritten)
            }
        }
    }
}

/// One branch of a token dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBranch {
    pub pat: TokenPat,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenPat {
    /// Matches one terminal and binds its semantic payload.
    Single(Terminal, Register),
    /// Matches any terminal in the set, binding nothing.
    Multiple(BTreeSet<Terminal>),
}

/// One branch of a state-tag dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagBranch {
    pub tags: BTreeSet<Tag>,
    pub body: Block,
}

/// A block wrapped with its stack-shape and liveness contracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedBlock {
    pub block: Box<Block>,
    /// Known stack cells on entry, deepest first, newest at the end.
    pub stack_type: Vec<Cell>,
    /// The symbol whose semantic value this block ultimately returns.
    pub final_type: Option<Nonterminal>,
    /// Registers that must be live on entry.
    pub needed_registers: RegisterSet,
    /// Whether any descendant contains a `CaseTag`.
    pub has_case_tag: bool,
    pub name: Option<SmolStr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Declares that only `rs` is live; registers outside it become
    /// undefined.
    Need(RegisterSet, Box<Block>),
    /// Pushes a value, annotated with its symbolic cell.
    Push(Value, Cell, Box<Block>),
    /// Pops the top of the stack into a pattern.
    Pop(Pattern, Box<Block>),
    /// Binds a set of registers simultaneously.
    Def(Subst, Box<Block>),
    /// Assigns the result of an opaque primitive to a register.
    Prim(Register, Primitive, Box<Block>),
    /// Side-effect-only trace output; semantically transparent.
    Trace(SmolStr, Box<Block>),
    /// Pure annotation; transparent.
    Comment(String, Box<Block>),
    /// Aborts execution.
    Die,
    /// Returns the contents of a register.
    Return(Register),
    /// Transfers control, applying the carried bindings first.
    Jump(Subst, Label),
    /// Dispatches on the token held in a register.
    CaseToken(Register, Vec<TokenBranch>, Option<Box<Block>>),
    /// Dispatches on the state tag held in a register.
    CaseTag(Register, Vec<TagBranch>),
    /// An inlined block carrying its typing contract.
    TypedBlock(TypedBlock),
}

impl Block {
    /// Rebuilds this instruction with every direct sub-block passed
    /// through `f`. Exactly one instruction level.
    pub fn map_children(self, f: &mut dyn FnMut(Block) -> Block) -> Block {
        match self {
            Block::Need(rs, k) => Block::Need(rs, Box::new(f(*k))),
            Block::Push(v, cell, k) => Block::Push(v, cell, Box::new(f(*k))),
            Block::Pop(p, k) => Block::Pop(p, Box::new(f(*k))),
            Block::Def(b, k) => Block::Def(b, Box::new(f(*k))),
            Block::Prim(r, p, k) => Block::Prim(r, p, Box::new(f(*k))),
            Block::Trace(s, k) => Block::Trace(s, Box::new(f(*k))),
            Block::Comment(s, k) => Block::Comment(s, Box::new(f(*k))),
            Block::Die => Block::Die,
            Block::Return(r) => Block::Return(r),
            Block::Jump(b, l) => Block::Jump(b, l),
            Block::CaseToken(r, branches, default) => Block::CaseToken(
                r,
                branches
                    .into_iter()
                    .map(|br| TokenBranch {
                        pat: br.pat,
                        body: f(br.body),
                    })
                    .collect(),
                default.map(|d| Box::new(f(*d))),
            ),
            Block::CaseTag(r, branches) => Block::CaseTag(
                r,
                branches
                    .into_iter()
                    .map(|br| TagBranch {
                        tags: br.tags,
                        body: f(br.body),
                    })
                    .collect(),
            ),
            Block::TypedBlock(mut t) => {
                t.block = Box::new(f(*t.block));
                Block::TypedBlock(t)
            }
        }
    }

    /// Visits every direct sub-block. Exactly one instruction level.
    pub fn for_each_child<'a>(&'a self, f: &mut dyn FnMut(&'a Block)) {
        match self {
            Block::Need(_, k)
            | Block::Push(_, _, k)
            | Block::Pop(_, k)
            | Block::Def(_, k)
            | Block::Prim(_, _, k)
            | Block::Trace(_, k)
            | Block::Comment(_, k) => f(k),
            Block::Die | Block::Return(_) | Block::Jump(..) => {}
            Block::CaseToken(_, branches, default) => {
                for br in branches {
                    f(&br.body);
                }
                if let Some(d) = default {
                    f(d);
                }
            }
            Block::CaseTag(_, branches) => {
                for br in branches {
                    f(&br.body);
                }
            }
            Block::TypedBlock(t) => f(&t.block),
        }
    }

    /// Removes every `Comment` node. Used to compare pass output up to
    /// annotations.
    pub fn strip_comments(self) -> Block {
        match self {
            Block::Comment(_, k) => k.strip_comments(),
            other => other.map_children(&mut Block::strip_comments),
        }
    }

    /// Whether any descendant (crossing typed-block boundaries) is a
    /// `CaseTag`.
    pub fn contains_case_tag(&self) -> bool {
        if matches!(self, Block::CaseTag(..)) {
            return true;
        }
        let mut found = false;
        self.for_each_child(&mut |k| found |= k.contains_case_tag());
        found
    }

    /// The number of `Push` instructions in this block tree.
    pub fn push_count(&self) -> usize {
        let mut count = usize::from(matches!(self, Block::Push(..)));
        self.for_each_child(&mut |k| count += k.push_count());
        count
    }
}

pub fn need(rs: RegisterSet, k: Block) -> Block {
    Block::Need(rs, Box::new(k))
}

pub fn push(v: Value, cell: Cell, k: Block) -> Block {
    Block::Push(v, cell, Box::new(k))
}

pub fn pop(p: Pattern, k: Block) -> Block {
    Block::Pop(p, Box::new(k))
}

/// Binds `p` to `v`. Identity rules are dropped; a binding with no
/// effect vanishes entirely.
pub fn def(p: Pattern, v: Value, k: Block) -> Block {
    let mut bindings = Subst::new();
    bindings.extend_pattern(&p, &v);
    let bindings: Subst = bindings
        .iter()
        .filter(|(r, v)| !matches!(v, Value::Reg(r2) if r2 == *r))
        .map(|(r, v)| (r.clone(), v.clone()))
        .collect();
    def_bindings(bindings, k)
}

pub fn def_bindings(bindings: Subst, k: Block) -> Block {
    if bindings.is_empty() {
        k
    } else {
        Block::Def(bindings, Box::new(k))
    }
}

pub fn prim(r: Register, p: Primitive, k: Block) -> Block {
    Block::Prim(r, p, Box::new(k))
}

pub fn trace(msg: impl Into<SmolStr>, k: Block) -> Block {
    Block::Trace(msg.into(), Box::new(k))
}

pub fn comment(msg: impl Into<String>, k: Block) -> Block {
    Block::Comment(msg.into(), Box::new(k))
}

pub fn jump(l: Label) -> Block {
    Block::Jump(Subst::new(), l)
}

pub fn jump_with(bindings: Subst, l: Label) -> Block {
    Block::Jump(bindings, l)
}

pub fn case_token(r: Register, branches: Vec<TokenBranch>, default: Option<Block>) -> Block {
    Block::CaseToken(r, branches, default.map(Box::new))
}

pub fn case_tag(r: Register, branches: Vec<TagBranch>) -> Block {
    Block::CaseTag(r, branches)
}

pub fn typed_block(t: TypedBlock) -> Block {
    Block::TypedBlock(t)
}
