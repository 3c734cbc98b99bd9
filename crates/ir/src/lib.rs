pub mod block;
pub mod cell;
pub mod cfg;
pub mod fresh;
pub mod ir_writer;
pub mod measure;
pub mod program;
pub mod subst;
pub mod value;

pub use block::{
    case_tag, case_token, comment, def, def_bindings, jump, jump_with, need, pop, prim, push,
    trace, typed_block, Block, Primitive, TagBranch, TokenBranch, TokenPat, TypedBlock,
};
pub use cell::Cell;
pub use cfg::{successor_labels, successors, InDegrees};
pub use fresh::FreshNames;
pub use ir_writer::ProgramWriter;
pub use measure::{measure, Measure};
pub use program::{Program, StateInfo};
pub use subst::Subst;
pub use value::{
    intersection, ActionId, Label, Nonterminal, Pattern, Register, RegisterSet, Tag, Terminal,
    Value,
};
