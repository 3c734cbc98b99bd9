//! The optimization pipeline.
//!
//! [`Pass`] names one rewrite; [`Pipeline`] holds an ordered sequence of
//! passes and runs them against a program, re-verifying well-formedness
//! after every one. A verification failure means the pass that just ran
//! is buggy, so it aborts the process rather than propagating.
use stacklang_ir::{measure, Program, ProgramWriter};
use stacklang_verifier::verify_program;

use crate::commute::commute_pushes;
use crate::dead_branch::eliminate_dead_branches;
use crate::inline::inline_blocks;
use crate::tag_inline::inline_tags;

/// Configuration recognized by the backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct Settings {
    /// Gate the commutation + dead-branch + has-case-tag triple.
    pub commute_pushes: bool,
    /// Print measurements and the program after each pass.
    pub stacklang_dump: bool,
    /// Forwarded into the differential tester's interpreter runs.
    pub trace: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    /// Remove unreachable blocks, splice single-reference blocks.
    Inline,
    /// Propagate constant state tags.
    TagInline,
    /// Commute pushes downward and cancel them against pops.
    CommutePushes,
    /// Prune tag-case arms unreachable under the propagated state sets,
    /// then recompute the `has_case_tag` flags.
    DeadBranches,
}

impl Pass {
    fn name(self) -> &'static str {
        match self {
            Pass::Inline => "inline",
            Pass::TagInline => "tag inline",
            Pass::CommutePushes => "commute pushes",
            Pass::DeadBranches => "dead branches",
        }
    }
}

pub struct Pipeline {
    steps: Vec<Pass>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// The pass sequence implied by the settings.
    pub fn for_settings(settings: &Settings) -> Self {
        let mut p = Self::new();
        p.add_step(Pass::Inline).add_step(Pass::TagInline);
        if settings.commute_pushes {
            p.add_step(Pass::CommutePushes).add_step(Pass::DeadBranches);
        }
        p
    }

    pub fn add_step(&mut self, pass: Pass) -> &mut Self {
        self.steps.push(pass);
        self
    }

    /// Runs every pass in order. Each pass is verified before its result
    /// is observable; a violation aborts.
    pub fn run(&self, program: &mut Program, settings: &Settings) {
        for &pass in &self.steps {
            let before = program.push_count();
            run_pass(pass, program);
            if let Err(err) = verify_program(program) {
                panic!("after pass `{}`: {err}", pass.name());
            }
            let after = program.push_count();
            if settings.stacklang_dump {
                eprintln!("pass {:<16} pushes {before} -> {after}", pass.name());
                eprint!("{}", measure(program));
                eprintln!("{}", ProgramWriter::new(program).dump_string());
            }
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn run_pass(pass: Pass, program: &mut Program) {
    match pass {
        Pass::Inline => {
            inline_blocks(program);
            // Splicing nests whole blocks, so the case-tag flags of the
            // surviving wrappers are stale.
            refresh_case_tag_flags(program);
        }
        Pass::TagInline => {
            inline_tags(program);
        }
        Pass::CommutePushes => {
            commute_pushes(program);
        }
        Pass::DeadBranches => {
            eliminate_dead_branches(program);
            refresh_case_tag_flags(program);
        }
    }
}

/// Recomputes every typed block's `has_case_tag` flag after branches
/// were dropped.
pub fn refresh_case_tag_flags(program: &mut Program) {
    for typed in program.cfg.values_mut() {
        let body = std::mem::replace(&mut *typed.block, stacklang_ir::Block::Die);
        *typed.block = refresh_inner_flags(body);
        typed.has_case_tag = typed.block.contains_case_tag();
    }
}

fn refresh_inner_flags(block: stacklang_ir::Block) -> stacklang_ir::Block {
    let block = block.map_children(&mut refresh_inner_flags);
    match block {
        stacklang_ir::Block::TypedBlock(mut t) => {
            t.has_case_tag = t.block.contains_case_tag();
            stacklang_ir::Block::TypedBlock(t)
        }
        other => other,
    }
}
