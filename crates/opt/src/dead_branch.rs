//! Dead tag-branch pruning.
//!
//! Runs after commutation with the set of states control flow can still
//! be in, narrowed at every `CaseTag` and forgotten at every `Pop` (the
//! popped cell may carry any tag). A branch whose tag set cannot
//! intersect the possible states is unreachable and dropped.
use std::collections::BTreeSet;

use stacklang_ir::{Block, Program, TagBranch, Tag};

/// Possible states; `None` is "any".
type PossibleStates = Option<BTreeSet<Tag>>;

pub fn eliminate_dead_branches(program: &mut Program) -> usize {
    let mut removed = 0;
    for typed in program.cfg.values_mut() {
        let body = std::mem::replace(&mut *typed.block, Block::Die);
        *typed.block = walk(body, None, &mut removed);
    }
    removed
}

fn walk(block: Block, possible: PossibleStates, removed: &mut usize) -> Block {
    match block {
        Block::CaseTag(r, branches) => {
            let before = branches.len();
            let branches: Vec<TagBranch> = branches
                .into_iter()
                .filter_map(|TagBranch { tags, body }| {
                    let narrowed: BTreeSet<Tag> = match &possible {
                        None => tags.clone(),
                        Some(states) => tags.intersection(states).copied().collect(),
                    };
                    if narrowed.is_empty() {
                        return None;
                    }
                    Some(TagBranch {
                        tags,
                        body: walk(body, Some(narrowed), removed),
                    })
                })
                .collect();
            *removed += before - branches.len();
            if branches.is_empty() {
                Block::Die
            } else {
                Block::CaseTag(r, branches)
            }
        }

        Block::Pop(p, k) => Block::Pop(p, Box::new(walk(*k, None, removed))),

        other => other.map_children(&mut |k| walk(k, possible.clone(), removed)),
    }
}

#[cfg(test)]
mod tests {
    use stacklang_ir::{
        case_tag, pop, Block, Label, Nonterminal, Pattern, Program, Register, RegisterSet,
        TypedBlock,
    };

    use super::*;

    fn r(name: &str) -> Register {
        Register::new(name)
    }

    fn tags(ts: &[u32]) -> BTreeSet<Tag> {
        ts.iter().map(|t| Tag(*t)).collect()
    }

    fn single_block_program(needed: RegisterSet, body: Block) -> Program {
        let mut program = Program::new();
        let label = Label::new("run_main");
        program.cfg.insert(
            label.clone(),
            TypedBlock {
                block: Box::new(body),
                stack_type: Vec::new(),
                final_type: None,
                needed_registers: needed,
                has_case_tag: true,
                name: None,
            },
        );
        program.entry.insert(Nonterminal(0), label);
        program
    }

    #[test]
    fn nested_case_prunes_outside_outer_narrowing() {
        // The outer dispatch narrows to {1, 2}; the inner branch on {3}
        // can never be taken.
        let inner = case_tag(
            r("s"),
            vec![
                TagBranch {
                    tags: tags(&[1]),
                    body: Block::Die,
                },
                TagBranch {
                    tags: tags(&[3]),
                    body: Block::Die,
                },
            ],
        );
        let outer = case_tag(
            r("s"),
            vec![TagBranch {
                tags: tags(&[1, 2]),
                body: inner,
            }],
        );
        let mut program =
            single_block_program([r("s")].into_iter().collect(), outer);

        let removed = eliminate_dead_branches(&mut program);
        assert_eq!(removed, 1);

        match &*program.cfg[&Label::new("run_main")].block {
            Block::CaseTag(_, outer_branches) => match &outer_branches[0].body {
                Block::CaseTag(_, inner_branches) => {
                    assert_eq!(inner_branches.len(), 1);
                    assert_eq!(inner_branches[0].tags, tags(&[1]));
                }
                other => panic!("expected inner case tag, got {other:?}"),
            },
            other => panic!("expected outer case tag, got {other:?}"),
        }
    }

    #[test]
    fn pop_forgets_the_narrowing() {
        // After a pop the state register may hold anything; the inner
        // branch on {3} must survive.
        let inner = case_tag(
            r("t"),
            vec![TagBranch {
                tags: tags(&[3]),
                body: Block::Die,
            }],
        );
        let outer = case_tag(
            r("s"),
            vec![TagBranch {
                tags: tags(&[1]),
                body: pop(Pattern::Reg(r("t")), inner),
            }],
        );
        let mut program =
            single_block_program([r("s")].into_iter().collect(), outer);

        let removed = eliminate_dead_branches(&mut program);
        assert_eq!(removed, 0);
    }
}
