//! Unreachable-block removal and single-reference splicing.
//!
//! A label jumped to from exactly one site (and which is not an entry
//! point) is removed from the cfg and its body spliced in at that site,
//! wrapped in a `TypedBlock` instruction so downstream passes still see
//! the stack-shape contract. Entry labels are seeded at in-degree 2 by
//! the analysis and are therefore never spliced away.
use rustc_hash::FxHashMap;

use stacklang_ir::{Block, InDegrees, Label, Program, TypedBlock};

#[derive(Debug, Default, Clone, Copy)]
pub struct InlineStats {
    pub removed_unreachable: usize,
    pub spliced: usize,
}

pub fn inline_blocks(program: &mut Program) -> InlineStats {
    let mut stats = InlineStats::default();
    let degrees = InDegrees::compute(program);

    let before = program.cfg.len();
    program.cfg.retain(|label, _| degrees.is_reachable(label));
    stats.removed_unreachable = before - program.cfg.len();

    let single_use: Vec<Label> = program
        .cfg
        .keys()
        .filter(|label| degrees.get(label) == Some(1))
        .cloned()
        .collect();
    let mut spliceable: FxHashMap<Label, TypedBlock> = single_use
        .into_iter()
        .map(|label| {
            let typed = program.cfg.shift_remove(&label).expect("label was just seen");
            (label, typed)
        })
        .collect();

    let labels: Vec<Label> = program.cfg.keys().cloned().collect();
    for label in labels {
        let typed = program.cfg.get_mut(&label).expect("label was just seen");
        let body = std::mem::replace(&mut *typed.block, Block::Die);
        *typed.block = splice(body, &mut spliceable, &mut stats.spliced);
    }

    debug_assert!(spliceable.is_empty(), "a single-use block was never spliced");
    stats
}

fn splice(
    block: Block,
    spliceable: &mut FxHashMap<Label, TypedBlock>,
    spliced: &mut usize,
) -> Block {
    match block {
        Block::Jump(bindings, target) if spliceable.contains_key(&target) => {
            let mut typed = spliceable
                .remove(&target)
                .expect("single-use targets are spliced exactly once");
            *typed.block = splice(*typed.block, spliceable, spliced);
            typed.name.get_or_insert_with(|| target.as_str().into());
            *spliced += 1;
            bindings.restore_defs(Block::TypedBlock(typed))
        }
        other => other.map_children(&mut |k| splice(k, spliceable, spliced)),
    }
}
