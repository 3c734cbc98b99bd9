//! Control-flow reachability over the label graph.
use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::block::Block;
use crate::program::Program;
use crate::value::Label;

/// Visits the target of every `Jump` in the block tree. Case branches
/// are walked; a jump ends its own path, so no terminal is crossed.
pub fn successors<'a>(block: &'a Block, f: &mut dyn FnMut(&'a Label)) {
    if let Block::Jump(_, target) = block {
        f(target);
        return;
    }
    block.for_each_child(&mut |k| successors(k, f));
}

pub fn successor_labels(block: &Block) -> SmallVec<[Label; 4]> {
    let mut out = SmallVec::new();
    successors(block, &mut |l| out.push(l.clone()));
    out
}

/// In-degrees of the reachable labels.
///
/// Entry labels are seeded at degree 2 so they are never considered
/// single-reference by the inliner. A label absent from the map is
/// unreachable from every entry.
#[derive(Debug, Default)]
pub struct InDegrees {
    degrees: FxHashMap<Label, u32>,
}

impl InDegrees {
    pub fn compute(program: &Program) -> Self {
        let mut degrees = FxHashMap::default();
        let mut queue = VecDeque::new();

        for label in program.entry.values() {
            if degrees.insert(label.clone(), 2).is_none() {
                queue.push_back(label.clone());
            }
        }

        while let Some(label) = queue.pop_front() {
            let Some(block) = program.block(&label) else {
                continue;
            };
            successors(&block.block, &mut |target| {
                match degrees.get_mut(target) {
                    Some(d) => *d += 1,
                    None => {
                        degrees.insert(target.clone(), 1);
                        queue.push_back(target.clone());
                    }
                }
            });
        }

        Self { degrees }
    }

    pub fn get(&self, label: &Label) -> Option<u32> {
        self.degrees.get(label).copied()
    }

    pub fn is_reachable(&self, label: &Label) -> bool {
        self.degrees.contains_key(label)
    }
}
