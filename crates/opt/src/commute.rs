//! Push/pop commutation.
//!
//! An LR parser frequently pushes a value, runs a few instructions that
//! never inspect that cell, and pops it back into a pattern. Delaying
//! each push while walking down the block lets it meet its matching pop
//! and cancel; a push that reaches a jump instead is restored there, in
//! original stack order.
//!
//! The walker carries:
//!   - the delayed pushes (last element newest; restoring iterates from
//!     the newest so the oldest lands outermost and the newest topmost);
//!   - a substitution accumulated from absorbed `Def`s;
//!   - the known top-of-stack cells and the refined return type, both
//!     narrowed inside `CaseTag` branches.
//!
//! A block where nothing cancelled and no branch was eliminated is
//! returned untouched, so the pass is idempotent and leaves no comment
//! churn behind.
use rustc_hash::FxHashMap;

use stacklang_ir::{
    comment, def, Block, Cell, cell::shared_top, FreshNames, Label, Nonterminal, Pattern, Program,
    Register, RegisterSet, StateInfo, Subst, Tag, TagBranch, TokenBranch, TokenPat, TypedBlock,
    Value,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct CommuteStats {
    pub cancelled_pops: usize,
    pub eliminated_branches: usize,
}

pub fn commute_pushes(program: &mut Program) -> CommuteStats {
    let needed: FxHashMap<Label, RegisterSet> = program
        .cfg
        .iter()
        .map(|(label, typed)| (label.clone(), typed.needed_registers.clone()))
        .collect();
    let states = std::mem::take(&mut program.states);

    let mut commuter = Commuter {
        states: &states,
        needed: &needed,
        fresh: FreshNames::new(),
        next_push_id: 0,
        stats: CommuteStats::default(),
    };
    commuter.fresh.seed(0);

    for typed in program.cfg.values_mut() {
        let flow = Flow {
            pushes: Vec::new(),
            bindings: Subst::new(),
            final_type: typed.final_type,
            known_cells: typed.stack_type.clone(),
        };
        let before = commuter.stats;
        let rewritten = commuter.walk(flow, (*typed.block).clone());
        let progressed = commuter.stats.cancelled_pops != before.cancelled_pops
            || commuter.stats.eliminated_branches != before.eliminated_branches;
        if progressed {
            *typed.block = rewritten;
        } else {
            commuter.stats = before;
        }
    }

    let stats = commuter.stats;
    drop(commuter);
    program.states = states;
    stats
}

/// One push not yet materialized.
#[derive(Debug, Clone)]
struct DelayedPush {
    value: Value,
    cell: Cell,
    id: u64,
}

#[derive(Debug, Clone)]
struct Flow {
    /// Newest at the end.
    pushes: Vec<DelayedPush>,
    bindings: Subst,
    final_type: Option<Nonterminal>,
    /// Newest at the end.
    known_cells: Vec<Cell>,
}

impl Flow {
    /// Registers read by any delayed push.
    fn push_registers(&self) -> RegisterSet {
        let mut out = RegisterSet::new();
        for dp in &self.pushes {
            dp.value.collect_registers(&mut out);
        }
        out
    }

    fn any_push_reads(&self, r: &Register) -> bool {
        self.pushes.iter().any(|dp| dp.value.reads(r))
    }
}

struct Commuter<'a> {
    states: &'a FxHashMap<Tag, StateInfo>,
    needed: &'a FxHashMap<Label, RegisterSet>,
    fresh: FreshNames,
    next_push_id: u64,
    stats: CommuteStats,
}

impl Commuter<'_> {
    fn push_id(&mut self) -> u64 {
        let id = self.next_push_id;
        self.next_push_id += 1;
        id
    }

    fn walk(&mut self, mut flow: Flow, block: Block) -> Block {
        match block {
            Block::Need(rs, k) => {
                // Registers feeding delayed pushes must stay live, and a
                // register rewritten by the bindings is live through the
                // registers of its replacement value.
                let mut live = flow.push_registers();
                for r in &rs {
                    flow.bindings.apply_register(r).collect_registers(&mut live);
                }
                Block::Need(live, Box::new(self.walk(flow, *k)))
            }

            Block::Push(v, cell, k) => {
                let value = flow.bindings.apply(&v);
                let id = self.push_id();
                let note = format!("Commuting push_{id} {value}");
                flow.pushes.push(DelayedPush { value, cell, id });
                comment(note, self.walk(flow, *k))
            }

            Block::Pop(p, k) => match flow.pushes.pop() {
                Some(dp) => {
                    // The delayed value must keep referring to the
                    // registers as they were when the push was recorded.
                    flow.bindings.remove_value(&dp.value);
                    flow.bindings.extend_pattern(&p, &dp.value);
                    self.stats.cancelled_pops += 1;
                    comment(
                        format!("Cancelled push_{} into {p}", dp.id),
                        self.walk(flow, *k),
                    )
                }
                None => {
                    assert!(
                        !flow.known_cells.is_empty(),
                        "pop with no known cell and no delayed push"
                    );
                    flow.known_cells.pop();
                    flow.bindings.remove(&p);
                    Block::Pop(p, Box::new(self.walk(flow, *k)))
                }
            },

            Block::Def(bindings, k) => {
                let note = format!("Inlining def {bindings}");
                flow.bindings = flow.bindings.compose(&bindings);
                comment(note, self.walk(flow, *k))
            }

            Block::Prim(r, p, k) => {
                let p = p.apply(&flow.bindings);
                let out = if flow.any_push_reads(&r) {
                    let renamed = self.fresh.register(&r);
                    flow.bindings.add(r, Value::Reg(renamed.clone()));
                    renamed
                } else {
                    flow.bindings.remove_register(&r);
                    r
                };
                Block::Prim(out, p, Box::new(self.walk(flow, *k)))
            }

            Block::Trace(s, k) => Block::Trace(s, Box::new(self.walk(flow, *k))),
            Block::Comment(s, k) => Block::Comment(s, Box::new(self.walk(flow, *k))),

            Block::Die => {
                // Delayed pushes can never become observable past an abort.
                self.stats.cancelled_pops += flow.pushes.len();
                Block::Die
            }

            Block::Return(r) => {
                self.stats.cancelled_pops += flow.pushes.len();
                match flow.bindings.apply_register(&r) {
                    Value::Reg(r2) => Block::Return(r2),
                    v => def(Pattern::Reg(r.clone()), v, Block::Return(r)),
                }
            }

            Block::Jump(bindings, target) => {
                let mut jump_bindings = flow.bindings.compose(&bindings);
                if let Some(needed) = self.needed.get(&target) {
                    jump_bindings.restrict(needed);
                }
                restore_pushes(flow.pushes, Block::Jump(jump_bindings, target))
            }

            Block::CaseToken(r, branches, default) => {
                let scrutinee = match flow.bindings.apply_register(&r) {
                    Value::Reg(r2) => r2,
                    v => panic!("token register {r} rewritten to non-register {v}"),
                };
                let branches = branches
                    .into_iter()
                    .map(|TokenBranch { pat, body }| {
                        let mut branch_flow = flow.clone();
                        let pat = match pat {
                            TokenPat::Single(tok, payload) => {
                                let payload = if branch_flow.any_push_reads(&payload) {
                                    let renamed = self.fresh.register(&payload);
                                    branch_flow
                                        .bindings
                                        .add(payload, Value::Reg(renamed.clone()));
                                    renamed
                                } else {
                                    branch_flow.bindings.remove_register(&payload);
                                    payload
                                };
                                TokenPat::Single(tok, payload)
                            }
                            multiple => multiple,
                        };
                        TokenBranch {
                            pat,
                            body: self.walk(branch_flow, body),
                        }
                    })
                    .collect();
                let default = default.map(|d| Box::new(self.walk(flow.clone(), *d)));
                Block::CaseToken(scrutinee, branches, default)
            }

            Block::CaseTag(r, branches) => match flow.bindings.apply_register(&r) {
                Value::Tag(t) => {
                    let count = branches.len();
                    let branch = branches
                        .into_iter()
                        .find(|br| br.tags.contains(&t))
                        .unwrap_or_else(|| panic!("no branch for known tag {t}"));
                    self.stats.eliminated_branches += count - 1;
                    self.refine(&mut flow, &[t].into_iter().collect());
                    comment("Eliminated case tag", self.walk(flow, branch.body))
                }
                Value::Reg(scrutinee) => {
                    let branches = branches
                        .into_iter()
                        .map(|TagBranch { tags, body }| {
                            let mut branch_flow = flow.clone();
                            self.refine(&mut branch_flow, &tags);
                            if tags.len() == 1 {
                                let tag = *tags.iter().next().expect("len was checked");
                                let known = Subst::singleton(scrutinee.clone(), Value::Tag(tag));
                                for dp in &mut branch_flow.pushes {
                                    dp.value = known.apply(&dp.value);
                                }
                            }
                            TagBranch {
                                tags,
                                body: self.walk(branch_flow, body),
                            }
                        })
                        .collect();
                    Block::CaseTag(scrutinee, branches)
                }
                v => panic!("tag register {r} rewritten to non-register {v}"),
            },

            Block::TypedBlock(t) => {
                let dropped = flow.pushes.len().min(t.stack_type.len());
                let mut stack_type = t.stack_type;
                stack_type.truncate(stack_type.len() - dropped);

                let mut needed_registers = flow.push_registers();
                for r in &t.needed_registers {
                    flow.bindings
                        .apply_register(r)
                        .collect_registers(&mut needed_registers);
                }

                let final_type = flow.final_type.or(t.final_type);
                flow.final_type = final_type;
                if stack_type.len() > flow.known_cells.len() {
                    flow.known_cells = stack_type.clone();
                }

                let inner = self.walk(flow, *t.block);
                Block::TypedBlock(TypedBlock {
                    block: Box::new(inner),
                    stack_type,
                    final_type,
                    needed_registers,
                    has_case_tag: t.has_case_tag,
                    name: t.name,
                })
            }
        }
    }

    /// Narrows the known stack cells and return type to what every state
    /// in `tags` guarantees.
    fn refine(&self, flow: &mut Flow, tags: &std::collections::BTreeSet<Tag>) {
        let mut iter = tags.iter();
        let Some(first) = iter.next() else { return };
        let Some(first_info) = self.states.get(first) else {
            return;
        };

        let mut cells = first_info.known_cells.clone();
        let mut final_type = first_info.final_type;
        for tag in iter {
            let Some(info) = self.states.get(tag) else {
                return;
            };
            cells = shared_top(&cells, &info.known_cells);
            if final_type != info.final_type {
                final_type = None;
            }
        }

        if cells.len() > flow.known_cells.len() {
            flow.known_cells = cells;
        }
        if flow.final_type.is_none() {
            flow.final_type = final_type;
        }
    }
}

/// Materializes delayed pushes in front of a terminal so the on-stack
/// layout matches the original program: oldest first, newest topmost.
fn restore_pushes(pushes: Vec<DelayedPush>, terminal: Block) -> Block {
    let mut block = terminal;
    for dp in pushes.into_iter().rev() {
        let note = format!("Restoring push_{}", dp.id);
        block = comment(note, Block::Push(dp.value, dp.cell, Box::new(block)));
    }
    block
}
