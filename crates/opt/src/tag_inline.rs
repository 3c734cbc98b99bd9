//! Tag propagation.
//!
//! A definition binding a register to a constant `Tag` is absorbed into
//! a substitution carried down the block, so later reads of the register
//! see the constant and a later `CaseTag` dispatch can be resolved
//! statically by the commutation pass. Absorbed definitions are restored
//! right before any consumer the substitution cannot reach into: jumps
//! (restricted to the target's needed set), returns, primitives reading
//! a substituted register, case scrutinees, and typed blocks that
//! dispatch on tags (full flush).
//!
//! Tag-valued definitions are single-assignment along any control-flow
//! path, which is what makes the absorption sound.
use rustc_hash::FxHashMap;

use stacklang_ir::{
    def_bindings, Block, Label, Pattern, Program, Register, RegisterSet, Subst, TagBranch,
    TokenBranch, TokenPat, TypedBlock, Value,
};

pub fn inline_tags(program: &mut Program) {
    let needed: FxHashMap<Label, RegisterSet> = program
        .cfg
        .iter()
        .map(|(label, typed)| (label.clone(), typed.needed_registers.clone()))
        .collect();

    let inliner = TagInliner { needed: &needed };
    for typed in program.cfg.values_mut() {
        let body = std::mem::replace(&mut *typed.block, Block::Die);
        *typed.block = inliner.walk(Subst::new(), body);
    }
}

struct TagInliner<'a> {
    needed: &'a FxHashMap<Label, RegisterSet>,
}

impl TagInliner<'_> {
    fn walk(&self, mut s: Subst, block: Block) -> Block {
        match block {
            Block::Def(bindings, k) => {
                let mut tags = Subst::new();
                let mut rest = Subst::new();
                for (r, v) in bindings.iter() {
                    let v = s.apply(v);
                    if matches!(v, Value::Tag(_)) {
                        tags.add(r.clone(), v);
                    } else {
                        rest.add(r.clone(), v);
                    }
                }
                for r in bindings.domain() {
                    s.remove_register(r);
                }
                let s = s.compose(&tags);
                def_bindings(rest, self.walk(s, *k))
            }

            Block::Push(v, cell, k) => {
                let v = s.apply(&v);
                Block::Push(v, cell, Box::new(self.walk(s, *k)))
            }

            Block::Pop(p, k) => {
                s.remove(&p);
                Block::Pop(p, Box::new(self.walk(s, *k)))
            }

            Block::Prim(r, p, k) => {
                // A primitive argument is an opaque host read; restore
                // any substituted register it mentions.
                let restored = s.split_off(&p.registers());
                s.remove_register(&r);
                restored.restore_defs(Block::Prim(r, p, Box::new(self.walk(s, *k))))
            }

            Block::Need(rs, k) => {
                s.restrict(&rs);
                let rs: RegisterSet = rs.into_iter().filter(|r| !s.contains(r)).collect();
                Block::Need(rs, Box::new(self.walk(s, *k)))
            }

            Block::Return(r) => {
                let keep: RegisterSet = [r.clone()].into_iter().collect();
                s.tight_restore_defs(&keep, Block::Return(r))
            }

            Block::Jump(bindings, target) => {
                let bindings: Subst = bindings
                    .iter()
                    .map(|(r, v)| (r.clone(), s.apply(v)))
                    .collect();
                let needed = self
                    .needed
                    .get(&target)
                    .cloned()
                    .unwrap_or_default();
                s.tight_restore_defs(&needed, Block::Jump(bindings, target))
            }

            Block::CaseToken(r, branches, default) => {
                let restored = self.restore_scrutinee(&mut s, &r);
                let branches = branches
                    .into_iter()
                    .map(|TokenBranch { pat, body }| {
                        let mut branch_s = s.clone();
                        if let TokenPat::Single(_, payload) = &pat {
                            branch_s.remove_register(payload);
                        }
                        TokenBranch {
                            pat,
                            body: self.walk(branch_s, body),
                        }
                    })
                    .collect();
                let default = default.map(|d| Box::new(self.walk(s.clone(), *d)));
                restored.restore_defs(Block::CaseToken(r, branches, default))
            }

            Block::CaseTag(r, branches) => {
                let restored = self.restore_scrutinee(&mut s, &r);
                let branches = branches
                    .into_iter()
                    .map(|TagBranch { tags, body }| TagBranch {
                        tags,
                        body: self.walk(s.clone(), body),
                    })
                    .collect();
                restored.restore_defs(Block::CaseTag(r, branches))
            }

            Block::TypedBlock(mut t) if t.has_case_tag => {
                t.block = Box::new(self.walk(Subst::new(), *t.block));
                s.restore_defs(Block::TypedBlock(t))
            }

            Block::TypedBlock(mut t) => {
                s.restrict(&t.needed_registers);
                t.needed_registers = t
                    .needed_registers
                    .into_iter()
                    .filter(|r| !s.contains(r))
                    .collect();
                t.block = Box::new(self.walk(s, *t.block));
                Block::TypedBlock(t)
            }

            other => {
                let s = &s;
                other.map_children(&mut |k| self.walk(s.clone(), k))
            }
        }
    }

    /// Takes the rule for a case scrutinee out of the substitution so it
    /// can be rebound right before the dispatch.
    fn restore_scrutinee(&self, s: &mut Subst, r: &Register) -> Subst {
        s.split_off(&[r.clone()].into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use stacklang_ir::{
        case_tag, def, jump, need, pop, push, Block, Cell, Label, Nonterminal, Pattern, Program,
        Register, RegisterSet, Tag, TagBranch, TypedBlock, Value,
    };
    use stacklang_verifier::verify_program;

    use super::*;

    fn r(name: &str) -> Register {
        Register::new(name)
    }

    fn regs(names: &[&str]) -> RegisterSet {
        names.iter().map(|n| Register::new(*n)).collect()
    }

    fn block(needed: RegisterSet, body: Block) -> TypedBlock {
        TypedBlock {
            block: Box::new(body),
            stack_type: Vec::new(),
            final_type: None,
            needed_registers: needed,
            has_case_tag: false,
            name: None,
        }
    }

    fn single_block_program(needed: RegisterSet, body: Block) -> Program {
        let mut program = Program::new();
        let label = Label::new("run_main");
        program.cfg.insert(label.clone(), block(needed, body));
        program.entry.insert(Nonterminal(0), label);
        program
    }

    #[test]
    fn tag_defs_flow_into_pushes() {
        let body = def(
            Pattern::Reg(r("s")),
            Value::Tag(Tag(7)),
            push(Value::Reg(r("s")), Cell::state(), Block::Die),
        );
        let mut program = single_block_program(RegisterSet::new(), body);
        inline_tags(&mut program);

        let expected = push(Value::Tag(Tag(7)), Cell::state(), Block::Die);
        assert_eq!(program.cfg[&Label::new("run_main")].block.clone().strip_comments(), expected);
        assert_eq!(verify_program(&program), Ok(()));
    }

    #[test]
    fn dropped_defs_are_restored_before_jumps() {
        let mut program = Program::new();
        let l0 = Label::new("run_00");
        let l1 = Label::new("run_01");
        let body = def(Pattern::Reg(r("s")), Value::Tag(Tag(3)), jump(l1.clone()));
        program.cfg.insert(l0.clone(), block(RegisterSet::new(), body));
        program
            .cfg
            .insert(l1.clone(), block(regs(&["s"]), Block::Return(r("s"))));
        program.entry.insert(Nonterminal(0), l0.clone());
        program.entry.insert(Nonterminal(1), l1.clone());

        inline_tags(&mut program);
        assert_eq!(verify_program(&program), Ok(()));

        // The def survives (restored tight) because the target needs `s`.
        match &*program.cfg[&l0].block {
            Block::Def(bindings, k) => {
                assert_eq!(bindings.get(&r("s")), Some(&Value::Tag(Tag(3))));
                assert!(matches!(**k, Block::Jump(..)));
            }
            other => panic!("expected restored def, got {other:?}"),
        }
    }

    #[test]
    fn scrutinee_is_rebound_before_case_tag() {
        let body = def(
            Pattern::Reg(r("s")),
            Value::Tag(Tag(7)),
            case_tag(
                r("s"),
                vec![TagBranch {
                    tags: [Tag(7)].into_iter().collect(),
                    body: Block::Die,
                }],
            ),
        );
        let mut program = single_block_program(RegisterSet::new(), body);
        inline_tags(&mut program);
        assert_eq!(verify_program(&program), Ok(()));

        match &*program.cfg[&Label::new("run_main")].block {
            Block::Def(bindings, k) => {
                assert_eq!(bindings.get(&r("s")), Some(&Value::Tag(Tag(7))));
                assert!(matches!(**k, Block::CaseTag(..)));
            }
            other => panic!("expected restored def, got {other:?}"),
        }
    }

    #[test]
    fn need_sets_shrink_by_absorbed_registers() {
        let body = def(
            Pattern::Reg(r("s")),
            Value::Tag(Tag(1)),
            need(
                regs(&["s", "x"]),
                push(Value::Reg(r("s")), Cell::state(), Block::Die),
            ),
        );
        let mut program = single_block_program(regs(&["x"]), body);
        inline_tags(&mut program);
        assert_eq!(verify_program(&program), Ok(()));

        match &*program.cfg[&Label::new("run_main")].block {
            Block::Need(rs, _) => assert_eq!(rs, &regs(&["x"])),
            other => panic!("expected a need, got {other:?}"),
        }
    }

    #[test]
    fn idempotent_up_to_comments() {
        let mut program = Program::new();
        let l0 = Label::new("run_00");
        let l1 = Label::new("run_01");
        let body = def(
            Pattern::Reg(r("s")),
            Value::Tag(Tag(3)),
            pop(Pattern::Reg(r("v")), jump(l1.clone())),
        );
        program.cfg.insert(l0.clone(), block(RegisterSet::new(), body));
        program
            .cfg
            .insert(l1.clone(), block(regs(&["s", "v"]), Block::Return(r("v"))));
        program.entry.insert(Nonterminal(0), l0.clone());
        program.entry.insert(Nonterminal(1), l1.clone());

        inline_tags(&mut program);
        let once = program.clone();
        inline_tags(&mut program);
        assert_eq!(program, once);
    }
}
