pub mod error;
pub mod verify;

pub use error::{ErrorKind, WellFormednessError};
pub use verify::{verify_block, verify_program};

#[cfg(test)]
mod tests {
    use stacklang_ir::{
        case_tag, def, jump, need, pop, prim, push, Block, Cell, Label, Nonterminal, Pattern,
        Primitive, Program, Register, RegisterSet, Subst, Tag, TagBranch, TypedBlock, Value,
    };

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
    fn well_formed_program_passes() {
        let body = push(
            Value::Reg(r("x")),
            Cell::state(),
            pop(
                Pattern::Reg(r("y")),
                def(
                    Pattern::Reg(r("z")),
                    Value::Reg(r("y")),
                    Block::Return(r("z")),
                ),
            ),
        );
        let program = single_block_program(regs(&["x"]), body);
        assert_eq!(verify_program(&program), Ok(()));
    }

    #[test]
    fn undefined_register_is_reported_with_context() {
        let body = push(Value::Reg(r("ghost")), Cell::state(), Block::Die);
        let program = single_block_program(RegisterSet::new(), body);
        let err = verify_program(&program).unwrap_err();
        assert_eq!(err.label, Label::new("run_main"));
        assert!(matches!(err.kind, ErrorKind::UndefinedRegisters { .. }));
        let msg = err.to_string();
        assert!(msg.contains("run_main"));
        assert!(msg.contains("ghost"));
    }

    #[test]
    fn need_replaces_the_defined_set() {
        // `x` is live, `need {}` kills it, the return must fail.
        let body = need(RegisterSet::new(), Block::Return(r("x")));
        let program = single_block_program(regs(&["x"]), body);
        assert!(verify_program(&program).is_err());
    }

    #[test]
    fn need_requires_its_registers_defined() {
        let body = need(regs(&["x", "y"]), Block::Die);
        let program = single_block_program(regs(&["x"]), body);
        assert!(verify_program(&program).is_err());
    }

    #[test]
    fn jump_to_missing_label_is_fatal() {
        let body = jump(Label::new("nowhere"));
        let program = single_block_program(RegisterSet::new(), body);
        let err = verify_program(&program).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::MissingLabel(_)));
    }

    #[test]
    fn jump_must_define_target_needs() {
        let mut program = Program::new();
        let l0 = Label::new("run_00");
        let l1 = Label::new("run_01");
        program
            .cfg
            .insert(l0.clone(), block(RegisterSet::new(), jump(l1.clone())));
        program
            .cfg
            .insert(l1.clone(), block(regs(&["tok"]), Block::Return(r("tok"))));
        program.entry.insert(Nonterminal(0), l0);

        let err = verify_program(&program).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::JumpNeedsUndefined { .. }));
    }

    #[test]
    fn jump_bindings_count_as_defining() {
        let mut program = Program::new();
        let l0 = Label::new("run_00");
        let l1 = Label::new("run_01");
        let bindings = Subst::singleton(r("tok"), Value::Unit);
        program.cfg.insert(
            l0.clone(),
            block(RegisterSet::new(), Block::Jump(bindings, l1.clone())),
        );
        program
            .cfg
            .insert(l1.clone(), block(regs(&["tok"]), Block::Return(r("tok"))));
        program.entry.insert(Nonterminal(0), l0);

        assert_eq!(verify_program(&program), Ok(()));
    }

    #[test]
    fn case_tag_scrutinee_must_be_defined() {
        let body = case_tag(
            r("s"),
            vec![TagBranch {
                tags: [Tag(0)].into_iter().collect(),
                body: Block::Die,
            }],
        );
        let program = single_block_program(RegisterSet::new(), body);
        assert!(verify_program(&program).is_err());
    }

    #[test]
    fn prim_defines_its_output() {
        let body = prim(
            r("out"),
            Primitive::HostCall("lex".into(), vec![Value::Reg(r("buf"))]),
            Block::Return(r("out")),
        );
        let program = single_block_program(regs(&["buf"]), body);
        assert_eq!(verify_program(&program), Ok(()));
    }
}
