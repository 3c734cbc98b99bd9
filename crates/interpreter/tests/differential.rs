//! End-to-end: a hand-built automaton program for the grammar
//! `S -> b a`, optimized through the full pipeline and validated against
//! the reference interpreter before and after.
use primitive_types::U256;
use stacklang_interpreter::{
    run_differential, Machine, Outcome, ReferenceInterpreter, SentenceSource, TesterOptions,
};
use stacklang_ir::{
    case_token, def, jump, pop, prim, push, Block, Cell, Label, Nonterminal, Pattern, Primitive,
    Program, Register, RegisterSet, StateInfo, Tag, TagBranch, Terminal, TokenBranch, TokenPat,
    TypedBlock, Value,
};
use stacklang_opt::{Pipeline, Settings};
use stacklang_verifier::verify_program;

const A: Terminal = Terminal(0);
const B: Terminal = Terminal(1);
const START: Nonterminal = Nonterminal(0);

fn r(name: &str) -> Register {
    Register::new(name)
}

fn regs(names: &[&str]) -> RegisterSet {
    names.iter().map(|n| Register::new(*n)).collect()
}

fn typed(needed: RegisterSet, stack_type: Vec<Cell>, body: Block) -> TypedBlock {
    let has_case_tag = body.contains_case_tag();
    TypedBlock {
        block: Box::new(body),
        stack_type,
        final_type: None,
        needed_registers: needed,
        has_case_tag,
        name: None,
    }
}

fn fetch(into: &str, k: Block) -> Block {
    prim(
        r(into),
        Primitive::HostCall("discard".into(), vec![]),
        k,
    )
}

/// The automaton for `S -> b a`: shift `b` (state 7 over the bottom
/// state 0), shift `a`, then reduce by popping both states back off.
fn build_program() -> Program {
    let run_start = Label::new("run_start");
    let run_b = Label::new("run_b");
    let run_a = Label::new("run_a");
    let run_red = Label::new("run_red");

    let mut program = Program::new();

    program.cfg.insert(
        run_start.clone(),
        typed(
            RegisterSet::new(),
            Vec::new(),
            def(
                Pattern::Reg(r("res")),
                Value::Unit,
                push(
                    Value::Tag(Tag(0)),
                    Cell::state(),
                    fetch("tok", jump(run_b.clone())),
                ),
            ),
        ),
    );

    program.cfg.insert(
        run_b.clone(),
        typed(
            regs(&["tok", "res"]),
            vec![Cell::state()],
            case_token(
                r("tok"),
                vec![TokenBranch {
                    pat: TokenPat::Multiple([B].into_iter().collect()),
                    body: push(
                        Value::Tag(Tag(7)),
                        Cell::state(),
                        fetch("tok", jump(run_a.clone())),
                    ),
                }],
                Some(Block::Die),
            ),
        ),
    );

    program.cfg.insert(
        run_a.clone(),
        typed(
            regs(&["tok", "res"]),
            vec![Cell::state(), Cell::state()],
            case_token(
                r("tok"),
                vec![TokenBranch {
                    pat: TokenPat::Multiple([A].into_iter().collect()),
                    body: jump(run_red.clone()),
                }],
                Some(Block::Die),
            ),
        ),
    );

    program.cfg.insert(
        run_red.clone(),
        typed(
            regs(&["res"]),
            vec![Cell::state(), Cell::state()],
            pop(
                Pattern::Reg(r("s")),
                Block::CaseTag(
                    r("s"),
                    vec![TagBranch {
                        tags: [Tag(7)].into_iter().collect(),
                        body: pop(
                            Pattern::Reg(r("s2")),
                            Block::CaseTag(
                                r("s2"),
                                vec![TagBranch {
                                    tags: [Tag(0)].into_iter().collect(),
                                    body: Block::Return(r("res")),
                                }],
                            ),
                        ),
                    }],
                ),
            ),
        ),
    );

    program.entry.insert(START, run_start);
    program.states.insert(
        Tag(0),
        StateInfo {
            final_type: Some(START),
            known_cells: Vec::new(),
        },
    );
    program.states.insert(
        Tag(7),
        StateInfo {
            final_type: None,
            known_cells: vec![Cell::state()],
        },
    );
    program
}

struct Reference;

impl ReferenceInterpreter for Reference {
    fn run(&self, _entry: Nonterminal, sentence: &[Terminal], _trace: bool) -> Outcome {
        let mut input = sentence.iter();
        match input.next() {
            None => return Outcome::Overshoot,
            Some(t) if *t == B => {}
            Some(_) => return Outcome::Rejected,
        }
        match input.next() {
            None => Outcome::Overshoot,
            Some(t) if *t == A => Outcome::Accepted,
            Some(_) => Outcome::Rejected,
        }
    }
}

struct Sentences;

impl SentenceSource for Sentences {
    fn count(&self, _entry: Nonterminal, length: usize) -> U256 {
        // The grammar has exactly one sentence, `b a`.
        U256::from(usize::from(length == 2))
    }

    fn sentence(&self, _entry: Nonterminal, _length: usize, _index: U256) -> Vec<Terminal> {
        vec![B, A]
    }
}

fn outcomes(program: &Program) -> Vec<Outcome> {
    let machine = Machine::new(program);
    [
        vec![],
        vec![A],
        vec![B],
        vec![B, A],
        vec![B, B],
        vec![A, A],
    ]
    .iter()
    .map(|sentence| machine.run(START, sentence))
    .collect()
}

#[test]
fn the_source_program_is_well_formed() {
    assert_eq!(verify_program(&build_program()), Ok(()));
}

#[test]
fn machine_outcomes_match_the_reference() {
    let program = build_program();
    let machine = Machine::new(&program);
    assert_eq!(machine.run(START, &[B, A]), Outcome::Accepted);
    assert_eq!(machine.run(START, &[B, B]), Outcome::Rejected);
    assert_eq!(machine.run(START, &[A]), Outcome::Rejected);
    assert_eq!(machine.run(START, &[B]), Outcome::Overshoot);
    assert_eq!(machine.run(START, &[]), Outcome::Overshoot);
}

#[test]
fn optimization_preserves_every_outcome() {
    let mut program = build_program();
    let before = outcomes(&program);
    let pushes_before = program.push_count();
    let entries_before = program.entry.clone();

    let settings = Settings {
        commute_pushes: true,
        ..Settings::default()
    };
    Pipeline::for_settings(&settings).run(&mut program, &settings);

    assert_eq!(program.entry, entries_before);
    assert_eq!(verify_program(&program), Ok(()));
    assert!(program.push_count() <= pushes_before);
    assert_eq!(outcomes(&program), before);
}

#[test]
fn the_whole_automaton_collapses_into_the_entry_block() {
    // Every non-entry label is single-use, so inlining merges the chain
    // and commutation cancels both pushes against the reduction pops.
    let mut program = build_program();
    let settings = Settings {
        commute_pushes: true,
        ..Settings::default()
    };
    Pipeline::for_settings(&settings).run(&mut program, &settings);

    assert_eq!(program.cfg.len(), 1);
    assert_eq!(program.push_count(), 0);
}

#[test]
fn differential_passes_before_and_after_optimization() {
    let mut program = build_program();
    let opts = TesterOptions::default();

    let report = run_differential(&program, &Reference, &Sentences, &opts)
        .expect("the source program matches the reference");
    assert_eq!(report.tested, 1);

    let settings = Settings {
        commute_pushes: true,
        ..Settings::default()
    };
    Pipeline::for_settings(&settings).run(&mut program, &settings);

    let report = run_differential(&program, &Reference, &Sentences, &opts)
        .expect("the optimized program matches the reference");
    assert_eq!(report.tested, 1);
}
