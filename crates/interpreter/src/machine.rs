//! The StackLang machine.
//!
//! Interprets a program over a sentence of terminals, tracking only what
//! the differential tester can observe: whether the run accepts,
//! rejects, or runs off the end of the input. Host primitives are
//! opaque, except the designated token-fetch call which feeds terminals
//! from the sentence.
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use stacklang_ir::{
    Block, Label, Nonterminal, Pattern, Primitive, Program, Register, Terminal, TokenPat,
};

/// What one interpreter run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accepted,
    Rejected,
    /// The parser demanded a token past the end of the sentence.
    Overshoot,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Accepted => write!(f, "accepted"),
            Outcome::Rejected => write!(f, "rejected"),
            Outcome::Overshoot => write!(f, "overshoot"),
        }
    }
}

/// A value a register or stack cell can hold at run time. Semantic
/// payloads are opaque; only tags and tokens drive control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineValue {
    Tag(stacklang_ir::Tag),
    Token(Terminal),
    Tuple(Vec<MachineValue>),
    Unit,
    Opaque,
}

#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Name of the host call that yields the next token.
    pub fetch_token: SmolStr,
    pub trace: bool,
    /// Fuel; exhausting it means a pass introduced divergence.
    pub max_steps: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            fetch_token: "discard".into(),
            trace: false,
            max_steps: 1_000_000,
        }
    }
}

pub struct Machine<'a> {
    program: &'a Program,
    config: MachineConfig,
}

enum Step<'a> {
    Done(Outcome),
    Goto(&'a Label),
}

struct RunState<'a> {
    regs: FxHashMap<Register, MachineValue>,
    stack: Vec<MachineValue>,
    input: std::slice::Iter<'a, Terminal>,
    steps: usize,
}

impl<'a> Machine<'a> {
    pub fn new(program: &'a Program) -> Self {
        Self::with_config(program, MachineConfig::default())
    }

    pub fn with_config(program: &'a Program, config: MachineConfig) -> Self {
        Self { program, config }
    }

    /// Runs the program from `entry` over `sentence`.
    pub fn run(&self, entry: Nonterminal, sentence: &[Terminal]) -> Outcome {
        let mut label = self
            .program
            .entry
            .get(&entry)
            .unwrap_or_else(|| panic!("no entry point for {entry}"));
        let mut state = RunState {
            regs: FxHashMap::default(),
            stack: Vec::new(),
            input: sentence.iter(),
            steps: 0,
        };

        loop {
            let typed = self
                .program
                .block(label)
                .unwrap_or_else(|| panic!("jump to missing label {label}"));
            match self.exec(&mut state, &typed.block) {
                Step::Done(outcome) => return outcome,
                Step::Goto(next) => label = next,
            }
        }
    }

    fn exec(&self, st: &mut RunState<'_>, block: &'a Block) -> Step<'a> {
        let mut cur = block;
        loop {
            st.steps += 1;
            assert!(
                st.steps <= self.config.max_steps,
                "interpreter exceeded {} steps",
                self.config.max_steps
            );

            match cur {
                Block::Need(rs, k) => {
                    st.regs.retain(|r, _| rs.contains(r));
                    cur = k;
                }
                Block::Push(v, _, k) => {
                    let value = self.eval(st, v);
                    st.stack.push(value);
                    cur = k;
                }
                Block::Pop(p, k) => {
                    let value = st.stack.pop().expect("pop on an empty stack");
                    self.bind(st, p, value);
                    cur = k;
                }
                Block::Def(bindings, k) => {
                    self.assign(st, bindings);
                    cur = k;
                }
                Block::Prim(r, p, k) => match self.eval_prim(st, p) {
                    Ok(value) => {
                        st.regs.insert(r.clone(), value);
                        cur = k;
                    }
                    Err(outcome) => return Step::Done(outcome),
                },
                Block::Trace(msg, k) => {
                    if self.config.trace {
                        eprintln!("{msg}");
                    }
                    cur = k;
                }
                Block::Comment(_, k) => cur = k,
                Block::Die => return Step::Done(Outcome::Rejected),
                Block::Return(_) => return Step::Done(Outcome::Accepted),
                Block::Jump(bindings, target) => {
                    self.assign(st, bindings);
                    return Step::Goto(target);
                }
                Block::CaseToken(r, branches, default) => {
                    let tok = match &st.regs[r] {
                        MachineValue::Token(t) => *t,
                        other => panic!("case token on non-token value {other:?}"),
                    };
                    let mut taken = None;
                    for branch in branches {
                        match &branch.pat {
                            TokenPat::Single(t, payload) if *t == tok => {
                                st.regs.insert(payload.clone(), MachineValue::Opaque);
                                taken = Some(&branch.body);
                                break;
                            }
                            TokenPat::Multiple(ts) if ts.contains(&tok) => {
                                taken = Some(&branch.body);
                                break;
                            }
                            _ => {}
                        }
                    }
                    match taken.or(default.as_deref()) {
                        Some(body) => cur = body,
                        None => return Step::Done(Outcome::Rejected),
                    }
                }
                Block::CaseTag(r, branches) => {
                    let tag = match &st.regs[r] {
                        MachineValue::Tag(t) => *t,
                        other => panic!("case tag on non-tag value {other:?}"),
                    };
                    let branch = branches
                        .iter()
                        .find(|br| br.tags.contains(&tag))
                        .unwrap_or_else(|| panic!("no branch for tag {tag}"));
                    cur = &branch.body;
                }
                Block::TypedBlock(t) => cur = &t.block,
            }
        }
    }

    fn eval(&self, st: &RunState<'_>, v: &stacklang_ir::Value) -> MachineValue {
        match v {
            stacklang_ir::Value::Tag(t) => MachineValue::Tag(*t),
            stacklang_ir::Value::Reg(r) => st
                .regs
                .get(r)
                .cloned()
                .unwrap_or_else(|| panic!("read of undefined register {r}")),
            stacklang_ir::Value::Tuple(vs) => {
                MachineValue::Tuple(vs.iter().map(|v| self.eval(st, v)).collect())
            }
            stacklang_ir::Value::Unit => MachineValue::Unit,
        }
    }

    fn bind(&self, st: &mut RunState<'_>, p: &Pattern, value: MachineValue) {
        match (p, value) {
            (Pattern::Wildcard, _) => {}
            (Pattern::Reg(r), value) => {
                st.regs.insert(r.clone(), value);
            }
            (Pattern::Tuple(ps), MachineValue::Tuple(vs)) => {
                assert_eq!(ps.len(), vs.len(), "tuple arity mismatch at a pop");
                for (p, v) in ps.iter().zip(vs) {
                    self.bind(st, p, v);
                }
            }
            (Pattern::Tuple(_), value) => {
                panic!("popped non-tuple value {value:?} into a tuple pattern")
            }
        }
    }

    /// Simultaneous assignment: every right-hand side is evaluated
    /// before any register changes.
    fn assign(&self, st: &mut RunState<'_>, bindings: &stacklang_ir::Subst) {
        let values: Vec<(Register, MachineValue)> = bindings
            .iter()
            .map(|(r, v)| (r.clone(), self.eval(st, v)))
            .collect();
        for (r, v) in values {
            st.regs.insert(r, v);
        }
    }

    fn eval_prim(&self, st: &mut RunState<'_>, p: &Primitive) -> Result<MachineValue, Outcome> {
        match p {
            Primitive::HostCall(name, _) if *name == self.config.fetch_token => {
                match st.input.next() {
                    Some(tok) => Ok(MachineValue::Token(*tok)),
                    None => Err(Outcome::Overshoot),
                }
            }
            Primitive::HostCall(..)
            | Primitive::FieldAccess(..)
            | Primitive::DummyPos
            | Primitive::Action(..) => Ok(MachineValue::Opaque),
        }
    }
}
