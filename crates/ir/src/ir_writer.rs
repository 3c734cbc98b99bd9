//! Human-readable program dumps.
use std::{fmt, io};

use crate::block::{Block, Primitive, TagBranch, TokenBranch, TokenPat, TypedBlock};
use crate::program::Program;
use crate::subst::Subst;

impl fmt::Display for Subst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (r, v)) in self.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{r} = {v}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::HostCall(name, args) => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Primitive::FieldAccess(v, field) => write!(f, "{v}.{field}"),
            Primitive::DummyPos => write!(f, "dummy_pos"),
            Primitive::Action(id, bindings) => {
                if bindings.is_empty() {
                    write!(f, "{id}")
                } else {
                    write!(f, "{id} [{bindings}]")
                }
            }
        }
    }
}

pub struct ProgramWriter<'a> {
    program: &'a Program,
    level: usize,
}

impl<'a> ProgramWriter<'a> {
    pub fn new(program: &'a Program) -> Self {
        Self { program, level: 0 }
    }

    pub fn write(&mut self, mut w: impl io::Write) -> io::Result<()> {
        for (nt, label) in &self.program.entry {
            writeln!(w, "entry {nt} -> {label}")?;
        }
        for (label, typed) in &self.program.cfg {
            writeln!(w)?;
            self.write_typed_block_head(label.as_str(), typed, &mut w)?;
            self.level += 1;
            self.write_block(&typed.block, &mut w)?;
            self.level -= 1;
            writeln!(w, "}}")?;
        }
        Ok(())
    }

    pub fn dump_string(&mut self) -> String {
        let mut buf = Vec::new();
        self.write(&mut buf).expect("writing to a Vec cannot fail");
        String::from_utf8(buf).expect("program dumps are valid utf-8")
    }

    fn write_typed_block_head(
        &mut self,
        name: &str,
        typed: &TypedBlock,
        w: &mut impl io::Write,
    ) -> io::Result<()> {
        self.indent(w)?;
        write!(w, "block {name} (needs ")?;
        for (i, r) in typed.needed_registers.iter().enumerate() {
            if i != 0 {
                write!(w, ", ")?;
            }
            write!(w, "{r}")?;
        }
        write!(w, ")")?;
        if !typed.stack_type.is_empty() {
            write!(w, " stack")?;
            for cell in &typed.stack_type {
                write!(w, " {cell}")?;
            }
        }
        if let Some(final_type) = typed.final_type {
            write!(w, " -> {final_type}")?;
        }
        writeln!(w, " {{")
    }

    fn write_block(&mut self, block: &Block, w: &mut impl io::Write) -> io::Result<()> {
        match block {
            Block::Need(rs, k) => {
                self.indent(w)?;
                write!(w, "need {{")?;
                for (i, r) in rs.iter().enumerate() {
                    if i != 0 {
                        write!(w, ", ")?;
                    }
                    write!(w, "{r}")?;
                }
                writeln!(w, "}}")?;
                self.write_block(k, w)
            }
            Block::Push(v, cell, k) => {
                self.indent(w)?;
                writeln!(w, "push {v} {cell}")?;
                self.write_block(k, w)
            }
            Block::Pop(p, k) => {
                self.indent(w)?;
                writeln!(w, "pop {p}")?;
                self.write_block(k, w)
            }
            Block::Def(bindings, k) => {
                self.indent(w)?;
                writeln!(w, "def {bindings}")?;
                self.write_block(k, w)
            }
            Block::Prim(r, p, k) => {
                self.indent(w)?;
                writeln!(w, "{r} = prim {p}")?;
                self.write_block(k, w)
            }
            Block::Trace(msg, k) => {
                self.indent(w)?;
                writeln!(w, "trace {msg:?}")?;
                self.write_block(k, w)
            }
            Block::Comment(msg, k) => {
                self.indent(w)?;
                writeln!(w, "// {msg}")?;
                self.write_block(k, w)
            }
            Block::Die => {
                self.indent(w)?;
                writeln!(w, "die")
            }
            Block::Return(r) => {
                self.indent(w)?;
                writeln!(w, "return {r}")
            }
            Block::Jump(bindings, label) => {
                self.indent(w)?;
                if bindings.is_empty() {
                    writeln!(w, "jump {label}")
                } else {
                    writeln!(w, "jump {label} with {bindings}")
                }
            }
            Block::CaseToken(r, branches, default) => {
                self.indent(w)?;
                writeln!(w, "case token {r} {{")?;
                self.level += 1;
                for TokenBranch { pat, body } in branches {
                    self.indent(w)?;
                    match pat {
                        TokenPat::Single(tok, payload) => writeln!(w, "{tok}({payload}) ->")?,
                        TokenPat::Multiple(toks) => {
                            for (i, tok) in toks.iter().enumerate() {
                                if i != 0 {
                                    write!(w, " | ")?;
                                }
                                write!(w, "{tok}")?;
                            }
                            writeln!(w, " ->")?;
                        }
                    }
                    self.level += 1;
                    self.write_block(body, w)?;
                    self.level -= 1;
                }
                if let Some(d) = default {
                    self.indent(w)?;
                    writeln!(w, "_ ->")?;
                    self.level += 1;
                    self.write_block(d, w)?;
                    self.level -= 1;
                }
                self.level -= 1;
                self.indent(w)?;
                writeln!(w, "}}")
            }
            Block::CaseTag(r, branches) => {
                self.indent(w)?;
                writeln!(w, "case tag {r} {{")?;
                self.level += 1;
                for TagBranch { tags, body } in branches {
                    self.indent(w)?;
                    for (i, tag) in tags.iter().enumerate() {
                        if i != 0 {
                            write!(w, " | ")?;
                        }
                        write!(w, "{tag}")?;
                    }
                    writeln!(w, " ->")?;
                    self.level += 1;
                    self.write_block(body, w)?;
                    self.level -= 1;
                }
                self.level -= 1;
                self.indent(w)?;
                writeln!(w, "}}")
            }
            Block::TypedBlock(t) => {
                let name = t.name.as_deref().unwrap_or("<inlined>");
                self.write_typed_block_head(name, t, w)?;
                self.level += 1;
                self.write_block(&t.block, w)?;
                self.level -= 1;
                self.indent(w)?;
                writeln!(w, "}}")
            }
        }
    }

    fn indent(&self, w: &mut impl io::Write) -> io::Result<()> {
        for _ in 0..self.level {
            write!(w, "    ")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{jump, push, TypedBlock};
    use crate::cell::Cell;
    use crate::value::{Label, Nonterminal, RegisterSet, Tag, Value};

    #[test]
    fn dump_mentions_entries_and_labels() {
        let mut program = Program::new();
        let label = Label::new("run_main");
        program.entry.insert(Nonterminal(0), label.clone());
        program.cfg.insert(
            label,
            TypedBlock {
                block: Box::new(push(Value::Tag(Tag(3)), Cell::state(), jump(Label::new("run_main")))),
                stack_type: Vec::new(),
                final_type: None,
                needed_registers: RegisterSet::new(),
                has_case_tag: false,
                name: None,
            },
        );

        let dump = ProgramWriter::new(&program).dump_string();
        assert!(dump.contains("entry nt0 -> run_main"));
        assert!(dump.contains("push s3"));
        assert!(dump.contains("jump run_main"));
    }
}
