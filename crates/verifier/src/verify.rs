//! The register-definedness walk.
use stacklang_ir::{
    Block, Label, Pattern, Program, RegisterSet, Subst, TokenPat, TypedBlock,
};

use crate::error::{ErrorKind, WellFormednessError};

/// Checks every block of the program. Returns the first violation found;
/// callers treat any error as fatal.
pub fn verify_program(program: &Program) -> Result<(), WellFormednessError> {
    for (label, typed) in &program.cfg {
        let checker = Checker { program, label };
        checker.check_typed_entry(typed)?;
    }
    Ok(())
}

/// Checks a single block against an initial defined set. Used by passes
/// that want to validate a block they just rebuilt.
pub fn verify_block(
    program: &Program,
    label: &Label,
    block: &Block,
    defined: RegisterSet,
) -> Result<(), WellFormednessError> {
    Checker { program, label }.check(block, defined)
}

struct Checker<'a> {
    program: &'a Program,
    label: &'a Label,
}

impl Checker<'_> {
    fn check_typed_entry(&self, typed: &TypedBlock) -> Result<(), WellFormednessError> {
        self.check(&typed.block, typed.needed_registers.clone())
    }

    fn check(&self, block: &Block, mut defined: RegisterSet) -> Result<(), WellFormednessError> {
        match block {
            Block::Need(rs, k) => {
                self.require_subset(rs, &defined)?;
                self.check(k, rs.clone())
            }
            Block::Push(v, _, k) => {
                self.require_subset(&v.registers(), &defined)?;
                self.check(k, defined)
            }
            Block::Pop(p, k) => {
                self.require_linear(p)?;
                defined.extend(p.registers());
                self.check(k, defined)
            }
            Block::Def(bindings, k) => {
                self.require_subset(&bindings.codomain_registers(), &defined)?;
                defined.extend(bindings.domain().cloned());
                self.check(k, defined)
            }
            Block::Prim(r, p, k) => {
                self.require_subset(&p.registers(), &defined)?;
                defined.insert(r.clone());
                self.check(k, defined)
            }
            Block::Trace(_, k) | Block::Comment(_, k) => self.check(k, defined),
            Block::Die => Ok(()),
            Block::Return(r) => {
                self.require_subset(&[r.clone()].into_iter().collect(), &defined)
            }
            Block::Jump(bindings, target) => self.check_jump(bindings, target, &defined),
            Block::CaseToken(r, branches, default) => {
                self.require_subset(&[r.clone()].into_iter().collect(), &defined)?;
                for branch in branches {
                    let mut branch_defined = defined.clone();
                    if let TokenPat::Single(_, payload) = &branch.pat {
                        branch_defined.insert(payload.clone());
                    }
                    self.check(&branch.body, branch_defined)?;
                }
                if let Some(d) = default {
                    self.check(d, defined)?;
                }
                Ok(())
            }
            Block::CaseTag(r, branches) => {
                self.require_subset(&[r.clone()].into_iter().collect(), &defined)?;
                for branch in branches {
                    self.check(&branch.body, defined.clone())?;
                }
                Ok(())
            }
            Block::TypedBlock(t) => {
                self.require_subset(&t.needed_registers, &defined)?;
                self.check(&t.block, t.needed_registers.clone())
            }
        }
    }

    fn check_jump(
        &self,
        bindings: &Subst,
        target: &Label,
        defined: &RegisterSet,
    ) -> Result<(), WellFormednessError> {
        self.require_subset(&bindings.codomain_registers(), defined)?;

        let Some(needed) = self.program.needed(target) else {
            return Err(self.error(ErrorKind::MissingLabel(target.clone())));
        };

        let mut defined_at_target = defined.clone();
        defined_at_target.extend(bindings.domain().cloned());
        let missing: RegisterSet = needed.difference(&defined_at_target).cloned().collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(self.error(ErrorKind::JumpNeedsUndefined {
                target: target.clone(),
                missing,
                defined: defined.clone(),
            }))
        }
    }

    fn require_linear(&self, p: &Pattern) -> Result<(), WellFormednessError> {
        match p.duplicate_register() {
            None => Ok(()),
            Some(r) => Err(self.error(ErrorKind::NonlinearPattern(r))),
        }
    }

    fn require_subset(
        &self,
        wanted: &RegisterSet,
        defined: &RegisterSet,
    ) -> Result<(), WellFormednessError> {
        let undefined: RegisterSet = wanted.difference(defined).cloned().collect();
        if undefined.is_empty() {
            Ok(())
        } else {
            Err(self.error(ErrorKind::UndefinedRegisters {
                undefined,
                defined: defined.clone(),
            }))
        }
    }

    fn error(&self, kind: ErrorKind) -> WellFormednessError {
        WellFormednessError {
            label: self.label.clone(),
            kind,
        }
    }
}
