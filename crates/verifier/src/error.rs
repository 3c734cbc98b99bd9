//! Well-formedness violations.
//!
//! The IR is produced and transformed by code that is supposed to be
//! correct; a violation here means an earlier pass is buggy, so every
//! error is fatal for the caller.
use std::fmt;

use stacklang_ir::{Label, Register, RegisterSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("reference to undefined registers {{{}}} (defined: {{{}}})", DisplaySet(.undefined), DisplaySet(.defined))]
    UndefinedRegisters {
        undefined: RegisterSet,
        defined: RegisterSet,
    },

    #[error("register {0} bound twice in one pattern")]
    NonlinearPattern(Register),

    #[error("jump to a label absent from the control flow graph: {0}")]
    MissingLabel(Label),

    #[error(
        "jump to {target} does not define its needed registers {{{}}} (defined: {{{}}})",
        DisplaySet(.missing),
        DisplaySet(.defined)
    )]
    JumpNeedsUndefined {
        target: Label,
        missing: RegisterSet,
        defined: RegisterSet,
    },
}

/// A fatal verification failure, located at the cfg block it occurred in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ill-formed block {label}: {kind}")]
pub struct WellFormednessError {
    pub label: Label,
    pub kind: ErrorKind,
}

struct DisplaySet<'a>(&'a RegisterSet);

impl fmt::Display for DisplaySet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, r) in self.0.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{r}")?;
        }
        Ok(())
    }
}
