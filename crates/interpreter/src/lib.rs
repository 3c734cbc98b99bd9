pub mod machine;
pub mod tester;

pub use machine::{Machine, MachineConfig, MachineValue, Outcome};
pub use tester::{
    run_differential, Mismatch, ReferenceInterpreter, SentenceSource, TestReport, TesterOptions,
};
