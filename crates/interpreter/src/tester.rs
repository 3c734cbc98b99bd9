//! Differential validation against the reference LR(1) interpreter.
//!
//! Sentences are sampled per entry symbol and per length. Sentence sets
//! are counted as 256-bit integers because they grow exponentially with
//! length; when a length holds more sentences than the sample budget,
//! distinct indices are drawn with a deterministic generator seeded from
//! the entry and the length, so a failing sample reproduces.
use primitive_types::U256;
use stacklang_ir::{Nonterminal, Program, Terminal};
use thiserror::Error;

use crate::machine::{Machine, MachineConfig, Outcome};

/// The grammar's reference LR(1) interpreter, supplied by upstream.
pub trait ReferenceInterpreter {
    fn run(&self, entry: Nonterminal, sentence: &[Terminal], trace: bool) -> Outcome;
}

/// The upstream sentence generator: the lazy set of sentences of each
/// length, per entry symbol.
pub trait SentenceSource {
    fn count(&self, entry: Nonterminal, length: usize) -> U256;
    fn sentence(&self, entry: Nonterminal, length: usize, index: U256) -> Vec<Terminal>;
}

#[derive(Debug, Clone)]
pub struct TesterOptions {
    /// Largest sentence length tried. Grammars whose shortest sentence
    /// is longer than this are silently not exercised.
    pub max_length: usize,
    /// Global cap on tested sentences, across entries and lengths.
    pub max_sentences: usize,
    /// Per-length sample size.
    pub sample_per_length: usize,
    /// The grammar declares an error-recovery token; the StackLang
    /// interpreter cannot model recovery, so the test is skipped.
    pub uses_error_token: bool,
    pub machine: MachineConfig,
}

impl Default for TesterOptions {
    fn default() -> Self {
        Self {
            max_length: 100,
            max_sentences: 1000,
            sample_per_length: 100,
            uses_error_token: false,
            machine: MachineConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestReport {
    pub tested: usize,
    pub skipped: bool,
}

/// A sentence on which the two interpreters disagree. Fatal: the
/// optimized program is not equivalent to the reference automaton.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "differential mismatch on {entry}, sentence [{}]: reference {reference}, stacklang {stacklang}",
    DisplaySentence(.sentence)
)]
pub struct Mismatch {
    pub entry: Nonterminal,
    pub sentence: Vec<Terminal>,
    pub reference: Outcome,
    pub stacklang: Outcome,
}

struct DisplaySentence<'a>(&'a Vec<Terminal>);

impl std::fmt::Display for DisplaySentence<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, t) in self.0.iter().enumerate() {
            if i != 0 {
                write!(f, " ")?;
            }
            write!(f, "{t}")?;
        }
        Ok(())
    }
}

/// Compares the StackLang interpretation of `program` against the
/// reference interpreter on sampled sentences. Stops at the first
/// mismatch.
pub fn run_differential(
    program: &Program,
    reference: &dyn ReferenceInterpreter,
    sentences: &dyn SentenceSource,
    opts: &TesterOptions,
) -> Result<TestReport, Mismatch> {
    if opts.uses_error_token {
        return Ok(TestReport {
            tested: 0,
            skipped: true,
        });
    }

    let machine = Machine::with_config(program, opts.machine.clone());
    let mut tested = 0;

    'entries: for &entry in program.entry.keys() {
        for length in 0..=opts.max_length {
            if tested >= opts.max_sentences {
                break 'entries;
            }

            let count = sentences.count(entry, length);
            if count.is_zero() {
                continue;
            }

            let budget = (opts.max_sentences - tested).min(opts.sample_per_length);
            for index in sample_indices(entry, length, count, budget) {
                let sentence = sentences.sentence(entry, length, index);
                check(&machine, reference, entry, sentence, opts)?;
                tested += 1;
            }
        }
    }

    Ok(TestReport {
        tested,
        skipped: false,
    })
}

fn check(
    machine: &Machine<'_>,
    reference: &dyn ReferenceInterpreter,
    entry: Nonterminal,
    sentence: Vec<Terminal>,
    opts: &TesterOptions,
) -> Result<(), Mismatch> {
    let expected = reference.run(entry, &sentence, opts.machine.trace);
    let actual = machine.run(entry, &sentence);
    if expected == actual {
        Ok(())
    } else {
        Err(Mismatch {
            entry,
            sentence,
            reference: expected,
            stacklang: actual,
        })
    }
}

/// At most `budget` distinct indices below `count`. Small sets are
/// enumerated in full; large ones are sampled without reconstructing
/// the set.
fn sample_indices(entry: Nonterminal, length: usize, count: U256, budget: usize) -> Vec<U256> {
    if count <= U256::from(budget) {
        let count = count.as_usize();
        return (0..count).map(U256::from).collect();
    }

    let mut rng = Xorshift::seeded(entry, length);
    let mut picked = std::collections::BTreeSet::new();
    while picked.len() < budget {
        picked.insert(rng.next_u256() % count);
    }
    picked.into_iter().collect()
}

/// xorshift64*, seeded through splitmix so nearby entries and lengths
/// do not correlate.
struct Xorshift(u64);

impl Xorshift {
    fn seeded(entry: Nonterminal, length: usize) -> Self {
        let mut seed = ((entry.0 as u64) << 32) ^ length as u64;
        seed = seed.wrapping_add(0x9e37_79b9_7f4a_7c15);
        seed = (seed ^ (seed >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        seed = (seed ^ (seed >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        Self(seed ^ (seed >> 31) | 1)
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    fn next_u256(&mut self) -> U256 {
        let words = [
            self.next_u64(),
            self.next_u64(),
            self.next_u64(),
            self.next_u64(),
        ];
        U256(words)
    }
}
