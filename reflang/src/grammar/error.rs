//! Grammar-definition errors.
//!
//! Violations are collected across a whole rule set and reported together;
//! any error makes that grammar's compilation fail, without affecting other
//! grammars.

use thiserror::Error;

use crate::span::Span;

/// A single grammar-definition error, tied to its source location.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}")]
pub struct GrammarError {
    pub kind: GrammarErrorKind,
    pub span: Span,
}

impl GrammarError {
    pub fn new(kind: GrammarErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GrammarErrorKind {
    #[error("rule `{0}` is defined more than once")]
    RedefinedRule(String),

    #[error("missing start rule")]
    MissingStartRule,

    #[error("rule `{0}` is defined but never used")]
    UnusedRule(String),

    #[error("undefined symbol `{0}`")]
    UndefinedSymbol(String),

    #[error("the start rule cannot be referenced inside a rule body")]
    StartReference,

    #[error("invalid character range: `{hi}` must be greater than `{lo}`")]
    InvalidCharRange { lo: char, hi: char },

    #[error("repetition of exactly {0} is redundant")]
    RedundantRepetition(u32),

    #[error("invalid repetition bound: upper bound {upper} must be greater than lower bound {lower}")]
    InvalidRepetitionBound { lower: u32, upper: u32 },
}
