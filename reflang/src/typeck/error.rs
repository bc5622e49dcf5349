//! Type-checking errors, collected per pass with source positions.

use thiserror::Error;

use crate::path::PathError;
use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}")]
pub struct TypeError {
    pub kind: TypeErrorKind,
    pub span: Span,
}

impl TypeError {
    pub fn new(kind: TypeErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeErrorKind {
    #[error("undefined name `{0}`")]
    UndefinedName(String),

    #[error("`{0}` is already defined")]
    RedefinedName(String),

    /// Both sides are pretty-printed types.
    #[error("type mismatch: expect {expected}, but found {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("arity mismatch: expect {expected} argument(s), but given {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("expression of type {actual} is not a function")]
    NotAFunction { actual: String },

    #[error("expect a simple type, but found {actual}")]
    ExpectedSimpleType { actual: String },

    #[error("missing type annotation")]
    MissingAnnotation,

    #[error("invalid path: {0}")]
    InvalidPath(PathError),
}
