//! Normal-form types and refinement predicates.

use std::fmt;
use std::sync::Arc;

use crate::grammar::Grammar;
use crate::syntax::{parse_expr, Expr, ExprKind, SyntaxError};

/// A simple (unrefined) type.
#[derive(Debug, Clone)]
pub enum SimpleType {
    /// Supertype of everything; the argument type of polymorphic equality.
    Top,
    Int,
    Bool,
    String,
    Unit,
    List(Box<SimpleType>),
    Fun(Vec<SimpleType>, Box<SimpleType>),
    /// A grammar-constrained string type.
    Lang(Arc<Grammar>),
    /// Produced after a reported type error; compatible with everything so
    /// one mistake does not cascade.
    Error,
}

impl PartialEq for SimpleType {
    fn eq(&self, other: &Self) -> bool {
        use SimpleType::*;
        match (self, other) {
            (Top, Top) | (Int, Int) | (Bool, Bool) | (String, String) | (Unit, Unit)
            | (Error, Error) => true,
            (List(a), List(b)) => a == b,
            (Fun(args1, ret1), Fun(args2, ret2)) => args1 == args2 && ret1 == ret2,
            (Lang(g1), Lang(g2)) => g1.name() == g2.name(),
            _ => false,
        }
    }
}

impl fmt::Display for SimpleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimpleType::Top => write!(f, "top"),
            SimpleType::Int => write!(f, "int"),
            SimpleType::Bool => write!(f, "bool"),
            SimpleType::String => write!(f, "string"),
            SimpleType::Unit => write!(f, "unit"),
            SimpleType::List(elem) => write!(f, "[{elem}]"),
            SimpleType::Fun(args, ret) => {
                write!(f, "(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ") -> {ret}")
            }
            SimpleType::Lang(grammar) => write!(f, "{}", grammar.name()),
            SimpleType::Error => write!(f, "<error>"),
        }
    }
}

/// A refinement predicate: an expression over the single bound name `_`,
/// captured when the refinement is constructed and never re-parsed.
#[derive(Debug, Clone)]
pub struct Predicate {
    expr: Expr,
}

impl Predicate {
    pub fn new(expr: Expr) -> Self {
        Self { expr }
    }

    /// Parse a predicate from source text.
    pub fn parse(src: &str) -> Result<Self, SyntaxError> {
        Ok(Self::new(parse_expr(src)?))
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// The membership predicate `_ in lang`.
    pub fn membership(lang: &str) -> Self {
        Self::new(Expr {
            kind: ExprKind::InLang {
                receiver: Box::new(Expr::var("_")),
                lang: lang.to_string(),
            },
            span: crate::span::Span::dummy(),
        })
    }

    /// Conjoin two predicates.
    pub fn and(&self, other: &Predicate) -> Predicate {
        Self::new(Expr::infix("&&", self.expr.clone(), other.expr.clone()))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

/// A type in normal form: either simple, or a simple base refined by one
/// predicate. Refining a refinement conjoins predicates instead of nesting,
/// so the base of a refinement is always simple by construction.
#[derive(Debug, Clone)]
pub enum NormalForm {
    Simple(SimpleType),
    Refined { base: SimpleType, pred: Predicate },
}

impl NormalForm {
    /// The underlying simple type.
    pub fn base_type(&self) -> &SimpleType {
        match self {
            NormalForm::Simple(base) => base,
            NormalForm::Refined { base, .. } => base,
        }
    }

    /// Refine a normal form with one more predicate, flattening nested
    /// refinements by conjunction (inner predicate first).
    pub fn refined(self, pred: Predicate) -> NormalForm {
        match self {
            NormalForm::Simple(base) => NormalForm::Refined { base, pred },
            NormalForm::Refined {
                base,
                pred: inner,
            } => NormalForm::Refined {
                base,
                pred: inner.and(&pred),
            },
        }
    }
}

impl fmt::Display for NormalForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalForm::Simple(base) => write!(f, "{base}"),
            NormalForm::Refined { base, pred } => write!(f, "{{{base} | {pred}}}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refinement_flattening() {
        let nf = NormalForm::Simple(SimpleType::Int)
            .refined(Predicate::parse("_ > 0").unwrap())
            .refined(Predicate::parse("_ < 10").unwrap());
        assert_eq!(nf.to_string(), "{int | (_ > 0) && (_ < 10)}");
        assert_eq!(*nf.base_type(), SimpleType::Int);
    }

    #[test]
    fn test_display_types() {
        let t = SimpleType::Fun(
            vec![SimpleType::Int, SimpleType::String],
            Box::new(SimpleType::Bool),
        );
        assert_eq!(t.to_string(), "(int, string) -> bool");
        assert_eq!(
            SimpleType::List(Box::new(SimpleType::String)).to_string(),
            "[string]"
        );
    }
}
