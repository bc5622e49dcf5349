//! The typed string/integer constraint theory emitted by the translator.
//!
//! Terms are sorted (`Formula` / `Int` / `String`); the translator only
//! builds well-sorted terms, so consumers can trust [`SmtExpr::sort`].
//! `Display` renders the solver's concrete syntax: SMT-style prefix
//! applications for theory functions, infix connectives, and tree
//! quantifiers of the form `(forall <sym> v in r: body)` with the
//! structural predicates `direct_child` and `kth_child`.

use std::fmt;

use crate::path::Step;

/// The sort of a constraint term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    Formula,
    Int,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "div",
            ArithOp::Mod => "mod",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// String-theory functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrFun {
    /// `(str.++ s t)` -> String
    Concat,
    /// `(str.len s)` -> Int
    Len,
    /// `(str.substr s offset len)` -> String
    Substr,
    /// `(str.indexof s pat start)` -> Int
    IndexOf,
    /// `(str.replace s old new)`: first occurrence only -> String
    Replace,
    /// `(str.replace_all s old new)`: every occurrence -> String
    ReplaceAll,
    /// `(str.prefixof prefix s)` -> Formula
    PrefixOf,
    /// `(str.suffixof suffix s)` -> Formula
    SuffixOf,
    /// `(str.contains s sub)` -> Formula
    Contains,
    /// `(str.to_code s)` -> Int
    ToCode,
    /// `(str.from_code n)` -> String
    FromCode,
    /// `(str.to.int s)` -> Int
    ToInt,
    /// `(str.from_int n)` -> String
    FromInt,
    /// `(str.is_digit s)` -> Formula
    IsDigit,
}

impl StrFun {
    fn symbol(self) -> &'static str {
        match self {
            StrFun::Concat => "str.++",
            StrFun::Len => "str.len",
            StrFun::Substr => "str.substr",
            StrFun::IndexOf => "str.indexof",
            StrFun::Replace => "str.replace",
            StrFun::ReplaceAll => "str.replace_all",
            StrFun::PrefixOf => "str.prefixof",
            StrFun::SuffixOf => "str.suffixof",
            StrFun::Contains => "str.contains",
            StrFun::ToCode => "str.to_code",
            StrFun::FromCode => "str.from_code",
            StrFun::ToInt => "str.to.int",
            StrFun::FromInt => "str.from_int",
            StrFun::IsDigit => "str.is_digit",
        }
    }

    pub fn sort(self) -> Sort {
        match self {
            StrFun::Concat
            | StrFun::Substr
            | StrFun::Replace
            | StrFun::ReplaceAll
            | StrFun::FromCode
            | StrFun::FromInt => Sort::String,
            StrFun::Len | StrFun::IndexOf | StrFun::ToCode | StrFun::ToInt => Sort::Int,
            StrFun::PrefixOf | StrFun::SuffixOf | StrFun::Contains | StrFun::IsDigit => {
                Sort::Formula
            }
        }
    }
}

/// A term of the constraint theory.
#[derive(Debug, Clone, PartialEq)]
pub enum SmtExpr {
    True,
    False,
    IntLit(i64),
    StrLit(String),
    /// The tree being generated (the refined value bound to `_`).
    This,
    /// A tree variable bound by an enclosing quantifier.
    Var(String),
    /// A singular tree address rooted at [`SmtExpr::This`].
    PathTerm {
        anchor: Option<String>,
        steps: Vec<Step>,
    },
    Not(Box<SmtExpr>),
    And(Box<SmtExpr>, Box<SmtExpr>),
    Or(Box<SmtExpr>, Box<SmtExpr>),
    Implies(Box<SmtExpr>, Box<SmtExpr>),
    Neg(Box<SmtExpr>),
    Arith {
        op: ArithOp,
        lhs: Box<SmtExpr>,
        rhs: Box<SmtExpr>,
    },
    Cmp {
        op: CmpOp,
        lhs: Box<SmtExpr>,
        rhs: Box<SmtExpr>,
    },
    Str {
        fun: StrFun,
        args: Vec<SmtExpr>,
    },
    /// `(forall <symbol> var in range: body)`
    Forall {
        symbol: String,
        var: String,
        range: Box<SmtExpr>,
        body: Box<SmtExpr>,
    },
    /// `(exists <symbol> var in range: body)`
    Exists {
        symbol: String,
        var: String,
        range: Box<SmtExpr>,
        body: Box<SmtExpr>,
    },
    /// Structural: `child` is a direct (EBNF-level) child of `parent`.
    DirectChild {
        child: Box<SmtExpr>,
        parent: Box<SmtExpr>,
    },
    /// Structural: `child` is the k-th direct child of its symbol under
    /// `parent`.
    KthChild {
        child: Box<SmtExpr>,
        parent: Box<SmtExpr>,
        k: u32,
    },
}

impl SmtExpr {
    pub fn sort(&self) -> Sort {
        match self {
            SmtExpr::True
            | SmtExpr::False
            | SmtExpr::Not(_)
            | SmtExpr::And(..)
            | SmtExpr::Or(..)
            | SmtExpr::Implies(..)
            | SmtExpr::Cmp { .. }
            | SmtExpr::Forall { .. }
            | SmtExpr::Exists { .. }
            | SmtExpr::DirectChild { .. }
            | SmtExpr::KthChild { .. } => Sort::Formula,
            SmtExpr::IntLit(_) | SmtExpr::Neg(_) | SmtExpr::Arith { .. } => Sort::Int,
            SmtExpr::StrLit(_) | SmtExpr::This | SmtExpr::Var(_) | SmtExpr::PathTerm { .. } => {
                Sort::String
            }
            SmtExpr::Str { fun, .. } => fun.sort(),
        }
    }
}

impl fmt::Display for SmtExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmtExpr::True => write!(f, "true"),
            SmtExpr::False => write!(f, "false"),
            SmtExpr::IntLit(n) => write!(f, "{n}"),
            SmtExpr::StrLit(s) => write!(f, "{s:?}"),
            SmtExpr::This => write!(f, "start"),
            SmtExpr::Var(name) => write!(f, "{name}"),
            SmtExpr::PathTerm { anchor, steps } => {
                match anchor {
                    Some(anchor) => write!(f, "<{anchor}>")?,
                    None => write!(f, "<start>")?,
                }
                for step in steps {
                    match step {
                        Step::At { symbol, k } => write!(f, ".<{symbol}>[{k}]")?,
                        Step::AllDirect { symbol } => write!(f, ".<{symbol}>")?,
                        Step::AllIndirect { symbol } => write!(f, "..<{symbol}>")?,
                    }
                }
                Ok(())
            }
            SmtExpr::Not(inner) => write!(f, "(not {inner})"),
            SmtExpr::And(lhs, rhs) => write!(f, "({lhs} and {rhs})"),
            SmtExpr::Or(lhs, rhs) => write!(f, "({lhs} or {rhs})"),
            SmtExpr::Implies(lhs, rhs) => write!(f, "({lhs} implies {rhs})"),
            SmtExpr::Neg(inner) => write!(f, "(- 0 {inner})"),
            SmtExpr::Arith { op, lhs, rhs } => write!(f, "({} {lhs} {rhs})", op.symbol()),
            SmtExpr::Cmp { op, lhs, rhs } => write!(f, "({} {lhs} {rhs})", op.symbol()),
            SmtExpr::Str { fun, args } => {
                write!(f, "({}", fun.symbol())?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
            SmtExpr::Forall {
                symbol,
                var,
                range,
                body,
            } => write!(f, "(forall <{symbol}> {var} in {range}: {body})"),
            SmtExpr::Exists {
                symbol,
                var,
                range,
                body,
            } => write!(f, "(exists <{symbol}> {var} in {range}: {body})"),
            SmtExpr::DirectChild { child, parent } => {
                write!(f, "direct_child({child}, {parent})")
            }
            SmtExpr::KthChild { child, parent, k } => {
                write!(f, "kth_child({child}, {parent}, {k})")
            }
        }
    }
}

/// A formula-sorted constraint term.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula(pub(crate) SmtExpr);

impl Formula {
    pub fn expr(&self) -> &SmtExpr {
        &self.0
    }

    /// Conjoin a list of formulas; `None` if the list is empty.
    pub fn conjoin(formulas: Vec<Formula>) -> Option<Formula> {
        formulas
            .into_iter()
            .map(|f| f.0)
            .reduce(|lhs, rhs| SmtExpr::And(Box::new(lhs), Box::new(rhs)))
            .map(Formula)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
