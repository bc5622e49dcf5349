//! Host evaluation of predicate expressions.
//!
//! This is the "check after generation" path: refinement conjuncts the
//! constraint compiler could not translate are evaluated here against
//! concrete values, and runtime type admission (`admits`) uses the same
//! machinery.
//!
//! Semantics follow the builtin signature table; integer division and
//! modulo round toward negative infinity.

use thiserror::Error;

use crate::path::PathSelector;
use crate::typeck::{LangTable, NormalForm, Predicate, SimpleType};
use crate::syntax::{Expr, ExprKind};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("undefined name `{0}`")]
    UndefinedName(String),

    #[error("`{0}` is not callable")]
    NotCallable(String),

    #[error("`{op}` applied to incompatible value(s)")]
    BadOperands { op: String },

    #[error("unknown language `{0}`")]
    UnknownLang(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("`{0}` is not a number")]
    NumberFormat(String),

    #[error("`ord` expects a single character, got {0:?}")]
    NotAChar(String),

    #[error("{0} is not a valid character code")]
    BadCharCode(i64),

    #[error("`{fun}` applied to an empty list")]
    EmptyList { fun: String },

    #[error("path `{path}` selected {got} node(s), expected exactly one")]
    NonUniqueSelection { path: String, got: usize },

    #[error("condition did not evaluate to a boolean")]
    NotABool,
}

/// Runtime type admission against a table of defined languages. Evaluation
/// failures inside the refinement count as non-membership.
pub fn value_has_type(value: &Value, nf: &NormalForm, langs: &LangTable) -> bool {
    matches!(Evaluator::new(langs).admits(value, nf), Ok(true))
}

/// Evaluates predicate expressions against runtime values.
pub struct Evaluator<'a> {
    langs: &'a LangTable,
}

/// A stack of name bindings for one evaluation.
#[derive(Default)]
struct Env {
    frames: Vec<(String, Value)>,
}

impl Env {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

impl<'a> Evaluator<'a> {
    pub fn new(langs: &'a LangTable) -> Self {
        Self { langs }
    }

    /// Evaluate a predicate against the value bound to `_`.
    pub fn eval_pred(&self, pred: &Predicate, value: &Value) -> Result<bool, EvalError> {
        let mut env = Env::default();
        env.frames.push(("_".to_string(), value.clone()));
        match self.eval(pred.expr(), &mut env)? {
            Value::Bool(b) => Ok(b),
            _ => Err(EvalError::NotABool),
        }
    }

    /// Runtime type admission: does `value` inhabit `nf`?
    pub fn admits(&self, value: &Value, nf: &NormalForm) -> Result<bool, EvalError> {
        if !self.has_simple_type(value, nf.base_type()) {
            return Ok(false);
        }
        match nf {
            NormalForm::Simple(_) => Ok(true),
            NormalForm::Refined { pred, .. } => self.eval_pred(pred, value),
        }
    }

    fn has_simple_type(&self, value: &Value, ty: &SimpleType) -> bool {
        match (value, ty) {
            (_, SimpleType::Top) => true,
            (Value::Int(_), SimpleType::Int) => true,
            (Value::Bool(_), SimpleType::Bool) => true,
            (Value::Str(_), SimpleType::String) => true,
            (Value::Str(word), SimpleType::Lang(grammar)) => grammar.member(word),
            (Value::Unit, SimpleType::Unit) => true,
            (Value::List(items), SimpleType::List(elem)) => {
                items.iter().all(|item| self.has_simple_type(item, elem))
            }
            (_, SimpleType::Error) => true,
            _ => false,
        }
    }

    fn eval(&self, expr: &Expr, env: &mut Env) -> Result<Value, EvalError> {
        match &expr.kind {
            ExprKind::Int(n) => Ok(Value::Int(*n)),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Var(name) => env
                .lookup(name)
                .cloned()
                .ok_or_else(|| EvalError::UndefinedName(name.clone())),
            ExprKind::App { fun, args } => {
                let ExprKind::Var(name) = &fun.kind else {
                    return Err(EvalError::NotCallable(fun.to_string()));
                };
                // Quantifiers take a literal lambda; everything else is a
                // plain builtin over evaluated arguments.
                if let ("forall" | "exists", [lambda, list]) = (name.as_str(), args.as_slice()) {
                    if let ExprKind::Lambda { params, body } = &lambda.kind {
                        return self.eval_quantifier(name, params, body, list, env);
                    }
                }
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, env)?);
                }
                apply_builtin(name, values)
            }
            ExprKind::InLang { receiver, lang } => {
                let word = self.eval_str(receiver, env)?;
                let grammar = self
                    .langs
                    .get(lang)
                    .ok_or_else(|| EvalError::UnknownLang(lang.clone()))?;
                Ok(Value::Bool(grammar.member(&word)))
            }
            ExprKind::Select {
                receiver,
                select_all,
                lang,
                path,
            } => {
                let word = self.eval_str(receiver, env)?;
                let grammar = self
                    .langs
                    .get(lang)
                    .ok_or_else(|| EvalError::UnknownLang(lang.clone()))?;
                let selected = grammar.select_all(&word, path);
                if *select_all {
                    Ok(Value::List(selected.into_iter().map(Value::Str).collect()))
                } else if selected.len() == 1 {
                    Ok(Value::Str(selected.into_iter().next().unwrap()))
                } else {
                    Err(EvalError::NonUniqueSelection {
                        path: path.to_string(),
                        got: selected.len(),
                    })
                }
            }
            ExprKind::Lambda { .. } => Err(EvalError::NotCallable("lambda".to_string())),
            ExprKind::IfThenElse {
                cond,
                then_branch,
                else_branch,
            } => match self.eval(cond, env)? {
                Value::Bool(true) => self.eval(then_branch, env),
                Value::Bool(false) => self.eval(else_branch, env),
                _ => Err(EvalError::NotABool),
            },
        }
    }

    fn eval_quantifier(
        &self,
        name: &str,
        params: &[String],
        body: &Expr,
        list: &Expr,
        env: &mut Env,
    ) -> Result<Value, EvalError> {
        let [param] = params else {
            return Err(EvalError::BadOperands {
                op: name.to_string(),
            });
        };
        let Value::List(items) = self.eval(list, env)? else {
            return Err(EvalError::BadOperands {
                op: name.to_string(),
            });
        };
        let forall = name == "forall";
        for item in items {
            env.frames.push((param.clone(), item));
            let holds = match self.eval(body, env) {
                Ok(Value::Bool(b)) => Ok(b),
                Ok(_) => Err(EvalError::NotABool),
                Err(err) => Err(err),
            };
            env.frames.pop();
            let holds = holds?;
            if forall && !holds {
                return Ok(Value::Bool(false));
            }
            if !forall && holds {
                return Ok(Value::Bool(true));
            }
        }
        Ok(Value::Bool(forall))
    }

    fn eval_str(&self, expr: &Expr, env: &mut Env) -> Result<String, EvalError> {
        match self.eval(expr, env)? {
            Value::Str(s) => Ok(s),
            other => Err(EvalError::BadOperands {
                op: format!("string expression, got {}", other.kind_name()),
            }),
        }
    }

    /// Select on a concrete word, mirroring the `select_all` builtin used by
    /// the tuple filter when cross-parameter conjuncts mention selections.
    pub fn select_all(&self, lang: &str, path: &PathSelector, word: &str) -> Vec<String> {
        self.langs
            .get(lang)
            .map(|grammar| grammar.select_all(word, path))
            .unwrap_or_default()
    }

    /// Evaluate an arbitrary closed conjunct with explicit bindings; the
    /// cross-parameter tuple filter goes through here.
    pub fn eval_with(
        &self,
        expr: &Expr,
        bindings: &[(String, Value)],
    ) -> Result<Value, EvalError> {
        let mut env = Env {
            frames: bindings.to_vec(),
        };
        self.eval(expr, &mut env)
    }
}

/// Floor division: quotients round toward negative infinity.
fn floor_div(lhs: i64, rhs: i64) -> Result<i64, EvalError> {
    if rhs == 0 {
        return Err(EvalError::DivisionByZero);
    }
    let q = lhs / rhs;
    let r = lhs % rhs;
    Ok(if r != 0 && (r < 0) != (rhs < 0) { q - 1 } else { q })
}

fn floor_mod(lhs: i64, rhs: i64) -> Result<i64, EvalError> {
    if rhs == 0 {
        return Err(EvalError::DivisionByZero);
    }
    let r = lhs % rhs;
    Ok(if r != 0 && (r < 0) != (rhs < 0) { r + rhs } else { r })
}

/// Resolve a slice index: negative values count from the end, and
/// out-of-range values clamp.
fn slice_index(index: i64, len: usize) -> usize {
    if index < 0 {
        len.saturating_sub(index.unsigned_abs() as usize)
    } else {
        (index as usize).min(len)
    }
}

fn apply_builtin(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    use Value::*;

    let bad = || EvalError::BadOperands {
        op: name.to_string(),
    };

    Ok(match (name, args.as_slice()) {
        ("prefix_-", [Int(n)]) => Int(-n),
        ("prefix_!", [Bool(b)]) => Bool(!b),
        ("+", [Int(a), Int(b)]) => Int(a + b),
        ("-", [Int(a), Int(b)]) => Int(a - b),
        ("*", [Int(a), Int(b)]) => Int(a * b),
        ("/", [Int(a), Int(b)]) => Int(floor_div(*a, *b)?),
        ("%", [Int(a), Int(b)]) => Int(floor_mod(*a, *b)?),
        (">=", [Int(a), Int(b)]) => Bool(a >= b),
        ("<=", [Int(a), Int(b)]) => Bool(a <= b),
        (">", [Int(a), Int(b)]) => Bool(a > b),
        ("<", [Int(a), Int(b)]) => Bool(a < b),
        ("==", [a, b]) => Bool(a == b),
        ("!=", [a, b]) => Bool(a != b),
        ("&&", [Bool(a), Bool(b)]) => Bool(*a && *b),
        ("||", [Bool(a), Bool(b)]) => Bool(*a || *b),

        ("length", [Str(s)]) => Int(s.chars().count() as i64),
        ("concat", [Str(a), Str(b)]) => Str(format!("{a}{b}")),
        ("substring", [Str(s), Int(start), Int(end)]) => {
            let chars: Vec<char> = s.chars().collect();
            let start = slice_index(*start, chars.len());
            let end = slice_index(*end, chars.len());
            if start < end {
                Str(chars[start..end].iter().collect())
            } else {
                Str(String::new())
            }
        }
        ("int", [Str(s)]) => Int(s
            .trim()
            .parse::<i64>()
            .map_err(|_| EvalError::NumberFormat(s.clone()))?),
        ("str", [Int(n)]) => Str(n.to_string()),
        ("ord", [Str(s)]) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Int(c as i64),
                _ => return Err(EvalError::NotAChar(s.clone())),
            }
        }
        ("chr", [Int(n)]) => {
            let c = u32::try_from(*n)
                .ok()
                .and_then(char::from_u32)
                .ok_or(EvalError::BadCharCode(*n))?;
            Str(c.to_string())
        }
        ("startswith", [Str(s), Str(prefix)]) => Bool(s.starts_with(prefix.as_str())),
        ("endswith", [Str(s), Str(suffix)]) => Bool(s.ends_with(suffix.as_str())),
        ("contains", [Str(s), Str(sub)]) => Bool(s.contains(sub.as_str())),
        ("find", [Str(s), Str(pat)]) => Int(char_index_of(s, pat, 0)),
        ("find_at", [Str(s), Str(pat), Int(start)]) => {
            let start = slice_index(*start, s.chars().count());
            Int(char_index_of(s, pat, start))
        }
        ("replace", [Str(s), Str(old), Str(new)]) => Str(s.replace(old.as_str(), new)),
        ("replace_first", [Str(s), Str(old), Str(new)]) => {
            Str(s.replacen(old.as_str(), new, 1))
        }
        ("isdigit", [Str(s)]) => Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit())),

        ("first", [List(items)]) => items
            .first()
            .cloned()
            .ok_or(EvalError::EmptyList { fun: name.into() })?,
        ("last", [List(items)]) => items
            .last()
            .cloned()
            .ok_or(EvalError::EmptyList { fun: name.into() })?,

        _ => return Err(bad()),
    })
}

/// The character index of `pat` in `s` at or after `from`, or -1.
fn char_index_of(s: &str, pat: &str, from: usize) -> i64 {
    let chars: Vec<char> = s.chars().collect();
    if from > chars.len() {
        return -1;
    }
    let suffix: String = chars[from..].iter().collect();
    match suffix.find(pat) {
        Some(byte_idx) => (from + suffix[..byte_idx].chars().count()) as i64,
        None => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::compile_grammar;
    use crate::grammar::NoExternalLangs;
    use crate::span::Span;
    use crate::syntax::parse_rules;
    use crate::typeck::Typer;
    use pretty_assertions::assert_eq;

    fn eval_bool(langs: &LangTable, pred: &str, value: Value) -> bool {
        Evaluator::new(langs)
            .eval_pred(&Predicate::parse(pred).unwrap(), &value)
            .unwrap()
    }

    #[test]
    fn test_eval_arithmetic_and_comparisons() {
        let langs = LangTable::default();
        assert!(eval_bool(&langs, "_ * 2 + 1 == 7", Value::Int(3)));
        assert!(eval_bool(&langs, "_ / 2 == -4", Value::Int(-7)));
        assert!(eval_bool(&langs, "_ % 3 == 2", Value::Int(-1)));
    }

    #[test]
    fn test_eval_string_builtins() {
        let langs = LangTable::default();
        assert!(eval_bool(&langs, "length(_) == 5", "hello".into()));
        assert!(eval_bool(&langs, "startswith(_, \"he\")", "hello".into()));
        assert!(eval_bool(&langs, "find(_, \"l\") == 2", "hello".into()));
        assert!(eval_bool(&langs, "find_at(_, \"l\", 3) == 3", "hello".into()));
        assert!(eval_bool(&langs, "find(_, \"z\") == 0 - 1", "hello".into()));
        assert!(eval_bool(
            &langs,
            "replace(_, \"l\", \"L\") == \"heLLo\"",
            "hello".into()
        ));
        assert!(eval_bool(
            &langs,
            "replace_first(_, \"l\", \"L\") == \"heLlo\"",
            "hello".into()
        ));
        assert!(eval_bool(&langs, "substring(_, 1, 3) == \"el\"", "hello".into()));
        assert!(eval_bool(&langs, "isdigit(_)", "123".into()));
        assert!(!eval_bool(&langs, "isdigit(_)", "".into()));
        assert!(eval_bool(&langs, "int(_) == 42", "42".into()));
        assert!(eval_bool(&langs, "ord(_) == 97", "a".into()));
        assert!(eval_bool(&langs, "chr(98) == \"b\"", Value::Unit));
    }

    #[test]
    fn test_eval_membership_and_selection() {
        let mut typer = Typer::new();
        typer
            .define_lang(
                "Csv",
                Span::dummy(),
                parse_rules("start: field (\",\" field)*; field: [a-z]+;").unwrap(),
            )
            .unwrap();
        let langs = typer.langs().clone();
        assert!(eval_bool(&langs, "_ in Csv", "a,b".into()));
        assert!(!eval_bool(&langs, "_ in Csv", "a,,b".into()));
        assert!(eval_bool(
            &langs,
            "forall(x -> length(x) <= 2, select_all(@Csv: ..field, _))",
            "ab,c".into()
        ));
        assert!(!eval_bool(
            &langs,
            "forall(x -> length(x) <= 2, select_all(@Csv: ..field, _))",
            "ab,cde".into()
        ));
        assert!(eval_bool(
            &langs,
            "exists(x -> x == \"ab\", select_all(@Csv: ..field, _))",
            "ab,c".into()
        ));
    }

    #[test]
    fn test_admits_refined_values() {
        let langs = LangTable::default();
        let evaluator = Evaluator::new(&langs);
        let nf = NormalForm::Simple(SimpleType::Int)
            .refined(Predicate::parse("_ > 0").unwrap())
            .refined(Predicate::parse("_ < 10").unwrap());
        assert!(evaluator.admits(&Value::Int(5), &nf).unwrap());
        assert!(!evaluator.admits(&Value::Int(-1), &nf).unwrap());
        assert!(!evaluator.admits(&Value::Int(15), &nf).unwrap());
        assert!(!evaluator.admits(&Value::Str("5".into()), &nf).unwrap());
    }

    #[test]
    fn test_admits_lang_values() {
        let grammar = std::sync::Arc::new(
            compile_grammar("Digits", parse_rules("start: [0-9]+;").unwrap(), &NoExternalLangs)
                .unwrap(),
        );
        let langs = LangTable::default();
        let evaluator = Evaluator::new(&langs);
        let nf = NormalForm::Simple(SimpleType::Lang(grammar));
        assert!(evaluator.admits(&Value::Str("123".into()), &nf).unwrap());
        assert!(!evaluator.admits(&Value::Str("12a".into()), &nf).unwrap());
    }
}
