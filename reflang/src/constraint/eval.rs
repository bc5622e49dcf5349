//! Formula evaluation against a concrete derivation tree.
//!
//! The reference solver filters its samples through this evaluator, and the
//! translation-soundness tests compare it with direct predicate evaluation
//! on the derived string. Tree quantifiers range over occurrences of their
//! symbol inside the range node; the structural predicates resolve node
//! identity by reference, which is well-defined within one tree.

use thiserror::Error;

use crate::grammar::DerivationTree;
use crate::path::PathSelector;

use super::formula::{ArithOp, CmpOp, Formula, SmtExpr, StrFun};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("unbound tree variable `{0}`")]
    UnboundVar(String),

    #[error("ill-sorted term: {0}")]
    IllSorted(String),

    #[error("path `{path}` selected {got} node(s), expected exactly one")]
    NonUniqueSelection { path: String, got: usize },
}

enum SmtVal {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl SmtVal {
    fn truth(self) -> Result<bool, FormulaError> {
        match self {
            SmtVal::Bool(b) => Ok(b),
            _ => Err(FormulaError::IllSorted("expected a formula".into())),
        }
    }

    fn int(self) -> Result<i64, FormulaError> {
        match self {
            SmtVal::Int(n) => Ok(n),
            _ => Err(FormulaError::IllSorted("expected an integer term".into())),
        }
    }

    fn string(self) -> Result<String, FormulaError> {
        match self {
            SmtVal::Str(s) => Ok(s),
            _ => Err(FormulaError::IllSorted("expected a string term".into())),
        }
    }
}

/// Evaluate a formula against the derivation tree of the refined value.
pub fn eval_formula(formula: &Formula, tree: &DerivationTree) -> Result<bool, FormulaError> {
    let mut env = Vec::new();
    eval(formula.expr(), tree, &mut env)?.truth()
}

type Env<'t> = Vec<(String, &'t DerivationTree)>;

fn node_of<'t>(
    expr: &SmtExpr,
    root: &'t DerivationTree,
    env: &Env<'t>,
) -> Result<&'t DerivationTree, FormulaError> {
    match expr {
        SmtExpr::This => Ok(root),
        SmtExpr::Var(name) => env
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, node)| *node)
            .ok_or_else(|| FormulaError::UnboundVar(name.clone())),
        other => Err(FormulaError::IllSorted(format!(
            "expected a tree reference, got {other}"
        ))),
    }
}

fn eval<'t>(
    expr: &SmtExpr,
    root: &'t DerivationTree,
    env: &mut Env<'t>,
) -> Result<SmtVal, FormulaError> {
    match expr {
        SmtExpr::True => Ok(SmtVal::Bool(true)),
        SmtExpr::False => Ok(SmtVal::Bool(false)),
        SmtExpr::IntLit(n) => Ok(SmtVal::Int(*n)),
        SmtExpr::StrLit(s) => Ok(SmtVal::Str(s.clone())),
        SmtExpr::This | SmtExpr::Var(_) => {
            Ok(SmtVal::Str(node_of(expr, root, env)?.text()))
        }
        SmtExpr::PathTerm { anchor, steps } => {
            let selector = PathSelector {
                anchor: anchor.clone(),
                steps: steps.clone(),
            };
            let selected = selector.select(root);
            if selected.len() == 1 {
                Ok(SmtVal::Str(selected[0].text()))
            } else {
                Err(FormulaError::NonUniqueSelection {
                    path: selector.to_string(),
                    got: selected.len(),
                })
            }
        }
        SmtExpr::Not(inner) => Ok(SmtVal::Bool(!eval(inner, root, env)?.truth()?)),
        SmtExpr::And(lhs, rhs) => Ok(SmtVal::Bool(
            eval(lhs, root, env)?.truth()? && eval(rhs, root, env)?.truth()?,
        )),
        SmtExpr::Or(lhs, rhs) => Ok(SmtVal::Bool(
            eval(lhs, root, env)?.truth()? || eval(rhs, root, env)?.truth()?,
        )),
        SmtExpr::Implies(lhs, rhs) => Ok(SmtVal::Bool(
            !eval(lhs, root, env)?.truth()? || eval(rhs, root, env)?.truth()?,
        )),
        SmtExpr::Neg(inner) => Ok(SmtVal::Int(-eval(inner, root, env)?.int()?)),
        SmtExpr::Arith { op, lhs, rhs } => {
            let lhs = eval(lhs, root, env)?.int()?;
            let rhs = eval(rhs, root, env)?.int()?;
            let value = match op {
                ArithOp::Add => lhs + rhs,
                ArithOp::Sub => lhs - rhs,
                ArithOp::Mul => lhs * rhs,
                ArithOp::Div => {
                    if rhs == 0 {
                        return Err(FormulaError::IllSorted("division by zero".into()));
                    }
                    floor_div(lhs, rhs)
                }
                ArithOp::Mod => {
                    if rhs == 0 {
                        return Err(FormulaError::IllSorted("division by zero".into()));
                    }
                    floor_mod(lhs, rhs)
                }
            };
            Ok(SmtVal::Int(value))
        }
        SmtExpr::Cmp { op, lhs, rhs } => {
            let lhs = eval(lhs, root, env)?;
            let rhs = eval(rhs, root, env)?;
            let holds = match (lhs, rhs) {
                (SmtVal::Int(a), SmtVal::Int(b)) => match op {
                    CmpOp::Eq => a == b,
                    CmpOp::Lt => a < b,
                    CmpOp::Le => a <= b,
                    CmpOp::Gt => a > b,
                    CmpOp::Ge => a >= b,
                },
                (SmtVal::Str(a), SmtVal::Str(b)) => match op {
                    CmpOp::Eq => a == b,
                    CmpOp::Lt => a < b,
                    CmpOp::Le => a <= b,
                    CmpOp::Gt => a > b,
                    CmpOp::Ge => a >= b,
                },
                _ => {
                    return Err(FormulaError::IllSorted(
                        "comparison of differently sorted terms".into(),
                    ))
                }
            };
            Ok(SmtVal::Bool(holds))
        }
        SmtExpr::Str { fun, args } => eval_str_fun(*fun, args, root, env),
        SmtExpr::Forall {
            symbol,
            var,
            range,
            body,
        } => {
            let range = node_of(range, root, env)?;
            for node in range.descendants_labelled(symbol) {
                env.push((var.clone(), node));
                let holds = eval(body, root, env).and_then(SmtVal::truth);
                env.pop();
                if !holds? {
                    return Ok(SmtVal::Bool(false));
                }
            }
            Ok(SmtVal::Bool(true))
        }
        SmtExpr::Exists {
            symbol,
            var,
            range,
            body,
        } => {
            let range = node_of(range, root, env)?;
            for node in range.descendants_labelled(symbol) {
                env.push((var.clone(), node));
                let holds = eval(body, root, env).and_then(SmtVal::truth);
                env.pop();
                if holds? {
                    return Ok(SmtVal::Bool(true));
                }
            }
            Ok(SmtVal::Bool(false))
        }
        SmtExpr::DirectChild { child, parent } => {
            let child = node_of(child, root, env)?;
            let parent = node_of(parent, root, env)?;
            Ok(SmtVal::Bool(is_direct_child(child, parent)))
        }
        SmtExpr::KthChild { child, parent, k } => {
            let child = node_of(child, root, env)?;
            let parent = node_of(parent, root, env)?;
            let holds = child.symbol().is_some_and(|symbol| {
                let siblings = parent.children_labelled(symbol);
                siblings
                    .get(*k as usize - 1)
                    .is_some_and(|node| std::ptr::eq(*node, child))
            });
            Ok(SmtVal::Bool(holds))
        }
    }
}

fn is_direct_child(child: &DerivationTree, parent: &DerivationTree) -> bool {
    child.symbol().is_some_and(|symbol| {
        parent
            .children_labelled(symbol)
            .iter()
            .any(|node| std::ptr::eq(*node, child))
    })
}

fn eval_str_fun<'t>(
    fun: StrFun,
    args: &[SmtExpr],
    root: &'t DerivationTree,
    env: &mut Env<'t>,
) -> Result<SmtVal, FormulaError> {
    let arity_err = || FormulaError::IllSorted(format!("wrong arity for {fun:?}"));
    let arg = |i: usize| args.get(i).ok_or_else(arity_err);

    match fun {
        StrFun::Concat => {
            let a = eval(arg(0)?, root, env)?.string()?;
            let b = eval(arg(1)?, root, env)?.string()?;
            Ok(SmtVal::Str(format!("{a}{b}")))
        }
        StrFun::Len => {
            let s = eval(arg(0)?, root, env)?.string()?;
            Ok(SmtVal::Int(s.chars().count() as i64))
        }
        StrFun::Substr => {
            let s = eval(arg(0)?, root, env)?.string()?;
            let offset = eval(arg(1)?, root, env)?.int()?;
            let len = eval(arg(2)?, root, env)?.int()?;
            let chars: Vec<char> = s.chars().collect();
            let start = clamp_index(offset, chars.len());
            let end = clamp_index(offset.saturating_add(len.max(0)), chars.len());
            Ok(SmtVal::Str(if start < end {
                chars[start..end].iter().collect()
            } else {
                String::new()
            }))
        }
        StrFun::IndexOf => {
            let s = eval(arg(0)?, root, env)?.string()?;
            let pat = eval(arg(1)?, root, env)?.string()?;
            let from = eval(arg(2)?, root, env)?.int()?;
            if from < 0 {
                return Ok(SmtVal::Int(-1));
            }
            Ok(SmtVal::Int(char_index_of(&s, &pat, from as usize)))
        }
        StrFun::Replace => {
            let s = eval(arg(0)?, root, env)?.string()?;
            let old = eval(arg(1)?, root, env)?.string()?;
            let new = eval(arg(2)?, root, env)?.string()?;
            Ok(SmtVal::Str(s.replacen(old.as_str(), &new, 1)))
        }
        StrFun::ReplaceAll => {
            let s = eval(arg(0)?, root, env)?.string()?;
            let old = eval(arg(1)?, root, env)?.string()?;
            let new = eval(arg(2)?, root, env)?.string()?;
            Ok(SmtVal::Str(s.replace(old.as_str(), &new)))
        }
        StrFun::PrefixOf => {
            let prefix = eval(arg(0)?, root, env)?.string()?;
            let s = eval(arg(1)?, root, env)?.string()?;
            Ok(SmtVal::Bool(s.starts_with(prefix.as_str())))
        }
        StrFun::SuffixOf => {
            let suffix = eval(arg(0)?, root, env)?.string()?;
            let s = eval(arg(1)?, root, env)?.string()?;
            Ok(SmtVal::Bool(s.ends_with(suffix.as_str())))
        }
        StrFun::Contains => {
            let s = eval(arg(0)?, root, env)?.string()?;
            let sub = eval(arg(1)?, root, env)?.string()?;
            Ok(SmtVal::Bool(s.contains(sub.as_str())))
        }
        StrFun::ToCode => {
            let s = eval(arg(0)?, root, env)?.string()?;
            let mut chars = s.chars();
            Ok(SmtVal::Int(match (chars.next(), chars.next()) {
                (Some(c), None) => c as i64,
                _ => -1,
            }))
        }
        StrFun::FromCode => {
            let n = eval(arg(0)?, root, env)?.int()?;
            let s = u32::try_from(n)
                .ok()
                .and_then(char::from_u32)
                .map(|c| c.to_string())
                .unwrap_or_default();
            Ok(SmtVal::Str(s))
        }
        StrFun::ToInt => {
            let s = eval(arg(0)?, root, env)?.string()?;
            let value = if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                s.parse::<i64>().unwrap_or(-1)
            } else {
                -1
            };
            Ok(SmtVal::Int(value))
        }
        StrFun::FromInt => {
            let n = eval(arg(0)?, root, env)?.int()?;
            Ok(SmtVal::Str(n.to_string()))
        }
        StrFun::IsDigit => {
            let s = eval(arg(0)?, root, env)?.string()?;
            Ok(SmtVal::Bool(
                !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()),
            ))
        }
    }
}

fn clamp_index(index: i64, len: usize) -> usize {
    if index < 0 {
        0
    } else {
        (index as usize).min(len)
    }
}

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

fn floor_div(lhs: i64, rhs: i64) -> i64 {
    let q = lhs / rhs;
    let r = lhs % rhs;
    if r != 0 && (r < 0) != (rhs < 0) {
        q - 1
    } else {
        q
    }
}

fn floor_mod(lhs: i64, rhs: i64) -> i64 {
    let r = lhs % rhs;
    if r != 0 && (r < 0) != (rhs < 0) {
        r + rhs
    } else {
        r
    }
}

#[cfg(test)]
mod tests {
    use super::super::translate::translate;
    use super::*;
    use crate::grammar::{compile_grammar, Grammar, NoExternalLangs};
    use crate::syntax::{parse_expr, parse_rules};

    fn grammar(src: &str) -> Grammar {
        compile_grammar("test", parse_rules(src).unwrap(), &NoExternalLangs).unwrap()
    }

    fn holds(g: &Grammar, word: &str, pred: &str) -> bool {
        let expr = parse_expr(pred).unwrap();
        let (term, _) = translate(&expr, "_").expect("predicate must be translatable");
        let tree = g.parse(word).unwrap();
        eval_formula(&Formula(term), &tree).unwrap()
    }

    #[test]
    fn test_eval_length_formula() {
        let g = grammar("start: [a-z]+;");
        assert!(holds(&g, "abc", "length(_) == 3"));
        assert!(!holds(&g, "abcd", "length(_) == 3"));
    }

    #[test]
    fn test_eval_forall_over_direct_children() {
        let g = grammar("start: field (\",\" field)*; field: [a-z]+;");
        assert!(holds(
            &g,
            "ab,cd",
            "forall(x -> length(x) == 2, select_all(@G: .field, _))"
        ));
        assert!(!holds(
            &g,
            "ab,c",
            "forall(x -> length(x) == 2, select_all(@G: .field, _))"
        ));
    }

    #[test]
    fn test_eval_exists_over_descendants() {
        let g = grammar("start: field (\",\" field)*; field: [a-z]+;");
        assert!(holds(
            &g,
            "ab,cd",
            "exists(x -> x == \"cd\", select_all(@G: ..field, _))"
        ));
        assert!(!holds(
            &g,
            "ab,cd",
            "exists(x -> x == \"zz\", select_all(@G: ..field, _))"
        ));
    }

    #[test]
    fn test_eval_singular_select_address() {
        let g = grammar("start: key \"=\" value; key: [a-z]+; value: [0-9]+;");
        assert!(holds(&g, "a=12", "select(@G: .value, _) == \"12\""));
        assert!(holds(&g, "a=12", "int(select(@G: .value, _)) == 12"));
    }

    #[test]
    fn test_eval_kth_child_formula() {
        let g = grammar("start: field (\",\" field)*; field: [a-z]+;");
        assert!(holds(
            &g,
            "ab,cd,ef",
            "forall(x -> x == \"cd\", select_all(@G: .field[2], _))"
        ));
        assert!(!holds(
            &g,
            "ab,cd,ef",
            "forall(x -> x == \"xx\", select_all(@G: .field[2], _))"
        ));
    }
}
