//! Predicate-to-formula translation.
//!
//! [`translate`] attempts to turn one predicate conjunct into a well-sorted
//! constraint term. Anything outside the theory returns `None`, and the
//! caller keeps that conjunct as a host-evaluated filter; translation is
//! total in the sense that nothing is ever rejected outright.

use rustc_hash::FxHashSet;

use crate::path::{PathSelector, Step};
use crate::syntax::{Expr, ExprKind};

use super::formula::{ArithOp, CmpOp, Sort, SmtExpr, StrFun};

/// Translate `expr`, where `binder` names the refined value. Returns the
/// term and its sort, or `None` if any subterm is untranslatable.
pub fn translate(expr: &Expr, binder: &str) -> Option<(SmtExpr, Sort)> {
    go(expr, binder, &mut FxHashSet::default())
}

fn go(expr: &Expr, binder: &str, bound: &mut FxHashSet<String>) -> Option<(SmtExpr, Sort)> {
    match &expr.kind {
        ExprKind::Bool(true) => Some((SmtExpr::True, Sort::Formula)),
        ExprKind::Bool(false) => Some((SmtExpr::False, Sort::Formula)),
        ExprKind::Int(n) => Some((SmtExpr::IntLit(*n), Sort::Int)),
        ExprKind::Str(s) => Some((SmtExpr::StrLit(s.clone()), Sort::String)),

        ExprKind::Var(x) if x == binder => Some((SmtExpr::This, Sort::String)),
        ExprKind::Var(x) if bound.contains(x) => {
            Some((SmtExpr::Var(x.clone()), Sort::String))
        }
        ExprKind::Var(_) => None,

        ExprKind::Select {
            receiver,
            select_all: false,
            lang: _,
            path,
        } => {
            // A singular selection compiles to a direct tree address; no
            // quantifier involved.
            if !matches!(&receiver.kind, ExprKind::Var(x) if x == binder) {
                return None;
            }
            Some((
                SmtExpr::PathTerm {
                    anchor: path.anchor.clone(),
                    steps: path.steps.clone(),
                },
                Sort::String,
            ))
        }

        ExprKind::App { fun, args } => {
            let ExprKind::Var(name) = &fun.kind else {
                return None;
            };
            translate_app(name, args, binder, bound)
        }

        // Membership, bare select_all (a list), conditionals, and lambdas
        // outside quantifier position stay host-evaluated.
        _ => None,
    }
}

fn translate_app(
    name: &str,
    args: &[Expr],
    binder: &str,
    bound: &mut FxHashSet<String>,
) -> Option<(SmtExpr, Sort)> {
    match (name, args) {
        ("&&" | "||", [lhs, rhs]) => {
            let (lhs, Sort::Formula) = go(lhs, binder, bound)? else {
                return None;
            };
            let (rhs, Sort::Formula) = go(rhs, binder, bound)? else {
                return None;
            };
            let expr = if name == "&&" {
                SmtExpr::And(Box::new(lhs), Box::new(rhs))
            } else {
                SmtExpr::Or(Box::new(lhs), Box::new(rhs))
            };
            Some((expr, Sort::Formula))
        }
        ("prefix_!", [operand]) => {
            let (operand, Sort::Formula) = go(operand, binder, bound)? else {
                return None;
            };
            Some((SmtExpr::Not(Box::new(operand)), Sort::Formula))
        }
        ("prefix_-", [operand]) => {
            let (operand, Sort::Int) = go(operand, binder, bound)? else {
                return None;
            };
            Some((SmtExpr::Neg(Box::new(operand)), Sort::Int))
        }
        ("+" | "-" | "*" | "/" | "%", [lhs, rhs]) => {
            let op = match name {
                "+" => ArithOp::Add,
                "-" => ArithOp::Sub,
                "*" => ArithOp::Mul,
                "/" => ArithOp::Div,
                _ => ArithOp::Mod,
            };
            let (lhs, Sort::Int) = go(lhs, binder, bound)? else {
                return None;
            };
            let (rhs, Sort::Int) = go(rhs, binder, bound)? else {
                return None;
            };
            Some((
                SmtExpr::Arith {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                Sort::Int,
            ))
        }
        ("==" | "!=", [lhs, rhs]) => {
            let (lhs, sort1) = go(lhs, binder, bound)?;
            let (rhs, sort2) = go(rhs, binder, bound)?;
            if sort1 != sort2 || sort1 == Sort::Formula {
                return None;
            }
            let eq = SmtExpr::Cmp {
                op: CmpOp::Eq,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
            let expr = if name == "==" {
                eq
            } else {
                SmtExpr::Not(Box::new(eq))
            };
            Some((expr, Sort::Formula))
        }
        ("<" | "<=" | ">" | ">=", [lhs, rhs]) => {
            let (lhs, sort1) = go(lhs, binder, bound)?;
            let (rhs, sort2) = go(rhs, binder, bound)?;
            match (sort1, sort2) {
                (Sort::Int, Sort::Int) => {
                    let op = match name {
                        "<" => CmpOp::Lt,
                        "<=" => CmpOp::Le,
                        ">" => CmpOp::Gt,
                        _ => CmpOp::Ge,
                    };
                    Some((
                        SmtExpr::Cmp {
                            op,
                            lhs: Box::new(lhs),
                            rhs: Box::new(rhs),
                        },
                        Sort::Formula,
                    ))
                }
                // The string theory only has `=` and `<=`; the other
                // orderings are encoded.
                (Sort::String, Sort::String) => {
                    let le = SmtExpr::Cmp {
                        op: CmpOp::Le,
                        lhs: Box::new(lhs.clone()),
                        rhs: Box::new(rhs.clone()),
                    };
                    let eq = SmtExpr::Cmp {
                        op: CmpOp::Eq,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    };
                    let expr = match name {
                        "<=" => le,
                        "<" => SmtExpr::And(Box::new(le), Box::new(SmtExpr::Not(Box::new(eq)))),
                        ">" => SmtExpr::Not(Box::new(le)),
                        _ => SmtExpr::Or(Box::new(SmtExpr::Not(Box::new(le))), Box::new(eq)),
                    };
                    Some((expr, Sort::Formula))
                }
                _ => None,
            }
        }

        ("length", [s]) => str_fun(StrFun::Len, &[s], &[], binder, bound),
        ("concat", [a, b]) => str_fun(StrFun::Concat, &[a, b], &[], binder, bound),
        ("substring", [s, from, to]) => {
            let (s, Sort::String) = go(s, binder, bound)? else {
                return None;
            };
            let (from, Sort::Int) = go(from, binder, bound)? else {
                return None;
            };
            let (to, Sort::Int) = go(to, binder, bound)? else {
                return None;
            };
            // str.substr takes offset and length.
            let len = SmtExpr::Arith {
                op: ArithOp::Sub,
                lhs: Box::new(to),
                rhs: Box::new(from.clone()),
            };
            Some((
                SmtExpr::Str {
                    fun: StrFun::Substr,
                    args: vec![s, from, len],
                },
                Sort::String,
            ))
        }
        ("int", [s]) => str_fun(StrFun::ToInt, &[s], &[], binder, bound),
        ("str", [n]) => int_fun(StrFun::FromInt, n, binder, bound),
        ("ord", [s]) => str_fun(StrFun::ToCode, &[s], &[], binder, bound),
        ("chr", [n]) => int_fun(StrFun::FromCode, n, binder, bound),
        // str.prefixof / str.suffixof take the affix first.
        ("startswith", [s, prefix]) => str_fun(StrFun::PrefixOf, &[prefix, s], &[], binder, bound),
        ("endswith", [s, suffix]) => str_fun(StrFun::SuffixOf, &[suffix, s], &[], binder, bound),
        ("contains", [s, sub]) => str_fun(StrFun::Contains, &[s, sub], &[], binder, bound),
        ("find", [s, pat]) => str_fun(
            StrFun::IndexOf,
            &[s, pat],
            &[SmtExpr::IntLit(0)],
            binder,
            bound,
        ),
        ("find_at", [s, pat, from]) => {
            let (s, Sort::String) = go(s, binder, bound)? else {
                return None;
            };
            let (pat, Sort::String) = go(pat, binder, bound)? else {
                return None;
            };
            let (from, Sort::Int) = go(from, binder, bound)? else {
                return None;
            };
            Some((
                SmtExpr::Str {
                    fun: StrFun::IndexOf,
                    args: vec![s, pat, from],
                },
                Sort::Int,
            ))
        }
        // `replace` rewrites every occurrence; `replace_first` only the first.
        ("replace", [s, old, new]) => str_fun(StrFun::ReplaceAll, &[s, old, new], &[], binder, bound),
        ("replace_first", [s, old, new]) => {
            str_fun(StrFun::Replace, &[s, old, new], &[], binder, bound)
        }
        ("isdigit", [s]) => str_fun(StrFun::IsDigit, &[s], &[], binder, bound),

        ("forall" | "exists", [lambda, selection]) => {
            translate_quantifier(name == "forall", lambda, selection, binder, bound)
        }

        _ => None,
    }
}

/// Translate string-sorted arguments and apply a theory function, appending
/// any extra pre-built arguments.
fn str_fun(
    fun: StrFun,
    args: &[&Expr],
    extra: &[SmtExpr],
    binder: &str,
    bound: &mut FxHashSet<String>,
) -> Option<(SmtExpr, Sort)> {
    let mut terms = Vec::with_capacity(args.len() + extra.len());
    for arg in args {
        let (term, Sort::String) = go(arg, binder, bound)? else {
            return None;
        };
        terms.push(term);
    }
    terms.extend(extra.iter().cloned());
    Some((SmtExpr::Str { fun, args: terms }, fun.sort()))
}

fn int_fun(
    fun: StrFun,
    arg: &Expr,
    binder: &str,
    bound: &mut FxHashSet<String>,
) -> Option<(SmtExpr, Sort)> {
    let (term, Sort::Int) = go(arg, binder, bound)? else {
        return None;
    };
    Some((
        SmtExpr::Str {
            fun,
            args: vec![term],
        },
        fun.sort(),
    ))
}

/// Lower `forall`/`exists` over a `select_all` path into nested tree
/// quantifiers, innermost first.
///
/// Each `.sym` step quantifies over direct children with an `is-direct-child`
/// side condition (implied for universals, conjoined for existentials); each
/// `..sym` step quantifies without it; a `.sym[k]` step always becomes an
/// existential binder with a `kth_child` condition. A relative anchor adds
/// one outermost quantifier over the anchor symbol.
fn translate_quantifier(
    universal: bool,
    lambda: &Expr,
    selection: &Expr,
    binder: &str,
    bound: &mut FxHashSet<String>,
) -> Option<(SmtExpr, Sort)> {
    let ExprKind::Lambda { params, body } = &lambda.kind else {
        return None;
    };
    let [param] = params.as_slice() else {
        return None;
    };
    let ExprKind::Select {
        receiver,
        select_all: true,
        lang: _,
        path,
    } = &selection.kind
    else {
        return None;
    };
    if !matches!(&receiver.kind, ExprKind::Var(x) if x == binder) {
        return None;
    }
    if path.steps.is_empty() {
        return None;
    }

    let fresh = bound.insert(param.clone());
    let atom = go(body, binder, bound);
    if fresh {
        bound.remove(param);
    }
    let (atom, Sort::Formula) = atom? else {
        return None;
    };

    let PathSelector { anchor, steps } = path;
    let mut formula = atom;
    for (i, step) in steps.iter().enumerate().rev() {
        let var = if i == steps.len() - 1 {
            param.clone()
        } else {
            steps[i].symbol().to_string()
        };
        let range = if i == 0 {
            match anchor {
                Some(anchor) => SmtExpr::Var(anchor.clone()),
                None => SmtExpr::This,
            }
        } else {
            SmtExpr::Var(steps[i - 1].symbol().to_string())
        };
        formula = match step {
            Step::AllIndirect { symbol } => quantify(universal, symbol, &var, range, formula),
            Step::AllDirect { symbol } => {
                let side = SmtExpr::DirectChild {
                    child: Box::new(SmtExpr::Var(var.clone())),
                    parent: Box::new(range.clone()),
                };
                let body = if universal {
                    SmtExpr::Implies(Box::new(side), Box::new(formula))
                } else {
                    SmtExpr::And(Box::new(side), Box::new(formula))
                };
                quantify(universal, symbol, &var, range, body)
            }
            Step::At { symbol, k } => {
                let side = SmtExpr::KthChild {
                    child: Box::new(SmtExpr::Var(var.clone())),
                    parent: Box::new(range.clone()),
                    k: *k,
                };
                let body = SmtExpr::And(Box::new(side), Box::new(formula));
                quantify(false, symbol, &var, range, body)
            }
        };
    }
    if let Some(anchor) = anchor {
        formula = quantify(universal, anchor, anchor, SmtExpr::This, formula);
    }
    Some((formula, Sort::Formula))
}

fn quantify(
    universal: bool,
    symbol: &str,
    var: &str,
    range: SmtExpr,
    body: SmtExpr,
) -> SmtExpr {
    if universal {
        SmtExpr::Forall {
            symbol: symbol.to_string(),
            var: var.to_string(),
            range: Box::new(range),
            body: Box::new(body),
        }
    } else {
        SmtExpr::Exists {
            symbol: symbol.to_string(),
            var: var.to_string(),
            range: Box::new(range),
            body: Box::new(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse_expr;
    use pretty_assertions::assert_eq;

    fn rendered(src: &str) -> Option<String> {
        let expr = parse_expr(src).unwrap();
        translate(&expr, "_").map(|(term, sort)| {
            assert_eq!(sort, Sort::Formula, "top-level predicates are formulas");
            term.to_string()
        })
    }

    #[test]
    fn test_translate_arithmetic_comparison() {
        assert_eq!(rendered("1 + 2 < 4").unwrap(), "(< (+ 1 2) 4)");
    }

    #[test]
    fn test_translate_binder_and_length() {
        assert_eq!(
            rendered("length(_) == 10").unwrap(),
            "(= (str.len start) 10)"
        );
    }

    #[test]
    fn test_translate_string_ordering_encodings() {
        assert_eq!(
            rendered("\"a\" < \"b\"").unwrap(),
            "((<= \"a\" \"b\") and (not (= \"a\" \"b\")))"
        );
        assert_eq!(rendered("\"a\" > \"b\"").unwrap(), "(not (<= \"a\" \"b\"))");
        assert_eq!(
            rendered("\"a\" >= \"b\"").unwrap(),
            "((not (<= \"a\" \"b\")) or (= \"a\" \"b\"))"
        );
    }

    #[test]
    fn test_translate_string_functions() {
        assert_eq!(
            rendered("startswith(_, \"ab\")").unwrap(),
            "(str.prefixof \"ab\" start)"
        );
        assert_eq!(
            rendered("find(_, \"x\") == 3").unwrap(),
            "(= (str.indexof start \"x\" 0) 3)"
        );
        assert_eq!(
            rendered("replace(_, \"a\", \"b\") == \"b\"").unwrap(),
            "(= (str.replace_all start \"a\" \"b\") \"b\")"
        );
        assert_eq!(
            rendered("replace_first(_, \"a\", \"b\") == \"b\"").unwrap(),
            "(= (str.replace start \"a\" \"b\") \"b\")"
        );
        assert_eq!(
            rendered("substring(_, 1, 3) == \"bc\"").unwrap(),
            "(= (str.substr start 1 (- 3 1)) \"bc\")"
        );
    }

    #[test]
    fn test_untranslatable_falls_out() {
        // Free variables other than the binder are not in the theory.
        assert_eq!(rendered("y > 0"), None);
        // Grammar membership stays host-evaluated.
        assert_eq!(rendered("_ in Email"), None);
        // One untranslatable operand poisons the connective.
        assert_eq!(rendered("1 < 2 && (_ in Email)"), None);
    }

    #[test]
    fn test_translate_forall_direct_step() {
        let got = rendered("forall(x -> length(x) > 0, select_all(@Csv: .field, _))").unwrap();
        assert_eq!(
            got,
            "(forall <field> x in start: (direct_child(x, start) implies (> (str.len x) 0)))"
        );
    }

    #[test]
    fn test_translate_exists_indirect_step() {
        let got = rendered("exists(x -> x == \"a\", select_all(@Csv: ..field, _))").unwrap();
        assert_eq!(got, "(exists <field> x in start: (= x \"a\"))");
    }

    #[test]
    fn test_translate_nested_path_quantifies_innermost_first() {
        let got =
            rendered("forall(x -> length(x) > 0, select_all(@Ini: .section..key, _))").unwrap();
        assert_eq!(
            got,
            "(forall <section> section in start: (direct_child(section, start) implies \
             (forall <key> x in section: (> (str.len x) 0))))"
        );
    }

    #[test]
    fn test_translate_indexed_step_is_existential() {
        let got = rendered("forall(x -> isdigit(x), select_all(@Row: .cell[2]..digit, _))").unwrap();
        assert_eq!(
            got,
            "(exists <cell> cell in start: (kth_child(cell, start, 2) and \
             (forall <digit> x in cell: (str.is_digit x))))"
        );
    }

    #[test]
    fn test_translate_singular_select_is_an_address() {
        let got = rendered("select(@Url: .host, _) == \"localhost\"").unwrap();
        assert_eq!(got, "(= <start>.<host> \"localhost\")");
    }
}
