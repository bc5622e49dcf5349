//! The constraint compiler.
//!
//! Predicates are split into conjunctive-normal-form conjuncts, each
//! conjunct is translated to the solver's string-constraint theory if
//! possible, and everything untranslatable is retained as a host-evaluated
//! post-generation filter. For multi-parameter preconditions, conjuncts
//! over a single parameter are routed into that parameter's own generator;
//! cross-parameter conjuncts become a filter over the whole tuple.

mod eval;
mod formula;
mod translate;

pub use eval::{eval_formula, FormulaError};
pub use formula::{ArithOp, CmpOp, Formula, Sort, SmtExpr, StrFun};
pub use translate::translate;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::syntax::{as_infix, as_prefix, Expr, ExprKind};
use crate::typeck::Predicate;

/// Split a predicate into its conjunctive-normal-form conjuncts.
///
/// `p && q` splits into both sides; `!(p || q)` splits into `!p` and `!q`;
/// anything else is one atomic conjunct.
pub fn cnf(expr: &Expr) -> Vec<Expr> {
    if let Some(("&&", lhs, rhs)) = as_infix(expr) {
        let mut conjuncts = cnf(lhs);
        conjuncts.extend(cnf(rhs));
        return conjuncts;
    }
    if let Some(("!", operand)) = as_prefix(expr) {
        if let Some(("||", lhs, rhs)) = as_infix(operand) {
            let mut conjuncts = cnf(&Expr::prefix("!", lhs.clone()));
            conjuncts.extend(cnf(&Expr::prefix("!", rhs.clone())));
            return conjuncts;
        }
    }
    vec![expr.clone()]
}

/// Conjoin conjuncts back into one expression (`true` when empty).
pub fn conjunction(mut conjuncts: Vec<Expr>) -> Expr {
    match conjuncts.len() {
        0 => Expr::new(ExprKind::Bool(true), crate::span::Span::dummy()),
        1 => conjuncts.pop().unwrap(),
        _ => {
            let mut iter = conjuncts.into_iter();
            let first = iter.next().unwrap();
            iter.fold(first, |acc, next| Expr::infix("&&", acc, next))
        }
    }
}

/// The free variable names of an expression. Applied builtin names are
/// collected too; callers intersect with the names they care about.
pub fn free_vars(expr: &Expr) -> FxHashSet<String> {
    let mut free = FxHashSet::default();
    let mut bound = Vec::new();
    collect_free(expr, &mut bound, &mut free);
    free
}

fn collect_free(expr: &Expr, bound: &mut Vec<String>, free: &mut FxHashSet<String>) {
    match &expr.kind {
        ExprKind::Int(_) | ExprKind::Bool(_) | ExprKind::Str(_) => {}
        ExprKind::Var(name) => {
            if !bound.iter().any(|b| b == name) {
                free.insert(name.clone());
            }
        }
        ExprKind::App { fun, args } => {
            collect_free(fun, bound, free);
            for arg in args {
                collect_free(arg, bound, free);
            }
        }
        ExprKind::InLang { receiver, .. } => collect_free(receiver, bound, free),
        ExprKind::Select { receiver, .. } => collect_free(receiver, bound, free),
        ExprKind::Lambda { params, body } => {
            let depth = bound.len();
            bound.extend(params.iter().cloned());
            collect_free(body, bound, free);
            bound.truncate(depth);
        }
        ExprKind::IfThenElse {
            cond,
            then_branch,
            else_branch,
        } => {
            collect_free(cond, bound, free);
            collect_free(then_branch, bound, free);
            collect_free(else_branch, bound, free);
        }
    }
}

/// Capture-avoiding substitution of free variables.
pub fn subst(expr: &Expr, map: &FxHashMap<String, Expr>) -> Expr {
    let mut bound = Vec::new();
    subst_in(expr, map, &mut bound)
}

fn subst_in(expr: &Expr, map: &FxHashMap<String, Expr>, bound: &mut Vec<String>) -> Expr {
    let kind = match &expr.kind {
        ExprKind::Var(name) => {
            if let Some(replacement) = map.get(name) {
                if !bound.iter().any(|b| b == name) {
                    return replacement.clone();
                }
            }
            expr.kind.clone()
        }
        ExprKind::App { fun, args } => ExprKind::App {
            fun: Box::new(subst_in(fun, map, bound)),
            args: args.iter().map(|a| subst_in(a, map, bound)).collect(),
        },
        ExprKind::InLang { receiver, lang } => ExprKind::InLang {
            receiver: Box::new(subst_in(receiver, map, bound)),
            lang: lang.clone(),
        },
        ExprKind::Select {
            receiver,
            select_all,
            lang,
            path,
        } => ExprKind::Select {
            receiver: Box::new(subst_in(receiver, map, bound)),
            select_all: *select_all,
            lang: lang.clone(),
            path: path.clone(),
        },
        ExprKind::Lambda { params, body } => {
            let depth = bound.len();
            bound.extend(params.iter().cloned());
            let body = Box::new(subst_in(body, map, bound));
            bound.truncate(depth);
            ExprKind::Lambda {
                params: params.clone(),
                body,
            }
        }
        ExprKind::IfThenElse {
            cond,
            then_branch,
            else_branch,
        } => ExprKind::IfThenElse {
            cond: Box::new(subst_in(cond, map, bound)),
            then_branch: Box::new(subst_in(then_branch, map, bound)),
            else_branch: Box::new(subst_in(else_branch, map, bound)),
        },
        other => other.clone(),
    };
    Expr::new(kind, expr.span)
}

/// Partition items by a predicate, preserving order.
pub fn classify<T>(items: Vec<T>, keep: impl Fn(&T) -> bool) -> (Vec<T>, Vec<T>) {
    let mut picked = Vec::new();
    let mut rest = Vec::new();
    for item in items {
        if keep(&item) {
            picked.push(item);
        } else {
            rest.push(item);
        }
    }
    (picked, rest)
}

/// Whether `expr` is exactly the implicit membership conjunct `_ in lang`.
/// The solver already guarantees membership of everything it produces, so
/// generators drop this conjunct instead of re-checking it.
pub fn is_membership_of(expr: &Expr, lang: &str) -> bool {
    matches!(
        &expr.kind,
        ExprKind::InLang { receiver, lang: l }
            if l == lang && matches!(receiver.kind, ExprKind::Var(ref x) if x == "_")
    )
}

/// The result of compiling one refinement predicate: the translatable
/// conjuncts as a single formula, plus the residual conjuncts to be checked
/// after generation.
#[derive(Debug, Clone)]
pub struct CompiledRefinement {
    pub formula: Option<Formula>,
    pub residual: Vec<Predicate>,
}

/// Compile a refinement predicate bound to `_`. Conjuncts naming a language
/// in `implied_membership` are dropped entirely (the solver guarantees
/// them).
pub fn compile_refinement(
    pred: &Predicate,
    implied_membership: Option<&str>,
) -> CompiledRefinement {
    let mut formulas = Vec::new();
    let mut residual = Vec::new();
    for conjunct in cnf(pred.expr()) {
        if let Some(lang) = implied_membership {
            if is_membership_of(&conjunct, lang) {
                continue;
            }
        }
        match translate(&conjunct, "_") {
            Some((term, Sort::Formula)) => formulas.push(Formula(term)),
            _ => residual.push(Predicate::new(conjunct)),
        }
    }
    CompiledRefinement {
        formula: Formula::conjoin(formulas),
        residual,
    }
}
