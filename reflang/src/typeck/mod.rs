//! The refinement type system.
//!
//! The [`Typer`] is the main entry point for checking. It owns the defined
//! languages and type aliases, normalizes surface type annotations into
//! [`NormalForm`], and bidirectionally checks predicate expressions against
//! expected types, collecting every error it finds in one pass.

pub mod builtins;
mod error;
mod types;

pub use error::{TypeError, TypeErrorKind};
pub use types::{NormalForm, Predicate, SimpleType};

use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::grammar::{compile_grammar, Grammar, GrammarError, LangResolver};
use crate::span::Span;
use crate::syntax::{Expr, ExprKind, Rule, TypeExpr, TypeExprKind};

/// The languages defined so far. Later definitions may reference earlier
/// ones by name.
#[derive(Debug, Clone, Default)]
pub struct LangTable {
    map: IndexMap<String, (Span, Arc<Grammar>)>,
}

impl LangTable {
    pub fn get(&self, name: &str) -> Option<&Arc<Grammar>> {
        self.map.get(name).map(|(_, g)| g)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Grammar>)> {
        self.map.iter().map(|(name, (_, g))| (name.as_str(), g))
    }

    fn insert(&mut self, name: String, span: Span, grammar: Arc<Grammar>) {
        self.map.insert(name, (span, grammar));
    }
}

impl LangResolver for LangTable {
    fn lookup(&self, name: &str) -> Option<Arc<Grammar>> {
        self.get(name).cloned()
    }
}

/// A parent-linked scope, read-only from children and bounded to one
/// checking pass.
#[derive(Debug, Default)]
pub struct Scope<'p> {
    parent: Option<&'p Scope<'p>>,
    bindings: FxHashMap<String, (Span, NormalForm)>,
}

impl<'p> Scope<'p> {
    pub fn root() -> Scope<'static> {
        Scope {
            parent: None,
            bindings: FxHashMap::default(),
        }
    }

    /// Open a child scope borrowing this one.
    pub fn child(&self) -> Scope<'_> {
        Scope {
            parent: Some(self),
            bindings: FxHashMap::default(),
        }
    }

    pub fn bind(&mut self, name: impl Into<String>, span: Span, nf: NormalForm) {
        self.bindings.insert(name.into(), (span, nf));
    }

    pub fn lookup(&self, name: &str) -> Option<&NormalForm> {
        match self.bindings.get(name) {
            Some((_, nf)) => Some(nf),
            None => self.parent.and_then(|p| p.lookup(name)),
        }
    }

    fn is_bound_locally(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }
}

/// The type checker.
#[derive(Debug, Default)]
pub struct Typer {
    langs: LangTable,
    aliases: IndexMap<String, (Span, NormalForm)>,
    errors: Vec<TypeError>,
}

impl Typer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The languages defined so far.
    pub fn langs(&self) -> &LangTable {
        &self.langs
    }

    /// The errors collected so far in this pass.
    pub fn errors(&self) -> &[TypeError] {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<TypeError> {
        std::mem::take(&mut self.errors)
    }

    fn error(&mut self, kind: TypeErrorKind, span: Span) {
        self.errors.push(TypeError::new(kind, span));
    }

    /// Define a language from a rule set and register it as a type alias.
    ///
    /// The alias normalizes to the compiled grammar type refined by the
    /// implicit membership predicate `_ in name`, so the name can be used
    /// as an ordinary semantic type afterwards.
    pub fn define_lang(
        &mut self,
        name: &str,
        span: Span,
        rules: Vec<Rule>,
    ) -> Result<Arc<Grammar>, Vec<GrammarError>> {
        if self.langs.contains(name) || self.aliases.contains_key(name) {
            self.error(TypeErrorKind::RedefinedName(name.to_string()), span);
            return Err(Vec::new());
        }
        let grammar = Arc::new(compile_grammar(name, rules, &self.langs)?);
        self.langs.insert(name.to_string(), span, grammar.clone());
        self.aliases.insert(
            name.to_string(),
            (
                span,
                NormalForm::Refined {
                    base: SimpleType::Lang(grammar.clone()),
                    pred: Predicate::membership(name),
                },
            ),
        );
        Ok(grammar)
    }

    /// Register a type alias in normal form.
    pub fn define_type_alias(&mut self, name: &str, span: Span, nf: NormalForm) {
        if self.langs.contains(name) || self.aliases.contains_key(name) {
            self.error(TypeErrorKind::RedefinedName(name.to_string()), span);
        } else {
            self.aliases.insert(name.to_string(), (span, nf));
        }
    }

    fn resolve_lang(&mut self, name: &str, span: Span) -> Option<Arc<Grammar>> {
        match self.langs.get(name) {
            Some(grammar) => Some(grammar.clone()),
            None => {
                self.error(TypeErrorKind::UndefinedName(name.to_string()), span);
                None
            }
        }
    }

    /// Normalize a surface type annotation.
    pub fn normalize(&mut self, annot: &TypeExpr) -> NormalForm {
        match &annot.kind {
            TypeExprKind::Int => NormalForm::Simple(SimpleType::Int),
            TypeExprKind::Bool => NormalForm::Simple(SimpleType::Bool),
            TypeExprKind::String => NormalForm::Simple(SimpleType::String),
            TypeExprKind::Unit => NormalForm::Simple(SimpleType::Unit),
            TypeExprKind::List(elem) => {
                // Collection elements carry only a bare runtime representation.
                let elem = self.expand(elem);
                NormalForm::Simple(SimpleType::List(Box::new(elem)))
            }
            TypeExprKind::Fun(args, ret) => {
                let args = args.iter().map(|a| self.expand(a)).collect();
                let ret = self.expand(ret);
                NormalForm::Simple(SimpleType::Fun(args, Box::new(ret)))
            }
            TypeExprKind::Named(name) => match self.aliases.get(name) {
                Some((_, nf)) => nf.clone(),
                None => {
                    self.error(TypeErrorKind::UndefinedName(name.clone()), annot.span);
                    NormalForm::Simple(SimpleType::Error)
                }
            },
            TypeExprKind::Refinement { base, pred } => {
                let base = self.normalize(base);
                base.refined(Predicate::new((**pred).clone()))
            }
        }
    }

    /// Normalize, erroring if the result still carries a refinement.
    pub fn expand(&mut self, annot: &TypeExpr) -> SimpleType {
        match self.normalize(annot) {
            NormalForm::Simple(base) => base,
            NormalForm::Refined { base, pred } => {
                let actual = NormalForm::Refined {
                    base: base.clone(),
                    pred,
                }
                .to_string();
                self.error(TypeErrorKind::ExpectedSimpleType { actual }, annot.span);
                base
            }
        }
    }

    /// Infer the simple type of an expression.
    pub fn infer(&mut self, expr: &Expr, scope: &Scope) -> SimpleType {
        match &expr.kind {
            ExprKind::Int(_) => SimpleType::Int,
            ExprKind::Bool(_) => SimpleType::Bool,
            ExprKind::Str(_) => SimpleType::String,
            ExprKind::Var(name) => match scope.lookup(name) {
                Some(nf) => nf.base_type().clone(),
                None => match builtins::signature(name) {
                    Some(sig) => sig,
                    None => {
                        self.error(TypeErrorKind::UndefinedName(name.clone()), expr.span);
                        SimpleType::Error
                    }
                },
            },
            ExprKind::App { fun, args } => match self.infer(fun, scope) {
                SimpleType::Fun(params, ret) => {
                    if params.len() != args.len() {
                        self.error(
                            TypeErrorKind::ArityMismatch {
                                expected: params.len(),
                                actual: args.len(),
                            },
                            expr.span,
                        );
                    }
                    for (param, arg) in params.iter().zip(args) {
                        self.ensure(arg, param, scope);
                    }
                    *ret
                }
                SimpleType::Error => SimpleType::Error,
                other => {
                    self.error(
                        TypeErrorKind::NotAFunction {
                            actual: other.to_string(),
                        },
                        fun.span,
                    );
                    SimpleType::Error
                }
            },
            ExprKind::InLang { receiver, lang } => {
                self.ensure(receiver, &SimpleType::String, scope);
                self.resolve_lang(lang, expr.span);
                SimpleType::Bool
            }
            ExprKind::Select {
                receiver,
                select_all,
                lang,
                path,
            } => {
                self.ensure(receiver, &SimpleType::String, scope);
                if let Some(grammar) = self.resolve_lang(lang, expr.span) {
                    if let Err(err) = path.validate(&grammar, !select_all) {
                        self.error(TypeErrorKind::InvalidPath(err), expr.span);
                    }
                }
                if *select_all {
                    SimpleType::List(Box::new(SimpleType::String))
                } else {
                    SimpleType::String
                }
            }
            ExprKind::IfThenElse {
                cond,
                then_branch,
                else_branch,
            } => {
                self.ensure(cond, &SimpleType::Bool, scope);
                let ty = self.infer(then_branch, scope);
                self.ensure(else_branch, &ty, scope);
                ty
            }
            ExprKind::Lambda { .. } => {
                // Lambdas are only checked against an expected function type.
                self.error(TypeErrorKind::MissingAnnotation, expr.span);
                SimpleType::Error
            }
        }
    }

    /// Check an expression against an expected simple type.
    pub fn ensure(&mut self, expr: &Expr, expected: &SimpleType, scope: &Scope) {
        match (&expr.kind, expected) {
            (ExprKind::Lambda { params, body }, SimpleType::Fun(param_tys, ret)) => {
                if params.len() != param_tys.len() {
                    self.error(
                        TypeErrorKind::ArityMismatch {
                            expected: param_tys.len(),
                            actual: params.len(),
                        },
                        expr.span,
                    );
                }
                let mut formal = scope.child();
                for (param, ty) in params.iter().zip(param_tys) {
                    if formal.is_bound_locally(param) {
                        self.error(TypeErrorKind::RedefinedName(param.clone()), expr.span);
                    } else {
                        formal.bind(param.clone(), expr.span, NormalForm::Simple(ty.clone()));
                    }
                }
                self.ensure(body, ret, &formal);
            }
            (ExprKind::Lambda { .. }, SimpleType::Error) => {}
            (ExprKind::Lambda { .. }, _) => {
                self.error(
                    TypeErrorKind::TypeMismatch {
                        expected: expected.to_string(),
                        actual: "fun type".to_string(),
                    },
                    expr.span,
                );
            }
            (
                ExprKind::IfThenElse {
                    cond,
                    then_branch,
                    else_branch,
                },
                _,
            ) => {
                self.ensure(cond, &SimpleType::Bool, scope);
                self.ensure(then_branch, expected, scope);
                self.ensure(else_branch, expected, scope);
            }
            _ => {
                // Fall back to infer mode.
                let actual = self.infer(expr, scope);
                if !is_subtype(&actual, expected) {
                    self.error(
                        TypeErrorKind::TypeMismatch {
                            expected: expected.to_string(),
                            actual: actual.to_string(),
                        },
                        expr.span,
                    );
                }
            }
        }
    }

    /// Check an expression, returning the errors of just this check.
    pub fn check(
        &mut self,
        expr: &Expr,
        expected: &SimpleType,
        scope: &Scope,
    ) -> Result<(), Vec<TypeError>> {
        let before = self.errors.len();
        self.ensure(expr, expected, scope);
        if self.errors.len() > before {
            Err(self.errors.split_off(before))
        } else {
            Ok(())
        }
    }

    pub fn is_subtype(&self, lower: &SimpleType, upper: &SimpleType) -> bool {
        is_subtype(lower, upper)
    }
}

/// The subtyping lattice: reflexive; everything below `top`; lists are
/// covariant; functions are contravariant in arguments and covariant in the
/// return type; a grammar type widens to plain `string`.
pub fn is_subtype(lower: &SimpleType, upper: &SimpleType) -> bool {
    if lower == upper {
        return true;
    }
    match (lower, upper) {
        (SimpleType::Error, _) | (_, SimpleType::Error) => true,
        (_, SimpleType::Top) => true,
        (SimpleType::List(a), SimpleType::List(b)) => is_subtype(a, b),
        (SimpleType::Fun(args1, ret1), SimpleType::Fun(args2, ret2))
            if args1.len() == args2.len() =>
        {
            is_subtype(ret1, ret2)
                && args1
                    .iter()
                    .zip(args2)
                    .all(|(a1, a2)| is_subtype(a2, a1))
        }
        (SimpleType::Lang(_), SimpleType::String) => true,
        _ => false,
    }
}
