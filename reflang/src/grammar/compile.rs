//! Grammar validation and EBNF -> CFG lowering.
//!
//! Validation collects every violation across the rule set before giving
//! up. Lowering then canonicalizes the clauses into a plain context-free
//! alternative map:
//!
//! - char sets expand to one single-character alternative each;
//! - nested alternation inside a concatenation is boxed into a fresh
//!   nonterminal;
//! - bounded repetition `{m,n}` expands to the explicit unrollings
//!   `element^m .. element^n`;
//! - unbounded repetition `{m,}` expands to `element^m` followed by a
//!   self-referential optional nonterminal, avoiding left recursion.
//!
//! The builder owns a monotonic fresh-name counter and is consumed to
//! produce the immutable [`Grammar`].

use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::syntax::{Clause, ClauseKind, Rule};

use super::error::{GrammarError, GrammarErrorKind};
use super::{Alternative, Grammar, Term};

/// Resolves references to languages defined elsewhere.
pub trait LangResolver {
    fn lookup(&self, name: &str) -> Option<Arc<Grammar>>;
}

/// A resolver that knows no external languages.
pub struct NoExternalLangs;

impl LangResolver for NoExternalLangs {
    fn lookup(&self, _name: &str) -> Option<Arc<Grammar>> {
        None
    }
}

/// Compile a rule set into a [`Grammar`]. All definition errors are
/// collected and returned together.
pub fn compile_grammar(
    name: &str,
    rules: Vec<Rule>,
    resolver: &dyn LangResolver,
) -> Result<Grammar, Vec<GrammarError>> {
    let errors = validate(&rules, resolver);
    if !errors.is_empty() {
        return Err(errors);
    }

    let mut builder = GrammarBuilder {
        local: rules.iter().map(|r| r.name.clone()).collect(),
        clauses: IndexMap::new(),
        canonical: IndexMap::new(),
        next_fresh: 0,
        resolver,
        imported: FxHashSet::default(),
    };

    for rule in &rules {
        // Pre-register rule names so they precede synthesized ones in the map.
        builder.canonical.insert(rule.name.clone(), Vec::new());
    }
    for rule in rules {
        let alternatives = match rule.body.kind {
            ClauseKind::Alt(ref clauses) => {
                clauses.iter().map(|c| builder.convert(c)).collect()
            }
            _ => vec![builder.convert(&rule.body)],
        };
        *builder
            .canonical
            .get_mut(&rule.name)
            .expect("every rule name is pre-registered") = alternatives;
        builder.clauses.insert(rule.name, rule.body);
    }

    debug!(
        grammar = name,
        rules = builder.clauses.len(),
        nonterminals = builder.canonical.len(),
        "compiled grammar"
    );

    Ok(Grammar {
        name: name.to_string(),
        clauses: builder.clauses,
        canonical: builder.canonical,
    })
}

/// Check a rule set for definition errors; all violations are collected.
pub fn validate(rules: &[Rule], resolver: &dyn LangResolver) -> Vec<GrammarError> {
    let mut errors = Vec::new();

    let mut defined: IndexMap<&str, &Rule> = IndexMap::new();
    for rule in rules {
        if defined.contains_key(rule.name.as_str()) {
            errors.push(GrammarError::new(
                GrammarErrorKind::RedefinedRule(rule.name.clone()),
                rule.name_span,
            ));
        } else {
            defined.insert(&rule.name, rule);
        }
    }

    if !defined.contains_key("start") {
        let span = rules.first().map(|r| r.name_span).unwrap_or_default();
        errors.push(GrammarError::new(GrammarErrorKind::MissingStartRule, span));
    }

    let mut unused: FxHashSet<&str> = defined.keys().copied().filter(|n| *n != "start").collect();

    fn check<'r>(
        clause: &'r Clause,
        defined: &IndexMap<&str, &Rule>,
        unused: &mut FxHashSet<&'r str>,
        resolver: &dyn LangResolver,
        errors: &mut Vec<GrammarError>,
    ) {
        match &clause.kind {
            ClauseKind::Token(_) => {}
            ClauseKind::CharSet { lo, hi } => {
                if hi <= lo {
                    errors.push(GrammarError::new(
                        GrammarErrorKind::InvalidCharRange { lo: *lo, hi: *hi },
                        clause.span,
                    ));
                }
            }
            ClauseKind::Symbol(name) if name == "start" => {
                errors.push(GrammarError::new(
                    GrammarErrorKind::StartReference,
                    clause.span,
                ));
            }
            ClauseKind::Symbol(name) => {
                if defined.contains_key(name.as_str()) {
                    unused.remove(name.as_str());
                } else if resolver.lookup(name).is_none() {
                    errors.push(GrammarError::new(
                        GrammarErrorKind::UndefinedSymbol(name.clone()),
                        clause.span,
                    ));
                }
            }
            ClauseKind::Rep {
                inner,
                lower,
                upper,
            } => {
                check(inner, defined, unused, resolver, errors);
                match (lower, upper) {
                    (lower, Some(upper)) if lower == upper && *upper <= 1 => {
                        errors.push(GrammarError::new(
                            GrammarErrorKind::RedundantRepetition(*upper),
                            clause.span,
                        ));
                    }
                    (lower, Some(upper)) if upper < lower || *upper == 0 => {
                        errors.push(GrammarError::new(
                            GrammarErrorKind::InvalidRepetitionBound {
                                lower: *lower,
                                upper: *upper,
                            },
                            clause.span,
                        ));
                    }
                    _ => {}
                }
            }
            ClauseKind::Seq(clauses) | ClauseKind::Alt(clauses) => {
                for clause in clauses {
                    check(clause, defined, unused, resolver, errors);
                }
            }
        }
    }

    for rule in rules {
        check(&rule.body, &defined, &mut unused, resolver, &mut errors);
    }

    for name in unused {
        errors.push(GrammarError::new(
            GrammarErrorKind::UnusedRule(name.to_string()),
            defined[name].name_span,
        ));
    }

    errors
}

struct GrammarBuilder<'r> {
    local: FxHashSet<String>,
    clauses: IndexMap<String, Clause>,
    canonical: IndexMap<String, Vec<Alternative>>,
    next_fresh: u32,
    resolver: &'r dyn LangResolver,
    imported: FxHashSet<String>,
}

impl GrammarBuilder<'_> {
    fn fresh_name(&mut self) -> String {
        let name = format!("-{}", self.next_fresh);
        self.next_fresh += 1;
        name
    }

    /// Lower a clause to a concatenation fragment, registering fresh
    /// nonterminals for anything that is not plain concatenation.
    fn convert(&mut self, clause: &Clause) -> Alternative {
        match &clause.kind {
            ClauseKind::Token(text) => {
                if text.is_empty() {
                    Vec::new()
                } else {
                    vec![Term::Lit(text.clone())]
                }
            }
            ClauseKind::CharSet { lo, hi } => {
                let fresh = self.fresh_name();
                let alternatives = (*lo..=*hi)
                    .map(|c| vec![Term::Lit(c.to_string())])
                    .collect();
                self.canonical.insert(fresh.clone(), alternatives);
                vec![Term::Ref(fresh)]
            }
            ClauseKind::Symbol(name) => {
                if !self.local.contains(name) {
                    self.import_lang(name);
                }
                vec![Term::Ref(name.clone())]
            }
            ClauseKind::Rep {
                inner,
                lower,
                upper,
            } => {
                let element = self.convert(inner);
                let fresh = self.fresh_name();
                match upper {
                    Some(upper) => {
                        let alternatives = (*lower..=*upper)
                            .map(|k| repeat(&element, k))
                            .collect();
                        self.canonical.insert(fresh.clone(), alternatives);
                    }
                    None => {
                        let required = repeat(&element, *lower);
                        if required.is_empty() {
                            // `e*`: the fresh nonterminal is its own optional.
                            let mut rec = element.clone();
                            rec.push(Term::Ref(fresh.clone()));
                            self.canonical.insert(fresh.clone(), vec![Vec::new(), rec]);
                        } else {
                            let optionals = self.fresh_name();
                            let mut rec = element.clone();
                            rec.push(Term::Ref(optionals.clone()));
                            self.canonical
                                .insert(optionals.clone(), vec![Vec::new(), rec]);
                            let mut body = required;
                            body.push(Term::Ref(optionals));
                            self.canonical.insert(fresh.clone(), vec![body]);
                        }
                    }
                }
                vec![Term::Ref(fresh)]
            }
            ClauseKind::Seq(clauses) => {
                clauses.iter().flat_map(|c| self.convert(c)).collect()
            }
            ClauseKind::Alt(clauses) => {
                let fresh = self.fresh_name();
                let alternatives = clauses.iter().map(|c| self.convert(c)).collect();
                self.canonical.insert(fresh.clone(), alternatives);
                vec![Term::Ref(fresh)]
            }
        }
    }

    /// Merge an externally defined grammar into the compiled maps under
    /// qualified names, so the result stays self-contained.
    fn import_lang(&mut self, name: &str) {
        if !self.imported.insert(name.to_string()) {
            return;
        }
        let external = self
            .resolver
            .lookup(name)
            .expect("validated symbol must resolve");

        let rename = |symbol: &str| -> String {
            if symbol == "start" {
                name.to_string()
            } else if let Some(rest) = symbol.strip_prefix('-') {
                // Keep synthesized names transparent to selection.
                format!("-{name}.{rest}")
            } else {
                format!("{name}.{symbol}")
            }
        };

        for (symbol, alternatives) in external.canonical() {
            let renamed = alternatives
                .iter()
                .map(|alt| {
                    alt.iter()
                        .map(|term| match term {
                            Term::Lit(text) => Term::Lit(text.clone()),
                            Term::Ref(r) => Term::Ref(rename(r)),
                        })
                        .collect()
                })
                .collect();
            self.canonical.insert(rename(symbol), renamed);
        }
        for (symbol, clause) in &external.clauses {
            self.clauses
                .insert(rename(symbol), rename_clause(clause, &rename));
        }
    }
}

fn rename_clause(clause: &Clause, rename: &dyn Fn(&str) -> String) -> Clause {
    let kind = match &clause.kind {
        ClauseKind::Symbol(name) => ClauseKind::Symbol(rename(name)),
        ClauseKind::Rep {
            inner,
            lower,
            upper,
        } => ClauseKind::Rep {
            inner: Box::new(rename_clause(inner, rename)),
            lower: *lower,
            upper: *upper,
        },
        ClauseKind::Seq(clauses) => {
            ClauseKind::Seq(clauses.iter().map(|c| rename_clause(c, rename)).collect())
        }
        ClauseKind::Alt(clauses) => {
            ClauseKind::Alt(clauses.iter().map(|c| rename_clause(c, rename)).collect())
        }
        other => other.clone(),
    };
    Clause::new(kind, clause.span)
}

fn repeat(element: &Alternative, times: u32) -> Alternative {
    let mut out = Vec::with_capacity(element.len() * times as usize);
    for _ in 0..times {
        out.extend(element.iter().cloned());
    }
    out
}
