//! The external constraint-solver boundary, plus a reference backend.
//!
//! A solver session is opened from a compiled grammar, an optional formula,
//! and a sampling budget; each `produce` call yields one satisfying string
//! or signals exhaustion (`None`), upon which the caller may reopen a
//! session with a larger budget.
//!
//! [`SamplingSolver`] is the built-in backend: it draws random derivations
//! from the canonical grammar, bounded by a depth budget, and filters them
//! through formula evaluation on the derivation tree. It is deterministic
//! for a fixed seed.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::constraint::{eval_formula, Formula};
use crate::grammar::{Grammar, Term};

/// One solving session with a fixed budget.
pub trait SolverSession {
    /// Produce the next satisfying string, or `None` when the session's
    /// budget is exhausted.
    fn produce(&mut self) -> Option<String>;
}

/// Opens solver sessions.
pub trait ConstraintSolver {
    fn open(
        &self,
        grammar: &Arc<Grammar>,
        formula: Option<&Formula>,
        budget: u32,
    ) -> Box<dyn SolverSession>;
}

/// The reference backend: rejection sampling over random derivations.
#[derive(Debug, Clone)]
pub struct SamplingSolver {
    /// Preferred derivation depth; deeper expansions are steered toward
    /// minimal alternatives.
    pub max_depth: usize,
    /// Base RNG seed; sessions derive their seed from it and the budget.
    pub seed: u64,
}

impl Default for SamplingSolver {
    fn default() -> Self {
        Self {
            max_depth: 24,
            seed: 0x7261_6e64,
        }
    }
}

impl SamplingSolver {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }
}

/// Attempts drawn per unit of budget before giving up.
const ATTEMPTS_PER_SOLUTION: u32 = 64;

impl ConstraintSolver for SamplingSolver {
    fn open(
        &self,
        grammar: &Arc<Grammar>,
        formula: Option<&Formula>,
        budget: u32,
    ) -> Box<dyn SolverSession> {
        Box::new(SamplingSession {
            min_cost: min_costs(grammar),
            grammar: Arc::clone(grammar),
            formula: formula.cloned(),
            budget,
            produced: 0,
            max_depth: self.max_depth,
            rng: StdRng::seed_from_u64(self.seed ^ u64::from(budget)),
        })
    }
}

struct SamplingSession {
    grammar: Arc<Grammar>,
    formula: Option<Formula>,
    budget: u32,
    produced: u32,
    max_depth: usize,
    min_cost: FxHashMap<String, u32>,
    rng: StdRng,
}

impl SolverSession for SamplingSession {
    fn produce(&mut self) -> Option<String> {
        if self.produced >= self.budget {
            return None;
        }
        let attempts = self.budget.saturating_mul(ATTEMPTS_PER_SOLUTION);
        for _ in 0..attempts {
            let word = self.sample();
            if let Some(formula) = &self.formula {
                let Ok(tree) = self.grammar.parse(&word) else {
                    continue;
                };
                if !matches!(eval_formula(formula, &tree), Ok(true)) {
                    continue;
                }
            }
            self.produced += 1;
            return Some(word);
        }
        debug!(
            grammar = self.grammar.name(),
            budget = self.budget,
            "sampling exhausted without a satisfying word"
        );
        None
    }
}

impl SamplingSession {
    fn sample(&mut self) -> String {
        let mut out = String::new();
        self.expand("start", self.max_depth, &mut out);
        out
    }

    fn expand(&mut self, symbol: &str, depth: usize, out: &mut String) {
        let Some(alternatives) = self.grammar.canonical().get(symbol) else {
            return;
        };
        let within_budget: Vec<usize> = (0..alternatives.len())
            .filter(|&i| self.alt_cost(&alternatives[i]) <= depth as u32)
            .collect();
        let index = if within_budget.is_empty() {
            // Out of depth: fall back to a minimal alternative, which
            // strictly shrinks the remaining derivation height.
            (0..alternatives.len())
                .min_by_key(|&i| self.alt_cost(&alternatives[i]))
                .unwrap_or(0)
        } else {
            within_budget[self.rng.gen_range(0..within_budget.len())]
        };
        let alternative = alternatives[index].clone();
        for term in &alternative {
            match term {
                Term::Lit(text) => out.push_str(text),
                Term::Ref(name) => self.expand(name, depth.saturating_sub(1), out),
            }
        }
    }

    fn alt_cost(&self, alternative: &[Term]) -> u32 {
        let refs = alternative.iter().filter_map(|t| match t {
            Term::Ref(name) => Some(self.min_cost.get(name).copied().unwrap_or(u32::MAX)),
            Term::Lit(_) => None,
        });
        refs.max()
            .map(|deepest| deepest.saturating_add(1))
            .unwrap_or(1)
    }
}

/// Minimal derivation height of every nonterminal, by fixpoint iteration.
fn min_costs(grammar: &Grammar) -> FxHashMap<String, u32> {
    let mut costs: FxHashMap<String, u32> = FxHashMap::default();
    loop {
        let mut changed = false;
        for (symbol, alternatives) in grammar.canonical() {
            let best = alternatives
                .iter()
                .map(|alt| {
                    alt.iter()
                        .map(|term| match term {
                            Term::Lit(_) => 0,
                            Term::Ref(name) => {
                                costs.get(name).copied().unwrap_or(u32::MAX)
                            }
                        })
                        .max()
                        .map(|deepest| deepest.saturating_add(1))
                        .unwrap_or(1)
                })
                .min()
                .unwrap_or(u32::MAX);
            if best < costs.get(symbol).copied().unwrap_or(u32::MAX) {
                costs.insert(symbol.clone(), best);
                changed = true;
            }
        }
        if !changed {
            return costs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::compile_refinement;
    use crate::grammar::{compile_grammar, NoExternalLangs};
    use crate::syntax::parse_rules;
    use crate::typeck::Predicate;

    fn grammar(src: &str) -> Arc<Grammar> {
        Arc::new(compile_grammar("test", parse_rules(src).unwrap(), &NoExternalLangs).unwrap())
    }

    #[test]
    fn test_samples_are_members() {
        let g = grammar("start: part (\"/\" part)*; part: [a-z]+;");
        let mut session = SamplingSolver::default().open(&g, None, 20);
        for _ in 0..20 {
            let word = session.produce().expect("unconstrained sampling");
            assert!(g.member(&word), "sampled non-member {word:?}");
        }
    }

    #[test]
    fn test_session_budget_exhausts() {
        let g = grammar("start: \"a\";");
        let mut session = SamplingSolver::default().open(&g, None, 3);
        assert!(session.produce().is_some());
        assert!(session.produce().is_some());
        assert!(session.produce().is_some());
        assert!(session.produce().is_none());
    }

    #[test]
    fn test_formula_constrains_samples() {
        let g = grammar("start: [0-9]{1,3};");
        let compiled =
            compile_refinement(&Predicate::parse("length(_) == 2").unwrap(), None);
        let formula = compiled.formula.unwrap();
        let mut session = SamplingSolver::default().open(&g, Some(&formula), 10);
        for _ in 0..5 {
            let word = session.produce().expect("satisfiable constraint");
            assert_eq!(word.chars().count(), 2, "got {word:?}");
        }
    }

    #[test]
    fn test_unsatisfiable_formula_exhausts() {
        let g = grammar("start: \"ab\";");
        let compiled =
            compile_refinement(&Predicate::parse("length(_) == 99").unwrap(), None);
        let formula = compiled.formula.unwrap();
        let mut session = SamplingSolver::default().open(&g, Some(&formula), 2);
        assert!(session.produce().is_none());
    }
}
