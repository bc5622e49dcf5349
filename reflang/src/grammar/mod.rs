//! Compiled grammars.
//!
//! A [`Grammar`] is built once from a validated rule set by
//! [`compile_grammar`], and is immutable afterwards: membership testing,
//! parsing, selection, and the multiplicity counter are all pure functions
//! of the compiled maps, so a grammar can be shared read-only (via `Arc`)
//! across consumers.

mod compile;
mod earley;
pub mod error;
mod tree;

pub use compile::{compile_grammar, LangResolver, NoExternalLangs};
pub use error::{GrammarError, GrammarErrorKind};
pub use tree::DerivationTree;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use crate::path::PathSelector;
use crate::syntax::{Clause, ClauseKind};

/// One element of a canonical alternative: literal text or a reference to a
/// nonterminal.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Lit(String),
    Ref(String),
}

/// A canonical alternative: the concatenation of its terms.
pub type Alternative = Vec<Term>;

/// How many times a nonterminal can occur beneath a clause, across every
/// derivation.
///
/// The analysis is deliberately conservative: any repetition that can reach
/// the target yields [`Multiplicity::Many`], and alternation branches must
/// agree exactly to keep a determinate count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    /// The target never occurs.
    Zero,
    /// The target occurs exactly once on every derivation.
    One,
    /// The target may occur several times, or a fixed count cannot be
    /// established.
    Many,
}

impl Multiplicity {
    /// Sequential composition: saturating addition of occurrence counts.
    fn add(self, other: Multiplicity) -> Multiplicity {
        use Multiplicity::*;
        match (self, other) {
            (Zero, n) | (n, Zero) => n,
            (One, One) => Many,
            _ => Many,
        }
    }

    /// Alternation: branches that disagree leave the count indeterminate.
    fn join(self, other: Multiplicity) -> Multiplicity {
        if self == other {
            self
        } else {
            Multiplicity::Many
        }
    }
}

/// A compiled, immutable grammar.
#[derive(Debug)]
pub struct Grammar {
    name: String,
    /// The original rule bodies, keyed by rule name (imported grammars
    /// included, under qualified names). Needed by the counter and by path
    /// validation.
    clauses: IndexMap<String, Clause>,
    /// The canonical context-free form: nonterminal -> alternatives.
    canonical: IndexMap<String, Vec<Alternative>>,
}

impl Grammar {
    /// The name this grammar was defined under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The rule-defined nonterminals (excluding synthesized ones).
    pub fn defined_symbols(&self) -> impl Iterator<Item = &str> {
        self.clauses.keys().map(String::as_str)
    }

    pub fn is_defined(&self, symbol: &str) -> bool {
        self.clauses.contains_key(symbol)
    }

    /// The canonical nonterminal -> alternatives map.
    pub fn canonical(&self) -> &IndexMap<String, Vec<Alternative>> {
        &self.canonical
    }

    /// Test whether `word` belongs to the language.
    pub fn member(&self, word: &str) -> bool {
        earley::recognize(self, word)
    }

    /// Parse `word` into a derivation tree.
    pub fn parse(&self, word: &str) -> Result<DerivationTree, WordError> {
        earley::parse(self, word).ok_or_else(|| WordError {
            grammar: self.name.clone(),
            word: word.to_string(),
        })
    }

    /// Apply a path selector to `word`, returning the selected substrings.
    /// A word outside the language selects nothing.
    pub fn select_all(&self, word: &str, path: &PathSelector) -> Vec<String> {
        match self.parse(word) {
            Ok(tree) => path.select(&tree).iter().map(|t| t.text()).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Apply a path selector expected to match exactly one node.
    pub fn select_one(&self, word: &str, path: &PathSelector) -> Result<String, SelectError> {
        let mut selected = self.select_all(word, path);
        if selected.len() == 1 {
            Ok(selected.pop().unwrap())
        } else {
            Err(SelectError {
                path: path.to_string(),
                selected,
            })
        }
    }

    /// Count how many times `target` can occur beneath the rule named
    /// `within`. With `direct` set, only direct (EBNF-level) children count;
    /// otherwise the whole subtree is considered.
    pub fn count(&self, target: &str, within: &str, direct: bool) -> Multiplicity {
        match self.clauses.get(within) {
            Some(clause) => {
                let mut visiting = FxHashSet::default();
                visiting.insert(within.to_string());
                self.count_clause(target, clause, direct, &mut visiting)
            }
            None => Multiplicity::Zero,
        }
    }

    fn count_clause(
        &self,
        target: &str,
        clause: &Clause,
        direct: bool,
        visiting: &mut FxHashSet<String>,
    ) -> Multiplicity {
        match &clause.kind {
            ClauseKind::Symbol(name) => {
                let mut n = if name == target {
                    Multiplicity::One
                } else {
                    Multiplicity::Zero
                };
                if !direct {
                    // Recurse into the referenced rule's own body, guarding
                    // against cycles through recursive rules.
                    if let Some(body) = self.clauses.get(name) {
                        if visiting.insert(name.clone()) {
                            n = n.add(self.count_clause(target, body, direct, visiting));
                            visiting.remove(name);
                        }
                    }
                }
                n
            }
            ClauseKind::Rep { inner, .. } => {
                // Any repetition destroys static uniqueness, `{1,1}` included.
                if self.count_clause(target, inner, direct, visiting) == Multiplicity::Zero {
                    Multiplicity::Zero
                } else {
                    Multiplicity::Many
                }
            }
            ClauseKind::Seq(clauses) => clauses
                .iter()
                .map(|c| self.count_clause(target, c, direct, visiting))
                .fold(Multiplicity::Zero, Multiplicity::add),
            ClauseKind::Alt(clauses) => clauses
                .iter()
                .map(|c| self.count_clause(target, c, direct, visiting))
                .reduce(Multiplicity::join)
                .unwrap_or(Multiplicity::Zero),
            ClauseKind::Token(_) | ClauseKind::CharSet { .. } => Multiplicity::Zero,
        }
    }
}

/// A word rejected by the grammar.
#[derive(Debug, Clone, thiserror::Error)]
#[error("`{word}` is not a word of language {grammar}")]
pub struct WordError {
    pub grammar: String,
    pub word: String,
}

/// A unique selection that did not match exactly one node.
#[derive(Debug, Clone, thiserror::Error)]
#[error("path `{path}` selected {} node(s), expected exactly one", selected.len())]
pub struct SelectError {
    pub path: String,
    pub selected: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse_rules;

    fn grammar(src: &str) -> Grammar {
        compile_grammar("test", parse_rules(src).unwrap(), &NoExternalLangs).unwrap()
    }

    #[test]
    fn test_member_ambiguous_alternatives() {
        let g = grammar("start: \"a\" | \"a\" \"a\";");
        assert!(g.member("a"));
        assert!(g.member("aa"));
        assert!(!g.member("aaa"));
        assert!(!g.member(""));
    }

    #[test]
    fn test_count_repetition_is_many() {
        let g = grammar("start: digit+; digit: [0-9];");
        assert_eq!(g.count("digit", "start", false), Multiplicity::Many);
    }

    #[test]
    fn test_count_single_reference_is_one() {
        let g = grammar("start: digit; digit: [0-9];");
        assert_eq!(g.count("digit", "start", false), Multiplicity::One);
    }

    #[test]
    fn test_count_sequence_saturates() {
        let g = grammar("start: digit \"-\" digit; digit: [0-9];");
        assert_eq!(g.count("digit", "start", false), Multiplicity::Many);
    }

    #[test]
    fn test_count_disagreeing_alternatives() {
        let g = grammar("start: digit | digit digit; digit: [0-9];");
        assert_eq!(g.count("digit", "start", false), Multiplicity::Many);
    }

    #[test]
    fn test_count_direct_does_not_descend() {
        let g = grammar("start: outer; outer: digit; digit: [0-9];");
        assert_eq!(g.count("digit", "start", true), Multiplicity::Zero);
        assert_eq!(g.count("digit", "start", false), Multiplicity::One);
    }

    #[test]
    fn test_count_recursive_rule_terminates() {
        let g = grammar("start: expr; expr: \"(\" expr \")\" | \"x\";");
        assert_eq!(g.count("expr", "start", false), Multiplicity::Many);
    }
}
