//! Path selectors over derivation trees.
//!
//! A selector is an ordered list of steps descending a derivation tree:
//! `.sym` collects direct children, `.sym[k]` the k-th direct child, and
//! `..sym` any descendant. A path starting with a step is absolute
//! (anchored at the tree root); a leading bare identifier instead anchors
//! the path at every occurrence of that symbol.
//!
//! Selectors are parsed once, statically validated against one grammar via
//! the multiplicity counter, and then reused to slice any derivation tree
//! of that grammar.

use std::fmt;

use thiserror::Error;

use crate::grammar::{DerivationTree, Grammar, Multiplicity};
use crate::syntax::SyntaxError;

/// One descent step of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Exactly the k-th direct occurrence (`.sym[k]`, k >= 1).
    At { symbol: String, k: u32 },
    /// Every direct occurrence (`.sym`).
    AllDirect { symbol: String },
    /// Every occurrence at any depth (`..sym`).
    AllIndirect { symbol: String },
}

impl Step {
    pub fn symbol(&self) -> &str {
        match self {
            Step::At { symbol, .. }
            | Step::AllDirect { symbol }
            | Step::AllIndirect { symbol } => symbol,
        }
    }

    /// Whether this step only descends one level.
    pub fn is_direct(&self) -> bool {
        !matches!(self, Step::AllIndirect { .. })
    }
}

/// A compiled path selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSelector {
    /// `None` anchors at the root; `Some(sym)` at every occurrence of `sym`.
    pub anchor: Option<String>,
    pub steps: Vec<Step>,
}

/// Static path-validation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PathError {
    #[error("undefined symbol `{0}` in path")]
    UndefinedSymbol(String),

    #[error("unreachable symbol `{symbol}`: it never occurs under `{from}`")]
    Unreachable { symbol: String, from: String },

    #[error("path not unique: there may exist multiple nodes labelled `{symbol}`")]
    NotUnique { symbol: String },
}

impl PathSelector {
    /// Parse a selector from its textual form.
    pub fn parse(src: &str) -> Result<Self, SyntaxError> {
        crate::syntax::parse_path(src)
    }

    pub fn is_absolute(&self) -> bool {
        self.anchor.is_none()
    }

    /// Check this selector against a grammar: every symbol must be defined,
    /// every step reachable from its predecessor, and, when the consuming
    /// context requires a single value, every selection must be guaranteed
    /// singular.
    pub fn validate(&self, grammar: &Grammar, require_unique: bool) -> Result<(), PathError> {
        for symbol in self
            .anchor
            .iter()
            .map(String::as_str)
            .chain(self.steps.iter().map(Step::symbol))
        {
            if !grammar.is_defined(symbol) {
                return Err(PathError::UndefinedSymbol(symbol.to_string()));
            }
        }

        let mut prev = "start";
        if let Some(anchor) = &self.anchor {
            if anchor != "start" {
                match grammar.count(anchor, "start", false) {
                    Multiplicity::Zero => {
                        return Err(PathError::Unreachable {
                            symbol: anchor.clone(),
                            from: "start".to_string(),
                        })
                    }
                    Multiplicity::Many if require_unique => {
                        return Err(PathError::NotUnique {
                            symbol: anchor.clone(),
                        })
                    }
                    _ => {}
                }
            }
            prev = anchor;
        }

        for step in &self.steps {
            let symbol = step.symbol();
            let mult = grammar.count(symbol, prev, step.is_direct());
            match (step, mult) {
                (_, Multiplicity::Zero) => {
                    return Err(PathError::Unreachable {
                        symbol: symbol.to_string(),
                        from: prev.to_string(),
                    })
                }
                // `[k]` selects at most one node; only the statically-empty
                // case is rejected here.
                (Step::At { k, .. }, Multiplicity::One) if *k > 1 => {
                    return Err(PathError::Unreachable {
                        symbol: symbol.to_string(),
                        from: prev.to_string(),
                    })
                }
                (Step::At { .. }, _) => {}
                (_, Multiplicity::Many) if require_unique => {
                    return Err(PathError::NotUnique {
                        symbol: symbol.to_string(),
                    })
                }
                _ => {}
            }
            prev = symbol;
        }
        Ok(())
    }

    /// Walk a derivation tree, collecting the selected subtrees.
    pub fn select<'t>(&self, root: &'t DerivationTree) -> Vec<&'t DerivationTree> {
        let mut current: Vec<&DerivationTree> = match &self.anchor {
            None => vec![root],
            Some(symbol) => root.descendants_labelled(symbol),
        };
        for step in &self.steps {
            if current.is_empty() {
                return current;
            }
            let mut next = Vec::new();
            for parent in current {
                match step {
                    Step::At { symbol, k } => {
                        let candidates = parent.children_labelled(symbol);
                        if candidates.len() >= *k as usize {
                            next.push(candidates[*k as usize - 1]);
                        }
                    }
                    Step::AllDirect { symbol } => {
                        next.extend(parent.children_labelled(symbol));
                    }
                    Step::AllIndirect { symbol } => {
                        next.extend(parent.descendants_labelled(symbol));
                    }
                }
            }
            current = next;
        }
        current
    }
}

impl fmt::Display for PathSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(anchor) = &self.anchor {
            write!(f, "{anchor}")?;
        }
        for step in &self.steps {
            match step {
                Step::At { symbol, k } => write!(f, ".{symbol}[{k}]")?,
                Step::AllDirect { symbol } => write!(f, ".{symbol}")?,
                Step::AllIndirect { symbol } => write!(f, "..{symbol}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{compile_grammar, NoExternalLangs};
    use crate::syntax::parse_rules;
    use pretty_assertions::assert_eq;

    fn grammar(src: &str) -> Grammar {
        compile_grammar("test", parse_rules(src).unwrap(), &NoExternalLangs).unwrap()
    }

    fn path(src: &str) -> PathSelector {
        PathSelector::parse(src).unwrap()
    }

    #[test]
    fn test_select_all_descendants() {
        let g = grammar("start: part (\"/\" part)*; part: [a-z]+;");
        let tree = g.parse("ab/cd/ef").unwrap();
        let selected: Vec<String> = path("..part")
            .select(&tree)
            .iter()
            .map(|t| t.text())
            .collect();
        assert_eq!(selected, vec!["ab", "cd", "ef"]);
    }

    #[test]
    fn test_select_kth_direct_child() {
        let g = grammar("start: part (\"/\" part)*; part: [a-z]+;");
        let tree = g.parse("ab/cd/ef").unwrap();
        assert_eq!(path(".part[2]").select(&tree)[0].text(), "cd");
        assert!(path(".part[4]").select(&tree).is_empty());
    }

    #[test]
    fn test_select_relative_anchor() {
        let g = grammar(
            "start: pair (\",\" pair)*; pair: key \"=\" value; key: [a-z]+; value: [0-9]+;",
        );
        let tree = g.parse("a=1,b=22").unwrap();
        let selected: Vec<String> = path("pair.value")
            .select(&tree)
            .iter()
            .map(|t| t.text())
            .collect();
        assert_eq!(selected, vec!["1", "22"]);
    }

    #[test]
    fn test_validate_undefined_symbol() {
        let g = grammar("start: part; part: [a-z]+;");
        assert_eq!(
            path("..nope").validate(&g, false),
            Err(PathError::UndefinedSymbol("nope".into()))
        );
    }

    #[test]
    fn test_validate_unreachable() {
        let g = grammar("start: a b; a: [a-z]; b: [0-9];");
        assert_eq!(
            path(".a.b").validate(&g, false),
            Err(PathError::Unreachable {
                symbol: "b".into(),
                from: "a".into()
            })
        );
    }

    #[test]
    fn test_validate_uniqueness() {
        let g = grammar("start: part (\"/\" part)*; part: [a-z]+;");
        let p = path("..part");
        assert_eq!(p.validate(&g, false), Ok(()));
        assert_eq!(
            p.validate(&g, true),
            Err(PathError::NotUnique {
                symbol: "part".into()
            })
        );

        let g2 = grammar("start: item; item: [a-z];");
        assert_eq!(path(".item").validate(&g2, true), Ok(()));
    }

    #[test]
    fn test_validate_statically_empty_index() {
        let g = grammar("start: item; item: [a-z];");
        assert!(matches!(
            path(".item[2]").validate(&g, true),
            Err(PathError::Unreachable { .. })
        ));
    }
}
