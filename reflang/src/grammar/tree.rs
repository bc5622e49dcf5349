//! Derivation trees produced by parsing a word against a compiled grammar.

use std::fmt;

/// A node of a derivation tree. Interior nodes are labelled with the
/// nonterminal they derive; leaves hold terminal text.
///
/// Nonterminals synthesized during grammar lowering (names starting with
/// `-`) appear as interior nodes but are structurally transparent: selection
/// and the structural predicates look through them.
#[derive(Debug, Clone, PartialEq)]
pub enum DerivationTree {
    Node {
        symbol: String,
        children: Vec<DerivationTree>,
    },
    Leaf(String),
}

impl DerivationTree {
    /// The nonterminal labelling this node, if it is one.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            DerivationTree::Node { symbol, .. } => Some(symbol),
            DerivationTree::Leaf(_) => None,
        }
    }

    pub fn children(&self) -> &[DerivationTree] {
        match self {
            DerivationTree::Node { children, .. } => children,
            DerivationTree::Leaf(_) => &[],
        }
    }

    /// Whether this node was synthesized during lowering rather than named
    /// by a user rule.
    pub fn is_synthesized(&self) -> bool {
        self.symbol().is_some_and(|s| s.starts_with('-'))
    }

    /// The terminal text this subtree derives.
    pub fn text(&self) -> String {
        let mut buf = String::new();
        self.write_text(&mut buf);
        buf
    }

    fn write_text(&self, buf: &mut String) {
        match self {
            DerivationTree::Leaf(text) => buf.push_str(text),
            DerivationTree::Node { children, .. } => {
                for child in children {
                    child.write_text(buf);
                }
            }
        }
    }

    /// The direct children labelled `symbol`, looking through synthesized
    /// intermediate nodes.
    pub fn children_labelled<'t>(&'t self, symbol: &str) -> Vec<&'t DerivationTree> {
        let mut out = Vec::new();
        self.collect_children(symbol, &mut out);
        out
    }

    fn collect_children<'t>(&'t self, symbol: &str, out: &mut Vec<&'t DerivationTree>) {
        for child in self.children() {
            if child.symbol() == Some(symbol) {
                out.push(child);
            } else if child.is_synthesized() {
                child.collect_children(symbol, out);
            }
        }
    }

    /// Every node in this subtree labelled `symbol`, at any depth, the
    /// subtree root included.
    pub fn descendants_labelled<'t>(&'t self, symbol: &str) -> Vec<&'t DerivationTree> {
        let mut out = Vec::new();
        self.collect_descendants(symbol, &mut out);
        out
    }

    fn collect_descendants<'t>(&'t self, symbol: &str, out: &mut Vec<&'t DerivationTree>) {
        if self.symbol() == Some(symbol) {
            out.push(self);
        }
        for child in self.children() {
            child.collect_descendants(symbol, out);
        }
    }
}

impl fmt::Display for DerivationTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DerivationTree::Leaf(text) => write!(f, "{text:?}"),
            DerivationTree::Node { symbol, children } => {
                write!(f, "<{symbol}>(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(symbol: &str, children: Vec<DerivationTree>) -> DerivationTree {
        DerivationTree::Node {
            symbol: symbol.to_string(),
            children,
        }
    }

    fn leaf(text: &str) -> DerivationTree {
        DerivationTree::Leaf(text.to_string())
    }

    #[test]
    fn test_text_concatenates_leaves() {
        let tree = node("start", vec![leaf("a"), node("part", vec![leaf("b"), leaf("c")])]);
        assert_eq!(tree.text(), "abc");
    }

    #[test]
    fn test_children_skip_synthesized_nodes() {
        // start -> -0 -> part, with another part directly below start
        let tree = node(
            "start",
            vec![
                node("-0", vec![node("part", vec![leaf("x")])]),
                node("part", vec![leaf("y")]),
            ],
        );
        let parts = tree.children_labelled("part");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].text(), "x");
        assert_eq!(parts[1].text(), "y");
    }

    #[test]
    fn test_descendants_include_self() {
        let tree = node("part", vec![node("part", vec![leaf("x")])]);
        assert_eq!(tree.descendants_labelled("part").len(), 2);
    }
}
