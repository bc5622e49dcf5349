//! Earley recognition and parsing over the canonical alternative map.
//!
//! The canonical form is an arbitrary context-free grammar (user rules may
//! be ambiguous or left-recursive), so a general chart parser is required.
//! Completed items carry back-pointers enough to rebuild one derivation
//! tree; ambiguous words get the first derivation in alternative order.

use rustc_hash::{FxHashMap, FxHashSet};

use super::{DerivationTree, Grammar, Term};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Sym {
    T(char),
    N(usize),
}

struct Tables {
    names: Vec<String>,
    alts: Vec<Vec<Vec<Sym>>>,
    start: usize,
}

fn build_tables(grammar: &Grammar) -> Option<Tables> {
    let canonical = grammar.canonical();
    let mut index: FxHashMap<&str, usize> = FxHashMap::default();
    let mut names = Vec::with_capacity(canonical.len());
    for (i, name) in canonical.keys().enumerate() {
        index.insert(name.as_str(), i);
        names.push(name.clone());
    }
    let start = *index.get("start")?;

    let mut alts = Vec::with_capacity(canonical.len());
    for alternatives in canonical.values() {
        let mut compiled = Vec::with_capacity(alternatives.len());
        for alternative in alternatives {
            let mut syms = Vec::new();
            for term in alternative {
                match term {
                    Term::Lit(text) => syms.extend(text.chars().map(Sym::T)),
                    Term::Ref(name) => syms.push(Sym::N(*index.get(name.as_str())?)),
                }
            }
            compiled.push(syms);
        }
        alts.push(compiled);
    }
    Some(Tables { names, alts, start })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Item {
    nt: usize,
    alt: usize,
    dot: usize,
    origin: usize,
}

struct Chart {
    /// Completed items: (nt, alt, origin, end).
    completed: FxHashSet<(usize, usize, usize, usize)>,
    /// (origin, nt) -> end positions of completed derivations.
    spans: FxHashMap<(usize, usize), FxHashSet<usize>>,
}

struct Run<'t> {
    tables: &'t Tables,
    word: &'t [char],
    sets: Vec<Vec<Item>>,
    seen: Vec<FxHashSet<Item>>,
    /// Nonterminals completed with an empty span at each position; needed so
    /// predictions arriving after such a completion still advance over it.
    empty_done: Vec<FxHashSet<usize>>,
    chart: Chart,
}

impl<'t> Run<'t> {
    fn new(tables: &'t Tables, word: &'t [char]) -> Self {
        let n = word.len();
        Self {
            tables,
            word,
            sets: vec![Vec::new(); n + 1],
            seen: vec![FxHashSet::default(); n + 1],
            empty_done: vec![FxHashSet::default(); n + 1],
            chart: Chart {
                completed: FxHashSet::default(),
                spans: FxHashMap::default(),
            },
        }
    }

    fn push(&mut self, at: usize, item: Item) {
        if self.seen[at].insert(item) {
            self.sets[at].push(item);
        }
    }

    fn next_sym(&self, item: Item) -> Option<Sym> {
        self.tables.alts[item.nt][item.alt].get(item.dot).copied()
    }

    fn run(&mut self) {
        let n = self.word.len();
        for alt in 0..self.tables.alts[self.tables.start].len() {
            self.push(
                0,
                Item {
                    nt: self.tables.start,
                    alt,
                    dot: 0,
                    origin: 0,
                },
            );
        }

        for k in 0..=n {
            let mut i = 0;
            while i < self.sets[k].len() {
                let item = self.sets[k][i];
                i += 1;
                match self.next_sym(item) {
                    Some(Sym::T(c)) => {
                        if k < n && self.word[k] == c {
                            self.push(k + 1, Item { dot: item.dot + 1, ..item });
                        }
                    }
                    Some(Sym::N(m)) => {
                        for alt in 0..self.tables.alts[m].len() {
                            self.push(k, Item { nt: m, alt, dot: 0, origin: k });
                        }
                        if self.empty_done[k].contains(&m) {
                            self.push(k, Item { dot: item.dot + 1, ..item });
                        }
                    }
                    None => self.complete(item, k),
                }
            }
        }
    }

    fn complete(&mut self, item: Item, k: usize) {
        self.chart
            .completed
            .insert((item.nt, item.alt, item.origin, k));
        self.chart
            .spans
            .entry((item.origin, item.nt))
            .or_default()
            .insert(k);
        if item.origin == k {
            self.empty_done[k].insert(item.nt);
        }

        let mut j = 0;
        while j < self.sets[item.origin].len() {
            let parent = self.sets[item.origin][j];
            j += 1;
            if self.next_sym(parent) == Some(Sym::N(item.nt)) {
                self.push(k, Item { dot: parent.dot + 1, ..parent });
            }
        }
    }
}

/// Test membership of `word`.
pub(super) fn recognize(grammar: &Grammar, word: &str) -> bool {
    let Some(tables) = build_tables(grammar) else {
        return false;
    };
    let chars: Vec<char> = word.chars().collect();
    let mut run = Run::new(&tables, &chars);
    run.run();
    run.chart
        .spans
        .get(&(0, tables.start))
        .is_some_and(|ends| ends.contains(&chars.len()))
}

/// Parse `word` into a derivation tree, if it is a member.
pub(super) fn parse(grammar: &Grammar, word: &str) -> Option<DerivationTree> {
    let tables = build_tables(grammar)?;
    let chars: Vec<char> = word.chars().collect();
    let mut run = Run::new(&tables, &chars);
    run.run();

    let n = chars.len();
    if !run
        .chart
        .spans
        .get(&(0, tables.start))
        .is_some_and(|ends| ends.contains(&n))
    {
        return None;
    }

    let mut builder = TreeBuilder {
        tables: &tables,
        word: &chars,
        chart: &run.chart,
        memo: FxHashMap::default(),
        active: FxHashSet::default(),
    };
    builder.build(tables.start, 0, n)
}

struct TreeBuilder<'t> {
    tables: &'t Tables,
    word: &'t [char],
    chart: &'t Chart,
    memo: FxHashMap<(usize, usize, usize), DerivationTree>,
    active: FxHashSet<(usize, usize, usize)>,
}

impl TreeBuilder<'_> {
    fn build(&mut self, nt: usize, start: usize, end: usize) -> Option<DerivationTree> {
        if let Some(tree) = self.memo.get(&(nt, start, end)) {
            return Some(tree.clone());
        }
        if !self.active.insert((nt, start, end)) {
            // Already being rebuilt further up this derivation; cutting the
            // cycle here only discards derivations with useless loops.
            return None;
        }

        let mut result = None;
        for alt in 0..self.tables.alts[nt].len() {
            if !self.chart.completed.contains(&(nt, alt, start, end)) {
                continue;
            }
            if let Some(children) = self.split(&self.tables.alts[nt][alt].clone(), 0, start, end) {
                result = Some(DerivationTree::Node {
                    symbol: self.tables.names[nt].clone(),
                    children,
                });
                break;
            }
        }

        self.active.remove(&(nt, start, end));
        if let Some(tree) = &result {
            self.memo.insert((nt, start, end), tree.clone());
        }
        result
    }

    /// Match `syms[from..]` against `word[pos..end]`, depth-first over the
    /// completion chart.
    fn split(
        &mut self,
        syms: &[Sym],
        from: usize,
        pos: usize,
        end: usize,
    ) -> Option<Vec<DerivationTree>> {
        if from == syms.len() {
            return (pos == end).then(Vec::new);
        }
        match syms[from] {
            Sym::T(c) => {
                if pos < end && self.word[pos] == c {
                    let mut rest = self.split(syms, from + 1, pos + 1, end)?;
                    rest.insert(0, DerivationTree::Leaf(c.to_string()));
                    Some(rest)
                } else {
                    None
                }
            }
            Sym::N(m) => {
                let mut ends: Vec<usize> = self
                    .chart
                    .spans
                    .get(&(pos, m))
                    .map(|ends| ends.iter().copied().filter(|e| *e <= end).collect())
                    .unwrap_or_default();
                ends.sort_unstable();
                for e in ends {
                    let Some(child) = self.build(m, pos, e) else {
                        continue;
                    };
                    if let Some(mut rest) = self.split(syms, from + 1, e, end) {
                        rest.insert(0, child);
                        return Some(rest);
                    }
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::grammar::{compile_grammar, NoExternalLangs};
    use crate::syntax::parse_rules;

    fn grammar(src: &str) -> crate::grammar::Grammar {
        compile_grammar("test", parse_rules(src).unwrap(), &NoExternalLangs).unwrap()
    }

    #[test]
    fn test_parse_builds_labelled_tree() {
        let g = grammar("start: part (\"/\" part)*; part: [a-z]+;");
        let tree = g.parse("ab/cd").unwrap();
        assert_eq!(tree.text(), "ab/cd");
        assert_eq!(tree.symbol(), Some("start"));
        let parts = tree.descendants_labelled("part");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].text(), "ab");
        assert_eq!(parts[1].text(), "cd");
    }

    #[test]
    fn test_empty_word() {
        let g = grammar("start: \"a\"*;");
        assert!(g.member(""));
        assert_eq!(g.parse("").unwrap().text(), "");
    }

    #[test]
    fn test_left_recursive_rule() {
        let g = grammar("start: expr; expr: expr \"+\" num | num; num: [0-9];");
        assert!(g.member("1+2+3"));
        assert!(!g.member("1+"));
        let tree = g.parse("1+2").unwrap();
        assert_eq!(tree.text(), "1+2");
    }

    #[test]
    fn test_nullable_chains() {
        let g = grammar("start: opt opt \"x\"; opt: \"a\"?;");
        assert!(g.member("x"));
        assert!(g.member("ax"));
        assert!(g.member("aax"));
        assert!(!g.member("aaax"));
    }

    #[test]
    fn test_multichar_tokens_split_into_leaves() {
        let g = grammar("start: \"ab\" \"cd\";");
        assert!(g.member("abcd"));
        assert!(!g.member("ab"));
    }
}
