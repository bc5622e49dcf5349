//! Grammar-constrained refinement types and contract-based fuzz generation.
//!
//! `reflang` lets a host attach refinement types whose carrier sets are
//! formal languages ("this string is a syntactically valid email", "this
//! integer is positive") to function parameters, statically check code
//! against them, and synthesize random inputs satisfying both the grammar
//! and the semantic refinement.
//!
//! # Pipeline
//!
//! 1. [`grammar::compile_grammar`] validates an EBNF-like rule set and
//!    lowers it to a canonical context-free form; the compiled [`Grammar`]
//!    offers membership testing, parsing into derivation trees, selection,
//!    and the reachability/multiplicity counter.
//! 2. [`path::PathSelector`] is a small path language over derivation
//!    trees, statically validated against a grammar via the counter.
//! 3. [`typeck::Typer`] normalizes type annotations into [`NormalForm`]
//!    and bidirectionally checks refinement predicates, with path validity
//!    as a side constraint.
//! 4. [`constraint::compile_refinement`] translates predicates into the
//!    solver's string-constraint theory where possible and keeps the rest
//!    as host-evaluated filters.
//! 5. [`producer::build_generator`] composes per-parameter generators into
//!    a joint producer honoring cross-parameter preconditions, and
//!    [`producer::fuzz`] drives the loop, tallying pass / contract-fail /
//!    crash / exit outcomes independently.
//!
//! Constraint *solving* is an external service behind
//! [`solver::ConstraintSolver`]; [`solver::SamplingSolver`] is the
//! built-in reference backend.
//!
//! # Example
//!
//! ```
//! use reflang::span::Span;
//! use reflang::syntax::parse_rules;
//! use reflang::typeck::Typer;
//! use reflang::path::PathSelector;
//!
//! let mut typer = Typer::new();
//! let csv = typer
//!     .define_lang(
//!         "Csv",
//!         Span::dummy(),
//!         parse_rules("start: field (\",\" field)*; field: [a-z]+;").unwrap(),
//!     )
//!     .unwrap();
//!
//! assert!(csv.member("a,bc"));
//! let fields = csv.select_all("a,bc", &PathSelector::parse("..field").unwrap());
//! assert_eq!(fields, vec!["a", "bc"]);
//! ```

pub mod constraint;
pub mod contract;
pub mod diagnostics;
pub mod eval;
pub mod grammar;
pub mod path;
pub mod presets;
pub mod producer;
pub mod solver;
pub mod span;
pub mod syntax;
pub mod typeck;
pub mod value;

pub use constraint::{compile_refinement, CompiledRefinement, Formula};
pub use contract::ContractError;
pub use eval::{value_has_type, Evaluator};
pub use grammar::{compile_grammar, DerivationTree, Grammar, GrammarError, Multiplicity};
pub use path::{PathError, PathSelector};
pub use producer::{build_generator, fuzz, FuzzReport, ParamSpec, Producer};
pub use solver::{ConstraintSolver, SamplingSolver, SolverSession};
pub use typeck::{NormalForm, Predicate, Scope, SimpleType, TypeError, Typer};
pub use value::Value;
