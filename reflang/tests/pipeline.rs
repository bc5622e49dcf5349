//! End-to-end tests for the reflang pipeline.
//!
//! These exercise the complete flow: grammar compilation, path selection,
//! type checking, constraint compilation, generator synthesis, and the
//! fuzz loop.

use std::sync::Arc;

use reflang::constraint::{compile_refinement, eval_formula};
use reflang::contract::{assert_pre, ContractError};
use reflang::eval::Evaluator;
use reflang::grammar::{compile_grammar, Grammar, Multiplicity, NoExternalLangs};
use reflang::path::PathSelector;
use reflang::producer::{build_generator, fuzz, ParamSpec, TestStatus};
use reflang::solver::{ConstraintSolver, SamplingSolver};
use reflang::span::Span;
use reflang::syntax::parse_rules;
use reflang::typeck::{NormalForm, Predicate, SimpleType, Typer};
use reflang::value::Value;

fn grammar(src: &str) -> Grammar {
    compile_grammar("test", parse_rules(src).unwrap(), &NoExternalLangs).unwrap()
}

fn typer_with(name: &str, rules: &str) -> Typer {
    let mut typer = Typer::new();
    typer
        .define_lang(name, Span::dummy(), parse_rules(rules).unwrap())
        .unwrap();
    typer
}

// ============================================================
// Specification scenarios
// ============================================================

#[test]
fn scenario_ambiguous_membership() {
    let g = grammar("start: \"a\" | \"a\" \"a\";");
    assert!(g.member("a"));
    assert!(g.member("aa"));
    assert!(!g.member("aaa"));
}

#[test]
fn scenario_descendant_selection() {
    let g = grammar("start: part (\"/\" part)*; part: [a-z]+;");
    let path = PathSelector::parse("..part").unwrap();
    assert_eq!(g.select_all("ab/cd/ef", &path), vec!["ab", "cd", "ef"]);
}

#[test]
fn scenario_stacked_refinements() {
    let typer = Typer::new();
    let evaluator = Evaluator::new(typer.langs());
    let nf = NormalForm::Simple(SimpleType::Int)
        .refined(Predicate::parse("_ > 0").unwrap())
        .refined(Predicate::parse("_ < 10").unwrap());
    assert!(evaluator.admits(&Value::Int(5), &nf).unwrap());
    assert!(!evaluator.admits(&Value::Int(-1), &nf).unwrap());
    assert!(!evaluator.admits(&Value::Int(15), &nf).unwrap());
}

#[test]
fn scenario_reachability_counts() {
    let repeated = grammar("start: digit+; digit: [0-9];");
    assert_eq!(repeated.count("digit", "start", false), Multiplicity::Many);

    let single = grammar("start: digit; digit: [0-9];");
    assert_eq!(single.count("digit", "start", false), Multiplicity::One);
}

// ============================================================
// Round trip: solver output is always a member
// ============================================================

#[test]
fn round_trip_solver_strings_are_members() {
    let g = Arc::new(grammar(
        "start: pair (\";\" pair)*; pair: key \"=\" value; key: [a-z]+; value: [0-9]+;",
    ));
    let solver = SamplingSolver::default();
    let mut session = solver.open(&g, None, 30);
    for _ in 0..30 {
        let word = session.produce().expect("unconstrained sampling");
        assert!(g.member(&word), "solver produced a non-member: {word:?}");
    }
}

// ============================================================
// Repetition lowering
// ============================================================

#[test]
fn repetition_bounded_lowering_is_exact() {
    let g = grammar("start: \"a\"{2,4};");
    for k in 0..8 {
        let word = "a".repeat(k);
        assert_eq!(g.member(&word), (2..=4).contains(&k), "k = {k}");
    }
}

#[test]
fn repetition_unbounded_lowering_by_enumeration() {
    let g = grammar("start: \"a\"{3,};");
    for k in 0..10 {
        let word = "a".repeat(k);
        assert_eq!(g.member(&word), k >= 3, "k = {k}");
    }
}

// ============================================================
// Counter vs. runtime selection
// ============================================================

#[test]
fn counter_one_means_singular_selection() {
    let g = grammar("start: key \"=\" value; key: [a-z]+; value: [0-9]+;");
    assert_eq!(g.count("key", "start", false), Multiplicity::One);
    let path = PathSelector::parse(".key").unwrap();
    assert!(path.validate(&g, true).is_ok());
    assert_eq!(g.select_all("ab=12", &path).len(), 1);
    assert_eq!(g.select_one("ab=12", &path).unwrap(), "ab");
}

#[test]
fn counter_zero_means_empty_selection() {
    let g = grammar("start: key \"=\" value; key: [a-z]+; value: [0-9]+;");
    assert_eq!(g.count("value", "key", true), Multiplicity::Zero);
    let path = PathSelector::parse(".key.value").unwrap();
    assert!(path.validate(&g, false).is_err());
}

// ============================================================
// Translation soundness (pointwise)
// ============================================================

#[test]
fn translation_agrees_with_direct_evaluation() {
    let typer = typer_with("Csv", "start: field (\",\" field)*; field: [a-z]+;");
    let csv = typer.langs().get("Csv").unwrap().clone();
    let evaluator = Evaluator::new(typer.langs());

    let predicates = [
        "length(_) >= 4",
        "startswith(_, \"a\")",
        "contains(_, \",\")",
        "forall(x -> length(x) <= 2, select_all(@Csv: ..field, _))",
        "exists(x -> x == \"ab\", select_all(@Csv: ..field, _))",
    ];
    let words = ["a", "ab", "ab,c", "ab,cde", "a,b,c"];

    for pred_src in predicates {
        let pred = Predicate::parse(pred_src).unwrap();
        let compiled = compile_refinement(&pred, None);
        let formula = compiled
            .formula
            .unwrap_or_else(|| panic!("{pred_src} should be translatable"));
        assert!(compiled.residual.is_empty());

        for word in words {
            let direct = evaluator.eval_pred(&pred, &Value::Str(word.into())).unwrap();
            let tree = csv.parse(word).unwrap();
            let via_formula = eval_formula(&formula, &tree).unwrap();
            assert_eq!(
                direct, via_formula,
                "{pred_src} disagrees on {word:?}: direct={direct}, formula={via_formula}"
            );
        }
    }
}

// ============================================================
// Typed end-to-end flow
// ============================================================

#[test]
fn checked_refinement_drives_generation() {
    let mut typer = typer_with("Digits", "start: [0-9]{1,3};");

    // The refinement predicate type-checks against the bound value.
    let pred = Predicate::parse("int(_) >= 10 && int(_) < 100").unwrap();
    let mut scope = reflang::typeck::Scope::root();
    scope.bind("_", Span::dummy(), NormalForm::Simple(SimpleType::String));
    typer
        .check(pred.expr(), &SimpleType::Bool, &scope)
        .expect("refinement predicate must type-check");

    let digits = typer.langs().get("Digits").unwrap().clone();
    let nf = NormalForm::Simple(SimpleType::Lang(digits)).refined(pred);

    let mut generator = build_generator(
        vec![ParamSpec::new("n", nf)],
        &[],
        typer.langs(),
        Arc::new(SamplingSolver::default()),
    )
    .unwrap();

    for _ in 0..10 {
        let values = generator.produce().unwrap();
        let n: i64 = values[0].as_str().unwrap().parse().unwrap();
        assert!((10..100).contains(&n), "got {n}");
    }
}

#[test]
fn fuzz_loop_separates_outcomes() {
    let typer = typer_with("Digits", "start: [0-9]{1,2};");
    let digits = typer.langs().get("Digits").unwrap().clone();

    let mut generator = build_generator(
        vec![ParamSpec::new(
            "n",
            NormalForm::Simple(SimpleType::Lang(digits)),
        )],
        &[],
        typer.langs(),
        Arc::new(SamplingSolver::default()),
    )
    .unwrap();

    // The target enforces a precondition that one-digit inputs violate,
    // and panics on a specific value.
    let report = fuzz("parse_two_digits", 40, &mut generator, |inputs| {
        let word = inputs[0].as_str().unwrap();
        if word == "99" {
            panic!("overflow on 99");
        }
        assert_pre(
            word.len() == 2,
            "parse_two_digits",
            "length(n) == 2",
            &[("n", &inputs[0])],
        )?;
        Ok(TestStatus::Passed)
    });

    assert_eq!(report.records.len(), 40);
    assert_eq!(
        report.passed + report.violations + report.crashes,
        40,
        "every iteration is tallied exactly once"
    );
    assert!(report.violations > 0, "one-digit draws must violate");
    assert!(report.produce_failure.is_none());

    for (inputs, outcome) in &report.records {
        if let reflang::producer::Outcome::ContractViolation(err) = outcome {
            assert!(matches!(err, ContractError::PreconditionViolated { .. }));
            assert_eq!(inputs[0].as_str().unwrap().len(), 1);
        }
    }
}

// ============================================================
// Presets and diagnostics
// ============================================================

#[test]
fn email_like_grammar_from_core_rules() {
    let src = format!(
        "start: local \"@\" domain;\n\
         local: word (\".\" word)*;\n\
         domain: word (\".\" word)*;\n\
         word: (ALPHA | DIGIT)+;\n\
         {}",
        reflang::presets::core_rules(&["ALPHA", "DIGIT"])
    );
    let g = compile_grammar("Email", parse_rules(&src).unwrap(), &NoExternalLangs).unwrap();
    assert!(g.member("alice@example.com"));
    assert!(g.member("bob1@local"));
    assert!(!g.member("@example.com"));
    assert!(!g.member("alice"));

    let path = PathSelector::parse(".domain..word").unwrap();
    assert_eq!(
        g.select_all("alice@example.com", &path),
        vec!["example", "com"]
    );
}

#[test]
fn grammar_errors_render_against_source() {
    let src = "start: item{1}; item: [a-z]; dead: [0-9];";
    let errors =
        compile_grammar("Bad", parse_rules(src).unwrap(), &NoExternalLangs).unwrap_err();
    assert_eq!(errors.len(), 2, "redundant repetition and unused rule: {errors:?}");
    let rendered = reflang::diagnostics::render("bad.lang", src, &errors);
    assert!(rendered.contains("redundant"));
    assert!(rendered.contains("never used"));
}
