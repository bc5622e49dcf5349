//! Property-based suites for the specification's testable properties.

use proptest::prelude::*;

use reflang::constraint::{compile_refinement, eval_formula};
use reflang::eval::Evaluator;
use reflang::grammar::{compile_grammar, Grammar, Multiplicity, NoExternalLangs};
use reflang::path::PathSelector;
use reflang::syntax::parse_rules;
use reflang::typeck::{is_subtype, LangTable, NormalForm, Predicate, SimpleType};
use reflang::value::Value;

fn grammar(src: &str) -> Grammar {
    compile_grammar("test", parse_rules(src).unwrap(), &NoExternalLangs).unwrap()
}

fn simple_type() -> impl Strategy<Value = SimpleType> {
    let leaf = prop_oneof![
        Just(SimpleType::Top),
        Just(SimpleType::Int),
        Just(SimpleType::Bool),
        Just(SimpleType::String),
        Just(SimpleType::Unit),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            inner.clone().prop_map(|t| SimpleType::List(Box::new(t))),
            (proptest::collection::vec(inner.clone(), 0..3), inner)
                .prop_map(|(args, ret)| SimpleType::Fun(args, Box::new(ret))),
        ]
    })
}

proptest! {
    // --- Subtyping ---

    #[test]
    fn subtyping_is_reflexive(ty in simple_type()) {
        prop_assert!(is_subtype(&ty, &ty));
    }

    #[test]
    fn subtyping_is_transitive(
        t1 in simple_type(),
        t2 in simple_type(),
        t3 in simple_type(),
    ) {
        if is_subtype(&t1, &t2) && is_subtype(&t2, &t3) {
            prop_assert!(is_subtype(&t1, &t3));
        }
    }

    #[test]
    fn everything_widens_to_top(ty in simple_type()) {
        prop_assert!(is_subtype(&ty, &SimpleType::Top));
    }

    #[test]
    fn list_covariance_follows_elements(t1 in simple_type(), t2 in simple_type()) {
        let l1 = SimpleType::List(Box::new(t1.clone()));
        let l2 = SimpleType::List(Box::new(t2.clone()));
        prop_assert_eq!(is_subtype(&l1, &l2), is_subtype(&t1, &t2));
    }

    // --- Refinement flattening ---

    #[test]
    fn stacked_refinement_equals_conjoined(
        value in -50i64..50,
        lo in -20i64..20,
        hi in -20i64..20,
    ) {
        let langs = LangTable::default();
        let evaluator = Evaluator::new(&langs);

        let stacked = NormalForm::Simple(SimpleType::Int)
            .refined(Predicate::parse(&format!("_ > {lo}")).unwrap())
            .refined(Predicate::parse(&format!("_ < {hi}")).unwrap());
        let conjoined = NormalForm::Simple(SimpleType::Int)
            .refined(Predicate::parse(&format!("_ > {lo} && _ < {hi}")).unwrap());

        let v = Value::Int(value);
        prop_assert_eq!(
            evaluator.admits(&v, &stacked).unwrap(),
            evaluator.admits(&v, &conjoined).unwrap()
        );
    }

    // --- Repetition lowering ---

    #[test]
    fn bounded_repetition_accepts_exactly_the_range(
        lower in 0u32..4,
        extra in 1u32..4,
        k in 0usize..12,
    ) {
        let upper = lower + extra;
        let g = grammar(&format!("start: \"a\"{{{lower},{upper}}};"));
        let word = "a".repeat(k);
        let expected = (lower as usize..=upper as usize).contains(&k);
        prop_assert_eq!(g.member(&word), expected);
    }

    #[test]
    fn unbounded_repetition_accepts_everything_above(
        lower in 1u32..4,
        k in 0usize..12,
    ) {
        let g = grammar(&format!("start: \"a\"{{{lower},}};"));
        let word = "a".repeat(k);
        prop_assert_eq!(g.member(&word), k >= lower as usize);
    }

    // --- Counter monotonicity ---

    #[test]
    fn singular_count_yields_singular_selection(word in "[a-z]{1,3}=[0-9]{1,3}") {
        let g = grammar("start: key \"=\" value; key: [a-z]+; value: [0-9]+;");
        prop_assume!(g.member(&word));
        for symbol in ["key", "value"] {
            prop_assert_eq!(g.count(symbol, "start", false), Multiplicity::One);
            let path = PathSelector::parse(&format!(".{symbol}")).unwrap();
            prop_assert_eq!(g.select_all(&word, &path).len(), 1);
        }
    }

    #[test]
    fn zero_count_yields_empty_selection(word in "[a-z]{1,3}") {
        // `value` is not part of this grammar at all.
        let g = grammar("start: key; key: [a-z]+;");
        prop_assume!(g.member(&word));
        prop_assert_eq!(g.count("value", "start", false), Multiplicity::Zero);
    }

    // --- Translation soundness ---

    #[test]
    fn translated_formulas_agree_with_evaluation(
        word in "[a-z]{1,2}(,[a-z]{1,2}){0,3}",
        pick in 0usize..5,
    ) {
        let mut typer = reflang::typeck::Typer::new();
        typer
            .define_lang(
                "Csv",
                reflang::span::Span::dummy(),
                parse_rules("start: field (\",\" field)*; field: [a-z]+;").unwrap(),
            )
            .unwrap();
        let csv = typer.langs().get("Csv").unwrap().clone();
        let evaluator = Evaluator::new(typer.langs());

        let predicates = [
            "length(_) <= 5",
            "contains(_, \"a\")",
            "startswith(_, \"b\")",
            "forall(x -> length(x) >= 1, select_all(@Csv: ..field, _))",
            "exists(x -> contains(x, \"z\"), select_all(@Csv: ..field, _))",
        ];
        let pred = Predicate::parse(predicates[pick]).unwrap();
        let compiled = compile_refinement(&pred, None);
        let formula = compiled.formula.expect("all picks are translatable");

        let direct = evaluator
            .eval_pred(&pred, &Value::Str(word.clone()))
            .unwrap();
        let tree = csv.parse(&word).unwrap();
        let via_formula = eval_formula(&formula, &tree).unwrap();
        prop_assert_eq!(direct, via_formula);
    }
}
