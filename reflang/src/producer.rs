//! Producer composition and the fuzz driver.
//!
//! Per parameter: an explicit producer wins; a grammar-constrained type
//! gets a solver-backed producer (translated formula in, residual conjuncts
//! as a post-filter); anything else falls back to a default producer for
//! its base type. Parameter producers are combined into one tuple producer
//! that rejects draws violating the cross-parameter preconditions: plain
//! rejection sampling, not joint solving.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::debug;

use crate::constraint::{
    classify, cnf, compile_refinement, free_vars, subst, translate, Formula, Sort,
};
use crate::contract::ContractError;
use crate::eval::{EvalError, Evaluator};
use crate::grammar::Grammar;
use crate::solver::{ConstraintSolver, SolverSession};
use crate::syntax::Expr;
use crate::typeck::{LangTable, NormalForm, Predicate, SimpleType};
use crate::value::Value;

/// Initial sampling budget handed to solver sessions.
pub const INITIAL_BUDGET: u32 = 10;

/// How many times a solver producer doubles its budget before reporting
/// exhaustion. Unsatisfiable constraints would otherwise loop forever.
pub const MAX_BUDGET_DOUBLINGS: u32 = 6;

const MAX_FILTER_ATTEMPTS: u32 = 1000;
const MAX_TUPLE_ATTEMPTS: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProduceError {
    #[error("solver exhausted after {doublings} budget doubling(s)")]
    Exhausted { doublings: u32 },

    #[error("filter rejected {attempts} consecutive candidates")]
    FilterStarved { attempts: u32 },

    #[error("predicate evaluation failed: {0}")]
    Eval(#[from] EvalError),
}

/// Errors composing a generator from parameter specifications.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComposeError {
    #[error("cannot synthesize a producer for parameter `{param}` of type {ty}")]
    CannotSynthesize { param: String, ty: String },
}

/// Draws one value per call.
pub trait Producer {
    fn produce(&mut self) -> Result<Value, ProduceError>;
}

/// Always yields the same value.
pub struct ConstProducer {
    value: Value,
}

impl ConstProducer {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

impl Producer for ConstProducer {
    fn produce(&mut self) -> Result<Value, ProduceError> {
        Ok(self.value.clone())
    }
}

/// A solver-backed string producer with bounded budget-doubling retry.
pub struct SolverProducer {
    grammar: Arc<Grammar>,
    formula: Option<Formula>,
    solver: Arc<dyn ConstraintSolver>,
    session: Box<dyn SolverSession>,
    budget: u32,
    doublings: u32,
}

impl SolverProducer {
    pub fn new(
        grammar: Arc<Grammar>,
        formula: Option<Formula>,
        solver: Arc<dyn ConstraintSolver>,
        budget: u32,
    ) -> Self {
        let session = solver.open(&grammar, formula.as_ref(), budget);
        Self {
            grammar,
            formula,
            solver,
            session,
            budget,
            doublings: 0,
        }
    }
}

impl Producer for SolverProducer {
    fn produce(&mut self) -> Result<Value, ProduceError> {
        loop {
            if let Some(word) = self.session.produce() {
                return Ok(Value::Str(word));
            }
            if self.doublings >= MAX_BUDGET_DOUBLINGS {
                return Err(ProduceError::Exhausted {
                    doublings: self.doublings,
                });
            }
            self.budget = self.budget.saturating_mul(2);
            self.doublings += 1;
            debug!(
                grammar = self.grammar.name(),
                budget = self.budget,
                "solver session exhausted; retrying with doubled budget"
            );
            self.session = self
                .solver
                .open(&self.grammar, self.formula.as_ref(), self.budget);
        }
    }
}

/// Filters an inner producer through residual predicates over `_`.
pub struct FilteredProducer {
    inner: Box<dyn Producer>,
    tests: Vec<Predicate>,
    langs: LangTable,
}

impl FilteredProducer {
    pub fn new(inner: Box<dyn Producer>, tests: Vec<Predicate>, langs: LangTable) -> Self {
        Self {
            inner,
            tests,
            langs,
        }
    }
}

impl Producer for FilteredProducer {
    fn produce(&mut self) -> Result<Value, ProduceError> {
        if self.tests.is_empty() {
            return self.inner.produce();
        }
        let evaluator = Evaluator::new(&self.langs);
        for _ in 0..MAX_FILTER_ATTEMPTS {
            let value = self.inner.produce()?;
            let mut ok = true;
            for test in &self.tests {
                if !evaluator.eval_pred(test, &value)? {
                    ok = false;
                    break;
                }
            }
            if ok {
                return Ok(value);
            }
        }
        Err(ProduceError::FilterStarved {
            attempts: MAX_FILTER_ATTEMPTS,
        })
    }
}

/// A default producer for unconstrained base types.
struct DefaultProducer {
    ty: SimpleType,
    rng: StdRng,
}

impl Producer for DefaultProducer {
    fn produce(&mut self) -> Result<Value, ProduceError> {
        Ok(match &self.ty {
            SimpleType::Int => Value::Int(self.rng.gen_range(-100..=100)),
            SimpleType::Bool => Value::Bool(self.rng.gen()),
            SimpleType::String => {
                let len = self.rng.gen_range(0..8);
                let word: String = (0..len)
                    .map(|_| char::from(self.rng.gen_range(b'a'..=b'z')))
                    .collect();
                Value::Str(word)
            }
            SimpleType::List(_) => Value::List(Vec::new()),
            _ => Value::Unit,
        })
    }
}

fn default_producer(name: &str, ty: &SimpleType) -> Result<Box<dyn Producer>, ComposeError> {
    match ty {
        SimpleType::Int
        | SimpleType::Bool
        | SimpleType::String
        | SimpleType::Unit
        | SimpleType::List(_) => Ok(Box::new(DefaultProducer {
            ty: ty.clone(),
            rng: StdRng::seed_from_u64(0xdefa),
        })),
        other => Err(ComposeError::CannotSynthesize {
            param: name.to_string(),
            ty: other.to_string(),
        }),
    }
}

/// One parameter of the function under test.
pub struct ParamSpec {
    pub name: String,
    pub ty: NormalForm,
    /// Caller-supplied producer; overrides synthesis.
    pub producer: Option<Box<dyn Producer>>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, ty: NormalForm) -> Self {
        Self {
            name: name.into(),
            ty,
            producer: None,
        }
    }

    pub fn with_producer(mut self, producer: Box<dyn Producer>) -> Self {
        self.producer = Some(producer);
        self
    }
}

/// Draws one tuple of parameter values per call, rejecting tuples that
/// violate the cross-parameter preconditions.
pub struct TupleProducer {
    names: Vec<String>,
    producers: Vec<Box<dyn Producer>>,
    cross: Vec<Expr>,
    langs: LangTable,
}

impl TupleProducer {
    pub fn produce(&mut self) -> Result<Vec<Value>, ProduceError> {
        let evaluator = Evaluator::new(&self.langs);
        for _ in 0..MAX_TUPLE_ATTEMPTS {
            let mut values = Vec::with_capacity(self.producers.len());
            for producer in &mut self.producers {
                values.push(producer.produce()?);
            }
            if self.cross.is_empty() {
                return Ok(values);
            }
            let bindings: Vec<(String, Value)> = self
                .names
                .iter()
                .cloned()
                .zip(values.iter().cloned())
                .collect();
            let mut ok = true;
            for conjunct in &self.cross {
                match evaluator.eval_with(conjunct, &bindings)? {
                    Value::Bool(true) => {}
                    _ => {
                        ok = false;
                        break;
                    }
                }
            }
            if ok {
                return Ok(values);
            }
        }
        Err(ProduceError::FilterStarved {
            attempts: MAX_TUPLE_ATTEMPTS,
        })
    }
}

/// Compose per-parameter producers into a joint generator honoring the
/// preconditions.
pub fn build_generator(
    params: Vec<ParamSpec>,
    preconditions: &[Predicate],
    langs: &LangTable,
    solver: Arc<dyn ConstraintSolver>,
) -> Result<TupleProducer, ComposeError> {
    let names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
    let mut pending: Vec<Expr> = preconditions
        .iter()
        .flat_map(|pre| cnf(pre.expr()))
        .collect();

    let mut producers: Vec<Box<dyn Producer>> = Vec::with_capacity(params.len());
    for spec in params {
        if let Some(producer) = spec.producer {
            producers.push(producer);
            continue;
        }

        // Conjuncts mentioning no other parameter belong to this one.
        let others: FxHashSet<&str> = names
            .iter()
            .map(String::as_str)
            .filter(|n| *n != spec.name)
            .collect();
        let (picked, rest) = classify(pending, |conjunct| {
            free_vars(conjunct)
                .iter()
                .all(|v| !others.contains(v.as_str()))
        });
        pending = rest;

        let producer: Box<dyn Producer> = match spec.ty.base_type().clone() {
            SimpleType::Lang(grammar) => {
                let mut formulas = Vec::new();
                let mut tests = Vec::new();
                if let NormalForm::Refined { pred, .. } = &spec.ty {
                    let compiled = compile_refinement(pred, Some(grammar.name()));
                    formulas.extend(compiled.formula);
                    tests.extend(compiled.residual);
                }
                for conjunct in &picked {
                    match translate(conjunct, &spec.name) {
                        Some((term, Sort::Formula)) => formulas.push(Formula(term)),
                        _ => {
                            let mut map = FxHashMap::default();
                            map.insert(spec.name.clone(), Expr::var("_"));
                            tests.push(Predicate::new(subst(conjunct, &map)));
                        }
                    }
                }
                let inner = SolverProducer::new(
                    grammar,
                    Formula::conjoin(formulas),
                    solver.clone(),
                    INITIAL_BUDGET,
                );
                Box::new(FilteredProducer::new(
                    Box::new(inner),
                    tests,
                    langs.clone(),
                ))
            }
            base => {
                let mut tests = Vec::new();
                if let NormalForm::Refined { pred, .. } = &spec.ty {
                    tests.push(pred.clone());
                }
                for conjunct in &picked {
                    let mut map = FxHashMap::default();
                    map.insert(spec.name.clone(), Expr::var("_"));
                    tests.push(Predicate::new(subst(conjunct, &map)));
                }
                let inner = default_producer(&spec.name, &base)?;
                if tests.is_empty() {
                    inner
                } else {
                    Box::new(FilteredProducer::new(inner, tests, langs.clone()))
                }
            }
        };
        producers.push(producer);
    }

    Ok(TupleProducer {
        names,
        producers,
        cross: pending,
        langs: langs.clone(),
    })
}

// --- Fuzz driver ---

/// What the instrumented target reports back for one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    Passed,
    /// Cooperative early exit: stop fuzzing after this iteration.
    Exited,
}

/// The recorded outcome of one iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Passed,
    ContractViolation(ContractError),
    Crashed(String),
    Exited,
}

/// Tallies and records of one fuzzing run. Pass, contract-violation,
/// crash, and exit counts are independent.
#[derive(Debug)]
pub struct FuzzReport {
    pub target: String,
    pub records: Vec<(Vec<Value>, Outcome)>,
    pub passed: u32,
    pub violations: u32,
    pub crashes: u32,
    pub exits: u32,
    /// Set when the producer gave up before `times` iterations.
    pub produce_failure: Option<ProduceError>,
    pub producer_time: Duration,
    pub checker_time: Duration,
}

/// Drive `target` with `times` generated inputs. Contract violations and
/// host panics abort only their own iteration.
pub fn fuzz<F>(target: &str, times: u32, producer: &mut TupleProducer, mut run: F) -> FuzzReport
where
    F: FnMut(&[Value]) -> Result<TestStatus, ContractError>,
{
    let mut report = FuzzReport {
        target: target.to_string(),
        records: Vec::new(),
        passed: 0,
        violations: 0,
        crashes: 0,
        exits: 0,
        produce_failure: None,
        producer_time: Duration::ZERO,
        checker_time: Duration::ZERO,
    };

    for iteration in 0..times {
        let drawing = Instant::now();
        let inputs = match producer.produce() {
            Ok(inputs) => inputs,
            Err(err) => {
                debug!(target, iteration, %err, "producer gave up");
                report.produce_failure = Some(err);
                break;
            }
        };
        report.producer_time += drawing.elapsed();

        let checking = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| run(&inputs)));
        report.checker_time += checking.elapsed();

        let outcome = match result {
            Ok(Ok(TestStatus::Passed)) => {
                report.passed += 1;
                Outcome::Passed
            }
            Ok(Ok(TestStatus::Exited)) => {
                report.exits += 1;
                Outcome::Exited
            }
            Ok(Err(violation)) => {
                report.violations += 1;
                debug!(target, iteration, %violation, "contract violated");
                Outcome::ContractViolation(violation)
            }
            Err(payload) => {
                report.crashes += 1;
                Outcome::Crashed(panic_message(payload.as_ref()))
            }
        };
        let stop = outcome == Outcome::Exited;
        report.records.push((inputs, outcome));
        if stop {
            break;
        }
    }
    report
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::SamplingSolver;
    use crate::span::Span;
    use crate::syntax::parse_rules;
    use crate::typeck::Typer;

    fn digits_typer() -> Typer {
        let mut typer = Typer::new();
        typer
            .define_lang("Digits", Span::dummy(), parse_rules("start: [0-9]{1,3};").unwrap())
            .unwrap();
        typer
    }

    fn lang_param(typer: &Typer, name: &str, refinement: Option<&str>) -> ParamSpec {
        let grammar = typer.langs().get("Digits").unwrap().clone();
        let mut nf = NormalForm::Simple(SimpleType::Lang(grammar));
        if let Some(refinement) = refinement {
            nf = nf.refined(Predicate::parse(refinement).unwrap());
        }
        ParamSpec::new(name, nf)
    }

    #[test]
    fn test_solver_backed_generator_respects_refinement() {
        let typer = digits_typer();
        let mut generator = build_generator(
            vec![lang_param(&typer, "s", Some("length(_) == 2"))],
            &[],
            typer.langs(),
            Arc::new(SamplingSolver::default()),
        )
        .unwrap();
        for _ in 0..5 {
            let values = generator.produce().unwrap();
            let word = values[0].as_str().unwrap();
            assert_eq!(word.chars().count(), 2, "got {word:?}");
        }
    }

    #[test]
    fn test_single_parameter_preconditions_route_to_generator() {
        let typer = digits_typer();
        let pre = Predicate::parse("int(s) >= 10 && int(s) <= 99").unwrap();
        let mut generator = build_generator(
            vec![lang_param(&typer, "s", None)],
            &[pre],
            typer.langs(),
            Arc::new(SamplingSolver::default()),
        )
        .unwrap();
        // Both conjuncts mention only `s`, so the tuple filter is empty and
        // every draw already satisfies them.
        for _ in 0..5 {
            let values = generator.produce().unwrap();
            let n: i64 = values[0].as_str().unwrap().parse().unwrap();
            assert!((10..=99).contains(&n), "got {n}");
        }
    }

    #[test]
    fn test_cross_parameter_preconditions_filter_tuples() {
        let typer = digits_typer();
        let pre = Predicate::parse("int(a) < int(b)").unwrap();
        let mut generator = build_generator(
            vec![lang_param(&typer, "a", None), lang_param(&typer, "b", None)],
            &[pre],
            typer.langs(),
            Arc::new(SamplingSolver::default()),
        )
        .unwrap();
        for _ in 0..5 {
            let values = generator.produce().unwrap();
            let a: i64 = values[0].as_str().unwrap().parse().unwrap();
            let b: i64 = values[1].as_str().unwrap().parse().unwrap();
            assert!(a < b, "expected {a} < {b}");
        }
    }

    #[test]
    fn test_explicit_producer_wins() {
        let typer = digits_typer();
        let spec = lang_param(&typer, "s", None)
            .with_producer(Box::new(ConstProducer::new(Value::Str("42".into()))));
        let mut generator = build_generator(
            vec![spec],
            &[],
            typer.langs(),
            Arc::new(SamplingSolver::default()),
        )
        .unwrap();
        assert_eq!(generator.produce().unwrap(), vec![Value::Str("42".into())]);
    }

    #[test]
    fn test_exhausted_solver_reports_after_doubling_cap() {
        let typer = digits_typer();
        let mut generator = build_generator(
            vec![lang_param(&typer, "s", Some("length(_) == 9"))],
            &[],
            typer.langs(),
            Arc::new(SamplingSolver::default()),
        )
        .unwrap();
        match generator.produce() {
            Err(ProduceError::Exhausted { doublings }) => {
                assert_eq!(doublings, MAX_BUDGET_DOUBLINGS);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn test_fuzz_report_tallies_outcomes_independently() {
        let typer = digits_typer();
        let mut generator = build_generator(
            vec![lang_param(&typer, "s", None)],
            &[],
            typer.langs(),
            Arc::new(SamplingSolver::default()),
        )
        .unwrap();

        let mut iteration = 0;
        let report = fuzz("demo", 6, &mut generator, |_inputs| {
            iteration += 1;
            match iteration {
                1 => panic!("boom"),
                2 => Err(ContractError::PreconditionViolated {
                    function: "demo".into(),
                    condition: "int(s) > 0".into(),
                    inputs: Vec::new(),
                    call_site: None,
                }),
                _ => Ok(TestStatus::Passed),
            }
        });

        assert_eq!(report.crashes, 1);
        assert_eq!(report.violations, 1);
        assert_eq!(report.passed, 4);
        assert_eq!(report.exits, 0);
        assert_eq!(report.records.len(), 6);
        assert!(report.produce_failure.is_none());
    }

    #[test]
    fn test_fuzz_exit_stops_the_loop() {
        let typer = digits_typer();
        let mut generator = build_generator(
            vec![lang_param(&typer, "s", None)],
            &[],
            typer.langs(),
            Arc::new(SamplingSolver::default()),
        )
        .unwrap();
        let report = fuzz("demo", 100, &mut generator, |_| Ok(TestStatus::Exited));
        assert_eq!(report.exits, 1);
        assert_eq!(report.records.len(), 1);
    }
}
