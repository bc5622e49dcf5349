//! Runtime contract errors and the assertion helpers the instrumentation
//! layer calls.
//!
//! A contract error aborts only the current test iteration; the fuzz driver
//! records it as a distinct outcome, separate from unrelated host panics
//! and from the explicit early-exit signal.

use thiserror::Error;

use crate::eval::Evaluator;
use crate::typeck::NormalForm;
use crate::value::Value;

/// Named arguments with their pretty-printed values, as captured at the
/// violation site.
pub type NamedValues = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractError {
    #[error("precondition of `{function}` violated: {condition}")]
    PreconditionViolated {
        function: String,
        /// Source text of the violated condition.
        condition: String,
        inputs: NamedValues,
        /// Caller's call-site description, when known.
        call_site: Option<String>,
    },

    #[error("postcondition of `{function}` violated: {condition}")]
    PostconditionViolated {
        function: String,
        condition: String,
        inputs: NamedValues,
        output: String,
        call_site: Option<String>,
    },

    #[error("argument {index} of `{function}`: expected {expected}, got {actual}")]
    ArgTypeMismatch {
        function: String,
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("return value of `{function}`: expected {expected}, got {actual}")]
    ReturnTypeMismatch {
        function: String,
        expected: String,
        actual: String,
    },
}

/// Check one argument against its declared type.
pub fn assert_arg_type(
    evaluator: &Evaluator<'_>,
    value: &Value,
    index: usize,
    function: &str,
    expected: &NormalForm,
) -> Result<(), ContractError> {
    if admits(evaluator, value, expected) {
        Ok(())
    } else {
        Err(ContractError::ArgTypeMismatch {
            function: function.to_string(),
            index,
            expected: expected.to_string(),
            actual: value.to_string(),
        })
    }
}

/// Check the return value against the declared return type.
pub fn assert_return_type(
    evaluator: &Evaluator<'_>,
    value: &Value,
    function: &str,
    expected: &NormalForm,
) -> Result<(), ContractError> {
    if admits(evaluator, value, expected) {
        Ok(())
    } else {
        Err(ContractError::ReturnTypeMismatch {
            function: function.to_string(),
            expected: expected.to_string(),
            actual: value.to_string(),
        })
    }
}

/// Raise a precondition violation unless `holds`.
pub fn assert_pre(
    holds: bool,
    function: &str,
    condition: &str,
    inputs: &[(&str, &Value)],
) -> Result<(), ContractError> {
    if holds {
        Ok(())
    } else {
        Err(ContractError::PreconditionViolated {
            function: function.to_string(),
            condition: condition.to_string(),
            inputs: render(inputs),
            call_site: None,
        })
    }
}

/// Raise a postcondition violation unless `holds`.
pub fn assert_post(
    holds: bool,
    function: &str,
    condition: &str,
    inputs: &[(&str, &Value)],
    output: &Value,
) -> Result<(), ContractError> {
    if holds {
        Ok(())
    } else {
        Err(ContractError::PostconditionViolated {
            function: function.to_string(),
            condition: condition.to_string(),
            inputs: render(inputs),
            output: output.to_string(),
            call_site: None,
        })
    }
}

fn admits(evaluator: &Evaluator<'_>, value: &Value, expected: &NormalForm) -> bool {
    matches!(evaluator.admits(value, expected), Ok(true))
}

fn render(inputs: &[(&str, &Value)]) -> NamedValues {
    inputs
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Attach a call-site description to a contract error.
pub fn at_call_site(err: ContractError, site: &str) -> ContractError {
    match err {
        ContractError::PreconditionViolated {
            function,
            condition,
            inputs,
            ..
        } => ContractError::PreconditionViolated {
            function,
            condition,
            inputs,
            call_site: Some(site.to_string()),
        },
        ContractError::PostconditionViolated {
            function,
            condition,
            inputs,
            output,
            ..
        } => ContractError::PostconditionViolated {
            function,
            condition,
            inputs,
            output,
            call_site: Some(site.to_string()),
        },
        other => other,
    }
}

