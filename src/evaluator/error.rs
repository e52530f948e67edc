// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

/// Reasons a sub-expression could not be resolved against local state.
///
/// Every variant is fatal to the evaluation of the node being resolved.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The receiver of a member read or method call did not reduce to a
    /// local value.
    #[error("`{member}` cannot be evaluated: its instance `{expression}` is not available locally")]
    MissingLocalInstance { member: String, expression: String },

    /// An argument did not reduce to a local value and is not rooted at a
    /// bound parameter.
    #[error("`{method}` cannot be evaluated: argument `{expression}` is not available locally")]
    MissingLocalArgument { method: String, expression: String },

    /// An argument rooted at a bound parameter still did not reduce to a
    /// local value. Usually a type or method is missing from the whitelist.
    #[error("`{method}` cannot be evaluated: argument `{expression}` uses a known type outside of an evaluable scope")]
    KnownTypeUsedOutsideScope { method: String, expression: String },

    #[error("`{method}` returns void and cannot be evaluated locally")]
    VoidReturnNotEvaluable { method: String },

    #[error("unknown operator name `{0}`")]
    UnknownOperatorName(String),

    /// The invoked member or method itself failed.
    #[error(transparent)]
    InvocationFault(#[from] anyhow::Error),

    /// A folded value is not an instance of the node's static type.
    #[error("value of type `{actual}` from `{member}` cannot be used as `{expected}`")]
    LiteralTypeMismatch {
        member: String,
        expected: String,
        actual: String,
    },

    #[error("expected a {expected} expression, got `{expression}`")]
    UnexpectedNode {
        expected: &'static str,
        expression: String,
    },
}

pub type Result<T> = core::result::Result<T, EvalError>;
