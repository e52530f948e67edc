// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Use README.md as crate documentation.
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

mod ast;
mod catalog;
mod config;
mod descriptors;
mod engine;
mod evaluator;
mod invoke;
mod known_types;
mod rewriter;
mod types;
mod value;
mod whitelist;

pub use ast::{Expr, NodeRef, Ref};
pub use catalog::{
    Container, OperatorCatalog, OperatorFcn, CONCURRENCY_OPERATOR_NAMES, SAFE_OPERATOR_NAMES,
};
pub use config::{OperatorEntry, PolicyConfig};
pub use descriptors::{MemberDesc, MemberKey, MemberKind, MethodDef, MethodDesc, MethodKey};
pub use engine::{Engine, LocalSession};
pub use evaluator::{
    is_source_in_scope, EvalError, ExprVisitor, ImmediateEvaluator, LocalEvaluator,
    ObservableNormalizer, Protocol, Resolution,
};
pub use invoke::{CallableTable, Invoker, MemberFcn, MethodFcn};
pub use known_types::KnownTypes;
pub use rewriter::LocalRewriter;
pub use types::{GenericDef, Primitive, Type};
pub use value::{
    Function, LazySequence, List, LocalObject, LocalObservable, LocalSequence, Record, Value,
    ValueIter,
};
pub use whitelist::{WhitelistBuilder, WhitelistContext};

use std::rc::Rc;

#[cfg(test)]
mod tests;
