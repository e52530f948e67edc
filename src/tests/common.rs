// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::{Expr, Ref};
use crate::catalog::{Container, OperatorCatalog};
use crate::descriptors::MethodDesc;
use crate::evaluator::{ExprVisitor, Protocol, Result};
use crate::types::Type;
use crate::value::{LazySequence, LocalObservable, Value};

use anyhow::anyhow;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct TestSession;

impl Protocol for TestSession {
    fn session_id(&self) -> &str {
        "test"
    }
}

/// Visitor that leaves every node as it is.
pub struct Unchanged;

impl ExprVisitor for Unchanged {
    fn visit(&mut self, expr: &Ref<Expr>) -> Result<Ref<Expr>> {
        Ok(expr.clone())
    }
}

#[derive(Debug)]
pub struct Ticks;

impl LocalObservable for Ticks {
    fn runtime_type(&self) -> Type {
        Type::anonymous("<Ticks>d__Subject")
    }

    fn element_type(&self) -> Option<Type> {
        Some(Type::INT64)
    }
}

pub fn ints(items: &[i32]) -> Value {
    Value::list(Type::INT32, items.iter().map(|n| Value::Int32(*n)).collect())
}

/// A synthesized, single-pass sequence over `items`.
pub fn lazy_ints(items: &[i32]) -> Value {
    let items: Vec<Value> = items.iter().map(|n| Value::Int32(*n)).collect();
    Value::sequence(LazySequence::synthesized(
        "Numbers",
        Some(Type::INT32),
        Box::new(items.into_iter().map(Ok)),
    ))
}

pub fn is_even() -> Value {
    Value::function(Type::func(vec![Type::INT32], Type::BOOL), |args| {
        Ok(Value::Bool(args[0].as_i32()? % 2 == 0))
    })
}

pub fn doubled() -> Value {
    Value::function(Type::func(vec![Type::INT32], Type::INT32), |args| {
        Ok(Value::Int32(args[0].as_i32()? * 2))
    })
}

/// Look up a catalog overload by container, name and parameter types.
pub fn operator(
    catalog: &OperatorCatalog,
    container: Container,
    name: &str,
    parameters: &[&str],
) -> anyhow::Result<MethodDesc> {
    let parameters = parameters
        .iter()
        .map(|p| p.parse())
        .collect::<anyhow::Result<Vec<Type>>>()?;
    catalog
        .find(container, name, &parameters)
        .cloned()
        .ok_or_else(|| anyhow!("no overload {container}.{name}({parameters:?})"))
}
