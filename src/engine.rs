// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::{Expr, Ref};
use crate::config::PolicyConfig;
use crate::descriptors::{MemberDesc, MethodDesc};
use crate::evaluator::{
    EvalError, ExprVisitor, ImmediateEvaluator, ObservableNormalizer, Protocol,
};
use crate::invoke::CallableTable;
use crate::rewriter::LocalRewriter;
use crate::types::Type;
use crate::value::Value;
use crate::whitelist::WhitelistContext;

use anyhow::Result;

/// Session handle used by an `Engine`.
#[derive(Debug, Clone)]
pub struct LocalSession {
    id: String,
}

impl LocalSession {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

impl Protocol for LocalSession {
    fn session_id(&self) -> &str {
        &self.id
    }
}

/// Rewrites query trees against a whitelist, evaluating locally whatever
/// falls outside it.
pub struct Engine {
    context: WhitelistContext,
    evaluator: ImmediateEvaluator<CallableTable>,
    session: LocalSession,
}

/// Create a default engine.
impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Engine whose whitelist holds the safe operators.
    pub fn new() -> Self {
        Self::with_context(WhitelistContext::new())
    }

    pub fn with_context(context: WhitelistContext) -> Self {
        let invoker = CallableTable::new(context.catalog().clone());
        let evaluator = ImmediateEvaluator::new(context.known_types().clone(), invoker);
        Self {
            context,
            evaluator,
            session: LocalSession::new("local"),
        }
    }

    pub fn from_config(config: &PolicyConfig) -> Result<Self> {
        Ok(Self::with_context(WhitelistContext::from_config(config)?))
    }

    pub fn context(&self) -> &WhitelistContext {
        &self.context
    }

    pub fn evaluator(&self) -> &ImmediateEvaluator<CallableTable> {
        &self.evaluator
    }

    pub fn session(&self) -> &LocalSession {
        &self.session
    }

    pub fn set_session(&mut self, session: LocalSession) {
        self.session = session;
    }

    pub fn register_type(&mut self, ty: Type) {
        self.evaluator.known_types_mut().register_type(ty.clone());
        self.context.register_type(ty);
    }

    pub fn register_module(&mut self, module: &str) {
        self.evaluator.known_types_mut().register_module(module);
        self.context.register_module(module);
    }

    pub fn register_method(&mut self, method: &MethodDesc) {
        self.context.register_method(method);
    }

    pub fn register_operator(&mut self, name: &str) -> Result<usize, EvalError> {
        self.context.register_operator(name)
    }

    /// Add the local implementation of a method. Adding a method twice is an
    /// error.
    pub fn add_method(
        &mut self,
        method: &MethodDesc,
        fcn: impl Fn(Option<&Value>, &[Value]) -> Result<Value> + 'static,
    ) -> Result<()> {
        self.evaluator
            .invoker_mut()
            .add_method(method, Box::new(fcn))
    }

    /// Add the local implementation of a member read. Adding a member twice
    /// is an error.
    pub fn add_member(
        &mut self,
        member: &MemberDesc,
        fcn: impl Fn(Option<&Value>) -> Result<Value> + 'static,
    ) -> Result<()> {
        self.evaluator
            .invoker_mut()
            .add_member(member, Box::new(fcn))
    }

    pub fn set_observable_normalizer(&mut self, normalizer: impl ObservableNormalizer + 'static) {
        self.evaluator
            .set_observable_normalizer(Box::new(normalizer));
    }

    /// Replace every locally evaluable sub-expression of `expr` with a
    /// literal.
    pub fn rewrite(&self, expr: &Ref<Expr>) -> Result<Ref<Expr>, EvalError> {
        LocalRewriter::new(&self.context, &self.evaluator, &self.session).visit(expr)
    }

    /// Rewrite `expr` and return the literal it reduces to.
    pub fn evaluate(&self, expr: &Ref<Expr>) -> Result<Value, EvalError> {
        let rewritten = self.rewrite(expr)?;
        match rewritten.as_constant() {
            Some(value) => Ok(value.clone()),
            None => Err(EvalError::UnexpectedNode {
                expected: "constant",
                expression: rewritten.to_string(),
            }),
        }
    }
}
