// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

mod error;
mod immediate;

pub use error::{EvalError, Result};
pub use immediate::ImmediateEvaluator;

use crate::ast::{Expr, Ref};
use crate::descriptors::{MemberKind, MethodDesc, MemberDesc};
use crate::known_types::KnownTypes;
use crate::types::Type;
use crate::value::Value;

use log::{debug, trace};

/// Session context that trees travel through. Evaluators forward it to
/// normalization extension points and never inspect it otherwise.
pub trait Protocol {
    fn session_id(&self) -> &str;
}

/// Tree-rewriting pass that evaluators call back into to reduce
/// sub-expressions.
pub trait ExprVisitor {
    fn visit(&mut self, expr: &Ref<Expr>) -> Result<Ref<Expr>>;
}

/// Outcome of normalizing a resolved value: either a value still to be
/// wrapped as a literal, or a ready replacement node.
#[derive(Debug)]
pub enum Resolution {
    Value(Value),
    Node(Ref<Expr>),
}

impl Resolution {
    /// Produce the replacement node, wrapping a value as a literal of `ty`.
    pub fn into_expr(self, name: &str, ty: &Type) -> Result<Ref<Expr>> {
        match self {
            Resolution::Value(value) => literal(name, value, ty),
            Resolution::Node(node) => Ok(node),
        }
    }
}

/// Converts a live push-based stream into something that can be sent to the
/// remote side, typically a subscription handle bound to the session.
pub trait ObservableNormalizer {
    fn normalize(
        &self,
        name: &str,
        value: &Value,
        ty: &Type,
        protocol: &dyn Protocol,
    ) -> anyhow::Result<Option<Ref<Expr>>>;
}

/// Wrap `value` as a constant of static type `ty`.
pub(crate) fn literal(name: &str, value: Value, ty: &Type) -> Result<Ref<Expr>> {
    if !value.is_instance_of(ty) {
        return Err(EvalError::LiteralTypeMismatch {
            member: name.to_string(),
            expected: ty.to_string(),
            actual: value.runtime_type().to_string(),
        });
    }
    debug!("folded `{name}` into literal of type `{ty}`");
    Ok(Expr::constant(value, ty.clone()))
}

/// Whether a chain of member accesses is rooted at a bound parameter.
pub fn is_source_in_scope(expr: &Expr) -> bool {
    let mut current = Some(expr);
    while let Some(e) = current {
        match e {
            Expr::Parameter { .. } => return true,
            Expr::Member { target, .. } => current = target.as_deref(),
            _ => return false,
        }
    }
    false
}

/// Reduce `expr` through the visitor to a local value. A result that is not
/// a constant is reported through `on_missing`, which receives the original
/// expression.
pub(crate) fn evaluate(
    expr: &Ref<Expr>,
    visitor: &mut dyn ExprVisitor,
    on_missing: impl FnOnce(&Expr) -> EvalError,
) -> Result<Value> {
    let reduced = visitor.visit(expr)?;
    match reduced.as_constant() {
        Some(value) => Ok(value.clone()),
        None => {
            trace!("`{expr}` did not reduce to a local value");
            Err(on_missing(expr))
        }
    }
}

/// Like `evaluate`, for optional receivers. Absent receivers (static members)
/// resolve to `None`.
pub(crate) fn evaluate_instance(
    expr: Option<&Ref<Expr>>,
    visitor: &mut dyn ExprVisitor,
    on_missing: impl FnOnce(&Expr) -> EvalError,
) -> Result<Option<Value>> {
    expr.map(|e| evaluate(e, visitor, on_missing)).transpose()
}

fn unexpected(expected: &'static str, expr: &Expr) -> EvalError {
    EvalError::UnexpectedNode {
        expected,
        expression: expr.to_string(),
    }
}

/// Strategy for resolving member reads and method calls against local
/// state, and for folding the results back into the tree.
pub trait LocalEvaluator {
    /// Types whose values may cross the boundary without normalization.
    fn known_types(&self) -> &KnownTypes;

    /// Read a member of a resolved instance without going through the
    /// visitor.
    fn read_member(&self, member: &MemberDesc, instance: Option<&Value>) -> Result<Value>;

    fn get_field(
        &self,
        member: &Ref<Expr>,
        visitor: &mut dyn ExprVisitor,
        protocol: &dyn Protocol,
    ) -> Result<Ref<Expr>>;

    fn get_property(
        &self,
        member: &Ref<Expr>,
        visitor: &mut dyn ExprVisitor,
        protocol: &dyn Protocol,
    ) -> Result<Ref<Expr>>;

    fn invoke(
        &self,
        call: &Ref<Expr>,
        visitor: &mut dyn ExprVisitor,
        protocol: &dyn Protocol,
    ) -> Result<Ref<Expr>>;

    /// Materialize `value` if it is a sequence that must not cross the
    /// boundary as-is. `None` when the value is left alone.
    fn try_evaluate_enumerable(
        &self,
        name: &str,
        value: &Value,
        ty: &Type,
        protocol: &dyn Protocol,
    ) -> Result<Option<Resolution>>;

    /// Hook for converting live observables. `None` when no conversion
    /// applies.
    fn try_evaluate_observable(
        &self,
        name: &str,
        value: &Value,
        ty: &Type,
        protocol: &dyn Protocol,
    ) -> Result<Option<Ref<Expr>>>;

    /// Whether `invoke` can evaluate calls to `method`.
    fn can_evaluate_call(&self, _method: &MethodDesc) -> bool {
        true
    }

    /// Whether `get_value` can read `member` from `instance`.
    fn can_evaluate_member(&self, _member: &MemberDesc, _instance: Option<&Value>) -> bool {
        true
    }

    fn get_value(
        &self,
        member: &Ref<Expr>,
        visitor: &mut dyn ExprVisitor,
        protocol: &dyn Protocol,
    ) -> Result<Ref<Expr>> {
        match member.as_ref() {
            Expr::Member { member: desc, .. } => match desc.kind {
                MemberKind::Field => self.get_field(member, visitor, protocol),
                MemberKind::Property => self.get_property(member, visitor, protocol),
            },
            expr => Err(unexpected("member", expr)),
        }
    }

    /// Fold a resolved value into a replacement node.
    ///
    /// `ty` is the type the literal is wrapped in. Sequence detection uses
    /// `expected` when given and `ty` otherwise. Sequences are normalized
    /// when that type is a sequence shape, or when the value's own runtime
    /// type is not known; enumerable normalization is tried before
    /// observable normalization.
    fn try_evaluate_sequences(
        &self,
        name: &str,
        value: Value,
        ty: &Type,
        expected: Option<&Type>,
        protocol: &dyn Protocol,
    ) -> Result<Ref<Expr>> {
        if !value.is_null() {
            let evaluated = expected.unwrap_or(ty);
            if evaluated.is_sequence_shape() || !self.known_types().is_known_value(&value) {
                if let Some(resolution) =
                    self.try_evaluate_enumerable(name, &value, evaluated, protocol)?
                {
                    return resolution.into_expr(name, ty);
                }
                if let Some(node) = self.try_evaluate_observable(name, &value, evaluated, protocol)? {
                    debug!("`{name}` replaced by observable normalization");
                    return Ok(node);
                }
            }
        }
        literal(name, value, ty)
    }

    /// Read a member of a closure object held by a constant. Returns `None`
    /// when the member's target is not a constant.
    fn evaluate_compiler_generated(
        &self,
        member: &Ref<Expr>,
        expected: Option<&Type>,
        protocol: &dyn Protocol,
    ) -> Result<Option<Ref<Expr>>> {
        let Expr::Member {
            target,
            member: desc,
            ..
        } = member.as_ref()
        else {
            return Err(unexpected("member", member));
        };

        let Some(closure) = target.as_ref().and_then(|t| t.as_constant()) else {
            return Ok(None);
        };

        let value = self.read_member(desc, Some(closure))?;
        self.try_evaluate_sequences(
            &desc.qualified_name(),
            value,
            &desc.member_type,
            expected,
            protocol,
        )
        .map(Some)
    }
}
