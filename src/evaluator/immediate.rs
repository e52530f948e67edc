// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{
    evaluate, evaluate_instance, is_source_in_scope, unexpected, EvalError, ExprVisitor,
    LocalEvaluator, ObservableNormalizer, Protocol, Resolution, Result,
};
use crate::ast::{Expr, Ref};
use crate::descriptors::{MemberDesc, MemberKind, MethodDesc};
use crate::invoke::Invoker;
use crate::known_types::KnownTypes;
use crate::types::Type;
use crate::value::Value;

use log::debug;

/// Evaluates members and calls synchronously, right away, through an
/// `Invoker`.
pub struct ImmediateEvaluator<I> {
    known_types: KnownTypes,
    invoker: I,
    observables: Option<Box<dyn ObservableNormalizer>>,
}

impl<I: Invoker> ImmediateEvaluator<I> {
    pub fn new(known_types: KnownTypes, invoker: I) -> Self {
        Self {
            known_types,
            invoker,
            observables: None,
        }
    }

    pub fn set_observable_normalizer(&mut self, normalizer: Box<dyn ObservableNormalizer>) {
        self.observables = Some(normalizer);
    }

    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    pub fn invoker_mut(&mut self) -> &mut I {
        &mut self.invoker
    }

    pub fn known_types_mut(&mut self) -> &mut KnownTypes {
        &mut self.known_types
    }

    fn read(
        &self,
        kind: MemberKind,
        expr: &Ref<Expr>,
        visitor: &mut dyn ExprVisitor,
        protocol: &dyn Protocol,
    ) -> Result<Ref<Expr>> {
        let (target, member, ty) = match expr.as_ref() {
            Expr::Member { target, member, ty } if member.kind == kind => (target, member, ty),
            e => {
                return Err(unexpected(
                    match kind {
                        MemberKind::Field => "field",
                        MemberKind::Property => "property",
                    },
                    e,
                ))
            }
        };

        let name = member.qualified_name();
        let instance = evaluate_instance(target.as_ref(), visitor, |e| {
            EvalError::MissingLocalInstance {
                member: name.clone(),
                expression: e.to_string(),
            }
        })?;

        let value = self.invoker.read(member, instance.as_ref())?;
        self.try_evaluate_sequences(&name, value, ty, Some(&member.member_type), protocol)
    }
}

/// Drain an iterable into a concrete list, typed with the element type the
/// source declares or `Object` when it declares none.
fn materialize(name: &str, value: &Value) -> Result<Value> {
    let element_type = value.declared_element_type().unwrap_or(Type::Object);
    let items = value.iterate()?.collect::<anyhow::Result<Vec<_>>>()?;
    debug!(
        "materialized {} elements of `{element_type}` from `{name}`",
        items.len()
    );
    Ok(Value::list(element_type, items))
}

impl<I: Invoker> LocalEvaluator for ImmediateEvaluator<I> {
    fn known_types(&self) -> &KnownTypes {
        &self.known_types
    }

    fn read_member(&self, member: &MemberDesc, instance: Option<&Value>) -> Result<Value> {
        Ok(self.invoker.read(member, instance)?)
    }

    fn get_field(
        &self,
        member: &Ref<Expr>,
        visitor: &mut dyn ExprVisitor,
        protocol: &dyn Protocol,
    ) -> Result<Ref<Expr>> {
        self.read(MemberKind::Field, member, visitor, protocol)
    }

    fn get_property(
        &self,
        member: &Ref<Expr>,
        visitor: &mut dyn ExprVisitor,
        protocol: &dyn Protocol,
    ) -> Result<Ref<Expr>> {
        self.read(MemberKind::Property, member, visitor, protocol)
    }

    fn invoke(
        &self,
        call: &Ref<Expr>,
        visitor: &mut dyn ExprVisitor,
        protocol: &dyn Protocol,
    ) -> Result<Ref<Expr>> {
        let Expr::Call {
            receiver,
            method,
            args,
            ty,
        } = call.as_ref()
        else {
            return Err(unexpected("call", call));
        };

        if method.is_void() {
            return Err(EvalError::VoidReturnNotEvaluable {
                method: method.to_string(),
            });
        }

        let name = method.qualified_name();
        let instance = evaluate_instance(receiver.as_ref(), visitor, |e| {
            EvalError::MissingLocalInstance {
                member: name.clone(),
                expression: e.to_string(),
            }
        })?;

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(evaluate(arg, visitor, |e| {
                let (method, expression) = (name.clone(), e.to_string());
                if is_source_in_scope(e) {
                    EvalError::KnownTypeUsedOutsideScope { method, expression }
                } else {
                    EvalError::MissingLocalArgument { method, expression }
                }
            })?);
        }

        let result = self.invoker.call(method, instance.as_ref(), &values)?;
        self.try_evaluate_sequences(&name, result, ty, Some(&method.return_type()), protocol)
    }

    fn try_evaluate_enumerable(
        &self,
        name: &str,
        value: &Value,
        ty: &Type,
        _protocol: &dyn Protocol,
    ) -> Result<Option<Resolution>> {
        if value.is_iterable() && (value.is_synthesized() || ty.is_enumerable_shape()) {
            return Ok(Some(Resolution::Value(materialize(name, value)?)));
        }
        Ok(None)
    }

    fn try_evaluate_observable(
        &self,
        name: &str,
        value: &Value,
        ty: &Type,
        protocol: &dyn Protocol,
    ) -> Result<Option<Ref<Expr>>> {
        match &self.observables {
            Some(normalizer) => Ok(normalizer.normalize(name, value, ty, protocol)?),
            None => Ok(None),
        }
    }

    fn can_evaluate_call(&self, method: &MethodDesc) -> bool {
        self.invoker.can_call(method)
    }

    fn can_evaluate_member(&self, member: &MemberDesc, instance: Option<&Value>) -> bool {
        self.invoker.can_read(member, instance)
    }
}
