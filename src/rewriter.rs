// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::{Expr, Ref};
use crate::descriptors::{MemberDesc, MethodDesc};
use crate::evaluator::{is_source_in_scope, ExprVisitor, LocalEvaluator, Protocol, Result};
use crate::types::Type;
use crate::whitelist::WhitelistContext;

use log::trace;

/// Depth-first rewrite pass that replaces locally evaluable sub-expressions
/// with literals.
///
/// * Members of closure objects are read eagerly.
/// * Members of unknown types and calls to unknown methods must be resolved
///   locally and go through the evaluator. Member chains rooted at a bound
///   parameter are the exception and stay in the tree.
/// * Known calls and member reads whose operands all reduce to constants are
///   folded when the evaluator can perform them.
/// * Everything else is rebuilt around its rewritten children. Nodes whose
///   children did not change are returned as-is.
pub struct LocalRewriter<'a> {
    context: &'a WhitelistContext,
    evaluator: &'a dyn LocalEvaluator,
    protocol: &'a dyn Protocol,
}

impl<'a> LocalRewriter<'a> {
    pub fn new(
        context: &'a WhitelistContext,
        evaluator: &'a dyn LocalEvaluator,
        protocol: &'a dyn Protocol,
    ) -> Self {
        Self {
            context,
            evaluator,
            protocol,
        }
    }

    fn visit_member(
        &mut self,
        expr: &Ref<Expr>,
        target: Option<&Ref<Expr>>,
        member: &MemberDesc,
        ty: &Type,
    ) -> Result<Ref<Expr>> {
        let (evaluator, protocol) = (self.evaluator, self.protocol);

        if let Some(t) = target {
            if matches!(t.ty(), Type::Anonymous(_)) && t.is_constant() {
                trace!("reading closure member `{expr}`");
                if let Some(node) = evaluator.evaluate_compiler_generated(expr, None, protocol)? {
                    return Ok(node);
                }
            }
        }

        if !self.context.is_known_type(&member.declaring_type) {
            // Chains rooted at a bound parameter have no local instance. They
            // are left for the enclosing call to classify.
            if is_source_in_scope(expr) {
                trace!("`{expr}` is rooted at a bound parameter");
                let new_target = target.map(|t| self.visit(t)).transpose()?;
                return Ok(rebuild_member(expr, target, new_target, member, ty));
            }
            trace!("`{expr}` is declared on an unknown type");
            return evaluator.get_value(expr, self, protocol);
        }

        let new_target = target.map(|t| self.visit(t)).transpose()?;
        let instance = new_target.as_ref().and_then(|t| t.as_constant());
        if (new_target.is_none() || instance.is_some())
            && evaluator.can_evaluate_member(member, instance)
        {
            let node = rebuild_member(expr, target, new_target, member, ty);
            trace!("folding known member `{node}`");
            return evaluator.get_value(&node, self, protocol);
        }

        Ok(rebuild_member(expr, target, new_target, member, ty))
    }

    fn visit_call(
        &mut self,
        expr: &Ref<Expr>,
        receiver: Option<&Ref<Expr>>,
        method: &MethodDesc,
        args: &[Ref<Expr>],
        ty: &Type,
    ) -> Result<Ref<Expr>> {
        let (evaluator, protocol) = (self.evaluator, self.protocol);

        if !self.context.is_known_method(method) {
            trace!("`{expr}` calls an unknown method");
            return evaluator.invoke(expr, self, protocol);
        }

        let new_receiver = receiver.map(|r| self.visit(r)).transpose()?;
        let new_args = args
            .iter()
            .map(|a| self.visit(a))
            .collect::<Result<Vec<_>>>()?;

        let operands_constant = new_receiver.as_ref().map_or(true, |r| r.is_constant())
            && new_args.iter().all(|a| a.is_constant());
        let node = rebuild_call(expr, receiver, new_receiver, method, args, new_args, ty);
        if operands_constant && !method.is_void() && evaluator.can_evaluate_call(method) {
            trace!("folding known call `{node}`");
            return evaluator.invoke(&node, self, protocol);
        }
        Ok(node)
    }
}

fn same(old: Option<&Ref<Expr>>, new: Option<&Ref<Expr>>) -> bool {
    match (old, new) {
        (Some(a), Some(b)) => a == b,
        (None, None) => true,
        _ => false,
    }
}

fn rebuild_member(
    expr: &Ref<Expr>,
    target: Option<&Ref<Expr>>,
    new_target: Option<Ref<Expr>>,
    member: &MemberDesc,
    ty: &Type,
) -> Ref<Expr> {
    if same(target, new_target.as_ref()) {
        return expr.clone();
    }
    Ref::new(Expr::Member {
        target: new_target,
        member: member.clone(),
        ty: ty.clone(),
    })
}

fn rebuild_call(
    expr: &Ref<Expr>,
    receiver: Option<&Ref<Expr>>,
    new_receiver: Option<Ref<Expr>>,
    method: &MethodDesc,
    args: &[Ref<Expr>],
    new_args: Vec<Ref<Expr>>,
    ty: &Type,
) -> Ref<Expr> {
    if same(receiver, new_receiver.as_ref()) && args == new_args.as_slice() {
        return expr.clone();
    }
    Ref::new(Expr::Call {
        receiver: new_receiver,
        method: method.clone(),
        args: new_args,
        ty: ty.clone(),
    })
}

impl ExprVisitor for LocalRewriter<'_> {
    fn visit(&mut self, expr: &Ref<Expr>) -> Result<Ref<Expr>> {
        match expr.as_ref() {
            Expr::Constant { .. } | Expr::Parameter { .. } => Ok(expr.clone()),
            Expr::Member { target, member, ty } => {
                self.visit_member(expr, target.as_ref(), member, ty)
            }
            Expr::Call {
                receiver,
                method,
                args,
                ty,
            } => self.visit_call(expr, receiver.as_ref(), method, args, ty),
        }
    }
}
