// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::common::{init_logger, ints, lazy_ints, Ticks, TestSession, Unchanged};
use crate::ast::{Expr, Ref};
use crate::catalog::OperatorCatalog;
use crate::descriptors::{MemberDesc, MethodDesc};
use crate::evaluator::{
    is_source_in_scope, EvalError, ImmediateEvaluator, LocalEvaluator, ObservableNormalizer,
    Protocol,
};
use crate::invoke::{CallableTable, MethodFcn};
use crate::known_types::KnownTypes;
use crate::types::Type;
use crate::value::{Record, Value};
use crate::Rc;

use anyhow::{bail, Result};

fn evaluator() -> ImmediateEvaluator<CallableTable> {
    init_logger();
    let table = CallableTable::new(Rc::new(OperatorCatalog::standard()));
    ImmediateEvaluator::new(KnownTypes::new(), table)
}

fn handler(f: impl Fn(Option<&Value>, &[Value]) -> Result<Value> + 'static) -> MethodFcn {
    Box::new(f)
}

fn order_type() -> Type {
    Type::named("Contoso.Order")
}

/// `order.Customer.Address` rooted at the parameter `order`.
fn parameter_chain() -> Ref<Expr> {
    let customer = MemberDesc::property(order_type(), "Customer", Type::named("Contoso.Customer"));
    let address = MemberDesc::property(Type::named("Contoso.Customer"), "Address", Type::STRING);
    let order = Expr::parameter("order", order_type());
    Expr::member(Some(Expr::member(Some(order), customer)), address)
}

/// A static field that is not rooted at any parameter.
fn free_variable() -> Ref<Expr> {
    Expr::member(
        None,
        MemberDesc::field(Type::named("Contoso.Globals"), "Discount", Type::INT32).into_static(),
    )
}

fn ship() -> MethodDesc {
    MethodDesc::instance(
        order_type(),
        "Ship",
        vec![Type::STRING, Type::INT32],
        Type::BOOL,
    )
}

#[test]
fn scope_rule_follows_member_chains() {
    assert!(is_source_in_scope(&parameter_chain()));
    assert!(is_source_in_scope(&Expr::parameter("x", Type::INT32)));
    assert!(!is_source_in_scope(&free_variable()));
    assert!(!is_source_in_scope(&Expr::value(Value::Int32(1))));
}

#[test]
fn void_calls_are_rejected_first() {
    let evaluator = evaluator();
    let cancel = MethodDesc::instance(order_type(), "Cancel", vec![Type::INT32], Type::Void);
    let call = Expr::call(
        Some(Expr::parameter("order", order_type())),
        cancel,
        vec![free_variable()],
    );
    match evaluator.invoke(&call, &mut Unchanged, &TestSession) {
        Err(EvalError::VoidReturnNotEvaluable { method }) => assert!(method.contains("Cancel")),
        r => panic!("unexpected {r:?}"),
    }
}

#[test]
fn unresolved_receiver_is_missing_instance() {
    let evaluator = evaluator();
    let call = Expr::call(
        Some(Expr::parameter("order", order_type())),
        ship(),
        vec![Expr::value("dock".into()), Expr::value(Value::Int32(1))],
    );
    match evaluator.invoke(&call, &mut Unchanged, &TestSession) {
        Err(EvalError::MissingLocalInstance { member, expression }) => {
            assert_eq!(member, "Contoso.Order.Ship");
            assert_eq!(expression, "order");
        }
        r => panic!("unexpected {r:?}"),
    }
}

#[test]
fn argument_failures_are_classified_by_scope() {
    let evaluator = evaluator();
    let receiver = Some(Expr::value(Value::object(Record::new(order_type()))));

    let call = Expr::call(
        receiver.clone(),
        ship(),
        vec![parameter_chain(), free_variable()],
    );
    match evaluator.invoke(&call, &mut Unchanged, &TestSession) {
        Err(EvalError::KnownTypeUsedOutsideScope { expression, .. }) => {
            assert_eq!(expression, "order.Customer.Address")
        }
        r => panic!("unexpected {r:?}"),
    }

    let call = Expr::call(
        receiver,
        ship(),
        vec![Expr::value("dock".into()), free_variable()],
    );
    match evaluator.invoke(&call, &mut Unchanged, &TestSession) {
        Err(EvalError::MissingLocalArgument { method, expression }) => {
            assert_eq!(method, "Contoso.Order.Ship");
            assert_eq!(expression, "Contoso.Globals.Discount");
        }
        r => panic!("unexpected {r:?}"),
    }
}

#[test]
fn invocation_faults_propagate_unchanged() -> Result<()> {
    let mut evaluator = evaluator();
    evaluator
        .invoker_mut()
        .add_method(&ship(), handler(|_, _| bail!("dock 7 is closed")))?;

    let call = Expr::call(
        Some(Expr::value(Value::object(Record::new(order_type())))),
        ship(),
        vec![Expr::value("dock".into()), Expr::value(Value::Int32(7))],
    );
    match evaluator.invoke(&call, &mut Unchanged, &TestSession) {
        Err(e @ EvalError::InvocationFault(_)) => assert_eq!(e.to_string(), "dock 7 is closed"),
        r => panic!("unexpected {r:?}"),
    }
    Ok(())
}

#[test]
fn calls_fold_into_literals() -> Result<()> {
    let mut evaluator = evaluator();
    evaluator.invoker_mut().add_method(
        &ship(),
        handler(|instance, args| match instance {
            Some(Value::Object(_)) => Ok(Value::Bool(args[1].as_i32()? > 0)),
            _ => bail!("no order"),
        }),
    )?;

    let call = Expr::call(
        Some(Expr::value(Value::object(Record::new(order_type())))),
        ship(),
        vec![Expr::value("dock".into()), Expr::value(Value::Int32(3))],
    );
    let folded = evaluator.invoke(&call, &mut Unchanged, &TestSession)?;
    assert_eq!(folded.as_constant(), Some(&Value::Bool(true)));
    assert_eq!(folded.ty(), &Type::BOOL);
    Ok(())
}

#[test]
fn results_must_match_the_static_type() -> Result<()> {
    let mut evaluator = evaluator();
    evaluator
        .invoker_mut()
        .add_method(&ship(), handler(|_, _| Ok(Value::from("yes"))))?;

    let call = Expr::call(
        Some(Expr::value(Value::object(Record::new(order_type())))),
        ship(),
        vec![Expr::value("dock".into()), Expr::value(Value::Int32(3))],
    );
    assert!(matches!(
        evaluator.invoke(&call, &mut Unchanged, &TestSession),
        Err(EvalError::LiteralTypeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn member_reads_use_local_objects() -> Result<()> {
    let evaluator = evaluator();
    let order = Record::new(order_type())
        .with_field("Total", Value::Int32(42))
        .with_field("Note", Value::Null);

    let total = MemberDesc::field(order_type(), "Total", Type::Object);
    let read = Expr::member(Some(Expr::value(Value::object(order.clone()))), total);
    let folded = evaluator.get_value(&read, &mut Unchanged, &TestSession)?;
    // A known value held by an object-typed slot keeps the slot's type.
    assert_eq!(folded.as_constant(), Some(&Value::Int32(42)));
    assert_eq!(folded.ty(), &Type::Object);

    let note = MemberDesc::property(order_type(), "Note", Type::STRING);
    let read = Expr::member(Some(Expr::value(Value::object(order))), note.clone());
    let folded = evaluator.get_value(&read, &mut Unchanged, &TestSession)?;
    assert_eq!(folded.as_constant(), Some(&Value::Null));

    // Field entry point refuses properties.
    assert!(matches!(
        evaluator.get_field(&read, &mut Unchanged, &TestSession),
        Err(EvalError::UnexpectedNode { .. })
    ));

    let detached = Expr::member(Some(Expr::parameter("order", order_type())), note);
    assert!(matches!(
        evaluator.get_value(&detached, &mut Unchanged, &TestSession),
        Err(EvalError::MissingLocalInstance { .. })
    ));
    Ok(())
}

#[test]
fn synthesized_sequences_are_materialized() -> Result<()> {
    let evaluator = evaluator();
    let ty = Type::enumerable(Type::INT32);

    let numbers = || lazy_ints(&[1, 2, 3, 4, 5]);

    let first = evaluator.try_evaluate_sequences("Numbers", numbers(), &ty, None, &TestSession)?;
    let second = evaluator.try_evaluate_sequences("Numbers", numbers(), &ty, None, &TestSession)?;

    let value = first.as_constant().cloned().unwrap_or(Value::Null);
    assert_eq!(value, ints(&[1, 2, 3, 4, 5]));
    assert_eq!(value.runtime_type(), Type::list(Type::INT32));
    assert!(!value.is_synthesized());
    assert_eq!(first.as_constant(), second.as_constant());
    assert_eq!(first.ty(), &ty);
    Ok(())
}

#[test]
fn anonymous_iterators_are_materialized_for_any_slot() -> Result<()> {
    let evaluator = evaluator();
    let folded = evaluator.try_evaluate_sequences(
        "Numbers",
        lazy_ints(&[3, 1]),
        &Type::Object,
        None,
        &TestSession,
    )?;
    assert_eq!(folded.as_constant(), Some(&ints(&[3, 1])));
    Ok(())
}

#[test]
fn untyped_sequences_materialize_as_objects() -> Result<()> {
    let evaluator = evaluator();
    let items = vec![Value::Int32(1), Value::from("two")];
    let source = crate::value::LazySequence::declared(
        "Contoso.Bag",
        None,
        Box::new(items.clone().into_iter().map(Ok)),
    );
    let folded = evaluator.try_evaluate_sequences(
        "Bag.Items",
        Value::sequence(source),
        &Type::Sequence,
        None,
        &TestSession,
    )?;
    assert_eq!(
        folded.as_constant(),
        Some(&Value::list(Type::Object, items))
    );
    Ok(())
}

#[test]
fn concrete_lists_in_list_slots_are_kept() -> Result<()> {
    let evaluator = evaluator();
    let list = ints(&[1, 2]);
    let folded = evaluator.try_evaluate_sequences(
        "Cart.Items",
        list.clone(),
        &Type::list(Type::INT32),
        None,
        &TestSession,
    )?;
    assert_eq!(folded.as_constant(), Some(&list));
    Ok(())
}

struct Subscriptions;

impl ObservableNormalizer for Subscriptions {
    fn normalize(
        &self,
        name: &str,
        value: &Value,
        ty: &Type,
        protocol: &dyn Protocol,
    ) -> Result<Option<Ref<Expr>>> {
        match value {
            Value::Observable(_) => Ok(Some(Expr::parameter(
                &format!("{}:{name}", protocol.session_id()),
                ty.clone(),
            ))),
            _ => Ok(None),
        }
    }
}

#[test]
fn observables_go_through_the_normalizer() -> Result<()> {
    let mut evaluator = evaluator();
    let ty = Type::observable(Type::INT64);

    // Without a normalizer the observable is wrapped as-is.
    let ticks = || Value::observable(Ticks);
    let folded = evaluator.try_evaluate_sequences("Feed.Ticks", ticks(), &ty, None, &TestSession)?;
    assert!(folded.is_constant());

    evaluator.set_observable_normalizer(Box::new(Subscriptions));
    let replaced = evaluator.try_evaluate_sequences("Feed.Ticks", ticks(), &ty, None, &TestSession)?;
    match replaced.as_ref() {
        Expr::Parameter { name, ty: t } => {
            assert_eq!(name.as_ref(), "test:Feed.Ticks");
            assert_eq!(t, &ty);
        }
        e => panic!("unexpected {e}"),
    }
    Ok(())
}

#[test]
fn closure_members_are_read_directly() -> Result<()> {
    let evaluator = evaluator();
    let closure_type = Type::anonymous("<>c__DisplayClass0_0");
    let closure = Record::new(closure_type.clone()).with_field("source", lazy_ints(&[2, 4]));
    let source = MemberDesc::field(closure_type.clone(), "source", Type::enumerable(Type::INT32));

    let read = Expr::member(Some(Expr::value(Value::object(closure))), source.clone());
    let folded = evaluator.evaluate_compiler_generated(&read, None, &TestSession)?;
    let value = folded.as_ref().and_then(|f| f.as_constant()).cloned();
    assert_eq!(value, Some(ints(&[2, 4])));

    let unbound = Expr::member(Some(Expr::parameter("c", closure_type)), source);
    assert!(evaluator
        .evaluate_compiler_generated(&unbound, None, &TestSession)?
        .is_none());
    Ok(())
}
