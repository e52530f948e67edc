// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::{anyhow, bail, Result};
use qbridge::*;

fn closure_type() -> Type {
    Type::anonymous("<>c__DisplayClass4_0")
}

/// `closure.name` where `closure` is a compiler-generated object holding the
/// captured local.
fn captured(name: &str, value: Value) -> Ref<Expr> {
    let ty = value.runtime_type();
    let closure = Record::new(closure_type()).with_field(name, value);
    Expr::member(
        Some(Expr::value(Value::object(closure))),
        MemberDesc::field(closure_type(), name, ty),
    )
}

fn ints(items: &[i32]) -> Value {
    Value::list(Type::INT32, items.iter().map(|n| Value::Int32(*n)).collect())
}

fn operator(
    engine: &Engine,
    container: Container,
    name: &str,
    parameters: &[&str],
    type_args: Vec<Type>,
) -> Result<MethodDesc> {
    let parameters = parameters
        .iter()
        .map(|p| p.parse())
        .collect::<Result<Vec<Type>>>()?;
    let method = engine
        .context()
        .catalog()
        .find(container, name, &parameters)
        .ok_or_else(|| anyhow!("no overload {container}.{name}"))?;
    method.make_generic(type_args)
}

fn where_select_engine() -> Result<Engine> {
    let config = PolicyConfig {
        include_safe_operators: false,
        operators: vec![
            OperatorEntry::Name("Select".to_string()),
            OperatorEntry::Name("Where".to_string()),
        ],
        ..PolicyConfig::default()
    };
    Engine::from_config(&config)
}

#[test]
fn where_then_select_folds_to_a_list() -> Result<()> {
    let engine = where_select_engine()?;

    let where_ = operator(
        &engine,
        Container::Enumerable,
        "Where",
        &["IEnumerable<T0>", "Func<T0,Boolean>"],
        vec![Type::INT32],
    )?;
    let select = operator(
        &engine,
        Container::Enumerable,
        "Select",
        &["IEnumerable<T0>", "Func<T0,T1>"],
        vec![Type::INT32, Type::INT32],
    )?;

    let is_even = Value::function(Type::func(vec![Type::INT32], Type::BOOL), |args| {
        Ok(Value::Bool(args[0].as_i32()? % 2 == 0))
    });
    let doubled = Value::function(Type::func(vec![Type::INT32], Type::INT32), |args| {
        Ok(Value::Int32(args[0].as_i32()? * 2))
    });

    let source = captured("source", ints(&[1, 2, 3, 4, 5]));
    let filtered = Expr::static_call(where_, vec![source, Expr::value(is_even)]);
    let query = Expr::static_call(select, vec![filtered, Expr::value(doubled)]);

    assert_eq!(engine.evaluate(&query)?, ints(&[4, 8]));
    Ok(())
}

#[test]
fn unknown_concurrency_operator_needs_a_local_source() -> Result<()> {
    let engine = where_select_engine()?;
    let throttle = operator(
        &engine,
        Container::Observable,
        "Throttle",
        &["IObservable<T0>", "TimeSpan"],
        vec![Type::INT64],
    )?;
    assert!(!engine.context().is_known_method(&throttle));

    let source = Expr::parameter("source", Type::observable(Type::INT64));
    let query = Expr::call(
        Some(source),
        throttle,
        vec![Expr::value(Value::TimeSpan(1_000_000))],
    );
    match engine.rewrite(&query) {
        Err(EvalError::MissingLocalInstance { expression, .. }) => {
            assert_eq!(expression, "source")
        }
        r => panic!("unexpected {r:?}"),
    }
    Ok(())
}

#[test]
fn parameter_members_passed_to_local_methods_are_out_of_scope() {
    let price_type = Type::named("Contoso.Price");
    let discount = MethodDesc::static_method(
        Type::named("Contoso.Pricing"),
        "Discount",
        vec![Type::INT32],
        Type::INT32,
    );
    let amount = Expr::member(
        Some(Expr::parameter("price", price_type.clone())),
        MemberDesc::property(price_type, "Amount", Type::INT32),
    );

    let engine = Engine::new();
    match engine.rewrite(&Expr::static_call(discount, vec![amount.clone()])) {
        Err(EvalError::KnownTypeUsedOutsideScope { method, expression }) => {
            assert_eq!(method, "Contoso.Pricing.Discount");
            assert_eq!(expression, "price.Amount");
        }
        r => panic!("unexpected {r:?}"),
    }

    // On its own the chain stays for the remote side.
    assert_eq!(engine.rewrite(&amount).ok(), Some(amount));
}

#[test]
fn known_trees_are_left_alone() -> Result<()> {
    let engine = Engine::new();
    let where_ = operator(
        &engine,
        Container::Qbservable,
        "Where",
        &["IQbservable<T0>", "Func<T0,Boolean>"],
        vec![Type::INT64],
    )?;
    let source = Expr::parameter("ticks", Type::qbservable(Type::INT64));
    let predicate = Expr::parameter("predicate", Type::func(vec![Type::INT64], Type::BOOL));
    let query = Expr::static_call(where_, vec![source, predicate]);

    let rewritten = engine.rewrite(&query)?;
    assert_eq!(rewritten, query);
    Ok(())
}

#[test]
fn local_method() -> Result<()> {
    let discount = MethodDesc::static_method(
        Type::named("Contoso.Pricing"),
        "Discount",
        vec![Type::INT32],
        Type::INT32,
    );
    let query = Expr::static_call(discount.clone(), vec![Expr::value(Value::Int32(200))]);

    let mut engine = Engine::new();

    // Fails since Discount has no local implementation.
    assert!(matches!(
        engine.evaluate(&query),
        Err(EvalError::InvocationFault(_))
    ));

    engine.add_method(&discount, |_, args| match args {
        [Value::Int32(price)] => Ok(Value::Int32(price * 9 / 10)),
        _ => bail!("price must be Int32"),
    })?;

    // Adding a method twice is an error.
    assert!(engine
        .add_method(&discount, |_, _| Ok(Value::Int32(0)))
        .is_err());

    assert_eq!(engine.evaluate(&query)?, Value::Int32(180));

    // Once whitelisted, the call is left for the remote side when its
    // argument is not local.
    engine.register_method(&discount);
    let price = Expr::parameter("price", Type::INT32);
    let remote = Expr::static_call(discount, vec![price]);
    assert_eq!(engine.rewrite(&remote)?, remote);
    Ok(())
}

#[test]
fn local_members() -> Result<()> {
    let rate = MemberDesc::property(Type::named("Contoso.Pricing"), "Rate", Type::FLOAT64)
        .into_static();
    let query = Expr::member(None, rate.clone());

    let mut engine = Engine::new();
    engine.add_member(&rate, |_| Ok(Value::Float64(0.25)))?;
    assert!(engine.add_member(&rate, |_| Ok(Value::Null)).is_err());
    assert_eq!(engine.evaluate(&query)?, Value::Float64(0.25));

    // Members of known types are not forced through local evaluation.
    engine.register_module("Contoso");
    let order = Expr::parameter("order", Type::named("Contoso.Order"));
    let total = Expr::member(
        Some(order),
        MemberDesc::property(Type::named("Contoso.Order"), "Total", Type::FLOAT64),
    );
    assert_eq!(engine.rewrite(&total)?, total);
    Ok(())
}

#[test]
fn unknown_operator_names_are_rejected() -> Result<()> {
    let mut engine = Engine::new();
    match engine.register_operator("Frobnicate") {
        Err(EvalError::UnknownOperatorName(name)) => assert_eq!(name, "Frobnicate"),
        r => panic!("unexpected {r:?}"),
    }
    assert!(engine.register_operator("Throttle")? > 0);

    let config = PolicyConfig::from_json_str(r#"{"operators": ["Frobnicate"]}"#)?;
    let Err(e) = Engine::from_config(&config) else {
        bail!("policy with unknown operator accepted");
    };
    assert!(e.to_string().contains("Frobnicate"));
    Ok(())
}

#[test]
fn session_is_forwarded_to_normalizers() -> Result<()> {
    #[derive(Debug)]
    struct Feed;

    impl LocalObservable for Feed {
        fn runtime_type(&self) -> Type {
            Type::named("Contoso.Feed")
        }

        fn element_type(&self) -> Option<Type> {
            Some(Type::STRING)
        }
    }

    struct Subscribe;

    impl ObservableNormalizer for Subscribe {
        fn normalize(
            &self,
            name: &str,
            value: &Value,
            ty: &Type,
            protocol: &dyn Protocol,
        ) -> Result<Option<Ref<Expr>>> {
            if !matches!(value, Value::Observable(_)) {
                return Ok(None);
            }
            Ok(Some(Expr::parameter(
                &format!("{}/{name}", protocol.session_id()),
                ty.clone(),
            )))
        }
    }

    let mut engine = Engine::new();
    engine.set_session(LocalSession::new("session-7"));
    engine.set_observable_normalizer(Subscribe);

    let feed_type = Type::observable(Type::STRING);
    let closure = Record::new(closure_type()).with_field("feed", Value::observable(Feed));
    let query = Expr::member(
        Some(Expr::value(Value::object(closure))),
        MemberDesc::field(closure_type(), "feed", feed_type.clone()),
    );

    match engine.rewrite(&query)?.as_ref() {
        Expr::Parameter { name, ty } => {
            assert_eq!(name.as_ref(), "session-7/<>c__DisplayClass4_0.feed");
            assert_eq!(ty, &feed_type);
        }
        e => panic!("unexpected {e}"),
    }
    Ok(())
}
