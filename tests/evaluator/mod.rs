// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};
use qbridge::*;
use serde::Deserialize;
use test_generator::test_resources;

/// Expression node as written in the yaml cases. Exactly one of the leaf
/// fields, `operator` or `method` is expected to be set.
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct Node {
    value: Option<Value>,
    builtin: Option<String>,
    local: Option<String>,
    parameter: Option<String>,
    time_span: Option<i64>,
    #[serde(rename = "type")]
    ty: Option<String>,

    // Catalog operator, looked up by container, name and parameter types.
    operator: Option<String>,
    container: Option<String>,
    #[serde(default)]
    parameters: Vec<String>,
    #[serde(default)]
    type_args: Vec<String>,

    // Local method given as `Declaring.Type.Name`.
    method: Option<String>,
    returns: Option<String>,

    receiver: Option<Box<Node>>,
    #[serde(default)]
    args: Vec<Node>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct TestCase {
    note: String,
    policy: Option<PolicyConfig>,
    #[serde(default)]
    locals: BTreeMap<String, Value>,
    expr: Node,
    want_result: Option<Value>,
    want_error: Option<String>,
    skip: Option<bool>,
}

#[derive(Deserialize, Debug)]
struct YamlTest {
    cases: Vec<TestCase>,
}

fn builtin(name: &str) -> Result<Value> {
    let int_fcn = |ret: Type| Type::func(vec![Type::INT32], ret);
    Ok(match name {
        "even" => Value::function(int_fcn(Type::BOOL), |args| {
            Ok(Value::Bool(args[0].as_i32()? % 2 == 0))
        }),
        "double" => Value::function(int_fcn(Type::INT32), |args| {
            Ok(Value::Int32(args[0].as_i32()? * 2))
        }),
        "square" => Value::function(int_fcn(Type::INT32), |args| {
            let n = args[0].as_i32()?;
            Ok(Value::Int32(n * n))
        }),
        _ => bail!("unknown builtin `{name}`"),
    })
}

fn container(name: &str) -> Result<Container> {
    Container::ALL
        .into_iter()
        .find(|c| c.name() == name)
        .ok_or_else(|| anyhow!("unknown container `{name}`"))
}

fn parse_types(types: &[String]) -> Result<Vec<Type>> {
    types.iter().map(|t| t.parse()).collect()
}

struct TreeBuilder<'a> {
    engine: &'a Engine,
    closure_type: Type,
    closure: Value,
    locals: &'a BTreeMap<String, Value>,
}

impl<'a> TreeBuilder<'a> {
    fn new(engine: &'a Engine, locals: &'a BTreeMap<String, Value>) -> Self {
        let closure_type = Type::anonymous("<>c__DisplayClass0_0");
        let closure = locals
            .iter()
            .fold(Record::new(closure_type.clone()), |r, (name, value)| {
                r.with_field(name, value.clone())
            });
        Self {
            engine,
            closure_type,
            closure: Value::object(closure),
            locals,
        }
    }

    fn static_type(&self, node: &Node) -> Result<Type> {
        match &node.ty {
            Some(ty) => ty.parse(),
            None => bail!("node {node:?} needs a type"),
        }
    }

    fn build(&self, node: &Node) -> Result<Ref<Expr>> {
        if let Some(value) = &node.value {
            return Ok(Expr::value(value.clone()));
        }
        if let Some(name) = &node.builtin {
            return Ok(Expr::value(builtin(name)?));
        }
        if let Some(n) = node.time_span {
            return Ok(Expr::value(Value::TimeSpan(n)));
        }
        if let Some(name) = &node.parameter {
            return Ok(Expr::parameter(name, self.static_type(node)?));
        }
        if let Some(name) = &node.local {
            let ty = match (&node.ty, self.locals.get(name)) {
                (Some(_), _) => self.static_type(node)?,
                (None, Some(value)) => value.runtime_type(),
                (None, None) => bail!("unknown local `{name}`"),
            };
            return Ok(Expr::member(
                Some(Expr::value(self.closure.clone())),
                MemberDesc::field(self.closure_type.clone(), name, ty),
            ));
        }

        let receiver = node.receiver.as_deref().map(|r| self.build(r)).transpose()?;
        let args = node
            .args
            .iter()
            .map(|a| self.build(a))
            .collect::<Result<Vec<_>>>()?;

        if let Some(name) = &node.operator {
            let container = container(node.container.as_deref().unwrap_or("Enumerable"))?;
            let parameters = parse_types(&node.parameters)?;
            let mut method = self
                .engine
                .context()
                .catalog()
                .find(container, name, &parameters)
                .ok_or_else(|| anyhow!("no overload {container}.{name}{parameters:?}"))?
                .clone();
            if !node.type_args.is_empty() {
                method = method.make_generic(parse_types(&node.type_args)?)?;
            }
            return Ok(Expr::call(receiver, method, args));
        }

        if let Some(path) = &node.method {
            let Some((declaring_type, name)) = path.rsplit_once('.') else {
                bail!("method `{path}` needs a declaring type");
            };
            let declaring_type = Type::named(declaring_type);
            let parameters = args.iter().map(|a| a.ty().clone()).collect();
            let ret = node.returns.as_deref().unwrap_or("Object").parse()?;
            let method = match receiver {
                Some(_) => MethodDesc::instance(declaring_type, name, parameters, ret),
                None => MethodDesc::static_method(declaring_type, name, parameters, ret),
            };
            return Ok(Expr::call(receiver, method, args));
        }

        bail!("empty node {node:?}")
    }
}

fn check_error(actual: &str, want_error: &Option<String>) {
    match want_error {
        Some(expected) if actual.contains(expected.as_str()) => (),
        Some(expected) => panic!("`{actual}` does not contain `{expected}`"),
        None => panic!("unexpected error `{actual}`"),
    }
}

fn yaml_test_impl(file: &str) -> Result<()> {
    // RUST_LOG=qbridge=debug shows each fold.
    let _ = env_logger::builder().is_test(true).try_init();

    let yaml_str = std::fs::read_to_string(file)?;
    let test: YamlTest = serde_yaml::from_str(&yaml_str)?;

    std::eprintln!("running {file}");

    for case in test.cases {
        std::eprint!("case {} ", case.note);
        if case.skip == Some(true) {
            std::eprintln!("skipped");
            continue;
        }

        let engine = match &case.policy {
            Some(policy) => Engine::from_config(policy),
            None => Ok(Engine::new()),
        };
        let engine = match engine {
            Ok(engine) => engine,
            Err(actual) => {
                check_error(&actual.to_string(), &case.want_error);
                std::eprintln!("passed");
                continue;
            }
        };

        let expr = TreeBuilder::new(&engine, &case.locals).build(&case.expr)?;
        match (&case.want_result, engine.evaluate(&expr)) {
            (Some(expected), Ok(actual)) => {
                assert_eq!(expected, &actual, "case {}", case.note);
            }
            (None, Ok(actual)) => panic!("case {} evaluated to `{actual}`", case.note),
            (_, Err(actual)) => check_error(&actual.to_string(), &case.want_error),
        }

        std::eprintln!("passed");
    }

    Ok(())
}

fn yaml_test(file: &str) -> Result<()> {
    match yaml_test_impl(file) {
        Ok(_) => Ok(()),
        Err(e) => {
            // If Err is returned, it doesn't always get printed by cargo test.
            // Therefore, panic with the error.
            panic!("{e}");
        }
    }
}

#[test_resources("tests/evaluator/cases/*.yaml")]
fn run(path: &str) {
    yaml_test(path).unwrap()
}
