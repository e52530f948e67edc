// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Synchronous implementations of the sequence operators.
//!
//! Projections and filters are lazy: they return synthesized single-pass
//! sequences that pull from their source on demand. Aggregates drain their
//! source immediately.

use crate::types::{Primitive, Type};
use crate::value::{Function, LazySequence, Value, ValueIter};
use crate::Rc;

use core::iter;

use anyhow::{anyhow, bail, Result};

fn ensure_args_count(fcn: &'static str, args: &[Value], expected: usize) -> Result<()> {
    if args.len() != expected {
        if expected == 1 {
            bail!("`{fcn}` expects 1 argument");
        } else {
            bail!("`{fcn}` expects {expected} arguments");
        }
    }
    Ok(())
}

fn ensure_function(fcn: &'static str, v: &Value) -> Result<Rc<Function>> {
    match v {
        Value::Function(f) => Ok(f.clone()),
        _ => bail!(
            "`{fcn}` expects delegate argument. Got `{}` instead",
            v.runtime_type()
        ),
    }
}

fn ensure_count(fcn: &'static str, v: &Value) -> Result<usize> {
    match v {
        Value::Int32(n) => Ok(usize::try_from(*n).unwrap_or(0)),
        _ => bail!("`{fcn}` expects Int32 argument. Got `{v}` instead"),
    }
}

fn type_arg(type_args: &[Type], idx: usize) -> Option<Type> {
    type_args.get(idx).cloned()
}

fn lazy(fcn: &str, element_type: Option<Type>, source: impl Iterator<Item = Result<Value>> + 'static) -> Value {
    Value::sequence(LazySequence::synthesized(fcn, element_type, Box::new(source)))
}

fn test(predicate: &Function, v: &Value) -> Result<bool> {
    predicate.call(core::slice::from_ref(v))?.as_bool()
}

fn int32(fcn: &'static str, n: usize) -> Result<i32> {
    i32::try_from(n).map_err(|_| anyhow!("`{fcn}` result does not fit in Int32"))
}

/// Value of an uninitialized slot of type `ty`.
fn default_value(ty: Option<&Type>) -> Value {
    match ty {
        Some(Type::Primitive(p)) => match p {
            Primitive::Bool => Value::Bool(false),
            Primitive::Char => Value::Char('\0'),
            Primitive::Int32 => Value::Int32(0),
            Primitive::Int64 => Value::Int64(0),
            Primitive::Float64 => Value::Float64(0.0),
            Primitive::String => Value::Null,
        },
        _ => Value::Null,
    }
}

fn drain(source: ValueIter) -> Result<Vec<Value>> {
    source.collect()
}

pub fn where_(type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Where", args, 2)?;
    let predicate = ensure_function("Where", &args[1])?;
    let source = args[0].iterate()?.filter_map(move |item| match item {
        Ok(v) => match test(&predicate, &v) {
            Ok(true) => Some(Ok(v)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        },
        Err(e) => Some(Err(e)),
    });
    Ok(lazy("Where", type_arg(type_args, 0), source))
}

pub fn where_indexed(type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Where", args, 2)?;
    let predicate = ensure_function("Where", &args[1])?;
    let source = args[0]
        .iterate()?
        .enumerate()
        .filter_map(move |(idx, item)| {
            let keep = |v: Value| -> Result<Option<Value>> {
                let idx = Value::Int32(int32("Where", idx)?);
                Ok(predicate.call(&[v.clone(), idx])?.as_bool()?.then_some(v))
            };
            item.and_then(keep).transpose()
        });
    Ok(lazy("Where", type_arg(type_args, 0), source))
}

pub fn select(type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Select", args, 2)?;
    let projector = ensure_function("Select", &args[1])?;
    let source = args[0]
        .iterate()?
        .map(move |item| item.and_then(|v| projector.call(&[v])));
    Ok(lazy("Select", type_arg(type_args, 1), source))
}

pub fn select_indexed(type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Select", args, 2)?;
    let projector = ensure_function("Select", &args[1])?;
    let source = args[0]
        .iterate()?
        .enumerate()
        .map(move |(idx, item)| {
            let v = item?;
            projector.call(&[v, Value::Int32(int32("Select", idx)?)])
        });
    Ok(lazy("Select", type_arg(type_args, 1), source))
}

pub fn select_many(type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("SelectMany", args, 2)?;
    let selector = ensure_function("SelectMany", &args[1])?;
    let source = args[0].iterate()?.flat_map(move |item| -> ValueIter {
        match item
            .and_then(|v| selector.call(&[v]))
            .and_then(|inner| inner.iterate())
        {
            Ok(inner) => inner,
            Err(e) => Box::new(iter::once(Err(e))),
        }
    });
    Ok(lazy("SelectMany", type_arg(type_args, 1), source))
}

pub fn take(type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Take", args, 2)?;
    let count = ensure_count("Take", &args[1])?;
    let source = args[0].iterate()?.take(count);
    Ok(lazy("Take", type_arg(type_args, 0), source))
}

pub fn skip(type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Skip", args, 2)?;
    let count = ensure_count("Skip", &args[1])?;
    let source = args[0].iterate()?.skip(count);
    Ok(lazy("Skip", type_arg(type_args, 0), source))
}

pub fn take_while(type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("TakeWhile", args, 2)?;
    let predicate = ensure_function("TakeWhile", &args[1])?;
    let source = args[0].iterate()?.map_while(move |item| {
        let keep = |v: Value| -> Result<Option<Value>> { Ok(test(&predicate, &v)?.then_some(v)) };
        item.and_then(keep).transpose()
    });
    Ok(lazy("TakeWhile", type_arg(type_args, 0), source))
}

pub fn skip_while(type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("SkipWhile", args, 2)?;
    let predicate = ensure_function("SkipWhile", &args[1])?;
    let mut skipping = true;
    let source = args[0].iterate()?.filter_map(move |item| {
        let v = match item {
            Ok(v) => v,
            Err(e) => return Some(Err(e)),
        };
        if skipping {
            match test(&predicate, &v) {
                Ok(true) => return None,
                Ok(false) => skipping = false,
                Err(e) => return Some(Err(e)),
            }
        }
        Some(Ok(v))
    });
    Ok(lazy("SkipWhile", type_arg(type_args, 0), source))
}

pub fn concat(type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Concat", args, 2)?;
    let source = args[0].iterate()?.chain(args[1].iterate()?);
    Ok(lazy("Concat", type_arg(type_args, 0), source))
}

pub fn zip(type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Zip", args, 3)?;
    let zipper = ensure_function("Zip", &args[2])?;
    let source = args[0]
        .iterate()?
        .zip(args[1].iterate()?)
        .map(move |(a, b)| zipper.call(&[a?, b?]));
    Ok(lazy("Zip", type_arg(type_args, 2), source))
}

pub fn default_if_empty(type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("DefaultIfEmpty", args, 1)?;
    let element_type = type_arg(type_args, 0);
    let mut source = args[0].iterate()?.peekable();
    let source: ValueIter = if source.peek().is_some() {
        Box::new(source)
    } else {
        Box::new(iter::once(Ok(default_value(element_type.as_ref()))))
    };
    Ok(lazy("DefaultIfEmpty", element_type, source))
}

pub fn range(_type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Range", args, 2)?;
    let start = args[0].as_i32()?;
    let count = args[1].as_i32()?;
    if count < 0 || i64::from(start) + i64::from(count) - 1 > i64::from(i32::MAX) {
        bail!("`Range` argument out of range: start {start}, count {count}");
    }
    let source = (0..count).map(move |offset| Ok(Value::Int32(start + offset)));
    Ok(lazy("Range", Some(Type::INT32), source))
}

pub fn empty(type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Empty", args, 0)?;
    Ok(lazy("Empty", type_arg(type_args, 0), iter::empty()))
}

pub fn contains(_type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Contains", args, 2)?;
    for item in args[0].iterate()? {
        if item? == args[1] {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

pub fn count(_type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Count", args, 1)?;
    let items = drain(args[0].iterate()?)?;
    Ok(Value::Int32(int32("Count", items.len())?))
}

pub fn count_where(_type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Count", args, 2)?;
    let predicate = ensure_function("Count", &args[1])?;
    let mut n = 0;
    for item in args[0].iterate()? {
        if test(&predicate, &item?)? {
            n += 1;
        }
    }
    Ok(Value::Int32(int32("Count", n)?))
}

pub fn long_count(_type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("LongCount", args, 1)?;
    let items = drain(args[0].iterate()?)?;
    Ok(Value::Int64(i64::try_from(items.len())?))
}

pub fn any(_type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Any", args, 1)?;
    match args[0].iterate()?.next() {
        Some(item) => item.map(|_| Value::Bool(true)),
        None => Ok(Value::Bool(false)),
    }
}

pub fn any_where(_type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Any", args, 2)?;
    let predicate = ensure_function("Any", &args[1])?;
    for item in args[0].iterate()? {
        if test(&predicate, &item?)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

pub fn all(_type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("All", args, 2)?;
    let predicate = ensure_function("All", &args[1])?;
    for item in args[0].iterate()? {
        if !test(&predicate, &item?)? {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

pub fn sequence_equal(_type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("SequenceEqual", args, 2)?;
    let first = drain(args[0].iterate()?)?;
    let second = drain(args[1].iterate()?)?;
    Ok(Value::Bool(first == second))
}

pub fn element_at(_type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("ElementAt", args, 2)?;
    let index = args[1].as_i32()?;
    let found = match usize::try_from(index) {
        Ok(idx) => args[0].iterate()?.nth(idx).transpose()?,
        Err(_) => None,
    };
    found.ok_or_else(|| anyhow!("`ElementAt` index {index} is out of range"))
}

pub fn element_at_or_default(type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("ElementAtOrDefault", args, 2)?;
    let index = args[1].as_i32()?;
    let found = match usize::try_from(index) {
        Ok(idx) => args[0].iterate()?.nth(idx).transpose()?,
        Err(_) => None,
    };
    Ok(found.unwrap_or_else(|| default_value(type_args.first())))
}

pub fn sum_int32(_type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Sum", args, 1)?;
    let mut total = 0i32;
    for item in args[0].iterate()? {
        total = total
            .checked_add(item?.as_i32()?)
            .ok_or_else(|| anyhow!("`Sum` overflowed Int32"))?;
    }
    Ok(Value::Int32(total))
}

pub fn sum_int64(_type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Sum", args, 1)?;
    let mut total = 0i64;
    for item in args[0].iterate()? {
        total = total
            .checked_add(item?.as_i64()?)
            .ok_or_else(|| anyhow!("`Sum` overflowed Int64"))?;
    }
    Ok(Value::Int64(total))
}

pub fn sum_float64(_type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Sum", args, 1)?;
    let mut total = 0.0;
    for item in args[0].iterate()? {
        total += item?.as_f64()?;
    }
    Ok(Value::Float64(total))
}

fn int32_items(fcn: &'static str, v: &Value) -> Result<Vec<i32>> {
    let items = drain(v.iterate()?)?
        .iter()
        .map(Value::as_i32)
        .collect::<Result<Vec<_>>>()?;
    if items.is_empty() {
        bail!("`{fcn}` sequence contains no elements");
    }
    Ok(items)
}

pub fn min_int32(_type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Min", args, 1)?;
    let items = int32_items("Min", &args[0])?;
    Ok(Value::Int32(items.into_iter().min().unwrap_or_default()))
}

pub fn max_int32(_type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Max", args, 1)?;
    let items = int32_items("Max", &args[0])?;
    Ok(Value::Int32(items.into_iter().max().unwrap_or_default()))
}

pub fn average_int32(_type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Average", args, 1)?;
    let items = int32_items("Average", &args[0])?;
    let total: i64 = items.iter().map(|n| i64::from(*n)).sum();
    Ok(Value::Float64(total as f64 / items.len() as f64))
}

pub fn first(_type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("First", args, 1)?;
    match args[0].iterate()?.next() {
        Some(item) => item,
        None => bail!("`First` sequence contains no elements"),
    }
}

pub fn distinct(type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Distinct", args, 1)?;
    let mut seen: Vec<Value> = vec![];
    let source = args[0].iterate()?.filter_map(move |item| match item {
        Ok(v) if seen.contains(&v) => None,
        Ok(v) => {
            seen.push(v.clone());
            Some(Ok(v))
        }
        Err(e) => Some(Err(e)),
    });
    Ok(lazy("Distinct", type_arg(type_args, 0), source))
}

pub fn reverse(type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("Reverse", args, 1)?;
    let items = drain(args[0].iterate()?)?;
    Ok(lazy(
        "Reverse",
        type_arg(type_args, 0),
        items.into_iter().rev().map(Ok),
    ))
}

pub fn to_list(type_args: &[Type], args: &[Value]) -> Result<Value> {
    ensure_args_count("ToList", args, 1)?;
    let element_type = args[0]
        .declared_element_type()
        .or_else(|| type_arg(type_args, 0))
        .unwrap_or(Type::Object);
    Ok(Value::list(element_type, drain(args[0].iterate()?)?))
}
