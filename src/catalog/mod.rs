// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

pub mod enumerable;

use crate::descriptors::{MethodDesc, MethodKey};
use crate::types::Type;
use crate::value::Value;

use core::fmt;
use std::collections::{HashMap, HashSet};

use anyhow::Result;
use lazy_static::lazy_static;

/// Synchronous operator implementation. Receives the method's type arguments
/// and the evaluated arguments (the source sequence first).
pub type OperatorFcn = fn(&[Type], &[Value]) -> Result<Value>;

#[rustfmt::skip]
lazy_static! {
    /// Pure, synchronous combinators that are safe to run anywhere.
    pub static ref SAFE_OPERATOR_NAMES: HashSet<&'static str> = [
        "Amb", "All", "And", "Any", "AsObservable", "AsQbservable", "Average",
        "Case", "CombineLatest", "Concat", "Contains", "Count", "DefaultIfEmpty",
        "DistinctUntilChanged", "ElementAt", "ElementAtOrDefault", "Empty",
        "FirstAsync", "FirstOrDefaultAsync", "ForkJoin", "If", "IgnoreElements",
        "IsEmpty", "LastAsync", "LastOrDefaultAsync", "Let", "LongCount", "Max",
        "MaxBy", "Merge", "Min", "MinBy", "MostRecent", "Never", "Publish",
        "PublishLast", "Range", "RefCount", "Return", "Select", "SelectMany",
        "SequenceEqual", "SingleAsync", "SingleOrDefaultAsync", "Skip", "SkipLast",
        "SkipUntil", "SkipWhile", "StartWith", "Sum", "Switch", "Take", "TakeLast",
        "TakeUntil", "TakeWhile", "Then", "TimeInterval", "Timestamp",
        "ToObservable", "ToQbservable", "ToQueryable", "Using", "UsingAsync",
        "When", "Where", "Zip",
    ].into_iter().collect();

    /// Combinators whose behavior depends on real time or scheduling.
    pub static ref CONCURRENCY_OPERATOR_NAMES: HashSet<&'static str> = [
        "Delay", "DelaySubscription", "Interval", "Sample", "Throttle", "Timeout",
        "Timer",
    ].into_iter().collect();
}

/// Static module whose public operators make up the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Container {
    Enumerable,
    Queryable,
    Observable,
    Qbservable,
}

impl Container {
    pub const ALL: [Container; 4] = [
        Container::Qbservable,
        Container::Observable,
        Container::Enumerable,
        Container::Queryable,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Container::Enumerable => "Enumerable",
            Container::Queryable => "Queryable",
            Container::Observable => "Observable",
            Container::Qbservable => "Qbservable",
        }
    }

    pub fn declaring_type(self) -> Type {
        Type::named(self.name())
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Type shape usable in a static table.
#[derive(Debug, Clone, Copy)]
enum Shape {
    T(u8),
    Bool,
    Int32,
    Int64,
    Float64,
    TimeSpan,
    DateTimeOffset,
    Seq(&'static Shape),
    Query(&'static Shape),
    Obs(&'static Shape),
    Qbs(&'static Shape),
    List(&'static Shape),
    // Parameter types followed by the return type.
    Func(&'static [Shape]),
}

impl Shape {
    fn to_type(self) -> Type {
        match self {
            Shape::T(idx) => Type::Param(idx),
            Shape::Bool => Type::BOOL,
            Shape::Int32 => Type::INT32,
            Shape::Int64 => Type::INT64,
            Shape::Float64 => Type::FLOAT64,
            Shape::TimeSpan => Type::time_span(),
            Shape::DateTimeOffset => Type::date_time_offset(),
            Shape::Seq(e) => Type::enumerable(e.to_type()),
            Shape::Query(e) => Type::queryable(e.to_type()),
            Shape::Obs(e) => Type::observable(e.to_type()),
            Shape::Qbs(e) => Type::qbservable(e.to_type()),
            Shape::List(e) => Type::list(e.to_type()),
            Shape::Func(shapes) => {
                let types: Vec<Type> = shapes.iter().map(|s| s.to_type()).collect();
                Type::generic(crate::types::FUNC, types)
            }
        }
    }
}

struct OperatorSpec {
    container: Container,
    name: &'static str,
    params: &'static [Shape],
    ret: Shape,
    invoke: Option<OperatorFcn>,
}

const T0: Shape = Shape::T(0);
const T1: Shape = Shape::T(1);
const T2: Shape = Shape::T(2);
const SEQ_T0: Shape = Shape::Seq(&T0);
const SEQ_T1: Shape = Shape::Seq(&T1);
const QRY_T0: Shape = Shape::Query(&T0);
const QRY_T1: Shape = Shape::Query(&T1);
const OBS_T0: Shape = Shape::Obs(&T0);
const OBS_T1: Shape = Shape::Obs(&T1);
const QBS_T0: Shape = Shape::Qbs(&T0);
const QBS_T1: Shape = Shape::Qbs(&T1);
const PREDICATE: Shape = Shape::Func(&[T0, Shape::Bool]);
const INDEXED_PREDICATE: Shape = Shape::Func(&[T0, Shape::Int32, Shape::Bool]);
const SELECTOR: Shape = Shape::Func(&[T0, T1]);
const INDEXED_SELECTOR: Shape = Shape::Func(&[T0, Shape::Int32, T1]);
const ZIPPER: Shape = Shape::Func(&[T0, T1, T2]);

macro_rules! op {
    ($c:ident, $name:literal, [$($p:expr),*], $ret:expr) => {
        OperatorSpec {
            container: Container::$c,
            name: $name,
            params: &[$($p),*],
            ret: $ret,
            invoke: None,
        }
    };
    ($c:ident, $name:literal, [$($p:expr),*], $ret:expr, $f:path) => {
        OperatorSpec {
            container: Container::$c,
            name: $name,
            params: &[$($p),*],
            ret: $ret,
            invoke: Some($f),
        }
    };
}

use enumerable as e;

#[rustfmt::skip]
static OPERATORS: &[OperatorSpec] = &[
    // Enumerable
    op!(Enumerable, "Where", [SEQ_T0, PREDICATE], SEQ_T0, e::where_),
    op!(Enumerable, "Where", [SEQ_T0, INDEXED_PREDICATE], SEQ_T0, e::where_indexed),
    op!(Enumerable, "Select", [SEQ_T0, SELECTOR], SEQ_T1, e::select),
    op!(Enumerable, "Select", [SEQ_T0, INDEXED_SELECTOR], SEQ_T1, e::select_indexed),
    op!(Enumerable, "SelectMany", [SEQ_T0, Shape::Func(&[T0, SEQ_T1])], SEQ_T1, e::select_many),
    op!(Enumerable, "Take", [SEQ_T0, Shape::Int32], SEQ_T0, e::take),
    op!(Enumerable, "Skip", [SEQ_T0, Shape::Int32], SEQ_T0, e::skip),
    op!(Enumerable, "TakeWhile", [SEQ_T0, PREDICATE], SEQ_T0, e::take_while),
    op!(Enumerable, "SkipWhile", [SEQ_T0, PREDICATE], SEQ_T0, e::skip_while),
    op!(Enumerable, "Concat", [SEQ_T0, SEQ_T0], SEQ_T0, e::concat),
    op!(Enumerable, "Zip", [SEQ_T0, SEQ_T1, ZIPPER], Shape::Seq(&T2), e::zip),
    op!(Enumerable, "DefaultIfEmpty", [SEQ_T0], SEQ_T0, e::default_if_empty),
    op!(Enumerable, "Range", [Shape::Int32, Shape::Int32], Shape::Seq(&Shape::Int32), e::range),
    op!(Enumerable, "Empty", [], SEQ_T0, e::empty),
    op!(Enumerable, "Contains", [SEQ_T0, T0], Shape::Bool, e::contains),
    op!(Enumerable, "Count", [SEQ_T0], Shape::Int32, e::count),
    op!(Enumerable, "Count", [SEQ_T0, PREDICATE], Shape::Int32, e::count_where),
    op!(Enumerable, "LongCount", [SEQ_T0], Shape::Int64, e::long_count),
    op!(Enumerable, "Any", [SEQ_T0], Shape::Bool, e::any),
    op!(Enumerable, "Any", [SEQ_T0, PREDICATE], Shape::Bool, e::any_where),
    op!(Enumerable, "All", [SEQ_T0, PREDICATE], Shape::Bool, e::all),
    op!(Enumerable, "SequenceEqual", [SEQ_T0, SEQ_T0], Shape::Bool, e::sequence_equal),
    op!(Enumerable, "ElementAt", [SEQ_T0, Shape::Int32], T0, e::element_at),
    op!(Enumerable, "ElementAtOrDefault", [SEQ_T0, Shape::Int32], T0, e::element_at_or_default),
    op!(Enumerable, "Sum", [Shape::Seq(&Shape::Int32)], Shape::Int32, e::sum_int32),
    op!(Enumerable, "Sum", [Shape::Seq(&Shape::Int64)], Shape::Int64, e::sum_int64),
    op!(Enumerable, "Sum", [Shape::Seq(&Shape::Float64)], Shape::Float64, e::sum_float64),
    op!(Enumerable, "Min", [Shape::Seq(&Shape::Int32)], Shape::Int32, e::min_int32),
    op!(Enumerable, "Max", [Shape::Seq(&Shape::Int32)], Shape::Int32, e::max_int32),
    op!(Enumerable, "Average", [Shape::Seq(&Shape::Int32)], Shape::Float64, e::average_int32),
    op!(Enumerable, "First", [SEQ_T0], T0, e::first),
    op!(Enumerable, "Distinct", [SEQ_T0], SEQ_T0, e::distinct),
    op!(Enumerable, "Reverse", [SEQ_T0], SEQ_T0, e::reverse),
    op!(Enumerable, "ToList", [SEQ_T0], Shape::List(&T0), e::to_list),

    // Queryable
    op!(Queryable, "Where", [QRY_T0, PREDICATE], QRY_T0, e::where_),
    op!(Queryable, "Select", [QRY_T0, SELECTOR], QRY_T1, e::select),
    op!(Queryable, "SelectMany", [QRY_T0, Shape::Func(&[T0, SEQ_T1])], QRY_T1, e::select_many),
    op!(Queryable, "Take", [QRY_T0, Shape::Int32], QRY_T0, e::take),
    op!(Queryable, "Skip", [QRY_T0, Shape::Int32], QRY_T0, e::skip),
    op!(Queryable, "Concat", [QRY_T0, SEQ_T0], QRY_T0, e::concat),
    op!(Queryable, "Contains", [QRY_T0, T0], Shape::Bool, e::contains),
    op!(Queryable, "Count", [QRY_T0], Shape::Int32, e::count),
    op!(Queryable, "Any", [QRY_T0], Shape::Bool, e::any),
    op!(Queryable, "All", [QRY_T0, PREDICATE], Shape::Bool, e::all),
    op!(Queryable, "Sum", [Shape::Query(&Shape::Int32)], Shape::Int32, e::sum_int32),
    op!(Queryable, "ElementAt", [QRY_T0, Shape::Int32], T0, e::element_at),
    op!(Queryable, "First", [QRY_T0], T0, e::first),

    // Observable
    op!(Observable, "Where", [OBS_T0, PREDICATE], OBS_T0),
    op!(Observable, "Select", [OBS_T0, SELECTOR], OBS_T1),
    op!(Observable, "SelectMany", [OBS_T0, Shape::Func(&[T0, OBS_T1])], OBS_T1),
    op!(Observable, "Take", [OBS_T0, Shape::Int32], OBS_T0),
    op!(Observable, "Skip", [OBS_T0, Shape::Int32], OBS_T0),
    op!(Observable, "Concat", [OBS_T0, OBS_T0], OBS_T0),
    op!(Observable, "Merge", [OBS_T0, OBS_T0], OBS_T0),
    op!(Observable, "Amb", [OBS_T0, OBS_T0], OBS_T0),
    op!(Observable, "StartWith", [OBS_T0, Shape::Seq(&T0)], OBS_T0),
    op!(Observable, "DistinctUntilChanged", [OBS_T0], OBS_T0),
    op!(Observable, "Count", [OBS_T0], Shape::Obs(&Shape::Int32)),
    op!(Observable, "Any", [OBS_T0], Shape::Obs(&Shape::Bool)),
    op!(Observable, "Return", [T0], OBS_T0),
    op!(Observable, "Empty", [], OBS_T0),
    op!(Observable, "Never", [], OBS_T0),
    op!(Observable, "Range", [Shape::Int32, Shape::Int32], Shape::Obs(&Shape::Int32)),
    op!(Observable, "ToObservable", [SEQ_T0], OBS_T0),
    op!(Observable, "Zip", [OBS_T0, OBS_T1, ZIPPER], Shape::Obs(&T2)),
    op!(Observable, "CombineLatest", [OBS_T0, OBS_T1, ZIPPER], Shape::Obs(&T2)),
    op!(Observable, "Throttle", [OBS_T0, Shape::TimeSpan], OBS_T0),
    op!(Observable, "Sample", [OBS_T0, Shape::TimeSpan], OBS_T0),
    op!(Observable, "Timeout", [OBS_T0, Shape::TimeSpan], OBS_T0),
    op!(Observable, "Delay", [OBS_T0, Shape::TimeSpan], OBS_T0),
    op!(Observable, "Delay", [OBS_T0, Shape::DateTimeOffset], OBS_T0),
    op!(Observable, "DelaySubscription", [OBS_T0, Shape::TimeSpan], OBS_T0),
    op!(Observable, "Interval", [Shape::TimeSpan], Shape::Obs(&Shape::Int64)),
    op!(Observable, "Timer", [Shape::TimeSpan], Shape::Obs(&Shape::Int64)),
    op!(Observable, "Timer", [Shape::DateTimeOffset], Shape::Obs(&Shape::Int64)),

    // Qbservable
    op!(Qbservable, "Where", [QBS_T0, PREDICATE], QBS_T0),
    op!(Qbservable, "Select", [QBS_T0, SELECTOR], QBS_T1),
    op!(Qbservable, "Take", [QBS_T0, Shape::Int32], QBS_T0),
    op!(Qbservable, "Skip", [QBS_T0, Shape::Int32], QBS_T0),
    op!(Qbservable, "Merge", [QBS_T0, OBS_T0], QBS_T0),
    op!(Qbservable, "AsQbservable", [OBS_T0], QBS_T0),
    op!(Qbservable, "AsObservable", [QBS_T0], OBS_T0),
    op!(Qbservable, "ToQbservable", [QRY_T0], QBS_T0),
    op!(Qbservable, "Throttle", [QBS_T0, Shape::TimeSpan], QBS_T0),
    op!(Qbservable, "Sample", [QBS_T0, Shape::TimeSpan], QBS_T0),
    op!(Qbservable, "Timeout", [QBS_T0, Shape::TimeSpan], QBS_T0),
    op!(Qbservable, "Delay", [QBS_T0, Shape::TimeSpan], QBS_T0),
];

/// The fixed universe of operators that bulk registration draws from.
///
/// Every operator is a static generic method declared on its container.
/// Enumerable and Queryable operators carry a synchronous implementation;
/// reactive operators are descriptors only.
pub struct OperatorCatalog {
    methods: Vec<MethodDesc>,
    implementations: HashMap<MethodKey, OperatorFcn>,
}

impl fmt::Debug for OperatorCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorCatalog")
            .field("methods", &self.methods.len())
            .field("implementations", &self.implementations.len())
            .finish()
    }
}

impl OperatorCatalog {
    /// Build the catalog from the static operator table, in container order.
    pub fn standard() -> Self {
        let mut methods = vec![];
        let mut implementations = HashMap::new();
        for container in Container::ALL {
            for spec in OPERATORS.iter().filter(|s| s.container == container) {
                let method = MethodDesc::static_method(
                    container.declaring_type(),
                    spec.name,
                    spec.params.iter().map(|p| p.to_type()).collect(),
                    spec.ret.to_type(),
                );
                if let Some(f) = spec.invoke {
                    implementations.insert(method.definition_key(), f);
                }
                methods.push(method);
            }
        }
        Self {
            methods,
            implementations,
        }
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodDesc> {
        self.methods.iter()
    }

    /// Every overload whose name equals `name` (ordinal, case-sensitive).
    pub fn named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodDesc> + 'a {
        self.methods.iter().filter(move |m| m.name() == name)
    }

    pub fn safe_operators(&self) -> impl Iterator<Item = &MethodDesc> {
        self.methods
            .iter()
            .filter(|m| SAFE_OPERATOR_NAMES.contains(m.name()))
    }

    pub fn concurrency_operators(&self) -> impl Iterator<Item = &MethodDesc> {
        self.methods
            .iter()
            .filter(|m| CONCURRENCY_OPERATOR_NAMES.contains(m.name()))
    }

    /// Synchronous implementation of a catalog operator, looked up by the
    /// key of its generic definition.
    pub fn implementation(&self, key: &MethodKey) -> Option<OperatorFcn> {
        self.implementations.get(key).copied()
    }

    /// Find an overload by container, name and parameter types.
    pub fn find(&self, container: Container, name: &str, parameters: &[Type]) -> Option<&MethodDesc> {
        let declaring_type = container.declaring_type();
        self.methods.iter().find(|m| {
            m.declaring_type() == &declaring_type
                && m.name() == name
                && m.definition().parameters == parameters
        })
    }
}
