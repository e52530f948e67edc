// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::types::{Primitive, Type};
use crate::Rc;

use core::cell::RefCell;
use core::fmt;
use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{self as ser, SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

pub type ValueIter = Box<dyn Iterator<Item = Result<Value>>>;

/// A pull-based sequence that lives on the originating side.
pub trait LocalSequence: fmt::Debug {
    /// Type of the sequence object itself.
    fn runtime_type(&self) -> Type;

    /// Element type declared by the sequence, if it declares one.
    fn element_type(&self) -> Option<Type>;

    /// True for sequences produced by synthesized iterators (lazy operators,
    /// generators). Such sequences must never cross the boundary as-is.
    fn is_synthesized(&self) -> bool;

    fn enumerate(&self) -> Result<ValueIter>;
}

/// A push-based stream that lives on the originating side.
pub trait LocalObservable: fmt::Debug {
    fn runtime_type(&self) -> Type;

    fn element_type(&self) -> Option<Type>;
}

/// An arbitrary object that lives on the originating side.
pub trait LocalObject: fmt::Debug {
    fn type_of(&self) -> Type;

    fn member(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Plain data records serialize as maps; other objects refuse.
    fn as_record(&self) -> Option<&Record> {
        None
    }
}

/// Concrete, finite, element-typed sequence. This is the only sequence
/// representation that may be folded into a tree as a literal.
#[derive(Debug, Clone, PartialEq)]
pub struct List {
    element_type: Type,
    items: Vec<Value>,
}

impl List {
    pub fn new(element_type: Type, items: Vec<Value>) -> Self {
        Self {
            element_type,
            items,
        }
    }

    pub fn element_type(&self) -> &Type {
        &self.element_type
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn runtime_type(&self) -> Type {
        Type::list(self.element_type.clone())
    }
}

/// Single-pass sequence over a boxed iterator.
pub struct LazySequence {
    name: Rc<str>,
    element_type: Option<Type>,
    synthesized: bool,
    source: RefCell<Option<ValueIter>>,
}

impl LazySequence {
    /// Sequence produced by an anonymous iterator, e.g. a lazy operator.
    pub fn synthesized(name: &str, element_type: Option<Type>, source: ValueIter) -> Self {
        Self {
            name: name.into(),
            element_type,
            synthesized: true,
            source: RefCell::new(Some(source)),
        }
    }

    /// Sequence implemented by a nominal type named `name`.
    pub fn declared(name: &str, element_type: Option<Type>, source: ValueIter) -> Self {
        Self {
            synthesized: false,
            ..Self::synthesized(name, element_type, source)
        }
    }
}

impl fmt::Debug for LazySequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySequence")
            .field("name", &self.name)
            .field("element_type", &self.element_type)
            .field("synthesized", &self.synthesized)
            .finish()
    }
}

impl LocalSequence for LazySequence {
    fn runtime_type(&self) -> Type {
        if self.synthesized {
            Type::anonymous(&format!("<{}>d__Iterator", self.name))
        } else {
            Type::named(&self.name)
        }
    }

    fn element_type(&self) -> Option<Type> {
        self.element_type.clone()
    }

    fn is_synthesized(&self) -> bool {
        self.synthesized
    }

    fn enumerate(&self) -> Result<ValueIter> {
        self.source
            .borrow_mut()
            .take()
            .ok_or_else(|| anyhow!("sequence `{}` can only be enumerated once", self.name))
    }
}

type FunctionBody = dyn Fn(&[Value]) -> Result<Value>;

/// Delegate value, e.g. the predicate passed to `Where`.
pub struct Function {
    ty: Type,
    body: Box<FunctionBody>,
}

impl Function {
    pub fn new(ty: Type, body: impl Fn(&[Value]) -> Result<Value> + 'static) -> Self {
        Self {
            ty,
            body: Box::new(body),
        }
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.body)(args)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self.ty)
    }
}

/// Plain object with named fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    ty: Type,
    fields: BTreeMap<Rc<str>, Value>,
}

impl Record {
    pub fn new(ty: Type) -> Self {
        Self {
            ty,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn fields(&self) -> &BTreeMap<Rc<str>, Value> {
        &self.fields
    }
}

impl LocalObject for Record {
    fn type_of(&self) -> Type {
        self.ty.clone()
    }

    fn member(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }

    fn as_record(&self) -> Option<&Record> {
        Some(self)
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Char(char),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(Rc<str>),
    Enum { ty: Rc<str>, name: Rc<str> },

    // Opaque value types.
    Guid(u128),
    Uri(Rc<str>),
    // Nanoseconds.
    TimeSpan(i64),
    // Nanoseconds since the unix epoch.
    DateTimeOffset(i64),

    List(Rc<List>),

    // Live local state. These never serialize.
    Sequence(Rc<dyn LocalSequence>),
    Observable(Rc<dyn LocalObservable>),
    Object(Rc<dyn LocalObject>),
    Function(Rc<Function>),
}

fn same_object<T: ?Sized>(a: &Rc<T>, b: &Rc<T>) -> bool {
    Rc::as_ptr(a).cast::<()>() == Rc::as_ptr(b).cast::<()>()
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Enum { ty: t1, name: n1 }, Value::Enum { ty: t2, name: n2 }) => {
                t1 == t2 && n1 == n2
            }
            (Value::Guid(a), Value::Guid(b)) => a == b,
            (Value::Uri(a), Value::Uri(b)) => a == b,
            (Value::TimeSpan(a), Value::TimeSpan(b)) => a == b,
            (Value::DateTimeOffset(a), Value::DateTimeOffset(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Sequence(a), Value::Sequence(b)) => same_object(a, b),
            (Value::Observable(a), Value::Observable(b)) => same_object(a, b),
            (Value::Object(a), Value::Object(b)) => same_object(a, b),
            (Value::Function(a), Value::Function(b)) => same_object(a, b),
            _ => false,
        }
    }
}

impl Value {
    pub fn list(element_type: Type, items: Vec<Value>) -> Value {
        Value::List(Rc::new(List::new(element_type, items)))
    }

    pub fn sequence(sequence: impl LocalSequence + 'static) -> Value {
        Value::Sequence(Rc::new(sequence))
    }

    pub fn observable(observable: impl LocalObservable + 'static) -> Value {
        Value::Observable(Rc::new(observable))
    }

    pub fn object(object: impl LocalObject + 'static) -> Value {
        Value::Object(Rc::new(object))
    }

    pub fn function(ty: Type, body: impl Fn(&[Value]) -> Result<Value> + 'static) -> Value {
        Value::Function(Rc::new(Function::new(ty, body)))
    }

    pub fn enumeration(ty: &str, name: &str) -> Value {
        Value::Enum {
            ty: ty.into(),
            name: name.into(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Type of the value itself, as opposed to the static type of the slot
    /// holding it. `Null` reports `Object`.
    pub fn runtime_type(&self) -> Type {
        match self {
            Value::Null => Type::Object,
            Value::Bool(_) => Type::BOOL,
            Value::Char(_) => Type::CHAR,
            Value::Int32(_) => Type::INT32,
            Value::Int64(_) => Type::INT64,
            Value::Float64(_) => Type::FLOAT64,
            Value::String(_) => Type::STRING,
            Value::Enum { ty, .. } => Type::Enum(ty.clone()),
            Value::Guid(_) => Type::guid(),
            Value::Uri(_) => Type::uri(),
            Value::TimeSpan(_) => Type::time_span(),
            Value::DateTimeOffset(_) => Type::date_time_offset(),
            Value::List(l) => l.runtime_type(),
            Value::Sequence(s) => s.runtime_type(),
            Value::Observable(o) => o.runtime_type(),
            Value::Object(o) => o.type_of(),
            Value::Function(f) => f.ty().clone(),
        }
    }

    /// Whether the value may be stored in a slot of static type `ty`.
    pub fn is_instance_of(&self, ty: &Type) -> bool {
        match self {
            Value::Null => match ty {
                Type::Primitive(p) => *p == Primitive::String,
                Type::Enum(_) | Type::Void => false,
                _ => true,
            },
            Value::Sequence(s) => {
                let element = s.element_type().unwrap_or(Type::Object);
                ty.is_assignable_from(&s.runtime_type())
                    || ty.is_assignable_from(&Type::enumerable(element))
            }
            Value::Observable(o) => {
                let element = o.element_type().unwrap_or(Type::Object);
                ty.is_assignable_from(&o.runtime_type())
                    || ty.is_assignable_from(&Type::observable(element))
            }
            _ => ty.is_assignable_from(&self.runtime_type()),
        }
    }

    pub fn is_iterable(&self) -> bool {
        matches!(self, Value::List(_) | Value::Sequence(_))
    }

    pub fn is_synthesized(&self) -> bool {
        match self {
            Value::Sequence(s) => s.is_synthesized(),
            _ => false,
        }
    }

    /// Element type declared by an iterable value.
    pub fn declared_element_type(&self) -> Option<Type> {
        match self {
            Value::List(l) => Some(l.element_type().clone()),
            Value::Sequence(s) => s.element_type(),
            _ => None,
        }
    }

    pub fn iterate(&self) -> Result<ValueIter> {
        match self {
            Value::List(l) => Ok(Box::new(l.items().to_vec().into_iter().map(Ok))),
            Value::Sequence(s) => s.enumerate(),
            _ => bail!("`{}` is not a sequence", self.runtime_type()),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            _ => Err(anyhow!("not a bool")),
        }
    }

    pub fn as_i32(&self) -> Result<i32> {
        match self {
            Value::Int32(n) => Ok(*n),
            _ => Err(anyhow!("not an Int32")),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::Int32(n) => Ok(i64::from(*n)),
            Value::Int64(n) => Ok(*n),
            _ => Err(anyhow!("not an integer")),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::Int32(n) => Ok(f64::from(*n)),
            Value::Int64(n) => Ok(*n as f64),
            Value::Float64(n) => Ok(*n),
            _ => Err(anyhow!("not a number")),
        }
    }

    pub fn as_string(&self) -> Result<&Rc<str>> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(anyhow!("not a string")),
        }
    }

    pub fn as_list(&self) -> Result<&List> {
        match self {
            Value::List(l) => Ok(l),
            _ => Err(anyhow!("not a list")),
        }
    }

    pub fn as_function(&self) -> Result<&Function> {
        match self {
            Value::Function(f) => Ok(f),
            _ => Err(anyhow!("not a function")),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Value> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_str(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(yaml: &str) -> Result<Value> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int32(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int64(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float64(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

fn format_guid(g: u128) -> String {
    format!(
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        g >> 96,
        (g >> 80) & 0xffff,
        (g >> 64) & 0xffff,
        (g >> 48) & 0xffff,
        g & 0xffff_ffff_ffff
    )
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Char(c) => write!(f, "{c:?}"),
            Value::Int32(n) => write!(f, "{n}"),
            Value::Int64(n) => write!(f, "{n}L"),
            Value::Float64(n) => write!(f, "{n:?}"),
            Value::String(s) => write!(f, "{:?}", s.as_ref()),
            Value::Enum { ty, name } => write!(f, "{ty}.{name}"),
            Value::Guid(g) => f.write_str(&format_guid(*g)),
            Value::Uri(u) => f.write_str(u),
            Value::TimeSpan(n) => write!(f, "{n}ns"),
            Value::DateTimeOffset(n) => write!(f, "@{n}ns"),
            Value::List(l) => {
                f.write_str("[")?;
                for (idx, item) in l.items().iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Sequence(_) | Value::Observable(_) | Value::Object(_) | Value::Function(_) => {
                write!(f, "<{}>", self.runtime_type())
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use ser::Error;
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Char(c) => serializer.serialize_char(*c),
            Value::Int32(n) => serializer.serialize_i32(*n),
            Value::Int64(n) => serializer.serialize_i64(*n),
            Value::Float64(n) => serializer.serialize_f64(*n),
            Value::String(s) | Value::Uri(s) => serializer.serialize_str(s),
            Value::Enum { name, .. } => serializer.serialize_str(name),
            Value::Guid(g) => serializer.serialize_str(&format_guid(*g)),
            Value::TimeSpan(n) | Value::DateTimeOffset(n) => serializer.serialize_i64(*n),
            Value::List(l) => l.items().serialize(serializer),
            Value::Object(o) => match o.as_record() {
                Some(record) => {
                    let mut map = serializer.serialize_map(Some(record.fields().len()))?;
                    for (name, v) in record.fields() {
                        map.serialize_entry(name.as_ref(), v)?;
                    }
                    map.end()
                }
                None => Err(S::Error::custom(format!(
                    "cannot serialize local object of type `{}`",
                    o.type_of()
                ))),
            },
            Value::Sequence(_) | Value::Observable(_) | Value::Function(_) => Err(
                S::Error::custom(format!("cannot serialize live `{}`", self.runtime_type())),
            ),
        }
    }
}

/// Type given to records deserialized from data.
pub const RECORD_TYPE: &str = "Record";

/// Common runtime type of the items, or `Object` when they disagree.
fn infer_element_type(items: &[Value]) -> Type {
    let mut types = items.iter().filter(|v| !v.is_null()).map(Value::runtime_type);
    match types.next() {
        Some(first) if types.all(|t| t == first) => first,
        _ => Type::Object,
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a value")
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(match i32::try_from(v) {
            Ok(n) => Value::Int32(n),
            Err(_) => Value::Int64(v),
        })
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match i64::try_from(v) {
            Ok(n) => self.visit_i64(n),
            Err(_) => Err(E::custom(format!("integer {v} is out of range"))),
        }
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Float64(v))
    }

    fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::String(s.into()))
    }

    fn visit_seq<V>(self, mut visitor: V) -> Result<Self::Value, V::Error>
    where
        V: SeqAccess<'de>,
    {
        let mut items = vec![];
        while let Some(v) = visitor.next_element()? {
            items.push(v);
        }
        Ok(Value::list(infer_element_type(&items), items))
    }

    fn visit_map<V>(self, mut visitor: V) -> Result<Self::Value, V::Error>
    where
        V: MapAccess<'de>,
    {
        let mut record = Record::new(Type::named(RECORD_TYPE));
        while let Some((key, value)) = visitor.next_entry::<String, Value>()? {
            record = record.with_field(&key, value);
        }
        Ok(Value::object(record))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}
