// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::Rc;

use core::fmt;
use core::str::FromStr;

use anyhow::{bail, Result};

pub const IENUMERABLE: &str = "IEnumerable";
pub const IOBSERVABLE: &str = "IObservable";
pub const IQUERYABLE: &str = "IQueryable";
pub const IQBSERVABLE: &str = "IQbservable";
pub const LIST: &str = "List";
pub const FUNC: &str = "Func";

pub const GUID: &str = "Guid";
pub const URI: &str = "Uri";
pub const TIME_SPAN: &str = "TimeSpan";
pub const DATE_TIME_OFFSET: &str = "DateTimeOffset";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Primitive {
    Bool,
    Char,
    Int32,
    Int64,
    Float64,
    String,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Bool => "Boolean",
            Primitive::Char => "Char",
            Primitive::Int32 => "Int32",
            Primitive::Int64 => "Int64",
            Primitive::Float64 => "Double",
            Primitive::String => "String",
        }
    }

    fn from_name(name: &str) -> Option<Primitive> {
        Some(match name {
            "Boolean" | "Bool" => Primitive::Bool,
            "Char" => Primitive::Char,
            "Int32" => Primitive::Int32,
            "Int64" => Primitive::Int64,
            "Double" | "Float64" => Primitive::Float64,
            "String" => Primitive::String,
            _ => return None,
        })
    }
}

/// Identity of a generic type definition: its name and the number of
/// type parameters it declares.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenericDef {
    name: Rc<str>,
    arity: u8,
}

impl GenericDef {
    pub fn new(name: impl Into<Rc<str>>, arity: u8) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> u8 {
        self.arity
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.as_ref() == name
    }
}

/// Static type of an expression node, member or value.
///
/// Generic types are represented structurally. A generic definition is the
/// generic type applied to its own unbound parameters, i.e.
/// `IEnumerable<T0>`, so that whitelist lookups are plain data comparisons.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    Void,
    // Fully dynamic; accepts any value.
    Object,
    Primitive(Primitive),
    Enum(Rc<str>),
    // Nominal type identified by its full path, e.g. `Contoso.Orders.Order`.
    Named(Rc<str>),
    // Compiler-synthesized type such as a closure class or an iterator.
    Anonymous(Rc<str>),
    // Non-generic sequence shape.
    Sequence,
    Generic { def: GenericDef, args: Vec<Type> },
    // Unbound generic parameter.
    Param(u8),
}

impl Type {
    pub const BOOL: Type = Type::Primitive(Primitive::Bool);
    pub const CHAR: Type = Type::Primitive(Primitive::Char);
    pub const INT32: Type = Type::Primitive(Primitive::Int32);
    pub const INT64: Type = Type::Primitive(Primitive::Int64);
    pub const FLOAT64: Type = Type::Primitive(Primitive::Float64);
    pub const STRING: Type = Type::Primitive(Primitive::String);

    pub fn named(path: &str) -> Type {
        Type::Named(path.into())
    }

    pub fn anonymous(name: &str) -> Type {
        Type::Anonymous(name.into())
    }

    pub fn enumeration(name: &str) -> Type {
        Type::Enum(name.into())
    }

    pub fn generic(name: &str, args: Vec<Type>) -> Type {
        Type::Generic {
            def: GenericDef::new(name, args.len() as u8),
            args,
        }
    }

    /// The open form of a generic type: `name<T0, .., Tn-1>`.
    pub fn definition_of(name: &str, arity: u8) -> Type {
        Type::generic(name, (0..arity).map(Type::Param).collect())
    }

    pub fn enumerable(element: Type) -> Type {
        Type::generic(IENUMERABLE, vec![element])
    }

    pub fn observable(element: Type) -> Type {
        Type::generic(IOBSERVABLE, vec![element])
    }

    pub fn queryable(element: Type) -> Type {
        Type::generic(IQUERYABLE, vec![element])
    }

    pub fn qbservable(element: Type) -> Type {
        Type::generic(IQBSERVABLE, vec![element])
    }

    pub fn list(element: Type) -> Type {
        Type::generic(LIST, vec![element])
    }

    pub fn func(mut params: Vec<Type>, ret: Type) -> Type {
        params.push(ret);
        Type::generic(FUNC, params)
    }

    pub fn guid() -> Type {
        Type::named(GUID)
    }

    pub fn uri() -> Type {
        Type::named(URI)
    }

    pub fn time_span() -> Type {
        Type::named(TIME_SPAN)
    }

    pub fn date_time_offset() -> Type {
        Type::named(DATE_TIME_OFFSET)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Primitive(_))
    }

    pub fn is_enum(&self) -> bool {
        matches!(self, Type::Enum(_))
    }

    pub fn is_generic(&self) -> bool {
        matches!(self, Type::Generic { .. })
    }

    pub fn generic_def(&self) -> Option<&GenericDef> {
        match self {
            Type::Generic { def, .. } => Some(def),
            _ => None,
        }
    }

    pub fn generic_args(&self) -> &[Type] {
        match self {
            Type::Generic { args, .. } => args,
            _ => &[],
        }
    }

    pub fn is_generic_of(&self, name: &str) -> bool {
        self.generic_def().is_some_and(|d| d.is(name))
    }

    /// Canonical generic definition of this type. Non-generic types are their
    /// own definition.
    pub fn generic_definition(&self) -> Type {
        match self {
            Type::Generic { def, .. } => Type::definition_of(def.name(), def.arity()),
            _ => self.clone(),
        }
    }

    /// `IEnumerable`, `IEnumerable<T>` or `IObservable<T>`.
    pub fn is_sequence_shape(&self) -> bool {
        self.is_enumerable_shape() || self.is_generic_of(IOBSERVABLE)
    }

    /// `IEnumerable` or `IEnumerable<T>`.
    pub fn is_enumerable_shape(&self) -> bool {
        matches!(self, Type::Sequence) || self.is_generic_of(IENUMERABLE)
    }

    /// Element type of a generic sequence-like type.
    pub fn sequence_element(&self) -> Option<&Type> {
        match self {
            Type::Generic { def, args }
                if args.len() == 1
                    && [IENUMERABLE, IQUERYABLE, IOBSERVABLE, IQBSERVABLE, LIST]
                        .contains(&def.name()) =>
            {
                args.first()
            }
            _ => None,
        }
    }

    /// Replace unbound parameters with the given type arguments. Parameters
    /// without a matching argument are left unbound.
    pub fn substitute(&self, type_args: &[Type]) -> Type {
        match self {
            Type::Param(idx) => match type_args.get(*idx as usize) {
                Some(t) => t.clone(),
                None => self.clone(),
            },
            Type::Generic { def, args } => Type::Generic {
                def: def.clone(),
                args: args.iter().map(|a| a.substitute(type_args)).collect(),
            },
            _ => self.clone(),
        }
    }

    pub fn contains_params(&self) -> bool {
        match self {
            Type::Param(_) => true,
            Type::Generic { args, .. } => args.iter().any(Type::contains_params),
            _ => false,
        }
    }

    /// Whether a value whose runtime type is `other` may be stored in a slot
    /// of static type `self`.
    pub fn is_assignable_from(&self, other: &Type) -> bool {
        if self == other {
            return true;
        }
        match self {
            Type::Object => !other.is_void(),
            Type::Param(_) => !other.is_void(),
            Type::Sequence => {
                matches!(other, Type::Sequence)
                    || [IENUMERABLE, IQUERYABLE, LIST]
                        .iter()
                        .any(|n| other.is_generic_of(n))
            }
            Type::Generic { def, args } if args.len() == 1 => {
                // Locally, a queryable is evaluated as an enumerable.
                let accepted: &[&str] = match def.name() {
                    IENUMERABLE | IQUERYABLE => &[IENUMERABLE, IQUERYABLE, LIST],
                    IOBSERVABLE => &[IOBSERVABLE, IQBSERVABLE],
                    IQBSERVABLE => &[IQBSERVABLE],
                    _ => &[],
                };
                match other.sequence_element() {
                    Some(element) if accepted.iter().any(|n| other.is_generic_of(n)) => {
                        Self::element_accepts(&args[0], element)
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn element_accepts(target: &Type, element: &Type) -> bool {
        target == element || matches!(target, Type::Object | Type::Param(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("Void"),
            Type::Object => f.write_str("Object"),
            Type::Primitive(p) => f.write_str(p.name()),
            Type::Enum(name) | Type::Named(name) | Type::Anonymous(name) => f.write_str(name),
            Type::Sequence => f.write_str(IENUMERABLE),
            Type::Generic { def, args } => {
                write!(f, "{}<", def.name())?;
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(">")
            }
            Type::Param(idx) => write!(f, "T{idx}"),
        }
    }
}

impl FromStr for Type {
    type Err = anyhow::Error;

    /// Parses the notation produced by `Display`, e.g. `Func<T0,Boolean>`.
    /// Unrecognized names become `Named` types.
    fn from_str(text: &str) -> Result<Type> {
        let mut parser = TypeParser { text, pos: 0 };
        let ty = parser.parse_type()?;
        parser.skip_ws();
        if parser.pos != text.len() {
            bail!("unexpected `{}` after type in `{text}`", &text[parser.pos..]);
        }
        Ok(ty)
    }
}

struct TypeParser<'a> {
    text: &'a str,
    pos: usize,
}

impl TypeParser<'_> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn parse_type(&mut self) -> Result<Type> {
        self.skip_ws();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !(c.is_alphanumeric() || c == '_' || c == '.') {
                break;
            }
            self.pos += c.len_utf8();
        }
        if start == self.pos {
            bail!("expected type name at offset {start} in `{}`", self.text);
        }
        let name = &self.text[start..self.pos];

        self.skip_ws();
        if self.peek() != Some('<') {
            return Ok(simple_type(name));
        }

        self.pos += 1;
        let mut args = vec![self.parse_type()?];
        loop {
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                    args.push(self.parse_type()?);
                }
                Some('>') => {
                    self.pos += 1;
                    break;
                }
                _ => bail!("unterminated type argument list in `{}`", self.text),
            }
        }
        Ok(Type::generic(name, args))
    }
}

fn simple_type(name: &str) -> Type {
    if let Some(p) = Primitive::from_name(name) {
        return Type::Primitive(p);
    }
    match name {
        "Void" => Type::Void,
        "Object" => Type::Object,
        IENUMERABLE => Type::Sequence,
        _ => match name.strip_prefix('T').map(str::parse::<u8>) {
            Some(Ok(idx)) => Type::Param(idx),
            _ => Type::named(name),
        },
    }
}
