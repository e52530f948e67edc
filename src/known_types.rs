// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::types::{
    Type, DATE_TIME_OFFSET, GUID, IENUMERABLE, IOBSERVABLE, IQBSERVABLE, IQUERYABLE, TIME_SPAN,
    URI,
};
use crate::value::Value;
use crate::Rc;

use std::collections::{BTreeSet, HashSet};

use lazy_static::lazy_static;

lazy_static! {
    // Opaque value types that are always safe to carry as literals.
    static ref EXTENSION_TYPES: HashSet<&'static str> =
        [GUID, URI, TIME_SPAN, DATE_TIME_OFFSET].into_iter().collect();

    // Generic definitions of the sequence shapes.
    static ref EXTENSION_GENERICS: HashSet<&'static str> =
        [IENUMERABLE, IOBSERVABLE, IQUERYABLE, IQBSERVABLE].into_iter().collect();
}

/// Registry of types that are safe to evaluate anywhere.
///
/// A type is known when it is a primitive, an enum, one of the extension
/// types, a registered type, or a named type under a registered module. A
/// generic type is known iff its generic definition is known.
#[derive(Debug, Clone, Default)]
pub struct KnownTypes {
    types: BTreeSet<Type>,
    modules: BTreeSet<Rc<str>>,
}

impl KnownTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(types: impl IntoIterator<Item = Type>) -> Self {
        let mut known = Self::new();
        for ty in types {
            known.register_type(ty);
        }
        known
    }

    /// Register a type. Generic types are registered by their definition.
    pub fn register_type(&mut self, ty: Type) {
        self.types.insert(ty.generic_definition());
    }

    /// Register every named type whose path starts with `module.`.
    pub fn register_module(&mut self, module: &str) {
        self.modules.insert(module.trim_end_matches('.').into());
    }

    pub fn is_extension_type(ty: &Type) -> bool {
        match ty {
            Type::Named(name) => EXTENSION_TYPES.contains(name.as_ref()),
            Type::Generic { def, .. } => EXTENSION_GENERICS.contains(def.name()),
            _ => false,
        }
    }

    pub fn is_known_type(&self, ty: &Type) -> bool {
        if ty.is_primitive() || ty.is_enum() || Self::is_extension_type(ty) {
            return true;
        }
        let definition = ty.generic_definition();
        if self.types.contains(&definition) {
            return true;
        }
        match &definition {
            Type::Named(path) => self.in_known_module(path),
            _ => false,
        }
    }

    /// Whether a value's own runtime type is known. `Null` is always known.
    pub fn is_known_value(&self, value: &Value) -> bool {
        value.is_null() || self.is_known_type(&value.runtime_type())
    }

    fn in_known_module(&self, path: &str) -> bool {
        self.modules.iter().any(|m| {
            path.strip_prefix(m.as_ref())
                .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    pub fn types(&self) -> impl Iterator<Item = &Type> {
        self.types.iter()
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|m| m.as_ref())
    }
}
