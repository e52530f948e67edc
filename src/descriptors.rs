// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::types::Type;
use crate::Rc;

use core::fmt;

use anyhow::{bail, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemberKind {
    Field,
    Property,
}

/// Lookup key of a field or property.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemberKey {
    pub declaring_type: Type,
    pub name: Rc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDesc {
    pub declaring_type: Type,
    pub name: Rc<str>,
    pub kind: MemberKind,
    pub member_type: Type,
    pub is_static: bool,
}

impl MemberDesc {
    pub fn field(declaring_type: Type, name: &str, member_type: Type) -> Self {
        Self {
            declaring_type,
            name: name.into(),
            kind: MemberKind::Field,
            member_type,
            is_static: false,
        }
    }

    pub fn property(declaring_type: Type, name: &str, member_type: Type) -> Self {
        Self {
            kind: MemberKind::Property,
            ..Self::field(declaring_type, name, member_type)
        }
    }

    pub fn into_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn key(&self) -> MemberKey {
        MemberKey {
            declaring_type: self.declaring_type.clone(),
            name: self.name.clone(),
        }
    }

    /// `DeclaringType.Name`, used in diagnostics.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.declaring_type, self.name)
    }
}

/// Shape of a method as declared. Parameter and return types may mention
/// the method's own generic parameters as `Type::Param`.
#[derive(Debug, PartialEq, Eq)]
pub struct MethodDef {
    pub declaring_type: Type,
    pub name: Rc<str>,
    pub generic_arity: u8,
    pub parameters: Vec<Type>,
    pub return_type: Type,
    pub is_static: bool,
}

impl MethodDef {
    /// Declare a method. The generic arity is inferred from the highest
    /// `Type::Param` mentioned in the signature.
    pub fn new(
        declaring_type: Type,
        name: &str,
        parameters: Vec<Type>,
        return_type: Type,
        is_static: bool,
    ) -> Self {
        let generic_arity = parameters
            .iter()
            .chain(core::iter::once(&return_type))
            .filter_map(max_param)
            .max()
            .map_or(0, |idx| idx + 1);
        Self {
            declaring_type,
            name: name.into(),
            generic_arity,
            parameters,
            return_type,
            is_static,
        }
    }
}

fn max_param(ty: &Type) -> Option<u8> {
    match ty {
        Type::Param(idx) => Some(*idx),
        Type::Generic { args, .. } => args.iter().filter_map(max_param).max(),
        _ => None,
    }
}

/// Structural identity of a method used by whitelist lookups and callable
/// tables. Generic definitions have empty `type_args`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodKey {
    pub declaring_type: Type,
    pub name: Rc<str>,
    pub generic_arity: u8,
    pub parameters: Vec<Type>,
    pub type_args: Vec<Type>,
}

/// A method reference: a shared definition plus the type arguments of a
/// closed generic instantiation, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDesc {
    def: Rc<MethodDef>,
    type_args: Vec<Type>,
}

impl MethodDesc {
    pub fn new(def: MethodDef) -> Self {
        Self {
            def: Rc::new(def),
            type_args: vec![],
        }
    }

    pub fn instance(declaring_type: Type, name: &str, parameters: Vec<Type>, ret: Type) -> Self {
        Self::new(MethodDef::new(declaring_type, name, parameters, ret, false))
    }

    pub fn static_method(
        declaring_type: Type,
        name: &str,
        parameters: Vec<Type>,
        ret: Type,
    ) -> Self {
        Self::new(MethodDef::new(declaring_type, name, parameters, ret, true))
    }

    pub fn definition(&self) -> &MethodDef {
        &self.def
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn declaring_type(&self) -> &Type {
        &self.def.declaring_type
    }

    pub fn is_static(&self) -> bool {
        self.def.is_static
    }

    pub fn is_generic(&self) -> bool {
        self.def.generic_arity > 0
    }

    pub fn is_generic_definition(&self) -> bool {
        self.is_generic() && self.type_args.is_empty()
    }

    pub fn type_args(&self) -> &[Type] {
        &self.type_args
    }

    /// Close a generic definition over the given type arguments.
    pub fn make_generic(&self, type_args: Vec<Type>) -> Result<MethodDesc> {
        if !self.is_generic_definition() {
            bail!("`{}` is not a generic method definition", self.qualified_name());
        }
        if type_args.len() != self.def.generic_arity as usize {
            bail!(
                "`{}` expects {} type arguments, got {}",
                self.qualified_name(),
                self.def.generic_arity,
                type_args.len()
            );
        }
        Ok(Self {
            def: self.def.clone(),
            type_args,
        })
    }

    pub fn generic_definition(&self) -> MethodDesc {
        Self {
            def: self.def.clone(),
            type_args: vec![],
        }
    }

    pub fn parameter_types(&self) -> Vec<Type> {
        self.def
            .parameters
            .iter()
            .map(|p| p.substitute(&self.type_args))
            .collect()
    }

    pub fn return_type(&self) -> Type {
        self.def.return_type.substitute(&self.type_args)
    }

    pub fn is_void(&self) -> bool {
        self.def.return_type.is_void()
    }

    pub fn key(&self) -> MethodKey {
        MethodKey {
            declaring_type: self.def.declaring_type.clone(),
            name: self.def.name.clone(),
            generic_arity: self.def.generic_arity,
            parameters: self.def.parameters.clone(),
            type_args: self.type_args.clone(),
        }
    }

    /// Key of the generic definition; equal to `key()` for non-generic
    /// methods.
    pub fn definition_key(&self) -> MethodKey {
        MethodKey {
            type_args: vec![],
            ..self.key()
        }
    }

    /// `DeclaringType.Name`, used in diagnostics.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.def.declaring_type, self.def.name)
    }
}

impl fmt::Display for MethodDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.return_type(), self.qualified_name())?;
        if !self.type_args.is_empty() {
            let args: Vec<String> = self.type_args.iter().map(|t| t.to_string()).collect();
            write!(f, "<{}>", args.join(","))?;
        }
        let params: Vec<String> = self
            .parameter_types()
            .iter()
            .map(|t| t.to_string())
            .collect();
        write!(f, "({})", params.join(", "))
    }
}
