// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::catalog::OperatorCatalog;
use crate::descriptors::{MemberDesc, MemberKey, MethodDesc, MethodKey};
use crate::value::Value;
use crate::Rc;

use std::collections::HashMap;

use anyhow::{bail, Result};

/// Dynamic invocation facility.
///
/// Performs a member read or a method call against resolved local values.
/// Any error returned is treated as an opaque invocation fault.
pub trait Invoker {
    fn read(&self, member: &MemberDesc, instance: Option<&Value>) -> Result<Value>;

    fn call(&self, method: &MethodDesc, instance: Option<&Value>, args: &[Value]) -> Result<Value>;

    /// Whether `call` has an implementation for `method`.
    fn can_call(&self, _method: &MethodDesc) -> bool {
        true
    }

    /// Whether `read` has an implementation for `member` on `instance`.
    fn can_read(&self, _member: &MemberDesc, _instance: Option<&Value>) -> bool {
        true
    }
}

pub type MethodFcn = Box<dyn Fn(Option<&Value>, &[Value]) -> Result<Value>>;
pub type MemberFcn = Box<dyn Fn(Option<&Value>) -> Result<Value>>;

/// Callable handles keyed by descriptor identity.
///
/// Methods are keyed by their generic definition, so one handle serves every
/// instantiation. Calls not registered here fall back to the operator
/// catalog's implementations; member reads fall back to the members of the
/// local object itself.
pub struct CallableTable {
    catalog: Rc<OperatorCatalog>,
    methods: HashMap<MethodKey, MethodFcn>,
    members: HashMap<MemberKey, MemberFcn>,
}

impl CallableTable {
    pub fn new(catalog: Rc<OperatorCatalog>) -> Self {
        Self {
            catalog,
            methods: HashMap::new(),
            members: HashMap::new(),
        }
    }

    pub fn add_method(&mut self, method: &MethodDesc, fcn: MethodFcn) -> Result<()> {
        let key = method.definition_key();
        if self.methods.contains_key(&key) {
            bail!("callable for `{}` already added", method.qualified_name());
        }
        self.methods.insert(key, fcn);
        Ok(())
    }

    pub fn add_member(&mut self, member: &MemberDesc, fcn: MemberFcn) -> Result<()> {
        let key = member.key();
        if self.members.contains_key(&key) {
            bail!("callable for `{}` already added", member.qualified_name());
        }
        self.members.insert(key, fcn);
        Ok(())
    }

    pub fn catalog(&self) -> &Rc<OperatorCatalog> {
        &self.catalog
    }
}

impl Invoker for CallableTable {
    fn read(&self, member: &MemberDesc, instance: Option<&Value>) -> Result<Value> {
        if let Some(fcn) = self.members.get(&member.key()) {
            return fcn(instance);
        }
        match instance {
            Some(Value::Object(object)) => match object.member(&member.name) {
                Some(v) => Ok(v),
                None => bail!(
                    "`{}` has no member `{}`",
                    object.type_of(),
                    member.name
                ),
            },
            Some(v) => bail!(
                "cannot read `{}` from value of type `{}`",
                member.qualified_name(),
                v.runtime_type()
            ),
            None => bail!("no callable for static member `{}`", member.qualified_name()),
        }
    }

    fn call(&self, method: &MethodDesc, instance: Option<&Value>, args: &[Value]) -> Result<Value> {
        let key = method.definition_key();
        if let Some(fcn) = self.methods.get(&key) {
            return fcn(instance, args);
        }
        match self.catalog.implementation(&key) {
            Some(fcn) => fcn(method.type_args(), args),
            None => bail!("no callable for `{method}`"),
        }
    }

    fn can_call(&self, method: &MethodDesc) -> bool {
        let key = method.definition_key();
        self.methods.contains_key(&key) || self.catalog.implementation(&key).is_some()
    }

    fn can_read(&self, member: &MemberDesc, instance: Option<&Value>) -> bool {
        self.members.contains_key(&member.key())
            || matches!(instance, Some(Value::Object(o)) if o.member(&member.name).is_some())
    }
}
