// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::catalog::OperatorCatalog;
use crate::config::{OperatorEntry, PolicyConfig};
use crate::descriptors::{MethodDesc, MethodKey};
use crate::evaluator::EvalError;
use crate::known_types::KnownTypes;
use crate::types::Type;
use crate::Rc;

use std::collections::BTreeSet;

use log::{debug, info};

/// Known types plus the set of methods that may run anywhere without being
/// resolved against local state.
///
/// Methods declared on primitives, enums and extension types are always
/// known. Other methods must be registered; generic methods are registered
/// and looked up by their generic definition.
#[derive(Debug, Clone)]
pub struct WhitelistContext {
    types: KnownTypes,
    catalog: Rc<OperatorCatalog>,
    known_methods: BTreeSet<MethodKey>,
}

impl Default for WhitelistContext {
    fn default() -> Self {
        Self::new()
    }
}

impl WhitelistContext {
    /// Context seeded with the safe operators. Concurrency operators are not
    /// included.
    pub fn new() -> Self {
        Self::builder().include_safe_operators(true).build()
    }

    pub fn builder() -> WhitelistBuilder {
        WhitelistBuilder::default()
    }

    /// Context with exactly `methods`, optionally seeded with the operator
    /// catalogs.
    pub fn with_methods(
        methods: impl IntoIterator<Item = MethodDesc>,
        include_safe_operators: bool,
        include_concurrency_operators: bool,
    ) -> Self {
        Self::builder()
            .methods(methods)
            .include_safe_operators(include_safe_operators)
            .include_concurrency_operators(include_concurrency_operators)
            .build()
    }

    /// Context with the safe operators and the given known types.
    pub fn with_types(
        include_concurrency_operators: bool,
        types: impl IntoIterator<Item = Type>,
    ) -> Self {
        Self::builder()
            .include_safe_operators(true)
            .include_concurrency_operators(include_concurrency_operators)
            .known_types(types)
            .build()
    }

    pub fn from_config(config: &PolicyConfig) -> anyhow::Result<Self> {
        let mut builder = Self::builder()
            .include_safe_operators(config.include_safe_operators)
            .include_concurrency_operators(config.include_concurrency_operators);
        for ty in &config.known_types {
            builder = builder.known_type(ty.parse()?);
        }
        for module in &config.known_modules {
            builder = builder.known_module(module);
        }

        let mut context = builder.build();
        for entry in &config.operators {
            match entry {
                OperatorEntry::Name(name) => {
                    context.register_operator(name)?;
                }
                OperatorEntry::Overload { name, parameters } => {
                    let parameters = parameters
                        .iter()
                        .map(|p| p.parse())
                        .collect::<anyhow::Result<Vec<Type>>>()?;
                    context.register_operator_with(name, &parameters)?;
                }
            }
        }

        info!(
            "loaded whitelist policy with {} known methods",
            context.known_methods.len()
        );
        Ok(context)
    }

    pub fn catalog(&self) -> &Rc<OperatorCatalog> {
        &self.catalog
    }

    pub fn known_types(&self) -> &KnownTypes {
        &self.types
    }

    pub fn known_methods(&self) -> impl Iterator<Item = &MethodKey> {
        self.known_methods.iter()
    }

    pub fn register_type(&mut self, ty: Type) {
        self.types.register_type(ty);
    }

    pub fn register_module(&mut self, module: &str) {
        self.types.register_module(module);
    }

    pub fn is_known_type(&self, ty: &Type) -> bool {
        self.types.is_known_type(ty)
    }

    pub fn is_known_method(&self, method: &MethodDesc) -> bool {
        let declaring_type = method.declaring_type();
        declaring_type.is_enum()
            || declaring_type.is_primitive()
            || KnownTypes::is_extension_type(declaring_type)
            || self.known_methods.contains(&method.definition_key())
    }

    /// Add `method` as given. A closed generic instantiation is stored as
    /// such and does not make its generic definition known.
    pub fn register_method(&mut self, method: &MethodDesc) {
        self.known_methods.insert(method.key());
    }

    /// Register every catalog overload named `name`. Returns the number of
    /// overloads matched.
    pub fn register_operator(&mut self, name: &str) -> Result<usize, EvalError> {
        let mut matched = 0;
        for method in self.catalog.named(name) {
            self.known_methods.insert(method.key());
            matched += 1;
        }
        if matched == 0 {
            return Err(EvalError::UnknownOperatorName(name.to_string()));
        }
        debug!("registered {matched} overloads of `{name}`");
        Ok(matched)
    }

    /// Register the catalog overloads named `name` whose parameter types are
    /// exactly `parameters`.
    pub fn register_operator_with(
        &mut self,
        name: &str,
        parameters: &[Type],
    ) -> Result<usize, EvalError> {
        let mut matched = 0;
        for method in self
            .catalog
            .named(name)
            .filter(|m| m.definition().parameters == parameters)
        {
            self.known_methods.insert(method.key());
            matched += 1;
        }
        if matched == 0 {
            return Err(EvalError::UnknownOperatorName(name.to_string()));
        }
        debug!("registered {matched} overloads of `{name}` with matching parameters");
        Ok(matched)
    }

    /// Re-register every overload of `name` that is already known.
    pub fn ensure_has_known_operator(&mut self, name: &str) -> usize {
        let mut promoted = 0;
        for method in self.catalog.named(name) {
            let key = method.key();
            if self.known_methods.contains(&key) {
                self.known_methods.insert(key);
                promoted += 1;
            }
        }
        promoted
    }
}

/// Builder for `WhitelistContext`. Nothing is included unless requested.
#[derive(Debug, Default)]
pub struct WhitelistBuilder {
    methods: Vec<MethodDesc>,
    include_safe_operators: bool,
    include_concurrency_operators: bool,
    types: Vec<Type>,
    modules: Vec<String>,
    catalog: Option<Rc<OperatorCatalog>>,
}

impl WhitelistBuilder {
    pub fn method(mut self, method: MethodDesc) -> Self {
        self.methods.push(method);
        self
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = MethodDesc>) -> Self {
        self.methods.extend(methods);
        self
    }

    pub fn include_safe_operators(mut self, include: bool) -> Self {
        self.include_safe_operators = include;
        self
    }

    pub fn include_concurrency_operators(mut self, include: bool) -> Self {
        self.include_concurrency_operators = include;
        self
    }

    pub fn known_type(mut self, ty: Type) -> Self {
        self.types.push(ty);
        self
    }

    pub fn known_types(mut self, types: impl IntoIterator<Item = Type>) -> Self {
        self.types.extend(types);
        self
    }

    pub fn known_module(mut self, module: &str) -> Self {
        self.modules.push(module.to_string());
        self
    }

    /// Share an existing catalog instead of building the standard one.
    pub fn catalog(mut self, catalog: Rc<OperatorCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn build(self) -> WhitelistContext {
        let catalog = self
            .catalog
            .unwrap_or_else(|| Rc::new(OperatorCatalog::standard()));

        let mut types = KnownTypes::with_types(self.types);
        for module in &self.modules {
            types.register_module(module);
        }

        let mut known_methods: BTreeSet<MethodKey> =
            self.methods.iter().map(MethodDesc::key).collect();
        if self.include_safe_operators {
            known_methods.extend(catalog.safe_operators().map(MethodDesc::key));
        }
        if self.include_concurrency_operators {
            known_methods.extend(catalog.concurrency_operators().map(MethodDesc::key));
        }
        debug!(
            "built whitelist: {} methods, safe operators {}, concurrency operators {}",
            known_methods.len(),
            self.include_safe_operators,
            self.include_concurrency_operators
        );

        WhitelistContext {
            types,
            catalog,
            known_methods,
        }
    }
}
