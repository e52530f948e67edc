// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// An operator to whitelist: every overload with the name, or only the
/// overload whose parameter types match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperatorEntry {
    Name(String),
    Overload {
        name: String,
        parameters: Vec<String>,
    },
}

/// Declarative whitelist policy.
///
/// ```yaml
/// include_concurrency_operators: false
/// operators:
///   - Throttle
///   - name: Delay
///     parameters: ["IObservable<T0>", "TimeSpan"]
/// known_types: ["Contoso.Orders.Order"]
/// known_modules: ["Contoso.Shared"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    #[serde(default = "default_include_safe_operators")]
    pub include_safe_operators: bool,

    #[serde(default)]
    pub include_concurrency_operators: bool,

    #[serde(default)]
    pub operators: Vec<OperatorEntry>,

    /// Type names in `Display` notation, e.g. `IEnumerable<T0>`.
    #[serde(default)]
    pub known_types: Vec<String>,

    #[serde(default)]
    pub known_modules: Vec<String>,
}

fn default_include_safe_operators() -> bool {
    true
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            include_safe_operators: default_include_safe_operators(),
            include_concurrency_operators: false,
            operators: vec![],
            known_types: vec![],
            known_modules: vec![],
        }
    }
}

impl PolicyConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}
