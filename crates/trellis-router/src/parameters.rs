//! Instruction parameters.
//!
//! Parameters are written inside the parameter brackets of an instruction,
//! either positionally (`user(42)`) or by name (`user(id=42,tab=posts)`).
//! Route recognition adds named parameters extracted from the path.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::config::Separators;

/// A single parameter, named or positional.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    /// The parameter name, `None` for positional parameters.
    pub name: Option<String>,
    /// The parameter value.
    pub value: String,
}

/// The ordered parameters of a routing instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Parameters {
    entries: Vec<Parameter>,
}

impl Parameters {
    /// No parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the text between the parameter brackets.
    pub fn parse(source: &str, separators: &Separators) -> Self {
        let entries = source
            .split(separators.parameter)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match part.split_once(separators.parameter_key) {
                Some((name, value)) => Parameter {
                    name: Some(name.trim().to_string()),
                    value: value.trim().to_string(),
                },
                None => Parameter {
                    name: None,
                    value: part.to_string(),
                },
            })
            .collect();
        Self { entries }
    }

    /// Named parameters from a map.
    pub fn from_map(map: &BTreeMap<String, String>) -> Self {
        let mut parameters = Self::new();
        parameters.add_parameters(map);
        parameters
    }

    /// Whether there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// All parameters in order.
    pub fn entries(&self) -> &[Parameter] {
        &self.entries
    }

    /// The value of a named parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|parameter| parameter.name.as_deref() == Some(name))
            .map(|parameter| parameter.value.as_str())
    }

    /// The value of the positional parameter at `index`.
    pub fn positional(&self, index: usize) -> Option<&str> {
        self.entries
            .iter()
            .filter(|parameter| parameter.name.is_none())
            .nth(index)
            .map(|parameter| parameter.value.as_str())
    }

    /// Set a named parameter, replacing an existing value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|parameter| parameter.name.as_deref() == Some(name.as_str()))
        {
            Some(parameter) => parameter.value = value,
            None => self.entries.push(Parameter {
                name: Some(name),
                value,
            }),
        }
    }

    /// Add named parameters that are not already present.
    pub fn add_parameters(&mut self, map: &BTreeMap<String, String>) {
        for (name, value) in map {
            if self.get(name).is_none() {
                self.entries.push(Parameter {
                    name: Some(name.clone()),
                    value: value.clone(),
                });
            }
        }
    }

    /// Named parameters as a map. Positional ones are keyed by position.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut position = 0;
        self.entries
            .iter()
            .map(|parameter| match &parameter.name {
                Some(name) => (name.clone(), parameter.value.clone()),
                None => {
                    let key = position.to_string();
                    position += 1;
                    (key, parameter.value.clone())
                }
            })
            .collect()
    }

    /// Whether both sets describe the same values, regardless of order.
    pub fn same_as(&self, other: &Self) -> bool {
        self.to_map() == other.to_map()
    }

    /// The text that goes between the parameter brackets.
    pub fn stringify(&self, separators: &Separators) -> String {
        let mut out = String::new();
        for (i, parameter) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push(separators.parameter);
            }
            if let Some(name) = &parameter.name {
                let _ = write!(out, "{name}{}", separators.parameter_key);
            }
            out.push_str(&parameter.value);
        }
        out
    }
}
