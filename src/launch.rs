use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::LaunchError;

/// A declared launch argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchArg {
    /// Argument name, as passed on the command line.
    pub name: String,
    /// Value used when the invoker does not override the argument.
    pub default_value: String,
    pub description: String,
}

impl LaunchArg {
    pub fn new(name: &str, default_value: impl Into<String>, description: &str) -> Self {
        Self {
            name: name.to_string(),
            default_value: default_value.into(),
            description: description.to_string(),
        }
    }
}

/// A piece of a command line that may be filled in from a launch configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Substitution {
    Text(String),
    /// The resolved value of the named launch argument.
    LaunchConfiguration(String),
}

impl Substitution {
    pub fn text(value: &str) -> Self {
        Substitution::Text(value.to_string())
    }

    pub fn configuration(name: &str) -> Self {
        Substitution::LaunchConfiguration(name.to_string())
    }

    pub fn perform(&self, configs: &LaunchConfigurations) -> Result<String, LaunchError> {
        match self {
            Substitution::Text(value) => Ok(value.clone()),
            Substitution::LaunchConfiguration(name) => configs.get(name).map(str::to_string),
        }
    }
}

/// Parses a `name:=value` launch argument override.
pub fn parse_override(raw: &str) -> Result<(String, String), LaunchError> {
    match raw.split_once(":=") {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(LaunchError::InvalidArgument(raw.to_string())),
    }
}

/// Launch configuration values: argument defaults with command line overrides on top.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LaunchConfigurations {
    values: BTreeMap<String, String>,
}

impl LaunchConfigurations {
    pub fn new(declared: &[&LaunchArg], overrides: &[(String, String)]) -> Self {
        let mut values: BTreeMap<String, String> = declared
            .iter()
            .map(|arg| (arg.name.clone(), arg.default_value.clone()))
            .collect();

        for (name, value) in overrides {
            if !declared.iter().any(|arg| &arg.name == name) {
                tracing::warn!(argument = %name, "overriding an argument that is not declared");
            }
            values.insert(name.clone(), value.clone());
        }

        Self { values }
    }

    pub fn get(&self, name: &str) -> Result<&str, LaunchError> {
        self.values
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| LaunchError::UndefinedConfiguration(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
