//! Declarative graph descriptions.
//!
//! A [`GraphDescription`] lists actions by their data contract and transitions
//! by condition expression, in JSON or TOML. It compiles through
//! [`GraphBuilder`], so a description is held to exactly the same invariants as
//! a graph assembled in code.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::action::{DeclaredAction, ResultAction};
use crate::builder::GraphBuilder;
use crate::condition::Condition;
use crate::error::ConfigError;
use crate::graph::{Graph, Transition};

/// Root of a graph description file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDescription {
    /// Name of the described state machine.
    #[serde(default)]
    pub name: Option<String>,
    /// Action to start from when none is given.
    #[serde(default)]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
    #[serde(default)]
    pub transitions: Vec<TransitionConfig>,
}

/// Kind of a described action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Contract only; see [`DeclaredAction`].
    #[default]
    Declared,
    /// The built-in result sink over `fields`.
    Result,
}

/// One described action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionConfig {
    pub name: String,
    #[serde(default)]
    pub kind: ActionKind,
    #[serde(default)]
    pub reads: Vec<String>,
    #[serde(default)]
    pub writes: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Fields reported by a `result` action.
    #[serde(default)]
    pub fields: Vec<String>,
}

/// One described transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionConfig {
    pub from: String,
    pub to: String,
    /// Condition expression; absent or `"default"` means unconditional.
    #[serde(default)]
    pub condition: Option<String>,
}

impl TransitionConfig {
    fn compile(&self) -> Result<Transition, ConfigError> {
        let condition = match self.condition.as_deref().map(str::trim) {
            None | Some("default") => Condition::Default,
            Some(source) => Condition::expr(source).map_err(|source| ConfigError::Condition {
                from: self.from.clone(),
                to: self.to.clone(),
                source,
            })?,
        };
        Ok(Transition::conditional(&self.from, &self.to, condition))
    }
}

impl GraphDescription {
    /// Parse a JSON description.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse a TOML description.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a description, choosing the format from the file extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let description = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&text)?,
            Some("toml") => Self::from_toml_str(&text)?,
            _ => {
                return Err(ConfigError::UnsupportedFormat {
                    path: path.to_path_buf(),
                })
            }
        };
        debug!(
            path = %path.display(),
            actions = description.actions.len(),
            transitions = description.transitions.len(),
            "Loaded graph description"
        );
        Ok(description)
    }

    /// Compile into a builder without validating.
    pub fn to_builder(&self) -> Result<GraphBuilder, ConfigError> {
        let mut builder = GraphBuilder::new();
        for action in &self.actions {
            builder = match action.kind {
                ActionKind::Declared => builder.with_action(
                    &action.name,
                    DeclaredAction {
                        reads: action.reads.clone(),
                        writes: action.writes.clone(),
                        inputs: action.inputs.clone(),
                        tags: action.tags.clone(),
                    },
                ),
                ActionKind::Result => builder.with_action(
                    &action.name,
                    ResultAction::new(action.fields.iter().cloned()).with_tags(action.tags.iter().cloned()),
                ),
            };
        }
        let transitions = self
            .transitions
            .iter()
            .map(TransitionConfig::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(builder.with_transitions(transitions))
    }

    /// Compile and validate into a [`Graph`].
    pub fn build(&self) -> Result<Graph, ConfigError> {
        Ok(self.to_builder()?.build()?)
    }
}
