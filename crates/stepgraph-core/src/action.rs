//! Action abstractions: the steps a graph connects.
//!
//! An action declares a data contract (`reads`, `writes`, `inputs`, `tags`)
//! and two behaviors: `run` computes a result from a state snapshot, and
//! `update` folds that result into a new state. The graph never calls either;
//! it only stores actions and hands them back to the execution loop.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::ActionError;
use crate::state::State;

/// Runtime parameters passed to `run` that do not come from state.
pub type Inputs = Map<String, Value>;

/// The mapping an action's `run` produces.
pub type ActionOutput = Map<String, Value>;

/// A step of a state machine.
///
/// `run` must not mutate its input state. `update` is expected to only set keys
/// listed in `writes`; nothing enforces this at runtime.
pub trait Action: Send + Sync {
    /// Keys consumed from state. Informational only.
    fn reads(&self) -> &[String];

    /// Keys this action may produce.
    fn writes(&self) -> &[String];

    /// Names of extra runtime parameters not drawn from state.
    fn inputs(&self) -> &[String] {
        &[]
    }

    /// Labels for grouping actions.
    fn tags(&self) -> &[String] {
        &[]
    }

    /// Compute a result from the current state.
    fn run(&self, state: &State, inputs: &Inputs) -> Result<ActionOutput, ActionError>;

    /// Fold a result produced by `run` into a new state.
    fn update(&self, result: &ActionOutput, state: &State) -> Result<State, ActionError>;
}

/// Check that every declared input of `action` is present in `inputs`.
pub fn require_inputs(action: &dyn Action, inputs: &Inputs) -> Result<(), ActionError> {
    match action.inputs().iter().find(|name| !inputs.contains_key(name.as_str())) {
        Some(missing) => Err(ActionError::MissingInput {
            input: missing.clone(),
        }),
        None => Ok(()),
    }
}

fn to_strings<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

// =============================================================================
// User-defined actions
// =============================================================================

type RunFn = dyn Fn(&State, &Inputs) -> Result<ActionOutput, ActionError> + Send + Sync;
type UpdateFn = dyn Fn(&ActionOutput, &State) -> Result<State, ActionError> + Send + Sync;

/// An action built from a pair of closures.
pub struct FnAction {
    reads: Vec<String>,
    writes: Vec<String>,
    inputs: Vec<String>,
    tags: Vec<String>,
    run: Box<RunFn>,
    update: Box<UpdateFn>,
}

impl FnAction {
    /// Create an action from its `run` and `update` behaviors.
    pub fn new<R, U>(run: R, update: U) -> Self
    where
        R: Fn(&State, &Inputs) -> Result<ActionOutput, ActionError> + Send + Sync + 'static,
        U: Fn(&ActionOutput, &State) -> Result<State, ActionError> + Send + Sync + 'static,
    {
        Self {
            reads: Vec::new(),
            writes: Vec::new(),
            inputs: Vec::new(),
            tags: Vec::new(),
            run: Box::new(run),
            update: Box::new(update),
        }
    }

    /// Set the keys this action reads.
    pub fn with_reads<I: IntoIterator<Item = S>, S: Into<String>>(mut self, reads: I) -> Self {
        self.reads = to_strings(reads);
        self
    }

    /// Set the keys this action writes.
    pub fn with_writes<I: IntoIterator<Item = S>, S: Into<String>>(mut self, writes: I) -> Self {
        self.writes = to_strings(writes);
        self
    }

    /// Set the runtime inputs this action requires.
    pub fn with_inputs<I: IntoIterator<Item = S>, S: Into<String>>(mut self, inputs: I) -> Self {
        self.inputs = to_strings(inputs);
        self
    }

    /// Set the tags of this action.
    pub fn with_tags<I: IntoIterator<Item = S>, S: Into<String>>(mut self, tags: I) -> Self {
        self.tags = to_strings(tags);
        self
    }
}

impl Action for FnAction {
    fn reads(&self) -> &[String] {
        &self.reads
    }

    fn writes(&self) -> &[String] {
        &self.writes
    }

    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn run(&self, state: &State, inputs: &Inputs) -> Result<ActionOutput, ActionError> {
        require_inputs(self, inputs)?;
        (self.run)(state, inputs)
    }

    fn update(&self, result: &ActionOutput, state: &State) -> Result<State, ActionError> {
        (self.update)(result, state)
    }
}

impl fmt::Debug for FnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction")
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .field("inputs", &self.inputs)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Built-in actions
// =============================================================================

/// Terminal sink that copies named fields out of state.
///
/// `run` returns the listed fields and `update` leaves the state as it is, so
/// callers read the reported values from `run`'s output rather than from the
/// state `update` hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultAction {
    fields: Vec<String>,
    tags: Vec<String>,
}

impl ResultAction {
    /// Create a result action over `fields`.
    pub fn new<I: IntoIterator<Item = S>, S: Into<String>>(fields: I) -> Self {
        Self {
            fields: to_strings(fields),
            tags: Vec::new(),
        }
    }

    /// Set the tags of this action.
    pub fn with_tags<I: IntoIterator<Item = S>, S: Into<String>>(mut self, tags: I) -> Self {
        self.tags = to_strings(tags);
        self
    }

    /// The fields this action reports.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl Action for ResultAction {
    fn reads(&self) -> &[String] {
        &self.fields
    }

    fn writes(&self) -> &[String] {
        &[]
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn run(&self, state: &State, _inputs: &Inputs) -> Result<ActionOutput, ActionError> {
        self.fields
            .iter()
            .map(|field| {
                state
                    .get(field)
                    .map(|value| (field.clone(), value.clone()))
                    .ok_or_else(|| ActionError::MissingField {
                        field: field.clone(),
                    })
            })
            .collect()
    }

    fn update(&self, _result: &ActionOutput, state: &State) -> Result<State, ActionError> {
        Ok(state.clone())
    }
}

/// An action known only by its data contract.
///
/// Used for graphs loaded from descriptions, where there is no behavior to
/// attach: `run` yields nothing and `update` passes the state through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredAction {
    pub reads: Vec<String>,
    pub writes: Vec<String>,
    pub inputs: Vec<String>,
    pub tags: Vec<String>,
}

impl Action for DeclaredAction {
    fn reads(&self) -> &[String] {
        &self.reads
    }

    fn writes(&self) -> &[String] {
        &self.writes
    }

    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn run(&self, _state: &State, _inputs: &Inputs) -> Result<ActionOutput, ActionError> {
        Ok(ActionOutput::new())
    }

    fn update(&self, _result: &ActionOutput, state: &State) -> Result<State, ActionError> {
        Ok(state.clone())
    }
}

// =============================================================================
// Named actions
// =============================================================================

/// An action together with the name it was registered under.
#[derive(Clone)]
pub struct NamedAction {
    name: String,
    action: Arc<dyn Action>,
}

impl NamedAction {
    /// Pair `action` with `name`.
    pub fn new(name: impl Into<String>, action: Arc<dyn Action>) -> Self {
        Self {
            name: name.into(),
            action,
        }
    }

    /// The registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shared action.
    pub fn action(&self) -> &Arc<dyn Action> {
        &self.action
    }

    /// Whether this action carries `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.action.tags().iter().any(|t| t == tag)
    }
}

impl Deref for NamedAction {
    type Target = dyn Action;

    fn deref(&self) -> &Self::Target {
        self.action.as_ref()
    }
}

impl fmt::Debug for NamedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedAction")
            .field("name", &self.name)
            .field("reads", &self.action.reads())
            .field("writes", &self.action.writes())
            .field("tags", &self.action.tags())
            .finish()
    }
}
