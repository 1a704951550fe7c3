//! Validated state-machine graphs with deterministic next-step resolution.
//!
//! A state machine is a set of named [`Action`]s connected by [`Transition`]s
//! guarded by [`Condition`]s. A [`GraphBuilder`] accumulates both (optionally
//! merging other graphs) and compiles them into an immutable [`Graph`]. An
//! external execution loop then repeatedly asks the graph what runs next:
//!
//! ```text
//! action = graph.get_next_node(None, &state, entrypoint)
//! loop:
//!     result = action.run(&state, &inputs)
//!     state  = action.update(&result, &state)
//!     action = graph.get_next_node(Some(action.name()), &state, entrypoint)
//! ```
//!
//! ## Guarantees
//!
//! Structural problems are caught once, in [`GraphBuilder::build`]:
//!
//! - at least one action exists and action names are unique
//! - every transition's source and target is a declared action
//! - no transition follows an unconditional transition from the same source
//!
//! Resolution evaluates the transitions of the current action in declaration
//! order and picks the first whose condition holds. Failing to find one is an
//! error, never a silent stop. A built [`Graph`] is never mutated and is safe
//! to share across threads.
//!
//! ## Conditions
//!
//! Conditions are either the always-true default, a compiled expression over
//! state keys (`count < 10 and not done`), exact key matches, or a boolean
//! combination of those built with `!`, `&` and `|`.

mod action;
mod builder;
mod condition;
pub mod config;
mod error;
mod graph;
pub mod model;
mod state;

pub use action::{
    require_inputs, Action, ActionOutput, DeclaredAction, FnAction, Inputs, NamedAction,
    ResultAction,
};
pub use builder::{validate_actions, validate_transitions, GraphBuilder};
pub use condition::{Condition, Expression};
pub use error::{ActionError, ConditionError, ConfigError, GraphError, GraphResult};
pub use graph::{Graph, Transition};
pub use state::State;

// Configuration
pub use config::{ActionConfig, ActionKind, GraphDescription, TransitionConfig};

// Models
pub use model::{ActionModel, GraphModel, TransitionModel};
