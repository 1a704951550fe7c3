//! The immutable, validated graph and its resolution API.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, trace};

use crate::action::NamedAction;
use crate::condition::Condition;
use crate::error::{GraphError, GraphResult};
use crate::state::State;

/// A guarded edge between two actions.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Source action name.
    pub from: String,
    /// Target action name.
    pub to: String,
    /// Guard evaluated against the state.
    pub condition: Condition,
}

impl Transition {
    /// Create an unconditional transition.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::conditional(from, to, Condition::Default)
    }

    /// Create a transition guarded by `condition`.
    pub fn conditional(from: impl Into<String>, to: impl Into<String>, condition: Condition) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition,
        }
    }

    /// Whether this transition is unconditional.
    pub fn is_default(&self) -> bool {
        self.condition.is_default()
    }
}

impl From<(&str, &str)> for Transition {
    fn from((from, to): (&str, &str)) -> Self {
        Transition::new(from, to)
    }
}

impl From<(&str, &str, Condition)> for Transition {
    fn from((from, to, condition): (&str, &str, Condition)) -> Self {
        Transition::conditional(from, to, condition)
    }
}

impl From<(String, String)> for Transition {
    fn from((from, to): (String, String)) -> Self {
        Transition::new(from, to)
    }
}

impl From<(String, String, Condition)> for Transition {
    fn from((from, to, condition): (String, String, Condition)) -> Self {
        Transition::conditional(from, to, condition)
    }
}

/// A validated state-machine graph.
///
/// Built only through [`GraphBuilder::build`](crate::GraphBuilder::build), so
/// every transition references a known action and no transition is shadowed
/// by an earlier default. Clones share the underlying actions.
#[derive(Clone)]
pub struct Graph {
    actions: Vec<NamedAction>,
    /// Action name -> position in `actions`.
    action_index: HashMap<String, usize>,
    transitions: Vec<Transition>,
    /// Source name -> positions in `transitions`, in declaration order.
    outgoing: HashMap<String, Vec<usize>>,
    /// Tag -> positions in `actions`, in declaration order.
    tag_index: HashMap<String, Vec<usize>>,
}

impl Graph {
    /// Assemble a graph from already-validated parts.
    pub(crate) fn from_parts(actions: Vec<NamedAction>, transitions: Vec<Transition>) -> Self {
        let action_index = actions
            .iter()
            .enumerate()
            .map(|(i, action)| (action.name().to_string(), i))
            .collect();

        let mut outgoing: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, transition) in transitions.iter().enumerate() {
            outgoing.entry(transition.from.clone()).or_default().push(i);
        }

        let mut tag_index: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, action) in actions.iter().enumerate() {
            for tag in action.tags() {
                let entry = tag_index.entry(tag.clone()).or_default();
                // An action listing the same tag twice still appears once.
                if entry.last() != Some(&i) {
                    entry.push(i);
                }
            }
        }

        Self {
            actions,
            action_index,
            transitions,
            outgoing,
            tag_index,
        }
    }

    /// All actions, in declaration order.
    pub fn actions(&self) -> &[NamedAction] {
        &self.actions
    }

    /// All transitions, in declaration order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Look up an action by name.
    pub fn get_action(&self, name: &str) -> Option<&NamedAction> {
        self.action_index.get(name).map(|&i| &self.actions[i])
    }

    pub(crate) fn action_position(&self, name: &str) -> Option<usize> {
        self.action_index.get(name).copied()
    }

    /// Whether an action named `name` exists.
    pub fn has_action(&self, name: &str) -> bool {
        self.action_index.contains_key(name)
    }

    /// Transitions leaving `name`, in declaration order.
    pub fn transitions_from<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Transition> + 'a {
        self.outgoing
            .get(name)
            .into_iter()
            .flatten()
            .map(move |&i| &self.transitions[i])
    }

    /// Every tag carried by at least one action, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.tag_index.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Resolve the action to run next.
    ///
    /// With no current action this is the `entrypoint`. Otherwise the
    /// transitions leaving `current` are evaluated in declaration order and
    /// the target of the first satisfied one is returned. Running out of
    /// transitions is an error, never a silent stop.
    pub fn get_next_node(
        &self,
        current: Option<&str>,
        state: &State,
        entrypoint: &str,
    ) -> GraphResult<&NamedAction> {
        let Some(current) = current else {
            debug!(entrypoint, "Resolving entrypoint");
            return self
                .get_action(entrypoint)
                .ok_or_else(|| GraphError::EntrypointNotFound {
                    name: entrypoint.to_string(),
                });
        };

        if !self.has_action(current) {
            return Err(GraphError::UnknownCurrentAction {
                name: current.to_string(),
            });
        }

        for transition in self.transitions_from(current) {
            let satisfied = transition.condition.evaluate(state)?;
            trace!(
                from = %transition.from,
                to = %transition.to,
                condition = %transition.condition,
                satisfied,
                "Evaluated transition"
            );
            if satisfied {
                debug!(from = current, to = %transition.to, "Resolved next action");
                // Targets are validated at build time.
                return Ok(&self.actions[self.action_index[&transition.to]]);
            }
        }

        Err(GraphError::NoSatisfyingTransition {
            from: current.to_string(),
        })
    }

    /// All actions tagged with `tag`, in declaration order.
    ///
    /// An unknown tag is an error rather than an empty list, so a misspelled
    /// tag surfaces immediately.
    pub fn get_actions_by_tag(&self, tag: &str) -> GraphResult<Vec<&NamedAction>> {
        self.tag_index
            .get(tag)
            .map(|indices| indices.iter().map(|&i| &self.actions[i]).collect())
            .ok_or_else(|| GraphError::TagNotFound {
                tag: tag.to_string(),
            })
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field(
                "actions",
                &self.actions.iter().map(NamedAction::name).collect::<Vec<_>>(),
            )
            .field("transitions", &self.transitions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{FnAction, ResultAction};
    use crate::builder::GraphBuilder;
    use serde_json::json;

    fn counter() -> FnAction {
        FnAction::new(
            |state, _| {
                let count = state.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
                let mut out = crate::ActionOutput::new();
                out.insert("count".into(), json!(count + 1));
                Ok(out)
            },
            |result, state| Ok(state.update(result.clone())),
        )
        .with_reads(["count"])
        .with_writes(["count"])
    }

    fn counter_graph() -> Graph {
        GraphBuilder::new()
            .with_action("counter", counter())
            .with_action("result", ResultAction::new(["count"]))
            .with_conditional_transition("counter", "counter", Condition::expr("count < 10").unwrap())
            .with_transition("counter", "result")
            .build()
            .unwrap()
    }

    #[test]
    fn test_first_satisfied_transition_wins() {
        let graph = counter_graph();

        let next = graph
            .get_next_node(Some("counter"), &State::from_iter([("count", 3)]), "counter")
            .unwrap();
        assert_eq!(next.name(), "counter");

        let next = graph
            .get_next_node(Some("counter"), &State::from_iter([("count", 10)]), "counter")
            .unwrap();
        assert_eq!(next.name(), "result");
    }

    #[test]
    fn test_entrypoint_resolution() {
        let graph = counter_graph();
        let state = State::from_iter([("count", 0)]);
        assert_eq!(graph.get_next_node(None, &state, "counter").unwrap().name(), "counter");
        assert!(matches!(
            graph.get_next_node(None, &state, "missing"),
            Err(GraphError::EntrypointNotFound { .. })
        ));
    }

    #[test]
    fn test_no_satisfying_transition() {
        let graph = counter_graph();
        let err = graph
            .get_next_node(Some("result"), &State::new(), "counter")
            .unwrap_err();
        assert!(matches!(err, GraphError::NoSatisfyingTransition { ref from } if from == "result"));
        assert!(err.to_string().contains("no satisfying transition"));
    }

    #[test]
    fn test_unknown_current_action() {
        let graph = counter_graph();
        assert!(matches!(
            graph.get_next_node(Some("ghost"), &State::new(), "counter"),
            Err(GraphError::UnknownCurrentAction { .. })
        ));
    }

    #[test]
    fn test_condition_error_propagates() {
        let graph = counter_graph();
        assert!(matches!(
            graph.get_next_node(Some("counter"), &State::new(), "counter"),
            Err(GraphError::Condition(_))
        ));
    }

    #[test]
    fn test_transitions_from_preserves_order() {
        let graph = counter_graph();
        let targets: Vec<_> = graph.transitions_from("counter").map(|t| t.to.as_str()).collect();
        assert_eq!(targets, vec!["counter", "result"]);
        assert_eq!(graph.transitions_from("result").count(), 0);
    }

    #[test]
    fn test_duplicate_tag_on_one_action_counts_once() {
        let graph = GraphBuilder::new()
            .with_action("a", ResultAction::new(["x"]).with_tags(["t", "t"]))
            .build()
            .unwrap();
        assert_eq!(graph.get_actions_by_tag("t").unwrap().len(), 1);
        assert_eq!(graph.tags(), vec!["t"]);
    }
}
