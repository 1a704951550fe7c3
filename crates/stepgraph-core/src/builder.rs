//! Mutable accumulator that compiles actions and transitions into a [`Graph`].
//!
//! The builder keeps plain ordered lists and defers every structural check to
//! [`GraphBuilder::build`]. Registering a name twice is not an error until
//! then, which keeps validation in a single compile step. `build` borrows the
//! builder, so it can keep accumulating and be built again.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::action::{Action, NamedAction};
use crate::condition::Condition;
use crate::error::{GraphError, GraphResult};
use crate::graph::{Graph, Transition};

/// Check that there is at least one action and that names are unique.
pub fn validate_actions(actions: &[NamedAction]) -> GraphResult<()> {
    if actions.is_empty() {
        return Err(GraphError::NoActions);
    }
    let mut seen = HashSet::with_capacity(actions.len());
    for action in actions {
        if !seen.insert(action.name()) {
            return Err(GraphError::DuplicateAction {
                name: action.name().to_string(),
            });
        }
    }
    Ok(())
}

/// Check transition endpoints and reject transitions shadowed by a default.
///
/// Transitions are scanned in declaration order. Once a source has an
/// unconditional transition, any later transition from that source can never
/// fire and is rejected as redundant.
pub fn validate_transitions(transitions: &[Transition], known: &HashSet<&str>) -> GraphResult<()> {
    let mut has_default: HashSet<&str> = HashSet::new();
    for transition in transitions {
        for endpoint in [&transition.from, &transition.to] {
            if !known.contains(endpoint.as_str()) {
                return Err(GraphError::ActionNotFound {
                    name: endpoint.clone(),
                    from: transition.from.clone(),
                    to: transition.to.clone(),
                });
            }
        }
        if has_default.contains(transition.from.as_str()) {
            return Err(GraphError::RedundantTransition {
                from: transition.from.clone(),
                to: transition.to.clone(),
            });
        }
        if transition.is_default() {
            has_default.insert(&transition.from);
        }
    }
    Ok(())
}

/// Accumulates actions and transitions, then validates them into a [`Graph`].
#[derive(Clone, Default)]
pub struct GraphBuilder {
    actions: Vec<NamedAction>,
    transitions: Vec<Transition>,
}

impl GraphBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `action` under `name`.
    pub fn with_action(self, name: impl Into<String>, action: impl Action + 'static) -> Self {
        self.with_shared_action(name, Arc::new(action))
    }

    /// Register an already-shared action under `name`.
    pub fn with_shared_action(mut self, name: impl Into<String>, action: Arc<dyn Action>) -> Self {
        self.actions.push(NamedAction::new(name, action));
        self
    }

    /// Register several named actions at once.
    pub fn with_actions<I, N>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = (N, Arc<dyn Action>)>,
        N: Into<String>,
    {
        self.actions.extend(
            actions
                .into_iter()
                .map(|(name, action)| NamedAction::new(name, action)),
        );
        self
    }

    /// Add an unconditional transition.
    pub fn with_transition(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.transitions.push(Transition::new(from, to));
        self
    }

    /// Add a transition guarded by `condition`.
    pub fn with_conditional_transition(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        condition: Condition,
    ) -> Self {
        self.transitions
            .push(Transition::conditional(from, to, condition));
        self
    }

    /// Add transitions in order. Tuples without a condition are unconditional.
    pub fn with_transitions<I, T>(mut self, transitions: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Transition>,
    {
        self.transitions
            .extend(transitions.into_iter().map(Into::into));
        self
    }

    /// Merge another graph's actions and transitions into this builder.
    ///
    /// Its transitions keep their internal order and land after everything
    /// added before this call and before anything added after it.
    pub fn with_graph(mut self, graph: &Graph) -> Self {
        debug!(
            actions = graph.actions().len(),
            transitions = graph.transitions().len(),
            "Merging graph into builder"
        );
        self.actions.extend(graph.actions().iter().cloned());
        self.transitions
            .extend(graph.transitions().iter().cloned());
        self
    }

    /// Actions accumulated so far, duplicates included.
    pub fn actions(&self) -> &[NamedAction] {
        &self.actions
    }

    /// Transitions accumulated so far.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Number of accumulated actions.
    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Number of accumulated transitions.
    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    /// Validate the accumulated parts and compile them into a new [`Graph`].
    pub fn build(&self) -> GraphResult<Graph> {
        if let Err(err) = self.validate() {
            warn!(error = %err, "Graph validation failed");
            return Err(err);
        }
        debug!(
            actions = self.actions.len(),
            transitions = self.transitions.len(),
            "Built graph"
        );
        Ok(Graph::from_parts(
            self.actions.clone(),
            self.transitions.clone(),
        ))
    }

    fn validate(&self) -> GraphResult<()> {
        validate_actions(&self.actions)?;
        let known: HashSet<&str> = self.actions.iter().map(NamedAction::name).collect();
        validate_transitions(&self.transitions, &known)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{DeclaredAction, ResultAction};

    fn names(names: &[&'static str]) -> HashSet<&'static str> {
        names.iter().copied().collect()
    }

    fn counter_transitions() -> Vec<Transition> {
        vec![
            Transition::conditional("counter", "counter", Condition::expr("count < 10").unwrap()),
            Transition::new("counter", "result"),
        ]
    }

    #[test]
    fn test_validate_transitions_correct() {
        validate_transitions(&counter_transitions(), &names(&["counter", "result"])).unwrap();
    }

    #[test]
    fn test_validate_transitions_missing_action() {
        let err = validate_transitions(&counter_transitions(), &names(&["counter"])).unwrap_err();
        assert!(err.to_string().contains("not found"));
        assert!(matches!(err, GraphError::ActionNotFound { ref name, .. } if name == "result"));
    }

    #[test]
    fn test_validate_transitions_missing_source() {
        let mut transitions = counter_transitions();
        transitions.insert(0, Transition::new("ghost", "counter"));
        let err = validate_transitions(&transitions, &names(&["counter", "result"])).unwrap_err();
        assert_eq!(err.to_string(), "ghost not found (transition ghost -> counter)");
        assert!(matches!(
            err,
            GraphError::ActionNotFound { ref name, ref from, ref to }
                if name == "ghost" && from == "ghost" && to == "counter"
        ));
    }

    #[test]
    fn test_validate_transitions_redundant() {
        let mut transitions = counter_transitions();
        transitions.push(Transition::new("counter", "counter"));
        let err = validate_transitions(&transitions, &names(&["counter", "result"])).unwrap_err();
        assert!(err.to_string().contains("redundant"));
    }

    #[test]
    fn test_default_on_other_source_is_not_redundant() {
        let transitions = vec![
            Transition::new("a", "b"),
            Transition::new("b", "a"),
            Transition::conditional("a", "a", Condition::Default),
        ];
        assert!(matches!(
            validate_transitions(&transitions, &names(&["a", "b"])),
            Err(GraphError::RedundantTransition { ref from, .. }) if from == "a"
        ));
        validate_transitions(&transitions[..2], &names(&["a", "b"])).unwrap();
    }

    #[test]
    fn test_validate_actions() {
        let single = vec![NamedAction::new("test", Arc::new(ResultAction::new(["x"])))];
        validate_actions(&single).unwrap();

        let err = validate_actions(&[]).unwrap_err();
        assert!(err.to_string().contains("at least one"));

        let dup = vec![single[0].clone(), single[0].clone()];
        let err = validate_actions(&dup).unwrap_err();
        assert!(err.to_string().contains("duplicated"));
    }

    #[test]
    fn test_builder_is_reusable_after_build() {
        let builder = GraphBuilder::new().with_action("a", DeclaredAction::default());
        let first = builder.build().unwrap();

        let builder = builder
            .with_action("b", DeclaredAction::default())
            .with_transitions([("a", "b")]);
        let second = builder.build().unwrap();
        let third = builder.build().unwrap();

        assert_eq!(first.actions().len(), 1);
        assert_eq!(second.actions().len(), 2);
        assert_eq!(third.transitions().len(), 1);
    }

    #[test]
    fn test_duplicate_detected_only_at_build() {
        let builder = GraphBuilder::new()
            .with_action("a", DeclaredAction::default())
            .with_action("a", DeclaredAction::default());
        assert_eq!(builder.action_count(), 2);
        assert!(matches!(
            builder.build(),
            Err(GraphError::DuplicateAction { ref name }) if name == "a"
        ));
    }

    #[test]
    fn test_with_actions_accepts_shared_actions() {
        let shared: Arc<dyn Action> = Arc::new(DeclaredAction::default());
        let graph = GraphBuilder::new()
            .with_actions([("a", shared.clone()), ("b", shared)])
            .with_transitions([("a", "b", Condition::expr("x > 1").unwrap())])
            .with_transitions([("b", "a")])
            .build()
            .unwrap();
        assert_eq!(graph.actions().len(), 2);
        assert!(!graph.transitions()[0].is_default());
        assert!(graph.transitions()[1].is_default());
    }
}
