//! End-to-end tests for building, merging and resolving graphs.

use std::sync::Arc;
use std::thread;

use serde_json::{json, Value};
use stepgraph_core::{
    Action, ActionOutput, Condition, FnAction, Graph, GraphBuilder, GraphError, Inputs,
    ResultAction, State,
};

// ============================================================================
// Fixtures
// ============================================================================

fn counter_action(tags: &[&str]) -> Arc<dyn Action> {
    Arc::new(
        FnAction::new(
            |state, _inputs| {
                let count = state.get("count").and_then(Value::as_i64).unwrap_or(0);
                let mut out = ActionOutput::new();
                out.insert("count".into(), json!(count + 1));
                Ok(out)
            },
            |result, state| Ok(state.update(result.clone())),
        )
        .with_reads(["count"])
        .with_writes(["count"])
        .with_tags(tags.iter().copied()),
    )
}

fn count_below(limit: i64) -> Condition {
    Condition::expr(&format!("count < {limit}")).unwrap()
}

fn counter_graph() -> Graph {
    GraphBuilder::new()
        .with_shared_action("counter", counter_action(&["tag1", "tag2"]))
        .with_action("result", ResultAction::new(["count"]))
        .with_transitions([
            ("counter", "counter", count_below(10)),
            ("counter", "result", Condition::Default),
        ])
        .build()
        .unwrap()
}

// ============================================================================
// Building
// ============================================================================

#[test]
fn test_graph_builder_builds() {
    let graph = counter_graph();
    assert_eq!(graph.actions().len(), 2);
    assert_eq!(graph.transitions().len(), 2);
}

#[test]
fn test_empty_builder_fails() {
    let err = GraphBuilder::new().build().unwrap_err();
    assert!(matches!(err, GraphError::NoActions));
    assert!(err.to_string().contains("at least one"));
}

#[test]
fn test_unknown_transition_target_fails() {
    let err = GraphBuilder::new()
        .with_shared_action("counter", counter_action(&[]))
        .with_transition("counter", "result")
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("result not found"));
}

#[test]
fn test_unknown_transition_source_fails() {
    let err = GraphBuilder::new()
        .with_shared_action("counter", counter_action(&[]))
        .with_transition("ghost", "counter")
        .build()
        .unwrap_err();
    assert!(matches!(err, GraphError::ActionNotFound { ref name, .. } if name == "ghost"));
    assert!(err.to_string().contains("ghost not found"));
}

#[test]
fn test_redundant_transition_fails() {
    let builder = GraphBuilder::new()
        .with_shared_action("counter", counter_action(&[]))
        .with_action("result", ResultAction::new(["count"]))
        .with_conditional_transition("counter", "counter", count_below(10))
        .with_transition("counter", "result");
    assert!(builder.build().is_ok());

    let err = builder
        .with_transition("counter", "counter")
        .build()
        .unwrap_err();
    assert!(matches!(err, GraphError::RedundantTransition { .. }));
}

#[test]
fn test_graph_builder_with_graph() {
    let graph1 = GraphBuilder::new()
        .with_shared_action("counter", counter_action(&[]))
        .with_conditional_transition("counter", "counter", count_below(10))
        .build()
        .unwrap();
    let graph2 = GraphBuilder::new()
        .with_shared_action("counter2", counter_action(&[]))
        .with_conditional_transition("counter2", "counter2", count_below(20))
        .build()
        .unwrap();

    let builder = GraphBuilder::new()
        .with_graph(&graph1)
        .with_graph(&graph2)
        .with_action("result", ResultAction::new(["count"]))
        .with_transitions([("counter", "counter2"), ("counter2", "result")]);
    assert_eq!(builder.action_count(), 3);
    assert_eq!(builder.transition_count(), 4);

    let graph = builder.build().unwrap();
    let order: Vec<_> = graph
        .transitions()
        .iter()
        .map(|t| (t.from.as_str(), t.to.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![
            ("counter", "counter"),
            ("counter2", "counter2"),
            ("counter", "counter2"),
            ("counter2", "result"),
        ]
    );

    // The first transition out of `counter` wins while it holds.
    let state = State::from_iter([("count", 5)]);
    let next = graph.get_next_node(Some("counter"), &state, "counter").unwrap();
    assert_eq!(next.name(), "counter");
    let state = State::from_iter([("count", 15)]);
    let next = graph.get_next_node(Some("counter"), &state, "counter").unwrap();
    assert_eq!(next.name(), "counter2");
}

#[test]
fn test_merging_same_graph_twice_is_a_duplicate() {
    let graph = counter_graph();
    let err = GraphBuilder::new()
        .with_graph(&graph)
        .with_graph(&graph)
        .build()
        .unwrap_err();
    assert!(matches!(err, GraphError::DuplicateAction { ref name } if name == "counter"));
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_get_next_node_entrypoint_is_deterministic() {
    let graph = counter_graph();
    let state = State::from_iter([("count", 0)]);

    let first = graph.get_next_node(None, &state, "counter").unwrap();
    let second = graph.get_next_node(None, &state, "counter").unwrap();
    assert_eq!(first.name(), "counter");
    assert_eq!(first.name(), second.name());
}

#[test]
fn test_drive_counter_to_result() {
    let graph = counter_graph();
    let inputs = Inputs::new();
    let mut state = State::from_iter([("count", 0)]);
    let mut action = graph.get_next_node(None, &state, "counter").unwrap();
    let mut steps = 0;

    while action.name() != "result" {
        let result = action.run(&state, &inputs).unwrap();
        state = action.update(&result, &state).unwrap();
        action = graph
            .get_next_node(Some(action.name()), &state, "counter")
            .unwrap();
        steps += 1;
    }

    assert_eq!(steps, 10);
    let output = action.run(&state, &inputs).unwrap();
    assert_eq!(output.get("count"), Some(&json!(10)));
    assert!(matches!(
        graph.get_next_node(Some("result"), &state, "counter"),
        Err(GraphError::NoSatisfyingTransition { .. })
    ));
}

#[test]
fn test_concurrent_resolution() {
    let graph = Arc::new(counter_graph());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let graph = Arc::clone(&graph);
            thread::spawn(move || {
                let state = State::from_iter([("count", i * 2)]);
                graph
                    .get_next_node(Some("counter"), &state, "counter")
                    .unwrap()
                    .name()
                    .to_string()
            })
        })
        .collect();

    let names: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(&names[..5], ["counter"; 5]);
    assert_eq!(&names[5..], ["result"; 3]);
}

// ============================================================================
// Tags
// ============================================================================

#[test]
fn test_get_actions_by_tag() {
    let graph = GraphBuilder::new()
        .with_shared_action("counter1", counter_action(&["tag1", "tag2"]))
        .with_shared_action("counter2", counter_action(&["tag1", "tag3"]))
        .with_transitions([("counter1", "counter2")])
        .with_transitions([("counter2", "counter1")])
        .build()
        .unwrap();

    let tag1: Vec<_> = graph
        .get_actions_by_tag("tag1")
        .unwrap()
        .iter()
        .map(|a| a.name())
        .collect();
    assert_eq!(tag1, vec!["counter1", "counter2"]);
    assert_eq!(graph.get_actions_by_tag("tag2").unwrap().len(), 1);
    assert_eq!(graph.get_actions_by_tag("tag3").unwrap().len(), 1);

    let err = graph.get_actions_by_tag("tag4").unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_graph_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Graph>();
    assert_send_sync::<GraphBuilder>();
}
