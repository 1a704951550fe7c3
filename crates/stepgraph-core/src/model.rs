//! Serializable snapshots of a graph for inspection and visualization.

use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::graph::Graph;

/// The data contract of one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionModel {
    pub name: String,
    #[serde(default)]
    pub reads: Vec<String>,
    #[serde(default)]
    pub writes: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One transition, with its condition rendered by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionModel {
    pub from: String,
    pub to: String,
    pub condition: String,
}

/// Structure of a graph without any behavior attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphModel {
    pub actions: Vec<ActionModel>,
    pub transitions: Vec<TransitionModel>,
}

impl Graph {
    /// Snapshot the graph's structure.
    pub fn to_model(&self) -> GraphModel {
        let actions = self
            .actions()
            .iter()
            .map(|action| ActionModel {
                name: action.name().to_string(),
                reads: action.reads().to_vec(),
                writes: action.writes().to_vec(),
                inputs: action.inputs().to_vec(),
                tags: action.tags().to_vec(),
            })
            .collect();
        let transitions = self
            .transitions()
            .iter()
            .map(|t| TransitionModel {
                from: t.from.clone(),
                to: t.to.clone(),
                condition: t.condition.name(),
            })
            .collect();
        GraphModel {
            actions,
            transitions,
        }
    }

    /// Render the graph in Graphviz DOT format.
    ///
    /// Edges are labelled with their condition; default edges are unlabelled.
    pub fn to_dot(&self) -> String {
        let mut dot: DiGraph<String, String> = DiGraph::new();
        let indices: Vec<NodeIndex> = self
            .actions()
            .iter()
            .map(|action| dot.add_node(action.name().to_string()))
            .collect();

        for transition in self.transitions() {
            if let (Some(from), Some(to)) = (
                self.action_position(&transition.from),
                self.action_position(&transition.to),
            ) {
                let label = if transition.is_default() {
                    String::new()
                } else {
                    transition.condition.name()
                };
                dot.add_edge(indices[from], indices[to], label);
            }
        }

        format!("{}", Dot::new(&dot))
    }
}
