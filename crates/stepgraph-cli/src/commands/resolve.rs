//! Next-action resolution against a JSON state.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use stepgraph_core::State;
use tracing::debug;

use super::load_graph;

/// Print the name of the action that runs after `from` given `state_json`.
pub fn next(
    path: &Path,
    from: Option<&str>,
    entrypoint: Option<&str>,
    state_json: &str,
) -> Result<()> {
    let (description, graph) = load_graph(path)?;

    let entrypoint = entrypoint
        .map(str::to_string)
        .or(description.entrypoint)
        .ok_or_else(|| anyhow!("No entrypoint given and none set in {}", path.display()))?;

    let state: State = serde_json::from_str(state_json).context("State must be a JSON object")?;
    debug!(from, entrypoint = %entrypoint, keys = state.len(), "Resolving next action");

    let action = graph.get_next_node(from, &state, &entrypoint)?;
    println!("{}", action.name());
    Ok(())
}
