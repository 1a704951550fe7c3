//! CLI command implementations.

pub mod inspect;
pub mod resolve;

use std::path::Path;

use anyhow::{Context, Result};
use stepgraph_core::{Graph, GraphDescription};
use tracing::info;

/// Load a description and build its graph.
pub(crate) fn load_graph(path: &Path) -> Result<(GraphDescription, Graph)> {
    let description = GraphDescription::load(path)
        .with_context(|| format!("Failed to load graph description {}", path.display()))?;
    let graph = description
        .build()
        .with_context(|| format!("Invalid graph in {}", path.display()))?;
    info!(
        path = %path.display(),
        actions = graph.actions().len(),
        transitions = graph.transitions().len(),
        "Built graph"
    );
    Ok((description, graph))
}
