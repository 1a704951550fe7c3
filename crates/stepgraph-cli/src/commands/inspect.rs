//! Read-only inspection commands: validate, tags, model, dot.

use std::path::Path;

use anyhow::Result;

use super::load_graph;

pub fn validate(path: &Path) -> Result<()> {
    let (description, graph) = load_graph(path)?;
    let name = description.name.as_deref().unwrap_or("graph");
    println!(
        "✅ {}: {} actions, {} transitions",
        name,
        graph.actions().len(),
        graph.transitions().len()
    );
    Ok(())
}

pub fn tags(path: &Path, tag: &str) -> Result<()> {
    let (_, graph) = load_graph(path)?;
    for action in graph.get_actions_by_tag(tag)? {
        println!("{}", action.name());
    }
    Ok(())
}

pub fn model(path: &Path) -> Result<()> {
    let (_, graph) = load_graph(path)?;
    println!("{}", serde_json::to_string_pretty(&graph.to_model())?);
    Ok(())
}

pub fn dot(path: &Path) -> Result<()> {
    let (_, graph) = load_graph(path)?;
    print!("{}", graph.to_dot());
    Ok(())
}
