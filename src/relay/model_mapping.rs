//! Channel model mapping

use anyhow::Result;
use std::collections::{HashMap, HashSet};

/// Resolve the upstream model name for `model`
///
/// Mappings are followed as a chain (`a -> b -> c` resolves `a` to `c`).
/// An entry mapping a name to itself or to an empty string ends the chain.
/// A cycle is an error.
pub fn resolve_model(mapping: &HashMap<String, String>, model: &str) -> Result<String> {
    let mut current = model;
    let mut visited = HashSet::from([model]);

    while let Some(next) = mapping.get(current) {
        if next.is_empty() || next == current {
            break;
        }
        if !visited.insert(next.as_str()) {
            anyhow::bail!("Model mapping cycle detected starting at '{}'", model);
        }
        current = next.as_str();
    }

    Ok(current.to_string())
}
