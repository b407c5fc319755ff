//
// Copyright (c) 2023 SUSE Software Solutions Germany GmbH
//
// This file is part of flake-pilot
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.
//
//! Orders a container and its transitive `requires` into a start
//! sequence. No external graph crate: the pack this is built from never
//! reaches for one, so this stays a plain expand-then-emit walk over a
//! `Vec`, which also keeps iteration order deterministic without having
//! to document a `HashMap` iteration order guarantee that doesn't exist.
use std::collections::HashSet;

use crate::error::SergioError;
use crate::registry::Registry;

/// Return everything `root` (transitively) requires, in the order they
/// must be started: dependencies before dependents, each entry exactly
/// once, earliest-discovered-first among siblings. `root` itself is
/// excluded from the result.
pub fn resolve_order(registry: &Registry, root: &str) -> Result<Vec<String>, SergioError> {
    let mut order = Vec::new();
    let mut emitted = HashSet::new();
    let mut on_path = HashSet::new();
    visit(registry, root, &mut on_path, &mut emitted, &mut order)?;
    order.pop();
    Ok(order)
}

fn visit(
    registry: &Registry,
    id: &str,
    on_path: &mut HashSet<String>,
    emitted: &mut HashSet<String>,
    order: &mut Vec<String>,
) -> Result<(), SergioError> {
    if emitted.contains(id) {
        return Ok(());
    }
    if !on_path.insert(id.to_string()) {
        return Err(SergioError::UnresolvableRequirements);
    }
    let container = registry.get(id)?;
    for dep in &container.requires {
        visit(registry, dep, on_path, emitted, order)?;
    }
    on_path.remove(id);
    emitted.insert(id.to_string());
    order.push(id.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    fn write_def(dir: &std::path::Path, id: &str, requires: &[&str], image: &str) {
        let requires_yaml = if requires.is_empty() {
            String::new()
        } else {
            format!(
                "  requires:\n{}\n",
                requires.iter().map(|r| format!("    - {r}")).collect::<Vec<_>>().join("\n")
            )
        };
        let content = format!(
            "container:\n  name: {id}\n  box: {image}\n{requires_yaml}"
        );
        fs::write(dir.join(format!("{id}.yaml")), content).unwrap();
    }

    #[test]
    fn dependencies_precede_dependents() {
        let dir = tempdir().unwrap();
        write_def(dir.path(), "base", &[], "image-base");
        write_def(dir.path(), "db", &["base"], "image-db");
        write_def(dir.path(), "web", &["db", "base"], "image-web");

        let registry = Registry::new(dir.path().to_path_buf(), HashMap::new());
        let order = resolve_order(&registry, "web").unwrap();

        assert!(!order.iter().any(|i| i == "web"));
        let base_pos = order.iter().position(|i| i == "base").unwrap();
        let db_pos = order.iter().position(|i| i == "db").unwrap();
        assert!(base_pos < db_pos);
        assert_eq!(order.iter().filter(|i| *i == "base").count(), 1);
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn cycle_is_unresolvable() {
        let dir = tempdir().unwrap();
        write_def(dir.path(), "a", &["b"], "image-a");
        write_def(dir.path(), "b", &["a"], "image-b");

        let registry = Registry::new(dir.path().to_path_buf(), HashMap::new());
        let result = resolve_order(&registry, "a");
        assert!(matches!(result, Err(SergioError::UnresolvableRequirements)));
    }
}
