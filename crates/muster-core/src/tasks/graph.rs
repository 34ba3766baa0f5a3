//! Blocking-graph traversal

use super::{Task, TaskStatus};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Detects a cycle in a `task -> blocked_by` graph using DFS.
///
/// Returns the cycle as a path that starts and ends on the same node. Traversal
/// follows the full transitive closure; nodes are visited in sorted order so
/// the reported path is deterministic.
pub fn detect_cycle(dependencies: &BTreeMap<String, BTreeSet<String>>) -> Option<Vec<String>> {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for node in dependencies.keys() {
        if dfs_cycle(node, dependencies, &mut visited, &mut rec_stack, &mut path) {
            // Drop the prefix that leads into the cycle
            if let Some(last) = path.last() {
                if let Some(start) = path.iter().position(|n| n == last) {
                    path.drain(..start);
                }
            }
            return Some(path);
        }
    }

    None
}

fn dfs_cycle(
    node: &str,
    graph: &BTreeMap<String, BTreeSet<String>>,
    visited: &mut HashSet<String>,
    rec_stack: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> bool {
    if rec_stack.contains(node) {
        path.push(node.to_string());
        return true;
    }

    if visited.contains(node) {
        return false;
    }

    visited.insert(node.to_string());
    rec_stack.insert(node.to_string());
    path.push(node.to_string());

    if let Some(deps) = graph.get(node) {
        for dep in deps {
            if dfs_cycle(dep, graph, visited, rec_stack, path) {
                return true;
            }
        }
    }

    rec_stack.remove(node);
    path.pop();
    false
}

/// Blockers of `task` that have not completed; unknown ids count as open
pub fn open_blockers(task: &Task, graph: &HashMap<String, Task>) -> Vec<String> {
    task.blocked_by
        .iter()
        .filter(|id| {
            graph
                .get(id.as_str())
                .is_none_or(|blocker| blocker.status != TaskStatus::Completed)
        })
        .cloned()
        .collect()
}
