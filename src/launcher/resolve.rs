//! Start-order resolution over the dependency graph.
//!
//! Kahn's topological sort over descriptor `requires` edges. Ties are
//! broken by name so the computed order is deterministic for a given set
//! of descriptors. A cycle is a fatal configuration error reported before
//! any node is launched.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::error::ResolveError;

use super::descriptor::NodeDescriptor;

/// Computes the start order for `descriptors` via Kahn's algorithm.
///
/// Dependencies start before their dependents. Returns
/// [`ResolveError::MissingDependency`] when a `requires` entry names no
/// descriptor and [`ResolveError::Cycle`] when ordering cannot complete.
pub fn resolve_start_order(descriptors: &[NodeDescriptor]) -> Result<Vec<String>, ResolveError> {
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    // dependency → nodes waiting on it
    let mut dependents: HashMap<&str, BTreeSet<&str>> = HashMap::new();

    for d in descriptors {
        in_degree.entry(d.name.as_str()).or_insert(0);
    }
    for d in descriptors {
        for dep in &d.requires {
            if !in_degree.contains_key(dep.as_str()) {
                return Err(ResolveError::MissingDependency {
                    node: d.name.clone(),
                    dependency: dep.clone(),
                });
            }
            if dependents
                .entry(dep.as_str())
                .or_default()
                .insert(d.name.as_str())
            {
                *in_degree.entry(d.name.as_str()).or_insert(0) += 1;
            }
        }
    }

    // BTreeMap iteration seeds the queue in name order.
    let mut ready: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(name, _)| *name)
        .collect();

    let mut order = Vec::with_capacity(descriptors.len());
    while let Some(name) = ready.pop_front() {
        order.push(name.to_string());
        if let Some(waiting) = dependents.get(name) {
            for dependent in waiting {
                let deg = in_degree
                    .get_mut(dependent)
                    .map(|d| {
                        *d -= 1;
                        *d
                    })
                    .unwrap_or(0);
                if deg == 0 {
                    ready.push_back(dependent);
                }
            }
        }
    }

    if order.len() != in_degree.len() {
        let members: Vec<String> = in_degree
            .iter()
            .filter(|(_, deg)| **deg > 0)
            .map(|(name, _)| name.to_string())
            .collect();
        return Err(ResolveError::Cycle { members });
    }
    Ok(order)
}

/// Validates a manual start-order override against the descriptor set.
///
/// The override must name every node exactly once. Duplicate or unmatched
/// names are reported as `unknown`, uncovered nodes as `missing`.
pub fn validate_manual_order(
    order: &[String],
    descriptors: &[NodeDescriptor],
) -> Result<(), ResolveError> {
    let names: BTreeSet<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut unknown = Vec::new();
    for name in order {
        if !names.contains(name.as_str()) || !seen.insert(name.as_str()) {
            unknown.push(name.clone());
        }
    }
    let missing: Vec<String> = names
        .iter()
        .filter(|n| !seen.contains(**n))
        .map(|n| n.to_string())
        .collect();
    if missing.is_empty() && unknown.is_empty() {
        Ok(())
    } else {
        Err(ResolveError::OrderMismatch { missing, unknown })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(name: &str, requires: &[&str]) -> NodeDescriptor {
        NodeDescriptor::new(name, "test")
            .with_requires(requires.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn independent_nodes_order_by_name() {
        let order = resolve_start_order(&[desc("c", &[]), desc("a", &[]), desc("b", &[])])
            .expect("resolves");
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn dependencies_come_first() {
        let order = resolve_start_order(&[
            desc("viz", &["fusion"]),
            desc("fusion", &["lidar", "camera"]),
            desc("camera", &["driver"]),
            desc("lidar", &["driver"]),
            desc("driver", &[]),
        ])
        .expect("resolves");

        let pos = |n: &str| order.iter().position(|x| x == n).expect("present");
        assert_eq!(order.len(), 5);
        assert!(pos("driver") < pos("camera"));
        assert!(pos("driver") < pos("lidar"));
        assert!(pos("camera") < pos("fusion"));
        assert!(pos("lidar") < pos("fusion"));
        assert!(pos("fusion") < pos("viz"));
    }

    #[test]
    fn missing_dependency_is_fatal() {
        let err = resolve_start_order(&[desc("a", &["ghost"])]).expect_err("fails");
        assert_eq!(
            err,
            ResolveError::MissingDependency {
                node: "a".to_string(),
                dependency: "ghost".to_string(),
            }
        );
    }

    #[test]
    fn cycle_reports_unorderable_members() {
        let err = resolve_start_order(&[
            desc("a", &["b"]),
            desc("b", &["a"]),
            desc("c", &["a"]),
            desc("d", &[]),
        ])
        .expect_err("fails");
        match err {
            ResolveError::Cycle { members } => {
                // The cyclic pair and its downstream, never the clean node.
                assert_eq!(members, vec!["a", "b", "c"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_requires_count_once() {
        let order = resolve_start_order(&[desc("a", &[]), desc("b", &["a", "a"])])
            .expect("resolves");
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn manual_order_must_cover_exact_set() {
        let descriptors = [desc("a", &[]), desc("b", &[])];
        assert!(
            validate_manual_order(&["b".to_string(), "a".to_string()], &descriptors).is_ok()
        );

        let err = validate_manual_order(
            &["a".to_string(), "a".to_string(), "x".to_string()],
            &descriptors,
        )
        .expect_err("fails");
        assert_eq!(
            err,
            ResolveError::OrderMismatch {
                missing: vec!["b".to_string()],
                unknown: vec!["a".to_string(), "x".to_string()],
            }
        );
    }
}
