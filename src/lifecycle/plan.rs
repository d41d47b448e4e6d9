//! # Start-order planning over the stage dependency graph.
//!
//! ## Rules
//! - A stage is placed only after every one of its dependencies.
//! - Among stages that are ready at the same time, registration order wins,
//!   so independent stages start in the order they were added.
//! - Unknown dependencies and cycles are configuration errors reported before
//!   any stage function runs.

use std::collections::HashMap;

use super::Stage;
use crate::error::LifecycleError;

/// Returns stage indices in start order.
pub(crate) fn start_order(stages: &[Stage]) -> Result<Vec<usize>, LifecycleError> {
    let index = name_index(stages);

    let mut deps: Vec<Vec<usize>> = Vec::with_capacity(stages.len());
    for stage in stages {
        let mut resolved = Vec::with_capacity(stage.dependencies().len());
        for dep in stage.dependencies() {
            let Some(&i) = index.get(dep.as_str()) else {
                return Err(LifecycleError::UnknownDependency {
                    stage: stage.name().to_string(),
                    dependency: dep.clone(),
                });
            };
            resolved.push(i);
        }
        deps.push(resolved);
    }

    let mut placed = vec![false; stages.len()];
    let mut order = Vec::with_capacity(stages.len());
    while order.len() < stages.len() {
        let next = (0..stages.len()).find(|&i| !placed[i] && deps[i].iter().all(|&d| placed[d]));
        match next {
            Some(i) => {
                placed[i] = true;
                order.push(i);
            }
            None => {
                let cycle = find_cycle(stages).unwrap_or_default();
                return Err(LifecycleError::CycleDetected { cycle });
            }
        }
    }
    Ok(order)
}

/// Finds a dependency cycle among registered stages, ignoring unknown dependencies.
///
/// The returned path repeats its first stage at the end: `a -> b -> a`.
pub(crate) fn find_cycle(stages: &[Stage]) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Active,
        Done,
    }

    fn visit(
        i: usize,
        stages: &[Stage],
        index: &HashMap<&str, usize>,
        marks: &mut [Mark],
        path: &mut Vec<usize>,
    ) -> Option<Vec<String>> {
        marks[i] = Mark::Active;
        path.push(i);
        for dep in stages[i].dependencies() {
            let Some(&d) = index.get(dep.as_str()) else {
                continue;
            };
            match marks[d] {
                Mark::Active => {
                    let from = path.iter().position(|&p| p == d).unwrap_or(0);
                    let mut cycle: Vec<String> = path[from..]
                        .iter()
                        .map(|&p| stages[p].name().to_string())
                        .collect();
                    cycle.push(stages[d].name().to_string());
                    return Some(cycle);
                }
                Mark::New => {
                    if let Some(cycle) = visit(d, stages, index, marks, path) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }
        path.pop();
        marks[i] = Mark::Done;
        None
    }

    let index = name_index(stages);
    let mut marks = vec![Mark::New; stages.len()];
    let mut path = Vec::new();
    (0..stages.len()).find_map(|i| {
        if marks[i] == Mark::New {
            visit(i, stages, &index, &mut marks, &mut path)
        } else {
            None
        }
    })
}

fn name_index(stages: &[Stage]) -> HashMap<&str, usize> {
    stages
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name(), i))
        .collect()
}
