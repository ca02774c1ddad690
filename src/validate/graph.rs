//! Reachability over the phase-transition graph.
//!
//! Cycles are fine as long as some edge out of the cycle eventually leads to
//! `Done`. Targets that name no phase are ignored here; the structural layer
//! reports them.

use std::collections::{HashMap, VecDeque};

use super::ValidationReport;
use crate::pipeline::{DONE_TARGET, PipelineConfig};

type PhaseIndex = usize;

struct TransitionGraph<'a> {
    names: Vec<&'a str>,
    forward: Vec<Vec<PhaseIndex>>,
    reverse: Vec<Vec<PhaseIndex>>,
    exits: Vec<PhaseIndex>,
}

impl<'a> TransitionGraph<'a> {
    fn build(config: &'a PipelineConfig) -> Self {
        // First occurrence wins on duplicate names, matching the state machine.
        let mut index: HashMap<&str, PhaseIndex> = HashMap::new();
        let mut names = Vec::new();
        for phase in &config.phases {
            if !index.contains_key(phase.name.as_str()) {
                index.insert(phase.name.as_str(), names.len());
                names.push(phase.name.as_str());
            }
        }

        let mut forward = vec![Vec::new(); names.len()];
        let mut reverse = vec![Vec::new(); names.len()];
        let mut exits = Vec::new();

        for phase in &config.phases {
            let from = index[phase.name.as_str()];
            for target in &phase.transitions_to {
                if target == DONE_TARGET {
                    exits.push(from);
                } else if let Some(&to) = index.get(target.as_str()) {
                    forward[from].push(to);
                    reverse[to].push(from);
                }
            }
        }

        Self {
            names,
            forward,
            reverse,
            exits,
        }
    }

    fn index_of(&self, name: &str) -> Option<PhaseIndex> {
        self.names.iter().position(|n| *n == name)
    }
}

fn bfs(edges: &[Vec<PhaseIndex>], starts: &[PhaseIndex]) -> Vec<bool> {
    let mut visited = vec![false; edges.len()];
    let mut queue: VecDeque<PhaseIndex> = VecDeque::new();
    for &start in starts {
        if !visited[start] {
            visited[start] = true;
            queue.push_back(start);
        }
    }
    while let Some(node) = queue.pop_front() {
        for &next in &edges[node] {
            if !visited[next] {
                visited[next] = true;
                queue.push_back(next);
            }
        }
    }
    visited
}

pub fn validate(config: &PipelineConfig) -> ValidationReport {
    let mut report = ValidationReport::new();
    let graph = TransitionGraph::build(config);

    // Without an entry phase, forward reachability is meaningless; structural reports it.
    if let Some(entry) = graph.index_of(&config.entry_phase) {
        let reachable = bfs(&graph.forward, &[entry]);
        for (i, name) in graph.names.iter().enumerate() {
            if !reachable[i] {
                report.error(format!(
                    "Phase '{}' is not reachable from entry phase '{}'",
                    name, config.entry_phase
                ));
            }
        }
    }

    let reaches_done = bfs(&graph.reverse, &graph.exits);
    for (i, name) in graph.names.iter().enumerate() {
        if !reaches_done[i] {
            report.error(format!("Phase '{}' cannot reach Done", name));
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Phase, default_pipeline};
    use std::collections::HashSet;

    fn pipeline(entry: &str, edges: &[(&str, &[&str])]) -> PipelineConfig {
        PipelineConfig::new(
            entry,
            edges
                .iter()
                .map(|(name, targets)| Phase::skill(name, &name.to_lowercase(), name, targets))
                .collect(),
        )
    }

    #[test]
    fn test_cycle_with_exit_passes() {
        let config = pipeline("A", &[("A", &["B"]), ("B", &["A", "Done"])]);
        assert!(validate(&config).errors.is_empty());
    }

    #[test]
    fn test_cycle_without_exit_names_both_phases() {
        let config = pipeline("A", &[("A", &["B"]), ("B", &["A"])]);
        let report = validate(&config);
        assert_eq!(
            report.errors,
            vec![
                "Phase 'A' cannot reach Done".to_string(),
                "Phase 'B' cannot reach Done".to_string(),
            ]
        );
    }

    #[test]
    fn test_unreachable_phase() {
        let config = pipeline("A", &[("A", &["Done"]), ("Island", &["Done"])]);
        let report = validate(&config);
        assert_eq!(
            report.errors,
            vec!["Phase 'Island' is not reachable from entry phase 'A'"]
        );
    }

    #[test]
    fn test_default_pipeline_loop_passes() {
        assert!(validate(&default_pipeline()).errors.is_empty());
    }

    #[test]
    fn test_missing_entry_still_checks_done() {
        let config = pipeline("Nope", &[("A", &["A"])]);
        let report = validate(&config);
        assert_eq!(report.errors, vec!["Phase 'A' cannot reach Done"]);
    }

    /// Independent check: a clean graph report implies both reachability properties
    /// hold when verified by a naive fixed-point walk.
    #[test]
    fn test_clean_report_implies_reachability() {
        let fixtures: Vec<PipelineConfig> = vec![
            default_pipeline(),
            pipeline("A", &[("A", &["B", "C"]), ("B", &["C"]), ("C", &["A", "Done"])]),
            pipeline("A", &[("A", &["B"]), ("B", &["B", "Done"]), ("C", &["Done"])]),
            pipeline("A", &[("A", &["B"]), ("B", &["C"]), ("C", &["B"])]),
            pipeline("X", &[("X", &["Y", "Done"]), ("Y", &["X"])]),
        ];

        for config in fixtures {
            if !validate(&config).errors.is_empty() {
                continue;
            }

            let mut from_entry: HashSet<String> = HashSet::from([config.entry_phase.clone()]);
            let mut to_done: HashSet<String> = HashSet::new();
            loop {
                let before = (from_entry.len(), to_done.len());
                for phase in &config.phases {
                    if from_entry.contains(&phase.name) {
                        from_entry.extend(
                            phase
                                .transitions_to
                                .iter()
                                .filter(|t| *t != DONE_TARGET)
                                .cloned(),
                        );
                    }
                    if phase
                        .transitions_to
                        .iter()
                        .any(|t| t == DONE_TARGET || to_done.contains(t))
                    {
                        to_done.insert(phase.name.clone());
                    }
                }
                if (from_entry.len(), to_done.len()) == before {
                    break;
                }
            }

            for phase in &config.phases {
                assert!(from_entry.contains(&phase.name), "{} unreachable", phase.name);
                assert!(to_done.contains(&phase.name), "{} cannot finish", phase.name);
            }
        }
    }
}
