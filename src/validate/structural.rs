use std::collections::HashSet;

use super::ValidationReport;
use crate::pipeline::{DONE_TARGET, PipelineConfig};

/// Check the pipeline's shape without following any paths.
pub fn validate(config: &PipelineConfig) -> ValidationReport {
    let mut report = ValidationReport::new();

    let names: HashSet<&str> = config.phases.iter().map(|p| p.name.as_str()).collect();

    if !names.contains(config.entry_phase.as_str()) {
        report.error(format!(
            "Entry phase '{}' does not match any phase",
            config.entry_phase
        ));
    }

    let mut seen_names = HashSet::new();
    let mut seen_statuses = HashSet::new();
    for phase in &config.phases {
        if phase.name == DONE_TARGET {
            report.error(format!(
                "Phase name '{}' is reserved for the terminal target",
                DONE_TARGET
            ));
        }
        if !seen_names.insert(phase.name.as_str()) {
            report.error(format!("Duplicate phase name '{}'", phase.name));
        }
        if !seen_statuses.insert(phase.status.as_str()) {
            report.error(format!(
                "Duplicate status '{}' on phase '{}'",
                phase.status, phase.name
            ));
        }
        if phase.transitions_to.is_empty() {
            report.error(format!("Phase '{}' has no transitions", phase.name));
        }
        for target in &phase.transitions_to {
            if target != DONE_TARGET && !names.contains(target.as_str()) {
                report.error(format!(
                    "Phase '{}' transitions to unknown phase '{}'",
                    phase.name, target
                ));
            }
        }
    }

    // Orphans: no other phase points here. Reachability proper is the graph layer's job.
    for phase in &config.phases {
        if phase.name == config.entry_phase {
            continue;
        }
        let referenced = config
            .phases
            .iter()
            .filter(|other| other.name != phase.name)
            .any(|other| other.can_transition_to(&phase.name));
        if !referenced {
            report.warning(format!(
                "Phase '{}' is never the target of another phase's transitions",
                phase.name
            ));
        }
    }

    report
}
