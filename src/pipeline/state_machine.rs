//! Read-only index over a pipeline definition.
//!
//! Construction never fails: duplicate names or statuses keep their first
//! occurrence and a missing entry phase simply resolves to `None`, so the
//! validator layers can run against any loaded pipeline.

use std::collections::HashMap;

use super::model::{DONE_TARGET, Phase, PhaseKind, PipelineConfig};

#[derive(Debug, Clone)]
pub struct PipelineStateMachine {
    config: PipelineConfig,
    by_name: HashMap<String, usize>,
    by_status: HashMap<String, usize>,
    skill_phases: Vec<usize>,
    resolver_phases: Vec<usize>,
    entry: Option<usize>,
}

impl PipelineStateMachine {
    pub fn from_config(config: PipelineConfig) -> Self {
        let mut by_name = HashMap::new();
        let mut by_status = HashMap::new();
        let mut skill_phases = Vec::new();
        let mut resolver_phases = Vec::new();

        for (i, phase) in config.phases.iter().enumerate() {
            by_name.entry(phase.name.clone()).or_insert(i);
            by_status.entry(phase.status.clone()).or_insert(i);
            match phase.kind {
                PhaseKind::Skill(_) => skill_phases.push(i),
                PhaseKind::Resolver(_) => resolver_phases.push(i),
            }
        }

        let entry = by_name.get(&config.entry_phase).copied();

        Self {
            config,
            by_name,
            by_status,
            skill_phases,
            resolver_phases,
            entry,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn entry_phase(&self) -> Option<&Phase> {
        self.entry.and_then(|i| self.config.phases.get(i))
    }

    pub fn state_by_name(&self, name: &str) -> Option<&Phase> {
        self.by_name.get(name).and_then(|&i| self.config.phases.get(i))
    }

    pub fn state_by_status(&self, status: &str) -> Option<&Phase> {
        self.by_status
            .get(status)
            .and_then(|&i| self.config.phases.get(i))
    }

    pub fn all_states(&self) -> &[Phase] {
        &self.config.phases
    }

    pub fn all_statuses(&self) -> Vec<&str> {
        self.config.phases.iter().map(|p| p.status.as_str()).collect()
    }

    pub fn skill_states(&self) -> impl Iterator<Item = &Phase> {
        self.skill_phases
            .iter()
            .filter_map(|&i| self.config.phases.get(i))
    }

    pub fn resolver_states(&self) -> impl Iterator<Item = &Phase> {
        self.resolver_phases
            .iter()
            .filter_map(|&i| self.config.phases.get(i))
    }

    /// Whether a stage sitting in `from_status` may move to `to_status`.
    ///
    /// `to_status` may name a phase's status or the `Done` sentinel.
    pub fn is_valid_transition(&self, from_status: &str, to_status: &str) -> bool {
        let Some(from) = self.state_by_status(from_status) else {
            return false;
        };
        if to_status == DONE_TARGET {
            return from.can_transition_to(DONE_TARGET);
        }
        match self.state_by_status(to_status) {
            Some(to) => from.can_transition_to(&to.name),
            None => false,
        }
    }
}
