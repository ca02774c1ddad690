//! Skill instruction files for skill phases.
//!
//! Skills are markdown files read from the configured skills directory:
//!
//! ```text
//! .kanban/skills/
//! ├── phase-design/
//! │   └── SKILL.md
//! └── phase-build/
//!     └── SKILL.md
//! ```
//!
//! A skill tells the agent what to do in a phase and which phase to move the
//! stage to afterwards, so its text is expected to name every transition
//! target the phase declares.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::pipeline::Phase;
use crate::validate::skill_content::SkillReader;

/// The filename for skill content
pub const SKILL_FILE: &str = "SKILL.md";

/// Reads skills from `<skills_dir>/<name>/SKILL.md`.
#[derive(Debug, Clone)]
pub struct SkillsLoader {
    skills_dir: PathBuf,
}

impl SkillsLoader {
    pub fn new(skills_dir: impl AsRef<Path>) -> Self {
        Self {
            skills_dir: skills_dir.as_ref().to_path_buf(),
        }
    }

    pub fn skills_dir(&self) -> &Path {
        &self.skills_dir
    }

    pub fn skill_file(&self, name: &str) -> PathBuf {
        self.skills_dir.join(name).join(SKILL_FILE)
    }

    /// List all skills that have a SKILL.md, sorted by name.
    pub fn list_skills(&self) -> Result<Vec<String>> {
        if !self.skills_dir.exists() {
            return Ok(Vec::new());
        }

        let mut skills = Vec::new();
        let entries = std::fs::read_dir(&self.skills_dir).with_context(|| {
            format!("Failed to read skills directory: {}", self.skills_dir.display())
        })?;

        for entry in entries {
            let path = entry?.path();
            if path.is_dir()
                && path.join(SKILL_FILE).exists()
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
            {
                skills.push(name.to_string());
            }
        }

        skills.sort();
        Ok(skills)
    }

    /// Write a skill, creating its directory.
    pub fn create_skill(&self, name: &str, content: &str) -> Result<PathBuf> {
        let skill_dir = self.skills_dir.join(name);
        std::fs::create_dir_all(&skill_dir)
            .with_context(|| format!("Failed to create skill directory: {}", skill_dir.display()))?;

        let skill_file = skill_dir.join(SKILL_FILE);
        std::fs::write(&skill_file, content)
            .with_context(|| format!("Failed to write skill file: {}", skill_file.display()))?;
        Ok(skill_file)
    }
}

impl SkillReader for SkillsLoader {
    fn read_skill(&self, name: &str) -> Result<Option<String>> {
        let skill_file = self.skill_file(name);
        if !skill_file.exists() {
            debug!(skill = name, path = %skill_file.display(), "Skill file not found");
            return Ok(None);
        }
        let content = std::fs::read_to_string(&skill_file)
            .with_context(|| format!("Failed to read skill file: {}", skill_file.display()))?;
        Ok(Some(content))
    }
}

/// Starter instructions for a skill phase, naming each of its transitions.
pub fn stub_skill_content(phase: &Phase) -> String {
    let mut out = format!(
        "# {}\n\nWork the stage while it is in status `{}`.\n\n## When finished\n\n",
        phase.name, phase.status
    );
    for target in &phase.transitions_to {
        out.push_str(&format!("- Move the stage to `{}` when appropriate.\n", target));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_skill() {
        let dir = tempdir().unwrap();
        let loader = SkillsLoader::new(dir.path());
        loader.create_skill("phase-build", "# Build\n\nThen go to PR Created.").unwrap();

        let content = loader.read_skill("phase-build").unwrap().unwrap();
        assert!(content.contains("PR Created"));
    }

    #[test]
    fn test_read_missing_skill_is_none() {
        let dir = tempdir().unwrap();
        let loader = SkillsLoader::new(dir.path());
        assert!(loader.read_skill("nope").unwrap().is_none());
    }

    #[test]
    fn test_list_skills_sorted_and_ignores_incomplete() {
        let dir = tempdir().unwrap();
        let loader = SkillsLoader::new(dir.path());
        loader.create_skill("skill-z", "Z").unwrap();
        loader.create_skill("skill-a", "A").unwrap();
        std::fs::create_dir_all(dir.path().join("incomplete")).unwrap();

        assert_eq!(loader.list_skills().unwrap(), vec!["skill-a", "skill-z"]);
    }

    #[test]
    fn test_list_skills_missing_dir() {
        let loader = SkillsLoader::new("/nonexistent/skills");
        assert!(loader.list_skills().unwrap().is_empty());
    }

    #[test]
    fn test_stub_mentions_every_target() {
        let phase = Phase::skill("Review", "review", "Review", &["Done", "Build"]);
        let stub = stub_skill_content(&phase);
        assert!(stub.contains("`Done`"));
        assert!(stub.contains("`Build`"));
    }
}
