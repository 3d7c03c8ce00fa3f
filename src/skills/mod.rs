use crate::error::{ContentError, EvalError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Discovery-owned metadata carried alongside skill content. Optional in
/// every field: the evaluation engine only reads it through to summaries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub stars: Option<u64>,
}

/// One skill as handed over by the discovery collaborator: identity,
/// immutable content, metadata.
#[derive(Debug, Clone)]
pub struct SkillRecord {
    pub id: String,
    pub content: String,
    pub metadata: SkillMetadata,
}

/// Read-only view over the discovery output directory. Each skill is a
/// folder holding a `SKILL.md` and an optional `metadata.json`.
pub struct SkillLibrary {
    root: PathBuf,
    max_content_bytes: usize,
}

impl SkillLibrary {
    pub fn new(root: impl Into<PathBuf>, max_content_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_content_bytes,
        }
    }

    /// Skill ids with a skill file present, sorted.
    pub fn list(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };

        let mut ids: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir() && entry.path().join("SKILL.md").exists())
            .filter_map(|entry| entry.file_name().to_str().map(ToString::to_string))
            .collect();
        ids.sort();
        ids
    }

    pub fn load(&self, id: &str) -> Result<SkillRecord, EvalError> {
        let skill_dir = self.root.join(id);
        let skill_file = skill_dir.join("SKILL.md");
        if !skill_file.exists() {
            return Err(ContentError::Missing { id: id.into() }.into());
        }

        let content = std::fs::read_to_string(&skill_file)
            .map_err(|_| ContentError::Missing { id: id.into() })?;
        validate_content(id, &content, self.max_content_bytes)?;

        let metadata = load_metadata(&skill_dir);

        Ok(SkillRecord {
            id: id.into(),
            content,
            metadata,
        })
    }
}

/// Non-empty and below the size ceiling, else the skill is skipped.
pub fn validate_content(id: &str, content: &str, max_bytes: usize) -> Result<(), ContentError> {
    if content.trim().is_empty() {
        return Err(ContentError::Empty { id: id.into() });
    }
    if content.len() > max_bytes {
        return Err(ContentError::TooLarge {
            id: id.into(),
            size: content.len(),
            max: max_bytes,
        });
    }
    Ok(())
}

fn load_metadata(skill_dir: &Path) -> SkillMetadata {
    let path = skill_dir.join("metadata.json");
    let Ok(raw) = std::fs::read_to_string(&path) else {
        return SkillMetadata::default();
    };
    match serde_json::from_str(&raw) {
        Ok(metadata) => metadata,
        Err(err) => {
            tracing::warn!(path = %path.display(), "ignoring unreadable metadata: {err}");
            SkillMetadata::default()
        }
    }
}
