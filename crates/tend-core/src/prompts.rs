//! Prompt library for external reasoning
//!
//! Prompts are loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/tend/prompts/overrides/)
//! 2. Fall back to embedded defaults (compiled into binary)

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default prompts (compiled into binary)
mod defaults {
    pub const SUGGEST_INSIGHT: &str = include_str!("../../../prompts/suggest_insight.md");
}

/// Known prompt IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Ask the backend for supplementary insights from an anonymised summary
    SuggestInsight,
}

impl PromptId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuggestInsight => "suggest_insight",
        }
    }

    pub fn all() -> &'static [PromptId] {
        &[Self::SuggestInsight]
    }

    fn default_content(&self) -> &'static str {
        match self {
            Self::SuggestInsight => defaults::SUGGEST_INSIGHT,
        }
    }
}

/// Prompt frontmatter metadata
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    /// Version number for tracking changes
    pub version: u32,
    pub task_type: String,
}

/// A loaded prompt with metadata and content
#[derive(Debug, Clone)]
pub struct Prompt {
    pub metadata: PromptMetadata,
    /// The prompt body (system + user sections)
    pub content: String,
    /// Path to the override file, if one was used
    pub override_path: Option<PathBuf>,
}

impl Prompt {
    pub fn is_override(&self) -> bool {
        self.override_path.is_some()
    }

    pub fn system_section(&self) -> Option<&str> {
        extract_section(&self.content, "# System")
    }

    pub fn user_section(&self) -> Option<&str> {
        extract_section(&self.content, "# User")
    }

    /// Render the system section (or whole body) with variables
    pub fn render_system(&self, vars: &HashMap<&str, String>) -> String {
        render_template(self.system_section().unwrap_or(&self.content), vars)
    }

    /// Render the user section (or whole body) with variables
    pub fn render_user(&self, vars: &HashMap<&str, String>) -> String {
        render_template(self.user_section().unwrap_or(&self.content), vars)
    }
}

/// Loads and caches prompts
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
    cache: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    /// Library using the default override directory
    pub fn new() -> Self {
        Self {
            override_dir: default_prompts_dir(),
            cache: HashMap::new(),
        }
    }

    pub fn with_override_dir(path: impl Into<PathBuf>) -> Self {
        Self {
            override_dir: Some(path.into()),
            cache: HashMap::new(),
        }
    }

    /// Embedded prompts only
    pub fn embedded_only() -> Self {
        Self {
            override_dir: None,
            cache: HashMap::new(),
        }
    }

    /// Get a prompt by ID, loading from override or default
    pub fn get(&mut self, id: PromptId) -> Result<&Prompt> {
        if !self.cache.contains_key(&id) {
            let prompt = load(self.override_dir.as_deref(), id)?;
            self.cache.insert(id, prompt);
        }
        self.cache
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("prompt {}", id.as_str())))
    }

    pub fn has_override(&self, id: PromptId) -> bool {
        self.override_dir
            .as_ref()
            .is_some_and(|d| d.join(format!("{}.md", id.as_str())).exists())
    }

    pub fn override_dir(&self) -> Option<&Path> {
        self.override_dir.as_deref()
    }

    /// Drop cached prompts (after editing override files)
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Default prompts override directory
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tend").join("prompts").join("overrides"))
}

fn load(override_dir: Option<&Path>, id: PromptId) -> Result<Prompt> {
    if let Some(dir) = override_dir {
        let path = dir.join(format!("{}.md", id.as_str()));
        if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| Error::InvalidData(format!("Failed to read prompt override: {}", e)))?;
            let (metadata, body) = parse_prompt(&content)?;
            tracing::debug!(prompt = id.as_str(), path = %path.display(), "Using prompt override");
            return Ok(Prompt {
                metadata,
                content: body,
                override_path: Some(path),
            });
        }
    }

    let (metadata, body) = parse_prompt(id.default_content())?;
    Ok(Prompt {
        metadata,
        content: body,
        override_path: None,
    })
}

/// Split a prompt file into YAML frontmatter and body
fn parse_prompt(content: &str) -> Result<(PromptMetadata, String)> {
    let content = content.trim();
    let rest = content.strip_prefix("---").ok_or_else(|| {
        Error::InvalidData("Prompt must start with YAML frontmatter (---)".into())
    })?;

    let end = rest.find("---").ok_or_else(|| {
        Error::InvalidData("Prompt frontmatter not closed (missing second ---)".into())
    })?;

    let metadata: PromptMetadata = serde_yaml::from_str(rest[..end].trim())
        .map_err(|e| Error::InvalidData(format!("Invalid prompt frontmatter: {}", e)))?;

    Ok((metadata, rest[end + 3..].trim().to_string()))
}

fn extract_section<'a>(content: &'a str, header: &str) -> Option<&'a str> {
    let start = content.find(header)?;
    let after = &content[start + header.len()..];
    let end = after.find("\n# ").unwrap_or(after.len());
    Some(after[..end].trim())
}

/// Resolve `{{#if var}}...{{/if}}` blocks, then substitute `{{var}}`
fn render_template(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut result = resolve_conditionals(template, vars);
    for (key, value) in vars {
        result = result.replace(&format!("{{{{{}}}}}", key), value);
    }
    result
}

fn resolve_conditionals(content: &str, vars: &HashMap<&str, String>) -> String {
    let mut result = content.to_string();

    while let Some(if_start) = result.find("{{#if ") {
        let var_start = if_start + 6;
        let Some(var_len) = result[var_start..].find("}}") else {
            break;
        };
        let var_name = result[var_start..var_start + var_len].trim().to_string();
        let block_start = var_start + var_len + 2;
        let Some(block_len) = result[block_start..].find("{{/if}}") else {
            break;
        };
        let block_end = block_start + block_len;
        let keep = vars.get(var_name.as_str()).is_some_and(|v| !v.is_empty());

        result = if keep {
            format!(
                "{}{}{}",
                &result[..if_start],
                &result[block_start..block_end],
                &result[block_end + 7..]
            )
        } else {
            format!("{}{}", &result[..if_start], &result[block_end + 7..])
        };
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prompt() {
        let content = "---\nid: test_prompt\nversion: 1\ntask_type: reasoning\n---\n\n# System\nBe kind.\n\n# User\nHello {{name}}.\n";
        let (metadata, body) = parse_prompt(content).unwrap();
        assert_eq!(metadata.id, "test_prompt");
        assert_eq!(metadata.version, 1);
        assert_eq!(extract_section(&body, "# System"), Some("Be kind."));
        assert_eq!(extract_section(&body, "# User"), Some("Hello {{name}}."));
    }

    #[test]
    fn test_missing_frontmatter_rejected() {
        assert!(parse_prompt("# System\nNo header").is_err());
        assert!(parse_prompt("---\nid: x\n").is_err());
    }

    #[test]
    fn test_conditionals_and_substitution() {
        let template = "Start{{#if focus}}\nFocus: {{focus}}{{/if}}\nEnd {{n}}";

        let mut vars = HashMap::new();
        vars.insert("focus", "coping".to_string());
        vars.insert("n", "3".to_string());
        let rendered = render_template(template, &vars);
        assert!(rendered.contains("Focus: coping"));
        assert!(rendered.contains("End 3"));

        vars.insert("focus", String::new());
        let rendered = render_template(template, &vars);
        assert!(!rendered.contains("Focus"));
        assert!(rendered.starts_with("Start"));
    }

    #[test]
    fn test_embedded_prompts_parse() {
        let mut lib = PromptLibrary::embedded_only();
        for id in PromptId::all() {
            let prompt = lib.get(*id).unwrap();
            assert_eq!(prompt.metadata.id, id.as_str());
            assert!(!prompt.is_override());
            assert!(prompt.system_section().is_some());
            assert!(prompt.user_section().is_some());
        }
    }

    #[test]
    fn test_override_dir_wins() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("suggest_insight.md"),
            "---\nid: suggest_insight\nversion: 9\ntask_type: reasoning\n---\n# System\nCustom\n# User\nU",
        )
        .unwrap();

        let mut lib = PromptLibrary::with_override_dir(dir.path());
        assert!(lib.has_override(PromptId::SuggestInsight));
        let prompt = lib.get(PromptId::SuggestInsight).unwrap();
        assert_eq!(prompt.metadata.version, 9);
        assert!(prompt.is_override());
    }
}
