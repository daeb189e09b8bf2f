//! Template catalog - built-in and user skeletons, and workflow seeding

use super::context::SeedContext;
use super::engine::TemplateEngine;
use super::errors::TemplateError;
use super::matcher::KeywordMatcher;
use crate::config::TemplateConfig;
use crate::graph::{Edge, Node, Workflow};
use serde::Deserialize;

/// Key of the skeleton used when nothing else matches
pub const DEFAULT_TEMPLATE: &str = "basic";

const BUILTIN_TEMPLATES: &str = include_str!("builtin.toml");

#[derive(Debug, Deserialize)]
struct TemplateFile {
    templates: Vec<TemplateConfig>,
}

/// Parse the built-in skeletons
pub fn builtin_templates() -> Result<Vec<TemplateConfig>, TemplateError> {
    let file: TemplateFile = toml::from_str(BUILTIN_TEMPLATES)?;
    Ok(file.templates)
}

/// Ordered, validated set of skeletons
pub struct TemplateCatalog {
    templates: Vec<TemplateConfig>,
    matcher: KeywordMatcher,
    default_index: usize,
    engine: TemplateEngine,
}

impl TemplateCatalog {
    /// Built-in skeletons only
    pub fn builtin() -> Result<Self, TemplateError> {
        Self::with_user(Vec::new())
    }

    /// User skeletons first, then built-ins. A user template with a built-in
    /// key replaces it.
    pub fn with_user(user: Vec<TemplateConfig>) -> Result<Self, TemplateError> {
        let mut templates = user;
        for builtin in builtin_templates()? {
            if !templates.iter().any(|t| t.key == builtin.key) {
                templates.push(builtin);
            }
        }

        for template in &templates {
            template
                .validate()
                .map_err(|errors| TemplateError::InvalidTemplate {
                    key: template.key.clone(),
                    errors,
                })?;
        }

        let default_index = templates
            .iter()
            .position(|t| t.key == DEFAULT_TEMPLATE)
            .ok_or_else(|| TemplateError::InvalidTemplate {
                key: DEFAULT_TEMPLATE.to_string(),
                errors: vec!["default template is missing from the catalog".to_string()],
            })?;

        let matcher = KeywordMatcher::new(&templates)?;
        tracing::debug!(
            templates = templates.len(),
            keywords = matcher.len(),
            "Template catalog loaded"
        );

        Ok(Self {
            templates,
            matcher,
            default_index,
            engine: TemplateEngine::new(),
        })
    }

    pub fn templates(&self) -> &[TemplateConfig] {
        &self.templates
    }

    pub fn keys(&self) -> Vec<&str> {
        self.templates.iter().map(|t| t.key.as_str()).collect()
    }

    pub fn get(&self, key: &str) -> Option<&TemplateConfig> {
        self.templates.iter().find(|t| t.key == key)
    }

    pub fn default_template(&self) -> &TemplateConfig {
        &self.templates[self.default_index]
    }

    /// Explicit lookup; unknown keys get a suggestion
    pub fn by_key(&self, key: &str) -> Result<&TemplateConfig, TemplateError> {
        self.get(key)
            .ok_or_else(|| TemplateError::unknown_template(key, &self.keys()))
    }

    /// First keyword match in the prompt, or the default skeleton
    pub fn match_prompt(&self, prompt: &str) -> &TemplateConfig {
        self.matcher
            .find(prompt)
            .and_then(|key| self.get(key))
            .unwrap_or_else(|| self.default_template())
    }

    /// Exact key first, then keyword match, then the default
    pub fn resolve(&self, key_or_prompt: &str) -> &TemplateConfig {
        self.get(key_or_prompt.trim())
            .unwrap_or_else(|| self.match_prompt(key_or_prompt))
    }

    /// Skeleton nodes and edges for a key or prompt, labels unrendered
    pub fn resolve_template(&self, key_or_prompt: &str) -> (Vec<Node>, Vec<Edge>) {
        let template = self.resolve(key_or_prompt);
        (template.nodes.clone(), template.edges.clone())
    }

    /// Build a fresh, unsaved workflow from a skeleton, rendering labels
    pub fn seed(
        &self,
        template: &TemplateConfig,
        name: &str,
        prompt: Option<&str>,
    ) -> Result<Workflow, TemplateError> {
        let ctx = SeedContext::new(name, &template.key).with_prompt(prompt.unwrap_or_default());

        let mut nodes = Vec::with_capacity(template.nodes.len());
        for node in &template.nodes {
            let mut node = node.clone();
            node.label = self
                .engine
                .render(&format!("{}.label", node.id), &node.label, &ctx)?;
            node.description = self
                .engine
                .render(&format!("{}.description", node.id), &node.description, &ctx)?;
            nodes.push(node);
        }

        let workflow = Workflow::from_parts(name, nodes, template.edges.clone())?;
        tracing::info!(
            workflow = name,
            template = %template.key,
            nodes = workflow.nodes().len(),
            edges = workflow.edges().len(),
            "Seeded workflow from template"
        );
        Ok(workflow)
    }
}
