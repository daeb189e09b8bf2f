//! Keyword lookup from free-text prompts to template keys
//!
//! Plain case-insensitive containment, nothing inferred: the first template
//! (in catalog order) with a keyword appearing anywhere in the prompt wins,
//! so "inspections" and "Repairs" hit `inspect` and `repair`.

use super::errors::TemplateError;
use crate::config::TemplateConfig;
use regex::Regex;

#[derive(Debug, Clone)]
struct Rule {
    key: String,
    keyword: String,
    pattern: Regex,
}

/// Ordered keyword rules
#[derive(Debug, Clone, Default)]
pub struct KeywordMatcher {
    rules: Vec<Rule>,
}

impl KeywordMatcher {
    pub fn new<'a>(
        templates: impl IntoIterator<Item = &'a TemplateConfig>,
    ) -> Result<Self, TemplateError> {
        let mut rules = Vec::new();
        for template in templates {
            for keyword in &template.keywords {
                let keyword = keyword.trim();
                if keyword.is_empty() {
                    continue;
                }
                let pattern = Regex::new(&format!("(?i){}", regex::escape(keyword)))
                    .map_err(|e| TemplateError::InvalidTemplate {
                        key: template.key.clone(),
                        errors: vec![format!("keyword '{}': {}", keyword, e)],
                    })?;
                rules.push(Rule {
                    key: template.key.clone(),
                    keyword: keyword.to_string(),
                    pattern,
                });
            }
        }
        Ok(Self { rules })
    }

    /// Key of the first template whose keyword appears in `prompt`
    pub fn find(&self, prompt: &str) -> Option<&str> {
        let rule = self.rules.iter().find(|r| r.pattern.is_match(prompt))?;
        tracing::debug!(template = %rule.key, keyword = %rule.keyword, "Prompt matched keyword");
        Some(rule.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
