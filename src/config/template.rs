//! Workflow template configuration

use crate::graph::{Edge, Node, NodeKind, Workflow};
use serde::{Deserialize, Serialize};

/// A graph skeleton selectable by key or by prompt keywords.
///
/// Node labels and descriptions may use `{{ workflow }}` and `{{ prompt }}`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TemplateConfig {
    /// Unique template key, e.g. "site-inspection"
    pub key: String,

    #[serde(default)]
    pub description: String,

    /// Phrases that select this template when found in a free-text prompt
    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub nodes: Vec<Node>,

    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl TemplateConfig {
    /// Validate the skeleton
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.key.trim().is_empty() {
            errors.push("template key is empty".to_string());
        }

        if self.keywords.iter().any(|k| k.trim().is_empty()) {
            errors.push(format!("template '{}' has an empty keyword", self.key));
        }

        if self.nodes.is_empty() {
            errors.push(format!("template '{}' has no nodes", self.key));
        }

        let has_entry = self.nodes.iter().any(|n| {
            n.kind == NodeKind::Trigger && !self.edges.iter().any(|e| e.target == n.id)
        });
        if !self.nodes.is_empty() && !has_entry {
            errors.push(format!(
                "template '{}' has no trigger node without incoming edges",
                self.key
            ));
        }

        if let Err(graph_errors) = self.skeleton().validate() {
            errors.extend(
                graph_errors
                    .into_iter()
                    .map(|e| format!("template '{}': {}", self.key, e)),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Unchecked workflow holding the raw skeleton
    fn skeleton(&self) -> Workflow {
        Workflow {
            name: self.key.clone(),
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUNCH_LIST: &str = r#"
        key = "punch-list"
        description = "Close out defects before handover"
        keywords = ["punch", "defects"]

        [[nodes]]
        id = "start"
        kind = "trigger"
        label = "Walk {{ workflow }}"

        [[nodes]]
        id = "fix"
        kind = "task"
        label = "Fix defects"

        [[nodes]]
        id = "done"
        kind = "terminal"
        label = "Handover"

        [[edges]]
        source = "start"
        target = "fix"

        [[edges]]
        source = "fix"
        target = "done"
    "#;

    #[test]
    fn test_template_from_toml() {
        let template: TemplateConfig = toml::from_str(PUNCH_LIST).unwrap();
        assert_eq!(template.key, "punch-list");
        assert_eq!(template.keywords, vec!["punch", "defects"]);
        assert_eq!(template.nodes.len(), 3);
        assert_eq!(template.edges.len(), 2);
        assert!(template.validate().is_ok());
    }

    #[test]
    fn test_template_validation_collects_errors() {
        let mut template: TemplateConfig = toml::from_str(PUNCH_LIST).unwrap();
        template.keywords.push(" ".into());
        template.edges.push(Edge::new("fix", "ghost"));
        template.nodes[0].kind = NodeKind::Task;

        let errors = template.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("empty keyword")));
        assert!(errors.iter().any(|e| e.contains("no trigger node")));
        assert!(errors.iter().any(|e| e.contains("ghost")));
    }

    #[test]
    fn test_template_decision_needs_both_branches() {
        let template: TemplateConfig = toml::from_str(
            r#"
            key = "check"

            [[nodes]]
            id = "start"
            kind = "trigger"

            [[nodes]]
            id = "ok"
            kind = "decision"

            [[nodes]]
            id = "end"
            kind = "terminal"

            [[edges]]
            source = "start"
            target = "ok"

            [[edges]]
            source = "ok"
            target = "end"
            branch = "true"
        "#,
        )
        .unwrap();

        let errors = template.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("false")));
    }
}
