//! Variables available to node labels when a workflow is seeded

use minijinja::value::Value;
use serde::Serialize;

/// Context for rendering template labels and descriptions
#[derive(Debug, Clone, Default, Serialize)]
pub struct SeedContext {
    /// Name of the workflow being created
    pub workflow: String,

    /// Free-text prompt, empty when the template was picked by key
    pub prompt: String,

    /// Key of the selected template
    pub template: String,
}

impl SeedContext {
    pub fn new(workflow: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            workflow: workflow.into(),
            template: template.into(),
            ..Default::default()
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Convert to a minijinja Value for template rendering
    pub fn to_value(&self) -> Value {
        Value::from_serialize(self)
    }

    /// Top-level variable names, for error suggestions
    pub fn known_variables(&self) -> Vec<&'static str> {
        vec!["workflow", "prompt", "template"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_value() {
        let ctx = SeedContext::new("Level 3 pour", "site-inspection").with_prompt("check formwork");
        let value = ctx.to_value();
        assert_eq!(
            value.get_attr("workflow").unwrap().as_str(),
            Some("Level 3 pour")
        );
        assert_eq!(
            value.get_attr("prompt").unwrap().as_str(),
            Some("check formwork")
        );
        assert_eq!(ctx.known_variables().len(), 3);
    }
}
