//! Template engine for rendering node labels

use super::context::SeedContext;
use super::errors::TemplateError;
use minijinja::{Environment, ErrorKind, UndefinedBehavior};

/// Label rendering engine
///
/// Wraps minijinja with strict undefined handling.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    /// Render a label or description. `name` identifies the source in errors.
    pub fn render(
        &self,
        name: &str,
        source: &str,
        ctx: &SeedContext,
    ) -> Result<String, TemplateError> {
        if !source.contains("{{") && !source.contains("{%") {
            return Ok(source.to_string());
        }

        let template = self
            .env
            .template_from_str(source)
            .map_err(|e| convert_minijinja_error(e, name))?;

        let known = ctx.known_variables();
        let mut unknown: Vec<String> = template
            .undeclared_variables(false)
            .into_iter()
            .filter(|v| !known.contains(&v.as_str()))
            .collect();
        unknown.sort();
        if let Some(var) = unknown.into_iter().next() {
            return Err(TemplateError::undefined_variable(var, Some(name), &known));
        }

        template
            .render(ctx.to_value())
            .map_err(|e| convert_minijinja_error(e, name))
    }

    /// Check if a template is syntactically valid
    pub fn validate(&self, name: &str, source: &str) -> Result<(), TemplateError> {
        self.env
            .template_from_str(source)
            .map(|_| ())
            .map_err(|e| convert_minijinja_error(e, name))
    }
}

/// Convert a minijinja error to our TemplateError type
fn convert_minijinja_error(err: minijinja::Error, name: &str) -> TemplateError {
    match err.kind() {
        ErrorKind::SyntaxError => {
            let line = err.line().unwrap_or(0);
            let message = err
                .detail()
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            TemplateError::syntax(message, line, Some(name))
        }
        _ => TemplateError::Internal(err),
    }
}
