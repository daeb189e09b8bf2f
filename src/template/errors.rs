//! Template error types with source locations and suggestions

use crate::error::EngineError;
use std::fmt;
use thiserror::Error;

/// Location in a template where an error occurred
#[derive(Debug, Clone, Default)]
pub struct SourceLocation {
    pub line: usize,
    pub template_name: Option<String>,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref name) = self.template_name {
            write!(f, "{}:{}", name, self.line)
        } else {
            write!(f, "line {}", self.line)
        }
    }
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(", did you mean '{}'?", s))
        .unwrap_or_default()
}

/// Template selection and rendering errors
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Label references a variable that is never provided
    #[error("undefined variable '{name}' at {location}{}", did_you_mean(.suggestion))]
    UndefinedVariable {
        name: String,
        location: SourceLocation,
        suggestion: Option<String>,
    },

    /// Label syntax error
    #[error("syntax error at {location}: {message}")]
    SyntaxError {
        message: String,
        location: SourceLocation,
    },

    /// Explicit template key not in the catalog
    #[error("unknown template '{key}'{}", did_you_mean(.suggestion))]
    UnknownTemplate {
        key: String,
        suggestion: Option<String>,
    },

    /// Skeleton failed validation
    #[error("invalid template '{key}':\n  {}", .errors.join("\n  "))]
    InvalidTemplate { key: String, errors: Vec<String> },

    /// Built-in catalog could not be parsed
    #[error("failed to parse template catalog: {0}")]
    Catalog(#[from] toml::de::Error),

    /// Seeded graph rejected by the graph store
    #[error(transparent)]
    Seed(#[from] EngineError),

    /// Wrapped minijinja error
    #[error("template error: {0}")]
    Internal(#[from] minijinja::Error),
}

impl TemplateError {
    /// Create an undefined variable error with optional suggestion
    pub fn undefined_variable(
        name: impl Into<String>,
        template_name: Option<&str>,
        known_vars: &[&str],
    ) -> Self {
        let name = name.into();
        let suggestion = suggest_correction(&name, known_vars);
        Self::UndefinedVariable {
            name,
            location: SourceLocation {
                line: 1,
                template_name: template_name.map(str::to_string),
            },
            suggestion,
        }
    }

    /// Create a syntax error
    pub fn syntax(message: impl Into<String>, line: usize, template_name: Option<&str>) -> Self {
        Self::SyntaxError {
            message: message.into(),
            location: SourceLocation {
                line,
                template_name: template_name.map(str::to_string),
            },
        }
    }

    /// Create an unknown template error, suggesting the closest key
    pub fn unknown_template(key: impl Into<String>, known_keys: &[&str]) -> Self {
        let key = key.into();
        let suggestion = suggest_correction(&key, known_keys);
        Self::UnknownTemplate { key, suggestion }
    }
}

/// Suggest a correction for a typo using Levenshtein distance
pub fn suggest_correction(typo: &str, candidates: &[&str]) -> Option<String> {
    if candidates.is_empty() {
        return None;
    }

    let mut best_match = None;
    let mut best_distance = usize::MAX;
    let max_distance = (typo.len() / 2).max(2); // Allow up to half the length in edits

    for candidate in candidates {
        let distance = levenshtein_distance(typo, candidate);
        if distance < best_distance && distance <= max_distance {
            best_distance = distance;
            best_match = Some(candidate.to_string());
        }
    }

    best_match
}

/// Calculate Levenshtein distance between two strings
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    // Two rolling rows instead of the full matrix
    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0usize; b_chars.len() + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        current[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b_chars.len()]
}
