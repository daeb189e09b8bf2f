//! Template/seed loader for sitegraph
//!
//! Picks a graph skeleton by key or by keyword lookup over a free-text
//! prompt, then seeds a new workflow from it. Node labels are minijinja
//! templates.
//!
//! # Features
//!
//! - Built-in skeletons plus user `[[templates]]` from config
//! - Case-insensitive keyword containment; first match wins
//! - Label variables: `{{ workflow }}`, `{{ prompt }}`, `{{ template }}`
//! - "Did you mean" suggestions for unknown keys and variables
//!
//! # Example
//!
//! ```ignore
//! use sitegraph::template::TemplateCatalog;
//!
//! let catalog = TemplateCatalog::with_user(config.templates.clone())?;
//! let template = catalog.resolve("weekly safety walk");
//! let workflow = catalog.seed(template, "Tower B", Some("weekly safety walk"))?;
//! ```

mod catalog;
mod context;
mod engine;
mod errors;
mod matcher;

#[allow(unused_imports)]
pub use catalog::{DEFAULT_TEMPLATE, TemplateCatalog, builtin_templates};
#[allow(unused_imports)]
pub use context::SeedContext;
#[allow(unused_imports)]
pub use engine::TemplateEngine;
#[allow(unused_imports)]
pub use errors::{TemplateError, suggest_correction};
#[allow(unused_imports)]
pub use matcher::KeywordMatcher;
