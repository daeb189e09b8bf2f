//! Configuration types and loading for sitegraph

mod loader;
mod staff;
mod template;

#[allow(unused_imports)]
pub use loader::{Defaults, SiteGraphConfig, load_workflow_file};
pub use staff::StaffConfig;
pub use template::TemplateConfig;
