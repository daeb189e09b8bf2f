//! Configuration loading with multi-layer merge

use super::{StaffConfig, TemplateConfig};
use crate::graph::{Edge, Node, Workflow};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level sitegraph configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SiteGraphConfig {
    /// Global defaults
    #[serde(default)]
    pub defaults: Defaults,

    /// Staff directory
    #[serde(default)]
    pub staff: Vec<StaffConfig>,

    /// User templates, consulted before the built-in catalog
    #[serde(default)]
    pub templates: Vec<TemplateConfig>,
}

/// Global default settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    /// Snapshot poll interval while a workflow is active
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Workflow database path (`~` is expanded)
    pub database: Option<String>,

    /// Timeout for remote snapshot reads
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            database: None,
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl SiteGraphConfig {
    /// Load configuration from the standard hierarchy
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/sitegraph/config.toml
    /// 3. .sitegraph/config.toml (project)
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                let user_config = Self::load_file(&user_config_path)
                    .with_context(|| format!("loading {}", user_config_path.display()))?;
                config.merge(user_config);
            }
        }

        let project_config_path = project_dir
            .map(|p| p.join(".sitegraph/config.toml"))
            .unwrap_or_else(|| PathBuf::from(".sitegraph/config.toml"));

        if project_config_path.exists() {
            let project_config = Self::load_file(&project_config_path)
                .with_context(|| format!("loading {}", project_config_path.display()))?;
            config.merge(project_config);
        }

        config.validate().map_err(|errors| {
            anyhow::anyhow!("configuration validation failed:\n  {}", errors.join("\n  "))
        })?;

        tracing::debug!(
            staff = config.staff.len(),
            templates = config.templates.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Get the user config path (~/.config/sitegraph/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("sitegraph/config.toml"))
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        if other.defaults.poll_interval_ms != default_poll_interval_ms() {
            self.defaults.poll_interval_ms = other.defaults.poll_interval_ms;
        }
        if other.defaults.database.is_some() {
            self.defaults.database = other.defaults.database;
        }
        if other.defaults.http_timeout_secs != default_http_timeout_secs() {
            self.defaults.http_timeout_secs = other.defaults.http_timeout_secs;
        }

        // Staff and templates: other wins for the same id/key
        for staff in other.staff {
            match self.staff.iter_mut().find(|s| s.id == staff.id) {
                Some(existing) => *existing = staff,
                None => self.staff.push(staff),
            }
        }
        for template in other.templates {
            match self.templates.iter_mut().find(|t| t.key == template.key) {
                Some(existing) => *existing = template,
                None => self.templates.push(template),
            }
        }
    }

    /// Check staff ids and user templates
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.defaults.poll_interval_ms == 0 {
            errors.push("defaults.poll_interval_ms must be greater than zero".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for staff in &self.staff {
            if staff.id.trim().is_empty() {
                errors.push(format!("staff member '{}' has an empty id", staff.name));
            } else if !seen.insert(staff.id.as_str()) {
                errors.push(format!("duplicate staff id: {}", staff.id));
            }
        }

        for template in &self.templates {
            if let Err(template_errors) = template.validate() {
                errors.extend(template_errors);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Resolve the workflow database path
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.defaults.database {
            Some(path) => {
                let expanded = shellexpand::tilde(path);
                Ok(PathBuf::from(expanded.as_ref()))
            }
            None => crate::store::WorkflowStore::default_path(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.defaults.poll_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.defaults.http_timeout_secs)
    }
}

/// Workflow document as written by hand in TOML
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WorkflowFile {
    name: String,
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
}

/// Load a workflow document for import.
///
/// Nodes without an id get one generated; edges may only reference ids that
/// appear in the file.
pub fn load_workflow_file(path: &Path) -> Result<Workflow> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let file: WorkflowFile = toml::from_str(&contents)
        .with_context(|| format!("parsing {}", path.display()))?;

    let workflow = Workflow::from_parts(file.name, file.nodes, file.edges)
        .with_context(|| format!("building workflow from {}", path.display()))?;

    workflow.validate().map_err(|errors| {
        anyhow::anyhow!("workflow validation failed:\n  {}", errors.join("\n  "))
    })?;

    Ok(workflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_load_empty_config() {
        let config = SiteGraphConfig::default();
        assert!(config.staff.is_empty());
        assert!(config.templates.is_empty());
        assert_eq!(config.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
            [defaults]
            poll_interval_ms = 500
            database = "~/sites/workflows.db"

            [[staff]]
            id = "s-1"
            name = "Dana Reyes"
            role = "site supervisor"

            [[staff]]
            id = "s-2"
            name = "Sam Okafor"
            active = false
        "#
        )
        .unwrap();

        let config = SiteGraphConfig::load_file(&config_path).unwrap();
        assert_eq!(config.defaults.poll_interval_ms, 500);
        assert_eq!(config.staff.len(), 2);
        assert!(!config.staff[1].active);

        let db = config.database_path().unwrap();
        assert!(db.ends_with("sites/workflows.db"));
        assert!(!db.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_project_layer_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join(".sitegraph");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(
            project.join("config.toml"),
            r#"
            [defaults]
            http_timeout_secs = 5

            [[staff]]
            id = "s-9"
            name = "Lee Park"
        "#,
        )
        .unwrap();

        let config = SiteGraphConfig::load(Some(dir.path())).unwrap();
        assert_eq!(config.defaults.http_timeout_secs, 5);
        assert!(config.staff.iter().any(|s| s.id == "s-9"));
    }

    #[test]
    fn test_config_merge() {
        let mut base = SiteGraphConfig::default();
        base.staff.push(StaffConfig::new("s-1", "Dana"));
        base.defaults.poll_interval_ms = 1000;

        let mut other = SiteGraphConfig::default();
        other.staff.push(StaffConfig::new("s-1", "Dana Reyes"));
        other.staff.push(StaffConfig::new("s-2", "Sam"));

        base.merge(other);

        // Default-valued fields in the override don't clobber
        assert_eq!(base.defaults.poll_interval_ms, 1000);
        // Override wins for existing id
        assert_eq!(base.staff[0].name, "Dana Reyes");
        assert_eq!(base.staff.len(), 2);
    }

    #[test]
    fn test_validate_duplicate_staff() {
        let mut config = SiteGraphConfig::default();
        config.staff.push(StaffConfig::new("s-1", "Dana"));
        config.staff.push(StaffConfig::new("s-1", "Sam"));

        let errors = config.validate().unwrap_err();
        assert!(errors[0].contains("duplicate staff id"));
    }

    #[test]
    fn test_load_workflow_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pour.toml");
        std::fs::write(
            &path,
            r#"
            name = "Slab pour"

            [[nodes]]
            id = "start"
            kind = "trigger"
            label = "Book concrete"

            [[nodes]]
            id = "inspect"
            kind = "decision"
            label = "Reinforcement passed?"

            [[nodes]]
            id = "pour"
            kind = "task"
            label = "Pour slab"

            [[nodes]]
            id = "rework"
            kind = "task"
            label = "Fix reinforcement"

            [[edges]]
            source = "start"
            target = "inspect"

            [[edges]]
            source = "inspect"
            target = "pour"
            branch = "true"

            [[edges]]
            source = "inspect"
            target = "rework"
            branch = "false"

            [[edges]]
            source = "rework"
            target = "inspect"
        "#,
        )
        .unwrap();

        let workflow = load_workflow_file(&path).unwrap();
        assert_eq!(workflow.name, "Slab pour");
        assert_eq!(workflow.nodes().len(), 4);
        assert_eq!(workflow.edges().len(), 4);
        assert!(workflow.id.is_none());
    }

    #[test]
    fn test_load_workflow_file_rejects_dangling_edge() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(
            &path,
            r#"
            name = "Bad"

            [[nodes]]
            id = "start"
            kind = "trigger"

            [[edges]]
            source = "start"
            target = "nowhere"
        "#,
        )
        .unwrap();

        let err = load_workflow_file(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("nowhere"));
    }
}
