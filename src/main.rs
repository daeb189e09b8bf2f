mod cli;
mod config;
mod directory;
mod error;
mod graph;
mod logging;
mod store;
mod sync;
mod template;
mod workflow;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cli::commands;
use cli::{OutputEvent, OutputHandler, OutputMode, create_handler};
use directory::ConfigStaffDirectory;
use graph::Branch;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use store::WorkflowStore;
use template::TemplateCatalog;
use workflow::WorkflowService;

#[derive(Parser)]
#[command(name = "sitegraph")]
#[command(about = "Run workflow graphs for site operations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory holding .sitegraph/config.toml (defaults to current)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress normal output
    #[arg(long, global = true)]
    quiet: bool,

    /// Print events as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Also write logs to a file (default location when no path is given)
    #[arg(long, global = true, num_args = 0..=1)]
    log_file: Option<Option<PathBuf>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a workflow from a template
    New {
        /// Workflow name
        name: String,

        /// Template key
        #[arg(long, conflicts_with = "prompt")]
        template: Option<String>,

        /// Free-text description; picks a template by keyword
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Create a workflow from a TOML file
    Import {
        /// Path to the workflow file
        file: PathBuf,
    },

    /// List stored workflows
    List,

    /// Show a workflow's nodes and derived statuses
    Show {
        id: String,

        /// Include the transition history
        #[arg(long)]
        history: bool,
    },

    /// Start (or restart) a workflow
    Run { id: String },

    /// Complete an in-progress node
    Complete {
        id: String,
        node: String,

        /// Branch taken, for decision nodes
        #[arg(long, value_parser = commands::parse_branch)]
        branch: Option<Branch>,
    },

    /// Mark a node failed
    Fail {
        id: String,
        node: String,

        #[arg(long)]
        reason: String,
    },

    /// Re-open a completed or failed node
    Rework { id: String, node: String },

    /// Assign a node to a staff member (omit staff to clear)
    Assign {
        id: String,
        node: String,
        staff: Option<String>,
    },

    /// Toggle a checklist item
    Check {
        id: String,
        node: String,

        /// Zero-based item index
        index: usize,
    },

    /// Follow a running workflow until nothing is in progress
    Watch {
        id: String,

        /// Read snapshots from a remote server instead of the local store
        #[arg(long)]
        remote: Option<String>,

        /// Poll interval override in milliseconds
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: Option<u64>,
    },

    /// Delete a workflow
    Delete { id: String },

    /// List the staff directory
    Staff,

    /// List available templates
    Templates,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::New { .. } => "new",
            Commands::Import { .. } => "import",
            Commands::List => "list",
            Commands::Show { .. } => "show",
            Commands::Run { .. } => "run",
            Commands::Complete { .. } => "complete",
            Commands::Fail { .. } => "fail",
            Commands::Rework { .. } => "rework",
            Commands::Assign { .. } => "assign",
            Commands::Check { .. } => "check",
            Commands::Watch { .. } => "watch",
            Commands::Delete { .. } => "delete",
            Commands::Staff => "staff",
            Commands::Templates => "templates",
        }
    }
}

fn open_store(path: &Path) -> Result<WorkflowStore> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    WorkflowStore::open(path).with_context(|| format!("opening store {}", path.display()))
}

async fn dispatch(cli: Cli, handler: &dyn OutputHandler) -> Result<()> {
    let config = config::SiteGraphConfig::load(cli.dir.as_deref())?;
    let catalog = TemplateCatalog::with_user(config.templates.clone())?;

    let directory = ConfigStaffDirectory::new(config.staff.clone());
    let store = open_store(&config.database_path()?)?;
    let service =
        Arc::new(WorkflowService::new(store).with_directory(Arc::new(directory)));

    match cli.command {
        Commands::New {
            name,
            template,
            prompt,
        } => {
            commands::new_workflow(
                &service,
                &catalog,
                &name,
                template.as_deref(),
                prompt.as_deref(),
                handler,
            )?;
        }
        Commands::Import { file } => {
            commands::import_workflow(&service, &file, handler)?;
        }
        Commands::List => commands::list_workflows(&service, handler)?,
        Commands::Show { id, history } => commands::show_workflow(&service, &id, history, handler)?,
        Commands::Run { id } => commands::run_workflow(&service, &id, handler)?,
        Commands::Complete { id, node, branch } => {
            commands::complete_node(&service, &id, &node, branch, handler)?
        }
        Commands::Fail { id, node, reason } => {
            commands::fail_node(&service, &id, &node, &reason, handler)?
        }
        Commands::Rework { id, node } => commands::rework_node(&service, &id, &node, handler)?,
        Commands::Assign { id, node, staff } => {
            commands::assign_node(&service, &id, &node, staff.as_deref(), handler)?
        }
        Commands::Check { id, node, index } => {
            commands::check_item(&service, &id, &node, index, handler)?
        }
        Commands::Watch {
            id,
            remote,
            interval_ms,
        } => {
            let interval = interval_ms
                .map(std::time::Duration::from_millis)
                .unwrap_or_else(|| config.poll_interval());
            let source =
                commands::snapshot_source(service, remote.as_deref(), config.http_timeout())?;
            commands::watch_with_signals(source, &id, interval, handler).await?;
        }
        Commands::Delete { id } => commands::delete_workflow(&service, &id, handler)?,
        Commands::Staff => commands::list_staff(&config, handler),
        Commands::Templates => commands::list_templates(&catalog, handler),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = match &cli.log_file {
        Some(Some(path)) => Some(path.clone()),
        Some(None) => Some(logging::default_log_path(cli.command.name())?),
        None => None,
    };
    let guard = logging::init_logging(cli.debug, cli.quiet, log_file)?;

    let handler = create_handler(OutputMode::from_flags(cli.json, cli.quiet), cli.debug);

    if let Err(e) = dispatch(cli, &*handler).await {
        tracing::debug!(error = ?e, "Command failed");
        handler.emit(OutputEvent::Error {
            error: format!("{:#}", e),
        });
        drop(guard);
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_interval_must_be_positive() {
        assert!(Cli::try_parse_from(["sitegraph", "watch", "wf-1", "--interval-ms", "0"]).is_err());

        let cli =
            Cli::try_parse_from(["sitegraph", "watch", "wf-1", "--interval-ms", "250"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Watch {
                interval_ms: Some(250),
                ..
            }
        ));
    }
}
