//! Output handlers for CLI commands
//!
//! Supports console (pretty), JSON, and quiet output modes.

use crate::config::{StaffConfig, TemplateConfig};
use crate::graph::{NodeKind, NodeStatus, RunState};
use crate::store::{TransitionRecord, WorkflowSummary};
use crate::sync::{StopReason, SyncOutcome};
use crate::workflow::{Advance, DisplayStatus, Snapshot, StatusCounts};
use serde::Serialize;

/// Output mode for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Console,
    Json,
    Quiet,
}

impl OutputMode {
    /// Pick a mode from the global flags; `--json` wins over `--quiet`
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if json {
            Self::Json
        } else if quiet {
            Self::Quiet
        } else {
            Self::Console
        }
    }
}

/// One row of the node table
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NodeRow {
    pub id: String,
    pub kind: NodeKind,
    pub label: String,
    pub status: DisplayStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub waiting_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checklist: Option<(usize, usize)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// A status change, as reported to the user
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TransitionRow {
    pub node: String,
    pub from: NodeStatus,
    pub to: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A catalog entry, as listed by `templates`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TemplateRow {
    pub key: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub nodes: usize,
}

/// Events emitted by commands
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum OutputEvent {
    Created {
        id: String,
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        template: Option<String>,
        nodes: usize,
    },
    Snapshot {
        id: String,
        name: String,
        version: u64,
        run: u32,
        run_state: RunState,
        counts: StatusCounts,
        nodes: Vec<NodeRow>,
    },
    Transitions {
        workflow: String,
        transitions: Vec<TransitionRow>,
    },
    History {
        workflow: String,
        records: Vec<TransitionRecord>,
    },
    WorkflowList {
        workflows: Vec<WorkflowSummary>,
    },
    Staff {
        staff: Vec<StaffConfig>,
    },
    Templates {
        templates: Vec<TemplateRow>,
    },
    SyncUpdate {
        workflow: String,
        version: u64,
        counts: StatusCounts,
    },
    SyncStopped {
        workflow: String,
        ticks: u32,
        replacements: u32,
        failures: u32,
        reason: String,
    },
    Deleted {
        id: String,
    },
    Info {
        message: String,
    },
    Error {
        error: String,
    },
}

impl OutputEvent {
    /// Node table for a snapshot
    pub fn snapshot(snapshot: &Snapshot) -> Self {
        let workflow = &snapshot.workflow;
        let nodes = workflow
            .nodes()
            .iter()
            .map(|node| {
                let view = snapshot.view(&node.id);
                NodeRow {
                    id: node.id.clone(),
                    kind: node.kind,
                    label: node.label.clone(),
                    status: view.map(|v| v.display).unwrap_or(DisplayStatus::Pending),
                    assignee: node.assignee.clone(),
                    waiting_on: view.map(|v| v.waiting_on.clone()).unwrap_or_default(),
                    checklist: node.checklist_progress(),
                    failure: node.failure.as_ref().map(|f| f.reason.clone()),
                }
            })
            .collect();

        Self::Snapshot {
            id: workflow.display_id().to_string(),
            name: workflow.name.clone(),
            version: workflow.version,
            run: workflow.run,
            run_state: workflow.run_state,
            counts: snapshot.status_counts(),
            nodes,
        }
    }

    pub fn transitions(workflow: &str, advance: &Advance) -> Self {
        Self::Transitions {
            workflow: workflow.to_string(),
            transitions: advance
                .transitions
                .iter()
                .map(|t| TransitionRow {
                    node: t.node.clone(),
                    from: t.from,
                    to: t.to,
                    detail: t.detail.clone(),
                })
                .collect(),
        }
    }

    pub fn templates(templates: &[TemplateConfig]) -> Self {
        Self::Templates {
            templates: templates
                .iter()
                .map(|t| TemplateRow {
                    key: t.key.clone(),
                    description: t.description.clone(),
                    keywords: t.keywords.clone(),
                    nodes: t.nodes.len(),
                })
                .collect(),
        }
    }

    pub fn sync_stopped(workflow: &str, outcome: &SyncOutcome) -> Self {
        let reason = match outcome.stop {
            StopReason::Settled => "settled",
            StopReason::Cancelled => "cancelled",
        };
        Self::SyncStopped {
            workflow: workflow.to_string(),
            ticks: outcome.ticks,
            replacements: outcome.replacements,
            failures: outcome.failures,
            reason: reason.to_string(),
        }
    }
}

/// Output handler trait
pub trait OutputHandler: Send + Sync {
    /// Emit an event
    fn emit(&self, event: OutputEvent);
}

/// Console output handler
pub struct ConsoleHandler {
    debug: bool,
}

impl ConsoleHandler {
    /// Create a new console handler
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    fn status_marker(status: DisplayStatus) -> &'static str {
        match status {
            DisplayStatus::Pending => " ",
            DisplayStatus::Blocked => "·",
            DisplayStatus::InProgress => "▶",
            DisplayStatus::Completed => "✓",
            DisplayStatus::Error => "✗",
        }
    }

    fn format_counts(counts: &StatusCounts) -> String {
        format!(
            "{} pending, {} blocked, {} in progress, {} completed, {} error",
            counts.pending, counts.blocked, counts.in_progress, counts.completed, counts.error
        )
    }

    fn format_row(row: &NodeRow) -> String {
        let mut line = format!(
            "  {} {:<14} {:<10} {:<12} {}",
            Self::status_marker(row.status),
            row.id,
            row.kind.to_string(),
            row.status.to_string(),
            row.label
        );
        if let Some((done, total)) = row.checklist {
            line.push_str(&format!(" [{}/{}]", done, total));
        }
        if let Some(ref assignee) = row.assignee {
            line.push_str(&format!(" @{}", assignee));
        }
        if !row.waiting_on.is_empty() {
            line.push_str(&format!(" (waiting on {})", row.waiting_on.join(", ")));
        }
        if let Some(ref reason) = row.failure {
            line.push_str(&format!(" - {}", reason));
        }
        line
    }
}

impl OutputHandler for ConsoleHandler {
    fn emit(&self, event: OutputEvent) {
        match event {
            OutputEvent::Created {
                id,
                name,
                template,
                nodes,
            } => match template {
                Some(template) => println!(
                    "Created '{}' ({}) from template '{}' ({} nodes)",
                    name, id, template, nodes
                ),
                None => println!("Created '{}' ({}) with {} nodes", name, id, nodes),
            },
            OutputEvent::Snapshot {
                id,
                name,
                version,
                run,
                run_state,
                counts,
                nodes,
            } => {
                println!(
                    "{} ({}) - {}, run {}, version {}",
                    name, id, run_state, run, version
                );
                for row in &nodes {
                    println!("{}", Self::format_row(row));
                }
                println!("  {}", Self::format_counts(&counts));
            }
            OutputEvent::Transitions {
                workflow,
                transitions,
            } => {
                if transitions.is_empty() {
                    println!("No status changes in {}", workflow);
                }
                for t in transitions {
                    match t.detail {
                        Some(detail) => {
                            println!("  {}: {} -> {} ({})", t.node, t.from, t.to, detail)
                        }
                        None => println!("  {}: {} -> {}", t.node, t.from, t.to),
                    }
                }
            }
            OutputEvent::History { workflow, records } => {
                println!("History of {}:", workflow);
                for r in records {
                    println!(
                        "  [run {}] {} {}: {} -> {}",
                        r.run, r.at, r.node, r.from, r.to
                    );
                }
            }
            OutputEvent::WorkflowList { workflows } => {
                if workflows.is_empty() {
                    println!("(no workflows stored)");
                }
                for w in workflows {
                    println!(
                        "{}  {:<24} {:<10} v{}  {}",
                        w.id,
                        w.name,
                        w.run_state.to_string(),
                        w.version,
                        w.updated_at
                    );
                }
            }
            OutputEvent::Staff { staff } => {
                if staff.is_empty() {
                    println!("(no staff configured)");
                }
                for s in staff {
                    let active = if s.active { "✓" } else { "✗" };
                    match s.role {
                        Some(role) => println!("{} {} - {} ({})", active, s.id, s.name, role),
                        None => println!("{} {} - {}", active, s.id, s.name),
                    }
                }
            }
            OutputEvent::Templates { templates } => {
                for t in templates {
                    println!("{} ({} nodes)", t.key, t.nodes);
                    if !t.description.is_empty() {
                        println!("  {}", t.description);
                    }
                    if !t.keywords.is_empty() {
                        println!("  keywords: {}", t.keywords.join(", "));
                    }
                }
            }
            OutputEvent::SyncUpdate {
                workflow,
                version,
                counts,
            } => {
                eprintln!(
                    "[{} v{}] {}",
                    workflow,
                    version,
                    Self::format_counts(&counts)
                );
            }
            OutputEvent::SyncStopped {
                workflow,
                ticks,
                replacements,
                failures,
                reason,
            } => {
                eprintln!(
                    "Stopped watching {} ({}): {} polls, {} updates, {} failed reads",
                    workflow, reason, ticks, replacements, failures
                );
            }
            OutputEvent::Deleted { id } => {
                println!("Deleted {}", id);
            }
            OutputEvent::Info { message } => {
                eprintln!("{}", message);
            }
            OutputEvent::Error { error } => {
                eprintln!("Error: {}", error);
                if self.debug {
                    eprintln!("  (see log output above for details)");
                }
            }
        }
    }
}

/// JSON output handler
pub struct JsonHandler {
    pretty: bool,
}

impl JsonHandler {
    /// Create a new JSON handler
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn print_json<T: Serialize>(&self, value: &T) {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };

        if let Ok(s) = json {
            println!("{}", s);
        }
    }
}

impl OutputHandler for JsonHandler {
    fn emit(&self, event: OutputEvent) {
        self.print_json(&event);
    }
}

/// Quiet handler: only errors
pub struct QuietHandler;

impl OutputHandler for QuietHandler {
    fn emit(&self, event: OutputEvent) {
        if let OutputEvent::Error { error } = event {
            eprintln!("Error: {}", error);
        }
    }
}

/// Create an output handler based on mode
pub fn create_handler(mode: OutputMode, debug: bool) -> Box<dyn OutputHandler> {
    match mode {
        OutputMode::Console => Box::new(ConsoleHandler::new(debug)),
        OutputMode::Json => Box::new(JsonHandler::new(true)),
        OutputMode::Quiet => Box::new(QuietHandler),
    }
}
