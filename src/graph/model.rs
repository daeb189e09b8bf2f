//! Workflow graph data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Node kind - explicit, never inferred from edges
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Entry point of a run
    #[serde(alias = "entry")]
    Trigger,
    /// Plain unit of work
    Task,
    /// Branches on a true/false outcome
    Decision,
    Milestone,
    /// Sign-off by an assignee
    Approval,
    /// Exit point of a run
    #[serde(alias = "exit")]
    Terminal,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Trigger => "trigger",
            NodeKind::Task => "task",
            NodeKind::Decision => "decision",
            NodeKind::Milestone => "milestone",
            NodeKind::Approval => "approval",
            NodeKind::Terminal => "terminal",
        };
        f.write_str(s)
    }
}

/// Authoritative node status, written only by the execution controller.
///
/// `blocked` is deliberately absent: it is a derived view computed by the
/// resolver and never stored.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum NodeStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Error,
}

impl NodeStatus {
    /// Completed and error end a node's part in the current run
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeStatus::Completed | NodeStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::InProgress => "in-progress",
            NodeStatus::Completed => "completed",
            NodeStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(NodeStatus::Pending),
            "in-progress" => Some(NodeStatus::InProgress),
            "completed" => Some(NodeStatus::Completed),
            "error" => Some(NodeStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Branch tag on an edge leaving a decision node
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Branch {
    #[serde(rename = "true")]
    True,
    #[serde(rename = "false")]
    False,
}

impl Branch {
    pub fn from_bool(value: bool) -> Self {
        if value { Branch::True } else { Branch::False }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "true" | "yes" | "pass" => Some(Branch::True),
            "false" | "no" | "fail" => Some(Branch::False),
            _ => None,
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::True => f.write_str("true"),
            Branch::False => f.write_str("false"),
        }
    }
}

/// One checklist line on a node
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ChecklistItem {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

impl ChecklistItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: false,
        }
    }
}

/// Automation flag consumed by external collaborators (notifications,
/// reports). The engine stores these but never interprets them.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AutomationFlag {
    Enabled(bool),
    Value(String),
}

/// Recorded outcome of an explicit `fail`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct NodeFailure {
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// A unit of work in a workflow graph
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Node {
    /// Unique within the workflow
    #[serde(default)]
    pub id: String,

    pub kind: NodeKind,

    #[serde(default)]
    pub label: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default)]
    pub status: NodeStatus,

    /// External staff id, opaque to the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checklist: Vec<ChecklistItem>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub automation: BTreeMap<String, AutomationFlag>,

    /// Display only, never used for scheduling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,

    /// Display only, never used for scheduling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<NodeFailure>,
}

impl Node {
    /// Create a pending node; an empty id is filled in on insertion
    pub fn new(id: impl Into<String>, kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            description: String::new(),
            status: NodeStatus::Pending,
            assignee: None,
            checklist: Vec::new(),
            automation: BTreeMap::new(),
            starts_at: None,
            deadline: None,
            failure: None,
        }
    }

    pub fn trigger(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Trigger, label)
    }

    pub fn task(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Task, label)
    }

    pub fn decision(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Decision, label)
    }

    pub fn terminal(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Terminal, label)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_checklist<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.checklist = items.into_iter().map(ChecklistItem::new).collect();
        self
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_decision(&self) -> bool {
        self.kind == NodeKind::Decision
    }

    /// Fraction of checklist items ticked, if the node has a checklist
    pub fn checklist_progress(&self) -> Option<(usize, usize)> {
        if self.checklist.is_empty() {
            return None;
        }
        let done = self.checklist.iter().filter(|i| i.completed).count();
        Some((done, self.checklist.len()))
    }
}

/// Directed dependency between two nodes
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct Edge {
    pub source: String,
    pub target: String,

    /// Only present on edges leaving a decision node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<Branch>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            branch: None,
        }
    }

    pub fn branch(source: impl Into<String>, target: impl Into<String>, branch: Branch) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            branch: Some(branch),
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)?;
        if let Some(branch) = self.branch {
            write!(f, " [{}]", branch)?;
        }
        Ok(())
    }
}

/// Lifecycle of a workflow run
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    /// Nothing in progress and a terminal node completed
    Completed,
    /// Nothing in progress and no terminal node completed
    Halted,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Halted => "halted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(RunState::Idle),
            "running" => Some(RunState::Running),
            "completed" => Some(RunState::Completed),
            "halted" => Some(RunState::Halted),
            _ => None,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A workflow document: exclusive owner of its nodes and edges
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Workflow {
    /// Persistence identity, assigned on first save
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub name: String,

    /// Optimistic concurrency token, bumped by every save
    #[serde(default)]
    pub version: u64,

    #[serde(default)]
    pub run_state: RunState,

    /// Number of runs started on this document
    #[serde(default)]
    pub run: u32,

    #[serde(default)]
    pub(crate) nodes: Vec<Node>,

    #[serde(default)]
    pub(crate) edges: Vec<Edge>,
}

impl Workflow {
    /// Create an empty, unsaved workflow
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn display_id(&self) -> &str {
        self.id.as_deref().unwrap_or("<unsaved>")
    }

    /// True while at least one node is actively running
    pub fn has_active_nodes(&self) -> bool {
        self.nodes.iter().any(|n| n.status == NodeStatus::InProgress)
    }

    /// Ids of nodes with the given status, in insertion order
    pub fn nodes_with_status(&self, status: NodeStatus) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.status == status)
            .map(|n| n.id.as_str())
            .collect()
    }
}
