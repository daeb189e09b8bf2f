//! Execution controller - the run/advance state machine
//!
//! The controller is the only writer of node status. It moves nodes between
//! `pending`, `in-progress`, `completed` and `error`, and asks the resolver
//! whether a successor may start.

use super::resolver::resolve;
use super::service::Lease;
use super::snapshot::Snapshot;
use crate::error::EngineError;
use crate::graph::{Branch, NodeFailure, NodeKind, NodeStatus, RunState, Workflow};
use serde::{Deserialize, Serialize};

/// A single status change
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Transition {
    pub node: String,
    pub from: NodeStatus,
    pub to: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Everything one controller call changed
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Advance {
    pub transitions: Vec<Transition>,
}

impl Advance {
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Nodes that entered `in-progress` during this call
    pub fn activated(&self) -> Vec<&str> {
        self.transitions
            .iter()
            .filter(|t| t.to == NodeStatus::InProgress)
            .map(|t| t.node.as_str())
            .collect()
    }

    /// Nodes demoted to `pending` by rework
    pub fn reset(&self) -> Vec<&str> {
        self.transitions
            .iter()
            .filter(|t| t.to == NodeStatus::Pending)
            .map(|t| t.node.as_str())
            .collect()
    }
}

/// Drives one workflow through a run. Holds the workflow exclusively.
#[derive(Debug)]
pub struct ExecutionController {
    workflow: Workflow,
    _lease: Option<Lease>,
}

impl ExecutionController {
    /// Create a controller with no lease (tests, one-off tooling)
    pub fn new(workflow: Workflow) -> Self {
        Self {
            workflow,
            _lease: None,
        }
    }

    pub(crate) fn with_lease(workflow: Workflow, lease: Lease) -> Self {
        Self {
            workflow,
            _lease: Some(lease),
        }
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Mutable access for structural edits between runs
    pub fn workflow_mut(&mut self) -> &mut Workflow {
        &mut self.workflow
    }

    /// Give the workflow back, releasing the lease
    pub fn into_workflow(self) -> Workflow {
        self.workflow
    }

    pub fn is_running(&self) -> bool {
        self.workflow.run_state == RunState::Running
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.workflow.clone())
    }

    /// Start a new run by activating every entry point.
    ///
    /// Calling this on a running workflow changes nothing and returns an
    /// empty advance.
    pub fn start(&mut self) -> Result<Advance, EngineError> {
        let mut advance = Advance::default();

        if self.is_running() {
            tracing::info!(workflow = %self.workflow.name, "Workflow already running, start ignored");
            return Ok(advance);
        }

        self.workflow.validate().map_err(|errors| {
            EngineError::invalid_reference(format!(
                "workflow '{}' is malformed: {}",
                self.workflow.name,
                errors.join("; ")
            ))
        })?;

        let entries: Vec<String> = self
            .workflow
            .entry_points()
            .iter()
            .map(|n| n.id.clone())
            .collect();
        if entries.is_empty() {
            return Err(EngineError::NoEntryPoint {
                workflow: self.workflow.name.clone(),
            });
        }

        let ids: Vec<String> = self.workflow.nodes().iter().map(|n| n.id.clone()).collect();
        for id in &ids {
            self.set_status(id, NodeStatus::Pending, Some("new run"), &mut advance);
            if let Some(node) = self.workflow.node_mut(id) {
                node.failure = None;
            }
        }

        self.workflow.run += 1;
        self.workflow.run_state = RunState::Running;

        for id in &entries {
            self.set_status(id, NodeStatus::InProgress, Some("entry point"), &mut advance);
        }

        tracing::info!(
            workflow = %self.workflow.name,
            run = self.workflow.run,
            entries = ?entries,
            "Workflow started"
        );

        Ok(advance)
    }

    /// Mark an in-progress node completed and activate the successors it
    /// unblocks. Decision nodes need the branch that was taken; every other
    /// kind must pass `None`.
    pub fn complete(
        &mut self,
        node_id: &str,
        branch: Option<Branch>,
    ) -> Result<Advance, EngineError> {
        let node = self.workflow.require_node(node_id)?;

        if node.status != NodeStatus::InProgress {
            return Err(EngineError::illegal_transition(
                node_id,
                format!("only in-progress nodes can complete (node is {})", node.status),
            ));
        }
        match (node.kind, branch) {
            (NodeKind::Decision, None) => {
                return Err(EngineError::illegal_transition(
                    node_id,
                    "decision nodes must be completed with a true/false branch",
                ));
            }
            (kind, Some(_)) if kind != NodeKind::Decision => {
                return Err(EngineError::illegal_transition(
                    node_id,
                    format!("a branch only applies to decision nodes, not {}", kind),
                ));
            }
            _ => {}
        }

        let mut targets: Vec<String> = Vec::new();
        for edge in self.workflow.outgoing_edges(node_id) {
            let eligible = branch.is_none() || edge.branch == branch;
            if eligible && !targets.contains(&edge.target) {
                targets.push(edge.target.clone());
            }
        }

        let mut advance = Advance::default();
        let detail = branch.map(|b| format!("branch {}", b));
        self.set_status(node_id, NodeStatus::Completed, detail.as_deref(), &mut advance);

        // Successors that already completed are re-entered for rework
        for target in &targets {
            if self.status_of(target) == Some(NodeStatus::Completed) {
                self.reset_from(target, &mut advance);
            }
        }

        // One resolution for every sibling, taken before any activation
        let resolution = resolve(&self.workflow);
        let ready: Vec<&String> = targets
            .iter()
            .filter(|t| self.status_of(t) == Some(NodeStatus::Pending))
            .filter(|t| resolution.is_unblocked(t))
            .collect();

        for target in &targets {
            if !ready.contains(&target) {
                tracing::debug!(
                    workflow = %self.workflow.name,
                    node = %target,
                    waiting_on = ?resolution.view(target).map(|v| &v.waiting_on),
                    "Successor not activated"
                );
            }
        }

        let ready: Vec<String> = ready.into_iter().cloned().collect();
        for target in &ready {
            self.set_status(target, NodeStatus::InProgress, Some("unblocked"), &mut advance);
        }

        self.refresh_run_state();
        Ok(advance)
    }

    /// Mark a node failed. The failure stays local: successors are left as
    /// they are and simply never unblock through this node.
    pub fn fail(&mut self, node_id: &str, reason: &str) -> Result<Advance, EngineError> {
        let node = self.workflow.require_node(node_id)?;
        if node.status.is_terminal() {
            return Err(EngineError::illegal_transition(
                node_id,
                format!("node is already {}", node.status),
            ));
        }

        let mut advance = Advance::default();
        self.set_status(node_id, NodeStatus::Error, Some(reason), &mut advance);
        if let Some(node) = self.workflow.node_mut(node_id) {
            node.failure = Some(NodeFailure {
                reason: reason.to_string(),
                failed_at: chrono::Utc::now(),
            });
        }

        tracing::warn!(workflow = %self.workflow.name, node = node_id, reason, "Node failed");
        self.refresh_run_state();
        Ok(advance)
    }

    /// Explicitly re-open a completed or failed node for rework.
    ///
    /// The node and everything downstream of it that had started or finished
    /// go back to `pending`; the node is then activated if nothing upstream is
    /// outstanding.
    pub fn reactivate(&mut self, node_id: &str) -> Result<Advance, EngineError> {
        let node = self.workflow.require_node(node_id)?;
        if !node.status.is_terminal() {
            return Err(EngineError::illegal_transition(
                node_id,
                format!("only completed or failed nodes can be reworked (node is {})", node.status),
            ));
        }

        let mut advance = Advance::default();
        self.reset_from(node_id, &mut advance);
        self.workflow.run_state = RunState::Running;

        if resolve(&self.workflow).is_unblocked(node_id) {
            self.set_status(node_id, NodeStatus::InProgress, Some("rework"), &mut advance);
        }

        self.refresh_run_state();
        Ok(advance)
    }

    /// Set or clear a node's assignee. Directory checks happen in the service.
    pub fn assign(&mut self, node_id: &str, assignee: Option<String>) -> Result<(), EngineError> {
        self.workflow.require_node(node_id)?;
        if let Some(node) = self.workflow.node_mut(node_id) {
            tracing::debug!(node = node_id, assignee = ?assignee, "Assigned node");
            node.assignee = assignee;
        }
        Ok(())
    }

    /// Flip a checklist item, returning its new state
    pub fn toggle_checklist_item(
        &mut self,
        node_id: &str,
        index: usize,
    ) -> Result<bool, EngineError> {
        self.workflow.require_node(node_id)?;
        let item = self
            .workflow
            .node_mut(node_id)
            .and_then(|n| n.checklist.get_mut(index))
            .ok_or_else(|| {
                EngineError::invalid_reference(format!(
                    "node '{}' has no checklist item {}",
                    node_id, index
                ))
            })?;
        item.completed = !item.completed;
        Ok(item.completed)
    }

    fn status_of(&self, id: &str) -> Option<NodeStatus> {
        self.workflow.node(id).map(|n| n.status)
    }

    /// Demote `id` and every started or finished node downstream of it
    fn reset_from(&mut self, id: &str, advance: &mut Advance) {
        self.set_status(id, NodeStatus::Pending, Some("rework"), advance);
        if let Some(node) = self.workflow.node_mut(id) {
            node.failure = None;
        }

        let mut downstream: Vec<String> = self
            .workflow
            .reachable_from(id)
            .into_iter()
            .filter(|n| n != id)
            .collect();
        downstream.sort();

        for other in downstream {
            if matches!(
                self.status_of(&other),
                Some(NodeStatus::Completed | NodeStatus::InProgress)
            ) {
                self.set_status(&other, NodeStatus::Pending, Some("upstream rework"), advance);
            }
        }
    }

    fn set_status(
        &mut self,
        id: &str,
        to: NodeStatus,
        detail: Option<&str>,
        advance: &mut Advance,
    ) {
        let Some(node) = self.workflow.node_mut(id) else {
            return;
        };
        let from = node.status;
        if from == to {
            return;
        }
        node.status = to;

        tracing::info!(
            workflow = %self.workflow.name,
            node = id,
            from = %from,
            to = %to,
            "Node transition"
        );
        advance.transitions.push(Transition {
            node: id.to_string(),
            from,
            to,
            detail: detail.map(str::to_string),
        });
    }

    fn refresh_run_state(&mut self) {
        if self.workflow.run_state == RunState::Idle {
            return;
        }

        let next = if self.workflow.has_active_nodes() {
            RunState::Running
        } else if self
            .workflow
            .nodes()
            .iter()
            .any(|n| n.kind == NodeKind::Terminal && n.status == NodeStatus::Completed)
        {
            RunState::Completed
        } else {
            RunState::Halted
        };

        if next != self.workflow.run_state {
            tracing::info!(workflow = %self.workflow.name, state = %next, "Run state changed");
            self.workflow.run_state = next;
        }
    }
}
