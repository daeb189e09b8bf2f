//! Status resolution - derives the display status of every node
//!
//! The resolver is a pure function of the graph's edges and each node's
//! recorded status. It never writes to the workflow, so running it twice on
//! the same workflow always gives the same answer.
//!
//! A node is shown as blocked when one of its predecessors has not completed.
//! Loop-back edges (see `Workflow::loop_back_edges`) are ignored: they close a
//! rework loop, such as a decision sending work back upstream, and counting
//! them would make the loop's entry node wait on its own downstream.

use crate::graph::{NodeStatus, Workflow};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// What a node looks like to a reader
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayStatus {
    Pending,
    Blocked,
    InProgress,
    Completed,
    Error,
}

impl fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DisplayStatus::Pending => "pending",
            DisplayStatus::Blocked => "blocked",
            DisplayStatus::InProgress => "in-progress",
            DisplayStatus::Completed => "completed",
            DisplayStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Derived view of one node
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct NodeView {
    pub id: String,

    /// Authoritative status as recorded
    pub status: NodeStatus,

    /// Status to show, with `blocked` derived
    pub display: DisplayStatus,

    /// Predecessors that still have to complete, sorted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub waiting_on: Vec<String>,
}

impl NodeView {
    pub fn is_blocked(&self) -> bool {
        self.display == DisplayStatus::Blocked
    }
}

/// Resolver output for a whole workflow
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    views: BTreeMap<String, NodeView>,
}

impl Resolution {
    pub fn view(&self, id: &str) -> Option<&NodeView> {
        self.views.get(id)
    }

    /// Whether `id` currently waits on an outstanding predecessor.
    /// Unknown ids are reported as blocked.
    pub fn is_blocked(&self, id: &str) -> bool {
        self.views.get(id).is_none_or(NodeView::is_blocked)
    }

    /// Whether every counted predecessor of `id` has completed, regardless of
    /// the node's own status
    pub fn is_unblocked(&self, id: &str) -> bool {
        self.views.get(id).is_some_and(|v| v.waiting_on.is_empty())
    }

    pub fn blocked_set(&self) -> BTreeSet<String> {
        self.views
            .values()
            .filter(|v| v.is_blocked())
            .map(|v| v.id.clone())
            .collect()
    }

    pub fn views(&self) -> impl Iterator<Item = &NodeView> {
        self.views.values()
    }

    pub fn into_views(self) -> Vec<NodeView> {
        self.views.into_values().collect()
    }
}

/// Predecessors of `id` that count for blocking and have not completed
pub fn outstanding_predecessors(workflow: &Workflow, id: &str) -> Vec<String> {
    outstanding_with(workflow, id, &workflow.loop_back_edges())
}

fn outstanding_with(
    workflow: &Workflow,
    id: &str,
    loop_back: &HashSet<(String, String)>,
) -> Vec<String> {
    let outstanding: BTreeSet<String> = workflow
        .incoming_edges(id)
        .filter(|e| !loop_back.contains(&(e.source.clone(), e.target.clone())))
        .filter(|e| {
            workflow
                .node(&e.source)
                .is_some_and(|n| n.status != NodeStatus::Completed)
        })
        .map(|e| e.source.clone())
        .collect();

    outstanding.into_iter().collect()
}

/// Derive the display status of a single node
pub fn resolve_node(workflow: &Workflow, id: &str) -> Option<NodeView> {
    view_with(workflow, id, &workflow.loop_back_edges())
}

fn view_with(
    workflow: &Workflow,
    id: &str,
    loop_back: &HashSet<(String, String)>,
) -> Option<NodeView> {
    let node = workflow.node(id)?;
    let waiting_on = outstanding_with(workflow, id, loop_back);

    let display = match node.status {
        NodeStatus::Completed => DisplayStatus::Completed,
        NodeStatus::InProgress => DisplayStatus::InProgress,
        NodeStatus::Pending | NodeStatus::Error if !waiting_on.is_empty() => DisplayStatus::Blocked,
        NodeStatus::Pending => DisplayStatus::Pending,
        NodeStatus::Error => DisplayStatus::Error,
    };

    Some(NodeView {
        id: node.id.clone(),
        status: node.status,
        display,
        waiting_on,
    })
}

/// Derive the display status of every node
pub fn resolve(workflow: &Workflow) -> Resolution {
    let loop_back = workflow.loop_back_edges();
    let views = workflow
        .nodes()
        .iter()
        .filter_map(|n| view_with(workflow, &n.id, &loop_back))
        .map(|v| (v.id.clone(), v))
        .collect();

    Resolution { views }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Branch, Edge, Node};

    fn join_graph() -> Workflow {
        Workflow::from_parts(
            "join",
            vec![
                Node::trigger("start", "Start"),
                Node::task("a", "Frame walls"),
                Node::task("b", "Run plumbing"),
                Node::task("c", "Close walls"),
            ],
            vec![
                Edge::new("start", "a"),
                Edge::new("start", "b"),
                Edge::new("a", "c"),
                Edge::new("b", "c"),
            ],
        )
        .unwrap()
    }

    fn set(wf: &mut Workflow, id: &str, status: NodeStatus) {
        wf.node_mut(id).unwrap().status = status;
    }

    #[test]
    fn test_blocked_lists_outstanding_predecessors() {
        let mut wf = join_graph();
        set(&mut wf, "start", NodeStatus::Completed);
        set(&mut wf, "a", NodeStatus::Completed);

        let view = resolve_node(&wf, "c").unwrap();
        assert_eq!(view.display, DisplayStatus::Blocked);
        assert_eq!(view.waiting_on, vec!["b".to_string()]);

        set(&mut wf, "b", NodeStatus::Completed);
        let view = resolve_node(&wf, "c").unwrap();
        assert_eq!(view.display, DisplayStatus::Pending);
        assert!(view.waiting_on.is_empty());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut wf = join_graph();
        set(&mut wf, "start", NodeStatus::Completed);
        set(&mut wf, "a", NodeStatus::InProgress);

        let first = resolve(&wf);
        let second = resolve(&wf);
        assert_eq!(first, second);
        assert_eq!(first.blocked_set(), second.blocked_set());
        assert_eq!(
            first.blocked_set().into_iter().collect::<Vec<_>>(),
            vec!["c".to_string()]
        );
    }

    #[test]
    fn test_started_nodes_never_shown_blocked() {
        let mut wf = join_graph();
        // Predecessors regressed while the node was already running/finished
        set(&mut wf, "c", NodeStatus::InProgress);
        assert_eq!(
            resolve_node(&wf, "c").unwrap().display,
            DisplayStatus::InProgress
        );

        set(&mut wf, "c", NodeStatus::Completed);
        assert_eq!(
            resolve_node(&wf, "c").unwrap().display,
            DisplayStatus::Completed
        );
    }

    #[test]
    fn test_error_node_can_show_blocked() {
        let mut wf = join_graph();
        set(&mut wf, "c", NodeStatus::Error);
        assert_eq!(resolve_node(&wf, "c").unwrap().display, DisplayStatus::Blocked);

        for id in ["start", "a", "b"] {
            set(&mut wf, id, NodeStatus::Completed);
        }
        assert_eq!(resolve_node(&wf, "c").unwrap().display, DisplayStatus::Error);
    }

    #[test]
    fn test_loop_back_edges_do_not_block() {
        let mut wf = Workflow::from_parts(
            "loop",
            vec![
                Node::trigger("start", "Start"),
                Node::decision("inspect", "Inspect"),
                Node::task("fix", "Fix"),
                Node::terminal("finish", "Finish"),
            ],
            vec![
                Edge::new("start", "inspect"),
                Edge::branch("inspect", "finish", Branch::True),
                Edge::branch("inspect", "fix", Branch::False),
                Edge::new("fix", "inspect"),
            ],
        )
        .unwrap();

        let view = resolve_node(&wf, "inspect").unwrap();
        assert_eq!(view.waiting_on, vec!["start".to_string()]);
        // The forward edge into the loop still counts
        let view = resolve_node(&wf, "fix").unwrap();
        assert_eq!(view.waiting_on, vec!["inspect".to_string()]);

        set(&mut wf, "start", NodeStatus::Completed);
        let resolution = resolve(&wf);
        assert!(!resolution.is_blocked("inspect"));
        assert!(resolution.is_blocked("fix"));
        assert!(resolution.is_blocked("finish"));
    }

    #[test]
    fn test_unknown_node_is_blocked() {
        let resolution = resolve(&join_graph());
        assert!(resolution.is_blocked("ghost"));
        assert!(!resolution.is_unblocked("ghost"));
        assert!(resolution.is_unblocked("start"));
    }
}
