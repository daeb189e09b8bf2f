//! Snapshot - the read model handed to clients

use super::resolver::{NodeView, resolve};
use crate::graph::{NodeStatus, Workflow};
use serde::{Deserialize, Serialize};

/// Full state of a workflow at one instant, with derived node views.
///
/// Equality is structural over the whole document, which is what the
/// synchronization layer compares. Views are a function of the document, so
/// they never make two equal documents compare unequal.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Snapshot {
    pub workflow: Workflow,
    pub views: Vec<NodeView>,
}

impl Snapshot {
    pub fn new(workflow: Workflow) -> Self {
        let views = resolve(&workflow).into_views();
        Self { workflow, views }
    }

    pub fn id(&self) -> Option<&str> {
        self.workflow.id.as_deref()
    }

    pub fn version(&self) -> u64 {
        self.workflow.version
    }

    /// True while at least one node is running; drives polling
    pub fn is_active(&self) -> bool {
        self.workflow.has_active_nodes()
    }

    pub fn view(&self, id: &str) -> Option<&NodeView> {
        self.views.iter().find(|v| v.id == id)
    }

    /// Count of nodes per recorded status
    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for node in self.workflow.nodes() {
            match node.status {
                NodeStatus::Pending => counts.pending += 1,
                NodeStatus::InProgress => counts.in_progress += 1,
                NodeStatus::Completed => counts.completed += 1,
                NodeStatus::Error => counts.error += 1,
            }
        }
        counts.blocked = self.views.iter().filter(|v| v.is_blocked()).count();
        counts
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub blocked: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub error: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node};

    fn workflow() -> Workflow {
        Workflow::from_parts(
            "snap",
            vec![
                Node::trigger("start", "Start").with_status(NodeStatus::InProgress),
                Node::task("a", "A"),
            ],
            vec![Edge::new("start", "a")],
        )
        .unwrap()
    }

    #[test]
    fn test_snapshot_views() {
        let snapshot = Snapshot::new(workflow());
        assert!(snapshot.is_active());
        assert!(snapshot.view("a").unwrap().is_blocked());

        let counts = snapshot.status_counts();
        assert_eq!(counts.in_progress, 1);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.blocked, 1);
    }

    #[test]
    fn test_snapshot_equality_is_structural() {
        let a = Snapshot::new(workflow());
        let b = Snapshot::new(workflow());
        assert_eq!(a, b);

        let mut changed = workflow();
        changed.node_mut("start").unwrap().status = NodeStatus::Completed;
        assert_ne!(a, Snapshot::new(changed));
    }

    #[test]
    fn test_snapshot_json_round_trip() {
        let snapshot = Snapshot::new(workflow());
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, back);
    }
}
