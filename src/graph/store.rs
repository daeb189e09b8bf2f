//! Graph store operations on a workflow
//!
//! All structural mutation goes through these methods. Each one checks its
//! preconditions before touching the node or edge lists, so a rejected call
//! leaves the workflow exactly as it was.

use super::model::{Branch, Edge, Node, NodeKind, Workflow};
use crate::error::EngineError;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

impl Workflow {
    /// Build a workflow from parts, checking every insertion
    pub fn from_parts(
        name: impl Into<String>,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
    ) -> Result<Self, EngineError> {
        let mut workflow = Workflow::new(name);
        for node in nodes {
            workflow.add_node(node)?;
        }
        for edge in edges {
            workflow.add_edge(edge)?;
        }
        Ok(workflow)
    }

    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Look up a node or fail with `InvalidReference`
    pub fn require_node(&self, id: &str) -> Result<&Node, EngineError> {
        self.node(id).ok_or_else(|| {
            EngineError::invalid_reference(format!(
                "node '{}' does not exist in workflow '{}'",
                id, self.name
            ))
        })
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    /// Edges pointing at `id`
    pub fn incoming_edges<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.target == id)
    }

    /// Edges leaving `id`
    pub fn outgoing_edges<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source == id)
    }

    /// Insert a node, generating an id if it has none. Returns the id.
    pub fn add_node(&mut self, mut node: Node) -> Result<String, EngineError> {
        if node.id.trim().is_empty() {
            node.id = generate_node_id(node.kind);
        }
        if self.contains_node(&node.id) {
            return Err(EngineError::invalid_reference(format!(
                "node id '{}' already exists",
                node.id
            )));
        }

        let id = node.id.clone();
        tracing::debug!(workflow = %self.name, node = %id, kind = %node.kind, "Added node");
        self.nodes.push(node);
        Ok(id)
    }

    /// Insert an edge. Both endpoints must exist, and the branch tag must
    /// match the kind of the source node.
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), EngineError> {
        self.check_edge(&edge)?;
        tracing::debug!(workflow = %self.name, edge = %edge, "Added edge");
        self.edges.push(edge);
        Ok(())
    }

    fn check_edge(&self, edge: &Edge) -> Result<(), EngineError> {
        let source = self.node(&edge.source).ok_or_else(|| {
            EngineError::invalid_reference(format!(
                "edge {} has unknown source '{}'",
                edge, edge.source
            ))
        })?;
        if !self.contains_node(&edge.target) {
            return Err(EngineError::invalid_reference(format!(
                "edge {} has unknown target '{}'",
                edge, edge.target
            )));
        }
        if edge.source == edge.target {
            return Err(EngineError::invalid_reference(format!(
                "edge {} points a node at itself",
                edge
            )));
        }
        if self
            .edges
            .iter()
            .any(|e| e.source == edge.source && e.target == edge.target)
        {
            return Err(EngineError::invalid_reference(format!(
                "edge {} -> {} already exists",
                edge.source, edge.target
            )));
        }

        match (source.kind, edge.branch) {
            (NodeKind::Decision, None) => Err(EngineError::invalid_reference(format!(
                "edge {} leaves decision '{}' without a true/false branch",
                edge, source.id
            ))),
            (kind, Some(_)) if kind != NodeKind::Decision => {
                Err(EngineError::invalid_reference(format!(
                    "edge {} carries a branch but '{}' is a {} node",
                    edge, source.id, kind
                )))
            }
            _ => Ok(()),
        }
    }

    /// Remove a node and every edge touching it
    pub fn remove_node(&mut self, id: &str) -> Result<Node, EngineError> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| {
                EngineError::invalid_reference(format!("cannot remove unknown node '{}'", id))
            })?;

        let before = self.edges.len();
        self.edges.retain(|e| e.source != id && e.target != id);
        let node = self.nodes.remove(index);

        tracing::debug!(
            workflow = %self.name,
            node = id,
            edges_removed = before - self.edges.len(),
            "Removed node"
        );
        Ok(node)
    }

    /// Remove the edge between two nodes
    pub fn remove_edge(&mut self, source: &str, target: &str) -> Result<Edge, EngineError> {
        let index = self
            .edges
            .iter()
            .position(|e| e.source == source && e.target == target)
            .ok_or_else(|| {
                EngineError::invalid_reference(format!(
                    "no edge {} -> {} to remove",
                    source, target
                ))
            })?;
        Ok(self.edges.remove(index))
    }

    /// Distinct source ids of edges pointing at `id`
    pub fn predecessors<'a>(&'a self, id: &'a str) -> Vec<&'a str> {
        let mut seen = HashSet::new();
        self.incoming_edges(id)
            .map(|e| e.source.as_str())
            .filter(|s| seen.insert(*s))
            .collect()
    }

    /// Every node reachable from `id` by following edges forward.
    /// `id` itself is included only when it sits on a cycle.
    pub fn reachable_from(&self, id: &str) -> HashSet<String> {
        let mut reached: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<&str> = self.outgoing_edges(id).map(|e| e.target.as_str()).collect();

        while let Some(current) = queue.pop_front() {
            if !reached.insert(current.to_string()) {
                continue;
            }
            for edge in self.outgoing_edges(current) {
                if !reached.contains(edge.target.as_str()) {
                    queue.push_back(edge.target.as_str());
                }
            }
        }

        reached
    }

    /// Edges that close a cycle, as `(source, target)` pairs.
    ///
    /// Depends only on the set of nodes and edges, never on their order:
    ///
    /// 1. Nodes are ranked topologically over the unconditional edges (ties
    ///    and unconditional cycles broken by id).
    /// 2. A depth-first walk starts at the entry points, then at any node not
    ///    yet visited, in rank order. Each node's unconditional children come
    ///    before its branch children, each group in rank order.
    /// 3. An edge is a loop-back edge when its target is still open on the
    ///    walk's stack.
    ///
    /// Where two edges could close the same cycle, the walk reaches the
    /// unconditional path first, so a decision branch back into the loop is
    /// the one classified as loop-back.
    pub fn loop_back_edges(&self) -> HashSet<(String, String)> {
        let ids: BTreeSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        let edges: Vec<&Edge> = self
            .edges
            .iter()
            .filter(|e| ids.contains(e.source.as_str()) && ids.contains(e.target.as_str()))
            .collect();
        let entries: BTreeSet<&str> = self.entry_points().into_iter().map(|n| n.id.as_str()).collect();

        // Rank over unconditional edges, with their own cycles cut
        let mut plain: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in edges.iter().filter(|e| e.branch.is_none()) {
            plain.entry(edge.source.as_str()).or_default().push(edge.target.as_str());
        }
        for targets in plain.values_mut() {
            targets.sort_unstable();
            targets.dedup();
        }
        let roots: Vec<&str> = entries.iter().chain(ids.iter()).copied().collect();
        let plain_back = depth_first_back_edges(&roots, &plain);
        let rank = topological_rank(&ids, &plain, &plain_back);
        let order = |id: &str| (rank.get(id).copied().unwrap_or(usize::MAX), id.to_string());

        let mut children: HashMap<&str, Vec<(bool, &str)>> = HashMap::new();
        for edge in &edges {
            children
                .entry(edge.source.as_str())
                .or_default()
                .push((edge.branch.is_some(), edge.target.as_str()));
        }
        let children: HashMap<&str, Vec<&str>> = children
            .into_iter()
            .map(|(source, mut targets)| {
                targets.sort_by_key(|&(branch, target)| (branch, order(target)));
                let mut seen = HashSet::new();
                let targets: Vec<&str> = targets
                    .into_iter()
                    .map(|(_, target)| target)
                    .filter(|target| seen.insert(*target))
                    .collect();
                (source, targets)
            })
            .collect();

        let mut ranked_entries: Vec<&str> = entries.iter().copied().collect();
        ranked_entries.sort_by_key(|&id| order(id));
        let mut ranked_nodes: Vec<&str> = ids.iter().copied().collect();
        ranked_nodes.sort_by_key(|&id| order(id));
        let roots: Vec<&str> = ranked_entries.into_iter().chain(ranked_nodes).collect();

        depth_first_back_edges(&roots, &children)
            .into_iter()
            .map(|(source, target)| (source.to_string(), target.to_string()))
            .collect()
    }

    /// Trigger nodes with no incoming edges
    pub fn entry_points(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Trigger && self.incoming_edges(&n.id).next().is_none())
            .collect()
    }

    /// Check every structural invariant. Used on documents that did not
    /// arrive through `add_node`/`add_edge` (imports, loads).
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                errors.push(format!("node '{}' has an empty id", node.label));
            } else if !seen.insert(node.id.as_str()) {
                errors.push(format!("duplicate node id: {}", node.id));
            }
        }

        let mut pairs = HashSet::new();
        for edge in &self.edges {
            let source = self.node(&edge.source);
            if source.is_none() {
                errors.push(format!("edge {} has unknown source '{}'", edge, edge.source));
            }
            if !self.contains_node(&edge.target) {
                errors.push(format!("edge {} has unknown target '{}'", edge, edge.target));
            }
            if edge.source == edge.target {
                errors.push(format!("edge {} points a node at itself", edge));
            }
            if !pairs.insert((edge.source.as_str(), edge.target.as_str())) {
                errors.push(format!("duplicate edge {} -> {}", edge.source, edge.target));
            }
            if let Some(source) = source {
                match (source.is_decision(), edge.branch) {
                    (true, None) => {
                        errors.push(format!("decision edge {} is missing a branch", edge))
                    }
                    (false, Some(_)) => errors.push(format!(
                        "edge {} carries a branch but '{}' is a {} node",
                        edge, source.id, source.kind
                    )),
                    _ => {}
                }
            }
        }

        for node in self.nodes.iter().filter(|n| n.is_decision()) {
            for branch in [Branch::True, Branch::False] {
                if !self
                    .outgoing_edges(&node.id)
                    .any(|e| e.branch == Some(branch))
                {
                    errors.push(format!(
                        "decision '{}' has no '{}' branch",
                        node.id, branch
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn generate_node_id(kind: NodeKind) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", kind, &uuid[..8])
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Open,
    Done,
}

/// Iterative DFS over `children`, visiting roots and children in the order
/// given. Returns edges whose target was open on the stack.
fn depth_first_back_edges<'a>(
    roots: &[&'a str],
    children: &HashMap<&'a str, Vec<&'a str>>,
) -> HashSet<(&'a str, &'a str)> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut back = HashSet::new();
    let no_children: Vec<&str> = Vec::new();

    for &root in roots {
        if marks.contains_key(root) {
            continue;
        }
        marks.insert(root, Mark::Open);
        let mut stack: Vec<(&str, usize)> = vec![(root, 0)];

        while let Some(&(node, next)) = stack.last() {
            let kids = children.get(node).unwrap_or(&no_children);
            match kids.get(next).copied() {
                Some(child) => {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    match marks.get(child).copied() {
                        None => {
                            marks.insert(child, Mark::Open);
                            stack.push((child, 0));
                        }
                        Some(Mark::Open) => {
                            back.insert((node, child));
                        }
                        Some(Mark::Done) => {}
                    }
                }
                None => {
                    marks.insert(node, Mark::Done);
                    stack.pop();
                }
            }
        }
    }

    back
}

/// Kahn's algorithm over `children` minus `cut`, ties broken by id
fn topological_rank<'a>(
    ids: &BTreeSet<&'a str>,
    children: &HashMap<&'a str, Vec<&'a str>>,
    cut: &HashSet<(&'a str, &'a str)>,
) -> HashMap<&'a str, usize> {
    let mut in_degree: HashMap<&'a str, usize> = ids.iter().map(|id| (*id, 0)).collect();
    for (source, targets) in children {
        for target in targets {
            if !cut.contains(&(*source, *target)) {
                *in_degree.entry(*target).or_default() += 1;
            }
        }
    }

    let mut ready: BTreeSet<&'a str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut rank = HashMap::new();

    while let Some(id) = ready.pop_first() {
        rank.insert(id, rank.len());
        for target in children.get(id).into_iter().flatten() {
            if cut.contains(&(id, *target)) {
                continue;
            }
            if let Some(degree) = in_degree.get_mut(target) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(*target);
                }
            }
        }
    }

    rank
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::model::NodeStatus;

    fn linear() -> Workflow {
        Workflow::from_parts(
            "linear",
            vec![
                Node::trigger("start", "Start"),
                Node::task("pour", "Pour slab"),
                Node::terminal("done", "Done"),
            ],
            vec![Edge::new("start", "pour"), Edge::new("pour", "done")],
        )
        .unwrap()
    }

    #[test]
    fn test_add_node_generates_id() {
        let mut wf = Workflow::new("test");
        let id = wf.add_node(Node::task("", "Unnamed")).unwrap();
        assert!(id.starts_with("task-"));
        assert!(wf.contains_node(&id));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut wf = linear();
        let err = wf.add_node(Node::task("pour", "Again")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidReference { .. }));
        assert_eq!(wf.nodes().len(), 3);
    }

    #[test]
    fn test_edge_to_missing_node_rejected() {
        let mut wf = linear();
        let err = wf.add_edge(Edge::new("pour", "ghost")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidReference { .. }));
        assert!(err.to_string().contains("ghost"));
        assert_eq!(wf.edges().len(), 2);
    }

    #[test]
    fn test_branch_tag_rules() {
        let mut wf = linear();
        wf.add_node(Node::decision("check", "Check")).unwrap();

        // Decision edges need a branch
        assert!(wf.add_edge(Edge::new("check", "done")).is_err());
        // Non-decision edges must not carry one
        assert!(
            wf.add_edge(Edge::branch("pour", "check", Branch::True))
                .is_err()
        );

        wf.add_edge(Edge::branch("check", "done", Branch::True)).unwrap();
        assert_eq!(wf.outgoing_edges("check").count(), 1);
    }

    #[test]
    fn test_remove_node_cascades() {
        let mut wf = linear();
        let removed = wf.remove_node("pour").unwrap();
        assert_eq!(removed.id, "pour");
        assert!(wf.edges().is_empty());
        assert!(wf.validate().is_ok());
    }

    #[test]
    fn test_remove_unknown_node() {
        let mut wf = linear();
        assert!(wf.remove_node("ghost").is_err());
        assert_eq!(wf.nodes().len(), 3);
    }

    #[test]
    fn test_accessors() {
        let wf = linear();
        assert_eq!(wf.incoming_edges("pour").count(), 1);
        assert_eq!(wf.outgoing_edges("pour").count(), 1);
        assert_eq!(wf.predecessors("done"), vec!["pour"]);
        assert_eq!(wf.node("start").map(|n| n.kind), Some(NodeKind::Trigger));
        assert_eq!(wf.entry_points().len(), 1);
    }

    #[test]
    fn test_reachable_from_with_cycle() {
        let wf = Workflow::from_parts(
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

        let from_inspect = wf.reachable_from("inspect");
        assert!(from_inspect.contains("fix"));
        assert!(from_inspect.contains("finish"));
        assert!(from_inspect.contains("inspect"));
        assert!(!from_inspect.contains("start"));

        let from_finish = wf.reachable_from("finish");
        assert!(from_finish.is_empty());
    }

    #[test]
    fn test_loop_back_edges() {
        let wf = Workflow::from_parts(
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

        let back = wf.loop_back_edges();
        assert_eq!(back.len(), 1);
        assert!(back.contains(&("fix".to_string(), "inspect".to_string())));

        assert!(linear().loop_back_edges().is_empty());
    }

    fn rejoin(start_to_task_first: bool) -> Workflow {
        let mut edges = vec![Edge::new("start", "x"), Edge::new("start", "d")];
        if !start_to_task_first {
            edges.reverse();
        }
        edges.extend([
            Edge::new("x", "d"),
            Edge::branch("d", "x", Branch::False),
            Edge::branch("d", "end", Branch::True),
        ]);
        Workflow::from_parts(
            "rejoin",
            vec![
                Node::terminal("end", "End"),
                Node::decision("d", "Decide"),
                Node::task("x", "Work"),
                Node::trigger("start", "Start"),
            ],
            edges,
        )
        .unwrap()
    }

    #[test]
    fn test_loop_back_edges_ignore_edge_order() {
        let expected: HashSet<(String, String)> =
            [("d".to_string(), "x".to_string())].into_iter().collect();

        assert_eq!(rejoin(true).loop_back_edges(), expected);
        assert_eq!(rejoin(false).loop_back_edges(), expected);
    }

    #[test]
    fn test_validate_catches_bad_documents() {
        let mut wf = linear();
        wf.add_node(Node::decision("check", "Check")).unwrap();
        wf.add_edge(Edge::branch("check", "done", Branch::True)).unwrap();
        // Bypass insertion checks the way a hand-edited document would
        wf.edges.push(Edge::new("pour", "ghost"));
        wf.nodes.push(Node::task("pour", "Duplicate").with_status(NodeStatus::Completed));

        let errors = wf.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("ghost")));
        assert!(errors.iter().any(|e| e.contains("duplicate node id")));
        assert!(errors.iter().any(|e| e.contains("'false' branch")));
    }
}
