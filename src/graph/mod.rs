//! Workflow graph: nodes, edges and the structural operations over them

mod model;
mod store;

pub use model::{
    AutomationFlag, Branch, ChecklistItem, Edge, Node, NodeFailure, NodeKind, NodeStatus,
    RunState, Workflow,
};
