//! Workflow persistence
//!
//! Workflows are stored as whole JSON documents keyed by id, with an
//! optimistic `version` column and an append-only transition log.

mod schema;
mod sqlite;

pub use sqlite::WorkflowStore;

use crate::error::EngineError;
use crate::graph::{NodeStatus, RunState, Workflow};
use crate::workflow::{Snapshot, Transition};
use serde::Serialize;

/// Listing entry for a stored workflow
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub version: u64,
    pub run_state: RunState,
    pub updated_at: String,
}

/// One row of the transition audit log
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TransitionRecord {
    pub run: u32,
    pub node: String,
    pub from: NodeStatus,
    pub to: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub at: String,
}

/// Backing store for workflow documents
pub trait WorkflowRepository: Send {
    /// Persist `workflow`, failing with `SyncConflict` if its version is stale.
    /// Returns the workflow id.
    fn save(&mut self, workflow: &mut Workflow) -> Result<String, EngineError>;

    fn load(&self, id: &str) -> Result<Workflow, EngineError>;

    /// Load a workflow together with its derived node views
    fn get(&self, id: &str) -> Result<Snapshot, EngineError> {
        Ok(Snapshot::new(self.load(id)?))
    }

    fn list(&self) -> Result<Vec<WorkflowSummary>, EngineError>;

    fn delete(&mut self, id: &str) -> Result<bool, EngineError>;

    fn record_transitions(
        &mut self,
        id: &str,
        run: u32,
        transitions: &[Transition],
    ) -> Result<(), EngineError>;

    /// Persist `workflow` and append `transitions` as one unit.
    ///
    /// The default runs two steps; stores with transactions should override
    /// it so a failed log write also discards the save.
    fn save_with_transitions(
        &mut self,
        workflow: &mut Workflow,
        transitions: &[Transition],
    ) -> Result<String, EngineError> {
        let id = self.save(workflow)?;
        self.record_transitions(&id, workflow.run, transitions)?;
        Ok(id)
    }

    fn transitions(&self, id: &str) -> Result<Vec<TransitionRecord>, EngineError>;
}
