//! Workflow service - run trigger, snapshot reads and controller leases
//!
//! Every mutating call loads the document, drives it through an
//! `ExecutionController`, then saves it with the version check and appends the
//! transitions to the audit log. A rejected call saves nothing.

use super::controller::{Advance, ExecutionController};
use super::snapshot::Snapshot;
use crate::directory::StaffDirectory;
use crate::error::EngineError;
use crate::graph::{Branch, Workflow};
use crate::store::{TransitionRecord, WorkflowRepository, WorkflowSummary};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Exclusive hold on one workflow id, released on drop
#[derive(Debug)]
pub struct Lease {
    id: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl Lease {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
        tracing::debug!(workflow = %self.id, "Released controller lease");
    }
}

/// In-process registry of workflow ids that have a live controller
#[derive(Debug, Clone, Default)]
pub struct LeaseRegistry {
    held: Arc<Mutex<HashSet<String>>>,
}

impl LeaseRegistry {
    pub fn acquire(&self, id: &str) -> Result<Lease, EngineError> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(id.to_string()) {
            tracing::warn!(workflow = id, "Controller lease already held");
            return Err(EngineError::ControllerBusy { id: id.to_string() });
        }
        tracing::debug!(workflow = id, "Acquired controller lease");
        Ok(Lease {
            id: id.to_string(),
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_held(&self, id: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }
}

/// Result of a mutating service call
#[derive(Debug, Clone)]
pub struct Outcome {
    pub advance: Advance,
    pub snapshot: Snapshot,
}

/// Engine boundary: persistence, run trigger, snapshot reads
pub struct WorkflowService {
    repo: Mutex<Box<dyn WorkflowRepository>>,
    leases: LeaseRegistry,
    directory: Option<Arc<dyn StaffDirectory>>,
}

impl WorkflowService {
    pub fn new(repo: impl WorkflowRepository + 'static) -> Self {
        Self {
            repo: Mutex::new(Box::new(repo)),
            leases: LeaseRegistry::default(),
            directory: None,
        }
    }

    /// Validate assignees against this directory
    pub fn with_directory(mut self, directory: Arc<dyn StaffDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn leases(&self) -> &LeaseRegistry {
        &self.leases
    }

    fn repo(&self) -> MutexGuard<'_, Box<dyn WorkflowRepository>> {
        self.repo.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check a new workflow's structure and store it. Returns its id.
    pub fn create(&self, mut workflow: Workflow) -> Result<String, EngineError> {
        workflow.validate().map_err(|errors| {
            EngineError::invalid_reference(format!(
                "workflow '{}' is malformed: {}",
                workflow.name,
                errors.join("; ")
            ))
        })?;
        workflow.id = None;
        workflow.version = 0;
        self.repo().save(&mut workflow)
    }

    /// Take the exclusive controller for a stored workflow
    pub fn controller(&self, id: &str) -> Result<ExecutionController, EngineError> {
        let lease = self.leases.acquire(id)?;
        let workflow = self.repo().load(id)?;
        Ok(ExecutionController::with_lease(workflow, lease))
    }

    /// Save a controller's workflow and log the transitions atomically
    pub fn commit(
        &self,
        controller: &mut ExecutionController,
        advance: &Advance,
    ) -> Result<Snapshot, EngineError> {
        self.repo()
            .save_with_transitions(controller.workflow_mut(), &advance.transitions)?;
        Ok(controller.snapshot())
    }

    /// Load, apply `op`, and save only if the document changed
    fn apply<F>(&self, id: &str, op: F) -> Result<Outcome, EngineError>
    where
        F: FnOnce(&mut ExecutionController) -> Result<Advance, EngineError>,
    {
        let mut controller = self.controller(id)?;
        let before = controller.workflow().clone();

        let advance = op(&mut controller)?;

        let snapshot = if controller.workflow() == &before {
            controller.snapshot()
        } else {
            self.commit(&mut controller, &advance)?
        };
        Ok(Outcome { advance, snapshot })
    }

    /// Run trigger: load, start, save. Returns the post-start snapshot.
    pub fn run(&self, id: &str) -> Result<Snapshot, EngineError> {
        self.apply(id, ExecutionController::start)
            .map(|outcome| outcome.snapshot)
    }

    pub fn complete(
        &self,
        id: &str,
        node_id: &str,
        branch: Option<Branch>,
    ) -> Result<Outcome, EngineError> {
        self.apply(id, |c| c.complete(node_id, branch))
    }

    pub fn fail(&self, id: &str, node_id: &str, reason: &str) -> Result<Outcome, EngineError> {
        self.apply(id, |c| c.fail(node_id, reason))
    }

    pub fn reactivate(&self, id: &str, node_id: &str) -> Result<Outcome, EngineError> {
        self.apply(id, |c| c.reactivate(node_id))
    }

    /// Set or clear an assignee. With a directory configured, the staff id
    /// must be assignable.
    pub fn assign(
        &self,
        id: &str,
        node_id: &str,
        staff_id: Option<&str>,
    ) -> Result<Outcome, EngineError> {
        if let (Some(staff_id), Some(directory)) = (staff_id, &self.directory) {
            if !directory.is_assignable(staff_id) {
                return Err(EngineError::invalid_reference(format!(
                    "staff '{}' is not in the assignable directory",
                    staff_id
                )));
            }
        }
        self.apply(id, |c| {
            c.assign(node_id, staff_id.map(str::to_string))?;
            Ok(Advance::default())
        })
    }

    pub fn toggle_checklist_item(
        &self,
        id: &str,
        node_id: &str,
        index: usize,
    ) -> Result<Outcome, EngineError> {
        self.apply(id, |c| {
            c.toggle_checklist_item(node_id, index)?;
            Ok(Advance::default())
        })
    }

    /// Snapshot read. No side effects.
    pub fn get(&self, id: &str) -> Result<Snapshot, EngineError> {
        self.repo().get(id)
    }

    pub fn list(&self) -> Result<Vec<WorkflowSummary>, EngineError> {
        self.repo().list()
    }

    pub fn transitions(&self, id: &str) -> Result<Vec<TransitionRecord>, EngineError> {
        self.repo().transitions(id)
    }

    /// Explicit deletion. Refused while a controller holds the workflow.
    pub fn delete(&self, id: &str) -> Result<(), EngineError> {
        let _lease = self.leases.acquire(id)?;
        if !self.repo().delete(id)? {
            return Err(EngineError::not_found(id));
        }
        Ok(())
    }
}
