//! Workflow execution engine for sitegraph
//!
//! This module handles:
//! - Derived node status (pending / blocked / in-progress / completed / error)
//! - The run/advance state machine, including decision branches and rework
//! - Snapshots handed to clients
//! - The service boundary: run trigger, snapshot reads, controller leases
//!
//! # Example
//!
//! ```ignore
//! use sitegraph::workflow::WorkflowService;
//! use sitegraph::store::WorkflowStore;
//!
//! let service = WorkflowService::new(WorkflowStore::open(&path)?);
//! let id = service.create(workflow)?;
//!
//! let snapshot = service.run(&id)?;
//! let outcome = service.complete(&id, "inspect", Some(Branch::False))?;
//! println!("activated: {:?}", outcome.advance.activated());
//! ```

mod controller;
mod resolver;
mod service;
mod snapshot;

pub use controller::{Advance, ExecutionController, Transition};
#[allow(unused_imports)]
pub use resolver::{DisplayStatus, NodeView, Resolution, outstanding_predecessors, resolve, resolve_node};
#[allow(unused_imports)]
pub use service::{Lease, LeaseRegistry, Outcome, WorkflowService};
pub use snapshot::{Snapshot, StatusCounts};
