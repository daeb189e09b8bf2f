//! SQLite workflow store

use super::schema::init_schema;
use super::{TransitionRecord, WorkflowRepository, WorkflowSummary};
use crate::error::EngineError;
use crate::graph::{NodeStatus, RunState, Workflow};
use crate::workflow::Transition;
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::path::{Path, PathBuf};

/// Workflow document storage
pub struct WorkflowStore {
    conn: Connection,
}

impl WorkflowStore {
    /// Open or create a workflow database
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        tracing::debug!(path = %path.display(), "Opened workflow store");
        Ok(Self { conn })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get the default database path, creating its directory
    pub fn default_path() -> anyhow::Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        let data_dir = config_dir.join("sitegraph");
        std::fs::create_dir_all(&data_dir).with_context(|| {
            format!("Failed to create data directory at {}", data_dir.display())
        })?;

        Ok(data_dir.join("workflows.db"))
    }

    /// Persist a workflow, assigning an id on first save.
    ///
    /// The workflow's `version` must match the stored one; on success both
    /// the row and the caller's copy move to the next version.
    pub fn save(&mut self, workflow: &mut Workflow) -> Result<String, EngineError> {
        self.save_with_transitions(workflow, &[])
    }

    /// Save a workflow and append its transitions in one transaction.
    ///
    /// Either both land or neither does; on failure the caller's copy keeps
    /// its old id and version.
    pub fn save_with_transitions(
        &mut self,
        workflow: &mut Workflow,
        transitions: &[Transition],
    ) -> Result<String, EngineError> {
        let tx = self.conn.transaction()?;
        let (id, next) = write_document(&tx, workflow)?;
        insert_transitions(&tx, &id, workflow.run, transitions)?;
        tx.commit()?;

        workflow.id = Some(id.clone());
        workflow.version = next;

        tracing::info!(
            workflow = %id,
            version = next,
            transitions = transitions.len(),
            "Saved workflow"
        );
        Ok(id)
    }

    /// Load a workflow document by id
    pub fn load(&self, id: &str) -> Result<Workflow, EngineError> {
        let row: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT document, version FROM workflows WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (document, version) = row.ok_or_else(|| EngineError::not_found(id))?;
        let mut workflow: Workflow = serde_json::from_str(&document)?;
        workflow.id = Some(id.to_string());
        workflow.version = version as u64;
        Ok(workflow)
    }

    /// Summaries of every stored workflow, most recently updated first
    pub fn list(&self) -> Result<Vec<WorkflowSummary>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, version, run_state, updated_at
             FROM workflows
             ORDER BY updated_at DESC, name ASC",
        )?;

        let summaries = stmt
            .query_map([], |row| {
                let run_state: String = row.get(3)?;
                Ok(WorkflowSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    version: row.get::<_, i64>(2)? as u64,
                    run_state: RunState::parse(&run_state).unwrap_or_default(),
                    updated_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(summaries)
    }

    /// Delete a workflow and its audit log. Returns false if it did not exist.
    pub fn delete(&mut self, id: &str) -> Result<bool, EngineError> {
        let removed = self
            .conn
            .execute("DELETE FROM workflows WHERE id = ?1", [id])?;
        if removed > 0 {
            tracing::info!(workflow = id, "Deleted workflow");
        }
        Ok(removed > 0)
    }

    /// Append status transitions to the audit log
    pub fn record_transitions(
        &mut self,
        id: &str,
        run: u32,
        transitions: &[Transition],
    ) -> Result<(), EngineError> {
        if transitions.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        insert_transitions(&tx, id, run, transitions)?;
        tx.commit()?;
        Ok(())
    }

    /// Audit log for a workflow, oldest first
    pub fn transitions(&self, id: &str) -> Result<Vec<TransitionRecord>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT run, node_id, from_status, to_status, detail, at
             FROM transitions
             WHERE workflow_id = ?1
             ORDER BY id ASC",
        )?;

        let records = stmt
            .query_map([id], |row| {
                let from: String = row.get(2)?;
                let to: String = row.get(3)?;
                Ok(TransitionRecord {
                    run: row.get(0)?,
                    node: row.get(1)?,
                    from: NodeStatus::parse(&from).unwrap_or_default(),
                    to: NodeStatus::parse(&to).unwrap_or_default(),
                    detail: row.get(4)?,
                    at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

/// Upsert the next version of `workflow` after checking the stored one.
/// Returns the id and the new version.
fn write_document(tx: &Transaction, workflow: &Workflow) -> Result<(String, u64), EngineError> {
    let id = workflow
        .id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let now = chrono::Utc::now().to_rfc3339();

    let stored: Option<i64> = tx
        .query_row("SELECT version FROM workflows WHERE id = ?1", [&id], |row| {
            row.get(0)
        })
        .optional()?;
    let actual = stored.map(|v| v as u64).unwrap_or(0);
    if actual != workflow.version {
        return Err(EngineError::SyncConflict {
            id,
            expected: workflow.version,
            actual,
        });
    }

    let next = workflow.version + 1;
    let mut document = workflow.clone();
    document.id = Some(id.clone());
    document.version = next;
    let json = serde_json::to_string(&document)?;

    tx.execute(
        "INSERT INTO workflows (id, name, version, run_state, document, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            version = excluded.version,
            run_state = excluded.run_state,
            document = excluded.document,
            updated_at = excluded.updated_at",
        (
            &id,
            &document.name,
            next as i64,
            document.run_state.as_str(),
            &json,
            &now,
            &now,
        ),
    )?;

    Ok((id, next))
}

fn insert_transitions(
    tx: &Transaction,
    id: &str,
    run: u32,
    transitions: &[Transition],
) -> Result<(), EngineError> {
    if transitions.is_empty() {
        return Ok(());
    }

    let now = chrono::Utc::now().to_rfc3339();
    let mut stmt = tx.prepare(
        "INSERT INTO transitions (workflow_id, run, node_id, from_status, to_status, detail, at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for t in transitions {
        stmt.execute((
            id,
            run,
            &t.node,
            t.from.as_str(),
            t.to.as_str(),
            &t.detail,
            &now,
        ))?;
    }
    Ok(())
}

impl WorkflowRepository for WorkflowStore {
    fn save(&mut self, workflow: &mut Workflow) -> Result<String, EngineError> {
        WorkflowStore::save(self, workflow)
    }

    fn save_with_transitions(
        &mut self,
        workflow: &mut Workflow,
        transitions: &[Transition],
    ) -> Result<String, EngineError> {
        WorkflowStore::save_with_transitions(self, workflow, transitions)
    }

    fn load(&self, id: &str) -> Result<Workflow, EngineError> {
        WorkflowStore::load(self, id)
    }

    fn list(&self) -> Result<Vec<WorkflowSummary>, EngineError> {
        WorkflowStore::list(self)
    }

    fn delete(&mut self, id: &str) -> Result<bool, EngineError> {
        WorkflowStore::delete(self, id)
    }

    fn record_transitions(
        &mut self,
        id: &str,
        run: u32,
        transitions: &[Transition],
    ) -> Result<(), EngineError> {
        WorkflowStore::record_transitions(self, id, run, transitions)
    }

    fn transitions(&self, id: &str) -> Result<Vec<TransitionRecord>, EngineError> {
        WorkflowStore::transitions(self, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Branch, Edge, Node};
    use tempfile::TempDir;

    fn mixed_workflow() -> Workflow {
        let mut inspect = Node::decision("inspect", "Inspect formwork")
            .with_checklist(["Level", "Ties"])
            .with_status(NodeStatus::InProgress);
        inspect.assignee = Some("staff-3".into());

        Workflow::from_parts(
            "Pour level 2",
            vec![
                Node::trigger("start", "Start").with_status(NodeStatus::Completed),
                inspect,
                Node::task("fix", "Fix formwork"),
                Node::task("pour", "Pour"),
                Node::terminal("done", "Done").with_status(NodeStatus::Error),
            ],
            vec![
                Edge::new("start", "inspect"),
                Edge::branch("inspect", "pour", Branch::True),
                Edge::branch("inspect", "fix", Branch::False),
                Edge::new("pour", "done"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_save_load_round_trip() {
        let mut store = WorkflowStore::open_in_memory().unwrap();
        let mut wf = mixed_workflow();

        let id = store.save(&mut wf).unwrap();
        assert_eq!(wf.id.as_deref(), Some(id.as_str()));
        assert_eq!(wf.version, 1);

        let loaded = store.load(&id).unwrap();
        assert_eq!(loaded, wf);
        assert_eq!(loaded.nodes().len(), 5);
        assert_eq!(loaded.edges().len(), 4);
        assert_eq!(
            loaded.node("done").map(|n| n.status),
            Some(NodeStatus::Error)
        );
    }

    #[test]
    fn test_stale_save_is_rejected() {
        let mut store = WorkflowStore::open_in_memory().unwrap();
        let mut wf = mixed_workflow();
        let id = store.save(&mut wf).unwrap();

        let mut first = store.load(&id).unwrap();
        let mut second = store.load(&id).unwrap();

        first.name = "Renamed".into();
        store.save(&mut first).unwrap();
        assert_eq!(first.version, 2);

        second.name = "Lost update".into();
        let err = store.save(&mut second).unwrap_err();
        assert!(matches!(
            err,
            EngineError::SyncConflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));
        // Rejected save leaves the caller's copy untouched
        assert_eq!(second.version, 1);
        assert_eq!(store.load(&id).unwrap().name, "Renamed");
    }

    #[test]
    fn test_load_missing() {
        let store = WorkflowStore::open_in_memory().unwrap();
        assert!(matches!(
            store.load("nope"),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn test_list_and_delete() {
        let mut store = WorkflowStore::open_in_memory().unwrap();
        let mut wf = mixed_workflow();
        let id = store.save(&mut wf).unwrap();

        let list = store.list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "Pour level 2");
        assert_eq!(list[0].version, 1);

        assert!(store.delete(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_transition_log() {
        let mut store = WorkflowStore::open_in_memory().unwrap();
        let mut wf = mixed_workflow();
        let id = store.save(&mut wf).unwrap();

        let transitions = vec![
            Transition {
                node: "inspect".into(),
                from: NodeStatus::InProgress,
                to: NodeStatus::Completed,
                detail: Some("branch false".into()),
            },
            Transition {
                node: "fix".into(),
                from: NodeStatus::Pending,
                to: NodeStatus::InProgress,
                detail: None,
            },
        ];
        store.record_transitions(&id, 1, &transitions).unwrap();

        let log = store.transitions(&id).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].node, "inspect");
        assert_eq!(log[0].to, NodeStatus::Completed);
        assert_eq!(log[1].from, NodeStatus::Pending);
        assert_eq!(log[1].run, 1);

        store.delete(&id).unwrap();
        assert!(store.transitions(&id).unwrap().is_empty());
    }

    #[test]
    fn test_save_with_transitions_is_atomic() {
        let mut store = WorkflowStore::open_in_memory().unwrap();
        let mut wf = mixed_workflow();
        let id = store.save(&mut wf).unwrap();

        let transitions = vec![Transition {
            node: "inspect".into(),
            from: NodeStatus::Pending,
            to: NodeStatus::InProgress,
            detail: None,
        }];
        store.save_with_transitions(&mut wf, &transitions).unwrap();
        assert_eq!(wf.version, 2);
        assert_eq!(store.transitions(&id).unwrap().len(), 1);

        // Audit insert fails, so the document write rolls back with it
        store.conn.execute("DROP TABLE transitions", []).unwrap();
        wf.name = "Renamed".into();
        assert!(store.save_with_transitions(&mut wf, &transitions).is_err());

        assert_eq!(wf.version, 2);
        let stored = store.load(&id).unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.name, "Pour level 2");
    }

    #[test]
    fn test_open_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("workflows.db");

        let id = {
            let mut store = WorkflowStore::open(&path).unwrap();
            let mut wf = mixed_workflow();
            store.save(&mut wf).unwrap()
        };

        let store = WorkflowStore::open(&path).unwrap();
        assert_eq!(store.load(&id).unwrap().name, "Pour level 2");
    }
}
