//! CLI command implementations

use super::output::{OutputEvent, OutputHandler};
use super::signals::{CancellationToken, setup_signal_handlers};
use crate::config::{SiteGraphConfig, load_workflow_file};
use crate::graph::Branch;
use crate::sync::{
    ClientView, HttpSnapshotSource, PollingSync, SnapshotSource, SyncOutcome, SyncStrategy,
};
use crate::template::TemplateCatalog;
use crate::workflow::{Outcome, WorkflowService};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Parse a `--branch` value
pub fn parse_branch(value: &str) -> Result<Branch, String> {
    Branch::parse(value).ok_or_else(|| format!("expected 'true' or 'false', got '{}'", value))
}

/// Seed a workflow from a template and store it
///
/// An explicit `template` key must exist. Otherwise the prompt is matched
/// against the catalog, falling back to the default skeleton.
pub fn new_workflow(
    service: &WorkflowService,
    catalog: &TemplateCatalog,
    name: &str,
    template: Option<&str>,
    prompt: Option<&str>,
    handler: &dyn OutputHandler,
) -> Result<String> {
    let skeleton = match (template, prompt) {
        (Some(key), _) => catalog.by_key(key)?,
        (None, Some(prompt)) => catalog.resolve(prompt),
        (None, None) => catalog.default_template(),
    };

    let workflow = catalog.seed(skeleton, name, prompt)?;
    let nodes = workflow.nodes().len();
    let id = service
        .create(workflow)
        .with_context(|| format!("storing workflow '{}'", name))?;

    handler.emit(OutputEvent::Created {
        id: id.clone(),
        name: name.to_string(),
        template: Some(skeleton.key.clone()),
        nodes,
    });
    Ok(id)
}

/// Store a workflow read from a TOML file
pub fn import_workflow(
    service: &WorkflowService,
    path: &Path,
    handler: &dyn OutputHandler,
) -> Result<String> {
    let workflow = load_workflow_file(path)?;
    let name = workflow.name.clone();
    let nodes = workflow.nodes().len();
    let id = service
        .create(workflow)
        .with_context(|| format!("storing workflow from {}", path.display()))?;

    handler.emit(OutputEvent::Created {
        id: id.clone(),
        name,
        template: None,
        nodes,
    });
    Ok(id)
}

pub fn list_workflows(service: &WorkflowService, handler: &dyn OutputHandler) -> Result<()> {
    let workflows = service.list()?;
    handler.emit(OutputEvent::WorkflowList { workflows });
    Ok(())
}

pub fn show_workflow(
    service: &WorkflowService,
    id: &str,
    history: bool,
    handler: &dyn OutputHandler,
) -> Result<()> {
    let snapshot = service.get(id)?;
    handler.emit(OutputEvent::snapshot(&snapshot));

    if history {
        let records = service.transitions(id)?;
        handler.emit(OutputEvent::History {
            workflow: id.to_string(),
            records,
        });
    }
    Ok(())
}

/// Run trigger
pub fn run_workflow(service: &WorkflowService, id: &str, handler: &dyn OutputHandler) -> Result<()> {
    let snapshot = service
        .run(id)
        .with_context(|| format!("starting workflow {}", id))?;
    handler.emit(OutputEvent::snapshot(&snapshot));
    Ok(())
}

fn report(id: &str, outcome: &Outcome, handler: &dyn OutputHandler) {
    handler.emit(OutputEvent::transitions(id, &outcome.advance));
    handler.emit(OutputEvent::snapshot(&outcome.snapshot));
}

pub fn complete_node(
    service: &WorkflowService,
    id: &str,
    node: &str,
    branch: Option<Branch>,
    handler: &dyn OutputHandler,
) -> Result<()> {
    let outcome = service.complete(id, node, branch)?;
    report(id, &outcome, handler);
    Ok(())
}

pub fn fail_node(
    service: &WorkflowService,
    id: &str,
    node: &str,
    reason: &str,
    handler: &dyn OutputHandler,
) -> Result<()> {
    let outcome = service.fail(id, node, reason)?;
    report(id, &outcome, handler);
    Ok(())
}

pub fn rework_node(
    service: &WorkflowService,
    id: &str,
    node: &str,
    handler: &dyn OutputHandler,
) -> Result<()> {
    let outcome = service.reactivate(id, node)?;
    report(id, &outcome, handler);
    Ok(())
}

/// Assign a node, or clear its assignee when `staff` is `None`
pub fn assign_node(
    service: &WorkflowService,
    id: &str,
    node: &str,
    staff: Option<&str>,
    handler: &dyn OutputHandler,
) -> Result<()> {
    let outcome = service.assign(id, node, staff)?;
    handler.emit(OutputEvent::snapshot(&outcome.snapshot));
    Ok(())
}

pub fn check_item(
    service: &WorkflowService,
    id: &str,
    node: &str,
    index: usize,
    handler: &dyn OutputHandler,
) -> Result<()> {
    let outcome = service.toggle_checklist_item(id, node, index)?;
    handler.emit(OutputEvent::snapshot(&outcome.snapshot));
    Ok(())
}

pub fn delete_workflow(
    service: &WorkflowService,
    id: &str,
    handler: &dyn OutputHandler,
) -> Result<()> {
    service.delete(id)?;
    handler.emit(OutputEvent::Deleted { id: id.to_string() });
    Ok(())
}

pub fn list_staff(config: &SiteGraphConfig, handler: &dyn OutputHandler) {
    handler.emit(OutputEvent::Staff {
        staff: config.staff.clone(),
    });
}

pub fn list_templates(catalog: &TemplateCatalog, handler: &dyn OutputHandler) {
    handler.emit(OutputEvent::templates(catalog.templates()));
}

/// Pick the snapshot source for `watch`: the local store, or a remote
/// server when `remote` is given
pub fn snapshot_source(
    service: Arc<WorkflowService>,
    remote: Option<&str>,
    timeout: Duration,
) -> Result<Arc<dyn SnapshotSource>> {
    match remote {
        Some(url) => {
            let source = HttpSnapshotSource::new(url, timeout)
                .with_context(|| format!("connecting to {}", url))?;
            Ok(Arc::new(source))
        }
        None => Ok(service),
    }
}

/// Follow a workflow until nothing is in progress or the token is cancelled
pub async fn watch_workflow(
    source: Arc<dyn SnapshotSource>,
    id: &str,
    interval: Duration,
    cancel: CancellationToken,
    handler: &dyn OutputHandler,
) -> Result<SyncOutcome> {
    let strategy = PollingSync::new(interval)?;
    let initial = source
        .fetch(id)
        .await
        .with_context(|| format!("reading workflow {} from {}", id, source.describe()))?;
    handler.emit(OutputEvent::snapshot(&initial));

    let view = ClientView::new(initial);
    let mut updates = view.subscribe();

    let mut sync = strategy.sync(id, source.as_ref(), &view, cancel);
    let outcome = loop {
        tokio::select! {
            outcome = &mut sync => break outcome,
            changed = updates.changed() => {
                if changed.is_err() {
                    break (&mut sync).await;
                }
                let snapshot = updates.borrow_and_update().clone();
                handler.emit(OutputEvent::SyncUpdate {
                    workflow: id.to_string(),
                    version: snapshot.version(),
                    counts: snapshot.status_counts(),
                });
            }
        }
    };

    handler.emit(OutputEvent::snapshot(&view.current()));
    handler.emit(OutputEvent::sync_stopped(id, &outcome));
    Ok(outcome)
}

/// `watch` with Ctrl+C / SIGTERM wired to cancellation
pub async fn watch_with_signals(
    source: Arc<dyn SnapshotSource>,
    id: &str,
    interval: Duration,
    handler: &dyn OutputHandler,
) -> Result<SyncOutcome> {
    let token = CancellationToken::new();
    let signals = tokio::spawn({
        let token = token.clone();
        async move {
            if let Err(e) = setup_signal_handlers(token).await {
                tracing::warn!(error = %e, "Could not install signal handlers");
            }
        }
    });

    let outcome = watch_workflow(source, id, interval, token, handler).await;
    signals.abort();
    outcome
}
