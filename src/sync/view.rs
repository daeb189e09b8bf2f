//! Client-held snapshot

use crate::workflow::Snapshot;
use std::sync::Arc;
use tokio::sync::watch;

/// The client's copy of a workflow snapshot.
///
/// Renderers subscribe to changes. A snapshot is only swapped in when it
/// differs structurally from the held one, so identical reads never wake
/// subscribers or replace the held `Arc`.
#[derive(Debug)]
pub struct ClientView {
    tx: watch::Sender<Arc<Snapshot>>,
}

impl ClientView {
    pub fn new(initial: Snapshot) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.tx.subscribe()
    }

    /// True while any node is in progress
    pub fn is_active(&self) -> bool {
        self.tx.borrow().is_active()
    }

    /// Replace the held snapshot wholesale if `incoming` differs.
    /// Returns whether a replacement happened.
    pub fn replace_if_changed(&self, incoming: Snapshot) -> bool {
        let replaced = self.tx.send_if_modified(|held| {
            if **held == incoming {
                false
            } else {
                *held = Arc::new(incoming);
                true
            }
        });

        if replaced {
            let held = self.tx.borrow();
            tracing::debug!(
                workflow = held.id().unwrap_or("<unsaved>"),
                version = held.version(),
                "Client snapshot replaced"
            );
        }
        replaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node, NodeStatus, Workflow};

    fn running() -> Workflow {
        Workflow::from_parts(
            "view",
            vec![
                Node::trigger("start", "Start").with_status(NodeStatus::InProgress),
                Node::task("a", "A"),
            ],
            vec![Edge::new("start", "a")],
        )
        .unwrap()
    }

    #[test]
    fn test_identical_snapshot_keeps_reference() {
        let view = ClientView::new(Snapshot::new(running()));
        let before = view.current();
        let rx = view.subscribe();

        assert!(!view.replace_if_changed(Snapshot::new(running())));
        assert!(Arc::ptr_eq(&before, &view.current()));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_changed_snapshot_replaced_wholesale() {
        let view = ClientView::new(Snapshot::new(running()));
        let before = view.current();
        let rx = view.subscribe();

        let mut remote = running();
        remote.node_mut("start").unwrap().status = NodeStatus::Completed;
        let remote = Snapshot::new(remote);

        assert!(view.replace_if_changed(remote.clone()));
        assert!(!Arc::ptr_eq(&before, &view.current()));
        assert_eq!(*view.current(), remote);
        assert!(rx.has_changed().unwrap());
        assert!(!view.is_active());
    }
}
