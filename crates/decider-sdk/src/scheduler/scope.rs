// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct ScopeState {
    cancel_requested: bool,
    reason: Option<String>,
    children: Vec<Weak<CancellationScope>>,
}

/// Node of the cancellation tree.
///
/// Cancelling a scope cancels its non-detached descendants. Cancellation is
/// cooperative: blocking workflow calls observe it when their unblock
/// condition is next evaluated.
#[derive(Debug, Default)]
pub struct CancellationScope {
    detached: bool,
    state: Mutex<ScopeState>,
}

impl CancellationScope {
    pub fn root() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a child scope. A non-detached child of an already canceled
    /// scope starts canceled.
    pub fn new_child(self: &Arc<Self>, detached: bool) -> Arc<Self> {
        let mut state = self.state.lock();
        let child_state = if !detached && state.cancel_requested {
            ScopeState {
                cancel_requested: true,
                reason: state.reason.clone(),
                children: Vec::new(),
            }
        } else {
            ScopeState::default()
        };
        let child = Arc::new(Self {
            detached,
            state: Mutex::new(child_state),
        });
        state.children.retain(|c| c.strong_count() > 0);
        state.children.push(Arc::downgrade(&child));
        child
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.state.lock().cancel_requested
    }

    pub fn cancellation_reason(&self) -> Option<String> {
        self.state.lock().reason.clone()
    }

    pub fn cancel(&self, reason: Option<String>) {
        let children = {
            let mut state = self.state.lock();
            if !state.cancel_requested {
                debug!(reason = ?reason, "Cancellation requested");
                state.cancel_requested = true;
                state.reason = reason.clone();
            }
            state
                .children
                .iter()
                .filter_map(Weak::upgrade)
                .collect::<Vec<_>>()
        };
        for child in children.into_iter().filter(|c| !c.detached) {
            child.cancel(reason.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_propagates_to_attached_children() {
        let root = CancellationScope::root();
        let attached = root.new_child(false);
        let detached = root.new_child(true);
        let grandchild = attached.new_child(false);

        root.cancel(Some("shutdown".to_string()));

        assert!(attached.is_cancel_requested());
        assert!(grandchild.is_cancel_requested());
        assert_eq!(grandchild.cancellation_reason().as_deref(), Some("shutdown"));
        assert!(!detached.is_cancel_requested());
    }

    #[test]
    fn test_child_of_canceled_scope_starts_canceled() {
        let root = CancellationScope::root();
        root.cancel(None);
        assert!(root.new_child(false).is_cancel_requested());
        assert!(!root.new_child(true).is_cancel_requested());
    }

    #[test]
    fn test_child_cancel_leaves_parent() {
        let root = CancellationScope::root();
        let child = root.new_child(false);
        child.cancel(None);
        assert!(!root.is_cancel_requested());
    }
}
