// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Single-assignment completion slot shared between event handlers and a
//! blocked workflow thread.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Completed once by the replay side, polled by a workflow thread from its
/// yield condition.
pub struct Promise<T> {
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> Promise<T> {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn completed(value: T) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(value))),
        }
    }

    /// Returns `false` if the promise already held a value; the first value wins.
    pub fn complete(&self, value: T) -> bool {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        true
    }

    pub fn is_ready(&self) -> bool {
        self.slot.lock().is_some()
    }

    pub fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }
}

impl<T: Clone> Promise<T> {
    pub fn get(&self) -> Option<T> {
        self.slot.lock().clone()
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_completion_wins() {
        let promise = Promise::new();
        let other = promise.clone();
        assert!(!promise.is_ready());
        assert!(other.complete(1));
        assert!(!promise.complete(2));
        assert_eq!(promise.get(), Some(1));
        assert_eq!(promise.take(), Some(1));
        assert!(!other.is_ready());
    }
}
