// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use super::ThreadHandle;

static NEXT_KEY: AtomicU64 = AtomicU64::new(0);

/// Values owned by one workflow thread, dropped with its handle.
#[derive(Default)]
pub(crate) struct LocalStore {
    values: RefCell<HashMap<u64, Box<dyn Any>>>,
}

/// Typed key into the thread-local store of a workflow thread.
///
/// The same key yields independent values on different workflow threads.
#[derive(Debug)]
pub struct WorkflowThreadLocal<T> {
    key: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> WorkflowThreadLocal<T> {
    pub fn new() -> Self {
        Self {
            key: NEXT_KEY.fetch_add(1, Ordering::Relaxed),
            _marker: PhantomData,
        }
    }

    pub fn set(&self, handle: &ThreadHandle, value: T) {
        handle
            .locals()
            .values
            .borrow_mut()
            .insert(self.key, Box::new(value));
    }

    pub fn remove(&self, handle: &ThreadHandle) -> Option<T> {
        handle
            .locals()
            .values
            .borrow_mut()
            .remove(&self.key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    /// Run `f` with a reference to the value, if set.
    pub fn with<R>(&self, handle: &ThreadHandle, f: impl FnOnce(Option<&T>) -> R) -> R {
        let values = handle.locals().values.borrow();
        f(values.get(&self.key).and_then(|v| v.downcast_ref::<T>()))
    }
}

impl<T: Clone + 'static> WorkflowThreadLocal<T> {
    pub fn get(&self, handle: &ThreadHandle) -> Option<T> {
        self.with(handle, |v| v.cloned())
    }
}

impl<T: 'static> Default for WorkflowThreadLocal<T> {
    fn default() -> Self {
        Self::new()
    }
}
