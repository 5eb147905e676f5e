// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow registry.
//!
//! Workflow types are resolved through an explicit map built once at
//! startup. A process-wide registry can be installed for workers that are
//! created far from the setup code.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::error::{EngineError, Result, WorkflowResult};
use crate::scheduler::ThreadHandle;
use crate::workflow::WorkflowContext;

/// Workflow implementation: receives the execution's context, the root
/// thread's handle and the start input, and returns the workflow result.
pub type WorkflowFn =
    Arc<dyn Fn(&WorkflowContext, &ThreadHandle, Vec<u8>) -> WorkflowResult<Vec<u8>> + Send + Sync>;

/// Global registry installed by [`register_global`].
static GLOBAL_REGISTRY: OnceCell<WorkflowRegistry> = OnceCell::new();

/// Map from workflow type name to implementation.
#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<String, WorkflowFn>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `workflow` under `workflow_type`. Registering a type twice
    /// is a configuration error.
    pub fn register<F>(&mut self, workflow_type: impl Into<String>, workflow: F) -> Result<()>
    where
        F: Fn(&WorkflowContext, &ThreadHandle, Vec<u8>) -> WorkflowResult<Vec<u8>>
            + Send
            + Sync
            + 'static,
    {
        let workflow_type = workflow_type.into();
        if self.workflows.contains_key(&workflow_type) {
            return Err(EngineError::Config(format!(
                "workflow type {} is already registered",
                workflow_type
            )));
        }
        debug!(workflow_type = %workflow_type, "Workflow registered");
        self.workflows.insert(workflow_type, Arc::new(workflow));
        Ok(())
    }

    pub fn get(&self, workflow_type: &str) -> Option<WorkflowFn> {
        self.workflows.get(workflow_type).cloned()
    }

    /// Like [`get`](Self::get), failing with [`EngineError::UnknownWorkflowType`].
    pub fn resolve(&self, workflow_type: &str) -> Result<WorkflowFn> {
        self.get(workflow_type)
            .ok_or_else(|| EngineError::UnknownWorkflowType(workflow_type.to_string()))
    }

    /// Registered type names, sorted.
    pub fn workflow_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.workflows.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

impl std::fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("workflow_types", &self.workflow_types())
            .finish()
    }
}

/// Install the process-wide registry. Fails if one is already installed.
pub fn register_global(registry: WorkflowRegistry) -> Result<()> {
    GLOBAL_REGISTRY
        .set(registry)
        .map_err(|_| EngineError::Config("global workflow registry already installed".to_string()))
}

pub fn global_registry() -> Option<&'static WorkflowRegistry> {
    GLOBAL_REGISTRY.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = WorkflowRegistry::new();
        registry
            .register("greeting", |_, _, input| Ok(input))
            .unwrap();

        let err = registry
            .register("greeting", |_, _, _| Ok(Vec::new()))
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_unknown_type() {
        let mut registry = WorkflowRegistry::new();
        registry.register("b", |_, _, input| Ok(input)).unwrap();
        registry.register("a", |_, _, input| Ok(input)).unwrap();

        assert_eq!(registry.workflow_types(), vec!["a", "b"]);
        assert!(registry.resolve("a").is_ok());
        assert_eq!(
            registry.resolve("missing").err(),
            Some(EngineError::UnknownWorkflowType("missing".to_string()))
        );
    }
}
