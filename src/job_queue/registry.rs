//! Template registry.
//!
//! Populated once at startup, then handed to the [`JobQueue`](super::JobQueue)
//! which never mutates it again.

use super::context::JobContext;
use super::job::{FnTemplate, JobError, JobTemplate};
use super::models::{JobAttributes, JobKind, JobOutput, TemplateId};
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Default)]
pub struct TemplateRegistry {
    templates: HashMap<TemplateId, Arc<dyn JobTemplate>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template under its own id, replacing any previous one.
    pub fn register(&mut self, template: Arc<dyn JobTemplate>) {
        let id = template.id();
        info!("Registered job template '{}': {}", id, template.description());
        if self.templates.insert(id.clone(), template).is_some() {
            warn!("Job template '{}' was registered twice, keeping the last one", id);
        }
    }

    /// Register a plain async function as a template.
    pub fn register_fn<F, Fut>(&mut self, id: TemplateId, f: F)
    where
        F: Fn(JobContext, JobAttributes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JobOutput, JobError>> + Send + 'static,
    {
        self.register(FnTemplate::new(id, f));
    }

    pub fn get(&self, id: &TemplateId) -> Option<Arc<dyn JobTemplate>> {
        self.templates.get(id).cloned()
    }

    pub fn contains(&self, id: &TemplateId) -> bool {
        self.templates.contains_key(id)
    }

    /// Registered template ids, sorted.
    pub fn template_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.templates.keys().map(|id| id.to_string()).collect();
        ids.sort();
        ids
    }

    /// Fails unless every built-in kind has a template.
    pub fn ensure_builtins_registered(&self) -> Result<()> {
        let missing: Vec<&str> = JobKind::ALL
            .iter()
            .filter(|kind| !self.contains(&TemplateId::Builtin(**kind)))
            .map(|kind| kind.as_str())
            .collect();
        if !missing.is_empty() {
            bail!("No template registered for job kinds: {}", missing.join(", "));
        }
        Ok(())
    }
}
