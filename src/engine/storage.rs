// Template storage abstraction
// Defines the interface for persisting server templates

//! # Template Storage Layer
//!
//! The controller never touches template maps directly. It goes through the
//! [`TemplateStorage`] trait, so the in-memory store used for development
//! and tests can be swapped for a persistent one without changing the
//! management facade.
//!
//! ## Storage Semantics
//!
//! - `save` is an upsert keyed by template id. Uniqueness checks belong to
//!   the caller, which holds the per-template lock while it checks and writes.
//! - Reads hand out clones. A caller can never mutate stored state through a
//!   value it got back from `load`; it has to `save` it again.
//!
//! ## Rust Learning Notes:
//!
//! ### Async Traits
//! The `async-trait` crate lets trait methods be `async fn`. The `Send + Sync`
//! bounds make `Arc<dyn TemplateStorage>` shareable across tokio tasks.

use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::models::{ServerTemplate, ServerTemplateKey};
use crate::Result;

/// Storage trait for server template persistence
#[async_trait::async_trait]
pub trait TemplateStorage: Send + Sync {
    /// Insert or replace a template, returning what was stored
    async fn save(&self, template: ServerTemplate) -> Result<ServerTemplate>;

    /// Get a template by id
    ///
    /// `Ok(None)` means the template does not exist; `Err` means the storage
    /// itself failed.
    async fn load(&self, id: &str) -> Result<Option<ServerTemplate>>;

    /// Whether a template with this id is stored
    async fn exists(&self, id: &str) -> Result<bool>;

    /// Remove a template, returning it if it was present
    async fn delete(&self, id: &str) -> Result<Option<ServerTemplate>>;

    /// Snapshot of every stored template, in no particular order
    async fn load_all(&self) -> Result<Vec<ServerTemplate>>;

    /// Snapshot of every stored template key, in no particular order
    async fn load_keys(&self) -> Result<Vec<ServerTemplateKey>> {
        Ok(self
            .load_all()
            .await?
            .iter()
            .map(ServerTemplate::key)
            .collect())
    }
}

/// In-memory template storage for development and testing
///
/// ## Limitations
///
/// - **Not persistent**: Data is lost when process restarts
/// - **Not distributed**: Cannot share data across multiple processes
///
/// The `RwLock` makes each individual call atomic. Read-modify-write
/// sequences spanning several calls are serialized one level up, by the
/// controller's per-template locks.
#[derive(Default)]
pub struct InMemoryTemplateStorage {
    /// Key: template id, Value: template
    templates: RwLock<HashMap<String, ServerTemplate>>,
}

impl InMemoryTemplateStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated store, used for seeding demo data
    pub fn with_templates(templates: impl IntoIterator<Item = ServerTemplate>) -> Self {
        let templates = templates
            .into_iter()
            .map(|template| (template.id.clone(), template))
            .collect();

        Self {
            templates: RwLock::new(templates),
        }
    }
}

#[async_trait::async_trait]
impl TemplateStorage for InMemoryTemplateStorage {
    async fn save(&self, template: ServerTemplate) -> Result<ServerTemplate> {
        let mut templates = self.templates.write().await;
        templates.insert(template.id.clone(), template.clone());
        Ok(template)
    }

    async fn load(&self, id: &str) -> Result<Option<ServerTemplate>> {
        let templates = self.templates.read().await;
        Ok(templates.get(id).cloned())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let templates = self.templates.read().await;
        Ok(templates.contains_key(id))
    }

    async fn delete(&self, id: &str) -> Result<Option<ServerTemplate>> {
        let mut templates = self.templates.write().await;
        Ok(templates.remove(id))
    }

    async fn load_all(&self) -> Result<Vec<ServerTemplate>> {
        let templates = self.templates.read().await;
        Ok(templates.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_is_an_upsert() {
        let storage = InMemoryTemplateStorage::new();

        storage.save(ServerTemplate::new("tpl", "First")).await.unwrap();
        storage.save(ServerTemplate::new("tpl", "Second")).await.unwrap();

        let stored = storage.load("tpl").await.unwrap().unwrap();
        assert_eq!(stored.name, "Second");
        assert_eq!(storage.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_loaded_values_are_snapshots() {
        let storage = InMemoryTemplateStorage::with_templates(vec![ServerTemplate::new(
            "tpl", "Template",
        )]);

        let mut loaded = storage.load("tpl").await.unwrap().unwrap();
        loaded.name = "Changed".to_string();

        let stored = storage.load("tpl").await.unwrap().unwrap();
        assert_eq!(stored.name, "Template");
    }

    #[tokio::test]
    async fn test_delete_and_keys() {
        let storage = InMemoryTemplateStorage::with_templates(vec![
            ServerTemplate::new("a", "A"),
            ServerTemplate::new("b", "B"),
        ]);

        let mut keys = storage.load_keys().await.unwrap();
        keys.sort_by(|left, right| left.id.cmp(&right.id));
        assert_eq!(keys, vec![ServerTemplateKey::new("a", "A"), ServerTemplateKey::new("b", "B")]);

        assert!(storage.delete("a").await.unwrap().is_some());
        assert!(storage.delete("a").await.unwrap().is_none());
        assert!(!storage.exists("a").await.unwrap());
        assert!(storage.exists("b").await.unwrap());
    }
}
