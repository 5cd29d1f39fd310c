//! Component-scoped database access.

use std::sync::Arc;

use fabric_primitives::ComponentId;

use crate::manager::DatabaseManager;
use crate::traits::{
    CacheStore, DocumentStore, GraphStore, KeyValueStore, RelationalStore, VectorStore,
};
use crate::types::DbBackend;
use crate::StoreResult;

/// Database access helper bound to one component.
///
/// Every namespace is additionally prefixed with the component id, so two
/// components using the same namespace string never collide.
#[derive(Clone)]
pub struct ComponentStoreClient {
    manager: Arc<DatabaseManager>,
    component: ComponentId,
}

impl ComponentStoreClient {
    /// Creates a client scoping all access to `component`.
    #[must_use]
    pub fn new(manager: Arc<DatabaseManager>, component: ComponentId) -> Self {
        Self { manager, component }
    }

    /// Returns the owning component id.
    #[must_use]
    pub fn component(&self) -> &ComponentId {
        &self.component
    }

    fn scoped(&self, namespace: &str) -> String {
        format!("{}:{namespace}", self.component)
    }

    /// Returns a vector database scoped to this component.
    ///
    /// # Errors
    ///
    /// Propagates manager failures.
    pub async fn vector(
        &self,
        namespace: &str,
        backend: Option<DbBackend>,
    ) -> StoreResult<Arc<dyn VectorStore>> {
        self.manager
            .get_vector_db(&self.scoped(namespace), backend)
            .await
    }

    /// Returns a graph database scoped to this component.
    ///
    /// # Errors
    ///
    /// Propagates manager failures.
    pub async fn graph(
        &self,
        namespace: &str,
        backend: Option<DbBackend>,
    ) -> StoreResult<Arc<dyn GraphStore>> {
        self.manager
            .get_graph_db(&self.scoped(namespace), backend)
            .await
    }

    /// Returns a key-value database scoped to this component.
    ///
    /// # Errors
    ///
    /// Propagates manager failures.
    pub async fn key_value(
        &self,
        namespace: &str,
        backend: Option<DbBackend>,
    ) -> StoreResult<Arc<dyn KeyValueStore>> {
        self.manager
            .get_key_value_db(&self.scoped(namespace), backend)
            .await
    }

    /// Returns a document database scoped to this component.
    ///
    /// # Errors
    ///
    /// Propagates manager failures.
    pub async fn document(
        &self,
        namespace: &str,
        backend: Option<DbBackend>,
    ) -> StoreResult<Arc<dyn DocumentStore>> {
        self.manager
            .get_document_db(&self.scoped(namespace), backend)
            .await
    }

    /// Returns a cache scoped to this component.
    ///
    /// # Errors
    ///
    /// Propagates manager failures.
    pub async fn cache(
        &self,
        namespace: &str,
        backend: Option<DbBackend>,
    ) -> StoreResult<Arc<dyn CacheStore>> {
        self.manager
            .get_cache_db(&self.scoped(namespace), backend)
            .await
    }

    /// Returns a relational database scoped to this component.
    ///
    /// # Errors
    ///
    /// Propagates manager failures.
    pub async fn relational(
        &self,
        namespace: &str,
        backend: Option<DbBackend>,
    ) -> StoreResult<Arc<dyn RelationalStore>> {
        self.manager
            .get_relational_db(&self.scoped(namespace), backend)
            .await
    }
}
