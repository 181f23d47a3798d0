use crate::models::{Document, DocumentQuery};
use async_trait::async_trait;

/// Read/tag access to the external document store.
///
/// Implementations perform one remote round trip per call. There is no
/// multi-document transaction: callers sequence writes themselves.
#[async_trait]
pub trait DocumentAccessor: Send + Sync {
    /// Fetch one document with its allocation table. `Ok(None)` when the
    /// store has no document of that doctype and name.
    async fn fetch(&self, doctype: &str, name: &str) -> Result<Option<Document>, anyhow::Error>;

    /// Write (or clear, with `None`) the group tag of one document.
    async fn set_group(
        &self,
        doctype: &str,
        name: &str,
        group_id: Option<&str>,
    ) -> Result<(), anyhow::Error>;

    /// List documents of a doctype matching the query. Projections may omit
    /// allocation tables.
    async fn query(
        &self,
        doctype: &str,
        query: &DocumentQuery,
    ) -> Result<Vec<Document>, anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}
