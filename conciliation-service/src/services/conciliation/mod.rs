//! Conciliation engine.
//!
//! Groups invoices and payments of one party under a shared group id written
//! onto each document, rebuilds groups from those tags, and dissolves them
//! without orphaning payment allocations that reach outside the group.
//!
//! Every store round trip is awaited in sequence. Writes spanning several
//! documents are not atomic: a store failure part-way through leaves the
//! documents handled so far in their new state.

mod assignment;
pub mod balance;
mod dissolve;
pub mod id;
pub mod kinds;
mod query;

use crate::models::DocumentFamily;
use crate::services::accessor::DocumentAccessor;
use crate::services::cache::CacheInvalidationSink;
use crate::services::error::ConciliationError;
use crate::services::metrics::{record_error, record_operation};
use crate::services::party::{PartyError, PartyResolver};
use std::collections::HashSet;
use std::sync::Arc;

pub use id::generate_group_id;

/// Conciliation operations for one document family.
#[derive(Clone)]
pub struct ConciliationService {
    family: DocumentFamily,
    accessor: Arc<dyn DocumentAccessor>,
    parties: Arc<dyn PartyResolver>,
    cache: Arc<dyn CacheInvalidationSink>,
    cache_prefix: String,
}

impl ConciliationService {
    pub fn new(
        family: DocumentFamily,
        accessor: Arc<dyn DocumentAccessor>,
        parties: Arc<dyn PartyResolver>,
        cache: Arc<dyn CacheInvalidationSink>,
        cache_prefix: &str,
    ) -> Self {
        Self {
            family,
            accessor,
            parties,
            cache,
            cache_prefix: cache_prefix.to_string(),
        }
    }

    pub fn family(&self) -> DocumentFamily {
        self.family
    }

    /// Cache key prefix invalidated after mutations of this family.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.cache_prefix, self.family.as_str())
    }

    async fn equivalent_parties(
        &self,
        party: &str,
        company: &str,
    ) -> Result<HashSet<String>, ConciliationError> {
        let mut names = self
            .parties
            .equivalent_names(party, company)
            .await
            .map_err(|e| match e {
                unknown @ PartyError::UnknownCompany(_) => {
                    ConciliationError::validation(unknown.to_string())
                }
                PartyError::Lookup(e) => ConciliationError::ExternalStore(e),
            })?;
        names.insert(party.to_string());
        Ok(names)
    }

    /// Tell the cache collaborator that grouping state changed. Failures are
    /// logged and otherwise ignored.
    async fn notify_cache(&self) {
        let key = self.cache_key();
        if let Err(e) = self.cache.invalidate(&key).await {
            tracing::warn!(error = %e, prefix = %key, "Cache invalidation failed");
        }
    }

    fn observe<T>(&self, operation: &str, result: &Result<T, ConciliationError>) {
        match result {
            Ok(_) => record_operation(operation, self.family.as_str(), "success"),
            Err(e) => {
                record_operation(operation, self.family.as_str(), e.kind());
                record_error(e.kind());
            }
        }
    }
}

/// Trim a required identifier, rejecting blanks.
fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, ConciliationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConciliationError::validation(format!(
            "{} is required",
            field
        )));
    }
    Ok(trimmed)
}

/// One engine per family, as held by the HTTP layer.
#[derive(Clone)]
pub struct ConciliationServices {
    pub customer: Arc<ConciliationService>,
    pub supplier: Arc<ConciliationService>,
}

impl ConciliationServices {
    pub fn new(
        accessor: Arc<dyn DocumentAccessor>,
        parties: Arc<dyn PartyResolver>,
        cache: Arc<dyn CacheInvalidationSink>,
        cache_prefix: &str,
    ) -> Self {
        let build = |family| {
            Arc::new(ConciliationService::new(
                family,
                accessor.clone(),
                parties.clone(),
                cache.clone(),
                cache_prefix,
            ))
        };
        Self {
            customer: build(DocumentFamily::Customer),
            supplier: build(DocumentFamily::Supplier),
        }
    }

    pub fn for_family(&self, family: DocumentFamily) -> &Arc<ConciliationService> {
        match family {
            DocumentFamily::Customer => &self.customer,
            DocumentFamily::Supplier => &self.supplier,
        }
    }
}
