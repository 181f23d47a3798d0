//! Services module for conciliation-service.

pub mod accessor;
pub mod cache;
pub mod conciliation;
pub mod erpnext;
pub mod error;
pub mod metrics;
pub mod party;

pub use accessor::DocumentAccessor;
pub use cache::{CacheInvalidationSink, NoopCacheSink, RedisCacheSink};
pub use conciliation::{ConciliationService, ConciliationServices};
pub use erpnext::ErpNextClient;
pub use error::ConciliationError;
pub use metrics::{get_metrics, init_metrics};
pub use party::{ErpNextPartyResolver, PartyError, PartyResolver};
