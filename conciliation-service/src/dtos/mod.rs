pub mod conciliations;

pub use conciliations::{AssignRequest, DissolveParams, ListGroupsParams};
