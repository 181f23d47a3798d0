use crate::models::DocumentRef;
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ListGroupsParams {
    #[validate(length(min = 1, message = "party cannot be empty"))]
    pub party: String,
    #[validate(length(min = 1, message = "company cannot be empty"))]
    pub company: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AssignRequest {
    #[validate(length(min = 1, message = "party cannot be empty"))]
    pub party: String,
    #[validate(length(min = 1, message = "company cannot be empty"))]
    pub company: String,
    #[serde(default)]
    pub documents: Vec<DocumentRef>,
    /// Extend this group instead of creating one.
    pub group_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DissolveParams {
    pub force: Option<bool>,
}
