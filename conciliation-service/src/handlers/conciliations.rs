use crate::dtos::{AssignRequest, DissolveParams, ListGroupsParams};
use crate::models::{AssignmentOutcome, DissolveOutcome, DocumentFamily, ReconciliationGroup};
use crate::services::{ConciliationError, ConciliationService};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use validator::Validate;

fn engine(
    state: &AppState,
    family: &str,
) -> Result<Arc<ConciliationService>, ConciliationError> {
    DocumentFamily::from_path_segment(family)
        .map(|f| state.services.for_family(f).clone())
        .ok_or_else(|| ConciliationError::not_found(format!("Unknown document family: {}", family)))
}

#[tracing::instrument(skip(state))]
pub async fn list_groups(
    State(state): State<AppState>,
    Path(family): Path<String>,
    Query(params): Query<ListGroupsParams>,
) -> Result<Json<Vec<ReconciliationGroup>>, ConciliationError> {
    params.validate()?;
    let engine = engine(&state, &family)?;
    let groups = engine.list_groups(&params.party, &params.company).await?;
    Ok(Json(groups))
}

#[tracing::instrument(skip(state, request), fields(documents = request.documents.len()))]
pub async fn assign_documents(
    State(state): State<AppState>,
    Path(family): Path<String>,
    Json(request): Json<AssignRequest>,
) -> Result<(StatusCode, Json<AssignmentOutcome>), ConciliationError> {
    request.validate()?;
    let engine = engine(&state, &family)?;

    let outcome = engine
        .assign(
            &request.party,
            &request.company,
            &request.documents,
            request.group_id.as_deref(),
        )
        .await?;

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

#[tracing::instrument(skip(state))]
pub async fn dissolve_group(
    State(state): State<AppState>,
    Path((family, group_id)): Path<(String, String)>,
    Query(params): Query<DissolveParams>,
) -> Result<Json<DissolveOutcome>, ConciliationError> {
    let engine = engine(&state, &family)?;
    let outcome = engine
        .dissolve(&group_id, params.force.unwrap_or(false))
        .await?;
    Ok(Json(outcome))
}
