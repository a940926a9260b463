//! Serves the in-memory directories over the HTTP directory binding.
//!
//! Used by the `directory-stub` binary for local runs and by the HTTP
//! adapter tests.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use parley_common::IdentityId;

use super::memory::{MemoryGroupDirectory, MemoryIdentityDirectory};
use super::wire::{
    CreateGroupRequest, CreateGroupResponse, ListGroupsResponse, ListUsersResponse,
    RegisterUserRequest, RegisterUserResponse, SetStatusRequest, SetStatusResponse,
};
use super::{DirectoryError, GroupDirectory, IdentityDirectory};

#[derive(Clone)]
pub struct StubState {
    pub identities: Arc<MemoryIdentityDirectory>,
    pub groups: Arc<MemoryGroupDirectory>,
}

pub fn router(state: StubState) -> Router {
    Router::new()
        .route("/users", get(list_users).post(register_user))
        .route("/users/{id}/status", put(set_status))
        .route("/groups", get(list_groups).post(create_group))
        .with_state(state)
}

fn unavailable(err: DirectoryError) -> StatusCode {
    tracing::warn!(%err, "stub directory unavailable");
    StatusCode::SERVICE_UNAVAILABLE
}

async fn register_user(
    State(state): State<StubState>,
    Json(req): Json<RegisterUserRequest>,
) -> Result<Json<RegisterUserResponse>, StatusCode> {
    if req.display_name.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let id = state
        .identities
        .register_user(&req.display_name)
        .await
        .map_err(unavailable)?;
    tracing::info!(identity_id = %id, display_name = %req.display_name, "stub registered user");
    Ok(Json(RegisterUserResponse { id }))
}

async fn set_status(
    State(state): State<StubState>,
    Path(id): Path<String>,
    Json(req): Json<SetStatusRequest>,
) -> Result<Json<SetStatusResponse>, StatusCode> {
    let success = state
        .identities
        .set_status(&IdentityId::new(id), req.online)
        .await
        .map_err(unavailable)?;
    Ok(Json(SetStatusResponse { success }))
}

async fn list_users(
    State(state): State<StubState>,
) -> Result<Json<ListUsersResponse>, StatusCode> {
    let users = state.identities.list_users().await.map_err(unavailable)?;
    Ok(Json(ListUsersResponse { users }))
}

async fn create_group(
    State(state): State<StubState>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<Json<CreateGroupResponse>, StatusCode> {
    let group_id = state
        .groups
        .create_group(&req.name, &req.member_ids)
        .await
        .map_err(unavailable)?;
    tracing::info!(%group_id, name = %req.name, "stub created group");
    Ok(Json(CreateGroupResponse { group_id }))
}

async fn list_groups(
    State(state): State<StubState>,
) -> Result<Json<ListGroupsResponse>, StatusCode> {
    let groups = state.groups.list_groups().await.map_err(unavailable)?;
    Ok(Json(ListGroupsResponse { groups }))
}
