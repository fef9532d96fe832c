use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use domain::rule::entity::GroupId;

use super::proto::{CreateGroupRequest, Envelope, UpdateGroupRequest};
use super::state::AppState;

/// `GET /api/group` — every group.
pub async fn list_groups(State(state): State<Arc<AppState>>) -> Json<Envelope> {
    match state.policy.list_groups() {
        Ok(groups) => Envelope::success(groups),
        Err(err) => Envelope::from_error(&err),
    }
}

/// `POST /api/group` — create a group.
pub async fn create_group(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateGroupRequest>, JsonRejection>,
) -> Json<Envelope> {
    let Ok(Json(req)) = payload else {
        return Envelope::failure(400, "malformed request body");
    };
    if req.name.is_empty() {
        return Envelope::failure(400, "group name is required");
    }
    match state.policy.create_group(&req.name, &req.description) {
        Ok(group) => Envelope::success(group),
        Err(err) => Envelope::from_error(&err),
    }
}

/// `PUT /api/group` — rename or re-describe a group.
pub async fn update_group(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UpdateGroupRequest>, JsonRejection>,
) -> Json<Envelope> {
    let Ok(Json(req)) = payload else {
        return Envelope::failure(400, "malformed request body");
    };
    if req.id == 0 {
        return Envelope::failure(400, "group id is required");
    }
    if req.name.is_empty() {
        return Envelope::failure(400, "group name is required");
    }
    match state
        .policy
        .update_group(GroupId(req.id), &req.name, &req.description)
    {
        Ok(group) => Envelope::success(group),
        Err(err) => Envelope::from_error(&err),
    }
}

/// `DELETE /api/group/:id` — delete a group; members move to the
/// default group.
pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<Envelope> {
    let Ok(id) = id.parse::<u64>() else {
        return Envelope::failure(400, format!("invalid group id '{id}'"));
    };
    match state.policy.delete_group(GroupId(id)) {
        Ok(()) => Envelope::success("group removed"),
        Err(err) => Envelope::from_error(&err),
    }
}
