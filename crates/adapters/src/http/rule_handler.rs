use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use domain::net::parse_ip_net;
use domain::rule::entity::{Action, GroupId, RuleId};
use infrastructure::constants::MAX_IMPORT_BODY_BYTES;

use super::fetch::fetch_text_capped;
use super::proto::{
    CreateRuleRequest, Envelope, ImportRequest, UpdateActionRequest, UpdateRuleGroupRequest,
};
use super::state::AppState;

fn parse_key(raw: &str, what: &str) -> Result<u64, Json<Envelope>> {
    raw.parse::<u64>()
        .map_err(|_| Envelope::failure(400, format!("invalid {what} '{raw}'")))
}

/// `GET /api/ip` — every rule, with its group embedded.
pub async fn list_rules(State(state): State<Arc<AppState>>) -> Json<Envelope> {
    match state.policy.list_rules() {
        Ok(rules) => Envelope::success(rules),
        Err(err) => Envelope::from_error(&err),
    }
}

/// `GET /api/ip/:groupId` — rules belonging to one group.
pub async fn list_rules_by_group(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
) -> Json<Envelope> {
    let group_id = match parse_key(&group_id, "group id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.policy.list_rules_by_group(GroupId(group_id)) {
        Ok(rules) => Envelope::success(rules),
        Err(err) => Envelope::from_error(&err),
    }
}

/// `POST /api/ip` — create a rule or transition an existing one.
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateRuleRequest>, JsonRejection>,
) -> Json<Envelope> {
    let Ok(Json(req)) = payload else {
        return Envelope::failure(400, "malformed request body");
    };
    if req.ip_net.is_empty() {
        return Envelope::failure(400, "ip_net is required");
    }
    if parse_ip_net(&req.ip_net).is_err() {
        return Envelope::failure(400, "invalid IP address or CIDR");
    }
    let action = match Action::parse(&req.action) {
        Ok(action) => action,
        Err(err) => return Envelope::from_error(&err),
    };

    match state
        .policy
        .create_or_update_rule(&req.ip_net, GroupId(req.group_id), action)
    {
        Ok(()) => Envelope::success("rule applied"),
        Err(err) => Envelope::from_error(&err),
    }
}

/// `POST /api/ip/import` — bulk import from text or a fetched URL.
pub async fn import_rules(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ImportRequest>, JsonRejection>,
) -> Json<Envelope> {
    let Ok(Json(req)) = payload else {
        return Envelope::failure(400, "malformed request body");
    };
    let action = match Action::parse(&req.action) {
        Ok(action) => action,
        Err(err) => return Envelope::from_error(&err),
    };

    let text = if req.url.is_empty() {
        req.text
    } else {
        tracing::info!(url = %req.url, "importing from url");
        match fetch_text_capped(&state.http_client, &req.url, MAX_IMPORT_BODY_BYTES).await {
            Ok(body) => body,
            Err(err) => return Envelope::from_error(&err),
        }
    };

    match state
        .policy
        .import_rules(&text, GroupId(req.group_id), action)
    {
        Ok(outcome) => Envelope::success(outcome),
        Err(err) => Envelope::from_error(&err),
    }
}

/// `DELETE /api/ip/:id` — remove a rule from kernel and catalog.
pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<Envelope> {
    let id = match parse_key(&id, "rule id") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.policy.delete_rule(RuleId(id)) {
        Ok(()) => Envelope::success("rule removed"),
        Err(err) => Envelope::from_error(&err),
    }
}

/// `GET /api/ip/action` — the known action tags.
pub async fn list_actions(State(state): State<Arc<AppState>>) -> Json<Envelope> {
    Envelope::success(state.policy.actions())
}

/// `PUT /api/ip/action` — transition a rule's action.
pub async fn update_rule_action(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UpdateActionRequest>, JsonRejection>,
) -> Json<Envelope> {
    let Ok(Json(req)) = payload else {
        return Envelope::failure(400, "malformed request body");
    };
    let action = match Action::parse(&req.action) {
        Ok(action) => action,
        Err(err) => return Envelope::from_error(&err),
    };
    match state.policy.update_rule_action(RuleId(req.id), action) {
        Ok(()) => Envelope::success("action updated"),
        Err(err) => Envelope::from_error(&err),
    }
}

/// `PUT /api/ip/group` — move a rule into another group.
pub async fn update_rule_group(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UpdateRuleGroupRequest>, JsonRejection>,
) -> Json<Envelope> {
    let Ok(Json(req)) = payload else {
        return Envelope::failure(400, "malformed request body");
    };
    match state
        .policy
        .update_rule_group(RuleId(req.id), GroupId(req.group_id))
    {
        Ok(()) => Envelope::success("rule group updated"),
        Err(err) => Envelope::from_error(&err),
    }
}
