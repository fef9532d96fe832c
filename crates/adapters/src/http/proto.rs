//! The JSON envelope and request bodies of the management API.
//!
//! Every response carries `{code, message, data}` with HTTP status 200;
//! semantic failures travel inside the envelope (`code` 400/500 with
//! `data: null`). Non-200 statuses are reserved for transport faults.

use axum::Json;
use domain::common::error::DomainError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct Envelope {
    pub code: u16,
    pub message: String,
    pub data: Value,
}

impl Envelope {
    pub fn success<T: Serialize>(data: T) -> Json<Envelope> {
        Json(Envelope {
            code: 200,
            message: "success".to_string(),
            data: serde_json::to_value(data).unwrap_or(Value::Null),
        })
    }

    pub fn failure(code: u16, message: impl Into<String>) -> Json<Envelope> {
        Json(Envelope {
            code,
            message: message.into(),
            data: Value::Null,
        })
    }

    /// Wrap a service error. Malformed caller input keeps its 400; every
    /// other semantic failure reports as 500 inside the envelope.
    pub fn from_error(err: &DomainError) -> Json<Envelope> {
        let code = match err {
            DomainError::InvalidInput(_) => 400,
            _ => 500,
        };
        Self::failure(code, err.to_string())
    }
}

// ── Request bodies ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub ip_net: String,
    #[serde(default)]
    pub group_id: u64,
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub group_id: u64,
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateActionRequest {
    pub id: u64,
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRuleGroupRequest {
    pub id: u64,
    pub group_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateGroupRequest {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_shape() {
        let Json(env) = Envelope::success(vec!["ban", "allow"]);
        assert_eq!(env.code, 200);
        assert_eq!(env.message, "success");
        assert_eq!(env.data, serde_json::json!(["ban", "allow"]));
    }

    #[test]
    fn failure_envelope_has_null_data() {
        let Json(env) = Envelope::failure(400, "bad input");
        assert_eq!(env.code, 400);
        assert_eq!(env.message, "bad input");
        assert!(env.data.is_null());
    }

    #[test]
    fn invalid_input_maps_to_400_others_to_500() {
        let Json(env) = Envelope::from_error(&DomainError::InvalidInput("nope".to_string()));
        assert_eq!(env.code, 400);
        let Json(env) = Envelope::from_error(&DomainError::NotFound("rule 9".to_string()));
        assert_eq!(env.code, 500);
        let Json(env) =
            Envelope::from_error(&DomainError::BackendUnavailable("iptables".to_string()));
        assert_eq!(env.code, 500);
    }

    #[test]
    fn create_rule_request_defaults_group() {
        let req: CreateRuleRequest =
            serde_json::from_str(r#"{"ip_net":"1.2.3.4","action":"ban"}"#).unwrap();
        assert_eq!(req.group_id, 0);
        assert_eq!(req.action, "ban");
    }

    #[test]
    fn import_request_accepts_text_or_url() {
        let req: ImportRequest =
            serde_json::from_str(r#"{"url":"http://feed.example/list","action":"ban"}"#).unwrap();
        assert!(req.text.is_empty());
        assert_eq!(req.url, "http://feed.example/list");
    }
}
