//! SMS gateway webhook handlers
//!
//! POST /webhooks/sms/inbound — owner replies, answered with the reply text
//! wrapped in the gateway's XML markup. Duplicate gateway message ids are
//! an idempotent no-op. Malformed payloads get the deterministic fallback
//! message and mutate nothing.
//!
//! POST /webhooks/sms/status — delivery receipts; best-effort, always 200.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Form, Router,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::services::conversation::{InboundOutcome, FALLBACK_REPLY};
use crate::AppState;

const SECRET_HEADER: &str = "x-webhook-secret";

/// Inbound SMS form payload; all fields optional so malformed requests
/// reach the handler instead of a framework rejection
#[derive(Debug, Deserialize)]
pub struct InboundSmsForm {
    #[serde(rename = "From")]
    pub from: Option<String>,
    #[serde(rename = "Body")]
    pub body: Option<String>,
    #[serde(rename = "MessageSid")]
    pub message_sid: Option<String>,
}

/// Delivery status callback payload
#[derive(Debug, Deserialize)]
pub struct StatusCallbackForm {
    #[serde(rename = "MessageSid")]
    pub message_sid: Option<String>,
    #[serde(rename = "MessageStatus")]
    pub message_status: Option<String>,
}

/// POST /webhooks/sms/inbound
pub async fn inbound_sms(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<InboundSmsForm>,
) -> ApiResult<Response> {
    // A configured secret gates the endpoint; forged requests get a plain
    // 403, not a conversational reply
    if let Some(expected) = &state.webhook_secret {
        let provided = headers
            .get(SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if provided != expected {
            tracing::warn!("Inbound webhook rejected: bad or missing secret");
            return Err(ApiError::Forbidden("invalid webhook secret".to_string()));
        }
    }

    let (Some(from), Some(body), Some(message_sid)) = (form.from, form.body, form.message_sid)
    else {
        // Validation failure: deterministic fallback, no state mutation
        tracing::warn!("Inbound webhook payload missing required fields");
        return Ok(gateway_response(Some(FALLBACK_REPLY)));
    };

    let outcome = state
        .conversation
        .handle_inbound(&from, &body, &message_sid)
        .await;

    Ok(match outcome {
        InboundOutcome::Reply(reply) => gateway_response(Some(&reply)),
        InboundOutcome::Duplicate => gateway_response(None),
    })
}

/// POST /webhooks/sms/status
///
/// Always acknowledges 200, even on internal failure; delivery receipts
/// are best-effort bookkeeping.
pub async fn sms_status(
    State(state): State<AppState>,
    Form(form): Form<StatusCallbackForm>,
) -> StatusCode {
    let (Some(message_sid), Some(message_status)) = (form.message_sid, form.message_status) else {
        return StatusCode::OK;
    };

    let Some(status) = map_gateway_status(&message_status) else {
        tracing::debug!(status = %message_status, "Ignoring unrecognized delivery status");
        return StatusCode::OK;
    };

    match crate::db::notifications::update_delivery_status(&state.db, &message_sid, status).await {
        Ok(0) => {
            tracing::debug!(gateway_message_id = %message_sid, "Status callback for unknown message");
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(
                gateway_message_id = %message_sid,
                error = %e,
                "Failed to record delivery status"
            );
        }
    }

    StatusCode::OK
}

/// Map the gateway's status vocabulary onto ours
fn map_gateway_status(gateway_status: &str) -> Option<&'static str> {
    match gateway_status {
        "queued" | "accepted" => Some("queued"),
        "sent" | "sending" => Some("sent"),
        "delivered" => Some("delivered"),
        "failed" | "undelivered" => Some("failed"),
        _ => None,
    }
}

/// Wrap a reply in the gateway's response markup
fn gateway_response(message: Option<&str>) -> Response {
    let body = match message {
        Some(text) => format!(
            "<Response><Message>{}</Message></Response>",
            xml_escape(text)
        ),
        None => "<Response></Response>".to_string(),
    };

    ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Build webhook routes
pub fn webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/webhooks/sms/inbound", post(inbound_sms))
        .route("/webhooks/sms/status", post(sms_status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xml_escaping_covers_markup_characters() {
        assert_eq!(
            xml_escape("a & b < c > \"d\" 'e'"),
            "a &amp; b &lt; c &gt; &quot;d&quot; &apos;e&apos;"
        );
    }

    #[test]
    fn gateway_status_mapping() {
        assert_eq!(map_gateway_status("delivered"), Some("delivered"));
        assert_eq!(map_gateway_status("undelivered"), Some("failed"));
        assert_eq!(map_gateway_status("sending"), Some("sent"));
        assert_eq!(map_gateway_status("mystery"), None);
    }
}
