//! API route handlers for the gateway.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{
    Json,
    extract::{Path, State},
};
use std::sync::Arc;

use relaycast_core::error::RelaycastError;
use relaycast_core::types::{RetryRequest, TenantCtx};
use relaycast_engine::{Selection, resolve_entities};
use relaycast_ledger::NewCampaign;

use super::server::AppState;

/// Request-level error as an HTTP response.
pub struct ApiError(RelaycastError);

impl From<RelaycastError> for ApiError {
    fn from(err: RelaycastError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RelaycastError::NotFound(_) => StatusCode::NOT_FOUND,
            RelaycastError::Unauthorized(_) => StatusCode::FORBIDDEN,
            RelaycastError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({"ok": false, "error": self.0.to_string()}));
        (status, body).into_response()
    }
}

/// Extract the caller's tenant from the `X-Tenant-Id` header. Tenancy is
/// always explicit — there is no ambient default tenant.
fn tenant(headers: &HeaderMap) -> Result<TenantCtx, ApiError> {
    let id = headers
        .get("X-Tenant-Id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .trim();
    if id.is_empty() {
        return Err(RelaycastError::InvalidRequest("missing X-Tenant-Id header".into()).into());
    }
    Ok(TenantCtx::new(id))
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "relaycast-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Create a campaign.
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewCampaign>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tenant = tenant(&headers)?;
    if body.name.trim().is_empty() {
        return Err(RelaycastError::InvalidRequest("campaign name is required".into()).into());
    }
    if body.template.trim().is_empty() {
        return Err(RelaycastError::InvalidRequest("campaign template is required".into()).into());
    }
    if !body.chat_enabled && !body.email_enabled {
        return Err(
            RelaycastError::InvalidRequest("enable at least one channel".into()).into(),
        );
    }

    let campaign = state.engine.ledger().create_campaign(&tenant, &body)?;
    tracing::info!("📣 Campaign '{}' created for tenant {}", campaign.name, tenant.tenant_id);
    Ok(Json(serde_json::json!({"ok": true, "campaign": campaign})))
}

/// Resolve a recipient selection and dispatch the campaign. The response
/// arrives after the whole paced pass completes.
pub async fn dispatch_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(selection): Json<Selection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tenant = tenant(&headers)?;

    let seeds = match selection {
        Selection::Entities(entities) => resolve_entities(entities),
        Selection::EntityIds(ids) => {
            let Some(source) = &state.source else {
                return Err(RelaycastError::InvalidRequest(
                    "no entity store configured; supply entities inline".into(),
                )
                .into());
            };
            resolve_entities(source.fetch(&tenant, &ids).await?)
        }
    };

    let summary = state.engine.dispatch(&tenant, &id, seeds).await?;
    Ok(Json(serde_json::json!({"ok": true, "summary": summary})))
}

/// Retry failed units. An empty body retries both channels.
pub async fn retry_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<RetryRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tenant = tenant(&headers)?;
    let request = body.map(|Json(r)| r).unwrap_or_default();

    let summary = state.engine.retry(&tenant, &id, &request).await?;
    Ok(Json(serde_json::json!({"ok": true, "summary": summary})))
}

/// Campaign roll-up counters plus per-recipient channel states.
pub async fn campaign_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tenant = tenant(&headers)?;

    let ledger = state.engine.ledger();
    let campaign = ledger.get_campaign(&tenant, &id)?;
    let recipients = ledger.recipients_for(&id)?;

    let recipients: Vec<serde_json::Value> = recipients
        .iter()
        .map(|r| {
            serde_json::json!({
                "id": r.id,
                "source_ref": r.source_ref,
                "name": r.name,
                "chat": r.chat,
                "email": r.email_state,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "ok": true,
        "campaign": {
            "id": campaign.id,
            "name": campaign.name,
            "chat_enabled": campaign.chat_enabled,
            "email_enabled": campaign.email_enabled,
            "sent_count": campaign.sent_count,
            "failed_count": campaign.failed_count,
            "created_at": campaign.created_at,
        },
        "recipients": recipients,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::build_router;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use relaycast_channels::ChannelSender;
    use relaycast_core::config::LinksConfig;
    use relaycast_core::types::{ChannelKind, SendError};
    use relaycast_engine::{DispatchEngine, NoDelayPacer};
    use relaycast_ledger::CampaignLedger;
    use std::time::Duration;
    use tower::ServiceExt;

    struct OkSender(ChannelKind);

    #[async_trait]
    impl ChannelSender for OkSender {
        fn kind(&self) -> ChannelKind {
            self.0
        }
        fn is_configured(&self) -> bool {
            true
        }
        async fn send(
            &self,
            _to: &str,
            _body: &str,
            _subject: Option<&str>,
        ) -> std::result::Result<(), SendError> {
            Ok(())
        }
    }

    fn test_router() -> axum::Router {
        let engine = DispatchEngine::new(
            Arc::new(CampaignLedger::in_memory().unwrap()),
            Arc::new(OkSender(ChannelKind::Chat)),
            Arc::new(OkSender(ChannelKind::Email)),
            Arc::new(NoDelayPacer),
            LinksConfig::default(),
            Duration::from_secs(5),
        );
        build_router(AppState {
            engine: Arc::new(engine),
            source: None,
            start_time: std::time::Instant::now(),
        })
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str, tenant: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json");
        if let Some(tenant) = tenant {
            builder = builder.header("X-Tenant-Id", tenant);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_uptime() {
        let response = test_router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert!(body["uptime_secs"].is_u64());
    }

    #[tokio::test]
    async fn test_create_requires_tenant_header() {
        let response = test_router()
            .oneshot(post(
                "/api/v1/campaigns",
                None,
                serde_json::json!({"name": "x", "template": "y", "chat_enabled": true}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn test_create_then_dispatch_then_status() {
        let router = test_router();

        let response = router
            .clone()
            .oneshot(post(
                "/api/v1/campaigns",
                Some("t1"),
                serde_json::json!({
                    "name": "launch",
                    "template": "Hi {first_name}",
                    "chat_enabled": true,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let id = body["campaign"]["id"].as_str().unwrap().to_string();

        let response = router
            .clone()
            .oneshot(post(
                &format!("/api/v1/campaigns/{id}/recipients/dispatch"),
                Some("t1"),
                serde_json::json!({"entities": [
                    {"id": "e1", "name": "Ana", "phone": "+551"},
                    {"id": "e2", "name": "Bruno", "phone": "+552"},
                ]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["summary"]["dispatched"], 2);
        assert_eq!(body["summary"]["succeeded"], 2);

        let response = router
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/campaigns/{id}/status"))
                    .header("X-Tenant-Id", "t1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["campaign"]["sent_count"], 2);
        assert_eq!(body["recipients"].as_array().unwrap().len(), 2);
        assert_eq!(body["recipients"][0]["chat"]["status"], "sent");
    }

    #[tokio::test]
    async fn test_wrong_tenant_is_forbidden() {
        let router = test_router();

        let response = router
            .clone()
            .oneshot(post(
                "/api/v1/campaigns",
                Some("t1"),
                serde_json::json!({"name": "launch", "template": "Hi", "chat_enabled": true}),
            ))
            .await
            .unwrap();
        let body = json_body(response).await;
        let id = body["campaign"]["id"].as_str().unwrap().to_string();

        let response = router
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/campaigns/{id}/status"))
                    .header("X-Tenant-Id", "t2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unknown_campaign_is_not_found() {
        let response = test_router()
            .oneshot(post(
                "/api/v1/campaigns/nope/retry",
                Some("t1"),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_entity_ids_without_source_rejected() {
        let router = test_router();
        let response = router
            .clone()
            .oneshot(post(
                "/api/v1/campaigns",
                Some("t1"),
                serde_json::json!({"name": "launch", "template": "Hi", "chat_enabled": true}),
            ))
            .await
            .unwrap();
        let body = json_body(response).await;
        let id = body["campaign"]["id"].as_str().unwrap().to_string();

        let response = router
            .oneshot(post(
                &format!("/api/v1/campaigns/{id}/recipients/dispatch"),
                Some("t1"),
                serde_json::json!({"entity_ids": ["e1"]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_campaign_needs_a_channel() {
        let response = test_router()
            .oneshot(post(
                "/api/v1/campaigns",
                Some("t1"),
                serde_json::json!({"name": "launch", "template": "Hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
