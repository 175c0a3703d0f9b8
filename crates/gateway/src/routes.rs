//! Admin, session and webhook handlers.

use std::sync::Arc;

use {
    axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
    },
    serde::{Deserialize, Serialize},
    serde_json::json,
    tracing::info,
    url::Url,
    wagate_common::TenantId,
    wagate_tenants::TenantRecord,
};

use crate::{
    auth::{Admin, Tenant},
    error::ApiError,
    state::GatewayState,
};

type AppState = State<Arc<GatewayState>>;

// ── Admin ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateTenant {
    pub name: String,
    pub token: String,
}

/// Tenant as listed to administrators. The pending pairing code is left out.
#[derive(Debug, Serialize)]
pub struct TenantView {
    pub id: TenantId,
    pub name: String,
    pub token: String,
    pub webhook: String,
    pub jid: String,
    pub connected: bool,
    pub events: String,
}

impl From<TenantRecord> for TenantView {
    fn from(r: TenantRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            token: r.token,
            webhook: r.webhook,
            jid: r.jid,
            connected: r.connected,
            events: r.events,
        }
    }
}

pub async fn create_tenant(
    _: Admin,
    State(state): AppState,
    Json(req): Json<CreateTenant>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim();
    let token = req.token.trim();
    if name.is_empty() || token.is_empty() {
        return Err(ApiError::BadRequest("name and token are required".into()));
    }
    let services = state.supervisor.services();
    let record = services.store.create(name, token).await?;
    services.cache.seed(&record);
    info!(tenant = %record.id, name = %record.name, "tenant created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": record.id, "name": record.name, "token": record.token })),
    ))
}

pub async fn list_tenants(
    _: Admin,
    State(state): AppState,
) -> Result<Json<Vec<TenantView>>, ApiError> {
    let records = state.supervisor.services().store.list().await?;
    Ok(Json(records.into_iter().map(TenantView::from).collect()))
}

pub async fn delete_tenant(
    _: Admin,
    State(state): AppState,
    Path(token): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.supervisor.delete_tenant(&token).await?;
    Ok(Json(json!({ "deleted": true })))
}

// ── Session ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ConnectRequest {
    #[serde(default)]
    pub subscribe: Vec<String>,
}

pub async fn connect(
    Tenant(info): Tenant,
    State(state): AppState,
    body: Option<Json<ConnectRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let subs = state.supervisor.connect_tenant(&info, &req.subscribe).await?;
    Ok(Json(json!({
        "details": "Connecting",
        "jid": info.jid,
        "subscribe": subs.names(),
    })))
}

pub async fn disconnect(
    Tenant(info): Tenant,
    State(state): AppState,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.supervisor.stop_session(info.id).await?;
    Ok(Json(json!({ "details": "Disconnected" })))
}

pub async fn status(Tenant(info): Tenant, State(state): AppState) -> impl IntoResponse {
    Json(state.supervisor.status(info.id))
}

pub async fn qr(
    Tenant(info): Tenant,
    State(state): AppState,
) -> Result<Json<serde_json::Value>, ApiError> {
    let record = state
        .supervisor
        .services()
        .store
        .get_by_id(info.id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("tenant {} not found", info.id)))?;
    if record.pairing_code.is_empty() {
        return Err(ApiError::NotFound("no pairing code pending".into()));
    }
    Ok(Json(json!({ "qrcode": record.pairing_code })))
}

// ── Webhook ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SetWebhook {
    #[serde(rename = "webhookURL")]
    pub webhook_url: String,
}

pub async fn get_webhook(Tenant(info): Tenant) -> impl IntoResponse {
    let subscribe = info.subscriptions().names();
    Json(json!({ "webhook": info.webhook, "subscribe": subscribe }))
}

/// Absolute `http`/`https` URL with a host. An empty string clears the webhook
/// and is handled by the caller.
fn is_http_url(raw: &str) -> bool {
    Url::parse(raw)
        .is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
}

pub async fn set_webhook(
    Tenant(info): Tenant,
    State(state): AppState,
    Json(req): Json<SetWebhook>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let url = req.webhook_url.trim();
    if !url.is_empty() && !is_http_url(url) {
        return Err(ApiError::BadRequest("webhookURL must be an http(s) URL".into()));
    }
    let services = state.supervisor.services();
    services
        .cache
        .set_webhook(services.store.as_ref(), info.id, &info.token, url)
        .await?;
    info!(tenant = %info.id, url = %url, "webhook updated");
    Ok(Json(json!({ "webhook": url })))
}

// ── Health ───────────────────────────────────────────────────────────────────

pub async fn health(State(state): AppState) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": state.version,
        "sessions": state.supervisor.registry().len(),
        "uptime_secs": state.uptime_secs(),
        "webhook": state.supervisor.services().dispatch.stats(),
    }))
}
