//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use crowdsale::{Amount, Fill, PhaseIndex, PhaseTransition, Timestamp};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::{self, EventRecord, PurchaseRecord};
use crate::errors::{ApiError, Result};
use crate::service::SaleService;

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<SaleService>,
    pub admin_key: Option<String>,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sale", get(get_sale))
        .route("/sale/current-phase", get(get_current_phase))
        .route("/phases/:index", get(get_phase))
        .route("/quote", post(quote))
        .route("/purchase", post(purchase))
        .route("/purchases/:buyer", get(get_buyer_purchases))
        .route("/events", get(get_all_events))
        .route("/admin/start", post(start_sale))
        .route("/admin/fund", post(fund_buyer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct CurrentPhaseResponse {
    pub phase: PhaseIndex,
}

#[derive(Deserialize)]
pub struct QuoteRequest {
    #[serde(with = "crowdsale::amount")]
    pub amount: Amount,
}

#[derive(Serialize)]
pub struct QuoteResponse {
    #[serde(with = "crowdsale::amount")]
    pub amount: Amount,
    #[serde(with = "crowdsale::amount")]
    pub total_cost: Amount,
    pub fills: Vec<Fill>,
    pub transitions: Vec<PhaseTransition>,
    pub evaluated_at: Timestamp,
}

#[derive(Deserialize)]
pub struct PurchaseRequest {
    pub buyer: String,
    #[serde(with = "crowdsale::amount")]
    pub amount: Amount,
}

#[derive(Deserialize)]
pub struct StartRequest {
    pub caller: String,
}

#[derive(Deserialize)]
pub struct FundRequest {
    pub account: String,
    #[serde(with = "crowdsale::amount")]
    pub amount: Amount,
}

#[derive(Serialize)]
pub struct PurchasesResponse {
    pub buyer: String,
    pub count: usize,
    pub purchases: Vec<PurchaseRecord>,
}

#[derive(Serialize)]
pub struct AllEventsResponse {
    pub count: usize,
    pub events: Vec<EventRecord>,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /sale`
pub async fn get_sale(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.service.summary().await)
}

/// `GET /sale/current-phase`
///
/// The phase a purchase made now would start in. Does not advance the sale.
pub async fn get_current_phase(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<CurrentPhaseResponse>> {
    let phase = state.service.active_phase().await?;
    Ok(Json(CurrentPhaseResponse { phase }))
}

/// `GET /phases/:index`
pub async fn get_phase(
    State(state): State<Arc<ApiState>>,
    Path(index): Path<PhaseIndex>,
) -> impl IntoResponse {
    match state.service.phase_details(index).await {
        Ok(details) => (StatusCode::OK, Json(details)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `POST /quote`
pub async fn quote(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>> {
    let plan = state.service.quote(payload.amount).await?;
    Ok(Json(QuoteResponse {
        amount: plan.amount(),
        total_cost: plan.total_cost(),
        fills: plan.fills().to_vec(),
        transitions: plan.transitions().to_vec(),
        evaluated_at: plan.evaluated_at(),
    }))
}

/// `POST /purchase`
pub async fn purchase(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<PurchaseRequest>,
) -> impl IntoResponse {
    match state.service.purchase(&payload.buyer, payload.amount).await {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `GET /purchases/:buyer`
pub async fn get_buyer_purchases(
    State(state): State<Arc<ApiState>>,
    Path(buyer): Path<String>,
) -> Result<Json<PurchasesResponse>> {
    let purchases = db::get_purchases_for_buyer(state.service.pool(), &buyer).await?;
    Ok(Json(PurchasesResponse {
        buyer,
        count: purchases.len(),
        purchases,
    }))
}

/// `GET /events`
pub async fn get_all_events(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<AllEventsResponse>> {
    let events = db::get_all_events(state.service.pool()).await?;
    Ok(Json(AllEventsResponse {
        count: events.len(),
        events,
    }))
}

/// `POST /admin/start`
pub async fn start_sale(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(payload): Json<StartRequest>,
) -> Result<impl IntoResponse> {
    check_admin(&state, &headers)?;
    let summary = state.service.start(&payload.caller).await?;
    Ok((StatusCode::OK, Json(summary)))
}

/// `POST /admin/fund`
///
/// Credits a buyer in the in-process token book (ledger mode only).
pub async fn fund_buyer(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(payload): Json<FundRequest>,
) -> Result<impl IntoResponse> {
    check_admin(&state, &headers)?;
    state
        .service
        .fund_buyer(&payload.account, payload.amount)
        .await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "status": "funded" }))))
}

fn check_admin(state: &ApiState, headers: &HeaderMap) -> Result<()> {
    let Some(expected) = state.admin_key.as_deref() else {
        return Ok(());
    };
    let provided = headers.get("x-admin-key").and_then(|v| v.to_str().ok());
    if provided == Some(expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}
