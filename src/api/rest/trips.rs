use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::trip_flow::TripCommand;
use crate::error::DispatchError;
use crate::models::request::GeoPoint;
use crate::models::trip::{DeliveryTrip, PaymentStatus, TripStatus, TripStatusUpdate};
use crate::service::NewReceipt;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/trips/:id", get(get_trip))
        .route("/trips/:id/status", put(advance_status))
        .route("/trips/:id/location", put(update_location))
        .route("/trips/:id/receipt", post(submit_receipt))
        .route("/trips/:id/payment/confirm", post(confirm_payment))
        .route("/trips/:id/confirm-delivery", post(confirm_delivery))
        .route("/trips/:id/confirm-receipt", post(confirm_receipt))
        .route("/trips/:id/report-problem", post(report_problem))
        .route("/trips/:id/resolve-problem", put(resolve_problem))
        .route("/trips/:id/rate", post(rate_trip))
        .route("/trips/:id/history", get(history))
}

#[derive(Deserialize)]
pub struct AdvanceStatusPayload {
    pub status: TripStatus,
    pub actor_id: Uuid,
    pub location: Option<GeoPoint>,
    pub message: Option<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
    pub confirmation_code: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateLocationPayload {
    pub courier_id: Uuid,
    pub point: GeoPoint,
    pub address: Option<String>,
}

#[derive(Deserialize)]
pub struct SubmitReceiptPayload {
    pub courier_id: Uuid,
    #[serde(flatten)]
    pub receipt: NewReceipt,
}

#[derive(Deserialize)]
pub struct ConfirmPaymentPayload {
    pub customer_id: Uuid,
    pub payment_status: PaymentStatus,
    pub advance_payment: Option<Decimal>,
}

#[derive(Deserialize)]
pub struct ConfirmCodePayload {
    pub actor_id: Uuid,
    pub code: String,
}

#[derive(Deserialize)]
pub struct ReportProblemPayload {
    pub actor_id: Uuid,
    pub description: String,
}

#[derive(Deserialize)]
pub struct ResolveProblemPayload {
    pub actor_id: Uuid,
}

#[derive(Deserialize)]
pub struct RateTripPayload {
    pub actor_id: Uuid,
    pub rating: u8,
    pub review: Option<String>,
}

async fn get_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryTrip>, DispatchError> {
    Ok(Json(state.service.get_trip(id)?))
}

async fn advance_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdvanceStatusPayload>,
) -> Result<Json<DeliveryTrip>, DispatchError> {
    let mut cmd = TripCommand::new(payload.status, payload.actor_id);
    cmd.location = payload.location;
    cmd.message = payload.message;
    cmd.attachments = payload.attachments;
    cmd.confirmation_code = payload.confirmation_code;
    Ok(Json(state.service.advance_trip(id, cmd)?))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationPayload>,
) -> Result<Json<DeliveryTrip>, DispatchError> {
    let trip =
        state
            .service
            .update_location(id, payload.courier_id, payload.point, payload.address)?;
    Ok(Json(trip))
}

async fn submit_receipt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitReceiptPayload>,
) -> Result<Json<DeliveryTrip>, DispatchError> {
    let trip = state
        .service
        .submit_receipt(id, payload.courier_id, payload.receipt)?;
    Ok(Json(trip))
}

/// Webhook-style entry: records what the payment collaborator reports for
/// this trip, then confirms the payment step against it.
async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ConfirmPaymentPayload>,
) -> Result<Json<DeliveryTrip>, DispatchError> {
    state.payments.record(id, payload.payment_status);
    let trip =
        state
            .service
            .confirm_payment(id, payload.customer_id, payload.advance_payment)?;
    Ok(Json(trip))
}

async fn confirm_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ConfirmCodePayload>,
) -> Result<Json<DeliveryTrip>, DispatchError> {
    Ok(Json(state.service.confirm_delivery(
        id,
        payload.actor_id,
        payload.code,
    )?))
}

async fn confirm_receipt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ConfirmCodePayload>,
) -> Result<Json<DeliveryTrip>, DispatchError> {
    Ok(Json(state.service.confirm_receipt(
        id,
        payload.actor_id,
        payload.code,
    )?))
}

async fn report_problem(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReportProblemPayload>,
) -> Result<Json<DeliveryTrip>, DispatchError> {
    Ok(Json(state.service.report_problem(
        id,
        payload.actor_id,
        payload.description,
    )?))
}

async fn resolve_problem(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResolveProblemPayload>,
) -> Result<Json<DeliveryTrip>, DispatchError> {
    Ok(Json(state.service.resolve_problem(id, payload.actor_id)?))
}

async fn rate_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RateTripPayload>,
) -> Result<Json<DeliveryTrip>, DispatchError> {
    Ok(Json(state.service.rate_trip(
        id,
        payload.actor_id,
        payload.rating,
        payload.review,
    )?))
}

async fn history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TripStatusUpdate>>, DispatchError> {
    Ok(Json(state.service.status_history(id)?))
}
