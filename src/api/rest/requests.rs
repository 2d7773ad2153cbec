use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::offer::DeliveryOffer;
use crate::models::request::DeliveryRequest;
use crate::models::trip::DeliveryTrip;
use crate::service::NewRequest;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/requests", post(create_request))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/cancel", put(cancel_request))
        .route("/requests/:id/trip", get(trip_for_request))
        .route(
            "/requests/:id/offers",
            post(submit_offer).get(list_offers),
        )
        .route(
            "/requests/:id/offers/:offer_id/accept",
            post(accept_offer),
        )
        .route("/offers/:offer_id/withdraw", post(withdraw_offer))
}

#[derive(Deserialize)]
pub struct SubmitOfferPayload {
    pub courier_id: Uuid,
    pub delivery_fee: Decimal,
    pub message: Option<String>,
}

#[derive(Deserialize)]
pub struct AcceptOfferPayload {
    pub customer_id: Uuid,
}

#[derive(Deserialize)]
pub struct CancelRequestPayload {
    pub actor_id: Uuid,
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct WithdrawOfferPayload {
    pub courier_id: Uuid,
}

async fn create_request(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewRequest>,
) -> Result<Json<DeliveryRequest>, DispatchError> {
    let request = state.service.create_request(payload)?;
    Ok(Json(request))
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryRequest>, DispatchError> {
    Ok(Json(state.service.get_request(id)?))
}

async fn cancel_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelRequestPayload>,
) -> Result<Json<DeliveryRequest>, DispatchError> {
    let request = state
        .service
        .cancel_request(id, payload.actor_id, payload.reason)?;
    Ok(Json(request))
}

async fn trip_for_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryTrip>, DispatchError> {
    state.service.get_request(id)?;
    state
        .service
        .trip_for_request(id)
        .map(Json)
        .ok_or_else(|| DispatchError::NotFound(format!("trip for request {id}")))
}

async fn submit_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitOfferPayload>,
) -> Result<Json<DeliveryOffer>, DispatchError> {
    let offer = state.service.submit_offer(
        id,
        payload.courier_id,
        payload.delivery_fee,
        payload.message,
    )?;
    Ok(Json(offer))
}

async fn list_offers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DeliveryOffer>>, DispatchError> {
    Ok(Json(state.service.list_offers(id)?))
}

async fn accept_offer(
    State(state): State<Arc<AppState>>,
    Path((id, offer_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<AcceptOfferPayload>,
) -> Result<Json<DeliveryTrip>, DispatchError> {
    let trip = state
        .service
        .accept_offer(id, offer_id, payload.customer_id)?;
    Ok(Json(trip))
}

async fn withdraw_offer(
    State(state): State<Arc<AppState>>,
    Path(offer_id): Path<Uuid>,
    Json(payload): Json<WithdrawOfferPayload>,
) -> Result<Json<DeliveryOffer>, DispatchError> {
    Ok(Json(
        state.service.withdraw_offer(offer_id, payload.courier_id)?,
    ))
}
