use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use delivery_dispatch::api::rest::router;
use delivery_dispatch::state::AppState;

fn setup() -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(1024));
    (router(state.clone()), state)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn request_payload(customer_id: Uuid) -> Value {
    json!({
        "customer_id": customer_id,
        "title": "tea and sugar from any store",
        "description": "red tea please",
        "request_type": "GROCERY",
        "items": [
            { "name": "tea", "quantity": "2 kg", "notes": "red tea" },
            { "name": "sugar", "quantity": "1 kg", "notes": null }
        ],
        "delivery_location": {
            "address": "12 Nile St, apartment 4",
            "point": { "lat": 30.0444, "lng": 31.2357 },
            "notes": "second floor",
            "phone": "+201000000000"
        },
        "customer_budget": "300.00",
        "preferred_delivery_time": "ASAP",
        "priority": "NORMAL"
    })
}

async fn create_request(app: &axum::Router, customer_id: Uuid) -> Value {
    let res = app
        .clone()
        .oneshot(json_request("POST", "/requests", request_payload(customer_id)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    body_json(res).await
}

async fn submit_offer(app: &axum::Router, request_id: &str, courier_id: Uuid, fee: &str) -> Value {
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/requests/{request_id}/offers"),
            json!({ "courier_id": courier_id, "delivery_fee": fee, "message": "on my way" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    body_json(res).await
}

async fn advance(
    app: &axum::Router,
    trip_id: &str,
    status: &str,
    actor_id: Uuid,
) -> axum::response::Response {
    app.clone()
        .oneshot(json_request(
            "PUT",
            &format!("/trips/{trip_id}/status"),
            json!({ "status": status, "actor_id": actor_id }),
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["requests"], 0);
    assert_eq!(body["offers"], 0);
    assert_eq!(body["trips"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    assert!(body.contains("requests_created_total"));
    assert!(body.contains("active_trips"));
}

#[tokio::test]
async fn create_request_starts_pending() {
    let (app, _state) = setup();
    let request = create_request(&app, Uuid::new_v4()).await;

    assert_eq!(request["status"], "PENDING");
    assert!(request["accepted_offer_id"].is_null());
    assert_eq!(request["customer_budget"], "300.00");
    assert_eq!(request["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn create_request_empty_title_returns_400() {
    let (app, _state) = setup();
    let mut payload = request_payload(Uuid::new_v4());
    payload["title"] = json!("   ");
    let res = app
        .oneshot(json_request("POST", "/requests", payload))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_request_without_items_returns_400() {
    let (app, _state) = setup();
    let mut payload = request_payload(Uuid::new_v4());
    payload["items"] = json!([]);
    let res = app
        .oneshot(json_request("POST", "/requests", payload))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_request_negative_budget_returns_400() {
    let (app, _state) = setup();
    let mut payload = request_payload(Uuid::new_v4());
    payload["customer_budget"] = json!("-1.00");
    let res = app
        .oneshot(json_request("POST", "/requests", payload))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn first_offer_moves_request_to_offers_received() {
    let (app, _state) = setup();
    let request = create_request(&app, Uuid::new_v4()).await;
    let request_id = request["id"].as_str().unwrap();

    let offer = submit_offer(&app, request_id, Uuid::new_v4(), "30.00").await;
    assert_eq!(offer["status"], "OPEN");
    assert_eq!(offer["delivery_fee"], "30.00");

    let res = app
        .oneshot(get_request(&format!("/requests/{request_id}")))
        .await
        .unwrap();
    let request = body_json(res).await;
    assert_eq!(request["status"], "OFFERS_RECEIVED");
}

#[tokio::test]
async fn customer_cannot_offer_on_own_request() {
    let (app, _state) = setup();
    let customer = Uuid::new_v4();
    let request = create_request(&app, customer).await;
    let request_id = request["id"].as_str().unwrap();

    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/requests/{request_id}/offers"),
            json!({ "courier_id": customer, "delivery_fee": "30.00" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn only_the_owner_can_accept_an_offer() {
    let (app, _state) = setup();
    let request = create_request(&app, Uuid::new_v4()).await;
    let request_id = request["id"].as_str().unwrap();
    let offer = submit_offer(&app, request_id, Uuid::new_v4(), "30.00").await;
    let offer_id = offer["id"].as_str().unwrap();

    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/requests/{request_id}/offers/{offer_id}/accept"),
            json!({ "customer_id": Uuid::new_v4() }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn acceptance_is_exclusive_and_rejects_the_other_offers() {
    let (app, state) = setup();
    let customer = Uuid::new_v4();
    let request = create_request(&app, customer).await;
    let request_id = request["id"].as_str().unwrap();

    let winning = submit_offer(&app, request_id, Uuid::new_v4(), "30.00").await;
    let losing = submit_offer(&app, request_id, Uuid::new_v4(), "25.00").await;
    let winning_id = winning["id"].as_str().unwrap();
    let losing_id = losing["id"].as_str().unwrap();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/requests/{request_id}/offers/{winning_id}/accept"),
            json!({ "customer_id": customer }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let trip = body_json(res).await;
    assert_eq!(trip["trip_status"], "ACCEPTED");
    assert_eq!(trip["delivery_fee"], "30.00");

    let res = app
        .clone()
        .oneshot(get_request(&format!("/requests/{request_id}/offers")))
        .await
        .unwrap();
    let offers = body_json(res).await;
    let statuses: Vec<&str> = offers
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["status"].as_str().unwrap())
        .collect();
    assert!(statuses.contains(&"ACCEPTED"));
    assert!(statuses.contains(&"REJECTED"));

    // The losing offer can no longer be accepted; the reservation, not the
    // offer's rejected status, is what the late caller observes.
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/requests/{request_id}/offers/{losing_id}/accept"),
            json!({ "customer_id": customer }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // Exactly one trip exists for the request.
    let res = app
        .oneshot(get_request(&format!("/requests/{request_id}/trip")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["trip_status"], "ACCEPTED");
    let (_, _, trips) = state.service.counts();
    assert_eq!(trips, 1);
}

#[tokio::test]
async fn concurrent_acceptances_produce_one_trip() {
    let (app, state) = setup();
    let customer = Uuid::new_v4();
    let request = create_request(&app, customer).await;
    let request_id: Uuid = request["id"].as_str().unwrap().parse().unwrap();

    let mut offer_ids = Vec::new();
    for _ in 0..5 {
        let offer = submit_offer(
            &app,
            &request_id.to_string(),
            Uuid::new_v4(),
            "30.00",
        )
        .await;
        offer_ids.push(offer["id"].as_str().unwrap().parse::<Uuid>().unwrap());
    }

    let handles: Vec<_> = offer_ids
        .into_iter()
        .map(|offer_id| {
            let state = state.clone();
            tokio::spawn(async move {
                state.service.accept_offer(request_id, offer_id, customer)
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    let (_, _, trips) = state.service.counts();
    assert_eq!(trips, 1);
}

#[tokio::test]
async fn full_trip_lifecycle_reconciles_money() {
    let (app, _state) = setup();
    let customer = Uuid::new_v4();
    let courier = Uuid::new_v4();

    let request = create_request(&app, customer).await;
    let request_id = request["id"].as_str().unwrap().to_string();
    let offer = submit_offer(&app, &request_id, courier, "30.00").await;
    let offer_id = offer["id"].as_str().unwrap();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/requests/{request_id}/offers/{offer_id}/accept"),
            json!({ "customer_id": customer }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let trip = body_json(res).await;
    let trip_id = trip["id"].as_str().unwrap().to_string();
    let delivery_code = trip["confirmation_codes"]["delivery_code"]
        .as_str()
        .unwrap()
        .to_string();
    let customer_code = trip["confirmation_codes"]["customer_code"]
        .as_str()
        .unwrap()
        .to_string();
    assert_ne!(delivery_code, customer_code);

    // A stranger cannot drive the courier's edge.
    let res = advance(&app, &trip_id, "HEADING_TO_PICKUP", Uuid::new_v4()).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    for status in ["HEADING_TO_PICKUP", "AT_PICKUP_LOCATION", "SHOPPING"] {
        let res = advance(&app, &trip_id, status, courier).await;
        assert_eq!(res.status(), StatusCode::OK, "transition to {status}");
    }

    // Receipt of 250.00 against a 30.00 fee.
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/trips/{trip_id}/receipt"),
            json!({
                "courier_id": courier,
                "image_url": "https://cdn.example/receipts/1.jpg",
                "total_amount": "250.00",
                "items": [{ "name": "tea", "quantity": "2 kg", "notes": null }]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let trip = body_json(res).await;
    assert_eq!(trip["trip_status"], "RECEIPT_UPLOADED");
    assert_eq!(trip["items_cost"], "250.00");

    // The request mirrors the receipt.
    let res = app
        .clone()
        .oneshot(get_request(&format!("/requests/{request_id}")))
        .await
        .unwrap();
    let mirrored = body_json(res).await;
    assert_eq!(mirrored["status"], "RECEIPT_SUBMITTED");
    assert_eq!(mirrored["actual_receipt_value"], "250.00");

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/trips/{trip_id}/payment/confirm"),
            json!({
                "customer_id": customer,
                "payment_status": "ADVANCE_PAID",
                "advance_payment": "100.00"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let trip = body_json(res).await;
    assert_eq!(trip["trip_status"], "PAYMENT_CONFIRMED");
    assert_eq!(trip["payment_status"], "ADVANCE_PAID");

    for status in ["HEADING_TO_DELIVERY", "AT_DELIVERY_LOCATION"] {
        let res = advance(&app, &trip_id, status, courier).await;
        assert_eq!(res.status(), StatusCode::OK, "transition to {status}");
    }

    // Wrong code: rejected, no state change, safe to retry.
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/trips/{trip_id}/confirm-delivery"),
            json!({ "actor_id": courier, "code": "000000" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/trips/{trip_id}/confirm-delivery"),
            json!({ "actor_id": courier, "code": delivery_code }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let trip = body_json(res).await;
    assert_eq!(trip["trip_status"], "DELIVERED");

    let res = app
        .clone()
        .oneshot(get_request(&format!("/trips/{trip_id}/history")))
        .await
        .unwrap();
    let rows_before_duplicate = body_json(res).await.as_array().unwrap().len();

    // The delivery code is single-use.
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/trips/{trip_id}/confirm-delivery"),
            json!({ "actor_id": courier, "code": delivery_code }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = app
        .clone()
        .oneshot(get_request(&format!("/trips/{trip_id}/history")))
        .await
        .unwrap();
    assert_eq!(
        body_json(res).await.as_array().unwrap().len(),
        rows_before_duplicate
    );

    // Customer confirmation closes both machines and reconciles money.
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/trips/{trip_id}/confirm-receipt"),
            json!({ "actor_id": customer, "code": customer_code }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let trip = body_json(res).await;
    assert_eq!(trip["trip_status"], "COMPLETED");
    assert_eq!(trip["total_trip_cost"], "280.00");
    assert_eq!(trip["remaining_payment"], "180.00");
    assert_eq!(trip["payment_status"], "COMPLETED");
    assert!(trip["trip_completed_at"].is_string());

    let res = app
        .clone()
        .oneshot(get_request(&format!("/requests/{request_id}")))
        .await
        .unwrap();
    let request = body_json(res).await;
    assert_eq!(request["status"], "COMPLETED");
    assert_eq!(request["total_amount"], "280.00");

    // Full audit trail: creation plus every transition, in order.
    let res = app
        .clone()
        .oneshot(get_request(&format!("/trips/{trip_id}/history")))
        .await
        .unwrap();
    let history = body_json(res).await;
    let rows = history.as_array().unwrap();
    assert_eq!(rows.len(), 11);
    assert!(rows[0]["previous_status"].is_null());
    assert_eq!(rows[0]["new_status"], "ACCEPTED");
    assert_eq!(rows[rows.len() - 1]["new_status"], "COMPLETED");
    assert_eq!(rows[rows.len() - 1]["is_automated"], true);
    assert_eq!(rows[rows.len() - 2]["new_status"], "CUSTOMER_CONFIRMED");
    assert_eq!(rows[rows.len() - 2]["is_automated"], false);
}

#[tokio::test]
async fn skipping_a_trip_state_is_rejected() {
    let (app, state) = setup();
    let customer = Uuid::new_v4();
    let courier = Uuid::new_v4();

    let request = create_request(&app, customer).await;
    let request_id: Uuid = request["id"].as_str().unwrap().parse().unwrap();
    let offer = submit_offer(&app, &request_id.to_string(), courier, "30.00").await;
    let offer_id: Uuid = offer["id"].as_str().unwrap().parse().unwrap();
    let trip = state
        .service
        .accept_offer(request_id, offer_id, customer)
        .unwrap();

    let res = advance(&app, &trip.id.to_string(), "SHOPPING", courier).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let refreshed = state.service.get_trip(trip.id).unwrap();
    assert_eq!(refreshed.trip_status, trip.trip_status);
}

#[tokio::test]
async fn cancellation_before_shopping_cancels_both_machines() {
    let (app, state) = setup();
    let customer = Uuid::new_v4();
    let courier = Uuid::new_v4();

    let request = create_request(&app, customer).await;
    let request_id: Uuid = request["id"].as_str().unwrap().parse().unwrap();
    let offer = submit_offer(&app, &request_id.to_string(), courier, "30.00").await;
    let offer_id: Uuid = offer["id"].as_str().unwrap().parse().unwrap();
    let trip = state
        .service
        .accept_offer(request_id, offer_id, customer)
        .unwrap();

    let res = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/requests/{request_id}/cancel"),
            json!({ "actor_id": customer, "reason": "changed my mind" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let request = body_json(res).await;
    assert_eq!(request["status"], "CANCELLED");

    let refreshed = state.service.get_trip(trip.id).unwrap();
    assert_eq!(refreshed.trip_status.as_str(), "CANCELLED");
}

#[tokio::test]
async fn cancellation_after_shopping_begins_is_rejected() {
    let (app, state) = setup();
    let customer = Uuid::new_v4();
    let courier = Uuid::new_v4();

    let request = create_request(&app, customer).await;
    let request_id: Uuid = request["id"].as_str().unwrap().parse().unwrap();
    let offer = submit_offer(&app, &request_id.to_string(), courier, "30.00").await;
    let offer_id: Uuid = offer["id"].as_str().unwrap().parse().unwrap();
    let trip = state
        .service
        .accept_offer(request_id, offer_id, customer)
        .unwrap();
    let trip_id = trip.id.to_string();

    for status in ["HEADING_TO_PICKUP", "AT_PICKUP_LOCATION", "SHOPPING"] {
        let res = advance(&app, &trip_id, status, courier).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = app
        .oneshot(json_request(
            "PUT",
            &format!("/requests/{request_id}/cancel"),
            json!({ "actor_id": customer, "reason": "too late" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn customer_cannot_cancel_the_trip_directly_after_shopping_begins() {
    let (app, state) = setup();
    let customer = Uuid::new_v4();
    let courier = Uuid::new_v4();

    let request = create_request(&app, customer).await;
    let request_id: Uuid = request["id"].as_str().unwrap().parse().unwrap();
    let offer = submit_offer(&app, &request_id.to_string(), courier, "30.00").await;
    let offer_id: Uuid = offer["id"].as_str().unwrap().parse().unwrap();
    let trip = state
        .service
        .accept_offer(request_id, offer_id, customer)
        .unwrap();
    let trip_id = trip.id.to_string();

    for status in ["HEADING_TO_PICKUP", "AT_PICKUP_LOCATION", "SHOPPING"] {
        let res = advance(&app, &trip_id, status, courier).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    // The status route is not a side door around the cancellation window.
    let res = advance(&app, &trip_id, "CANCELLED", customer).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let refreshed = state.service.get_trip(trip.id).unwrap();
    assert_eq!(refreshed.trip_status.as_str(), "SHOPPING");
    let request = state.service.get_request(request_id).unwrap();
    assert_eq!(request.status.as_str(), "SHOPPING_IN_PROGRESS");
}

#[tokio::test]
async fn withdrawn_offers_cannot_be_accepted() {
    let (app, _state) = setup();
    let customer = Uuid::new_v4();
    let courier = Uuid::new_v4();

    let request = create_request(&app, customer).await;
    let request_id = request["id"].as_str().unwrap().to_string();
    let offer = submit_offer(&app, &request_id, courier, "30.00").await;
    let offer_id = offer["id"].as_str().unwrap();

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/offers/{offer_id}/withdraw"),
            json!({ "courier_id": courier }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["status"], "WITHDRAWN");

    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/requests/{request_id}/offers/{offer_id}/accept"),
            json!({ "customer_id": customer }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn stale_requests_expire_exactly_once() {
    let (app, state) = setup();
    let customer = Uuid::new_v4();

    let mut payload = request_payload(customer);
    payload["expires_at"] = json!((Utc::now() - Duration::seconds(1)).to_rfc3339());
    let res = app
        .clone()
        .oneshot(json_request("POST", "/requests", payload))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let request = body_json(res).await;
    let request_id = request["id"].as_str().unwrap().to_string();

    submit_offer(&app, &request_id, Uuid::new_v4(), "30.00").await;

    assert_eq!(state.service.expire_stale(Utc::now()), 1);
    // The sweep is idempotent.
    assert_eq!(state.service.expire_stale(Utc::now()), 0);

    let res = app
        .clone()
        .oneshot(get_request(&format!("/requests/{request_id}")))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["status"], "EXPIRED");

    let res = app
        .oneshot(get_request(&format!("/requests/{request_id}/offers")))
        .await
        .unwrap();
    let offers = body_json(res).await;
    assert_eq!(offers[0]["status"], "EXPIRED");
}

#[tokio::test]
async fn expired_requests_reject_new_offers() {
    let (app, state) = setup();
    let customer = Uuid::new_v4();

    let mut payload = request_payload(customer);
    payload["expires_at"] = json!((Utc::now() - Duration::seconds(1)).to_rfc3339());
    let res = app
        .clone()
        .oneshot(json_request("POST", "/requests", payload))
        .await
        .unwrap();
    let request = body_json(res).await;
    let request_id = request["id"].as_str().unwrap().to_string();

    state.service.expire_stale(Utc::now());

    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/requests/{request_id}/offers"),
            json!({ "courier_id": Uuid::new_v4(), "delivery_fee": "30.00" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn problem_report_pauses_and_recovery_resumes_the_trip() {
    let (app, state) = setup();
    let customer = Uuid::new_v4();
    let courier = Uuid::new_v4();

    let request = create_request(&app, customer).await;
    let request_id: Uuid = request["id"].as_str().unwrap().parse().unwrap();
    let offer = submit_offer(&app, &request_id.to_string(), courier, "30.00").await;
    let offer_id: Uuid = offer["id"].as_str().unwrap().parse().unwrap();
    let trip = state
        .service
        .accept_offer(request_id, offer_id, customer)
        .unwrap();
    let trip_id = trip.id.to_string();

    for status in ["HEADING_TO_PICKUP", "AT_PICKUP_LOCATION", "SHOPPING"] {
        let res = advance(&app, &trip_id, status, courier).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/trips/{trip_id}/report-problem"),
            json!({ "actor_id": courier, "description": "store closed, looking for another" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let paused = body_json(res).await;
    assert_eq!(paused["trip_status"], "PROBLEM_REPORTED");
    assert_eq!(paused["problem_reported_from"], "SHOPPING");

    // The request keeps its last mirrored status while the trip is paused.
    let res = app
        .clone()
        .oneshot(get_request(&format!("/requests/{request_id}")))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["status"], "SHOPPING_IN_PROGRESS");

    let res = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/trips/{trip_id}/resolve-problem"),
            json!({ "actor_id": courier }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let resumed = body_json(res).await;
    assert_eq!(resumed["trip_status"], "SHOPPING");
    assert!(resumed["problems"][0]["resolved_at"].is_string());
}

#[tokio::test]
async fn location_pings_accumulate_distance() {
    let (app, state) = setup();
    let customer = Uuid::new_v4();
    let courier = Uuid::new_v4();

    let request = create_request(&app, customer).await;
    let request_id: Uuid = request["id"].as_str().unwrap().parse().unwrap();
    let offer = submit_offer(&app, &request_id.to_string(), courier, "30.00").await;
    let offer_id: Uuid = offer["id"].as_str().unwrap().parse().unwrap();
    let trip = state
        .service
        .accept_offer(request_id, offer_id, customer)
        .unwrap();
    let trip_id = trip.id.to_string();

    let res = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/trips/{trip_id}/location"),
            json!({ "courier_id": courier, "point": { "lat": 30.0444, "lng": 31.2357 } }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // An unrelated user cannot ping the courier location.
    let res = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/trips/{trip_id}/location"),
            json!({ "courier_id": Uuid::new_v4(), "point": { "lat": 30.05, "lng": 31.24 } }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/trips/{trip_id}/location"),
            json!({ "courier_id": courier, "point": { "lat": 30.0500, "lng": 31.2400 } }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let trip = body_json(res).await;
    assert!(trip["distance_traveled_km"].as_f64().unwrap() > 0.0);
    assert_eq!(trip["route"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn rating_requires_a_completed_trip() {
    let (app, state) = setup();
    let customer = Uuid::new_v4();
    let courier = Uuid::new_v4();

    let request = create_request(&app, customer).await;
    let request_id: Uuid = request["id"].as_str().unwrap().parse().unwrap();
    let offer = submit_offer(&app, &request_id.to_string(), courier, "30.00").await;
    let offer_id: Uuid = offer["id"].as_str().unwrap().parse().unwrap();
    let trip = state
        .service
        .accept_offer(request_id, offer_id, customer)
        .unwrap();

    let res = app
        .oneshot(json_request(
            "POST",
            &format!("/trips/{}/rate", trip.id),
            json!({ "actor_id": customer, "rating": 5, "review": "great" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
