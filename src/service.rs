//! The dispatch façade. External callers (REST layer, background sweep,
//! tests) go through `DispatchService`; the request and trip state machines
//! are never driven independently, so their timelines cannot diverge.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::collaborators::{ChatChannel, DispatchEvent, NotificationSink, PaymentGateway};
use crate::engine::request_flow::{self, Applied};
use crate::engine::trip_flow::{self, TripCommand};
use crate::engine::{acceptance, expiry};
use crate::error::DispatchError;
use crate::geo::haversine_km;
use crate::models::offer::{DeliveryOffer, OfferStatus};
use crate::models::request::{
    DeliveryRequest, DeliveryWindow, GeoPoint, LineItem, Location, Priority, RequestStatus,
    RequestType,
};
use crate::models::trip::{
    CourierPosition, DeliveryTrip, ReceiptDetails, ReportedProblem, TripStatus, TripStatusUpdate,
};
use crate::observability::metrics::Metrics;
use crate::store::offers::OfferStore;
use crate::store::requests::RequestStore;
use crate::store::trips::TripStore;

#[derive(Debug, Clone, Deserialize)]
pub struct NewRequest {
    pub customer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub request_type: RequestType,
    pub specific_store_id: Option<Uuid>,
    pub items: Vec<LineItem>,
    pub pickup_location: Option<Location>,
    pub delivery_location: Location,
    pub customer_budget: Option<Decimal>,
    pub estimated_value: Option<Decimal>,
    pub preferred_delivery_time: DeliveryWindow,
    pub specific_delivery_time: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReceipt {
    pub image_url: Option<String>,
    pub total_amount: Decimal,
    pub items: Vec<LineItem>,
}

pub struct DispatchService {
    requests: RequestStore,
    offers: OfferStore,
    trips: TripStore,
    notifier: Arc<dyn NotificationSink>,
    payments: Arc<dyn PaymentGateway>,
    chat: Arc<dyn ChatChannel>,
    metrics: Metrics,
}

impl DispatchService {
    pub fn new(
        notifier: Arc<dyn NotificationSink>,
        payments: Arc<dyn PaymentGateway>,
        chat: Arc<dyn ChatChannel>,
        metrics: Metrics,
    ) -> Self {
        Self {
            requests: RequestStore::default(),
            offers: OfferStore::default(),
            trips: TripStore::default(),
            notifier,
            payments,
            chat,
            metrics,
        }
    }

    pub fn create_request(&self, input: NewRequest) -> Result<DeliveryRequest, DispatchError> {
        if input.title.trim().is_empty() {
            return Err(DispatchError::Validation("title cannot be empty".to_string()));
        }
        if input.items.is_empty() {
            return Err(DispatchError::Validation(
                "request needs at least one item".to_string(),
            ));
        }
        if input.items.iter().any(|item| item.name.trim().is_empty()) {
            return Err(DispatchError::Validation(
                "item names cannot be empty".to_string(),
            ));
        }
        if input.delivery_location.address.trim().is_empty() {
            return Err(DispatchError::Validation(
                "delivery address cannot be empty".to_string(),
            ));
        }
        for (label, amount) in [
            ("customer_budget", input.customer_budget),
            ("estimated_value", input.estimated_value),
        ] {
            if amount.is_some_and(|a| a < Decimal::ZERO) {
                return Err(DispatchError::Validation(format!(
                    "{label} cannot be negative"
                )));
            }
        }
        if input.preferred_delivery_time == DeliveryWindow::SpecificTime
            && input.specific_delivery_time.is_none()
        {
            return Err(DispatchError::Validation(
                "SPECIFIC_TIME window requires a timestamp".to_string(),
            ));
        }
        if input.request_type == RequestType::SpecificStore && input.specific_store_id.is_none() {
            return Err(DispatchError::Validation(
                "SPECIFIC_STORE request requires a store id".to_string(),
            ));
        }

        let now = Utc::now();
        let request = DeliveryRequest {
            id: Uuid::new_v4(),
            customer_id: input.customer_id,
            title: input.title,
            description: input.description,
            request_type: input.request_type,
            specific_store_id: input.specific_store_id,
            items: input.items,
            pickup_location: input.pickup_location,
            delivery_location: input.delivery_location,
            customer_budget: input.customer_budget,
            estimated_value: input.estimated_value,
            actual_receipt_value: None,
            delivery_fee: None,
            total_amount: None,
            preferred_delivery_time: input.preferred_delivery_time,
            specific_delivery_time: input.specific_delivery_time,
            priority: input.priority,
            status: RequestStatus::Pending,
            accepted_offer_id: None,
            chat_id: None,
            rating: None,
            review_comment: None,
            created_at: now,
            updated_at: now,
            expires_at: input.expires_at,
        };

        self.requests.insert(request.clone());
        self.metrics.requests_created_total.inc();
        self.notifier.notify(
            request.customer_id,
            DispatchEvent::RequestCreated {
                request_id: request.id,
            },
        );
        info!(request_id = %request.id, "delivery request created");
        Ok(request)
    }

    pub fn get_request(&self, request_id: Uuid) -> Result<DeliveryRequest, DispatchError> {
        self.requests.get(request_id)
    }

    pub fn submit_offer(
        &self,
        request_id: Uuid,
        courier_id: Uuid,
        delivery_fee: Decimal,
        message: Option<String>,
    ) -> Result<DeliveryOffer, DispatchError> {
        if delivery_fee < Decimal::ZERO {
            return Err(DispatchError::Validation(
                "delivery fee cannot be negative".to_string(),
            ));
        }

        let request = self.requests.get(request_id)?;
        if request.customer_id == courier_id {
            return Err(DispatchError::Validation(
                "cannot offer on your own request".to_string(),
            ));
        }

        let offer = DeliveryOffer {
            id: Uuid::new_v4(),
            request_id,
            courier_id,
            delivery_fee,
            message,
            status: OfferStatus::Open,
            created_at: Utc::now(),
        };
        self.offers.insert(offer.clone());

        // First offer moves the request out of PENDING. If the request raced
        // into a non-accepting state, void the offer we just wrote.
        let advanced = self.requests.update(request_id, |req| {
            if !req.status.accepts_offers() {
                return Err(DispatchError::RequestNotAcceptingOffers);
            }
            if req.status == RequestStatus::Pending {
                req.status = RequestStatus::OffersReceived;
            }
            Ok(())
        });
        if let Err(err) = advanced {
            let _ = self.offers.update(offer.id, |o| {
                o.status = OfferStatus::Rejected;
                Ok(())
            });
            return Err(err);
        }

        self.metrics.offers_submitted_total.inc();
        self.notifier.notify(
            request.customer_id,
            DispatchEvent::OfferSubmitted {
                request_id,
                offer_id: offer.id,
            },
        );
        info!(request_id = %request_id, offer_id = %offer.id, "offer submitted");
        Ok(offer)
    }

    pub fn list_offers(&self, request_id: Uuid) -> Result<Vec<DeliveryOffer>, DispatchError> {
        self.requests.get(request_id)?;
        Ok(self.offers.by_request(request_id))
    }

    pub fn withdraw_offer(
        &self,
        offer_id: Uuid,
        courier_id: Uuid,
    ) -> Result<DeliveryOffer, DispatchError> {
        self.offers.update(offer_id, |offer| {
            if offer.courier_id != courier_id {
                return Err(DispatchError::UnauthorizedActor);
            }
            if offer.status != OfferStatus::Open {
                return Err(DispatchError::OfferNotOpen);
            }
            offer.status = OfferStatus::Withdrawn;
            Ok(())
        })
    }

    pub fn accept_offer(
        &self,
        request_id: Uuid,
        offer_id: Uuid,
        customer_id: Uuid,
    ) -> Result<DeliveryTrip, DispatchError> {
        let chat_id = self.chat.resolve(request_id);
        match acceptance::accept_offer(
            &self.requests,
            &self.offers,
            &self.trips,
            request_id,
            offer_id,
            customer_id,
            chat_id,
            Utc::now(),
        ) {
            Ok(trip) => {
                self.metrics
                    .acceptances_total
                    .with_label_values(&["success"])
                    .inc();
                self.metrics.active_trips.inc();
                for user in [trip.customer_id, trip.courier_id] {
                    self.notifier.notify(
                        user,
                        DispatchEvent::OfferAccepted {
                            request_id,
                            trip_id: trip.id,
                        },
                    );
                }
                info!(request_id = %request_id, trip_id = %trip.id, "offer accepted, trip created");
                Ok(trip)
            }
            Err(err) => {
                self.metrics
                    .acceptances_total
                    .with_label_values(&["rejected"])
                    .inc();
                Err(err)
            }
        }
    }

    pub fn get_trip(&self, trip_id: Uuid) -> Result<DeliveryTrip, DispatchError> {
        self.trips.get(trip_id)
    }

    pub fn trip_for_request(&self, request_id: Uuid) -> Option<DeliveryTrip> {
        self.trips.by_request(request_id)
    }

    pub fn status_history(&self, trip_id: Uuid) -> Result<Vec<TripStatusUpdate>, DispatchError> {
        self.trips.history(trip_id)
    }

    pub fn advance_trip(
        &self,
        trip_id: Uuid,
        mut cmd: TripCommand,
    ) -> Result<DeliveryTrip, DispatchError> {
        if cmd.target == TripStatus::PaymentConfirmed && cmd.gateway_status.is_none() {
            cmd.gateway_status = Some(self.payments.status(trip_id));
        }
        self.advance_with(trip_id, cmd, |_| Ok(()))
    }

    pub fn submit_receipt(
        &self,
        trip_id: Uuid,
        courier_id: Uuid,
        receipt: NewReceipt,
    ) -> Result<DeliveryTrip, DispatchError> {
        if receipt.total_amount < Decimal::ZERO {
            return Err(DispatchError::Validation(
                "receipt total cannot be negative".to_string(),
            ));
        }

        let details = ReceiptDetails {
            image_url: receipt.image_url,
            total_amount: receipt.total_amount,
            items: receipt.items,
            uploaded_at: Utc::now(),
        };
        let cmd = TripCommand::new(TripStatus::ReceiptUploaded, courier_id);
        self.advance_with(trip_id, cmd, move |trip| {
            trip.receipt_details = Some(details);
            Ok(())
        })
    }

    pub fn confirm_payment(
        &self,
        trip_id: Uuid,
        customer_id: Uuid,
        advance_payment: Option<Decimal>,
    ) -> Result<DeliveryTrip, DispatchError> {
        if advance_payment.is_some_and(|a| a < Decimal::ZERO) {
            return Err(DispatchError::Validation(
                "advance payment cannot be negative".to_string(),
            ));
        }

        let mut cmd = TripCommand::new(TripStatus::PaymentConfirmed, customer_id);
        cmd.gateway_status = Some(self.payments.status(trip_id));
        self.advance_with(trip_id, cmd, move |trip| {
            if advance_payment.is_some() {
                trip.advance_payment = advance_payment;
            }
            Ok(())
        })
    }

    pub fn confirm_delivery(
        &self,
        trip_id: Uuid,
        actor_id: Uuid,
        code: String,
    ) -> Result<DeliveryTrip, DispatchError> {
        let mut cmd = TripCommand::new(TripStatus::Delivered, actor_id);
        cmd.confirmation_code = Some(code);
        self.advance_with(trip_id, cmd, |_| Ok(()))
            .inspect_err(|err| log_code_failure(trip_id, actor_id, err))
    }

    /// Customer-side confirmation; on success the trip auto-completes and the
    /// request closes with it.
    pub fn confirm_receipt(
        &self,
        trip_id: Uuid,
        actor_id: Uuid,
        code: String,
    ) -> Result<DeliveryTrip, DispatchError> {
        let mut cmd = TripCommand::new(TripStatus::CustomerConfirmed, actor_id);
        cmd.confirmation_code = Some(code);
        self.advance_with(trip_id, cmd, |_| Ok(()))
            .inspect_err(|err| log_code_failure(trip_id, actor_id, err))
    }

    pub fn update_location(
        &self,
        trip_id: Uuid,
        courier_id: Uuid,
        point: GeoPoint,
        address: Option<String>,
    ) -> Result<DeliveryTrip, DispatchError> {
        self.trips.update(trip_id, |trip| {
            if trip.courier_id != courier_id {
                return Err(DispatchError::UnauthorizedActor);
            }
            if trip.trip_status.is_terminal() {
                return Err(DispatchError::IllegalTransition {
                    from: trip.trip_status.as_str(),
                    to: trip.trip_status.as_str(),
                });
            }

            if let Some(previous) = &trip.current_location {
                trip.distance_traveled_km += haversine_km(&previous.point, &point);
            }
            let position = CourierPosition {
                point,
                address,
                timestamp: Utc::now(),
            };
            trip.route.push(position.clone());
            trip.current_location = Some(position);
            Ok(())
        })
    }

    pub fn report_problem(
        &self,
        trip_id: Uuid,
        actor_id: Uuid,
        description: String,
    ) -> Result<DeliveryTrip, DispatchError> {
        if description.trim().is_empty() {
            return Err(DispatchError::Validation(
                "problem description cannot be empty".to_string(),
            ));
        }

        let problem = ReportedProblem {
            id: Uuid::new_v4(),
            reported_by: actor_id,
            description: description.clone(),
            reported_at: Utc::now(),
            resolved_at: None,
        };
        let mut cmd = TripCommand::new(TripStatus::ProblemReported, actor_id);
        cmd.message = Some(description);
        let trip = self.advance_with(trip_id, cmd, move |trip| {
            trip.problems.push(problem);
            Ok(())
        })?;

        let other_party = if actor_id == trip.courier_id {
            trip.customer_id
        } else {
            trip.courier_id
        };
        self.notifier
            .notify(other_party, DispatchEvent::ProblemReported { trip_id });
        Ok(trip)
    }

    /// Marks the open problem resolved and recovers the trip into the state
    /// it was reported from.
    pub fn resolve_problem(
        &self,
        trip_id: Uuid,
        actor_id: Uuid,
    ) -> Result<DeliveryTrip, DispatchError> {
        let trip = self.trips.get(trip_id)?;
        if actor_id != trip.courier_id && actor_id != trip.customer_id {
            return Err(DispatchError::UnauthorizedActor);
        }
        if trip.trip_status != TripStatus::ProblemReported {
            return Err(DispatchError::Validation(
                "trip has no reported problem".to_string(),
            ));
        }
        let target = trip
            .problem_reported_from
            .ok_or_else(|| DispatchError::Internal("missing recovery state".to_string()))?;

        let now = Utc::now();
        let mut cmd = TripCommand::new(target, actor_id);
        cmd.is_automated = true;
        self.advance_with(trip_id, cmd, move |trip| {
            for problem in trip.problems.iter_mut().filter(|p| p.resolved_at.is_none()) {
                problem.resolved_at = Some(now);
            }
            Ok(())
        })
    }

    pub fn rate_trip(
        &self,
        trip_id: Uuid,
        actor_id: Uuid,
        rating: u8,
        review: Option<String>,
    ) -> Result<DeliveryTrip, DispatchError> {
        if !(1..=5).contains(&rating) {
            return Err(DispatchError::Validation(
                "rating must be between 1 and 5".to_string(),
            ));
        }

        let review_for_request = review.clone();
        let trip = self.trips.update(trip_id, |trip| {
            if trip.trip_status != TripStatus::Completed {
                return Err(DispatchError::Validation(
                    "trip can only be rated after completion".to_string(),
                ));
            }
            if actor_id == trip.customer_id {
                trip.delivery_rating = Some(rating);
                trip.delivery_review = review.clone();
            } else if actor_id == trip.courier_id {
                trip.customer_rating = Some(rating);
                trip.customer_review = review.clone();
            } else {
                return Err(DispatchError::UnauthorizedActor);
            }
            Ok(())
        })?;

        if actor_id == trip.customer_id {
            self.requests.update(trip.request_id, |req| {
                req.rating = Some(rating);
                req.review_comment = review_for_request.clone();
                Ok(())
            })?;
        }
        Ok(trip)
    }

    pub fn cancel_request(
        &self,
        request_id: Uuid,
        actor_id: Uuid,
        reason: Option<String>,
    ) -> Result<DeliveryRequest, DispatchError> {
        let request = self.requests.get(request_id)?;
        if request.customer_id != actor_id {
            return Err(DispatchError::NotRequestOwner);
        }

        if let Some(trip) = self.trips.by_request(request_id) {
            if !cancellable(request.status) {
                return if request.status.is_terminal() {
                    Err(DispatchError::IllegalTransition {
                        from: request.status.as_str(),
                        to: RequestStatus::Cancelled.as_str(),
                    })
                } else {
                    Err(DispatchError::CancellationWindowClosed)
                };
            }
            let mut cmd = TripCommand::new(TripStatus::Cancelled, actor_id);
            cmd.message = reason.clone();
            // The mirror contract cancels the request alongside the trip.
            self.advance_with(trip.id, cmd, |_| Ok(()))?;
        } else {
            self.requests.update(request_id, |req| {
                if req.status.is_terminal() {
                    return Err(DispatchError::IllegalTransition {
                        from: req.status.as_str(),
                        to: RequestStatus::Cancelled.as_str(),
                    });
                }
                if !cancellable(req.status) {
                    return Err(DispatchError::CancellationWindowClosed);
                }
                req.status = RequestStatus::Cancelled;
                Ok(())
            })?;
            self.offers
                .close_open_offers(request_id, OfferStatus::Rejected, None);
        }

        self.notifier.notify(
            request.customer_id,
            DispatchEvent::RequestCancelled { request_id },
        );
        info!(request_id = %request_id, reason = reason.as_deref().unwrap_or("-"), "request cancelled");
        self.requests.get(request_id)
    }

    /// One expiry pass; returns how many requests this pass expired.
    pub fn expire_stale(&self, now: DateTime<Utc>) -> usize {
        let expired = expiry::sweep_once(&self.requests, &self.offers, now);
        for entry in &expired {
            self.metrics.requests_expired_total.inc();
            self.notifier.notify(
                entry.customer_id,
                DispatchEvent::RequestExpired {
                    request_id: entry.request_id,
                },
            );
        }
        expired.len()
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        (self.requests.len(), self.offers.len(), self.trips.len())
    }

    /// Runs the trip machine under the trip row's entry lock, then the audit
    /// append, the request mirror, and notifications, in that order. `prepare`
    /// stages transition inputs (receipt, advance payment, problem rows)
    /// inside the same all-or-nothing update.
    fn advance_with<F>(
        &self,
        trip_id: Uuid,
        cmd: TripCommand,
        prepare: F,
    ) -> Result<DeliveryTrip, DispatchError>
    where
        F: FnOnce(&mut DeliveryTrip) -> Result<(), DispatchError>,
    {
        let now = Utc::now();
        let mut previous: Option<TripStatus> = None;

        let trip = self.trips.update(trip_id, |trip| {
            prepare(trip)?;
            let before = trip.trip_status;
            if trip_flow::apply(trip, &cmd, now)? == Applied::Changed {
                previous = Some(before);
            }
            Ok(())
        })?;

        let Some(previous) = previous else {
            // Duplicate submission of the state the trip is already in.
            return Ok(trip);
        };

        let update_id = Uuid::new_v4();
        self.trips.append_update(TripStatusUpdate {
            id: update_id,
            trip_id,
            previous_status: Some(previous),
            new_status: trip.trip_status,
            updated_by: cmd.actor_id,
            location: cmd.location,
            message: cmd.message.clone(),
            attachments: cmd.attachments.clone(),
            is_automated: cmd.is_automated,
            notification_sent: false,
            created_at: now,
        });

        self.mirror_request(&trip)?;

        self.metrics
            .trip_transitions_total
            .with_label_values(&[trip.trip_status.as_str()])
            .inc();
        info!(
            trip_id = %trip_id,
            from = previous.as_str(),
            to = trip.trip_status.as_str(),
            automated = cmd.is_automated,
            "trip transition applied"
        );

        for user in [trip.customer_id, trip.courier_id] {
            self.notifier.notify(
                user,
                DispatchEvent::TripStatusChanged {
                    trip_id,
                    status: trip.trip_status,
                },
            );
        }
        self.trips.mark_notified(trip_id, update_id);

        match trip.trip_status {
            // The only path that closes both machines together.
            TripStatus::CustomerConfirmed => {
                self.advance_system(trip_id, TripStatus::Completed, cmd.actor_id)
            }
            TripStatus::Completed => {
                self.metrics.trips_completed_total.inc();
                self.metrics.active_trips.dec();
                Ok(trip)
            }
            TripStatus::Cancelled => {
                self.metrics.active_trips.dec();
                self.offers
                    .close_open_offers(trip.request_id, OfferStatus::Rejected, None);
                Ok(trip)
            }
            _ => Ok(trip),
        }
    }

    /// System-driven follow-up transition. Takes a plain function pointer as
    /// the prepare step so the auto-complete chain recurses through a single
    /// `advance_with` instantiation instead of nesting new closure types.
    fn advance_system(
        &self,
        trip_id: Uuid,
        target: TripStatus,
        actor_id: Uuid,
    ) -> Result<DeliveryTrip, DispatchError> {
        let mut cmd = TripCommand::new(target, actor_id);
        cmd.is_automated = true;
        self.advance_with(trip_id, cmd, no_prepare)
    }

    /// Derive and apply the request status implied by the trip status, plus
    /// the money fields the request mirrors from the trip.
    fn mirror_request(&self, trip: &DeliveryTrip) -> Result<(), DispatchError> {
        let Some(target) = request_flow::mirror_of(trip.trip_status) else {
            return Ok(());
        };

        self.requests.update(trip.request_id, |req| {
            request_flow::apply(req, target)?;
            match trip.trip_status {
                TripStatus::ReceiptUploaded => {
                    req.actual_receipt_value = trip.items_cost;
                }
                TripStatus::Completed => {
                    req.total_amount = trip.total_trip_cost;
                }
                _ => {}
            }
            Ok(())
        })?;
        Ok(())
    }
}

fn no_prepare(_: &mut DeliveryTrip) -> Result<(), DispatchError> {
    Ok(())
}

fn log_code_failure(trip_id: Uuid, actor_id: Uuid, err: &DispatchError) {
    if matches!(err, DispatchError::InvalidConfirmationCode) {
        warn!(trip_id = %trip_id, actor_id = %actor_id, "rejected confirmation attempt with wrong code");
    }
}

/// Customer cancellation is only allowed before purchase begins.
fn cancellable(status: RequestStatus) -> bool {
    matches!(
        status,
        RequestStatus::Pending
            | RequestStatus::OffersReceived
            | RequestStatus::OfferAccepted
            | RequestStatus::PickupInProgress
            | RequestStatus::AtPickupLocation
    )
}
