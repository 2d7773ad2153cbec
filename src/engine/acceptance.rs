//! Exclusive offer acceptance. The request row is the linearization point:
//! setting `accepted_offer_id` from `None` happens under the row's entry
//! lock, so of N concurrent acceptance attempts exactly one wins and creates
//! the trip; the rest observe the reservation and fail with `AlreadyAccepted`.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::offer::OfferStatus;
use crate::models::request::RequestStatus;
use crate::models::trip::{
    ConfirmationCodes, DeliveryTrip, PaymentStatus, TripStatus, TripStatusUpdate,
};
use crate::store::offers::OfferStore;
use crate::store::requests::RequestStore;
use crate::store::trips::TripStore;

pub fn accept_offer(
    requests: &RequestStore,
    offers: &OfferStore,
    trips: &TripStore,
    request_id: Uuid,
    offer_id: Uuid,
    customer_id: Uuid,
    chat_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<DeliveryTrip, DispatchError> {
    let offer = offers.get(offer_id)?;
    if offer.request_id != request_id {
        return Err(DispatchError::Validation(
            "offer does not belong to this request".to_string(),
        ));
    }
    // The offer's own status is deliberately not checked yet: a loser of the
    // acceptance race must observe the request reservation (`AlreadyAccepted`),
    // not the side effect of the winner rejecting its offer.

    // The one conditional write that decides the race.
    let request = requests.update(request_id, |req| {
        if req.customer_id != customer_id {
            return Err(DispatchError::NotRequestOwner);
        }
        if req.accepted_offer_id.is_some() {
            return Err(DispatchError::AlreadyAccepted);
        }
        if !req.status.accepts_offers() {
            return Err(DispatchError::RequestNotAcceptingOffers);
        }
        req.accepted_offer_id = Some(offer_id);
        req.status = RequestStatus::OfferAccepted;
        req.delivery_fee = Some(offer.delivery_fee);
        if req.chat_id.is_none() {
            req.chat_id = chat_id;
        }
        Ok(())
    })?;

    // The offer may have been withdrawn or otherwise closed before the
    // reservation landed; undo the reservation rather than accept a dead
    // offer.
    if let Err(err) = offers.update(offer_id, |o| {
        if o.status != OfferStatus::Open {
            return Err(DispatchError::OfferNotOpen);
        }
        o.status = OfferStatus::Accepted;
        Ok(())
    }) {
        let _ = requests.update(request_id, |req| {
            req.accepted_offer_id = None;
            req.status = RequestStatus::OffersReceived;
            req.delivery_fee = None;
            Ok(())
        });
        return Err(err);
    }

    offers.close_open_offers(request_id, OfferStatus::Rejected, Some(offer_id));

    let trip = DeliveryTrip {
        id: Uuid::new_v4(),
        request_id,
        offer_id,
        courier_id: offer.courier_id,
        customer_id,
        trip_status: TripStatus::Accepted,
        current_location: None,
        pickup_location: request.pickup_location.clone(),
        delivery_location: request.delivery_location.clone(),
        estimated_pickup_time: None,
        actual_pickup_time: None,
        estimated_delivery_time: None,
        actual_delivery_time: None,
        receipt_details: None,
        payment_status: PaymentStatus::Pending,
        items_cost: None,
        delivery_fee: offer.delivery_fee,
        total_trip_cost: None,
        advance_payment: None,
        remaining_payment: None,
        confirmation_codes: generate_codes(),
        problems: Vec::new(),
        problem_reported_from: None,
        delivery_rating: None,
        customer_rating: None,
        delivery_review: None,
        customer_review: None,
        trip_started_at: now,
        trip_completed_at: None,
        total_duration_minutes: None,
        distance_traveled_km: 0.0,
        route: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    trips.insert(trip.clone());
    trips.append_update(TripStatusUpdate {
        id: Uuid::new_v4(),
        trip_id: trip.id,
        previous_status: None,
        new_status: TripStatus::Accepted,
        updated_by: customer_id,
        location: None,
        message: None,
        attachments: Vec::new(),
        is_automated: false,
        notification_sent: false,
        created_at: now,
    });

    Ok(trip)
}

/// Six-digit numeric codes; the two sides must differ so one leaked code
/// cannot close both ends of the handover.
fn generate_codes() -> ConfirmationCodes {
    let delivery_code = six_digits();
    let customer_code = loop {
        let code = six_digits();
        if code != delivery_code {
            break code;
        }
    };

    ConfirmationCodes {
        delivery_code,
        customer_code,
        delivery_code_used_at: None,
        customer_code_used_at: None,
    }
}

fn six_digits() -> String {
    format!("{:06}", Uuid::new_v4().as_u128() % 1_000_000)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::accept_offer;
    use crate::error::DispatchError;
    use crate::models::offer::{DeliveryOffer, OfferStatus};
    use crate::models::request::{
        DeliveryRequest, DeliveryWindow, GeoPoint, LineItem, Location, Priority, RequestStatus,
        RequestType,
    };
    use crate::store::offers::OfferStore;
    use crate::store::requests::RequestStore;
    use crate::store::trips::TripStore;

    fn seeded_request(customer_id: Uuid) -> DeliveryRequest {
        DeliveryRequest {
            id: Uuid::new_v4(),
            customer_id,
            title: "tea and sugar".to_string(),
            description: None,
            request_type: RequestType::AnyStore,
            specific_store_id: None,
            items: vec![LineItem {
                name: "tea".to_string(),
                quantity: "1".to_string(),
                notes: None,
            }],
            pickup_location: None,
            delivery_location: Location {
                address: "12 Nile St".to_string(),
                point: GeoPoint {
                    lat: 30.04,
                    lng: 31.23,
                },
                notes: None,
                phone: Some("+201000000000".to_string()),
            },
            customer_budget: None,
            estimated_value: None,
            actual_receipt_value: None,
            delivery_fee: None,
            total_amount: None,
            preferred_delivery_time: DeliveryWindow::Asap,
            specific_delivery_time: None,
            priority: Priority::Normal,
            status: RequestStatus::OffersReceived,
            accepted_offer_id: None,
            chat_id: None,
            rating: None,
            review_comment: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            expires_at: None,
        }
    }

    fn seeded_offer(request_id: Uuid) -> DeliveryOffer {
        DeliveryOffer {
            id: Uuid::new_v4(),
            request_id,
            courier_id: Uuid::new_v4(),
            delivery_fee: Decimal::new(3000, 2),
            message: None,
            status: OfferStatus::Open,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn winner_creates_exactly_one_trip_and_rejects_the_rest() {
        let requests = RequestStore::default();
        let offers = OfferStore::default();
        let trips = TripStore::default();

        let customer = Uuid::new_v4();
        let request = seeded_request(customer);
        let request_id = request.id;
        requests.insert(request);

        let winning = seeded_offer(request_id);
        let losing = seeded_offer(request_id);
        offers.insert(winning.clone());
        offers.insert(losing.clone());

        let trip = accept_offer(
            &requests, &offers, &trips, request_id, winning.id, customer, None,
            Utc::now(),
        )
        .unwrap();

        assert_eq!(trip.courier_id, winning.courier_id);
        assert_ne!(
            trip.confirmation_codes.delivery_code,
            trip.confirmation_codes.customer_code
        );

        let request = requests.get(request_id).unwrap();
        assert_eq!(request.status, RequestStatus::OfferAccepted);
        assert_eq!(request.accepted_offer_id, Some(winning.id));
        assert_eq!(request.delivery_fee, Some(Decimal::new(3000, 2)));

        assert_eq!(offers.get(winning.id).unwrap().status, OfferStatus::Accepted);
        assert_eq!(offers.get(losing.id).unwrap().status, OfferStatus::Rejected);

        // A late attempt on the losing offer fails on the reservation, not on
        // the offer's rejected status.
        let err = accept_offer(
            &requests, &offers, &trips, request_id, losing.id, customer, None,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::AlreadyAccepted));
        assert_eq!(trips.len(), 1);
    }

    #[test]
    fn withdrawn_offer_fails_and_rolls_back_the_reservation() {
        let requests = RequestStore::default();
        let offers = OfferStore::default();
        let trips = TripStore::default();

        let customer = Uuid::new_v4();
        let request = seeded_request(customer);
        let request_id = request.id;
        requests.insert(request);

        let mut offer = seeded_offer(request_id);
        offer.status = OfferStatus::Withdrawn;
        let offer_id = offer.id;
        offers.insert(offer);

        let err = accept_offer(
            &requests, &offers, &trips, request_id, offer_id, customer, None,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::OfferNotOpen));

        let request = requests.get(request_id).unwrap();
        assert!(request.accepted_offer_id.is_none());
        assert_eq!(request.status, RequestStatus::OffersReceived);
        assert_eq!(trips.len(), 0);
    }

    #[test]
    fn non_owner_cannot_accept() {
        let requests = RequestStore::default();
        let offers = OfferStore::default();
        let trips = TripStore::default();

        let request = seeded_request(Uuid::new_v4());
        let request_id = request.id;
        requests.insert(request);
        let offer = seeded_offer(request_id);
        offers.insert(offer.clone());

        let err = accept_offer(
            &requests,
            &offers,
            &trips,
            request_id,
            offer.id,
            Uuid::new_v4(),
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::NotRequestOwner));
        assert!(requests.get(request_id).unwrap().accepted_offer_id.is_none());
        assert_eq!(trips.len(), 0);
    }

    #[test]
    fn concurrent_acceptances_have_exactly_one_winner() {
        let requests = Arc::new(RequestStore::default());
        let offers = Arc::new(OfferStore::default());
        let trips = Arc::new(TripStore::default());

        let customer = Uuid::new_v4();
        let request = seeded_request(customer);
        let request_id = request.id;
        requests.insert(request);

        let offer_ids: Vec<Uuid> = (0..8)
            .map(|_| {
                let offer = seeded_offer(request_id);
                let id = offer.id;
                offers.insert(offer);
                id
            })
            .collect();

        let handles: Vec<_> = offer_ids
            .iter()
            .map(|&offer_id| {
                let requests = requests.clone();
                let offers = offers.clone();
                let trips = trips.clone();
                std::thread::spawn(move || {
                    accept_offer(
                        &requests, &offers, &trips, request_id, offer_id, customer, None,
                        Utc::now(),
                    )
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        let losers = results
            .iter()
            .filter(|r| matches!(r, Err(DispatchError::AlreadyAccepted)))
            .count();

        assert_eq!(winners, 1);
        assert_eq!(losers, 7);
        assert_eq!(trips.len(), 1);

        // One trip exists iff the accepted offer reference is set.
        let request = requests.get(request_id).unwrap();
        assert!(request.accepted_offer_id.is_some());
        assert!(trips.by_request(request_id).is_some());
    }
}
