//! Request lifecycle validation. For the portion of the lifecycle that
//! overlaps the trip, the request is never advanced directly: the service
//! derives its status from the trip via [`mirror_of`], so the two timelines
//! cannot disagree.

use crate::error::DispatchError;
use crate::models::request::{DeliveryRequest, RequestStatus};
use crate::models::trip::TripStatus;

/// Whether an accepted transition changed the row. Re-applying the current
/// status is a no-op, not an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Applied {
    Changed,
    Noop,
}

pub fn forward_successor(status: RequestStatus) -> Option<RequestStatus> {
    match status {
        RequestStatus::Pending => Some(RequestStatus::OffersReceived),
        RequestStatus::OffersReceived => Some(RequestStatus::OfferAccepted),
        RequestStatus::OfferAccepted => Some(RequestStatus::PickupInProgress),
        RequestStatus::PickupInProgress => Some(RequestStatus::AtPickupLocation),
        RequestStatus::AtPickupLocation => Some(RequestStatus::ShoppingInProgress),
        RequestStatus::ShoppingInProgress => Some(RequestStatus::ReceiptSubmitted),
        RequestStatus::ReceiptSubmitted => Some(RequestStatus::DeliveryInProgress),
        RequestStatus::DeliveryInProgress => Some(RequestStatus::AtDeliveryLocation),
        RequestStatus::AtDeliveryLocation => Some(RequestStatus::Completed),
        RequestStatus::Completed | RequestStatus::Cancelled | RequestStatus::Expired => None,
    }
}

/// Fixed trip-status to request-status mapping. Trip states without a request
/// counterpart map to the last request state they imply; `ProblemReported`
/// leaves the request where it is.
pub fn mirror_of(trip_status: TripStatus) -> Option<RequestStatus> {
    match trip_status {
        TripStatus::Accepted => Some(RequestStatus::OfferAccepted),
        TripStatus::HeadingToPickup => Some(RequestStatus::PickupInProgress),
        TripStatus::AtPickupLocation => Some(RequestStatus::AtPickupLocation),
        TripStatus::Shopping => Some(RequestStatus::ShoppingInProgress),
        TripStatus::ReceiptUploaded | TripStatus::PaymentConfirmed => {
            Some(RequestStatus::ReceiptSubmitted)
        }
        TripStatus::HeadingToDelivery => Some(RequestStatus::DeliveryInProgress),
        TripStatus::AtDeliveryLocation
        | TripStatus::Delivered
        | TripStatus::CustomerConfirmed => Some(RequestStatus::AtDeliveryLocation),
        TripStatus::Completed => Some(RequestStatus::Completed),
        TripStatus::Cancelled => Some(RequestStatus::Cancelled),
        TripStatus::ProblemReported => None,
    }
}

/// Validate and apply a request transition. Forward moves go one step at a
/// time; `Cancelled` is reachable from any non-terminal state (the customer
/// cancellation window is the caller's policy); `Expired` only before a
/// courier has committed.
pub fn apply(
    request: &mut DeliveryRequest,
    target: RequestStatus,
) -> Result<Applied, DispatchError> {
    let current = request.status;

    if target == current {
        return Ok(Applied::Noop);
    }

    if current.is_terminal() {
        return Err(DispatchError::IllegalTransition {
            from: current.as_str(),
            to: target.as_str(),
        });
    }

    let legal = match target {
        RequestStatus::Cancelled => true,
        RequestStatus::Expired => current.accepts_offers(),
        _ => forward_successor(current) == Some(target),
    };

    if !legal {
        return Err(DispatchError::IllegalTransition {
            from: current.as_str(),
            to: target.as_str(),
        });
    }

    request.status = target;
    Ok(Applied::Changed)
}
