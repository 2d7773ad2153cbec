//! Trip lifecycle validation: edge legality, per-edge actor authorization,
//! receipt and payment guards, single-use confirmation codes, and money
//! reconciliation. The caller runs [`apply`] under the trip row's entry lock,
//! which makes every guard here a check-and-set.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::engine::request_flow::Applied;
use crate::error::DispatchError;
use crate::models::request::GeoPoint;
use crate::models::trip::{DeliveryTrip, PaymentStatus, TripStatus};

/// Everything a single transition attempt carries.
#[derive(Debug, Clone)]
pub struct TripCommand {
    pub target: TripStatus,
    pub actor_id: Uuid,
    pub location: Option<GeoPoint>,
    pub message: Option<String>,
    pub attachments: Vec<String>,
    /// System-driven transitions (auto-complete, problem recovery) bypass the
    /// per-edge actor check; the service never sets this from caller input.
    pub is_automated: bool,
    pub confirmation_code: Option<String>,
    pub gateway_status: Option<PaymentStatus>,
}

impl TripCommand {
    pub fn new(target: TripStatus, actor_id: Uuid) -> Self {
        Self {
            target,
            actor_id,
            location: None,
            message: None,
            attachments: Vec::new(),
            is_automated: false,
            confirmation_code: None,
            gateway_status: None,
        }
    }
}

pub fn forward_successor(status: TripStatus) -> Option<TripStatus> {
    match status {
        TripStatus::Accepted => Some(TripStatus::HeadingToPickup),
        TripStatus::HeadingToPickup => Some(TripStatus::AtPickupLocation),
        TripStatus::AtPickupLocation => Some(TripStatus::Shopping),
        TripStatus::Shopping => Some(TripStatus::ReceiptUploaded),
        TripStatus::ReceiptUploaded => Some(TripStatus::PaymentConfirmed),
        TripStatus::PaymentConfirmed => Some(TripStatus::HeadingToDelivery),
        TripStatus::HeadingToDelivery => Some(TripStatus::AtDeliveryLocation),
        TripStatus::AtDeliveryLocation => Some(TripStatus::Delivered),
        TripStatus::Delivered => Some(TripStatus::CustomerConfirmed),
        TripStatus::CustomerConfirmed => Some(TripStatus::Completed),
        TripStatus::Completed | TripStatus::Cancelled | TripStatus::ProblemReported => None,
    }
}

/// Validate and apply one trip transition.
pub fn apply(
    trip: &mut DeliveryTrip,
    cmd: &TripCommand,
    now: DateTime<Utc>,
) -> Result<Applied, DispatchError> {
    let current = trip.trip_status;

    if current.is_terminal() {
        return Err(DispatchError::IllegalTransition {
            from: current.as_str(),
            to: cmd.target.as_str(),
        });
    }

    if cmd.target == current {
        return match cmd.target {
            // A repeated confirmation means the code was already consumed on
            // the call that got the trip here.
            TripStatus::Delivered | TripStatus::CustomerConfirmed => {
                Err(DispatchError::CodeAlreadyUsed)
            }
            _ => Ok(Applied::Noop),
        };
    }

    let recovery =
        current == TripStatus::ProblemReported && trip.problem_reported_from == Some(cmd.target);

    let legal = forward_successor(current) == Some(cmd.target)
        || cmd.target == TripStatus::Cancelled
        || cmd.target == TripStatus::ProblemReported
        || recovery;

    if !legal {
        return Err(DispatchError::IllegalTransition {
            from: current.as_str(),
            to: cmd.target.as_str(),
        });
    }

    authorize(trip, cmd, recovery)?;

    if recovery {
        if trip.problems.iter().any(|p| p.resolved_at.is_none()) {
            return Err(DispatchError::Validation(
                "trip has an unresolved problem".to_string(),
            ));
        }
        trip.problem_reported_from = None;
        trip.trip_status = cmd.target;
        return Ok(Applied::Changed);
    }

    match cmd.target {
        TripStatus::AtPickupLocation => {
            trip.actual_pickup_time = Some(now);
        }
        TripStatus::ReceiptUploaded => {
            let receipt = trip
                .receipt_details
                .as_ref()
                .ok_or(DispatchError::MissingReceipt)?;
            if receipt.total_amount < Decimal::ZERO {
                return Err(DispatchError::Validation(
                    "receipt total must be non-negative".to_string(),
                ));
            }
            trip.items_cost = Some(receipt.total_amount);
        }
        TripStatus::PaymentConfirmed => {
            let status = cmd
                .gateway_status
                .ok_or(DispatchError::PaymentNotConfirmed)?;
            if !status.allows_confirmation() {
                return Err(DispatchError::PaymentNotConfirmed);
            }
            trip.payment_status = status;
        }
        TripStatus::Delivered => {
            let codes = &mut trip.confirmation_codes;
            consume_code(
                &codes.delivery_code,
                &mut codes.delivery_code_used_at,
                cmd.confirmation_code.as_deref(),
                now,
            )?;
            trip.actual_delivery_time = Some(now);
        }
        TripStatus::CustomerConfirmed => {
            let items_cost = trip.items_cost.ok_or(DispatchError::MissingReceipt)?;
            let codes = &mut trip.confirmation_codes;
            consume_code(
                &codes.customer_code,
                &mut codes.customer_code_used_at,
                cmd.confirmation_code.as_deref(),
                now,
            )?;

            let total = (items_cost + trip.delivery_fee).max(Decimal::ZERO);
            let advance = trip.advance_payment.unwrap_or(Decimal::ZERO);
            trip.total_trip_cost = Some(total);
            trip.remaining_payment = Some((total - advance).max(Decimal::ZERO));
        }
        TripStatus::Completed => {
            trip.trip_completed_at = Some(now);
            trip.total_duration_minutes = Some((now - trip.trip_started_at).num_minutes());
            trip.payment_status = PaymentStatus::Completed;
        }
        TripStatus::ProblemReported => {
            trip.problem_reported_from = Some(current);
        }
        TripStatus::Cancelled
        | TripStatus::Accepted
        | TripStatus::HeadingToPickup
        | TripStatus::Shopping
        | TripStatus::HeadingToDelivery
        | TripStatus::AtDeliveryLocation => {}
    }

    trip.trip_status = cmd.target;
    Ok(Applied::Changed)
}

fn authorize(
    trip: &DeliveryTrip,
    cmd: &TripCommand,
    recovery: bool,
) -> Result<(), DispatchError> {
    if cmd.is_automated {
        return Ok(());
    }

    let is_courier = cmd.actor_id == trip.courier_id;
    let is_customer = cmd.actor_id == trip.customer_id;

    let allowed = if recovery {
        is_courier || is_customer
    } else {
        match cmd.target {
            TripStatus::HeadingToPickup
            | TripStatus::AtPickupLocation
            | TripStatus::Shopping
            | TripStatus::ReceiptUploaded
            | TripStatus::HeadingToDelivery
            | TripStatus::AtDeliveryLocation
            | TripStatus::Delivered => is_courier,
            TripStatus::PaymentConfirmed | TripStatus::CustomerConfirmed => is_customer,
            TripStatus::Cancelled => {
                // The courier keeps the full window; the customer loses it
                // once purchase begins.
                if is_customer && !is_courier && !customer_cancellation_open(trip) {
                    return Err(DispatchError::CancellationWindowClosed);
                }
                is_courier || is_customer
            }
            TripStatus::ProblemReported => is_courier || is_customer,
            // Only the system closes a trip or opens one.
            TripStatus::Completed | TripStatus::Accepted => false,
        }
    };

    if allowed {
        Ok(())
    } else {
        Err(DispatchError::UnauthorizedActor)
    }
}

/// Customer cancellation closes once shopping starts. A paused trip counts as
/// the state it was reported from.
fn customer_cancellation_open(trip: &DeliveryTrip) -> bool {
    let effective = match trip.trip_status {
        TripStatus::ProblemReported => trip
            .problem_reported_from
            .unwrap_or(TripStatus::ProblemReported),
        other => other,
    };
    matches!(
        effective,
        TripStatus::Accepted | TripStatus::HeadingToPickup | TripStatus::AtPickupLocation
    )
}

/// Atomic under the caller's entry lock: the consumed flag is read and set in
/// the same critical section, so a duplicate confirmation can never succeed
/// twice.
fn consume_code(
    stored: &str,
    used_at: &mut Option<DateTime<Utc>>,
    supplied: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), DispatchError> {
    let supplied = supplied.ok_or(DispatchError::InvalidConfirmationCode)?;
    if used_at.is_some() {
        return Err(DispatchError::CodeAlreadyUsed);
    }
    if supplied != stored {
        return Err(DispatchError::InvalidConfirmationCode);
    }
    *used_at = Some(now);
    Ok(())
}
