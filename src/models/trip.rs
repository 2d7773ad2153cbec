use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::request::{GeoPoint, LineItem, Location};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Accepted,
    HeadingToPickup,
    AtPickupLocation,
    Shopping,
    ReceiptUploaded,
    PaymentConfirmed,
    HeadingToDelivery,
    AtDeliveryLocation,
    Delivered,
    CustomerConfirmed,
    Completed,
    Cancelled,
    ProblemReported,
}

impl TripStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TripStatus::Accepted => "ACCEPTED",
            TripStatus::HeadingToPickup => "HEADING_TO_PICKUP",
            TripStatus::AtPickupLocation => "AT_PICKUP_LOCATION",
            TripStatus::Shopping => "SHOPPING",
            TripStatus::ReceiptUploaded => "RECEIPT_UPLOADED",
            TripStatus::PaymentConfirmed => "PAYMENT_CONFIRMED",
            TripStatus::HeadingToDelivery => "HEADING_TO_DELIVERY",
            TripStatus::AtDeliveryLocation => "AT_DELIVERY_LOCATION",
            TripStatus::Delivered => "DELIVERED",
            TripStatus::CustomerConfirmed => "CUSTOMER_CONFIRMED",
            TripStatus::Completed => "COMPLETED",
            TripStatus::Cancelled => "CANCELLED",
            TripStatus::ProblemReported => "PROBLEM_REPORTED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    AdvancePaid,
    FullPaid,
    CodPending,
    Completed,
}

impl PaymentStatus {
    /// Whether the external gateway has signalled a status compatible with
    /// moving the trip to `PaymentConfirmed`.
    pub fn allows_confirmation(self) -> bool {
        matches!(
            self,
            PaymentStatus::AdvancePaid | PaymentStatus::FullPaid | PaymentStatus::CodPending
        )
    }
}

/// Last-known courier position, also appended to the trip's route log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierPosition {
    pub point: GeoPoint,
    pub address: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptDetails {
    pub image_url: Option<String>,
    pub total_amount: Decimal,
    pub items: Vec<LineItem>,
    pub uploaded_at: DateTime<Utc>,
}

/// Two single-use codes: the delivery-side code proves handover, the
/// customer-side code proves receipt. Each is consumed at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationCodes {
    pub delivery_code: String,
    pub customer_code: String,
    pub delivery_code_used_at: Option<DateTime<Utc>>,
    pub customer_code_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportedProblem {
    pub id: Uuid,
    pub reported_by: Uuid,
    pub description: String,
    pub reported_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryTrip {
    pub id: Uuid,
    pub request_id: Uuid,
    pub offer_id: Uuid,
    pub courier_id: Uuid,
    pub customer_id: Uuid,
    pub trip_status: TripStatus,
    pub current_location: Option<CourierPosition>,
    pub pickup_location: Option<Location>,
    pub delivery_location: Location,
    pub estimated_pickup_time: Option<DateTime<Utc>>,
    pub actual_pickup_time: Option<DateTime<Utc>>,
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    pub actual_delivery_time: Option<DateTime<Utc>>,
    pub receipt_details: Option<ReceiptDetails>,
    pub payment_status: PaymentStatus,
    pub items_cost: Option<Decimal>,
    pub delivery_fee: Decimal,
    pub total_trip_cost: Option<Decimal>,
    pub advance_payment: Option<Decimal>,
    pub remaining_payment: Option<Decimal>,
    pub confirmation_codes: ConfirmationCodes,
    pub problems: Vec<ReportedProblem>,
    /// Set while in `ProblemReported`; the state the trip recovers into.
    pub problem_reported_from: Option<TripStatus>,
    pub delivery_rating: Option<u8>,
    pub customer_rating: Option<u8>,
    pub delivery_review: Option<String>,
    pub customer_review: Option<String>,
    pub trip_started_at: DateTime<Utc>,
    pub trip_completed_at: Option<DateTime<Utc>>,
    pub total_duration_minutes: Option<i64>,
    pub distance_traveled_km: f64,
    pub route: Vec<CourierPosition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit entry, written before any notification goes out. This
/// log, not the mutable trip row, is the record of what happened when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripStatusUpdate {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub previous_status: Option<TripStatus>,
    pub new_status: TripStatus,
    pub updated_by: Uuid,
    pub location: Option<GeoPoint>,
    pub message: Option<String>,
    pub attachments: Vec<String>,
    pub is_automated: bool,
    pub notification_sent: bool,
    pub created_at: DateTime<Utc>,
}
