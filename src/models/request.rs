use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A physical address as captured on a request: the delivery side always
/// carries a contact phone, the pickup side usually does not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    pub point: GeoPoint,
    pub notes: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    SpecificStore,
    AnyStore,
    Grocery,
    Pharmacy,
    Restaurant,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryWindow {
    Asap,
    Within1Hour,
    Within2Hours,
    Today,
    Tomorrow,
    SpecificTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    OffersReceived,
    OfferAccepted,
    PickupInProgress,
    AtPickupLocation,
    ShoppingInProgress,
    ReceiptSubmitted,
    DeliveryInProgress,
    AtDeliveryLocation,
    Completed,
    Cancelled,
    Expired,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Cancelled | RequestStatus::Expired
        )
    }

    /// A request only takes offers while no courier has committed.
    pub fn accepts_offers(self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::OffersReceived)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::OffersReceived => "OFFERS_RECEIVED",
            RequestStatus::OfferAccepted => "OFFER_ACCEPTED",
            RequestStatus::PickupInProgress => "PICKUP_IN_PROGRESS",
            RequestStatus::AtPickupLocation => "AT_PICKUP_LOCATION",
            RequestStatus::ShoppingInProgress => "SHOPPING_IN_PROGRESS",
            RequestStatus::ReceiptSubmitted => "RECEIPT_SUBMITTED",
            RequestStatus::DeliveryInProgress => "DELIVERY_IN_PROGRESS",
            RequestStatus::AtDeliveryLocation => "AT_DELIVERY_LOCATION",
            RequestStatus::Completed => "COMPLETED",
            RequestStatus::Cancelled => "CANCELLED",
            RequestStatus::Expired => "EXPIRED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub request_type: RequestType,
    pub specific_store_id: Option<Uuid>,
    pub items: Vec<LineItem>,
    pub pickup_location: Option<Location>,
    pub delivery_location: Location,
    /// Goods budget only, excludes the delivery fee.
    pub customer_budget: Option<Decimal>,
    pub estimated_value: Option<Decimal>,
    pub actual_receipt_value: Option<Decimal>,
    pub delivery_fee: Option<Decimal>,
    /// Goods plus fee, filled at completion.
    pub total_amount: Option<Decimal>,
    pub preferred_delivery_time: DeliveryWindow,
    pub specific_delivery_time: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub status: RequestStatus,
    pub accepted_offer_id: Option<Uuid>,
    pub chat_id: Option<Uuid>,
    pub rating: Option<u8>,
    pub review_comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}
