use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferStatus {
    Open,
    Accepted,
    Rejected,
    Withdrawn,
    Expired,
}

/// A courier's bid against a request. Many offers per request; at most one
/// ends up `Accepted`, terminated by the acceptance coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryOffer {
    pub id: Uuid,
    pub request_id: Uuid,
    pub courier_id: Uuid,
    pub delivery_fee: Decimal,
    pub message: Option<String>,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
}
