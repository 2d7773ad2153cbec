//! Boundaries to the systems this core does not own: notification delivery,
//! payment capture, and chat. The core only needs a "notify" capability, a
//! read-only payment status, and an optional chat channel reference.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::trip::{PaymentStatus, TripStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchEvent {
    RequestCreated { request_id: Uuid },
    OfferSubmitted { request_id: Uuid, offer_id: Uuid },
    OfferAccepted { request_id: Uuid, trip_id: Uuid },
    TripStatusChanged { trip_id: Uuid, status: TripStatus },
    RequestCancelled { request_id: Uuid },
    RequestExpired { request_id: Uuid },
    ProblemReported { trip_id: Uuid },
}

/// Addressed event as it goes out on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub user_id: Uuid,
    pub event: DispatchEvent,
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, user_id: Uuid, event: DispatchEvent);
}

pub trait PaymentGateway: Send + Sync {
    fn status(&self, trip_id: Uuid) -> PaymentStatus;
}

pub trait ChatChannel: Send + Sync {
    fn resolve(&self, request_id: Uuid) -> Option<Uuid>;
}

/// Fans notifications out over a broadcast channel; the WebSocket handler
/// subscribes to the same channel. Lagging or absent receivers are dropped,
/// delivery is best-effort by design of `broadcast`.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<EventEnvelope>,
}

impl BroadcastNotifier {
    pub fn new(tx: broadcast::Sender<EventEnvelope>) -> Self {
        Self { tx }
    }
}

impl NotificationSink for BroadcastNotifier {
    fn notify(&self, user_id: Uuid, event: DispatchEvent) {
        let _ = self.tx.send(EventEnvelope { user_id, event });
    }
}

/// In-process gateway view: records whatever the payment collaborator last
/// reported per trip, webhook-style. The dispatch core never moves money.
#[derive(Default)]
pub struct RecordedPayments {
    statuses: DashMap<Uuid, PaymentStatus>,
}

impl RecordedPayments {
    pub fn record(&self, trip_id: Uuid, status: PaymentStatus) {
        self.statuses.insert(trip_id, status);
    }
}

impl PaymentGateway for RecordedPayments {
    fn status(&self, trip_id: Uuid) -> PaymentStatus {
        self.statuses
            .get(&trip_id)
            .map(|entry| *entry.value())
            .unwrap_or(PaymentStatus::Pending)
    }
}

/// Chat linking is optional; without a chat backend there is no channel.
pub struct NoChat;

impl ChatChannel for NoChat {
    fn resolve(&self, _request_id: Uuid) -> Option<Uuid> {
        None
    }
}
