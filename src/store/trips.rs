use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::trip::{DeliveryTrip, TripStatusUpdate};

/// Persistence boundary for trips plus their append-only status-update log.
///
/// The log lives under its own per-trip entry so appends are ordered by the
/// entry lock; rows are never mutated after the fact except to flip the
/// `notification_sent` flag once the sink has been signalled.
#[derive(Default)]
pub struct TripStore {
    rows: DashMap<Uuid, DeliveryTrip>,
    history: DashMap<Uuid, Vec<TripStatusUpdate>>,
}

impl TripStore {
    pub fn insert(&self, trip: DeliveryTrip) {
        self.history.entry(trip.id).or_default();
        self.rows.insert(trip.id, trip);
    }

    pub fn get(&self, id: Uuid) -> Result<DeliveryTrip, DispatchError> {
        self.rows
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DispatchError::NotFound(format!("trip {id}")))
    }

    pub fn update<F>(&self, id: Uuid, mutate: F) -> Result<DeliveryTrip, DispatchError>
    where
        F: FnOnce(&mut DeliveryTrip) -> Result<(), DispatchError>,
    {
        let mut entry = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| DispatchError::NotFound(format!("trip {id}")))?;

        let mut draft = entry.value().clone();
        mutate(&mut draft)?;
        draft.updated_at = Utc::now();
        *entry.value_mut() = draft.clone();
        Ok(draft)
    }

    pub fn by_request(&self, request_id: Uuid) -> Option<DeliveryTrip> {
        self.rows
            .iter()
            .find(|entry| entry.value().request_id == request_id)
            .map(|entry| entry.value().clone())
    }

    pub fn append_update(&self, update: TripStatusUpdate) {
        self.history.entry(update.trip_id).or_default().push(update);
    }

    /// Ordered status history for a trip, oldest first.
    pub fn history(&self, trip_id: Uuid) -> Result<Vec<TripStatusUpdate>, DispatchError> {
        self.history
            .get(&trip_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DispatchError::NotFound(format!("trip {trip_id}")))
    }

    pub fn mark_notified(&self, trip_id: Uuid, update_id: Uuid) {
        if let Some(mut entry) = self.history.get_mut(&trip_id) {
            if let Some(row) = entry.value_mut().iter_mut().find(|row| row.id == update_id) {
                row.notification_sent = true;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}
