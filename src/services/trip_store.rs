// src/services/trip_store.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{
    errors::DispatchError as AppError,
    models::trip::{DriverId, GeoPoint, NewTrip, Trip, TripId, TripStatus, UserId},
    utils::geo,
};

/// Status-preserving or status-changing edit applied inside the store's
/// critical section.
pub type TripMutation = Box<dyn FnOnce(&mut Trip) + Send>;

#[derive(Debug, Clone, Default)]
pub struct TripFilter {
    pub status: Option<TripStatus>,
    pub user_id: Option<UserId>,
    pub driver_id: Option<DriverId>,
    pub limit: Option<usize>,
}

impl TripFilter {
    pub fn by_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn by_driver(driver_id: DriverId) -> Self {
        Self {
            driver_id: Some(driver_id),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: Option<TripStatus>) -> Self {
        self.status = status;
        self
    }
}

/// Persistence abstraction for trip records. All status changes funnel
/// through `conditional_transition` / `accept_for_driver`; those two are the
/// only safe paths for the logically concurrent writers (accept, start,
/// reject and the timeout revert).
#[async_trait]
pub trait TripStore: Send + Sync {
    /// Assigns the next sequential id. Fails with `ActiveTripExists` when the
    /// requester already has a trip in pending/accepted/in_progress.
    async fn create(&self, new_trip: NewTrip) -> Result<Trip, AppError>;

    async fn find_by_id(&self, trip_id: TripId) -> Result<Option<Trip>, AppError>;

    /// Filtered listing, newest first.
    async fn find(&self, filter: TripFilter) -> Result<Vec<Trip>, AppError>;

    async fn find_active_for_user(&self, user_id: UserId) -> Result<Option<Trip>, AppError>;

    /// Pending, undriven trips within `radius_km` of `origin` that are either
    /// unscheduled or scheduled with a start time that has come due.
    async fn find_pending_near(
        &self,
        origin: GeoPoint,
        radius_km: f64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Trip>, AppError>;

    /// Compare-and-swap on the trip status: the mutation runs only if the
    /// current status equals `expected`, otherwise `StaleState`.
    async fn conditional_transition(
        &self,
        trip_id: TripId,
        expected: TripStatus,
        mutation: TripMutation,
    ) -> Result<Trip, AppError>;

    /// Capacity check and pending->accepted transition in a single critical
    /// section, closing the TOCTOU gap between counting a driver's active
    /// trips and claiming a new one.
    async fn accept_for_driver(
        &self,
        trip_id: TripId,
        driver_id: DriverId,
        max_active: usize,
        mutation: TripMutation,
    ) -> Result<Trip, AppError>;

    /// Accepted trips whose start-by deadline has passed; the timeout sweep's
    /// deadline index.
    async fn accepted_due_before(&self, now: DateTime<Utc>) -> Result<Vec<Trip>, AppError>;

    /// Scheduled pending trips whose start time has come due.
    async fn scheduled_due_before(&self, now: DateTime<Utc>) -> Result<Vec<Trip>, AppError>;

    /// Address-only edit; never touches the status.
    async fn update_addresses(
        &self,
        trip_id: TripId,
        start_address: Option<String>,
        end_address: Option<String>,
    ) -> Result<Trip, AppError>;

    /// Hard removal. The service layer prefers a soft cancel; this is the
    /// low-level purge.
    async fn delete(&self, trip_id: TripId) -> Result<(), AppError>;
}

struct StoreInner {
    trips: HashMap<TripId, Trip>,
    next_id: TripId,
}

/// In-memory store. A single RwLock gives every mutation path one writer at
/// a time, which is what makes `conditional_transition` an atomic CAS and
/// `accept_for_driver` a serialized per-driver check-then-act.
pub struct MemoryTripStore {
    inner: RwLock<StoreInner>,
}

impl MemoryTripStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                trips: HashMap::new(),
                next_id: 1,
            }),
        }
    }
}

impl Default for MemoryTripStore {
    fn default() -> Self {
        Self::new()
    }
}

fn eligible_pending(trip: &Trip, now: DateTime<Utc>) -> bool {
    if trip.status != TripStatus::Pending || trip.driver_id.is_some() {
        return false;
    }
    if !trip.is_scheduled {
        return true;
    }
    match trip.scheduled_start_time {
        Some(due) => due <= now,
        None => true,
    }
}

#[async_trait]
impl TripStore for MemoryTripStore {
    async fn create(&self, new_trip: NewTrip) -> Result<Trip, AppError> {
        let mut inner = self.inner.write().await;

        if let Some(active) = inner
            .trips
            .values()
            .find(|t| t.user_id == new_trip.user_id && t.status.is_active())
        {
            return Err(AppError::ActiveTripExists {
                trip_id: active.trip_id,
                status: active.status,
            });
        }

        let trip_id = inner.next_id;
        inner.next_id += 1;

        let now = Utc::now();
        let trip = Trip {
            trip_id,
            user_id: new_trip.user_id,
            driver_id: None,
            start_location: new_trip.start_location,
            end_location: new_trip.end_location,
            distance_km: new_trip.distance_km,
            estimated_fare: new_trip.estimated_fare,
            actual_fare: None,
            payment_method: new_trip.payment_method,
            payment_status: crate::models::trip::PaymentStatus::Pending,
            status: TripStatus::Pending,
            is_scheduled: new_trip.is_scheduled,
            scheduled_start_time: new_trip.scheduled_start_time,
            requested_at: now,
            accepted_at: None,
            start_time: None,
            end_time: None,
            cancellation_reason: None,
            timeout_deadline: None,
            updated_at: now,
        };

        inner.trips.insert(trip_id, trip.clone());
        tracing::debug!("Stored trip {} for user {}", trip_id, trip.user_id);
        Ok(trip)
    }

    async fn find_by_id(&self, trip_id: TripId) -> Result<Option<Trip>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.trips.get(&trip_id).cloned())
    }

    async fn find(&self, filter: TripFilter) -> Result<Vec<Trip>, AppError> {
        let inner = self.inner.read().await;
        let mut trips: Vec<Trip> = inner
            .trips
            .values()
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| filter.user_id.map_or(true, |u| t.user_id == u))
            .filter(|t| filter.driver_id.map_or(true, |d| t.driver_id == Some(d)))
            .cloned()
            .collect();

        // Newest first
        trips.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        if let Some(limit) = filter.limit {
            trips.truncate(limit);
        }
        Ok(trips)
    }

    async fn find_active_for_user(&self, user_id: UserId) -> Result<Option<Trip>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .trips
            .values()
            .find(|t| t.user_id == user_id && t.status.is_active())
            .cloned())
    }

    async fn find_pending_near(
        &self,
        origin: GeoPoint,
        radius_km: f64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Trip>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .trips
            .values()
            .filter(|t| eligible_pending(t, now))
            .filter(|t| geo::distance_km(origin, t.start_location.point) <= radius_km)
            .cloned()
            .collect())
    }

    async fn conditional_transition(
        &self,
        trip_id: TripId,
        expected: TripStatus,
        mutation: TripMutation,
    ) -> Result<Trip, AppError> {
        let mut inner = self.inner.write().await;
        let trip = inner
            .trips
            .get_mut(&trip_id)
            .ok_or_else(|| AppError::not_found(format!("trip {}", trip_id)))?;

        if trip.status != expected {
            return Err(AppError::StaleState {
                expected,
                actual: trip.status,
            });
        }

        mutation(trip);
        trip.updated_at = Utc::now();
        Ok(trip.clone())
    }

    async fn accept_for_driver(
        &self,
        trip_id: TripId,
        driver_id: DriverId,
        max_active: usize,
        mutation: TripMutation,
    ) -> Result<Trip, AppError> {
        let mut inner = self.inner.write().await;

        let active = inner
            .trips
            .values()
            .filter(|t| {
                t.driver_id == Some(driver_id)
                    && matches!(t.status, TripStatus::Accepted | TripStatus::InProgress)
            })
            .count();
        if active >= max_active {
            return Err(AppError::DriverAtCapacity(max_active));
        }

        let trip = inner
            .trips
            .get_mut(&trip_id)
            .ok_or_else(|| AppError::not_found(format!("trip {}", trip_id)))?;

        if trip.status != TripStatus::Pending {
            return Err(AppError::StaleState {
                expected: TripStatus::Pending,
                actual: trip.status,
            });
        }

        mutation(trip);
        trip.updated_at = Utc::now();
        Ok(trip.clone())
    }

    async fn accepted_due_before(&self, now: DateTime<Utc>) -> Result<Vec<Trip>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .trips
            .values()
            .filter(|t| {
                t.status == TripStatus::Accepted
                    && t.timeout_deadline.map_or(false, |due| due <= now)
            })
            .cloned()
            .collect())
    }

    async fn scheduled_due_before(&self, now: DateTime<Utc>) -> Result<Vec<Trip>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .trips
            .values()
            .filter(|t| {
                t.status == TripStatus::Pending
                    && t.is_scheduled
                    && t.scheduled_start_time.map_or(false, |due| due <= now)
            })
            .cloned()
            .collect())
    }

    async fn update_addresses(
        &self,
        trip_id: TripId,
        start_address: Option<String>,
        end_address: Option<String>,
    ) -> Result<Trip, AppError> {
        let mut inner = self.inner.write().await;
        let trip = inner
            .trips
            .get_mut(&trip_id)
            .ok_or_else(|| AppError::not_found(format!("trip {}", trip_id)))?;

        if let Some(address) = start_address {
            trip.start_location.address = address;
        }
        if let Some(address) = end_address {
            trip.end_location.address = address;
        }
        trip.updated_at = Utc::now();
        Ok(trip.clone())
    }

    async fn delete(&self, trip_id: TripId) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        inner
            .trips
            .remove(&trip_id)
            .ok_or_else(|| AppError::not_found(format!("trip {}", trip_id)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trip::{PaymentMethod, TripEndpoint};

    fn endpoint(longitude: f64, latitude: f64) -> TripEndpoint {
        TripEndpoint {
            point: GeoPoint::new(longitude, latitude),
            address: "test address".to_string(),
        }
    }

    fn new_trip(user_id: UserId) -> NewTrip {
        NewTrip {
            user_id,
            start_location: endpoint(35.0, 31.0),
            end_location: endpoint(35.1, 31.1),
            distance_km: 10.0,
            estimated_fare: 44.0,
            payment_method: PaymentMethod::Cash,
            is_scheduled: false,
            scheduled_start_time: None,
        }
    }

    #[tokio::test]
    async fn test_ids_are_sequential() {
        let store = MemoryTripStore::new();
        let a = store.create(new_trip(1)).await.unwrap();
        let b = store.create(new_trip(2)).await.unwrap();
        assert_eq!(a.trip_id + 1, b.trip_id);
    }

    #[tokio::test]
    async fn test_second_active_trip_is_rejected() {
        let store = MemoryTripStore::new();
        store.create(new_trip(7)).await.unwrap();
        let err = store.create(new_trip(7)).await.unwrap_err();
        assert!(matches!(err, AppError::ActiveTripExists { .. }));
    }

    #[tokio::test]
    async fn test_conditional_transition_guards_status() {
        let store = MemoryTripStore::new();
        let trip = store.create(new_trip(1)).await.unwrap();

        let updated = store
            .conditional_transition(
                trip.trip_id,
                TripStatus::Pending,
                Box::new(|t| t.status = TripStatus::Rejected),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, TripStatus::Rejected);

        let err = store
            .conditional_transition(
                trip.trip_id,
                TripStatus::Pending,
                Box::new(|t| t.status = TripStatus::Accepted),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StaleState { .. }));
    }

    #[tokio::test]
    async fn test_accept_respects_driver_capacity() {
        let store = MemoryTripStore::new();
        let first = store.create(new_trip(1)).await.unwrap();
        let second = store.create(new_trip(2)).await.unwrap();

        store
            .accept_for_driver(
                first.trip_id,
                9,
                1,
                Box::new(|t| {
                    t.driver_id = Some(9);
                    t.status = TripStatus::Accepted;
                }),
            )
            .await
            .unwrap();

        let err = store
            .accept_for_driver(
                second.trip_id,
                9,
                1,
                Box::new(|t| {
                    t.driver_id = Some(9);
                    t.status = TripStatus::Accepted;
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DriverAtCapacity(1)));
    }

    #[tokio::test]
    async fn test_only_one_concurrent_accept_wins() {
        let store = std::sync::Arc::new(MemoryTripStore::new());
        let trip = store.create(new_trip(1)).await.unwrap();

        let mut handles = Vec::new();
        for driver_id in [100u64, 200u64] {
            let store = store.clone();
            let trip_id = trip.trip_id;
            handles.push(tokio::spawn(async move {
                store
                    .accept_for_driver(
                        trip_id,
                        driver_id,
                        1,
                        Box::new(move |t| {
                            t.driver_id = Some(driver_id);
                            t.status = TripStatus::Accepted;
                        }),
                    )
                    .await
            }));
        }

        let mut wins = 0;
        let mut losses = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(AppError::StaleState { .. }) => losses += 1,
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(losses, 1);
    }

    #[tokio::test]
    async fn test_pending_near_filters_scheduled_and_driven() {
        let store = MemoryTripStore::new();
        let now = Utc::now();

        // Plain pending trip ~4.4 km north of the origin.
        let mut near = new_trip(1);
        near.start_location = endpoint(35.0, 31.04);
        store.create(near).await.unwrap();

        // Scheduled trip not yet due.
        let mut future = new_trip(2);
        future.is_scheduled = true;
        future.scheduled_start_time = Some(now + chrono::Duration::hours(2));
        store.create(future).await.unwrap();

        // Scheduled trip already due.
        let mut due = new_trip(3);
        due.is_scheduled = true;
        due.scheduled_start_time = Some(now - chrono::Duration::minutes(1));
        store.create(due).await.unwrap();

        let origin = GeoPoint::new(35.0, 31.0);
        let found = store.find_pending_near(origin, 5.0, now).await.unwrap();
        let users: Vec<UserId> = found.iter().map(|t| t.user_id).collect();
        assert!(users.contains(&1));
        assert!(users.contains(&3));
        assert!(!users.contains(&2));
    }

    #[tokio::test]
    async fn test_delete_removes_trip() {
        let store = MemoryTripStore::new();
        let trip = store.create(new_trip(1)).await.unwrap();
        store.delete(trip.trip_id).await.unwrap();
        assert!(store.find_by_id(trip.trip_id).await.unwrap().is_none());
        assert!(matches!(
            store.delete(trip.trip_id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}
