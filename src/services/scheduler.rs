// src/services/scheduler.rs
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    errors::DispatchError as AppError,
    models::rating::RatingAction,
    models::trip::{DriverId, TripId, TripStatus},
    services::{
        notification_service::{Notification, NotificationGateway, NotificationKind, RecipientType},
        rating_service::RatingService,
        trip_store::TripStore,
    },
};

const FAILURE_TO_START_IMPACT: f64 = -5.0;

/// Enforces the start-by deadline on accepted trips. The deadline lives on
/// the trip record itself, so a restart loses nothing; the sweep re-derives
/// all pending work from the store on every tick.
pub struct TimeoutScheduler {
    store: Arc<dyn TripStore>,
    ratings: Arc<RatingService>,
    notifier: Arc<dyn NotificationGateway>,
}

impl TimeoutScheduler {
    pub fn new(
        store: Arc<dyn TripStore>,
        ratings: Arc<RatingService>,
        notifier: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self {
            store,
            ratings,
            notifier,
        }
    }

    /// Called at acceptance time. The deadline is already persisted on the
    /// trip; this only leaves a trace for operators tailing the logs.
    pub fn arm(&self, trip_id: TripId, driver_id: DriverId, deadline: DateTime<Utc>) {
        tracing::debug!(
            "Armed start-by check for trip {} (driver {}), due {}",
            trip_id,
            driver_id,
            deadline
        );
    }

    /// Reverts one overdue acceptance back to the pending pool. Returns
    /// `Ok(false)` when the trip moved on in the meantime; the driver who
    /// started in time keeps the trip and takes no penalty.
    pub async fn expire_trip(&self, trip_id: TripId) -> Result<bool, AppError> {
        let Some(trip) = self.store.find_by_id(trip_id).await? else {
            return Ok(false);
        };
        if trip.status != TripStatus::Accepted {
            return Ok(false);
        }
        let Some(driver_id) = trip.driver_id else {
            return Ok(false);
        };

        let transition = self
            .store
            .conditional_transition(
                trip_id,
                TripStatus::Accepted,
                Box::new(|t| {
                    t.status = TripStatus::Pending;
                    t.driver_id = None;
                    t.accepted_at = None;
                    t.timeout_deadline = None;
                }),
            )
            .await;

        match transition {
            Ok(_) => {
                if let Err(err) = self
                    .ratings
                    .adjust(
                        driver_id,
                        FAILURE_TO_START_IMPACT,
                        RatingAction::FailureToStartTrip,
                        Some(trip_id),
                    )
                    .await
                {
                    tracing::warn!(
                        "Timeout penalty for driver {} on trip {} failed: {}",
                        driver_id,
                        trip_id,
                        err
                    );
                }

                let note = Notification::new(
                    "Trip reassigned",
                    &format!("Trip #{} was released because it was not started in time", trip_id),
                    NotificationKind::TripAutoCanceled,
                )
                .with_data(json!({ "trip_id": trip_id }));
                if let Err(err) = self
                    .notifier
                    .notify(driver_id, RecipientType::Driver, note)
                    .await
                {
                    tracing::warn!("Timeout notification to driver {} failed: {}", driver_id, err);
                }

                tracing::info!(
                    "Trip {} returned to pending; driver {} missed the start-by deadline",
                    trip_id,
                    driver_id
                );
                Ok(true)
            }
            // Lost the race to a start (or cancel); nothing to do.
            Err(AppError::StaleState { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// One pass over every acceptance whose deadline is behind `now`.
    /// Returns how many trips were actually reverted.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let due = self.store.accepted_due_before(now).await?;
        let mut reverted = 0;
        for trip in due {
            if self.expire_trip(trip.trip_id).await? {
                reverted += 1;
            }
        }
        if reverted > 0 {
            tracing::info!("Timeout sweep reverted {} trips", reverted);
        }
        Ok(reverted)
    }

    /// Long-running sweep loop; spawned once at startup.
    pub async fn run(self: Arc<Self>, period: Duration) {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if let Err(err) = self.sweep(Utc::now()).await {
                tracing::error!("Timeout sweep failed: {}", err);
            }
        }
    }
}

/// Surfaces scheduled trips into the discoverable pool once their start time
/// arrives. Eligibility itself is enforced by the store query, so this loop
/// only reports; a missed tick delays nothing beyond the next tick.
pub struct PeriodicActivator {
    store: Arc<dyn TripStore>,
}

impl PeriodicActivator {
    pub fn new(store: Arc<dyn TripStore>) -> Self {
        Self { store }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let due = self.store.scheduled_due_before(now).await?;
        if !due.is_empty() {
            tracing::info!("{} scheduled trips are now live for discovery", due.len());
        }
        Ok(due.len())
    }

    pub async fn run(self: Arc<Self>, period: Duration) {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if let Err(err) = self.sweep(Utc::now()).await {
                tracing::error!("Scheduled-trip sweep failed: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::driver::Driver;
    use crate::models::trip::{GeoPoint, NewTrip, PaymentMethod, TripEndpoint};
    use crate::services::directory::{DriverDirectory, MemoryDrivers};
    use crate::services::notification_service::MockNotificationGateway;
    use crate::services::trip_store::MemoryTripStore;
    use chrono::Duration as ChronoDuration;

    fn endpoint() -> TripEndpoint {
        TripEndpoint {
            point: GeoPoint::new(35.0, 31.0),
            address: "somewhere".to_string(),
        }
    }

    fn new_trip(user_id: u64) -> NewTrip {
        NewTrip {
            user_id,
            start_location: endpoint(),
            end_location: endpoint(),
            distance_km: 10.0,
            estimated_fare: 44.0,
            payment_method: PaymentMethod::Cash,
            is_scheduled: false,
            scheduled_start_time: None,
        }
    }

    struct Fixture {
        store: Arc<MemoryTripStore>,
        drivers: Arc<MemoryDrivers>,
        scheduler: TimeoutScheduler,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryTripStore::new());
        let drivers = Arc::new(MemoryDrivers::new());
        drivers
            .upsert(Driver::new(9, "Test Driver", GeoPoint::new(35.0, 31.0)))
            .await;
        let ratings = Arc::new(RatingService::new(drivers.clone()));
        let scheduler = TimeoutScheduler::new(
            store.clone(),
            ratings,
            Arc::new(MockNotificationGateway),
        );
        Fixture {
            store,
            drivers,
            scheduler,
        }
    }

    async fn accept_with_deadline(
        fx: &Fixture,
        trip_id: TripId,
        deadline: DateTime<Utc>,
    ) {
        let now = Utc::now();
        fx.store
            .accept_for_driver(
                trip_id,
                9,
                1,
                Box::new(move |t| {
                    t.driver_id = Some(9);
                    t.status = TripStatus::Accepted;
                    t.accepted_at = Some(now);
                    t.timeout_deadline = Some(deadline);
                }),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_expired_acceptance_reverts_with_penalty() {
        let fx = fixture().await;
        let trip = fx.store.create(new_trip(1)).await.unwrap();
        accept_with_deadline(&fx, trip.trip_id, Utc::now() - ChronoDuration::minutes(1)).await;

        let reverted = fx.scheduler.sweep(Utc::now()).await.unwrap();
        assert_eq!(reverted, 1);

        let reopened = fx.store.find_by_id(trip.trip_id).await.unwrap().unwrap();
        assert_eq!(reopened.status, TripStatus::Pending);
        assert_eq!(reopened.driver_id, None);
        assert_eq!(reopened.timeout_deadline, None);

        let rating = fx.drivers.find(9).await.unwrap().unwrap().rating;
        assert!((rating - 68.0).abs() < 1e-9, "rating was {}", rating);
    }

    #[tokio::test]
    async fn test_expire_is_idempotent() {
        let fx = fixture().await;
        let trip = fx.store.create(new_trip(1)).await.unwrap();
        accept_with_deadline(&fx, trip.trip_id, Utc::now() - ChronoDuration::minutes(1)).await;

        assert!(fx.scheduler.expire_trip(trip.trip_id).await.unwrap());
        // Second firing finds the trip pending again and does nothing.
        assert!(!fx.scheduler.expire_trip(trip.trip_id).await.unwrap());

        let rating = fx.drivers.find(9).await.unwrap().unwrap().rating;
        assert!((rating - 68.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_started_trip_is_not_expired() {
        let fx = fixture().await;
        let trip = fx.store.create(new_trip(1)).await.unwrap();
        accept_with_deadline(&fx, trip.trip_id, Utc::now() - ChronoDuration::minutes(1)).await;

        fx.store
            .conditional_transition(
                trip.trip_id,
                TripStatus::Accepted,
                Box::new(|t| {
                    t.status = TripStatus::InProgress;
                    t.start_time = Some(Utc::now());
                }),
            )
            .await
            .unwrap();

        assert!(!fx.scheduler.expire_trip(trip.trip_id).await.unwrap());
        let rating = fx.drivers.find(9).await.unwrap().unwrap().rating;
        assert_eq!(rating, 80.0);
    }

    #[tokio::test]
    async fn test_missing_trip_is_a_noop() {
        let fx = fixture().await;
        assert!(!fx.scheduler.expire_trip(404).await.unwrap());
    }

    #[tokio::test]
    async fn test_activator_counts_due_scheduled_trips() {
        let store = Arc::new(MemoryTripStore::new());
        let mut scheduled = new_trip(1);
        scheduled.is_scheduled = true;
        scheduled.scheduled_start_time = Some(Utc::now() - ChronoDuration::minutes(5));
        store.create(scheduled).await.unwrap();

        let mut future = new_trip(2);
        future.is_scheduled = true;
        future.scheduled_start_time = Some(Utc::now() + ChronoDuration::hours(2));
        store.create(future).await.unwrap();

        let activator = PeriodicActivator::new(store);
        assert_eq!(activator.sweep(Utc::now()).await.unwrap(), 1);
    }
}
