// src/services/dispatch_service.rs
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;

use crate::{
    errors::DispatchError as AppError,
    models::rating::RatingAction,
    models::trip::{
        AcceptTripRequest, CreateTripRequest, GeoPoint, NewTrip, PaymentMethod, PaymentStatus,
        Trip, TripId, TripStatus,
    },
    services::{
        broadcast::RealtimeBroadcast,
        directory::{ClientDirectory, DriverDirectory, WalletLedger},
        notification_service::{Notification, NotificationGateway, NotificationKind, RecipientType},
        rating_service::RatingService,
        scheduler::TimeoutScheduler,
        trip_store::{TripFilter, TripStore},
    },
    utils::geo,
};

/// Process-wide fare rate; estimated and actual fares both derive from it.
pub const RATE_PER_KM: f64 = 4.4;

/// Progressive radius brackets, nearest first. The first non-empty bracket
/// wins; it is not a global nearest-trip search.
pub const SEARCH_RADII_KM: [f64; 4] = [5.0, 15.0, 30.0, 100.0];

const PICKUP_MINUTES_PER_KM: f64 = 2.0;
const MIN_PICKUP_WINDOW_MINUTES: f64 = 10.0;
const MAX_PICKUP_WINDOW_MINUTES: f64 = 30.0;

const EXPECTED_TRIP_MINUTES_PER_KM: f64 = 3.0;
const QUICK_START_THRESHOLD_MINUTES: f64 = 5.0;
const LATE_START_THRESHOLD_MINUTES: f64 = 15.0;

const QUICK_RESPONSE_IMPACT: f64 = 2.0;
const LATE_START_IMPACT: f64 = -1.0;
const COMPLETION_BASE_IMPACT: f64 = 5.0;
const FAST_TRIP_BONUS: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// At-most-N concurrent trips in accepted/in_progress per driver.
    pub max_accepted_trips: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_accepted_trips: 1,
        }
    }
}

/// Result of a progressive-radius search.
#[derive(Debug)]
pub struct NearbySearch {
    pub trips: Vec<Trip>,
    /// Bracket that produced the trips; `None` when every bracket was empty.
    pub radius_km: Option<f64>,
}

/// Minutes the driver gets to reach the rider and start the trip, derived
/// from the straight-line pickup distance and clamped to a sane window.
pub(crate) fn pickup_window_minutes(distance_km: f64) -> f64 {
    (distance_km * PICKUP_MINUTES_PER_KM)
        .clamp(MIN_PICKUP_WINDOW_MINUTES, MAX_PICKUP_WINDOW_MINUTES)
}

/// Core trip state machine: creation, proximity discovery, accept/reject
/// arbitration, start/complete settlement and cancellation.
pub struct DispatchService {
    config: DispatchConfig,
    store: Arc<dyn TripStore>,
    drivers: Arc<dyn DriverDirectory>,
    wallet: Arc<dyn WalletLedger>,
    clients: Arc<dyn ClientDirectory>,
    ratings: Arc<RatingService>,
    scheduler: Arc<TimeoutScheduler>,
    notifier: Arc<dyn NotificationGateway>,
    broadcast: Arc<dyn RealtimeBroadcast>,
}

impl DispatchService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: DispatchConfig,
        store: Arc<dyn TripStore>,
        drivers: Arc<dyn DriverDirectory>,
        wallet: Arc<dyn WalletLedger>,
        clients: Arc<dyn ClientDirectory>,
        ratings: Arc<RatingService>,
        scheduler: Arc<TimeoutScheduler>,
        notifier: Arc<dyn NotificationGateway>,
        broadcast: Arc<dyn RealtimeBroadcast>,
    ) -> Self {
        Self {
            config,
            store,
            drivers,
            wallet,
            clients,
            ratings,
            scheduler,
            notifier,
            broadcast,
        }
    }

    /// Notification failures never propagate into the caller's transaction.
    async fn notify(&self, recipient: u64, recipient_type: RecipientType, note: Notification) {
        if let Err(err) = self.notifier.notify(recipient, recipient_type, note).await {
            tracing::warn!("Notification to {} failed: {}", recipient, err);
        }
    }

    async fn publish(&self, event: &str, trip: &Trip) {
        let channel = format!("trips:{}", trip.trip_id);
        let payload = json!({
            "trip_id": trip.trip_id,
            "status": trip.status,
            "driver_id": trip.driver_id,
        });
        if let Err(err) = self.broadcast.publish(&channel, event, payload).await {
            tracing::warn!("Broadcast of {} for trip {} failed: {}", event, trip.trip_id, err);
        }
    }

    async fn driver_name(&self, driver_id: u64) -> String {
        match self.drivers.find(driver_id).await {
            Ok(Some(driver)) => driver.full_name,
            _ => format!("driver {}", driver_id),
        }
    }

    /// Creates a pending trip request. One active trip per user; wallet
    /// payers must already cover the estimated fare.
    pub async fn create_trip(&self, request: CreateTripRequest) -> Result<Trip, AppError> {
        tracing::info!("Creating trip for user {}", request.user_id);

        if request.distance_km <= 0.0 {
            return Err(AppError::validation("distance_km", "must be positive"));
        }
        if request.is_scheduled && request.scheduled_start_time.is_none() {
            return Err(AppError::MissingRequiredField(
                "scheduled_start_time".to_string(),
            ));
        }

        if let Some(active) = self.store.find_active_for_user(request.user_id).await? {
            return Err(AppError::ActiveTripExists {
                trip_id: active.trip_id,
                status: active.status,
            });
        }

        let estimated_fare = request.distance_km * RATE_PER_KM;

        if request.payment_method == PaymentMethod::Wallet {
            let balance = self.wallet.balance(request.user_id).await?;
            if balance < estimated_fare {
                return Err(AppError::InsufficientFunds {
                    required: estimated_fare,
                    balance,
                });
            }
        }

        let trip = self
            .store
            .create(NewTrip {
                user_id: request.user_id,
                start_location: request.start_location.into(),
                end_location: request.end_location.into(),
                distance_km: request.distance_km,
                estimated_fare,
                payment_method: request.payment_method,
                is_scheduled: request.is_scheduled,
                scheduled_start_time: if request.is_scheduled {
                    request.scheduled_start_time
                } else {
                    None
                },
            })
            .await?;

        tracing::info!(
            "Trip {} created: {:.1} km, estimated fare {:.2}",
            trip.trip_id,
            trip.distance_km,
            trip.estimated_fare
        );
        Ok(trip)
    }

    /// Progressive radius search over the pending pool. Returns the first
    /// non-empty bracket; exhausting every bracket is an empty result, not an
    /// error.
    pub async fn find_nearby_pending(&self, origin: GeoPoint) -> Result<NearbySearch, AppError> {
        let now = Utc::now();
        for radius_km in SEARCH_RADII_KM {
            let trips = self.store.find_pending_near(origin, radius_km, now).await?;
            if !trips.is_empty() {
                tracing::info!("Found {} pending trips within {} km", trips.len(), radius_km);
                return Ok(NearbySearch {
                    trips,
                    radius_km: Some(radius_km),
                });
            }
        }

        tracing::debug!("No pending trips within any radius bracket");
        Ok(NearbySearch {
            trips: Vec::new(),
            radius_km: None,
        })
    }

    /// Driver claims a pending trip. Capacity check and the pending->accepted
    /// transition run in one critical section; the loser of a concurrent
    /// accept observes `TripNotAvailable`.
    pub async fn accept_trip(
        &self,
        trip_id: TripId,
        request: AcceptTripRequest,
    ) -> Result<Trip, AppError> {
        let driver_id = request.driver_id;
        tracing::info!("Driver {} accepting trip {}", driver_id, trip_id);

        let trip = self
            .store
            .find_by_id(trip_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("trip {}", trip_id)))?;

        let pickup_km = geo::distance_km(request.driver_location, trip.start_location.point);
        let window_minutes = pickup_window_minutes(pickup_km);
        let now = Utc::now();
        let deadline = now + Duration::milliseconds((window_minutes * 60_000.0) as i64);

        let updated = self
            .store
            .accept_for_driver(
                trip_id,
                driver_id,
                self.config.max_accepted_trips,
                Box::new(move |t| {
                    t.driver_id = Some(driver_id);
                    t.status = TripStatus::Accepted;
                    t.accepted_at = Some(now);
                    t.timeout_deadline = Some(deadline);
                }),
            )
            .await
            .map_err(|err| err.surface_stale("trip can no longer be accepted"))?;

        self.scheduler.arm(trip_id, driver_id, deadline);

        let driver_name = self.driver_name(driver_id).await;
        self.notify(
            updated.user_id,
            RecipientType::Client,
            Notification::new(
                "Trip accepted",
                &format!("{} accepted your trip #{}", driver_name, trip_id),
                NotificationKind::TripAccepted,
            )
            .with_data(json!({ "trip_id": trip_id, "driver_id": driver_id })),
        )
        .await;
        self.publish("trip_accepted", &updated).await;

        tracing::info!(
            "Trip {} accepted by driver {}: {:.2} km to pickup, start by {}",
            trip_id,
            driver_id,
            pickup_km,
            deadline
        );
        Ok(updated)
    }

    /// Driver declines a pending trip. No rating impact.
    pub async fn reject_trip(
        &self,
        trip_id: TripId,
        driver_id: u64,
        reason: Option<String>,
    ) -> Result<Trip, AppError> {
        let reason = reason.unwrap_or_else(|| "rejected by driver".to_string());
        let stored_reason = reason.clone();

        let updated = self
            .store
            .conditional_transition(
                trip_id,
                TripStatus::Pending,
                Box::new(move |t| {
                    t.status = TripStatus::Rejected;
                    t.cancellation_reason = Some(stored_reason);
                }),
            )
            .await
            .map_err(|err| err.surface_stale("trip can no longer be rejected"))?;

        let driver_name = self.driver_name(driver_id).await;
        self.notify(
            updated.user_id,
            RecipientType::Client,
            Notification::new(
                "Trip rejected",
                &format!("{} declined your trip #{}", driver_name, trip_id),
                NotificationKind::TripRejected,
            )
            .with_data(json!({ "trip_id": trip_id, "reason": reason })),
        )
        .await;
        self.publish("trip_rejected", &updated).await;

        tracing::info!("Trip {} rejected by driver {}", trip_id, driver_id);
        Ok(updated)
    }

    /// Driver starts the accepted trip. The CAS settles the race against the
    /// timeout revert: only the winner rates the response latency.
    pub async fn start_trip(&self, trip_id: TripId) -> Result<Trip, AppError> {
        let now = Utc::now();
        let updated = self
            .store
            .conditional_transition(
                trip_id,
                TripStatus::Accepted,
                Box::new(move |t| {
                    t.status = TripStatus::InProgress;
                    t.start_time = Some(now);
                }),
            )
            .await
            .map_err(|err| err.surface_stale("trip can only be started once accepted"))?;

        if let (Some(driver_id), Some(accepted_at)) = (updated.driver_id, updated.accepted_at) {
            let response_minutes = (now - accepted_at).num_milliseconds() as f64 / 60_000.0;
            let adjustment = if response_minutes < QUICK_START_THRESHOLD_MINUTES {
                Some((QUICK_RESPONSE_IMPACT, RatingAction::QuickResponse))
            } else if response_minutes > LATE_START_THRESHOLD_MINUTES {
                Some((LATE_START_IMPACT, RatingAction::LateStart))
            } else {
                None
            };

            if let Some((impact, action)) = adjustment {
                if let Err(err) = self
                    .ratings
                    .adjust(driver_id, impact, action, Some(trip_id))
                    .await
                {
                    tracing::warn!("Response-time rating for trip {} failed: {}", trip_id, err);
                }
            }
        }

        self.notify(
            updated.user_id,
            RecipientType::Client,
            Notification::new(
                "Trip started",
                &format!("Your trip #{} is underway", trip_id),
                NotificationKind::TripStarted,
            )
            .with_data(json!({ "trip_id": trip_id })),
        )
        .await;
        self.publish("trip_started", &updated).await;

        tracing::info!("Trip {} started", trip_id);
        Ok(updated)
    }

    /// Completes an in-progress trip: settles the fare, rates the driver,
    /// updates driver and client bookkeeping. A wallet shortfall leaves the
    /// trip in_progress with no side effects.
    pub async fn complete_trip(&self, trip_id: TripId) -> Result<Trip, AppError> {
        let trip = self
            .store
            .find_by_id(trip_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("trip {}", trip_id)))?;

        if trip.status != TripStatus::InProgress {
            return Err(AppError::trip_not_available(format!(
                "trip {} is {:?}, not in progress",
                trip_id, trip.status
            )));
        }

        // Actual fare is recomputed from the same rate, not carried over from
        // the estimate; the two fields may diverge in a fuller pricing model.
        let fare = trip.distance_km * RATE_PER_KM;
        let pay_by_wallet = trip.payment_method == PaymentMethod::Wallet;

        if pay_by_wallet {
            self.wallet.debit(trip.user_id, fare).await?;
        }

        let now = Utc::now();
        let transition = self
            .store
            .conditional_transition(
                trip_id,
                TripStatus::InProgress,
                Box::new(move |t| {
                    t.status = TripStatus::Completed;
                    t.end_time = Some(now);
                    t.actual_fare = Some(fare);
                    if pay_by_wallet {
                        t.payment_status = PaymentStatus::Paid;
                    }
                }),
            )
            .await;

        let updated = match transition {
            Ok(updated) => updated,
            Err(err) => {
                // The money moved but another completer won the transition;
                // put it back before surfacing the loss.
                if pay_by_wallet {
                    match self.wallet.credit(trip.user_id, fare).await {
                        Ok(_) => tracing::warn!(
                            "Refunded {:.2} to user {} after losing completion race on trip {}",
                            fare,
                            trip.user_id,
                            trip_id
                        ),
                        Err(credit_err) => tracing::error!(
                            "Failed to refund {:.2} to user {} for trip {}: {}",
                            fare,
                            trip.user_id,
                            trip_id,
                            credit_err
                        ),
                    }
                }
                return Err(err.surface_stale("trip can only be completed while in progress"));
            }
        };

        if let Some(driver_id) = updated.driver_id {
            let mut impact = COMPLETION_BASE_IMPACT;
            if let Some(start_time) = updated.start_time {
                let duration_minutes = (now - start_time).num_milliseconds() as f64 / 60_000.0;
                let expected_minutes = updated.distance_km * EXPECTED_TRIP_MINUTES_PER_KM;
                if duration_minutes < expected_minutes * 0.8 {
                    impact += FAST_TRIP_BONUS;
                }
            }
            if let Err(err) = self
                .ratings
                .adjust(driver_id, impact, RatingAction::TripCompleted, Some(trip_id))
                .await
            {
                tracing::warn!("Completion rating for trip {} failed: {}", trip_id, err);
            }

            // Bookkeeping after the committed transition is logged, never
            // rolled back.
            if let Err(err) = self.drivers.record_earnings(driver_id, fare).await {
                tracing::warn!("Recording earnings for driver {} failed: {}", driver_id, err);
            }
            if let Err(err) = self.drivers.increment_completed_trips(driver_id).await {
                tracing::warn!(
                    "Incrementing completed trips for driver {} failed: {}",
                    driver_id,
                    err
                );
            }
        } else {
            tracing::warn!("Completed trip {} has no driver on record", trip_id);
        }

        if let Err(err) = self
            .clients
            .record_completed_trip(updated.user_id, trip_id, fare)
            .await
        {
            tracing::warn!(
                "Recording completed trip for client {} failed: {}",
                updated.user_id,
                err
            );
        }

        self.notify(
            updated.user_id,
            RecipientType::Client,
            Notification::new(
                "Trip completed",
                &format!("Your trip #{} is complete", trip_id),
                NotificationKind::TripCompleted,
            )
            .with_data(json!({
                "trip_id": trip_id,
                "fare": fare,
                "payment_method": updated.payment_method,
                "payment_status": updated.payment_status,
            })),
        )
        .await;
        self.publish("trip_completed", &updated).await;

        tracing::info!("Trip {} completed, fare {:.2}", trip_id, fare);
        Ok(updated)
    }

    /// Soft cancellation: any non-terminal trip transitions to cancelled with
    /// a reason, keeping the audit trail. Terminal trips stay as they are.
    pub async fn cancel_trip(
        &self,
        trip_id: TripId,
        reason: Option<String>,
    ) -> Result<Trip, AppError> {
        let trip = self
            .store
            .find_by_id(trip_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("trip {}", trip_id)))?;

        if trip.status.is_terminal() {
            return Err(AppError::trip_not_available(format!(
                "trip {} already ended as {:?}",
                trip_id, trip.status
            )));
        }

        let stored_reason = reason.unwrap_or_else(|| "cancelled by user".to_string());
        let reason_for_mutation = stored_reason.clone();
        let updated = self
            .store
            .conditional_transition(
                trip_id,
                trip.status,
                Box::new(move |t| {
                    t.status = TripStatus::Cancelled;
                    t.cancellation_reason = Some(reason_for_mutation);
                    t.timeout_deadline = None;
                }),
            )
            .await
            .map_err(|err| err.surface_stale("trip can no longer be cancelled"))?;

        if let Some(driver_id) = updated.driver_id {
            self.notify(
                driver_id,
                RecipientType::Driver,
                Notification::new(
                    "Trip cancelled",
                    &format!("Trip #{} was cancelled: {}", trip_id, stored_reason),
                    NotificationKind::TripCancelled,
                )
                .with_data(json!({ "trip_id": trip_id })),
            )
            .await;
        }
        self.publish("trip_cancelled", &updated).await;

        tracing::info!("Trip {} cancelled", trip_id);
        Ok(updated)
    }

    pub async fn get_trip(&self, trip_id: TripId) -> Result<Trip, AppError> {
        self.store
            .find_by_id(trip_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("trip {}", trip_id)))
    }

    /// Filtered listing, newest first.
    pub async fn trips(&self, filter: TripFilter) -> Result<Vec<Trip>, AppError> {
        self.store.find(filter).await
    }

    /// Address-only edit; status and geometry coordinates are untouched.
    pub async fn update_trip_addresses(
        &self,
        trip_id: TripId,
        start_address: Option<String>,
        end_address: Option<String>,
    ) -> Result<Trip, AppError> {
        self.store
            .update_addresses(trip_id, start_address, end_address)
            .await
    }
}
