// src/services/rating_service.rs
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    errors::DispatchError as AppError,
    models::rating::{RatingAction, RatingHistoryEntry},
    models::trip::{DriverId, TripId},
    services::directory::DriverDirectory,
};

pub const DEFAULT_RATING: f64 = 80.0;
pub const MIN_RATING: f64 = 0.0;
pub const MAX_RATING: f64 = 100.0;

/// Global dampening applied to every adjustment to keep single events from
/// swinging the score too hard.
const ADJUSTMENT_FACTOR: f64 = 0.8;

/// Converts trip events into bounded rating deltas and keeps the append-only
/// history of every adjustment.
pub struct RatingService {
    drivers: Arc<dyn DriverDirectory>,
    history: RwLock<Vec<RatingHistoryEntry>>,
}

/// new = clamp(current + impact * weight(action) * 0.8, 0, 100)
pub fn calculate_new_rating(current: f64, impact: f64, action: RatingAction) -> f64 {
    let adjusted = current + impact * action.weight() * ADJUSTMENT_FACTOR;
    adjusted.clamp(MIN_RATING, MAX_RATING)
}

impl RatingService {
    pub fn new(drivers: Arc<dyn DriverDirectory>) -> Self {
        Self {
            drivers,
            history: RwLock::new(Vec::new()),
        }
    }

    /// Applies a weighted impact to the driver's rating and appends a history
    /// entry. A missing driver record is a no-op: the caller's trip flow must
    /// not fail over a bookkeeping gap, but it is worth a warning in the logs.
    pub async fn adjust(
        &self,
        driver_id: DriverId,
        impact: f64,
        action: RatingAction,
        trip_id: Option<TripId>,
    ) -> Result<Option<f64>, AppError> {
        let Some(driver) = self.drivers.find(driver_id).await? else {
            tracing::warn!(
                "Rating adjustment for unknown driver {} ({:?}, impact {}) skipped",
                driver_id,
                action,
                impact
            );
            return Ok(None);
        };

        let current = driver.rating;
        let new_rating = calculate_new_rating(current, impact, action);

        self.drivers.update_rating(driver_id, new_rating).await?;

        let entry = RatingHistoryEntry {
            driver_id,
            previous_rating: current,
            new_rating,
            impact,
            action,
            trip_id,
            timestamp: Utc::now(),
        };
        self.history.write().await.push(entry);

        tracing::info!(
            "Driver {} rating {:.2} -> {:.2} ({:?}, impact {})",
            driver_id,
            current,
            new_rating,
            action,
            impact
        );
        Ok(Some(new_rating))
    }

    pub async fn history_for(&self, driver_id: DriverId) -> Vec<RatingHistoryEntry> {
        self.history
            .read()
            .await
            .iter()
            .filter(|e| e.driver_id == driver_id)
            .cloned()
            .collect()
    }
}
