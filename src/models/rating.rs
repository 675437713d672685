// src/models/rating.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::trip::{DriverId, TripId};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RatingAction {
    TripCompleted,
    TripCanceled,
    LateStart,
    QuickResponse,
    CustomerComplaint,
    FailureToStartTrip,
}

impl RatingAction {
    /// Per-action sensitivity. Heavier weights make the event move the
    /// rating further for the same raw impact.
    pub fn weight(&self) -> f64 {
        match self {
            RatingAction::TripCompleted => 1.0,
            RatingAction::TripCanceled => 1.8,
            RatingAction::LateStart => 1.3,
            RatingAction::QuickResponse => 0.8,
            RatingAction::CustomerComplaint => 2.2,
            RatingAction::FailureToStartTrip => 3.0,
        }
    }
}

/// Append-only audit record; never mutated or deleted after creation.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RatingHistoryEntry {
    pub driver_id: DriverId,
    pub previous_rating: f64,
    pub new_rating: f64,
    pub impact: f64,
    pub action: RatingAction,
    pub trip_id: Option<TripId>,
    pub timestamp: DateTime<Utc>,
}
