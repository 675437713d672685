// src/models/driver.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::trip::{DriverId, GeoPoint};

/// Driver record as the dispatch core sees it. The live accepted-trip count
/// is a store query, never a field here.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Driver {
    pub driver_id: DriverId,
    pub full_name: String,
    pub is_available: bool,
    pub current_location: GeoPoint,
    /// Bounded 0-100 quality score, adjusted by weighted event impacts.
    pub rating: f64,
    pub earnings: f64,
    pub completed_trips: u32,
    pub joined_at: DateTime<Utc>,
}

impl Driver {
    pub fn new(driver_id: DriverId, full_name: impl Into<String>, location: GeoPoint) -> Self {
        Self {
            driver_id,
            full_name: full_name.into(),
            is_available: true,
            current_location: location,
            rating: crate::services::rating_service::DEFAULT_RATING,
            earnings: 0.0,
            completed_trips: 0,
            joined_at: Utc::now(),
        }
    }
}
