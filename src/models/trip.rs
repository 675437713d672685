// src/models/trip.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type TripId = u64;
pub type UserId = u64;
pub type DriverId = u64;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Pending,    // Waiting for a driver to accept
    Accepted,   // Claimed by a driver, running against the start-by deadline
    Rejected,   // Declined by the driver while still pending
    InProgress, // Driver picked the rider up
    Completed,  // Finished and settled
    Cancelled,  // Cancelled by the requester
    Timeout,    // Reserved terminal state for expired requests
}

impl TripStatus {
    /// Terminal statuses are never reopened.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TripStatus::Rejected
                | TripStatus::Completed
                | TripStatus::Cancelled
                | TripStatus::Timeout
        )
    }

    /// A user may hold at most one trip in an active status.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TripStatus::Pending | TripStatus::Accepted | TripStatus::InProgress
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Wallet,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

/// (longitude, latitude) pair, WGS84 degrees.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TripEndpoint {
    pub point: GeoPoint,
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Trip {
    pub trip_id: TripId,
    pub user_id: UserId,
    pub driver_id: Option<DriverId>,

    pub start_location: TripEndpoint,
    pub end_location: TripEndpoint,
    pub distance_km: f64,

    pub estimated_fare: f64,
    pub actual_fare: Option<f64>,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,

    pub status: TripStatus,
    pub is_scheduled: bool,
    pub scheduled_start_time: Option<DateTime<Utc>>,

    pub requested_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    pub cancellation_reason: Option<String>,
    /// Instant by which the driver must start the trip or lose the acceptance.
    pub timeout_deadline: Option<DateTime<Utc>>,

    pub updated_at: DateTime<Utc>,
}

/// Fields the store needs to mint a new pending trip. The sequential id,
/// status and timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewTrip {
    pub user_id: UserId,
    pub start_location: TripEndpoint,
    pub end_location: TripEndpoint,
    pub distance_km: f64,
    pub estimated_fare: f64,
    pub payment_method: PaymentMethod,
    pub is_scheduled: bool,
    pub scheduled_start_time: Option<DateTime<Utc>>,
}

// Request/Response models — one strongly-typed schema per operation,
// validated at the boundary before reaching the core.

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EndpointRequest {
    pub longitude: f64,
    pub latitude: f64,
    pub address: String,
}

impl From<EndpointRequest> for TripEndpoint {
    fn from(req: EndpointRequest) -> Self {
        TripEndpoint {
            point: GeoPoint::new(req.longitude, req.latitude),
            address: req.address,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTripRequest {
    pub user_id: UserId,
    pub start_location: EndpointRequest,
    pub end_location: EndpointRequest,
    pub distance_km: f64,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub is_scheduled: bool,
    pub scheduled_start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptTripRequest {
    pub driver_id: DriverId,
    pub driver_location: GeoPoint,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RejectTripRequest {
    pub driver_id: DriverId,
    pub cancellation_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct CancelTripRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateTripAddresses {
    pub start_address: Option<String>,
    pub end_address: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NearbyQuery {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct TripListQuery {
    pub status: Option<TripStatus>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NearbyTripsResponse {
    pub message: String,
    pub trips: Vec<Trip>,
    /// Radius bracket that produced the result; absent when nothing matched.
    pub search_radius_km: Option<f64>,
}
