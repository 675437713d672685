// src/routes.rs
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use std::sync::Arc;

use crate::{
    errors::DispatchResult,
    models::trip::{
        AcceptTripRequest, CancelTripRequest, CreateTripRequest, DriverId, GeoPoint, NearbyQuery,
        NearbyTripsResponse, RejectTripRequest, Trip, TripId, TripListQuery, UpdateTripAddresses,
        UserId,
    },
    services::trip_store::TripFilter,
    state::AppState,
};

/// Handlers stay thin: decode, call the dispatch core, encode. Every status
/// decision and side effect lives below this layer.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/trips", post(create_trip).get(list_trips))
        .route("/trips/nearby", get(nearby_trips))
        .route("/trips/:trip_id", get(get_trip))
        .route("/trips/:trip_id", patch(update_trip))
        .route("/trips/:trip_id", delete(cancel_trip))
        .route("/trips/:trip_id/accept", post(accept_trip))
        .route("/trips/:trip_id/reject", post(reject_trip))
        .route("/trips/:trip_id/start", post(start_trip))
        .route("/trips/:trip_id/complete", post(complete_trip))
        .route("/drivers/:driver_id/trips", get(driver_trips))
        .route("/users/:user_id/trips", get(user_trips))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn create_trip(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateTripRequest>,
) -> DispatchResult<(StatusCode, Json<Trip>)> {
    let trip = state.dispatch.create_trip(request).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

async fn nearby_trips(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> DispatchResult<Json<NearbyTripsResponse>> {
    let origin = GeoPoint::new(query.longitude, query.latitude);
    let found = state.dispatch.find_nearby_pending(origin).await?;
    let message = match found.radius_km {
        Some(radius) => format!("{} trips within {} km", found.trips.len(), radius),
        None => "no pending trips nearby".to_string(),
    };
    Ok(Json(NearbyTripsResponse {
        message,
        trips: found.trips,
        search_radius_km: found.radius_km,
    }))
}

async fn get_trip(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<TripId>,
) -> DispatchResult<Json<Trip>> {
    Ok(Json(state.dispatch.get_trip(trip_id).await?))
}

async fn list_trips(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TripListQuery>,
) -> DispatchResult<Json<Vec<Trip>>> {
    let filter = TripFilter {
        status: query.status,
        limit: query.limit,
        ..Default::default()
    };
    Ok(Json(state.dispatch.trips(filter).await?))
}

async fn accept_trip(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<TripId>,
    Json(request): Json<AcceptTripRequest>,
) -> DispatchResult<Json<Trip>> {
    Ok(Json(state.dispatch.accept_trip(trip_id, request).await?))
}

async fn reject_trip(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<TripId>,
    Json(request): Json<RejectTripRequest>,
) -> DispatchResult<Json<Trip>> {
    Ok(Json(
        state
            .dispatch
            .reject_trip(trip_id, request.driver_id, request.cancellation_reason)
            .await?,
    ))
}

async fn start_trip(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<TripId>,
) -> DispatchResult<Json<Trip>> {
    Ok(Json(state.dispatch.start_trip(trip_id).await?))
}

async fn complete_trip(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<TripId>,
) -> DispatchResult<Json<Trip>> {
    Ok(Json(state.dispatch.complete_trip(trip_id).await?))
}

// Cancellation is soft: the record survives with status "cancelled". A body
// is optional; an absent one cancels with the default reason.
async fn cancel_trip(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<TripId>,
    body: Option<Json<CancelTripRequest>>,
) -> DispatchResult<Json<Trip>> {
    let reason = body.and_then(|Json(request)| request.reason);
    Ok(Json(state.dispatch.cancel_trip(trip_id, reason).await?))
}

async fn update_trip(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<TripId>,
    Json(request): Json<UpdateTripAddresses>,
) -> DispatchResult<Json<Trip>> {
    Ok(Json(
        state
            .dispatch
            .update_trip_addresses(trip_id, request.start_address, request.end_address)
            .await?,
    ))
}

async fn driver_trips(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<DriverId>,
    Query(query): Query<TripListQuery>,
) -> DispatchResult<Json<Vec<Trip>>> {
    let filter = TripFilter {
        limit: query.limit,
        ..TripFilter::by_driver(driver_id).with_status(query.status)
    };
    Ok(Json(state.dispatch.trips(filter).await?))
}

async fn user_trips(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
    Query(query): Query<TripListQuery>,
) -> DispatchResult<Json<Vec<Trip>>> {
    let filter = TripFilter {
        limit: query.limit,
        ..TripFilter::by_user(user_id).with_status(query.status)
    };
    Ok(Json(state.dispatch.trips(filter).await?))
}
