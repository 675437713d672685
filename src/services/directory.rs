// src/services/directory.rs
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{
    errors::DispatchError as AppError,
    models::client::Client,
    models::driver::Driver,
    models::trip::{DriverId, GeoPoint, TripId, UserId},
};

/// Narrow contract over driver records. Profile management lives elsewhere;
/// the dispatch core only reads locations and writes earnings, counters and
/// the rating the RatingEngine computed.
#[async_trait]
pub trait DriverDirectory: Send + Sync {
    async fn find(&self, driver_id: DriverId) -> Result<Option<Driver>, AppError>;
    async fn location(&self, driver_id: DriverId) -> Result<Option<GeoPoint>, AppError>;
    async fn record_earnings(&self, driver_id: DriverId, amount: f64) -> Result<(), AppError>;
    async fn increment_completed_trips(&self, driver_id: DriverId) -> Result<(), AppError>;
    async fn update_rating(&self, driver_id: DriverId, rating: f64) -> Result<(), AppError>;
}

/// Wallet balance operations. `debit` must be atomic with respect to
/// concurrent debits on the same user; `credit` is the compensation hook for
/// a completion that loses the status race after the money moved.
#[async_trait]
pub trait WalletLedger: Send + Sync {
    async fn balance(&self, user_id: UserId) -> Result<f64, AppError>;
    async fn debit(&self, user_id: UserId, amount: f64) -> Result<f64, AppError>;
    async fn credit(&self, user_id: UserId, amount: f64) -> Result<f64, AppError>;
}

/// Client bookkeeping applied at trip completion.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    async fn record_completed_trip(
        &self,
        user_id: UserId,
        trip_id: TripId,
        fare: f64,
    ) -> Result<(), AppError>;
    async fn find_client(&self, user_id: UserId) -> Result<Option<Client>, AppError>;
}

pub struct MemoryDrivers {
    drivers: RwLock<HashMap<DriverId, Driver>>,
}

impl MemoryDrivers {
    pub fn new() -> Self {
        Self {
            drivers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn upsert(&self, driver: Driver) {
        self.drivers.write().await.insert(driver.driver_id, driver);
    }
}

impl Default for MemoryDrivers {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DriverDirectory for MemoryDrivers {
    async fn find(&self, driver_id: DriverId) -> Result<Option<Driver>, AppError> {
        Ok(self.drivers.read().await.get(&driver_id).cloned())
    }

    async fn location(&self, driver_id: DriverId) -> Result<Option<GeoPoint>, AppError> {
        Ok(self
            .drivers
            .read()
            .await
            .get(&driver_id)
            .map(|d| d.current_location))
    }

    async fn record_earnings(&self, driver_id: DriverId, amount: f64) -> Result<(), AppError> {
        let mut drivers = self.drivers.write().await;
        let driver = drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::not_found(format!("driver {}", driver_id)))?;
        driver.earnings += amount;
        Ok(())
    }

    async fn increment_completed_trips(&self, driver_id: DriverId) -> Result<(), AppError> {
        let mut drivers = self.drivers.write().await;
        let driver = drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::not_found(format!("driver {}", driver_id)))?;
        driver.completed_trips += 1;
        Ok(())
    }

    async fn update_rating(&self, driver_id: DriverId, rating: f64) -> Result<(), AppError> {
        let mut drivers = self.drivers.write().await;
        let driver = drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::not_found(format!("driver {}", driver_id)))?;
        driver.rating = rating;
        Ok(())
    }
}

pub struct MemoryClients {
    clients: RwLock<HashMap<UserId, Client>>,
}

impl MemoryClients {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub async fn upsert(&self, client: Client) {
        self.clients.write().await.insert(client.user_id, client);
    }
}

impl Default for MemoryClients {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletLedger for MemoryClients {
    async fn balance(&self, user_id: UserId) -> Result<f64, AppError> {
        let clients = self.clients.read().await;
        clients
            .get(&user_id)
            .map(|c| c.wallet_balance)
            .ok_or_else(|| AppError::not_found(format!("client {}", user_id)))
    }

    async fn debit(&self, user_id: UserId, amount: f64) -> Result<f64, AppError> {
        // Check and subtract under one write lock so concurrent debits on the
        // same wallet cannot both pass the balance check.
        let mut clients = self.clients.write().await;
        let client = clients
            .get_mut(&user_id)
            .ok_or_else(|| AppError::not_found(format!("client {}", user_id)))?;
        if client.wallet_balance < amount {
            return Err(AppError::InsufficientFunds {
                required: amount,
                balance: client.wallet_balance,
            });
        }
        client.wallet_balance -= amount;
        Ok(client.wallet_balance)
    }

    async fn credit(&self, user_id: UserId, amount: f64) -> Result<f64, AppError> {
        let mut clients = self.clients.write().await;
        let client = clients
            .get_mut(&user_id)
            .ok_or_else(|| AppError::not_found(format!("client {}", user_id)))?;
        client.wallet_balance += amount;
        Ok(client.wallet_balance)
    }
}

#[async_trait]
impl ClientDirectory for MemoryClients {
    async fn record_completed_trip(
        &self,
        user_id: UserId,
        trip_id: TripId,
        fare: f64,
    ) -> Result<(), AppError> {
        let mut clients = self.clients.write().await;
        let client = clients
            .get_mut(&user_id)
            .ok_or_else(|| AppError::not_found(format!("client {}", user_id)))?;
        client.trips_taken += 1;
        client.total_spending += fare;
        client.trip_history.push(trip_id);
        tracing::debug!("Recorded completed trip {} for client {}", trip_id, user_id);
        Ok(())
    }

    async fn find_client(&self, user_id: UserId) -> Result<Option<Client>, AppError> {
        Ok(self.clients.read().await.get(&user_id).cloned())
    }
}
