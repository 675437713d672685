// src/state.rs
use std::sync::Arc;
use std::time::Duration;

use crate::services::{
    broadcast::{LogBroadcast, RealtimeBroadcast},
    directory::{MemoryClients, MemoryDrivers},
    dispatch_service::{DispatchConfig, DispatchService},
    notification_service::{
        MockNotificationGateway, NotificationGateway, PushConfig, PushNotificationGateway,
    },
    rating_service::RatingService,
    scheduler::{PeriodicActivator, TimeoutScheduler},
    trip_store::{MemoryTripStore, TripStore},
};

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub push_server_key: Option<String>,
    pub max_accepted_trips: usize,
    pub timeout_sweep_secs: u64,
    pub activation_sweep_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            push_server_key: None,
            max_accepted_trips: 1,
            timeout_sweep_secs: 30,
            activation_sweep_secs: 60,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            push_server_key: std::env::var("PUSH_SERVER_KEY").ok(),
            max_accepted_trips: std::env::var("MAX_ACCEPTED_TRIPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_accepted_trips),
            timeout_sweep_secs: std::env::var("TIMEOUT_SWEEP_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_sweep_secs),
            activation_sweep_secs: std::env::var("ACTIVATION_SWEEP_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.activation_sweep_secs),
        }
    }
}

pub struct AppState {
    pub config: AppConfig,
    pub trips: Arc<dyn TripStore>,
    pub drivers: Arc<MemoryDrivers>,
    pub clients: Arc<MemoryClients>,
    pub ratings: Arc<RatingService>,
    pub dispatch: Arc<DispatchService>,
    pub scheduler: Arc<TimeoutScheduler>,
    pub activator: Arc<PeriodicActivator>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let trips: Arc<dyn TripStore> = Arc::new(MemoryTripStore::new());
        let drivers = Arc::new(MemoryDrivers::new());
        let clients = Arc::new(MemoryClients::new());
        let ratings = Arc::new(RatingService::new(drivers.clone()));

        let notifier: Arc<dyn NotificationGateway> = match &config.push_server_key {
            Some(key) => Arc::new(PushNotificationGateway::new(PushConfig::new(key.clone()))),
            None => {
                tracing::warn!("PUSH_SERVER_KEY not set, using mock notification gateway");
                Arc::new(MockNotificationGateway)
            }
        };
        let broadcast: Arc<dyn RealtimeBroadcast> = Arc::new(LogBroadcast);

        let scheduler = Arc::new(TimeoutScheduler::new(
            trips.clone(),
            ratings.clone(),
            notifier.clone(),
        ));
        let activator = Arc::new(PeriodicActivator::new(trips.clone()));

        let dispatch = Arc::new(DispatchService::new(
            DispatchConfig {
                max_accepted_trips: config.max_accepted_trips,
            },
            trips.clone(),
            drivers.clone(),
            clients.clone(),
            clients.clone(),
            ratings.clone(),
            scheduler.clone(),
            notifier,
            broadcast,
        ));

        Self {
            config,
            trips,
            drivers,
            clients,
            ratings,
            dispatch,
            scheduler,
            activator,
        }
    }

    /// Spawns the timeout and scheduled-trip sweeps. Both loops run for the
    /// life of the process.
    pub fn spawn_background_tasks(&self) {
        tokio::spawn(
            self.scheduler
                .clone()
                .run(Duration::from_secs(self.config.timeout_sweep_secs)),
        );
        tokio::spawn(
            self.activator
                .clone()
                .run(Duration::from_secs(self.config.activation_sweep_secs)),
        );
    }
}
