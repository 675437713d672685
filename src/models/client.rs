// src/models/client.rs
use serde::{Deserialize, Serialize};

use crate::models::trip::{TripId, UserId};

pub const DEFAULT_WALLET_BALANCE: f64 = 200.0;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Client {
    pub user_id: UserId,
    pub wallet_balance: f64,
    pub trips_taken: u32,
    pub total_spending: f64,
    pub trip_history: Vec<TripId>,
}

impl Client {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            wallet_balance: DEFAULT_WALLET_BALANCE,
            trips_taken: 0,
            total_spending: 0.0,
            trip_history: Vec::new(),
        }
    }

    pub fn with_balance(user_id: UserId, wallet_balance: f64) -> Self {
        Self {
            wallet_balance,
            ..Self::new(user_id)
        }
    }
}
