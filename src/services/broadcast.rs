// src/services/broadcast.rs
use async_trait::async_trait;

use crate::errors::DispatchError as AppError;

/// At-most-once push of live trip events to subscribed parties. No delivery
/// guarantee is required; callers log failures and move on.
#[async_trait]
pub trait RealtimeBroadcast: Send + Sync {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), AppError>;
}

/// Development stand-in that writes events to the log instead of a realtime
/// provider.
#[derive(Debug, Default)]
pub struct LogBroadcast;

#[async_trait]
impl RealtimeBroadcast for LogBroadcast {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), AppError> {
        tracing::info!("[broadcast] {} {}: {}", channel, event, payload);
        Ok(())
    }
}
