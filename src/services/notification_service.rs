// src/services/notification_service.rs
use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

use crate::errors::DispatchError as AppError;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("push send failed: {0}")]
    PushError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl From<NotificationError> for AppError {
    fn from(err: NotificationError) -> Self {
        AppError::NotificationDelivery(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientType {
    Client,
    Driver,
}

impl RecipientType {
    fn as_str(&self) -> &'static str {
        match self {
            RecipientType::Client => "client",
            RecipientType::Driver => "driver",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    TripAccepted,
    TripRejected,
    TripStarted,
    TripCompleted,
    TripAutoCanceled,
    TripCancelled,
}

impl NotificationKind {
    fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TripAccepted => "trip_accepted",
            NotificationKind::TripRejected => "trip_rejected",
            NotificationKind::TripStarted => "trip_started",
            NotificationKind::TripCompleted => "trip_completed",
            NotificationKind::TripAutoCanceled => "trip_auto_canceled",
            NotificationKind::TripCancelled => "trip_cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub data: Option<serde_json::Value>,
}

impl Notification {
    pub fn new(title: &str, message: &str, kind: NotificationKind) -> Self {
        Self {
            title: title.to_string(),
            message: message.to_string(),
            kind,
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Fire-and-forget dispatch of user-facing events. Delivery failure is the
/// caller's problem only to the extent of a log line; it never rolls back
/// trip or financial state.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn notify(
        &self,
        recipient: u64,
        recipient_type: RecipientType,
        notification: Notification,
    ) -> Result<(), AppError>;
}

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub server_key: String,
    pub push_url: String,
}

impl PushConfig {
    pub fn new(server_key: String) -> Self {
        Self {
            server_key,
            push_url: "https://fcm.googleapis.com/fcm/send".to_string(),
        }
    }
}

/// HTTP push gateway. Recipients are addressed by a topic derived from their
/// id; token management belongs to the user-facing apps.
pub struct PushNotificationGateway {
    config: PushConfig,
    client: reqwest::Client,
}

impl PushNotificationGateway {
    pub fn new(config: PushConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationGateway for PushNotificationGateway {
    async fn notify(
        &self,
        recipient: u64,
        recipient_type: RecipientType,
        notification: Notification,
    ) -> Result<(), AppError> {
        let topic = format!("{}-{}", recipient_type.as_str(), recipient);
        tracing::debug!("Sending push notification to topic {}", topic);

        let mut payload = json!({
            "to": format!("/topics/{}", topic),
            "notification": {
                "title": notification.title,
                "body": notification.message,
                "sound": "default"
            },
            "data": {
                "type": notification.kind.as_str(),
            }
        });
        if let Some(data) = notification.data {
            payload["data"]["payload"] = data;
        }

        let response = self
            .client
            .post(&self.config.push_url)
            .header("Authorization", format!("key={}", self.config.server_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            tracing::error!("Push request failed: {}", error_text);
            return Err(NotificationError::PushError(error_text).into());
        }

        Ok(())
    }
}

// Mock gateway for development and testing
#[derive(Debug, Default)]
pub struct MockNotificationGateway;

#[async_trait]
impl NotificationGateway for MockNotificationGateway {
    async fn notify(
        &self,
        recipient: u64,
        recipient_type: RecipientType,
        notification: Notification,
    ) -> Result<(), AppError> {
        tracing::info!(
            "[MOCK] {} notification to {} {}: {} - {}",
            notification.kind.as_str(),
            recipient_type.as_str(),
            recipient,
            notification.title,
            notification.message
        );
        Ok(())
    }
}
