// src/services/mod.rs
pub mod broadcast;
pub mod directory;
pub mod dispatch_service;
pub mod notification_service;
pub mod rating_service;
pub mod scheduler;
pub mod trip_store;
