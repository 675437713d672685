// src/models/mod.rs
pub mod client;
pub mod driver;
pub mod rating;
pub mod trip;

pub use client::*;
pub use driver::*;
pub use rating::*;
pub use trip::*;
