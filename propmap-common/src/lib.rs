//! # propmap Common Library
//!
//! Shared code for the propmap server and uploader including:
//! - Callsign and grid normalization
//! - Log payload model, validation and fingerprinting
//! - Query windows and timestamp helpers
//! - Event types (PropmapEvent enum) and the EventBus
//! - Configuration loading

pub mod callsign;
pub mod config;
pub mod error;
pub mod events;
pub mod payload;
pub mod time;
pub mod window;

pub use callsign::{Callsign, Grid};
pub use error::{Error, Result};
pub use window::TimeWindow;
