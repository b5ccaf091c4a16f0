//! # BirdCard Common Library
//!
//! Shared code for the BirdCard selection engine including:
//! - Location, day key and bucket model
//! - Event types (EngineEvent enum) and the EventBus
//! - Configuration loading
//! - Clock abstraction
//! - SSE helpers

pub mod config;
pub mod error;
pub mod events;
pub mod location;
pub mod models;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
pub use models::{Item, SelectionTier, TrackKind};
pub use location::{DayKey, Location, LocationBucket, LocationSource, ResolvedLocation};
pub use time::{Clock, ManualClock, SystemClock};
