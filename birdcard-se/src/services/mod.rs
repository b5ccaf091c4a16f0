//! Selection engine services
//!
//! Leaf components first: resolver, day key, bucketer, cache, regionality,
//! sessions. [`engine`] ties them into the play and track state machine.

pub mod background;
pub mod bucketer;
pub mod day_key;
pub mod engine;
pub mod location_resolver;
pub mod regionality;
pub mod selection_cache;
pub mod session_store;
pub mod target_ledger;
pub mod tracks;

pub use bucketer::LocationBucketer;
pub use day_key::{ComputedDayKey, CoordinateRuleTable, DayKeyCalculator};
pub use engine::{
    anchor_index, Collaborators, PlayOutcome, PlayRequest, PlayStatus, SelectionEngine,
    SelectionPolicy,
};
pub use location_resolver::{LocationResolver, Resolution};
pub use regionality::RegionalityChecker;
pub use selection_cache::{CacheOutcome, SelectionCache, SelectionKey, SelectionRecord};
pub use session_store::{Session, SessionLookup, SessionStore};
pub use target_ledger::{LedgerSync, TargetLedger};
pub use tracks::{TrackRequest, TrackResponse};
