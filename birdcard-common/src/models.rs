//! Content model shared between the engine and its HTTP surface

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// One unit of daily content (one bird)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    /// Stable identifier, e.g. `Northern_Cardinal`
    pub id: String,
    pub common_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scientific_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

impl Item {
    /// Item whose display name is derived from the id (`Northern_Cardinal` → `Northern Cardinal`)
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        let common_name = id.replace('_', " ");
        Self {
            id,
            common_name,
            scientific_name: None,
            icon_url: None,
        }
    }
}

/// Which fallback tier produced a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionTier {
    /// External source queried with the observer's location
    LocationSource,
    /// Global record already cached for the day
    GlobalCache,
    /// Deterministic anchor rotation
    Anchor,
}

impl fmt::Display for SelectionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelectionTier::LocationSource => "location_source",
            SelectionTier::GlobalCache => "global_cache",
            SelectionTier::Anchor => "anchor",
        };
        f.write_str(name)
    }
}

/// One step of a playback sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Welcome,
    Announcement,
    Main,
    Guide,
    Farewell,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Welcome => "welcome",
            TrackKind::Announcement => "announcement",
            TrackKind::Main => "main",
            TrackKind::Guide => "guide",
            TrackKind::Farewell => "farewell",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "welcome" => Ok(TrackKind::Welcome),
            "announcement" => Ok(TrackKind::Announcement),
            "main" => Ok(TrackKind::Main),
            "guide" => Ok(TrackKind::Guide),
            "farewell" => Ok(TrackKind::Farewell),
            other => Err(Error::InvalidInput(format!("unknown track kind: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_from_id_derives_name() {
        let item = Item::from_id("Northern_Cardinal");
        assert_eq!(item.id, "Northern_Cardinal");
        assert_eq!(item.common_name, "Northern Cardinal");
        assert!(item.icon_url.is_none());
    }

    #[test]
    fn test_track_kind_round_trip_names() {
        for kind in [
            TrackKind::Welcome,
            TrackKind::Announcement,
            TrackKind::Main,
            TrackKind::Guide,
            TrackKind::Farewell,
        ] {
            assert_eq!(kind.as_str().parse::<TrackKind>().unwrap(), kind);
        }
        assert!("intro".parse::<TrackKind>().is_err());
    }

    #[test]
    fn test_selection_tier_serde_names() {
        let tiers: Vec<SelectionTier> =
            serde_json::from_str(r#"["location_source", "global_cache", "anchor"]"#).unwrap();
        assert_eq!(
            tiers,
            vec![
                SelectionTier::LocationSource,
                SelectionTier::GlobalCache,
                SelectionTier::Anchor
            ]
        );
        assert_eq!(SelectionTier::GlobalCache.to_string(), "global_cache");
    }
}
