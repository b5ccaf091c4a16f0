//! Track fetch read path
//!
//! Serves the tracks of a playback sequence. A live session answers without
//! any outbound call. Otherwise the session is (re)bound to the item already
//! published for the observer's day and bucket. This path never selects.

use birdcard_common::events::EngineEvent;
use birdcard_common::{Item, TrackKind};
use std::net::IpAddr;
use tracing::{debug, info, warn};

use super::engine::{KeyedObserver, SelectionEngine};
use super::session_store::{new_session_id, Session, SessionBinding, SessionLookup};
use super::target_ledger::LedgerSync;
use crate::error::EngineError;
use crate::types::{PublishMetadata, PublishScope};

#[derive(Debug, Clone)]
pub struct TrackRequest {
    /// Absent on the first fetch of a sequence
    pub session_id: Option<String>,
    pub kind: TrackKind,
    pub target_id: String,
    pub device_id: Option<String>,
    pub address: Option<IpAddr>,
}

#[derive(Debug, Clone)]
pub struct TrackResponse {
    pub session_id: String,
    pub item: Item,
    pub asset_url: String,
    /// Session had expired and was bound again
    pub rebound: bool,
}

impl SelectionEngine {
    pub async fn fetch_track(&self, request: &TrackRequest) -> Result<TrackResponse, EngineError> {
        let session_id = request
            .session_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(new_session_id);

        let rebound = match self.sessions.resolve(&session_id) {
            SessionLookup::Found(session) => {
                debug!(session_id = %session_id, item_id = %session.item.id, "Session hit");
                return Ok(self.track_response(session_id, session.item, request.kind, false));
            }
            SessionLookup::Expired(session) => {
                let soft = EngineError::SessionExpired(session_id.clone());
                info!(
                    item_id = %session.item.id,
                    code = soft.code(),
                    "{soft}, rebinding"
                );
                self.events.emit_lossy(EngineEvent::SessionExpired {
                    session_id: session.session_id,
                    item_id: session.item.id,
                    timestamp: self.clock.now(),
                });
                true
            }
            SessionLookup::Absent => false,
        };

        let session = self.bind_session(&session_id, request).await?;
        Ok(self.track_response(session_id, session.item, request.kind, rebound))
    }

    /// Bind `session_id` to today's published item for the observer
    async fn bind_session(
        &self,
        session_id: &str,
        request: &TrackRequest,
    ) -> Result<Session, EngineError> {
        let resolution = self
            .resolver
            .resolve(request.address, request.device_id.as_deref())
            .await;
        let KeyedObserver { key, .. } = self.key_for(&request.target_id, &resolution);

        let record = self
            .cache
            .peek(&key)
            .or_else(|| self.cache.peek(&key.global()))
            .ok_or_else(|| EngineError::NothingPublished {
                target_id: key.target_id.clone(),
                day_key: key.day_key,
                bucket: key.bucket.clone(),
            })?;

        let (session, newly_bound) = self.sessions.bind(
            session_id,
            SessionBinding {
                item: record.item.clone(),
                target_id: key.target_id.clone(),
                day_key: key.day_key,
                bucket: record.bucket.clone(),
                bound_location: resolution.location.location().cloned(),
            },
        );
        if !newly_bound {
            return Ok(session);
        }

        debug!(
            session_id,
            item_id = %session.item.id,
            bucket = %session.bucket,
            "Session bound"
        );
        self.events.emit_lossy(EngineEvent::SessionBound {
            session_id: session.session_id.clone(),
            item_id: session.item.id.clone(),
            day_key: session.day_key,
            bucket: session.bucket.clone(),
            timestamp: session.created_at,
        });

        self.sync_display(&record.target_id, &record.item, &PublishMetadata {
            scope: PublishScope::DisplayOnly,
            day_key: record.day_key,
            bucket: record.bucket.clone(),
            tier: record.tier,
            location_label: None,
        })
        .await;

        Ok(session)
    }

    /// Republish display metadata if the target shows a different item
    async fn sync_display(&self, target_id: &str, item: &Item, metadata: &PublishMetadata) {
        let result = self
            .ledger
            .sync(target_id, item, || self.publisher.publish(target_id, item, metadata))
            .await;

        match result {
            Ok(LedgerSync::Unchanged) => {}
            Ok(LedgerSync::Republished { previous }) => {
                info!(
                    target_id,
                    item_id = %item.id,
                    previous = ?previous.as_ref().map(|p| p.id.as_str()),
                    "Display metadata republished"
                );
                self.events.emit_lossy(EngineEvent::DisplayRepublished {
                    target_id: target_id.to_string(),
                    previous_item_id: previous.map(|p| p.id),
                    item_id: item.id.clone(),
                    timestamp: self.clock.now(),
                });
            }
            Err(e) => warn!(
                target_id,
                item_id = %item.id,
                error = %e,
                "Display republish failed, continuing with bound item"
            ),
        }
    }

    fn track_response(
        &self,
        session_id: String,
        item: Item,
        kind: TrackKind,
        rebound: bool,
    ) -> TrackResponse {
        TrackResponse {
            asset_url: format!("{}/{}/{}.mp3", self.asset_base_url, item.id, kind),
            session_id,
            item,
            rebound,
        }
    }
}
