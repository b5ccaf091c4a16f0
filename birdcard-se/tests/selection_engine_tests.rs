//! Selection engine integration tests: play state machine, fallback tiers,
//! idempotence and day rollover

mod helpers;

use birdcard_common::{DayKey, LocationBucket, SelectionTier};
use birdcard_se::services::{anchor_index, PlayStatus, Resolution, SelectionKey};
use birdcard_se::EngineError;
use chrono::{TimeZone, Utc};
use helpers::*;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn day(s: &str) -> DayKey {
    s.parse().unwrap()
}

#[tokio::test]
async fn test_austin_first_play_selects_and_second_is_already_updated() {
    let h = Harness::new();
    h.occurrences
        .nearby
        .lock()
        .unwrap()
        .insert("Northern_Cardinal".to_string());
    let mut rx = h.events.subscribe();

    let first = h.play(AUSTIN_IP).await.unwrap();
    assert_eq!(first.status, PlayStatus::Success);
    assert_eq!(first.record.item.id, "Northern_Cardinal");
    assert_eq!(first.record.tier, SelectionTier::LocationSource);
    assert_eq!(first.day_key.to_string(), "2024-05-01");
    assert_eq!(first.bucket.as_str(), AUSTIN_BUCKET);
    assert!(first.spotted_nearby);
    assert_eq!(h.publisher.content_count(), 1);
    assert_eq!(event_types(&drain(&mut rx)), vec!["ItemSelected"]);

    let second = h.play(AUSTIN_IP).await.unwrap();
    assert_eq!(second.status, PlayStatus::AlreadyUpdated);
    assert_eq!(second.record.item.id, "Northern_Cardinal");
    assert_eq!(h.source.location_calls(), 1, "second play must not query the source");
    assert_eq!(h.publisher.content_count(), 1);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_nearby_observers_share_the_bucket_record() {
    let h = Harness::new();
    h.play(AUSTIN_IP).await.unwrap();

    let neighbor = h.play(AUSTIN_NEIGHBOR_IP).await.unwrap();
    assert_eq!(neighbor.status, PlayStatus::AlreadyUpdated);
    assert_eq!(neighbor.bucket.as_str(), AUSTIN_BUCKET);
    assert_eq!(h.source.location_calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_plays_publish_exactly_once() {
    let h = Harness::new();
    h.publisher.set_delay(Duration::from_millis(50));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let engine = h.engine.clone();
        handles.push(tokio::spawn(async move {
            engine.handle_play(&play_request(AUSTIN_IP)).await.unwrap()
        }));
    }

    let mut successes = 0;
    for handle in handles {
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.record.item.id, "Northern_Cardinal");
        if outcome.status == PlayStatus::Success {
            successes += 1;
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(h.publisher.content_count(), 1);
    assert_eq!(h.source.location_calls(), 1);
}

#[tokio::test]
async fn test_dropped_play_still_records_its_publish() {
    let h = Harness::new();
    h.publisher.set_delay(Duration::from_millis(100));

    // Caller goes away while the publish is in flight
    let dropped = tokio::time::timeout(Duration::from_millis(20), h.play(AUSTIN_IP)).await;
    assert!(dropped.is_err());
    assert_eq!(h.publisher.attempts.load(Ordering::SeqCst), 1);

    let next = h.play(AUSTIN_IP).await.unwrap();
    assert_eq!(next.status, PlayStatus::AlreadyUpdated);
    assert_eq!(next.record.item.id, "Northern_Cardinal");
    assert_eq!(h.publisher.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(h.publisher.content_count(), 1);
    assert_eq!(h.source.location_calls(), 1);
}

#[tokio::test]
async fn test_publish_failure_does_not_poison_the_key() {
    let h = Harness::new();
    let mut rx = h.events.subscribe();
    h.publisher.fail.store(true, Ordering::SeqCst);

    let err = h.play(AUSTIN_IP).await.unwrap_err();
    assert!(matches!(err, EngineError::PublishFailed { .. }));
    assert!(!err.is_soft());
    assert_eq!(err.tier(), Some(SelectionTier::LocationSource));

    let key = SelectionKey::new(
        "CARD1",
        day("2024-05-01"),
        LocationBucket::from_key(AUSTIN_BUCKET),
    );
    assert!(h.engine.cache().peek(&key).is_none());
    assert_eq!(event_types(&drain(&mut rx)), vec!["PublishFailed"]);

    h.publisher.fail.store(false, Ordering::SeqCst);
    let retry = h.play(AUSTIN_IP).await.unwrap();
    assert_eq!(retry.status, PlayStatus::Success);
    assert_eq!(retry.record.item.id, "Northern_Cardinal");
    assert_eq!(h.publisher.content_count(), 1);
}

#[tokio::test]
async fn test_day_rollover_selects_independently() {
    let h = Harness::new();
    let first = h.play(AUSTIN_IP).await.unwrap();
    assert_eq!(first.record.item.id, "Northern_Cardinal");

    h.source
        .set_location_item(30.27, -97.74, birdcard_common::Item::from_id("Blue_Jay"));
    let same_day = h.play(AUSTIN_IP).await.unwrap();
    assert_eq!(same_day.record.item.id, "Northern_Cardinal");

    h.advance_minutes(24 * 60);
    let next_day = h.play(AUSTIN_IP).await.unwrap();
    assert_eq!(next_day.status, PlayStatus::Success);
    assert_eq!(next_day.day_key.to_string(), "2024-05-02");
    assert_eq!(next_day.record.item.id, "Blue_Jay");
    assert_eq!(h.publisher.content_count(), 2);

    let yesterday = SelectionKey::new(
        "CARD1",
        day("2024-05-01"),
        LocationBucket::from_key(AUSTIN_BUCKET),
    );
    assert_eq!(
        h.engine.cache().peek(&yesterday).unwrap().item.id,
        "Northern_Cardinal"
    );
}

#[tokio::test]
async fn test_day_key_follows_observer_timezone() {
    let h = Harness::new();
    h.clock.set(Utc.with_ymd_and_hms(2024, 5, 2, 3, 0, 0).unwrap());

    let austin = h.play(AUSTIN_IP).await.unwrap();
    let london = h.play(LONDON_IP).await.unwrap();
    assert_eq!(austin.day_key.to_string(), "2024-05-01");
    assert_eq!(london.day_key.to_string(), "2024-05-02");
    assert_eq!(london.record.item.id, "European_Robin");
}

#[tokio::test]
async fn test_anchor_fallback_is_deterministic_and_becomes_global() {
    let h = Harness::new();
    let expected = anchor_index(day("2024-05-01"), 7).unwrap();

    // Houston has no source answer and there is no global record yet
    let houston = h.play(HOUSTON_IP).await.unwrap();
    assert_eq!(houston.record.tier, SelectionTier::Anchor);
    assert_eq!(houston.record.item, anchor_item(expected));
    assert_eq!(houston.bucket.as_str(), HOUSTON_BUCKET);
    assert_eq!(*h.source.anchor_calls.lock().unwrap(), vec![expected]);

    let global = SelectionKey::new("CARD1", day("2024-05-01"), LocationBucket::global());
    assert_eq!(
        h.engine.cache().peek(&global).unwrap().item,
        anchor_item(expected)
    );

    // With the source down, a new bucket reuses the global record
    h.source.fail.store(true, Ordering::SeqCst);
    let austin = h.play(AUSTIN_IP).await.unwrap();
    assert_eq!(austin.status, PlayStatus::Success);
    assert_eq!(austin.record.tier, SelectionTier::GlobalCache);
    assert_eq!(austin.record.item, anchor_item(expected));
    assert_eq!(h.source.anchor_calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unresolved_observer_uses_global_bucket() {
    let h = Harness::new();

    let outcome = h.play(PRIVATE_IP).await.unwrap();
    assert_eq!(outcome.status, PlayStatus::Success);
    assert!(outcome.bucket.is_global());
    assert_eq!(outcome.day_key.to_string(), "2024-05-01");
    assert_eq!(outcome.record.tier, SelectionTier::Anchor);
    assert_eq!(outcome.resolution, Resolution::unresolved());
    assert!(!outcome.spotted_nearby);

    assert_eq!(h.ip_geo.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.source.location_calls(), 0);
    assert_eq!(h.occurrences.calls.load(Ordering::SeqCst), 0);

    let again = h.play(PRIVATE_IP).await.unwrap();
    assert_eq!(again.status, PlayStatus::AlreadyUpdated);
    assert_eq!(again.record.item, outcome.record.item);
}

#[tokio::test]
async fn test_read_only_unresolved_policy() {
    let h = Harness::with_config(|c| c.selection.bypass_cache_for_unresolved = true);

    let err = h.play(PRIVATE_IP).await.unwrap_err();
    assert!(matches!(err, EngineError::NothingPublished { .. }));
    assert!(h.source.anchor_calls.lock().unwrap().is_empty());
    assert_eq!(h.publisher.content_count(), 0);

    let refreshed = h.engine.refresh_global("CARD1").await.unwrap();
    assert_eq!(refreshed.status, PlayStatus::Success);

    let outcome = h.play(PRIVATE_IP).await.unwrap();
    assert_eq!(outcome.status, PlayStatus::AlreadyUpdated);
    assert_eq!(outcome.record.item, refreshed.record.item);
}

#[tokio::test]
async fn test_every_tier_failing_is_selection_exhausted() {
    let h = Harness::new();
    h.source.fail.store(true, Ordering::SeqCst);

    let err = h.play(AUSTIN_IP).await.unwrap_err();
    assert!(matches!(err, EngineError::SelectionExhausted { .. }));
    assert_eq!(h.publisher.content_count(), 0);
    assert!(h.engine.cache().is_empty());
}

#[tokio::test]
async fn test_custom_fallback_order_skips_anchor() {
    let h = Harness::with_config(|c| {
        c.selection.fallback_order = vec![SelectionTier::LocationSource, SelectionTier::GlobalCache]
    });

    let err = h.play(HOUSTON_IP).await.unwrap_err();
    assert!(matches!(err, EngineError::SelectionExhausted { .. }));
    assert!(h.source.anchor_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_record_sweep_evicts_superseded_days() {
    let h = Harness::new();
    let mut rx = h.events.subscribe();
    h.play(AUSTIN_IP).await.unwrap();

    h.advance_minutes(3 * 24 * 60);
    h.play(AUSTIN_IP).await.unwrap();
    drain(&mut rx);

    assert_eq!(h.engine.sweep_records(), 1);
    let days: Vec<String> = h
        .engine
        .cache()
        .snapshot()
        .iter()
        .map(|r| r.day_key.to_string())
        .collect();
    assert_eq!(days, vec!["2024-05-04"]);
    assert_eq!(event_types(&drain(&mut rx)), vec!["RecordsEvicted"]);

    assert_eq!(h.engine.sweep_records(), 0);
}

#[tokio::test]
async fn test_record_sweep_keeps_days_still_live_west_of_utc() {
    let h = Harness::with_config(|c| c.selection.retain_days = 0);
    // 21:00 on May 1 in Austin
    h.clock.set(Utc.with_ymd_and_hms(2024, 5, 2, 2, 0, 0).unwrap());

    let first = h.play(AUSTIN_IP).await.unwrap();
    assert_eq!(first.day_key.to_string(), "2024-05-01");

    assert_eq!(h.engine.sweep_records(), 0);
    let second = h.play(AUSTIN_IP).await.unwrap();
    assert_eq!(second.status, PlayStatus::AlreadyUpdated);
    assert_eq!(h.publisher.content_count(), 1);
}
