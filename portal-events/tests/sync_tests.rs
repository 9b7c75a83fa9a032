//! Recurrence sync against memory and SQLite stores

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use portal_common::db::init_memory_database;
use portal_common::{EventBus, FixedClock, HookList, PortalEvent};
use portal_events::{
    DayType, MemoryOccurrenceStore, OccurrenceStore, RecurrenceEngine, RecurrenceTemplate, SqliteOccurrenceStore,
};
use std::sync::Arc;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn gbm() -> RecurrenceTemplate {
    RecurrenceTemplate::new(
        "Weekly GBM",
        [DayType::Tuesday, DayType::Thursday],
        date(2024, 9, 1),
        date(2024, 12, 1),
    )
    .unwrap()
    .with_times(time(18, 0), time(19, 30))
    .with_location("Union 101")
    .with_hosts("chess", vec!["go".to_string()])
}

struct Harness {
    engine: RecurrenceEngine,
    store: Arc<MemoryOccurrenceStore>,
    clock: Arc<FixedClock>,
}

fn harness(now: DateTime<Utc>) -> Harness {
    let store = Arc::new(MemoryOccurrenceStore::new());
    let clock = Arc::new(FixedClock::new(now));
    let engine = RecurrenceEngine::new(store.clone(), clock.clone(), HookList::new());
    Harness { engine, store, clock }
}

#[tokio::test]
async fn test_sync_materializes_expected_count() {
    let h = harness(at(2024, 8, 1, 0));
    let template = gbm();

    assert_eq!(h.engine.expected_occurrence_count(&template), 26);

    let outcome = h.engine.sync(&template).await.unwrap();

    assert_eq!(outcome.created, 26);
    assert_eq!(outcome.occurrences.len(), 26);
    let first = &outcome.occurrences[0];
    assert_eq!(first.start_at, at(2024, 9, 3, 18));
    assert_eq!(first.name, "Weekly GBM");
    assert_eq!(first.location.as_deref(), Some("Union 101"));
    assert_eq!(first.primary_host.as_deref(), Some("chess"));
    assert_eq!(first.secondary_hosts, vec!["go".to_string()]);
    assert_eq!(first.template_id, Some(template.id));
    assert!(outcome
        .occurrences
        .iter()
        .all(|o| matches!(DayType::of(o.start_at.date_naive()), DayType::Tuesday | DayType::Thursday)));
}

#[tokio::test]
async fn test_overnight_occurrence_ends_next_day() {
    let h = harness(at(2025, 7, 1, 0));
    let template = RecurrenceTemplate::new("Late Night Coding", [DayType::Monday], date(2025, 7, 20), date(2025, 7, 27))
        .unwrap()
        .with_times(time(23, 0), time(1, 0));

    let outcome = h.engine.sync(&template).await.unwrap();

    assert_eq!(outcome.occurrences.len(), 1);
    let occ = &outcome.occurrences[0];
    assert_eq!(occ.start_at, Utc.with_ymd_and_hms(2025, 7, 21, 23, 0, 0).unwrap());
    assert_eq!(occ.end_at, Utc.with_ymd_and_hms(2025, 7, 22, 1, 0, 0).unwrap());
}

#[tokio::test]
async fn test_resync_is_idempotent() {
    let h = harness(at(2024, 8, 1, 0));
    let template = gbm();

    let first = h.engine.sync(&template).await.unwrap();
    h.clock.set(at(2024, 8, 2, 0));
    let second = h.engine.sync(&template).await.unwrap();

    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.deleted, 0);
    assert_eq!(first.occurrences, second.occurrences);
}

#[tokio::test]
async fn test_shrinking_range_deletes_outside_occurrences() {
    let h = harness(at(2024, 8, 1, 0));
    let mut template = gbm();
    h.engine.sync(&template).await.unwrap();

    template.end_date = date(2024, 9, 30);
    template.weekdays.remove(&DayType::Thursday);
    let outcome = h.engine.sync(&template).await.unwrap();

    // Tuesdays in September 2024: 3, 10, 17, 24
    assert_eq!(outcome.deleted, 22);
    assert_eq!(outcome.occurrences.len(), 4);
    assert_eq!(h.store.len().await, 4);
}

#[tokio::test]
async fn test_changed_time_window_replaces_occurrences() {
    let h = harness(at(2024, 8, 1, 0));
    let mut template = gbm();
    h.engine.sync(&template).await.unwrap();

    template.start_time = time(19, 0);
    template.end_time = time(20, 0);
    let outcome = h.engine.sync(&template).await.unwrap();

    assert_eq!(outcome.deleted, 26);
    assert_eq!(outcome.created, 26);
    assert_eq!(h.store.len().await, 26);
    assert!(outcome.occurrences.iter().all(|o| o.start_at.time() == time(19, 0)));
}

#[tokio::test]
async fn test_protected_past_occurrences_are_untouched() {
    // Mid-semester: the September occurrences have already happened
    let now = at(2024, 10, 1, 0);
    let h = harness(at(2024, 8, 1, 0));
    let mut template = gbm().protect_past(true);
    let before = h.engine.sync(&template).await.unwrap().occurrences;

    h.clock.set(now);
    template.location = Some("Library".to_string());
    template.weekdays.remove(&DayType::Thursday);
    let outcome = h.engine.sync(&template).await.unwrap();

    let past_before: Vec<_> = before.iter().filter(|o| o.start_at < now).collect();
    let past_after: Vec<_> = outcome.occurrences.iter().filter(|o| o.start_at < now).collect();
    assert_eq!(past_before, past_after);
    assert!(past_after.iter().any(|o| DayType::of(o.start_at.date_naive()) == DayType::Thursday));

    let future: Vec<_> = outcome.occurrences.iter().filter(|o| o.start_at >= now).collect();
    assert!(future.iter().all(|o| o.location.as_deref() == Some("Library")));
    assert!(future.iter().all(|o| DayType::of(o.start_at.date_naive()) == DayType::Tuesday));
}

#[tokio::test]
async fn test_unprotected_past_occurrences_follow_template() {
    let h = harness(at(2024, 8, 1, 0));
    let mut template = gbm();
    h.engine.sync(&template).await.unwrap();

    h.clock.set(at(2024, 10, 1, 0));
    template.location = Some("Library".to_string());
    let outcome = h.engine.sync(&template).await.unwrap();

    assert_eq!(outcome.updated, 26);
    assert_eq!(outcome.protected, 0);
    assert!(outcome.occurrences.iter().all(|o| o.location.as_deref() == Some("Library")));
}

#[tokio::test]
async fn test_detached_slot_gets_disambiguated_name() {
    let h = harness(at(2024, 8, 1, 0));
    let template = gbm();
    let first = h.engine.sync(&template).await.unwrap();
    let target = first.occurrences[0].clone();

    let detached = h.engine.detach(target.id).await.unwrap();
    assert!(detached.template_id.is_none());

    let outcome = h.engine.sync(&template).await.unwrap();
    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.occurrences.len(), 26);

    let replacement = outcome
        .occurrences
        .iter()
        .find(|o| o.start_at == target.start_at)
        .unwrap();
    assert_eq!(replacement.name, "Weekly GBM 1");
    assert_ne!(replacement.id, target.id);

    // the detached original is left exactly as it was
    let original = h.store.get(target.id).await.unwrap().unwrap();
    assert_eq!(original.name, "Weekly GBM");
    assert_eq!(h.store.len().await, 27);

    // and the disambiguated name is stable
    let again = h.engine.sync(&template).await.unwrap();
    assert_eq!(again.updated, 0);
    assert_eq!(again.created, 0);
}

#[tokio::test]
async fn test_hooks_receive_sync_events() {
    let bus = Arc::new(EventBus::new(128));
    let mut events = bus.subscribe();
    let store = Arc::new(MemoryOccurrenceStore::new());
    let engine = RecurrenceEngine::new(
        store,
        Arc::new(FixedClock::new(at(2024, 8, 1, 0))),
        HookList::new().with(bus.clone()),
    );

    let mut template = RecurrenceTemplate::new("GBM", [DayType::Monday], date(2024, 9, 1), date(2024, 9, 15)).unwrap();
    engine.sync(&template).await.unwrap();
    template.end_date = date(2024, 9, 8);
    template.location = Some("Union".to_string());
    engine.sync(&template).await.unwrap();

    let mut created = 0;
    let mut updated = 0;
    let mut deleted = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            PortalEvent::OccurrenceCreated { template_id, .. } => {
                assert_eq!(template_id, template.id);
                created += 1;
            }
            PortalEvent::OccurrenceUpdated { .. } => updated += 1,
            PortalEvent::OccurrenceDeleted { .. } => deleted += 1,
            _ => {}
        }
    }
    // Mondays 2 and 9 created, then the 2nd relocated and the 9th dropped
    assert_eq!((created, updated, deleted), (2, 1, 1));
}

#[tokio::test]
async fn test_sync_with_sqlite_store() {
    let store = Arc::new(SqliteOccurrenceStore::new(init_memory_database().await.unwrap()));
    let clock = Arc::new(FixedClock::new(at(2024, 8, 1, 0)));
    let engine = RecurrenceEngine::new(store.clone(), clock, HookList::new());
    let template = gbm();

    let first = engine.sync(&template).await.unwrap();
    assert_eq!(first.occurrences.len(), 26);

    let target = first.occurrences[3].id;
    engine.detach(target).await.unwrap();

    let second = engine.sync(&template).await.unwrap();
    assert_eq!(second.created, 1);
    assert_eq!(second.occurrences.len(), 26);
    assert!(second.occurrences.iter().any(|o| o.name == "Weekly GBM 1"));
    assert!(store.get(target).await.unwrap().unwrap().template_id.is_none());
}
