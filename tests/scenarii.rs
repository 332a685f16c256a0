//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::time::Duration;

use serde_json::{json, Value};

use shiftbook::cache::Cache;
use shiftbook::config::ReadinessPolicy;
use shiftbook::record::{fields_from, Fields};
use shiftbook::remote::MemoryRemote;
use shiftbook::{Backend, DataManager, Notification, Record};

/// Short enough to keep the tests fast
pub fn fast_readiness() -> ReadinessPolicy {
    ReadinessPolicy::new(Duration::from_millis(5), 3)
}

/// A started manager, with `remote` as its source of truth
pub async fn online_manager(remote: MemoryRemote, cache: Cache) -> DataManager<MemoryRemote> {
    let manager = DataManager::new(remote, cache, fast_readiness());
    assert_eq!(manager.start().await, Backend::Remote);
    manager
}

/// A started manager, whose remote store never became ready
pub async fn offline_manager(cache: Cache) -> DataManager<MemoryRemote> {
    let manager = DataManager::new(MemoryRemote::unavailable(), cache, fast_readiness());
    assert_eq!(manager.start().await, Backend::Local);
    manager
}

/// Every notification received so far
pub fn drain(receiver: &mut tokio::sync::broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut received = Vec::new();
    while let Ok(notification) = receiver.try_recv() {
        received.push(notification);
    }
    received
}

pub fn count_permission_denied(notifications: &[Notification]) -> usize {
    notifications.iter()
        .filter(|n| matches!(n, Notification::PermissionDenied { .. }))
        .count()
}

pub fn record(value: Value) -> Record {
    Record::from_value(value).unwrap()
}

/// A cache that already contains raw entries, valid or not
pub fn seeded_cache(collection: &str, items: Value) -> Cache {
    let mut cache = Cache::in_memory();
    cache.set_entry(collection, items.to_string()).unwrap();
    cache
}

pub fn doctor_fields(name: &str) -> Fields {
    fields_from(json!({
        "name": name,
        "specialty": "Cardiology",
        "email": format!("{}@example.org", name.to_lowercase()),
    }))
}

pub fn shift_fields(doctor_id: &str, start: &str, end: &str) -> Fields {
    fields_from(json!({
        "doctorId": doctor_id,
        "date": "2024-03-01",
        "type": "guardia",
        "startTime": start,
        "endTime": end,
        "notes": "",
    }))
}
