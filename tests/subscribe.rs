mod scenarii;

use std::time::Duration;

use tokio::sync::mpsc;

use shiftbook::cache::Cache;
use shiftbook::config::{DOCTORS, SHIFTS};
use shiftbook::mock_behaviour::MockBehaviour;
use shiftbook::record::RecordId;
use shiftbook::remote::MemoryRemote;
use shiftbook::traits::{Change, ChangeBatch, ChangeKind};
use shiftbook::Notification;

use scenarii::*;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// A callback that forwards the batches it is given, and the channel it forwards them to
fn collector() -> (impl Fn(ChangeBatch) + Send + Sync + 'static, mpsc::UnboundedReceiver<ChangeBatch>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let callback = move |batch: ChangeBatch| {
        let _ = sender.send(batch);
    };
    (callback, receiver)
}

async fn next_batch(receiver: &mut mpsc::UnboundedReceiver<ChangeBatch>) -> ChangeBatch {
    tokio::time::timeout(DELIVERY_TIMEOUT, receiver.recv()).await
        .expect("no batch was delivered in time")
        .expect("the subscription has been closed")
}

fn removal(id: &str) -> Change {
    Change { kind: ChangeKind::Removed, id: RecordId::parse(id).unwrap(), record: None }
}


#[tokio::test]
async fn test_remote_changes_are_forwarded() {
    let _ = env_logger::builder().is_test(true).try_init();

    let remote = MemoryRemote::new();
    let manager = online_manager(remote.clone(), Cache::in_memory()).await;
    let mut notifications = manager.notifications();

    let (callback, mut batches) = collector();
    let subscription = manager.subscribe(DOCTORS, callback).await;
    assert!(subscription.is_active());
    assert_eq!(subscription.collection(), DOCTORS);

    let id = manager.save(DOCTORS, doctor_fields("Ana"), None).await.unwrap();
    let batch = next_batch(&mut batches).await;
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].kind, ChangeKind::Added);
    assert_eq!(batch[0].id, id);
    assert_eq!(batch[0].record.as_ref().unwrap().get_str("name"), Some("Ana"));

    manager.delete(DOCTORS, id.as_str()).await;
    let batch = next_batch(&mut batches).await;
    assert_eq!(batch[0].kind, ChangeKind::Removed);

    assert!(drain(&mut notifications).contains(&Notification::CollectionChanged { collection: DOCTORS.to_string() }));
    subscription.unsubscribe();
}

#[tokio::test]
async fn test_empty_batches_are_never_delivered() {
    let _ = env_logger::builder().is_test(true).try_init();

    let remote = MemoryRemote::new();
    let manager = online_manager(remote.clone(), Cache::in_memory()).await;
    let (callback, mut batches) = collector();
    let _subscription = manager.subscribe(SHIFTS, callback).await;

    remote.emit(SHIFTS, Vec::new());
    remote.emit(SHIFTS, vec![removal("s1")]);
    remote.emit(SHIFTS, Vec::new());
    remote.emit(SHIFTS, vec![removal("s2"), removal("s3")]);

    let first = next_batch(&mut batches).await;
    assert_eq!(first, vec![removal("s1")]);
    let second = next_batch(&mut batches).await;
    assert_eq!(second.len(), 2);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(batches.try_recv().is_err());
}

#[tokio::test]
async fn test_one_subscription_per_collection() {
    let _ = env_logger::builder().is_test(true).try_init();

    let remote = MemoryRemote::new();
    let manager = online_manager(remote.clone(), Cache::in_memory()).await;

    let (first_callback, mut first_batches) = collector();
    let first = manager.subscribe(DOCTORS, first_callback).await;
    let (second_callback, mut second_batches) = collector();
    let second = manager.subscribe(DOCTORS, second_callback).await;

    assert_eq!(remote.listener_count(DOCTORS), 1);
    assert_eq!(manager.subscription_count(), 1);
    assert!(first.is_active() == false);
    assert!(second.is_active());

    remote.emit(DOCTORS, vec![removal("d1")]);
    assert_eq!(next_batch(&mut second_batches).await, vec![removal("d1")]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(first_batches.try_recv().is_err());

    // The superseded handle cannot close its replacement
    first.unsubscribe();
    assert_eq!(manager.subscription_count(), 1);
    assert_eq!(remote.listener_count(DOCTORS), 1);

    second.unsubscribe();
    assert_eq!(manager.subscription_count(), 0);
    assert_eq!(remote.listener_count(DOCTORS), 0);
}

#[tokio::test]
async fn test_unsubscribe_all() {
    let _ = env_logger::builder().is_test(true).try_init();

    let remote = MemoryRemote::new();
    let manager = online_manager(remote.clone(), Cache::in_memory()).await;
    let (doctors_callback, _doctors) = collector();
    let (shifts_callback, _shifts) = collector();
    let doctors = manager.subscribe(DOCTORS, doctors_callback).await;
    let shifts = manager.subscribe(SHIFTS, shifts_callback).await;

    assert_eq!(manager.unsubscribe_all(), 2);
    assert!(doctors.is_active() == false);
    assert!(shifts.is_active() == false);
    assert_eq!(remote.listener_count(DOCTORS), 0);
    assert_eq!(remote.listener_count(SHIFTS), 0);
    assert_eq!(manager.unsubscribe_all(), 0);
}

#[tokio::test]
async fn test_local_subscriptions_are_inert() {
    let _ = env_logger::builder().is_test(true).try_init();

    let manager = offline_manager(Cache::in_memory()).await;
    let (callback, mut batches) = collector();
    let subscription = manager.subscribe(DOCTORS, callback).await;
    assert!(subscription.is_active() == false);
    assert_eq!(manager.subscription_count(), 0);

    manager.save(DOCTORS, doctor_fields("Ana"), None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(batches.try_recv().is_err());
    subscription.unsubscribe();
}

#[tokio::test]
async fn test_failed_subscriptions_are_inert() {
    let _ = env_logger::builder().is_test(true).try_init();

    let remote = MemoryRemote::new();
    let manager = online_manager(remote.clone(), Cache::in_memory()).await;
    remote.set_behaviour(MockBehaviour { subscribe_behaviour: (0, 1), ..MockBehaviour::default() });

    let (callback, _batches) = collector();
    let subscription = manager.subscribe(DOCTORS, callback).await;
    assert!(subscription.is_active() == false);
    assert_eq!(remote.listener_count(DOCTORS), 0);

    // The next attempt works
    let (callback, _batches) = collector();
    assert!(manager.subscribe(DOCTORS, callback).await.is_active());
    assert_eq!(remote.listener_count(DOCTORS), 1);
}
