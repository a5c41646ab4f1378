use std::sync::Mutex;

use super::*;
use crate::{constraint::ConstraintEngine, test_support::FakeAuthority};
use shared::{domain::hsv_pairs, protocol::SnapshotValue};

fn synchronizer(
    fake: &Arc<FakeAuthority>,
) -> (
    RemoteStateSynchronizer,
    SharedEngine,
    broadcast::Receiver<TunerEvent>,
) {
    let engine = Arc::new(Mutex::new(
        ConstraintEngine::new(hsv_pairs()).expect("engine"),
    ));
    let (events, events_rx) = broadcast::channel(16);
    (
        RemoteStateSynchronizer::new(fake.clone(), Arc::clone(&engine), events),
        engine,
        events_rx,
    )
}

#[tokio::test]
async fn seed_applies_known_keys_without_writing_back() {
    let (fake, _entered) = FakeAuthority::new();
    let fake = fake
        .with_snapshot(&[("hueMin", 35), ("hueMax", 80), ("satMin", 60), ("gamma", 2)])
        .await;
    let (synchronizer, engine, mut events) = synchronizer(&fake);

    let report = synchronizer.seed().await.expect("seeded");

    assert_eq!(report.applied, 3);
    assert_eq!(report.ignored, vec!["gamma".to_string()]);
    {
        let engine = lock_engine(&engine);
        assert_eq!(engine.value("hueMin"), Some(35));
        assert_eq!(engine.readout("hueMax"), Some("80"));
        assert_eq!(engine.value("valMax"), Some(255));
        assert!(engine.snippet().contains("new Scalar(35, 60, 0, 0)"));
    }
    assert!(fake.written().await.is_empty());
    assert!(matches!(
        events.recv().await.expect("event"),
        TunerEvent::Seeded(SeedReport { applied: 3, .. })
    ));
}

#[tokio::test]
async fn non_numeric_entries_are_ignored() {
    let (fake, _entered) = FakeAuthority::new();
    let (synchronizer, engine, _events) = synchronizer(&fake);

    let snapshot = [
        ("valMin".to_string(), SnapshotValue::Text("12".to_string())),
        ("valMax".to_string(), SnapshotValue::Text("bright".to_string())),
    ]
    .into_iter()
    .collect();
    let report = synchronizer.apply(snapshot);

    assert_eq!(report.applied, 1);
    assert_eq!(report.ignored, vec!["valMax".to_string()]);
    assert_eq!(lock_engine(&engine).value("valMin"), Some(12));
    assert_eq!(lock_engine(&engine).value("valMax"), Some(255));
}

#[tokio::test]
async fn failed_snapshot_keeps_defaults() {
    let (fake, _entered) = FakeAuthority::new();
    let (synchronizer, engine, mut events) = synchronizer(&fake);

    assert_eq!(synchronizer.seed().await, None);

    let engine = lock_engine(&engine);
    assert_eq!(engine.value("hueMin"), Some(0));
    assert_eq!(engine.value("hueMax"), Some(179));
    assert!(matches!(
        events.try_recv().expect("event"),
        TunerEvent::SeedFailed(_)
    ));
}

#[tokio::test]
async fn out_of_range_snapshot_values_are_clamped_to_the_control_range() {
    let (fake, _entered) = FakeAuthority::new();
    let fake = fake
        .with_snapshot(&[("hueMax", 500), ("satMin", -20)])
        .await;
    let (synchronizer, engine, _events) = synchronizer(&fake);

    let report = synchronizer.seed().await.expect("seeded");
    assert_eq!(report.applied, 2);
    assert!(fake.written().await.is_empty());

    let mut engine = lock_engine(&engine);
    assert_eq!(engine.value("hueMax"), Some(179));
    assert_eq!(engine.value("satMin"), Some(0));
    assert!(engine.snippet().contains("new Scalar(179, 255, 255, 0)"));

    let outcome = engine.apply_edit("hueMin", 200).expect("edit");
    assert_eq!(outcome.value, 178);
    assert_eq!(outcome.adjusted, None);
    for pair in engine.pairs() {
        let lower = engine.value(&pair.lower_key).expect("lower");
        let upper = engine.value(&pair.upper_key).expect("upper");
        assert!(
            0 <= lower && lower < upper && upper <= pair.limit,
            "{}={lower} {}={upper}",
            pair.lower_key,
            pair.upper_key
        );
    }
}
