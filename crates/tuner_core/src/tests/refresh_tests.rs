use std::sync::atomic::Ordering;

use super::*;
use crate::test_support::FakeAuthority;

fn pipeline(
    fake: &Arc<FakeAuthority>,
    artifact_dir: Option<PathBuf>,
) -> (VisualRefreshPipeline, broadcast::Receiver<TunerEvent>) {
    let (events, events_rx) = broadcast::channel(16);
    (
        VisualRefreshPipeline::new(fake.clone(), artifact_dir, events),
        events_rx,
    )
}

#[tokio::test]
async fn refresh_fetches_every_artifact_with_one_token() {
    let (fake, _entered) = FakeAuthority::new();
    let (pipeline, mut events) = pipeline(&fake, None);

    let report = pipeline.refresh_now().await;

    assert_eq!(report.refreshed, ArtifactKind::ALL.to_vec());
    assert!(report.failed.is_empty());
    let fetches = fake.artifact_fetches.lock().await.clone();
    assert_eq!(
        fetches,
        vec![
            (ArtifactKind::Original, report.token),
            (ArtifactKind::Modified, report.token)
        ]
    );
    let frame = pipeline.frame(ArtifactKind::Modified).expect("frame");
    assert_eq!(frame.token, report.token);
    assert_eq!(&*frame.bytes, format!("modified:{}", report.token).as_bytes());
    assert_eq!(pipeline.attempts(), 1);
    assert!(matches!(
        events.recv().await.expect("event"),
        TunerEvent::ArtifactRefreshed { .. }
    ));
}

#[tokio::test]
async fn each_refresh_uses_a_new_token() {
    let (fake, _entered) = FakeAuthority::new();
    let (pipeline, _events) = pipeline(&fake, None);

    let first = pipeline.refresh_now().await;
    let second = pipeline.refresh_now().await;

    assert!(second.token > first.token);
    assert_eq!(fake.artifact_fetches.lock().await.len(), 4);
}

#[tokio::test]
async fn older_response_never_replaces_a_newer_frame() {
    let (fake, _entered) = FakeAuthority::new();
    let (pipeline, _events) = pipeline(&fake, None);

    assert!(pipeline
        .store(ArtifactKind::Original, 20, b"new".to_vec())
        .is_some());
    assert!(pipeline
        .store(ArtifactKind::Original, 10, b"old".to_vec())
        .is_none());

    let frame = pipeline.frame(ArtifactKind::Original).expect("frame");
    assert_eq!(frame.token, 20);
    assert_eq!(&*frame.bytes, b"new");
}

#[tokio::test]
async fn failed_refresh_keeps_previous_frames() {
    let (fake, _entered) = FakeAuthority::new();
    let (pipeline, _events) = pipeline(&fake, None);

    let first = pipeline.refresh_now().await;
    fake.fail_artifacts.store(true, Ordering::SeqCst);
    let second = pipeline.refresh_now().await;

    assert!(second.refreshed.is_empty());
    assert_eq!(second.failed, ArtifactKind::ALL.to_vec());
    assert_eq!(
        pipeline.frame(ArtifactKind::Original).expect("frame").token,
        first.token
    );
    assert_eq!(pipeline.attempts(), 2);
}

#[tokio::test]
async fn accepted_frames_are_written_to_the_artifact_dir() {
    let (fake, _entered) = FakeAuthority::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("frames");
    let (pipeline, _events) = pipeline(&fake, Some(target.clone()));

    let report = pipeline.refresh_now().await;

    let original = std::fs::read(target.join("original.png")).expect("original written");
    let modified = std::fs::read(target.join("modified.png")).expect("modified written");
    assert_eq!(original, format!("original:{}", report.token).into_bytes());
    assert_eq!(modified, format!("modified:{}", report.token).into_bytes());
}

#[tokio::test]
async fn trigger_runs_a_full_refresh() {
    let (fake, _entered) = FakeAuthority::new();
    let (pipeline, _events) = pipeline(&fake, None);

    RefreshTrigger::refresh(&pipeline).await;

    assert_eq!(pipeline.attempts(), 1);
    assert!(pipeline.frame(ArtifactKind::Original).is_some());
}
