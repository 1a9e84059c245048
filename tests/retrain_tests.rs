//! Retraining orchestrator integration tests: single-flight exclusion,
//! failure recovery, and full-run effects on the store

mod helpers;

use chorus::db;
use chorus::Error;

#[tokio::test]
async fn full_run_trains_scores_and_snapshots() {
    let ctx = helpers::test_context().await;

    // Label a few segments so the run actually fine-tunes
    let segments = db::segments::for_recording(&ctx.pool, 1).await.unwrap();
    db::segments::apply_labels(&ctx.pool, segments[0].id, &["amecro".to_string()])
        .await
        .unwrap();
    db::segments::apply_labels(&ctx.pool, segments[1].id, &[]).await.unwrap();

    let summary = ctx
        .retrainer
        .run_once()
        .await
        .unwrap()
        .expect("run must start on an idle orchestrator");

    assert_eq!(summary.trained_examples, 2);
    assert_eq!(summary.scored_segments, 10); // 6 + 4 across both recordings

    // Every segment was re-scored, labeled ones included
    for recording_id in [1, 2] {
        for segment in db::segments::for_recording(&ctx.pool, recording_id)
            .await
            .unwrap()
        {
            assert_ne!(segment.uncertainty, db::segments::UNSCORED);
        }
    }

    // Snapshot appended, status updated, guard released
    assert_eq!(db::snapshots::count(&ctx.pool).await.unwrap(), 1);
    let status = ctx.retrainer.status();
    assert!(!status.is_running());
    let pair = status.uncertainty().await;
    assert_eq!(pair.current, Some(summary.mean_mutual_information));
    assert_eq!(pair.previous, None);

    // The trained head was persisted
    assert!(ctx.settings.weights_path().exists());
}

#[tokio::test]
async fn empty_labeled_set_still_scores_and_snapshots() {
    let ctx = helpers::test_context().await;

    let summary = ctx.retrainer.run_once().await.unwrap().unwrap();
    assert_eq!(summary.trained_examples, 0);
    assert_eq!(summary.scored_segments, 10);

    assert_eq!(db::snapshots::count(&ctx.pool).await.unwrap(), 1);
    assert!(ctx.retrainer.status().uncertainty().await.current.is_some());
}

#[tokio::test]
async fn consecutive_runs_shift_the_uncertainty_pair() {
    let ctx = helpers::test_context().await;

    let first = ctx.retrainer.run_once().await.unwrap().unwrap();
    let second = ctx.retrainer.run_once().await.unwrap().unwrap();

    let pair = ctx.retrainer.status().uncertainty().await;
    assert_eq!(pair.previous, Some(first.mean_mutual_information));
    assert_eq!(pair.current, Some(second.mean_mutual_information));
}

#[tokio::test]
async fn concurrent_run_is_refused_not_queued() {
    let ctx = helpers::test_context().await;

    let token = ctx.retrainer.status().try_begin().unwrap();
    assert!(!ctx.retrainer.trigger(), "trigger must refuse while running");
    assert_eq!(
        ctx.retrainer.run_once().await.unwrap().map(|_| ()),
        None,
        "run_once must refuse while running"
    );
    drop(token);

    // Released guard admits the next run
    assert!(ctx.retrainer.run_once().await.unwrap().is_some());
}

#[tokio::test]
async fn failed_run_restores_idle_and_writes_nothing() {
    let ctx = helpers::test_context().await;

    // Sabotage the feature store after seeding: assembly now fails fast
    std::fs::remove_dir_all(ctx.settings.features_dir()).unwrap();

    let err = ctx.retrainer.run_once().await.unwrap_err();
    assert!(matches!(err, Error::MissingFeatures { .. }));

    // The invariant: a failed run never leaves the status stuck on Running
    assert!(!ctx.retrainer.status().is_running());
    assert!(ctx.retrainer.status().uncertainty().await.current.is_none());
    assert_eq!(db::snapshots::count(&ctx.pool).await.unwrap(), 0);

    // Segments keep their sentinel scores: no partial write-back happened
    for segment in db::segments::for_recording(&ctx.pool, 1).await.unwrap() {
        assert_eq!(segment.uncertainty, db::segments::UNSCORED);
    }
}

#[tokio::test]
async fn scores_are_rounded_and_tolerably_small_negatives_allowed() {
    let ctx = helpers::test_context().await;
    ctx.retrainer.run_once().await.unwrap().unwrap();

    for segment in db::segments::for_recording(&ctx.pool, 1).await.unwrap() {
        // 4-decimal persistence contract
        let scaled = segment.uncertainty * 10_000.0;
        assert!(
            (scaled - scaled.round()).abs() < 1e-6,
            "score {} not rounded to 4 decimals",
            segment.uncertainty
        );
        // Mutual information may dip slightly below zero near the ε guard,
        // but never materially
        assert!(segment.uncertainty > -0.01);
    }
}
