//! Ownership checks, deletion rules, restart semantics, and standby
//! behavior of the service surface.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use ferry_engine::error::Error;
use ferry_engine::task::TaskState;

use common::{harness, request_to_legacy, settle};

#[tokio::test]
async fn only_the_owner_or_an_admin_may_manage_a_task() {
    let h = harness();
    let id = h
        .service
        .create(request_to_legacy("//home/data/events"), Some("tok-alice"), false)
        .await
        .unwrap();

    let err = h.service.abort(id, Some("tok-bob")).await.unwrap_err();
    assert!(matches!(err, Error::PermissionDenied { .. }));
    let err = h.service.restart(id, Some("tok-bob")).await.unwrap_err();
    assert!(matches!(err, Error::PermissionDenied { .. }));
    let err = h.service.delete(id, Some("tok-bob")).await.unwrap_err();
    assert!(matches!(err, Error::PermissionDenied { .. }));

    // ops is in the admin set and may abort on alice's behalf.
    h.service.abort(id, Some("tok-ops")).await.unwrap();
    assert_eq!(h.service.get(id).await.unwrap().state, TaskState::Aborted);
}

#[tokio::test]
async fn deletion_is_only_allowed_from_a_terminal_state() {
    let h = harness();
    let id = h
        .service
        .create(request_to_legacy("//home/data/events"), Some("tok-alice"), false)
        .await
        .unwrap();

    let err = h.service.delete(id, Some("tok-alice")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidRequest { .. }));

    settle(&h, id, TaskState::Completed).await;
    h.service.delete(id, Some("tok-alice")).await.unwrap();

    assert!(matches!(
        h.service.get(id).await.unwrap_err(),
        Error::TaskNotFound { .. }
    ));
    assert_eq!(h.store.task_count().unwrap(), 0);
}

#[tokio::test]
async fn restart_resets_the_record_and_requeues_it() {
    let h = harness();
    h.runner.fail_table("//home/data/events", "transient breakage");

    let id = h
        .service
        .create(request_to_legacy("//home/data/events"), Some("tok-alice"), false)
        .await
        .unwrap();
    settle(&h, id, TaskState::Failed).await;
    let failed = h.service.get(id).await.unwrap();

    h.runner.heal_table("//home/data/events");
    h.service.restart(id, Some("tok-alice")).await.unwrap();

    let restarted = h.service.get(id).await.unwrap();
    assert_eq!(restarted.state, TaskState::Pending);
    assert!(restarted.creation_time > failed.creation_time);
    assert!(restarted.start_time.is_none());
    assert!(restarted.finish_time.is_none());
    assert!(restarted.error.is_none());
    assert!(restarted.progress.is_none());
    assert_eq!(restarted.queue_index, Some(1));

    settle(&h, id, TaskState::Completed).await;
}

#[tokio::test]
async fn restart_of_a_non_terminal_task_is_rejected() {
    let h = harness();
    let id = h
        .service
        .create(request_to_legacy("//home/data/events"), Some("tok-alice"), false)
        .await
        .unwrap();

    let err = h.service.restart(id, Some("tok-alice")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn restart_defers_validation_to_the_pre_execution_precheck() {
    let h = harness();
    let id = h
        .service
        .create(request_to_legacy("//home/data/metrics"), Some("tok-alice"), false)
        .await
        .unwrap();
    settle(&h, id, TaskState::Completed).await;

    // The source empties out after the first run. Restart is accepted
    // anyway; the worker's own precheck catches the drift and the task
    // fails at execution time instead of at restart time.
    h.alpha.set_row_count("//home/data/metrics", 0).unwrap();
    h.service.restart(id, Some("tok-alice")).await.unwrap();
    assert_eq!(h.service.get(id).await.unwrap().state, TaskState::Pending);

    settle(&h, id, TaskState::Failed).await;
    let error = h.service.get(id).await.unwrap().error.unwrap();
    assert!(error.message.contains("empty"));
}

#[tokio::test]
async fn standby_instance_rejects_everything_but_ping() {
    let h = harness();
    h.active.set(false);

    assert_eq!(h.service.ping(), "OK");
    assert!(!h.service.is_active());

    let err = h
        .service
        .create(request_to_legacy("//home/data/events"), Some("tok-alice"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotActive));
    assert!(!err.is_user_error());

    let err = h.service.list(None).await.unwrap_err();
    assert!(matches!(err, Error::NotActive));
}

#[tokio::test]
async fn config_view_exposes_clusters_and_routes_only() {
    let h = harness();
    let view = h.service.config_view();
    assert_eq!(view.clusters.len(), 5);
    assert_eq!(
        view.availability_graph.get("alpha").unwrap(),
        &vec!["beta".to_string(), "gamma".to_string(), "kv".to_string()]
    );

    let json = serde_json::to_value(&view).unwrap();
    assert!(json.get("relay").is_none());
    assert!(json.get("default_mr_user").is_none());
}
