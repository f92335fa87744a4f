//! End-to-end runs of the backup pipeline against in-memory collaborators.

mod common;

use common::{Fixture, Node, KEY};
use snapback::error::BackupError;
use snapback::logging::RunLog;
use snapback::run::exit_status;
use snapback::types::TransferOutcome;

const DAY: i64 = 86_400;
const NOW: i64 = 1_700_000_000;

// =============================================================================
// Happy path
// =============================================================================

#[test]
fn test_first_run_creates_containers_and_one_snapshot() {
    let fx = Fixture::new("SRC=/var/www\n");

    let summary = fx.controller().run("web", NOW).expect("run should succeed");

    let container = fx.container();
    assert_eq!(
        fx.engine.created.borrow().clone(),
        vec![container.clone(), container.join("current")]
    );
    assert_eq!(fx.engine.snapshot_names(&container).len(), 1);
    assert_eq!(summary.snapshot.path, container.join(summary.snapshot.name.to_string()));
    assert_eq!(
        fx.engine.node(&summary.snapshot.path),
        Some(Node::Subvolume { readonly: true })
    );
    assert!(fx.log_dir().is_dir(), "log directory should be created");
}

#[test]
fn test_successful_run_adds_exactly_one_snapshot() {
    let fx = Fixture::new("SRC=/var/www\nKEEP_DAYS=30\nKEEP_LONG_COUNT=4\n")
        .with_existing_container();
    let container = fx.container();
    fx.engine.add_snapshot(&container, &format!("Long_{}", NOW - 5 * DAY));
    fx.engine.add_snapshot(&container, &format!("Short_{}", NOW - DAY));

    let before = fx.engine.snapshot_names(&container).len();
    fx.controller().run("web", NOW).unwrap();
    let after = fx.engine.snapshot_names(&container).len();

    assert_eq!(after, before + 1);
    assert!(fx.engine.created.borrow().is_empty(), "existing containers are reused");
}

#[test]
fn test_first_run_with_small_epoch_is_short() {
    let fx = Fixture::new("SRC=/data\nKEEP_DAYS=1\nKEEP_LONG_COUNT=2\n");

    let summary = fx.controller().run("web", 1000).unwrap();

    assert_eq!(summary.snapshot.name.to_string(), "Short_1000");
}

#[test]
fn test_long_snapshot_once_window_elapsed() {
    let fx = Fixture::new("SRC=/data\nKEEP_DAYS=7\nKEEP_LONG_COUNT=2\n").with_existing_container();
    let container = fx.container();
    fx.engine.add_snapshot(&container, &format!("Long_{}", NOW - 8 * DAY));

    let summary = fx.controller().run("web", NOW).unwrap();
    assert_eq!(summary.snapshot.name.to_string(), format!("Long_{}", NOW));

    // Next run inside the window falls back to Short
    let summary = fx.controller().run("web", NOW + 60).unwrap();
    assert_eq!(summary.snapshot.name.to_string(), format!("Short_{}", NOW + 60));
}

#[test]
fn test_sub_second_window_keeps_strict_threshold() {
    // 0.0000075 days is 0.648 s; a Long one second old is outside it
    let fx = Fixture::new("SRC=/data\nKEEP_DAYS=0.0000075\nKEEP_LONG_COUNT=2\n")
        .with_existing_container();
    fx.engine.add_snapshot(&fx.container(), "Long_100");

    let summary = fx.controller().run("web", 101).unwrap();

    assert_eq!(summary.snapshot.name.to_string(), "Long_101");
}

#[test]
fn test_zero_long_count_always_short() {
    let fx = Fixture::new("SRC=/data\nKEEP_LONG_COUNT=0\n");

    let summary = fx.controller().run("web", NOW).unwrap();

    assert_eq!(summary.snapshot.name.to_string(), format!("Short_{}", NOW));
}

#[test]
fn test_transfer_requests_follow_profile() {
    let fx = Fixture::new("SRC=/etc/\nSRC=/var/www\nRSYNC_EXCLUDE=*.tmp cache\n");

    fx.controller().run("web", NOW).unwrap();

    assert_eq!(fx.transfer.remotes(), vec!["backup@web1:/etc", "backup@web1:/var/www"]);
    let requests = fx.transfer.requests.borrow();
    let first = &requests[0];
    assert_eq!(first.destination, fx.container().join("current"));
    assert_eq!(first.credential.to_str(), Some(KEY));
    assert_eq!(first.excludes, vec!["*.tmp", "cache"]);
    assert_eq!(first.log_file, fx.log_dir().join(format!("transfer.log.{}", NOW)));
}

#[test]
fn test_single_source_transfers_contents() {
    let fx = Fixture::new("SRC=/var/www\n");

    fx.controller().run("web", NOW).unwrap();

    assert_eq!(fx.transfer.remotes(), vec!["backup@web1:/var/www/"]);
}

#[test]
fn test_run_log_attached_after_validation() {
    let fx = Fixture::new("SRC=/data\n");
    let run_log = RunLog::default();

    fx.controller().with_run_log(run_log.clone()).run("web", NOW).unwrap();

    assert!(run_log.is_attached());
    assert!(fx.log_dir().join(format!("run.log.{}", NOW)).is_file());
}

// =============================================================================
// Partial transfer tolerance
// =============================================================================

#[test]
fn test_partial_plus_success_proceeds() {
    let fx = Fixture::new("SRC=/a\nSRC=/b\n");
    fx.transfer.script("backup@web1:/a", 24);

    let summary = fx.controller().run("web", NOW).unwrap();

    let outcomes: Vec<_> = summary.transfers.iter().map(|r| r.outcome).collect();
    assert_eq!(outcomes, vec![TransferOutcome::PartialAcceptable, TransferOutcome::Success]);
    assert_eq!(summary.transfers[0].raw_code, Some(24));
    assert_eq!(fx.engine.snapshot_names(&fx.container()).len(), 1);
}

#[test]
fn test_all_accepted_partial_counts_as_success() {
    let fx = Fixture::new("SRC=/a\nSRC=/b\n");
    fx.transfer.script("backup@web1:/a", 24);
    fx.transfer.script("backup@web1:/b", 30);

    let summary = fx.controller().run("web", NOW).unwrap();

    assert_eq!(summary.sources_ok(), 2);
    assert_eq!(fx.engine.snapshot_names(&fx.container()).len(), 1);
}

#[test]
fn test_failed_source_does_not_stop_batch() {
    let fx = Fixture::new("SRC=/a\nSRC=/b\nSRC=/c\n");
    fx.transfer.script("backup@web1:/a", 23);
    fx.transfer.script_spawn_error("backup@web1:/b");

    let summary = fx.controller().run("web", NOW).unwrap();

    assert_eq!(fx.transfer.remotes().len(), 3);
    assert_eq!(summary.sources_ok(), 1);
    assert_eq!(summary.sources_failed(), 2);
    assert_eq!(summary.transfers[1].raw_code, None);
}

#[test]
fn test_all_sources_failed_is_fatal_and_no_snapshot() {
    let fx = Fixture::new("SRC=/a\nSRC=/b\n");
    fx.transfer.script("backup@web1:/a", 255);
    fx.transfer.script("backup@web1:/b", 12);

    let err = fx.controller().run("web", NOW).unwrap_err();

    assert!(matches!(err, BackupError::TransferFailed { attempted: 2 }));
    assert_eq!(err.exit_code(), 1);
    assert!(fx.engine.snapshot_names(&fx.container()).is_empty());
}

// =============================================================================
// Fatal failures
// =============================================================================

#[test]
fn test_missing_profile_is_config_not_found() {
    let fx = Fixture::new("SRC=/a\n");

    let err = fx.controller().run("nope", NOW).unwrap_err();

    assert!(matches!(err, BackupError::ConfigNotFound(_)));
    assert!(fx.transfer.requests.borrow().is_empty());
}

#[test]
fn test_snapshot_failure_is_fatal() {
    let fx = Fixture::new("SRC=/a\n");
    fx.engine.fail_snapshot.set(true);

    let err = fx.controller().run("web", NOW).unwrap_err();

    assert!(matches!(err, BackupError::SnapshotCreateFailed(_)));
    assert_eq!(fx.transfer.requests.borrow().len(), 1, "transfer ran before snapshot");
}

#[test]
fn test_snapshot_name_collision_is_fatal() {
    let fx = Fixture::new("SRC=/a\nKEEP_LONG_COUNT=0\n").with_existing_container();
    fx.engine.add_snapshot(&fx.container(), &format!("Short_{}", NOW));

    let err = fx.controller().run("web", NOW).unwrap_err();

    assert!(matches!(err, BackupError::SnapshotCreateFailed(_)));
}

// =============================================================================
// Pruning inside a run
// =============================================================================

#[test]
fn test_run_prunes_expired_snapshots() {
    let fx = Fixture::new("SRC=/a\nKEEP_DAYS=7\nKEEP_LONG_COUNT=2\n").with_existing_container();
    let container = fx.container();
    for days in [100, 60, 30] {
        fx.engine.add_snapshot(&container, &format!("Long_{}", NOW - days * DAY));
    }
    fx.engine.add_snapshot(&container, &format!("Short_{}", NOW - 8 * DAY));
    fx.engine.add_snapshot(&container, &format!("Short_{}", NOW - 2 * DAY));

    let summary = fx.controller().run("web", NOW).unwrap();

    let mut remaining = fx.engine.snapshot_names(&container);
    remaining.sort();
    assert_eq!(
        remaining,
        vec![
            format!("Long_{}", NOW - 30 * DAY),
            format!("Long_{}", NOW),
            format!("Short_{}", NOW - 2 * DAY),
        ]
    );
    assert_eq!(summary.prune.deleted(), 3);
    assert!(fx.engine.node(&container.join("current")).is_some());
}

#[test]
fn test_sub_second_window_prunes_one_second_old_short() {
    let fx = Fixture::new("SRC=/data\nKEEP_DAYS=0.0000075\nKEEP_LONG_COUNT=2\n")
        .with_existing_container();
    let container = fx.container();
    fx.engine.add_snapshot(&container, "Short_100");

    let summary = fx.controller().run("web", 101).unwrap();

    assert_eq!(summary.prune.deleted(), 1);
    assert!(fx.engine.node(&container.join("Short_100")).is_none());
}

#[test]
fn test_prune_failure_is_not_fatal() {
    let fx = Fixture::new("SRC=/a\nKEEP_DAYS=1\n").with_existing_container();
    let container = fx.container();
    let stale = container.join(format!("Short_{}", NOW - 3 * DAY));
    fx.engine.add_snapshot(&container, &format!("Short_{}", NOW - 3 * DAY));
    fx.engine.fail_delete.borrow_mut().insert(stale.clone());

    let summary = fx.controller().run("web", NOW).expect("prune failures must not fail the run");

    assert_eq!(summary.prune.warnings.len(), 1);
    assert!(!summary.prune.warnings[0].is_fatal());
    assert!(fx.engine.node(&stale).is_some());
}

#[test]
fn test_unrelated_entries_are_ignored() {
    let fx = Fixture::new("SRC=/a\nKEEP_DAYS=0\nKEEP_LONG_COUNT=0\n").with_existing_container();
    let container = fx.container();
    fx.engine.add_snapshot(&container, "Long_abc");
    fx.engine.add_snapshot(&container, "Short_");
    fx.engine.add(&container.join("notes"), Node::Plain);

    fx.controller().run("web", NOW).unwrap();

    let children = fx.engine.children(&container);
    for name in ["Long_abc", "Short_", "notes", "current"] {
        assert!(children.contains(&name.to_string()), "{} should survive", name);
    }
}

// =============================================================================
// Exit status
// =============================================================================

#[test]
fn test_exit_status_zero_despite_partial_and_prune_failures() {
    let fx = Fixture::new("SRC=/a\nSRC=/b\nKEEP_DAYS=1\n").with_existing_container();
    let container = fx.container();
    let stale = container.join(format!("Short_{}", NOW - 3 * DAY));
    fx.engine.add_snapshot(&container, &format!("Short_{}", NOW - 3 * DAY));
    fx.engine.fail_clear.borrow_mut().insert(stale);
    fx.transfer.script("backup@web1:/a", 23);

    let outcome = fx.controller().run("web", NOW);

    let summary = outcome.as_ref().unwrap();
    assert_eq!(summary.sources_failed(), 1);
    assert_eq!(summary.prune.warnings.len(), 1);
    assert_eq!(exit_status(&outcome), 0);
}

#[test]
fn test_exit_status_one_on_fatal_error() {
    let fx = Fixture::new("SRC=/a\n");
    fx.transfer.script("backup@web1:/a/", 11);

    let outcome = fx.controller().run("web", NOW);

    assert!(matches!(outcome, Err(BackupError::TransferFailed { attempted: 1 })));
    assert_eq!(exit_status(&outcome), 1);
    assert_eq!(exit_status(&fx.controller().run("missing", NOW)), 1);
}
