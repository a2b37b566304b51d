use anyhow::Result;
use p2p_consistency_eval::aggregator;
use p2p_consistency_eval::parser::parse_line;
use p2p_consistency_eval::tracker::{self, NodeTracker};
use p2p_consistency_eval::LogEvent;
use std::io::Cursor;
use std::path::PathBuf;

// Helper: a clean scratch directory for tests that need log files on disk
fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("p2p_eval_{}_{}", tag, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

#[test]
fn failure_marker_takes_precedence() -> Result<()> {
    // Even a line that would otherwise parse as a search is a failure first
    let event = parse_line("!7 [10:02:11] [SRCH FAILED] [7] [0,2]")?;
    assert_eq!(event, Some(LogEvent::Failed));

    // Failure lines do not need the event marker at all
    let event = parse_line("[10:02:12] [server FAIL] ignoring request")?;
    assert_eq!(event, Some(LogEvent::Failed));

    Ok(())
}

#[test]
fn non_event_lines_are_skipped() -> Result<()> {
    assert_eq!(parse_line("")?, None);
    assert_eq!(parse_line("[10:00:00] [client connected] 127.0.0.1:41712")?, None);
    // Marked lines with unrecognized record types are tolerated, not errors
    assert_eq!(parse_line("!3 [10:00:00] [heartbeat] [ok]")?, None);
    Ok(())
}

#[test]
fn obtain_and_remove_name_the_last_token() -> Result<()> {
    let event = parse_line("!1 [10:00:00] [OBTN] [2/7]")?;
    assert_eq!(
        event,
        Some(LogEvent::Obtained {
            resource: "[2/7]".to_string()
        })
    );

    let event = parse_line("!2 [10:00:01] [RMV] [2/7]")?;
    assert_eq!(
        event,
        Some(LogEvent::Removed {
            resource: "[2/7]".to_string()
        })
    );

    Ok(())
}

#[test]
fn search_reconstructs_fragment_results() -> Result<()> {
    let event = parse_line("!3 [10:00:02] [SRCH] [7] [0,2,5]")?;
    match event {
        Some(LogEvent::Searched { results, raw_tail }) => {
            assert_eq!(results, vec!["[0/7]", "[2/7]", "[5/7]"]);
            assert_eq!(raw_tail, "[0,2,5]");
        }
        other => panic!("expected a search event, got {:?}", other),
    }
    Ok(())
}

#[test]
fn malformed_search_is_a_fatal_error() {
    // Unbracketed tail tokens mean the producer is broken; no guessing
    assert!(parse_line("!4 [10:00:03] [SRCH] 7 0,2").is_err());
    // A search record with nothing after the marker is just as dead
    assert!(parse_line("!SRCH").is_err());
}

#[test]
fn replay_tallies_the_obtain_remove_scenario() -> Result<()> {
    let log = "!1 [10:00:00] [OBTN] A\n\
               !2 [10:00:01] [OBTN] A\n\
               !3 [10:00:02] [RMV] A\n\
               !4 [10:00:03] [RMV] A\n";
    let record = tracker::replay("55010", Cursor::new(log))?;

    assert_eq!(record.requests, 2, "only downloads and searches are requests");
    assert_eq!(record.failed, 0);
    assert_eq!(record.updates, 1, "second download of A is one update");
    assert_eq!(record.invalid, 1, "second removal of A is the inconsistency");
    Ok(())
}

#[test]
fn failed_operations_do_not_stop_the_replay() -> Result<()> {
    let log = "!1 [10:00:00] [OBTN] A\n\
               [10:00:01] [node unresponsive] request FAIL\n\
               !2 [10:00:02] [OBTN] B\n";
    let record = tracker::replay("55010", Cursor::new(log))?;
    assert_eq!(record.requests, 2);
    assert_eq!(record.failed, 1);
    Ok(())
}

#[test]
fn stale_search_hits_depend_on_the_raw_tail() {
    let mut tracker = NodeTracker::new("55010");
    tracker.observe(&LogEvent::Obtained {
        resource: "[2/7]".to_string(),
    });

    // Hit on a held fragment, attributed elsewhere: inconsistent
    tracker.observe(&LogEvent::Searched {
        results: vec!["[2/7]".to_string()],
        raw_tail: "[2,6]".to_string(),
    });
    assert_eq!(tracker.record().invalid, 1);

    // Same hit, but our own id appears in the tail: consistent
    tracker.observe(&LogEvent::Searched {
        results: vec!["[2/7]".to_string()],
        raw_tail: "[2@55010,6]".to_string(),
    });
    assert_eq!(tracker.record().invalid, 1);

    // No overlap with what we hold: consistent
    tracker.observe(&LogEvent::Searched {
        results: vec!["[4/7]".to_string()],
        raw_tail: "[4]".to_string(),
    });
    assert_eq!(tracker.record().invalid, 1);

    assert_eq!(tracker.record().requests, 4);
}

#[test]
fn search_counts_at_most_one_invalid_per_event() {
    let mut tracker = NodeTracker::new("55010");
    tracker.observe(&LogEvent::Obtained {
        resource: "[1/9]".to_string(),
    });
    tracker.observe(&LogEvent::Obtained {
        resource: "[2/9]".to_string(),
    });

    // Both results match held fragments; still one inconsistency
    tracker.observe(&LogEvent::Searched {
        results: vec!["[1/9]".to_string(), "[2/9]".to_string()],
        raw_tail: "[1,2]".to_string(),
    });
    assert_eq!(tracker.record().invalid, 1);
}

#[test]
fn removing_an_absent_resource_leaves_state_unchanged() {
    let mut tracker = NodeTracker::new("55010");

    tracker.observe(&LogEvent::Removed {
        resource: "Z".to_string(),
    });
    assert_eq!(tracker.record().invalid, 1);
    assert_eq!(tracker.record().requests, 0, "removals are not requests");
    assert!(!tracker.holds("Z"));

    // The failed removal did not plant the resource: this download is fresh
    tracker.observe(&LogEvent::Obtained {
        resource: "Z".to_string(),
    });
    assert_eq!(tracker.record().updates, 0);
    assert!(tracker.holds("Z"));
}

#[test]
fn every_candidate_line_is_classified_exactly_once() -> Result<()> {
    let lines = [
        "!1 [t] [OBTN] A",
        "!2 [t] [SRCH] [3] [0,1]",
        "!3 [t] [RMV] A",
        "!4 [t] [OBTN] B",
        "[t] [server FAIL] x",
        "[t] [node FAIL] y",
        "[t] [client connected] noise",
        "just noise",
    ];
    let candidates = lines.iter().filter(|l| l.starts_with('!')).count();
    let failures = lines.iter().filter(|l| l.contains("FAIL")).count();

    let mut classified = 0;
    let mut failed = 0;
    for line in &lines {
        match parse_line(line)? {
            Some(LogEvent::Failed) => failed += 1,
            Some(_) => classified += 1,
            None => {}
        }
    }

    assert_eq!(failed + classified, candidates + failures);
    Ok(())
}

#[test]
fn cohort_mean_is_the_mean_of_per_node_ratios() -> Result<()> {
    let dir = scratch_dir("cohort_mean");

    // 5 requests, 1 invalid removal: ratio 0.2
    std::fs::write(
        dir.join("55010_client.log"),
        "!1 [t] [OBTN] A\n!2 [t] [OBTN] B\n!3 [t] [OBTN] C\n\
         !4 [t] [OBTN] D\n!5 [t] [OBTN] E\n!6 [t] [RMV] X\n",
    )?;
    // 5 requests, 2 invalid removals: ratio 0.4
    std::fs::write(
        dir.join("55011_client.log"),
        "!1 [t] [OBTN] A\n!2 [t] [OBTN] B\n!3 [t] [OBTN] C\n\
         !4 [t] [OBTN] D\n!5 [t] [OBTN] E\n!6 [t] [RMV] X\n!7 [t] [RMV] Y\n",
    )?;

    let cohort = aggregator::discover_cohort(&dir)?;
    assert_eq!(cohort.len(), 2);
    assert_eq!(cohort[0].0, "55010");
    assert_eq!(cohort[1].0, "55011");

    let result = aggregator::evaluate_cohort(&cohort)?;
    assert_eq!(result.records["55010"].invalid, 1);
    assert_eq!(result.records["55011"].invalid, 2);
    assert!((result.mean_invalid_ratio - 0.3).abs() < 1e-9);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn zero_request_nodes_are_a_reported_error() -> Result<()> {
    let dir = scratch_dir("zero_requests");
    // Only failures and removals: no request was ever issued
    std::fs::write(
        dir.join("55012_client.log"),
        "[t] [server FAIL] x\n!1 [t] [RMV] A\n",
    )?;

    let cohort = aggregator::discover_cohort(&dir)?;
    let err = aggregator::evaluate_cohort(&cohort).unwrap_err();
    assert!(
        err.to_string().contains("55012"),
        "error should name the zero-request node: {}",
        err
    );

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn a_directory_without_client_logs_is_an_error() -> Result<()> {
    let dir = scratch_dir("no_logs");
    std::fs::write(dir.join("notes.txt"), "nothing to see")?;

    assert!(aggregator::discover_cohort(&dir).is_err());

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
